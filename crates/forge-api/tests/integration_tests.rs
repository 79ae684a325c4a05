//! Integration tests for the InsightForge API.
//!
//! Drives every route through the router with `oneshot`, using a temporary
//! data directory, an in-memory database, the hashing embedder and a
//! scripted completion provider. Each test builds its own state.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tempfile::TempDir;
use tower::ServiceExt;

use forge_analysis::{AnalysisError, ScriptedProvider};
use forge_api::{create_router, AppState, Session};
use forge_core::ForgeConfig;
use forge_retrieval::HashingEmbedding;
use forge_storage::Database;

// =============================================================================
// Helpers
// =============================================================================

const SALES_CSV: &str = "Date,Region,Product,Revenue,Units\n\
    2024-01-01,East,Widget,1200,10\n\
    2024-01-02,West,Gadget,800,4\n\
    2024-01-03,East,Gadget,950,6\n\
    2024-01-04,North,Widget,1500,12\n\
    2024-01-05,West,Widget,700,5\n";

const OVERVIEW_REPLY: &str = "**Executive Summary**\nRevenue is concentrated in the East.\n\n\
    **Key Trends & Patterns**\nWidgets outsell gadgets.\n\n\
    **Actionable Recommendations**\nExpand the North region.";

fn test_config(dir: &TempDir) -> ForgeConfig {
    let mut config = ForgeConfig::default();
    config.general.data_dir = dir.path().to_string_lossy().into_owned();
    config.llm.api_key.clear();
    config
}

fn build_app(config: ForgeConfig, provider: Option<Arc<ScriptedProvider>>) -> Router {
    let db = Arc::new(Database::in_memory().unwrap());
    let mut session =
        Session::new(config, Arc::new(HashingEmbedding::default()), Some(db)).unwrap();
    if let Some(provider) = provider {
        session = session.with_completion_provider(provider).unwrap();
    }
    create_router(AppState::new(session))
}

/// Router without AI analysis.
fn make_app() -> (Router, TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let app = build_app(test_config(&dir), None);
    (app, dir)
}

/// Router whose model replies come from `provider`.
fn make_app_with_provider(provider: Arc<ScriptedProvider>) -> (Router, TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let app = build_app(test_config(&dir), Some(provider));
    (app, dir)
}

async fn send(app: &Router, req: Request<Body>) -> (StatusCode, Value) {
    let resp = app.clone().oneshot(req).await.unwrap();
    let status = resp.status();
    let bytes = axum::body::to_bytes(resp.into_body(), 16 * 1024 * 1024)
        .await
        .unwrap();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}

async fn get(app: &Router, uri: &str) -> (StatusCode, Value) {
    send(app, Request::get(uri).body(Body::empty()).unwrap()).await
}

async fn delete(app: &Router, uri: &str) -> (StatusCode, Value) {
    send(app, Request::delete(uri).body(Body::empty()).unwrap()).await
}

async fn post_empty(app: &Router, uri: &str) -> (StatusCode, Value) {
    send(app, Request::post(uri).body(Body::empty()).unwrap()).await
}

async fn post_json(app: &Router, uri: &str, body: Value) -> (StatusCode, Value) {
    let req = Request::post(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    send(app, req).await
}

async fn upload(app: &Router, filename: &str, bytes: impl Into<Body>) -> (StatusCode, Value) {
    let req = Request::post(format!("/upload?filename={}", filename))
        .header("content-type", "application/octet-stream")
        .body(bytes.into())
        .unwrap();
    send(app, req).await
}

// =============================================================================
// Health and session
// =============================================================================

#[tokio::test]
async fn test_health_returns_ok() {
    let (app, _dir) = make_app();
    let resp = app
        .clone()
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let bytes = axum::body::to_bytes(resp.into_body(), 1024 * 1024).await.unwrap();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["analysis_enabled"], false);
    assert_eq!(body["indexed_chunks"], 0);
}

#[tokio::test]
async fn test_empty_session_status() {
    let (app, _dir) = make_app();
    let (status, body) = get(&app, "/session").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["file_name"], Value::Null);
    assert_eq!(body["chat_turns"], 0);
    assert_eq!(body["embedder"], "hashing");
}

#[tokio::test]
async fn test_dataset_views_need_data() {
    let (app, _dir) = make_app();
    for uri in ["/dataset/profile", "/dataset/preview", "/dashboard/kpis", "/dashboard/charts"] {
        let (status, body) = get(&app, uri).await;
        assert_eq!(status, StatusCode::CONFLICT, "{}", uri);
        assert_eq!(body["error"], "conflict");
    }
}

#[tokio::test]
async fn test_clear_session() {
    let (app, _dir) = make_app();
    upload(&app, "sales.csv", SALES_CSV).await;

    let (status, body) = delete(&app, "/session").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["file_name"], Value::Null);
    assert_eq!(body["indexed_chunks"], 0);
}

// =============================================================================
// Uploads
// =============================================================================

#[tokio::test]
async fn test_upload_csv_then_dashboard() {
    let (app, _dir) = make_app();
    let (status, body) = upload(&app, "sales.csv", SALES_CSV).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["file_name"], "sales.csv");
    assert_eq!(body["kind"], "tabular");
    assert_eq!(body["rows"], 5);
    assert_eq!(body["columns"], 5);
    assert!(body["chunks"].as_u64().unwrap() >= 1);

    let (status, profile) = get(&app, "/dataset/profile").await;
    assert_eq!(status, StatusCode::OK);
    assert!(profile.is_object());

    let (status, preview) = get(&app, "/dataset/preview?rows=2").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(preview["rows"].as_array().unwrap().len(), 2);
    assert_eq!(preview["total_rows"], 5);

    let (status, kpis) = get(&app, "/dashboard/kpis").await;
    assert_eq!(status, StatusCode::OK);
    let cards = kpis["cards"].as_array().unwrap();
    assert_eq!(cards[0]["label"], "Total Records");
    assert_eq!(cards[0]["value"], "5");
    assert_eq!(cards[2]["label"], "Total Revenue");
    assert_eq!(cards[2]["value"], "5,150.00");

    let (status, charts) = get(&app, "/dashboard/charts").await;
    assert_eq!(status, StatusCode::OK);
    let types: Vec<&str> = charts["charts"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|c| c["type"].as_str())
        .collect();
    assert_eq!(types.first(), Some(&"histogram"));
    assert!(types.contains(&"bar"));
    assert!(types.contains(&"line"));
}

#[tokio::test]
async fn test_upload_requires_filename() {
    let (app, _dir) = make_app();
    let req = Request::post("/upload").body(Body::from(SALES_CSV)).unwrap();
    let (status, body) = send(&app, req).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "bad_request");
}

#[tokio::test]
async fn test_upload_unsupported_extension() {
    let (app, _dir) = make_app();
    let (status, body) = upload(&app, "tool.exe", "MZ").await;
    assert_eq!(status, StatusCode::UNSUPPORTED_MEDIA_TYPE);
    assert_eq!(body["error"], "unsupported_media_type");
}

#[tokio::test]
async fn test_upload_image_is_rejected() {
    let (app, _dir) = make_app();
    let (status, _) = upload(&app, "chart.png", vec![0x89u8, b'P', b'N', b'G']).await;
    assert_eq!(status, StatusCode::UNSUPPORTED_MEDIA_TYPE);
}

#[tokio::test]
async fn test_corrupt_pdf_keeps_previous_source() {
    let (app, _dir) = make_app();
    upload(&app, "sales.csv", SALES_CSV).await;

    let (status, body) = upload(&app, "report.pdf", "%PDF-1.4 truncated garbage").await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(body["message"].as_str().unwrap().contains("pdf"));

    let (_, session) = get(&app, "/session").await;
    assert_eq!(session["file_name"], "sales.csv");

    let (_, files) = get(&app, "/files").await;
    let names: Vec<&str> = files["files"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|f| f["name"].as_str())
        .collect();
    assert_eq!(names, vec!["sales.csv"]);
}

#[tokio::test]
async fn test_oversize_upload_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = test_config(&dir);
    config.upload.max_upload_size_mb = 1;
    let app = build_app(config, None);

    let big = vec![b'a'; 2 * 1024 * 1024];
    let (status, _) = upload(&app, "big.csv", big).await;
    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
}

#[tokio::test]
async fn test_upload_text_document() {
    let (app, _dir) = make_app();
    let (status, body) = upload(
        &app,
        "notes.txt",
        "Quarterly revenue grew in the East region thanks to widget sales.",
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["kind"], "document");
    assert_eq!(body["rows"], Value::Null);

    let (status, _) = get(&app, "/dashboard/charts").await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, body) = get(&app, "/retrieve?q=widget%20sales&k=1").await;
    assert_eq!(status, StatusCode::OK);
    let results = body["results"].as_array().unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0]["chunk"]["source"], "notes.txt");
}

// =============================================================================
// Samples and charts
// =============================================================================

#[tokio::test]
async fn test_load_sample_dataset() {
    let (app, _dir) = make_app();
    let (status, body) = post_empty(&app, "/samples/sales").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["file_name"], "sales_data.csv");
    assert_eq!(body["rows"], 500);

    let (status, body) = post_empty(&app, "/samples/finance").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "not_found");
}

#[tokio::test]
async fn test_custom_chart() {
    let (app, _dir) = make_app();
    upload(&app, "sales.csv", SALES_CSV).await;

    let (status, body) = post_json(
        &app,
        "/charts",
        json!({"type": "bar", "x": "Region", "y": "Revenue"}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["type"], "bar");
    assert_eq!(body["title"], "Revenue by Region");
    assert_eq!(body["categories"][0], "East");

    let (status, body) = post_json(
        &app,
        "/charts",
        json!({"type": "pie", "column": "Missing"}),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(body["message"].as_str().unwrap().contains("Missing"));
}

// =============================================================================
// Analysis and chat
// =============================================================================

#[tokio::test]
async fn test_analysis_disabled_without_key() {
    let (app, _dir) = make_app();
    post_empty(&app, "/samples/hr").await;

    let (status, body) = post_empty(&app, "/analysis").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert!(body["message"].as_str().unwrap().contains("API key"));

    let (status, _) = post_json(&app, "/ask", json!({"question": "Who left?"})).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn test_set_blank_api_key_keeps_analysis_disabled() {
    let (app, _dir) = make_app();
    let req = Request::put("/settings/api-key")
        .header("content-type", "application/json")
        .body(Body::from(json!({"api_key": "  "}).to_string()))
        .unwrap();
    let (status, body) = send(&app, req).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["analysis_enabled"], false);
}

#[tokio::test]
async fn test_overview_analysis_and_latest() {
    let provider = Arc::new(ScriptedProvider::with_replies([OVERVIEW_REPLY]));
    let (app, _dir) = make_app_with_provider(provider.clone());

    let (status, _) = get(&app, "/analysis/latest").await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    upload(&app, "sales.csv", SALES_CSV).await;
    let (status, body) = post_empty(&app, "/analysis").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["kind"], "overview");
    assert_eq!(body["fallback"], false);
    assert_eq!(body["sections"].as_array().unwrap().len(), 3);

    let (status, latest) = get(&app, "/analysis/latest").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(latest["id"], body["id"]);

    let requests = provider.requests();
    assert_eq!(requests.len(), 1);
    let prompt = requests[0].messages.last().unwrap().content.text();
    assert!(prompt.contains("Revenue"));
}

#[tokio::test]
async fn test_custom_analysis_request() {
    let provider = Arc::new(ScriptedProvider::with_replies(["Churn is highest in Sales."]));
    let (app, _dir) = make_app_with_provider(provider);
    post_empty(&app, "/samples/hr").await;

    let (status, body) = post_json(
        &app,
        "/analysis",
        json!({"request": "Which department has the most attrition?"}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["kind"], "custom");
    assert_eq!(body["fallback"], true);
}

#[tokio::test]
async fn test_empty_model_reply_gives_fallback_section() {
    let provider = Arc::new(ScriptedProvider::with_replies(["   "]));
    let (app, _dir) = make_app_with_provider(provider);
    upload(&app, "sales.csv", SALES_CSV).await;

    let (status, body) = post_empty(&app, "/analysis").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["fallback"], true);
    assert_eq!(
        body["sections"][0]["body"],
        forge_analysis::EMPTY_RESPONSE
    );
}

#[tokio::test]
async fn test_ask_and_chat_history() {
    let provider = Arc::new(ScriptedProvider::with_replies(["The East region leads revenue."]));
    let (app, _dir) = make_app_with_provider(provider);
    upload(&app, "sales.csv", SALES_CSV).await;

    let (status, body) = post_json(&app, "/ask", json!({"question": "Which region leads?"})).await;
    assert_eq!(status, StatusCode::OK);
    assert!(!body["sources"].as_array().unwrap().is_empty());
    assert_eq!(body["answer"]["kind"], "question");

    let (_, history) = get(&app, "/chat/history").await;
    let turns = history["turns"].as_array().unwrap();
    assert_eq!(turns.len(), 2);
    assert_eq!(turns[0]["role"], "user");
    assert_eq!(turns[0]["content"], "Which region leads?");
    assert_eq!(turns[1]["role"], "assistant");

    let (status, cleared) = delete(&app, "/chat/history").await;
    assert_eq!(status, StatusCode::OK);
    assert!(cleared["turns"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_chat_and_connection_check() {
    let (app, _dir) = make_app();
    let (status, _) = post_empty(&app, "/settings/api-key/test").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

    let provider = Arc::new(ScriptedProvider::with_replies([
        "Revenue is concentrated in the East.",
        "connected",
    ]));
    let (app, _dir) = make_app_with_provider(provider);
    upload(&app, "sales.csv", SALES_CSV).await;

    let (status, _) = post_json(&app, "/chat", json!({"message": "  "})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = post_json(&app, "/chat", json!({"message": "Where is revenue?"})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["reply"], "Revenue is concentrated in the East.");

    let (_, history) = get(&app, "/chat/history").await;
    assert_eq!(history["turns"].as_array().unwrap().len(), 2);

    let (status, body) = post_empty(&app, "/settings/api-key/test").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["connected"], true);
}

#[tokio::test]
async fn test_ask_provider_failure_is_bad_gateway() {
    let provider = Arc::new(ScriptedProvider::default());
    provider.push_error(AnalysisError::Provider {
        status: 401,
        body: "invalid api key".into(),
    });
    let (app, _dir) = make_app_with_provider(provider);
    upload(&app, "sales.csv", SALES_CSV).await;

    let (status, body) = post_json(&app, "/ask", json!({"question": "Any anomalies?"})).await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["error"], "bad_gateway");

    let (_, history) = get(&app, "/chat/history").await;
    let turns = history["turns"].as_array().unwrap();
    assert_eq!(turns.len(), 2);
    assert!(turns[1]["content"]
        .as_str()
        .unwrap()
        .starts_with("Sorry, I encountered an error:"));
}

#[tokio::test]
async fn test_ask_rejects_blank_question() {
    let provider = Arc::new(ScriptedProvider::default());
    let (app, _dir) = make_app_with_provider(provider);
    let (status, _) = post_json(&app, "/ask", json!({"question": "  "})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_chart_suggestions() {
    let reply = "1. Revenue by region\n\
        - **Chart Type**: Bar\n\
        - **X-Axis**: Region\n\
        - **Y-Axis**: Revenue\n\
        - **Group By**: None\n\
        - **Title**: Revenue by Region\n\
        - **Insight**: East leads.\n";
    let provider = Arc::new(ScriptedProvider::with_replies([reply]));
    let (app, _dir) = make_app_with_provider(provider);
    upload(&app, "sales.csv", SALES_CSV).await;

    let (status, body) = post_empty(&app, "/charts/suggestions").await;
    assert_eq!(status, StatusCode::OK);
    let suggestions = body["suggestions"].as_array().unwrap();
    assert_eq!(suggestions.len(), 1);
    assert_eq!(suggestions[0]["chart_type"], "bar");
    assert_eq!(suggestions[0]["x_axis"], "Region");
}

#[tokio::test]
async fn test_image_analysis() {
    let provider = Arc::new(ScriptedProvider::with_replies([
        "**Executive Summary**\nThe chart shows rising revenue.",
    ]));
    let (app, _dir) = make_app_with_provider(provider.clone());

    let req = Request::post("/images/analyze?filename=chart.png&prompt=What%20trend%3F")
        .body(Body::from(vec![0x89u8, b'P', b'N', b'G', 0, 1, 2, 3]))
        .unwrap();
    let (status, body) = send(&app, req).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["kind"], "image");

    let requests = provider.requests();
    let sent = serde_json::to_value(&requests[0].messages).unwrap();
    let text = sent.to_string();
    assert!(text.contains("data:image/png;base64,"));
    assert!(text.contains("What trend?"));
}

// =============================================================================
// Retrieval, files and indexes
// =============================================================================

#[tokio::test]
async fn test_retrieve_requires_query_and_handles_empty_index() {
    let (app, _dir) = make_app();
    let (status, _) = get(&app, "/retrieve").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = get(&app, "/retrieve?q=revenue").await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["results"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_file_activate_and_delete() {
    let (app, _dir) = make_app();
    upload(&app, "sales.csv", SALES_CSV).await;
    upload(&app, "notes.txt", "Widget sales notes.").await;

    let (status, body) = post_empty(&app, "/files/sales.csv/activate").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["kind"], "tabular");

    let (status, _) = post_empty(&app, "/files/missing.csv/activate").await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = delete(&app, "/files/notes.txt").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["session_cleared"], false);

    let (status, body) = delete(&app, "/files/sales.csv").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["session_cleared"], true);

    let (_, files) = get(&app, "/files").await;
    assert!(files["files"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_save_and_load_index() {
    let (app, _dir) = make_app();
    let (status, _) = post_empty(&app, "/indexes/nothing").await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (_, loaded) = post_empty(&app, "/samples/marketing").await;
    let (status, saved) = post_empty(&app, "/indexes/campaigns.pkl").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(saved["name"], "campaigns");
    assert_eq!(saved["chunks"], loaded["chunks"]);

    delete(&app, "/session").await;

    let (status, body) = post_empty(&app, "/indexes/campaigns/load").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["chunks"], loaded["chunks"]);

    let (_, session) = get(&app, "/session").await;
    assert_eq!(session["loaded_index"], "campaigns");
    assert!(session["file_name"].is_null());

    let (_, list) = get(&app, "/indexes").await;
    let indexes = list["indexes"].as_array().unwrap();
    assert_eq!(indexes.len(), 1);
    assert_eq!(indexes[0]["name"], "campaigns");
    assert_eq!(indexes[0]["embedder"], "hashing");

    let (status, _) = post_empty(&app, "/indexes/unknown/load").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
