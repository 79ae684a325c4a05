//! Route handler functions for all API endpoints.
//!
//! Each handler extracts query/path parameters via axum extractors, locks
//! the session, and returns a JSON response.

use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::Json;
use forge_core::{AnalysisResult, ChatTurn};
use forge_loader::{DataProfile, StoredFile};
use forge_retrieval::ScoredChunk;
use forge_storage::StoreSummary;
use forge_viz::{ChartRequest, ChartSpec, KpiCard};
use serde::{Deserialize, Serialize};

use crate::error::ApiError;
use crate::session::{Answer, IngestSummary, Preview, SessionStatus, Suggestions};
use crate::state::AppState;

const DEFAULT_PREVIEW_ROWS: usize = 10;

// =============================================================================
// Query parameter and request body types
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct UploadParams {
    pub filename: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ImageParams {
    pub filename: Option<String>,
    pub prompt: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct PreviewParams {
    pub rows: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct RetrieveParams {
    pub q: Option<String>,
    pub k: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct ApiKeyRequest {
    /// Empty or absent disables AI analysis.
    #[serde(default)]
    pub api_key: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct AnalysisRequest {
    /// Free-form analysis request. Absent means the standard overview.
    #[serde(default)]
    pub request: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct AskRequest {
    pub question: String,
}

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub message: String,
}

// =============================================================================
// Response types
// =============================================================================

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_secs: u64,
    pub analysis_enabled: bool,
    pub indexed_chunks: usize,
}

#[derive(Debug, Serialize)]
pub struct ApiKeyResponse {
    pub analysis_enabled: bool,
}

#[derive(Debug, Serialize)]
pub struct ConnectionResponse {
    pub connected: bool,
}

#[derive(Debug, Serialize)]
pub struct ChatResponse {
    pub reply: String,
}

#[derive(Debug, Serialize)]
pub struct KpisResponse {
    pub cards: Vec<KpiCard>,
}

#[derive(Debug, Serialize)]
pub struct ChartsResponse {
    pub charts: Vec<ChartSpec>,
}

#[derive(Debug, Serialize)]
pub struct ChatHistoryResponse {
    pub turns: Vec<ChatTurn>,
}

#[derive(Debug, Serialize)]
pub struct RetrieveResponse {
    pub query: String,
    pub results: Vec<ScoredChunk>,
}

#[derive(Debug, Serialize)]
pub struct FilesResponse {
    pub files: Vec<StoredFile>,
}

#[derive(Debug, Serialize)]
pub struct DeleteFileResponse {
    pub deleted: String,
    /// True when the deleted file was active and the session was reset.
    pub session_cleared: bool,
}

#[derive(Debug, Serialize)]
pub struct IndexesResponse {
    pub indexes: Vec<StoreSummary>,
}

#[derive(Debug, Serialize)]
pub struct IndexResponse {
    pub name: String,
    pub chunks: usize,
}

fn required(value: Option<String>, param: &str) -> Result<String, ApiError> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(v.trim().to_string()),
        _ => Err(ApiError::BadRequest(format!("'{}' is required", param))),
    }
}

// =============================================================================
// Health and session
// =============================================================================

/// GET /health - health check.
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let session = state.session.lock().await;
    let status = session.status();
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_secs: state.start_time.elapsed().as_secs(),
        analysis_enabled: status.analysis_enabled,
        indexed_chunks: status.indexed_chunks,
    })
}

/// GET /session - what is loaded right now.
pub async fn session_status(State(state): State<AppState>) -> Json<SessionStatus> {
    let session = state.session.lock().await;
    Json(session.status())
}

/// DELETE /session - drop active data, index and chat.
pub async fn clear_session(
    State(state): State<AppState>,
) -> Result<Json<SessionStatus>, ApiError> {
    let mut session = state.session.lock().await;
    session.clear()?;
    Ok(Json(session.status()))
}

/// PUT /settings/api-key - set or clear the OpenAI API key.
pub async fn set_api_key(
    State(state): State<AppState>,
    Json(body): Json<ApiKeyRequest>,
) -> Json<ApiKeyResponse> {
    let mut session = state.session.lock().await;
    let analysis_enabled = session.set_api_key(body.api_key.as_deref().unwrap_or(""));
    Json(ApiKeyResponse { analysis_enabled })
}

/// POST /settings/api-key/test - send a short prompt to the model.
pub async fn test_connection(
    State(state): State<AppState>,
) -> Result<Json<ConnectionResponse>, ApiError> {
    let session = state.session.lock().await;
    let connected = session.test_connection().await?;
    Ok(Json(ConnectionResponse { connected }))
}

// =============================================================================
// Ingestion
// =============================================================================

/// POST /upload?filename= - store the raw body and make it the active source.
pub async fn upload(
    State(state): State<AppState>,
    Query(params): Query<UploadParams>,
    body: Bytes,
) -> Result<Json<IngestSummary>, ApiError> {
    let filename = required(params.filename, "filename")?;
    let mut session = state.session.lock().await;
    let summary = session.ingest_upload(&filename, body.to_vec()).await?;
    Ok(Json(summary))
}

/// POST /images/analyze?filename=&prompt= - describe an uploaded image.
pub async fn analyze_image(
    State(state): State<AppState>,
    Query(params): Query<ImageParams>,
    body: Bytes,
) -> Result<Json<AnalysisResult>, ApiError> {
    let filename = required(params.filename, "filename")?;
    let prompt = params.prompt.unwrap_or_default();
    let mut session = state.session.lock().await;
    let result = session
        .ingest_image(&filename, body.to_vec(), &prompt)
        .await?;
    Ok(Json(result))
}

/// POST /samples/{name} - load a generated sample dataset.
pub async fn load_sample(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<IngestSummary>, ApiError> {
    let mut session = state.session.lock().await;
    let summary = session.load_sample(&name).await?;
    Ok(Json(summary))
}

// =============================================================================
// Dataset and dashboard
// =============================================================================

/// GET /dataset/profile
pub async fn dataset_profile(
    State(state): State<AppState>,
) -> Result<Json<DataProfile>, ApiError> {
    let session = state.session.lock().await;
    Ok(Json(session.profile()?))
}

/// GET /dataset/preview?rows=
pub async fn dataset_preview(
    State(state): State<AppState>,
    Query(params): Query<PreviewParams>,
) -> Result<Json<Preview>, ApiError> {
    let rows = params.rows.unwrap_or(DEFAULT_PREVIEW_ROWS);
    let session = state.session.lock().await;
    Ok(Json(session.preview(rows)?))
}

/// GET /dashboard/kpis
pub async fn dashboard_kpis(
    State(state): State<AppState>,
) -> Result<Json<KpisResponse>, ApiError> {
    let cards = state.session.lock().await.kpis()?;
    Ok(Json(KpisResponse { cards }))
}

/// GET /dashboard/charts - the automatic chart set.
pub async fn dashboard_charts(
    State(state): State<AppState>,
) -> Result<Json<ChartsResponse>, ApiError> {
    let charts = state.session.lock().await.charts()?;
    Ok(Json(ChartsResponse { charts }))
}

/// POST /charts - build one chart from an explicit request.
pub async fn create_chart(
    State(state): State<AppState>,
    Json(request): Json<ChartRequest>,
) -> Result<Json<ChartSpec>, ApiError> {
    let session = state.session.lock().await;
    Ok(Json(session.chart(&request)?))
}

/// POST /charts/suggestions - ask the model which charts to draw.
pub async fn chart_suggestions(
    State(state): State<AppState>,
) -> Result<Json<Suggestions>, ApiError> {
    let session = state.session.lock().await;
    let suggestions = session.suggest_visualizations().await?;
    Ok(Json(suggestions))
}

// =============================================================================
// Analysis and chat
// =============================================================================

/// POST /analysis - overview, or a custom analysis when `request` is set.
///
/// The body is optional; an empty body runs the overview.
pub async fn run_analysis(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<AnalysisResult>, ApiError> {
    let request: AnalysisRequest = if body.iter().all(u8::is_ascii_whitespace) {
        AnalysisRequest::default()
    } else {
        serde_json::from_slice(&body)
            .map_err(|e| ApiError::UnprocessableEntity(format!("invalid analysis request: {}", e)))?
    };

    let mut session = state.session.lock().await;
    let result = match request.request.as_deref().map(str::trim) {
        Some(text) if !text.is_empty() => session.custom_analysis(text).await?,
        _ => session.analyze().await?,
    };
    Ok(Json(result))
}

/// GET /analysis/latest
pub async fn latest_analysis(
    State(state): State<AppState>,
) -> Result<Json<AnalysisResult>, ApiError> {
    let session = state.session.lock().await;
    session
        .last_analysis()
        .cloned()
        .map(Json)
        .ok_or_else(|| ApiError::NotFound("no analysis has been run yet".to_string()))
}

/// POST /ask - RAG question answering.
pub async fn ask(
    State(state): State<AppState>,
    Json(body): Json<AskRequest>,
) -> Result<Json<Answer>, ApiError> {
    if body.question.trim().is_empty() {
        return Err(ApiError::BadRequest("'question' must not be empty".to_string()));
    }
    let mut session = state.session.lock().await;
    let answer = session.ask(&body.question).await?;
    Ok(Json(answer))
}

/// POST /chat - free-form message, with or without loaded data.
pub async fn chat(
    State(state): State<AppState>,
    Json(body): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, ApiError> {
    if body.message.trim().is_empty() {
        return Err(ApiError::BadRequest("'message' must not be empty".to_string()));
    }
    let mut session = state.session.lock().await;
    let reply = session.chat(&body.message).await?;
    Ok(Json(ChatResponse { reply }))
}

/// GET /chat/history
pub async fn chat_history(State(state): State<AppState>) -> Json<ChatHistoryResponse> {
    let turns = state.session.lock().await.chat_history().to_vec();
    Json(ChatHistoryResponse { turns })
}

/// DELETE /chat/history
pub async fn clear_chat(State(state): State<AppState>) -> Json<ChatHistoryResponse> {
    state.session.lock().await.clear_chat();
    Json(ChatHistoryResponse { turns: Vec::new() })
}

/// GET /retrieve?q=&k= - raw scored chunks from the vector index.
pub async fn retrieve(
    State(state): State<AppState>,
    Query(params): Query<RetrieveParams>,
) -> Result<Json<RetrieveResponse>, ApiError> {
    let query = required(params.q, "q")?;
    let results = state.session.lock().await.retrieve(&query, params.k).await?;
    Ok(Json(RetrieveResponse { query, results }))
}

// =============================================================================
// Uploaded files and saved indexes
// =============================================================================

/// GET /files
pub async fn list_files(State(state): State<AppState>) -> Result<Json<FilesResponse>, ApiError> {
    let files = state.session.lock().await.list_files()?;
    Ok(Json(FilesResponse { files }))
}

/// POST /files/{name}/activate
pub async fn activate_file(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<IngestSummary>, ApiError> {
    let mut session = state.session.lock().await;
    let summary = session.activate_file(&name).await?;
    Ok(Json(summary))
}

/// DELETE /files/{name}
pub async fn delete_file(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<DeleteFileResponse>, ApiError> {
    let session_cleared = state.session.lock().await.delete_file(&name)?;
    Ok(Json(DeleteFileResponse {
        deleted: name,
        session_cleared,
    }))
}

/// GET /indexes
pub async fn list_indexes(
    State(state): State<AppState>,
) -> Result<Json<IndexesResponse>, ApiError> {
    let indexes = state.session.lock().await.list_indexes()?;
    Ok(Json(IndexesResponse { indexes }))
}

/// POST /indexes/{name} - persist the current vector index.
pub async fn save_index(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<IndexResponse>, ApiError> {
    let session = state.session.lock().await;
    let name = session.save_index(&name)?;
    Ok(Json(IndexResponse {
        name,
        chunks: session.status().indexed_chunks,
    }))
}

/// POST /indexes/{name}/load - replace the vector index with a saved one.
pub async fn load_index(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<IndexResponse>, ApiError> {
    let chunks = state.session.lock().await.load_index(&name)?;
    Ok(Json(IndexResponse { name, chunks }))
}
