//! Router setup with all API routes and middleware.
//!
//! Configures the axum Router with CORS, tracing, compression, the upload
//! body limit and all endpoint handlers.

use axum::extract::DefaultBodyLimit;
use axum::http::{header, HeaderValue, Method};
use axum::routing::{get, post, put};
use axum::Router;
use forge_core::error::ForgeError;
use forge_core::ForgeConfig;
use tower_http::compression::CompressionLayer;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::handlers;
use crate::state::AppState;

/// Localhost origins on the dashboard port and the port after it.
fn allowed_origins(port: u16) -> Vec<HeaderValue> {
    let dev_port = port.saturating_add(1);
    [port, dev_port]
        .into_iter()
        .flat_map(|p| [format!("http://127.0.0.1:{}", p), format!("http://localhost:{}", p)])
        .filter_map(|origin| HeaderValue::from_str(&origin).ok())
        .collect()
}

/// Create the axum Router with all routes and middleware.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::list(allowed_origins(state.config.general.port)))
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::CONTENT_TYPE, header::ACCEPT]);

    let body_limit = state.config.upload.max_upload_bytes();

    Router::new()
        .route("/health", get(handlers::health))
        .route(
            "/session",
            get(handlers::session_status).delete(handlers::clear_session),
        )
        .route("/settings/api-key", put(handlers::set_api_key))
        .route("/settings/api-key/test", post(handlers::test_connection))
        // Ingestion
        .route("/upload", post(handlers::upload))
        .route("/images/analyze", post(handlers::analyze_image))
        .route("/samples/{name}", post(handlers::load_sample))
        // Dataset and dashboard
        .route("/dataset/profile", get(handlers::dataset_profile))
        .route("/dataset/preview", get(handlers::dataset_preview))
        .route("/dashboard/kpis", get(handlers::dashboard_kpis))
        .route("/dashboard/charts", get(handlers::dashboard_charts))
        .route("/charts", post(handlers::create_chart))
        .route("/charts/suggestions", post(handlers::chart_suggestions))
        // Analysis and chat
        .route("/analysis", post(handlers::run_analysis))
        .route("/analysis/latest", get(handlers::latest_analysis))
        .route("/ask", post(handlers::ask))
        .route("/chat", post(handlers::chat))
        .route(
            "/chat/history",
            get(handlers::chat_history).delete(handlers::clear_chat),
        )
        .route("/retrieve", get(handlers::retrieve))
        // Uploaded files and saved indexes
        .route("/files", get(handlers::list_files))
        .route("/files/{name}", axum::routing::delete(handlers::delete_file))
        .route("/files/{name}/activate", post(handlers::activate_file))
        .route("/indexes", get(handlers::list_indexes))
        .route("/indexes/{name}", post(handlers::save_index))
        .route("/indexes/{name}/load", post(handlers::load_index))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Start the HTTP server on the configured address.
///
/// Binds to 127.0.0.1 (localhost only) on the port from config.
pub async fn start_server(config: &ForgeConfig, state: AppState) -> Result<(), ForgeError> {
    let addr = format!("127.0.0.1:{}", config.general.port);

    let router = create_router(state);

    tracing::info!(%addr, "Starting dashboard server");

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| ForgeError::Config(format!("Failed to bind {}: {}", addr, e)))?;

    axum::serve(listener, router).await?;

    Ok(())
}
