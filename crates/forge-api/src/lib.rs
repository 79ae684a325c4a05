//! InsightForge API crate - the dashboard session, axum server and route
//! handlers.
//!
//! Exposes uploads, sample datasets, profiling, charts, KPI cards, AI
//! analysis, RAG question answering, chat history and saved vector indexes
//! over a localhost JSON API.

pub mod error;
pub mod handlers;
pub mod routes;
pub mod session;
pub mod state;

pub use error::ApiError;
pub use routes::{create_router, start_server};
pub use session::{Session, SessionError, SessionStatus};
pub use state::AppState;
