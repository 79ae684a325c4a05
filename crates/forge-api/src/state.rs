//! Application state shared across all route handlers.
//!
//! AppState holds the single dashboard session. It is passed to handlers
//! via axum's State extractor.

use std::sync::Arc;
use std::time::Instant;

use forge_core::ForgeConfig;
use tokio::sync::Mutex;

use crate::session::Session;

/// Shared application state.
///
/// All fields use `Arc` for cheap cloning across handler tasks. The session
/// mutex serializes user interactions.
#[derive(Clone)]
pub struct AppState {
    /// The dashboard session.
    pub session: Arc<Mutex<Session>>,
    /// Configuration the session was built from.
    pub config: Arc<ForgeConfig>,
    /// Server start time for uptime calculation.
    pub start_time: Instant,
}

impl AppState {
    pub fn new(session: Session) -> Self {
        let config = Arc::new(session.config().clone());
        Self {
            session: Arc::new(Mutex::new(session)),
            config,
            start_time: Instant::now(),
        }
    }
}
