use forge_core::error::ForgeError;

/// Errors from chart builders.
#[derive(Debug, thiserror::Error)]
pub enum VizError {
    #[error("unknown column: {0}")]
    UnknownColumn(String),
    #[error("column '{0}' is not numeric")]
    NotNumeric(String),
    #[error("invalid chart request: {0}")]
    InvalidRequest(String),
}

impl From<VizError> for ForgeError {
    fn from(err: VizError) -> Self {
        ForgeError::Analysis(err.to_string())
    }
}
