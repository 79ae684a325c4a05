//! Error types for file ingestion.

use forge_core::error::ForgeError;

/// Errors raised while storing or parsing an uploaded file.
///
/// Every variant is user-facing: the shell reports it and aborts ingestion
/// for that file only.
#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("unsupported file type: '{0}'")]
    UnsupportedFormat(String),
    #[error("malformed {format} file: {reason}")]
    Malformed { format: String, reason: String },
    #[error("file '{0}' is empty")]
    Empty(String),
    #[error("file is {size} bytes, limit is {limit} bytes")]
    TooLarge { size: usize, limit: usize },
    #[error("invalid file name: '{0}'")]
    InvalidFileName(String),
    #[error("file not found: '{0}'")]
    NotFound(String),
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

impl IngestError {
    pub(crate) fn malformed(format: &str, reason: impl std::fmt::Display) -> Self {
        IngestError::Malformed {
            format: format.to_string(),
            reason: reason.to_string(),
        }
    }
}

impl From<IngestError> for ForgeError {
    fn from(err: IngestError) -> Self {
        match err {
            IngestError::TooLarge { size, limit } => ForgeError::PayloadTooLarge { size, limit },
            IngestError::Io(e) => ForgeError::Io(e),
            other => ForgeError::Ingest(other.to_string()),
        }
    }
}

impl From<ForgeError> for IngestError {
    fn from(err: ForgeError) -> Self {
        match err {
            ForgeError::Io(e) => IngestError::Io(e),
            other => IngestError::malformed("tabular", other),
        }
    }
}
