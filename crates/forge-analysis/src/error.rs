//! Error types for the analysis engine.

use forge_core::error::ForgeError;

/// Errors from prompt submission and response handling.
#[derive(Debug, thiserror::Error)]
pub enum AnalysisError {
    #[error("no API key configured; set llm.api_key or OPENAI_API_KEY")]
    MissingApiKey,
    #[error("prompt cannot be empty")]
    EmptyPrompt,
    #[error("http error: {0}")]
    Http(String),
    #[error("provider returned status {status}: {body}")]
    Provider { status: u16, body: String },
    #[error("malformed response: {0}")]
    MalformedResponse(String),
    #[error("configuration error: {0}")]
    Config(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<reqwest::Error> for AnalysisError {
    fn from(err: reqwest::Error) -> Self {
        AnalysisError::Http(err.to_string())
    }
}

impl From<regex::Error> for AnalysisError {
    fn from(err: regex::Error) -> Self {
        AnalysisError::Config(err.to_string())
    }
}

impl From<AnalysisError> for ForgeError {
    fn from(err: AnalysisError) -> Self {
        match err {
            AnalysisError::Io(e) => ForgeError::Io(e),
            other => ForgeError::Analysis(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_analysis_error_display() {
        assert_eq!(
            AnalysisError::MissingApiKey.to_string(),
            "no API key configured; set llm.api_key or OPENAI_API_KEY"
        );
        assert_eq!(AnalysisError::EmptyPrompt.to_string(), "prompt cannot be empty");

        let err = AnalysisError::Provider {
            status: 429,
            body: "rate limited".into(),
        };
        assert_eq!(err.to_string(), "provider returned status 429: rate limited");
    }

    #[test]
    fn test_into_forge_error() {
        let err: ForgeError = AnalysisError::Http("connection refused".into()).into();
        assert!(matches!(err, ForgeError::Analysis(ref m) if m.contains("connection refused")));

        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: ForgeError = AnalysisError::Io(io).into();
        assert!(matches!(err, ForgeError::Io(_)));
    }
}
