//! API error types and JSON error response formatting.
//!
//! ApiError gives every endpoint the same `{error, message, details?}` body
//! and maps session, ingest and model failures to HTTP status codes.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use forge_analysis::AnalysisError;
use forge_core::error::ForgeError;
use forge_loader::IngestError;
use serde::Serialize;

use crate::session::SessionError;

/// JSON error response body.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    /// Machine-readable error code (e.g., "bad_request", "not_found").
    pub error: String,
    /// Human-readable error message.
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

/// API error type that maps to HTTP status codes and JSON responses.
#[derive(Debug)]
pub enum ApiError {
    /// 400 Bad Request - missing or invalid parameters.
    BadRequest(String),
    /// 404 Not Found - unknown sample, file or saved index.
    NotFound(String),
    /// 409 Conflict - no data loaded, or the wrong kind of data.
    Conflict(String),
    /// 413 Payload Too Large - upload over the configured cap.
    PayloadTooLarge { message: String, size: usize, limit: usize },
    /// 415 Unsupported Media Type - file extension not accepted.
    UnsupportedMediaType(String),
    /// 422 Unprocessable Entity - the file or request could not be parsed.
    UnprocessableEntity(String),
    /// 500 Internal Server Error - unexpected server error.
    Internal(String),
    /// 502 Bad Gateway - the model provider failed.
    BadGateway(String),
    /// 503 Service Unavailable - AI analysis or persistence is not configured.
    ServiceUnavailable(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::UnsupportedMediaType(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            ApiError::UnprocessableEntity(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::BadGateway(_) => StatusCode::BAD_GATEWAY,
            ApiError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let (error_code, message, details) = match self {
            ApiError::BadRequest(msg) => ("bad_request", msg, None),
            ApiError::NotFound(msg) => ("not_found", msg, None),
            ApiError::Conflict(msg) => ("conflict", msg, None),
            ApiError::PayloadTooLarge { message, size, limit } => (
                "payload_too_large",
                message,
                Some(serde_json::json!({ "size": size, "limit": limit })),
            ),
            ApiError::UnsupportedMediaType(msg) => ("unsupported_media_type", msg, None),
            ApiError::UnprocessableEntity(msg) => ("unprocessable_entity", msg, None),
            ApiError::Internal(msg) => ("internal_error", msg, None),
            ApiError::BadGateway(msg) => ("bad_gateway", msg, None),
            ApiError::ServiceUnavailable(msg) => ("service_unavailable", msg, None),
        };

        if status.is_server_error() {
            tracing::warn!(status = status.as_u16(), error = %message, "Request failed");
        }

        let body = ErrorBody {
            error: error_code.to_string(),
            message,
            details,
        };

        (status, Json(body)).into_response()
    }
}

impl From<IngestError> for ApiError {
    fn from(err: IngestError) -> Self {
        let message = err.to_string();
        match err {
            IngestError::UnsupportedFormat(_) => ApiError::UnsupportedMediaType(message),
            IngestError::TooLarge { size, limit } => ApiError::PayloadTooLarge {
                message,
                size,
                limit,
            },
            IngestError::NotFound(_) => ApiError::NotFound(message),
            IngestError::InvalidFileName(_) => ApiError::BadRequest(message),
            IngestError::Malformed { .. } | IngestError::Empty(_) => {
                ApiError::UnprocessableEntity(message)
            }
            IngestError::Io(_) => ApiError::Internal(message),
        }
    }
}

impl From<AnalysisError> for ApiError {
    fn from(err: AnalysisError) -> Self {
        let message = err.to_string();
        match err {
            AnalysisError::MissingApiKey => ApiError::ServiceUnavailable(message),
            AnalysisError::EmptyPrompt => ApiError::BadRequest(message),
            AnalysisError::Http(_)
            | AnalysisError::Provider { .. }
            | AnalysisError::MalformedResponse(_) => ApiError::BadGateway(message),
            AnalysisError::Config(_) | AnalysisError::Io(_) => ApiError::Internal(message),
        }
    }
}

impl From<ForgeError> for ApiError {
    fn from(err: ForgeError) -> Self {
        let message = err.to_string();
        match err {
            ForgeError::Config(_) => ApiError::BadRequest(message),
            ForgeError::Ingest(_) => ApiError::UnprocessableEntity(message),
            ForgeError::PayloadTooLarge { size, limit } => ApiError::PayloadTooLarge {
                message,
                size,
                limit,
            },
            ForgeError::DimensionMismatch { .. } => ApiError::Conflict(message),
            _ => ApiError::Internal(message),
        }
    }
}

impl From<SessionError> for ApiError {
    fn from(err: SessionError) -> Self {
        match err {
            SessionError::NoDataLoaded
            | SessionError::NotTabular(_)
            | SessionError::EmbedderMismatch { .. } => ApiError::Conflict(err.to_string()),
            SessionError::AnalysisDisabled | SessionError::StorageUnavailable => {
                ApiError::ServiceUnavailable(err.to_string())
            }
            SessionError::UnknownSample(_) | SessionError::IndexNotFound(_) => {
                ApiError::NotFound(err.to_string())
            }
            SessionError::Ingest(e) => e.into(),
            SessionError::Analysis(e) => e.into(),
            SessionError::Viz(e) => ApiError::UnprocessableEntity(e.to_string()),
            SessionError::Forge(e) => e.into(),
        }
    }
}
