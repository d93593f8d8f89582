use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::json;
use thiserror::Error;

/// Application-level error type.
/// Implements `IntoResponse` so Axum handlers can return `Result<T, AppError>`.
///
/// Every pipeline failure is terminal for the interaction that raised it.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("No resume file was uploaded")]
    MissingDocument,

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Unsupported file type: {0}. Please upload a PDF")]
    UnsupportedFileType(String),

    #[error("File is too large ({size} bytes). The maximum allowed size is {limit} bytes")]
    DocumentTooLarge { size: usize, limit: usize },

    #[error("Could not read the PDF: {0}")]
    UnreadableDocument(String),

    #[error("No text could be extracted from the PDF (it may be a scanned image)")]
    EmptyDocument,

    #[error("Network error while contacting the completion API: {cause}")]
    Network { cause: String, timed_out: bool },

    #[error("Completion API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Malformed response from the completion API: {0}")]
    MalformedResponse(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

/// Stable classification of an [`AppError`], shared with the presenter and
/// the JSON error envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    MissingDocument,
    ValidationError,
    UnsupportedFileType,
    DocumentTooLarge,
    UnreadableDocument,
    EmptyDocument,
    NetworkError,
    UpstreamApiError,
    MalformedResponse,
    NotFound,
    InternalError,
}

impl ErrorKind {
    pub fn code(self) -> &'static str {
        match self {
            ErrorKind::MissingDocument => "MISSING_DOCUMENT",
            ErrorKind::ValidationError => "VALIDATION_ERROR",
            ErrorKind::UnsupportedFileType => "UNSUPPORTED_FILE_TYPE",
            ErrorKind::DocumentTooLarge => "DOCUMENT_TOO_LARGE",
            ErrorKind::UnreadableDocument => "UNREADABLE_DOCUMENT",
            ErrorKind::EmptyDocument => "EMPTY_DOCUMENT",
            ErrorKind::NetworkError => "NETWORK_ERROR",
            ErrorKind::UpstreamApiError => "UPSTREAM_API_ERROR",
            ErrorKind::MalformedResponse => "MALFORMED_RESPONSE",
            ErrorKind::NotFound => "NOT_FOUND",
            ErrorKind::InternalError => "INTERNAL_ERROR",
        }
    }
}

impl AppError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AppError::MissingDocument => ErrorKind::MissingDocument,
            AppError::Validation(_) => ErrorKind::ValidationError,
            AppError::UnsupportedFileType(_) => ErrorKind::UnsupportedFileType,
            AppError::DocumentTooLarge { .. } => ErrorKind::DocumentTooLarge,
            AppError::UnreadableDocument(_) => ErrorKind::UnreadableDocument,
            AppError::EmptyDocument => ErrorKind::EmptyDocument,
            AppError::Network { .. } => ErrorKind::NetworkError,
            AppError::Api { .. } => ErrorKind::UpstreamApiError,
            AppError::MalformedResponse(_) => ErrorKind::MalformedResponse,
            AppError::NotFound(_) => ErrorKind::NotFound,
            AppError::Internal(_) => ErrorKind::InternalError,
        }
    }

    /// True for errors raised before the completion endpoint is contacted.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            AppError::MissingDocument
                | AppError::Validation(_)
                | AppError::UnsupportedFileType(_)
                | AppError::DocumentTooLarge { .. }
                | AppError::UnreadableDocument(_)
                | AppError::EmptyDocument
        )
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::MissingDocument | AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::UnsupportedFileType(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            AppError::DocumentTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            AppError::UnreadableDocument(_) | AppError::EmptyDocument => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            AppError::Network { timed_out: true, .. } => StatusCode::GATEWAY_TIMEOUT,
            AppError::Network { .. } | AppError::Api { .. } | AppError::MalformedResponse(_) => {
                StatusCode::BAD_GATEWAY
            }
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message shown to the user. Internal errors are not echoed verbatim.
    pub fn user_message(&self) -> String {
        match self {
            AppError::Internal(_) => "An internal server error occurred".to_string(),
            other => other.to_string(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match &self {
            AppError::Network { cause, .. } => tracing::error!("Completion API unreachable: {cause}"),
            AppError::Api { status, message } => {
                tracing::error!("Completion API returned {status}: {message}")
            }
            AppError::MalformedResponse(detail) => {
                tracing::error!("Malformed completion response: {detail}")
            }
            AppError::Internal(e) => tracing::error!("Internal error: {e:?}"),
            _ => {}
        }

        let status = self.status_code();
        let code = self.kind().code();
        let message = self.user_message();

        let body = match &self {
            AppError::Api {
                status: upstream, ..
            } => json!({
                "error": {
                    "code": code,
                    "message": message,
                    "upstream_status": upstream
                }
            }),
            _ => json!({
                "error": {
                    "code": code,
                    "message": message
                }
            }),
        };

        (status, Json(body)).into_response()
    }
}
