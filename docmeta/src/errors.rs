use crate::storage::StorageError;
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use thiserror::Error as ThisError;
use utoipa::ToSchema;

#[derive(ThisError, Debug)]
pub enum Error {
    /// The request carried no multipart part named `file` with a filename
    #[error("No file part in request")]
    MissingFile,

    /// The `file` part was present but its filename was empty
    #[error("Empty filename received")]
    EmptyFilename,

    /// The filename would resolve outside the upload directory
    #[error("Unsafe filename received: {filename:?}")]
    UnsafeFilename { filename: String },

    /// Malformed request body
    #[error("{message}")]
    BadRequest { message: String },

    /// File payload exceeds the configured limit
    #[error("File exceeds maximum upload size of {limit} bytes")]
    PayloadTooLarge { limit: u64 },

    /// Writing the document to disk failed
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// Generic internal service error
    #[error("Failed to {operation}")]
    Internal { operation: String },
}

/// Body of every error response.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({"error": "file is required"}))]
pub struct ErrorBody {
    pub error: String,
}

impl Error {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Error::MissingFile | Error::EmptyFilename | Error::UnsafeFilename { .. } | Error::BadRequest { .. } => StatusCode::BAD_REQUEST,
            Error::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            Error::Storage(_) | Error::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Returns a user-safe error message, without leaking internal implementation details
    pub fn user_message(&self) -> String {
        match self {
            Error::MissingFile => "file is required".to_string(),
            Error::EmptyFilename => "filename missing".to_string(),
            Error::UnsafeFilename { .. } => "invalid filename".to_string(),
            Error::BadRequest { message } => message.clone(),
            Error::PayloadTooLarge { .. } => "file too large".to_string(),
            Error::Storage(_) | Error::Internal { .. } => "internal server error".to_string(),
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        // This is the single place a failed request gets logged
        match &self {
            Error::MissingFile | Error::EmptyFilename | Error::UnsafeFilename { .. } => {
                tracing::error!("{}", self);
            }
            Error::BadRequest { .. } | Error::PayloadTooLarge { .. } => {
                tracing::warn!("Client error: {}", self);
            }
            Error::Storage(_) | Error::Internal { .. } => {
                tracing::error!("Internal service error: {}", self);
            }
        }

        let body = ErrorBody { error: self.user_message() };
        (self.status_code(), Json(body)).into_response()
    }
}

/// Type alias for service operation results
pub type Result<T> = std::result::Result<T, Error>;
