use crate::services::media_service::GalleryError;
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use std::fmt;

/// A lightweight wrapper for general errors that keeps the message local.
///
/// Every failure crossing the HTTP boundary is rendered as the structured
/// `{"success": false, "error": ...}` envelope rather than thrown.
#[derive(Debug)]
pub struct AppError {
    pub status: StatusCode,
    pub message: String,
}

impl AppError {
    /// Create a new AppError with a specific status and message.
    pub fn new(status: StatusCode, msg: impl Into<String>) -> Self {
        Self {
            status,
            message: msg.into(),
        }
    }

    /// Shortcut for a 500 Internal Server Error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, msg)
    }

    /// Shortcut for 400 Bad Request
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, msg)
    }

    /// Shortcut for 404 Not Found
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, msg)
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for AppError {}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = Json(json!({
            "success": false,
            "error": self.message,
        }));

        (self.status, body).into_response()
    }
}

impl From<GalleryError> for AppError {
    fn from(err: GalleryError) -> Self {
        let status = match &err {
            GalleryError::MissingChunkPayload
            | GalleryError::EmptyChunkList
            | GalleryError::InvalidChunkIndex { .. }
            | GalleryError::NoFilesProvided
            | GalleryError::TooManyFiles { .. }
            | GalleryError::UnsupportedFileType(_)
            | GalleryError::FileTooLarge { .. }
            | GalleryError::IncompleteSession { .. } => StatusCode::BAD_REQUEST,
            GalleryError::MediaNotFound(_) | GalleryError::SessionNotFound(_) => {
                StatusCode::NOT_FOUND
            }
            // Missing chunks surface as a server error; the usual cause is
            // expiry, not a bad request.
            GalleryError::MissingChunks(_)
            | GalleryError::Host(_)
            | GalleryError::Sqlx(_)
            | GalleryError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        AppError::new(status, err.to_string())
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::internal(err.to_string())
    }
}
