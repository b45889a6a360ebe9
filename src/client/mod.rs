//! Client half of the upload pipeline.
//!
//! Mirrors what the gallery front end does before bytes ever reach the
//! server: best-effort image compression, the direct-vs-chunked routing
//! decision, and the chunk splitter/sender with its retry and pacing rules.

pub mod chunked;
pub mod compression;
pub mod uploader;

use thiserror::Error;

/// Client-side upload failures, classified the way the UI surfaces them.
#[derive(Debug, Error)]
pub enum UploadError {
    /// The platform's request-body ceiling (HTTP 413). Actionable guidance
    /// rather than a bare status code.
    #[error(
        "Upload too large! Try uploading fewer photos or videos at once or use a lower quality setting."
    )]
    PayloadTooLarge,

    /// A request did not complete within its timeout.
    #[error("Upload timed out. Please try again.")]
    Timeout,

    /// Any other non-2xx response.
    #[error("Upload failed with status {0}. Please try again.")]
    Status(u16),

    /// A 4xx the server will never accept on retry.
    #[error("upload rejected: {0}")]
    Rejected(String),

    /// One chunk exhausted its retry budget; the file upload is abandoned.
    #[error("chunk {index} upload failed after {attempts} attempts: {reason}")]
    ChunkExhausted {
        index: usize,
        attempts: u32,
        reason: String,
    },

    /// The assembly call failed; no gallery item was created.
    #[error("assembly failed: {0}")]
    Assembly(String),

    #[error("unexpected response: {0}")]
    BadResponse(String),

    #[error(transparent)]
    Http(reqwest::Error),
}

impl From<reqwest::Error> for UploadError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            UploadError::Timeout
        } else {
            UploadError::Http(err)
        }
    }
}
