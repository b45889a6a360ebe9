//! Represents an upload session minted before a chunked transfer begins.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// A server-minted identity for one logical file's chunked upload.
///
/// Ties the chunk set and the assembly call together so chunks from
/// different uploads cannot be mixed. Sessions are optional on the wire:
/// a caller may still assemble by chunk-id list alone.
#[derive(Serialize, Deserialize, Clone, FromRow, Debug)]
pub struct UploadSession {
    /// Unique session ID (returned to the client as `uploadId`).
    pub id: Uuid,

    /// Name of the file being uploaded.
    pub file_name: String,

    /// MIME type of the file being uploaded.
    pub file_type: String,

    /// Expected chunk count for the file.
    pub total_chunks: i64,

    /// Whether assembly completed successfully.
    pub completed: bool,

    pub created_at: DateTime<Utc>,
}
