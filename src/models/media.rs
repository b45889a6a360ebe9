//! Represents a durable gallery item backed by the media host.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use sqlx::types::Json;
use uuid::Uuid;

/// Broad media category, derived from the MIME prefix of the uploaded file.
#[derive(Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Debug, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum MediaType {
    Photo,
    Video,
}

impl MediaType {
    /// Classify a MIME type string. Anything that is not `video/*` is
    /// treated as a photo, matching how the gallery renders unknown types.
    pub fn from_mime(mime: &str) -> Self {
        if mime.starts_with("video/") {
            MediaType::Video
        } else {
            MediaType::Photo
        }
    }
}

/// A single gallery entry.
///
/// The row stores metadata only; the payload lives with the media host and is
/// addressed through `url`/`public_id`. `size_bytes` and `media_type` always
/// describe the final assembled artifact, never an individual chunk.
#[derive(Serialize, Deserialize, Clone, FromRow, Debug)]
#[serde(rename_all = "camelCase")]
pub struct MediaItem {
    /// Internal UUID for DB indexing.
    pub id: Uuid,

    /// Stored (unique) filename at the media host.
    pub filename: String,

    /// Filename as the guest uploaded it.
    pub original_name: String,

    /// Durable location of the payload.
    pub url: String,

    /// Identifier assigned by the media host.
    pub public_id: String,

    /// Photo or video, from the MIME prefix.
    pub media_type: MediaType,

    /// Size of the assembled file in bytes.
    pub size_bytes: i64,

    /// Display name of the guest who uploaded it.
    pub uploaded_by: String,

    /// Optional free-text caption.
    pub caption: String,

    /// Optional tags, stored as a JSON array.
    pub tags: Json<Vec<String>>,

    /// Whether the item shows up in the public gallery.
    pub is_public: bool,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mime_prefix_selects_media_type() {
        assert_eq!(MediaType::from_mime("video/mp4"), MediaType::Video);
        assert_eq!(MediaType::from_mime("video/webm"), MediaType::Video);
        assert_eq!(MediaType::from_mime("image/jpeg"), MediaType::Photo);
        assert_eq!(MediaType::from_mime("image/png"), MediaType::Photo);
    }

    #[test]
    fn unknown_mime_defaults_to_photo() {
        assert_eq!(MediaType::from_mime("application/pdf"), MediaType::Photo);
    }
}
