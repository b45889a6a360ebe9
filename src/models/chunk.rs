//! Represents a transient upload chunk awaiting assembly.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Lifecycle of a stored chunk.
///
/// A chunk is written as `Pending`, becomes `Consumed` when an assembly picks
/// it up, or `Expired` once the retention window has elapsed. Both terminal
/// states end in row deletion; the tag exists so the expiry-vs-assembly race
/// stays observable in the store rather than implicit.
#[derive(Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Debug, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum ChunkState {
    Pending,
    Consumed,
    Expired,
}

impl ChunkState {
    /// Whether a transition to `next` is allowed. Only `Pending` chunks may
    /// move; `Consumed` and `Expired` are terminal.
    pub fn can_become(self, next: ChunkState) -> bool {
        matches!(
            (self, next),
            (ChunkState::Pending, ChunkState::Consumed)
                | (ChunkState::Pending, ChunkState::Expired)
        )
    }
}

/// One bounded-size byte range of a larger file, stored independently.
///
/// `chunk_id` has the form `<uuid>_<index>`; the embedded index is for
/// debuggability only — `chunk_index` is the authoritative ordering field.
#[derive(Serialize, Deserialize, Clone, FromRow, Debug)]
pub struct StoredChunk {
    pub chunk_id: String,

    /// Upload session this chunk belongs to, when the client opened one.
    pub session_id: Option<Uuid>,

    /// 0-based position within the logical file.
    pub chunk_index: i64,

    /// Expected final chunk count for the file.
    pub total_chunks: i64,

    pub file_name: String,

    /// MIME type of the logical file.
    pub file_type: String,

    /// Raw chunk payload.
    pub data: Vec<u8>,

    pub size_bytes: i64,

    pub state: ChunkState,

    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pending_may_be_consumed_or_expired() {
        assert!(ChunkState::Pending.can_become(ChunkState::Consumed));
        assert!(ChunkState::Pending.can_become(ChunkState::Expired));
    }

    #[test]
    fn terminal_states_do_not_move() {
        assert!(!ChunkState::Consumed.can_become(ChunkState::Expired));
        assert!(!ChunkState::Consumed.can_become(ChunkState::Pending));
        assert!(!ChunkState::Expired.can_become(ChunkState::Consumed));
        assert!(!ChunkState::Expired.can_become(ChunkState::Pending));
    }
}
