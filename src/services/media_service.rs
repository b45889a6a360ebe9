//! src/services/media_service.rs
//!
//! MediaService — gallery operations backed by SQLite for metadata and
//! transient chunk storage, with assembled payloads handed off to a
//! `MediaHost`. Covers the server half of the chunked upload pipeline
//! (chunk store, assembler, expiry backstop) plus the direct upload path
//! and gallery CRUD.

use crate::models::{
    chunk::{ChunkState, StoredChunk},
    media::{MediaItem, MediaType},
    session::UploadSession,
};
use crate::services::media_host::{HostError, MediaHost};
use bytes::{BufMut, Bytes, BytesMut};
use chrono::{DateTime, Duration, Utc};
use sqlx::{QueryBuilder, SqlitePool, sqlite::Sqlite, types::Json};
use std::{collections::HashSet, io, sync::Arc};
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Most files a single direct upload request may carry.
pub const MAX_FILES_PER_UPLOAD: usize = 10;
/// Per-file ceiling for images on the direct path.
pub const MAX_IMAGE_BYTES: usize = 10 * 1024 * 1024;
/// Per-file ceiling for videos on the direct path.
pub const MAX_VIDEO_BYTES: usize = 100 * 1024 * 1024;
/// MIME types guests are allowed to upload.
pub const ALLOWED_TYPES: [&str; 6] = [
    "image/jpeg",
    "image/png",
    "image/gif",
    "image/webp",
    "video/mp4",
    "video/webm",
];

#[derive(Debug, Error)]
pub enum GalleryError {
    #[error("no chunk provided")]
    MissingChunkPayload,
    #[error("no chunk IDs provided")]
    EmptyChunkList,
    #[error("chunk index {index} out of range for {total} chunks")]
    InvalidChunkIndex { index: i64, total: i64 },
    #[error("missing chunks: {}", .0.join(", "))]
    MissingChunks(Vec<String>),
    #[error("no files provided")]
    NoFilesProvided,
    #[error("maximum {max} files allowed per upload, got {count}")]
    TooManyFiles { count: usize, max: usize },
    #[error("file type `{0}` not supported")]
    UnsupportedFileType(String),
    #[error("file `{name}` is {size} bytes, limit is {limit}")]
    FileTooLarge { name: String, size: usize, limit: usize },
    #[error("upload session `{0}` not found")]
    SessionNotFound(Uuid),
    #[error("upload session expects {expected} chunks, got {got}")]
    IncompleteSession { expected: i64, got: usize },
    #[error("media item `{0}` not found")]
    MediaNotFound(String),
    #[error(transparent)]
    Host(#[from] HostError),
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type GalleryResult<T> = Result<T, GalleryError>;

/// One chunk arriving at the store.
#[derive(Debug)]
pub struct StoreChunkRequest {
    pub session_id: Option<Uuid>,
    pub chunk_index: i64,
    pub total_chunks: i64,
    pub file_name: String,
    pub file_type: String,
    pub data: Bytes,
}

/// One logical file ready to be assembled from its stored chunks.
#[derive(Debug)]
pub struct AssembleRequest {
    pub chunk_ids: Vec<String>,
    pub file_name: String,
    pub file_type: String,
    pub uploaded_by: Option<String>,
    pub caption: Option<String>,
    pub session_id: Option<Uuid>,
}

/// One file on the direct (non-chunked) upload path.
#[derive(Debug)]
pub struct DirectFile {
    pub file_name: String,
    pub file_type: String,
    pub data: Bytes,
}

/// Mutable fields of a gallery item.
#[derive(Debug, Default)]
pub struct MediaUpdate {
    pub caption: Option<String>,
    pub tags: Option<Vec<String>>,
    pub is_public: Option<bool>,
}

#[derive(Clone, Debug)]
pub struct ListMediaParams {
    /// Newest-first page size, clamped to 1..=500.
    pub limit: usize,
    /// Return items strictly older than this instant.
    pub before: Option<DateTime<Utc>>,
}

#[derive(Debug)]
pub struct ListMediaResult {
    pub items: Vec<MediaItem>,
    /// Cursor for the next page, when one exists.
    pub next_before: Option<DateTime<Utc>>,
}

/// MediaService provides the gallery's storage operations:
/// - Accept chunks one at a time and hold them until assembly or expiry
/// - Assemble a chunk set into exactly one hosted MediaItem
/// - Direct (single-request) uploads for small batches
/// - List/get/update/delete gallery items
#[derive(Clone)]
pub struct MediaService {
    /// Shared SQLite connection pool used for metadata and chunk rows.
    pub db: Arc<SqlitePool>,

    /// Durable backend for assembled payloads.
    pub host: Arc<dyn MediaHost>,

    /// How long an unconsumed chunk stays readable.
    retention: Duration,
}

impl MediaService {
    pub fn new(db: Arc<SqlitePool>, host: Arc<dyn MediaHost>, retention_secs: u64) -> Self {
        Self {
            db,
            host,
            retention: Duration::seconds(retention_secs as i64),
        }
    }

    // --- Upload sessions -------------------------------------------------

    /// Mint a session tying one logical file's chunks and assembly together.
    pub async fn create_session(
        &self,
        file_name: String,
        file_type: String,
        total_chunks: i64,
    ) -> GalleryResult<UploadSession> {
        if total_chunks < 1 {
            return Err(GalleryError::InvalidChunkIndex {
                index: 0,
                total: total_chunks,
            });
        }
        let session = UploadSession {
            id: Uuid::new_v4(),
            file_name,
            file_type,
            total_chunks,
            completed: false,
            created_at: Utc::now(),
        };
        sqlx::query(
            "INSERT INTO upload_sessions (id, file_name, file_type, total_chunks, completed, created_at)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(session.id)
        .bind(&session.file_name)
        .bind(&session.file_type)
        .bind(session.total_chunks)
        .bind(session.completed)
        .bind(session.created_at)
        .execute(&*self.db)
        .await?;
        Ok(session)
    }

    async fn fetch_session(&self, id: Uuid) -> GalleryResult<UploadSession> {
        sqlx::query_as::<_, UploadSession>(
            "SELECT id, file_name, file_type, total_chunks, completed, created_at
             FROM upload_sessions WHERE id = ?",
        )
        .bind(id)
        .fetch_one(&*self.db)
        .await
        .map_err(|err| match err {
            sqlx::Error::RowNotFound => GalleryError::SessionNotFound(id),
            other => GalleryError::Sqlx(other),
        })
    }

    // --- Chunk store -----------------------------------------------------

    /// Persist one chunk. No ordering or completeness check happens here;
    /// a chunk knows nothing about its siblings' status.
    pub async fn store_chunk(&self, req: StoreChunkRequest) -> GalleryResult<String> {
        if req.data.is_empty() {
            return Err(GalleryError::MissingChunkPayload);
        }
        if req.chunk_index < 0 || req.chunk_index >= req.total_chunks {
            return Err(GalleryError::InvalidChunkIndex {
                index: req.chunk_index,
                total: req.total_chunks,
            });
        }
        if let Some(session_id) = req.session_id {
            self.fetch_session(session_id).await?;
        }

        // Index embedded for debuggability; `chunk_index` stays authoritative.
        let chunk_id = format!("{}_{}", Uuid::new_v4(), req.chunk_index);
        let size = req.data.len() as i64;

        sqlx::query(
            "INSERT INTO chunks (chunk_id, session_id, chunk_index, total_chunks,
                                 file_name, file_type, data, size_bytes, state, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&chunk_id)
        .bind(req.session_id)
        .bind(req.chunk_index)
        .bind(req.total_chunks)
        .bind(&req.file_name)
        .bind(&req.file_type)
        .bind(req.data.as_ref())
        .bind(size)
        .bind(ChunkState::Pending)
        .bind(Utc::now())
        .execute(&*self.db)
        .await?;

        debug!(
            "stored chunk {} ({}/{}) for `{}`, {} bytes",
            chunk_id,
            req.chunk_index + 1,
            req.total_chunks,
            req.file_name,
            size
        );
        Ok(chunk_id)
    }

    /// Fetch the pending, unexpired chunks whose id is in `ids`.
    async fn fetch_pending_chunks(
        &self,
        ids: &[String],
        now: DateTime<Utc>,
    ) -> GalleryResult<Vec<StoredChunk>> {
        let cutoff = now - self.retention;
        let mut builder = QueryBuilder::<Sqlite>::new(
            "SELECT chunk_id, session_id, chunk_index, total_chunks, file_name, file_type, \
             data, size_bytes, state, created_at \
             FROM chunks WHERE state = ",
        );
        builder.push_bind(ChunkState::Pending);
        builder.push(" AND created_at > ");
        builder.push_bind(cutoff);
        builder.push(" AND chunk_id IN (");
        let mut ids_list = builder.separated(", ");
        for id in ids {
            ids_list.push_bind(id);
        }
        builder.push(")");

        Ok(builder.build_query_as().fetch_all(&*self.db).await?)
    }

    /// Mark a consumed (or stale) chunk set and remove the rows.
    async fn discard_chunks(&self, ids: &[String], next: ChunkState) -> GalleryResult<u64> {
        debug_assert!(ChunkState::Pending.can_become(next));
        let mut update = QueryBuilder::<Sqlite>::new("UPDATE chunks SET state = ");
        update.push_bind(next);
        update.push(" WHERE state = ");
        update.push_bind(ChunkState::Pending);
        update.push(" AND chunk_id IN (");
        let mut ids_list = update.separated(", ");
        for id in ids {
            ids_list.push_bind(id);
        }
        update.push(")");
        update.build().execute(&*self.db).await?;

        let mut delete = QueryBuilder::<Sqlite>::new("DELETE FROM chunks WHERE state = ");
        delete.push_bind(next);
        delete.push(" AND chunk_id IN (");
        let mut ids_list = delete.separated(", ");
        for id in ids {
            ids_list.push_bind(id);
        }
        delete.push(")");
        let result = delete.build().execute(&*self.db).await?;
        Ok(result.rows_affected())
    }

    /// Expiry backstop: structurally remove pending chunks older than the
    /// retention window. Returns the number of rows removed.
    pub async fn sweep_expired(&self, now: DateTime<Utc>) -> GalleryResult<u64> {
        let cutoff = now - self.retention;
        sqlx::query("UPDATE chunks SET state = ? WHERE state = ? AND created_at <= ?")
            .bind(ChunkState::Expired)
            .bind(ChunkState::Pending)
            .bind(cutoff)
            .execute(&*self.db)
            .await?;
        let result = sqlx::query("DELETE FROM chunks WHERE state = ?")
            .bind(ChunkState::Expired)
            .execute(&*self.db)
            .await?;
        let removed = result.rows_affected();
        if removed > 0 {
            info!("expired {} abandoned chunk(s)", removed);
        }
        Ok(removed)
    }

    // --- Assembler -------------------------------------------------------

    /// Assemble a chunk set into exactly one hosted MediaItem.
    pub async fn assemble(&self, req: AssembleRequest) -> GalleryResult<MediaItem> {
        self.assemble_at(req, Utc::now()).await
    }

    /// Assembly with an explicit clock, so expiry is testable.
    pub async fn assemble_at(
        &self,
        req: AssembleRequest,
        now: DateTime<Utc>,
    ) -> GalleryResult<MediaItem> {
        if req.chunk_ids.is_empty() {
            return Err(GalleryError::EmptyChunkList);
        }
        if let Some(session_id) = req.session_id {
            let session = self.fetch_session(session_id).await?;
            if req.chunk_ids.len() as i64 != session.total_chunks {
                return Err(GalleryError::IncompleteSession {
                    expected: session.total_chunks,
                    got: req.chunk_ids.len(),
                });
            }
        }

        // Step 1 — fetch; report the exact missing ids on any shortfall and
        // touch nothing else.
        let mut chunks = self.fetch_pending_chunks(&req.chunk_ids, now).await?;
        if chunks.len() != req.chunk_ids.len() {
            let found: HashSet<&str> = chunks.iter().map(|c| c.chunk_id.as_str()).collect();
            let missing = req
                .chunk_ids
                .iter()
                .filter(|id| !found.contains(id.as_str()))
                .cloned()
                .collect::<Vec<_>>();
            return Err(GalleryError::MissingChunks(missing));
        }
        if let Some(session_id) = req.session_id {
            if chunks.iter().any(|c| c.session_id != Some(session_id)) {
                return Err(GalleryError::SessionNotFound(session_id));
            }
        }

        // Step 2 — order by the stored index, not arrival or request order.
        chunks.sort_by_key(|c| c.chunk_index);

        // Step 3 — concatenate into a single buffer.
        let total: usize = chunks.iter().map(|c| c.data.len()).sum();
        let mut assembled = BytesMut::with_capacity(total);
        for chunk in &chunks {
            assembled.put_slice(&chunk.data);
        }
        let assembled = assembled.freeze();
        info!(
            "assembled `{}` from {} chunk(s), {} bytes",
            req.file_name,
            chunks.len(),
            assembled.len()
        );

        // Step 4 — hand off to the media host under a fresh unique name. On
        // rejection nothing is created or cleaned up; expiry handles the rest.
        let media_type = MediaType::from_mime(&req.file_type);
        let unique_name = format!("{}_{}", Uuid::new_v4(), sanitize_filename(&req.file_name));
        let size_bytes = assembled.len() as i64;
        let hosted = self.host.store(&unique_name, media_type, assembled).await?;

        // Step 5 — record exactly one MediaItem for the assembled artifact.
        let item = self
            .insert_media_item(
                unique_name,
                req.file_name,
                hosted.url,
                hosted.public_id,
                media_type,
                size_bytes,
                req.uploaded_by,
                req.caption,
            )
            .await?;

        // Step 6 — best-effort cleanup of the consumed chunks.
        if let Err(err) = self.discard_chunks(&req.chunk_ids, ChunkState::Consumed).await {
            warn!("failed to clean up consumed chunks: {}", err);
        }
        if let Some(session_id) = req.session_id {
            if let Err(err) = sqlx::query("UPDATE upload_sessions SET completed = 1 WHERE id = ?")
                .bind(session_id)
                .execute(&*self.db)
                .await
            {
                warn!("failed to mark session {} completed: {}", session_id, err);
            }
        }

        Ok(item)
    }

    // --- Direct upload ---------------------------------------------------

    /// Single-request upload of one or more small files. All files are
    /// validated up front; a host failure mid-batch rolls back the items
    /// created so far, keeping the request all-or-nothing.
    pub async fn direct_upload(
        &self,
        files: Vec<DirectFile>,
        uploaded_by: Option<String>,
        caption: Option<String>,
    ) -> GalleryResult<Vec<MediaItem>> {
        validate_direct_batch(&files)?;

        let mut created: Vec<MediaItem> = Vec::with_capacity(files.len());
        for file in files {
            let media_type = MediaType::from_mime(&file.file_type);
            let unique_name =
                format!("{}_{}", Uuid::new_v4(), sanitize_filename(&file.file_name));
            let size_bytes = file.data.len() as i64;

            let result = async {
                let hosted = self.host.store(&unique_name, media_type, file.data).await?;
                self.insert_media_item(
                    unique_name.clone(),
                    file.file_name.clone(),
                    hosted.url,
                    hosted.public_id,
                    media_type,
                    size_bytes,
                    uploaded_by.clone(),
                    caption.clone(),
                )
                .await
            }
            .await;

            match result {
                Ok(item) => created.push(item),
                Err(err) => {
                    self.rollback_created(&created).await;
                    return Err(err);
                }
            }
        }
        Ok(created)
    }

    async fn rollback_created(&self, items: &[MediaItem]) {
        for item in items {
            if let Err(err) = sqlx::query("DELETE FROM media_items WHERE id = ?")
                .bind(item.id)
                .execute(&*self.db)
                .await
            {
                warn!("rollback: failed to delete media row {}: {}", item.id, err);
            }
            if let Err(err) = self.host.delete(&item.public_id).await {
                warn!(
                    "rollback: failed to delete hosted payload {}: {}",
                    item.public_id, err
                );
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn insert_media_item(
        &self,
        filename: String,
        original_name: String,
        url: String,
        public_id: String,
        media_type: MediaType,
        size_bytes: i64,
        uploaded_by: Option<String>,
        caption: Option<String>,
    ) -> GalleryResult<MediaItem> {
        let uploaded_by = match uploaded_by {
            Some(name) if !name.trim().is_empty() => name,
            _ => "guest".to_string(),
        };
        let now = Utc::now();

        let item = sqlx::query_as::<_, MediaItem>(
            r#"
            INSERT INTO media_items (
                id, filename, original_name, url, public_id, media_type,
                size_bytes, uploaded_by, caption, tags, is_public, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 1, ?, ?)
            RETURNING id, filename, original_name, url, public_id, media_type,
                      size_bytes, uploaded_by, caption, tags, is_public, created_at, updated_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&filename)
        .bind(&original_name)
        .bind(&url)
        .bind(&public_id)
        .bind(media_type)
        .bind(size_bytes)
        .bind(&uploaded_by)
        .bind(caption.unwrap_or_default())
        .bind(Json(Vec::<String>::new()))
        .bind(now)
        .bind(now)
        .fetch_one(&*self.db)
        .await?;
        Ok(item)
    }

    // --- Gallery CRUD ----------------------------------------------------

    /// Public gallery items, newest first, keyset-paginated on `created_at`.
    pub async fn list_media(&self, params: ListMediaParams) -> GalleryResult<ListMediaResult> {
        let limit = params.limit.clamp(1, 500);
        let fetch_limit = limit + 1;

        let mut builder = QueryBuilder::<Sqlite>::new(
            "SELECT id, filename, original_name, url, public_id, media_type, size_bytes, \
             uploaded_by, caption, tags, is_public, created_at, updated_at \
             FROM media_items WHERE is_public = 1",
        );
        if let Some(before) = params.before {
            builder.push(" AND created_at < ");
            builder.push_bind(before);
        }
        builder.push(" ORDER BY created_at DESC LIMIT ");
        builder.push_bind(fetch_limit as i64);

        let mut items: Vec<MediaItem> = builder.build_query_as().fetch_all(&*self.db).await?;

        let mut next_before = None;
        if items.len() == fetch_limit {
            items.pop();
            next_before = items.last().map(|item| item.created_at);
        }
        Ok(ListMediaResult { items, next_before })
    }

    pub async fn get_media(&self, id: Uuid) -> GalleryResult<MediaItem> {
        sqlx::query_as::<_, MediaItem>(
            "SELECT id, filename, original_name, url, public_id, media_type, size_bytes,
                    uploaded_by, caption, tags, is_public, created_at, updated_at
             FROM media_items WHERE id = ?",
        )
        .bind(id)
        .fetch_one(&*self.db)
        .await
        .map_err(|err| match err {
            sqlx::Error::RowNotFound => GalleryError::MediaNotFound(id.to_string()),
            other => GalleryError::Sqlx(other),
        })
    }

    pub async fn get_media_by_public_id(&self, public_id: &str) -> GalleryResult<MediaItem> {
        sqlx::query_as::<_, MediaItem>(
            "SELECT id, filename, original_name, url, public_id, media_type, size_bytes,
                    uploaded_by, caption, tags, is_public, created_at, updated_at
             FROM media_items WHERE public_id = ?",
        )
        .bind(public_id)
        .fetch_one(&*self.db)
        .await
        .map_err(|err| match err {
            sqlx::Error::RowNotFound => GalleryError::MediaNotFound(public_id.to_string()),
            other => GalleryError::Sqlx(other),
        })
    }

    pub async fn update_media(&self, id: Uuid, update: MediaUpdate) -> GalleryResult<MediaItem> {
        let current = self.get_media(id).await?;
        let caption = update.caption.unwrap_or(current.caption);
        let tags = update.tags.map(Json).unwrap_or(current.tags);
        let is_public = update.is_public.unwrap_or(current.is_public);

        let item = sqlx::query_as::<_, MediaItem>(
            "UPDATE media_items SET caption = ?, tags = ?, is_public = ?, updated_at = ?
             WHERE id = ?
             RETURNING id, filename, original_name, url, public_id, media_type, size_bytes,
                       uploaded_by, caption, tags, is_public, created_at, updated_at",
        )
        .bind(caption)
        .bind(tags)
        .bind(is_public)
        .bind(Utc::now())
        .bind(id)
        .fetch_one(&*self.db)
        .await?;
        Ok(item)
    }

    /// Delete a gallery item. Removal of the hosted payload is best-effort;
    /// a straggling file is preferable to a dangling row.
    pub async fn delete_media(&self, id: Uuid) -> GalleryResult<MediaItem> {
        let item = self.get_media(id).await?;
        sqlx::query("DELETE FROM media_items WHERE id = ?")
            .bind(id)
            .execute(&*self.db)
            .await?;
        if let Err(err) = self.host.delete(&item.public_id).await {
            warn!("failed to delete hosted payload {}: {}", item.public_id, err);
        }
        Ok(item)
    }
}

/// Validate a direct-upload batch: file count, MIME allow-list, and the
/// per-type size ceilings.
pub fn validate_direct_batch(files: &[DirectFile]) -> GalleryResult<()> {
    if files.is_empty() {
        return Err(GalleryError::NoFilesProvided);
    }
    if files.len() > MAX_FILES_PER_UPLOAD {
        return Err(GalleryError::TooManyFiles {
            count: files.len(),
            max: MAX_FILES_PER_UPLOAD,
        });
    }
    for file in files {
        if !ALLOWED_TYPES.contains(&file.file_type.as_str()) {
            return Err(GalleryError::UnsupportedFileType(file.file_type.clone()));
        }
        let limit = match MediaType::from_mime(&file.file_type) {
            MediaType::Photo => MAX_IMAGE_BYTES,
            MediaType::Video => MAX_VIDEO_BYTES,
        };
        if file.data.len() > limit {
            return Err(GalleryError::FileTooLarge {
                name: file.file_name.clone(),
                size: file.data.len(),
                limit,
            });
        }
    }
    Ok(())
}

/// Strip anything path-like out of a guest-supplied filename before it is
/// combined into a stored name.
pub fn sanitize_filename(name: &str) -> String {
    let base = name
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(name)
        .replace("..", "_");
    let cleaned: String = base
        .chars()
        .map(|c| if c.is_ascii_control() { '_' } else { c })
        .collect();
    if cleaned.is_empty() {
        "file".to_string()
    } else {
        cleaned
    }
}
