//! Defines routes for the upload pipeline and gallery API.
//!
//! ## Structure
//! - **Upload pipeline**
//!   - `POST /api/media/session`  — mint an upload session
//!   - `POST /api/media/chunk`    — store one chunk
//!   - `POST /api/media/assemble` — assemble a chunk set into a gallery item
//!
//! - **Gallery**
//!   - `GET    /api/media`        — list public items (limit, cursor)
//!   - `POST   /api/media`        — direct multipart upload
//!   - `GET    /api/media/{id}`   — fetch one item
//!   - `PUT    /api/media/{id}`   — update caption/tags/visibility
//!   - `DELETE /api/media/{id}`   — delete item + hosted payload
//!   - `GET    /media/{*public_id}` — stream the hosted file
//!
//! The global body limit models the hosting platform's per-request ceiling:
//! anything larger answers 413, which is exactly what pushes big files onto
//! the chunked path.

use crate::{
    handlers::{
        health_handlers::{healthz, readyz},
        media_handlers::{
            assemble, create_session, delete_media, direct_upload, get_media, list_media,
            stream_media, update_media, upload_chunk,
        },
    },
    services::media_service::MediaService,
};
use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{get, post},
};

/// Per-request body ceiling (multipart overhead included). One 4 MiB chunk
/// fits comfortably; a direct batch over the threshold does not.
pub const MAX_REQUEST_BODY_BYTES: usize = 8 * 1024 * 1024;

/// Build and return the router for all gallery routes.
///
/// The router carries shared state (`MediaService`) to all handlers.
pub fn routes() -> Router<MediaService> {
    Router::new()
        // health endpoints (mounted at root)
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        // upload pipeline
        .route("/api/media/session", post(create_session))
        .route("/api/media/chunk", post(upload_chunk))
        .route("/api/media/assemble", post(assemble))
        // gallery
        .route("/api/media", get(list_media).post(direct_upload))
        .route(
            "/api/media/{id}",
            get(get_media).put(update_media).delete(delete_media),
        )
        .route("/media/{*public_id}", get(stream_media))
        .layer(DefaultBodyLimit::max(MAX_REQUEST_BODY_BYTES))
}
