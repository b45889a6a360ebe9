//! HTTP handlers for the upload pipeline and gallery CRUD.
//!
//! Parses multipart/JSON bodies and delegates storage concerns to
//! `MediaService`. Every response uses the `{success, ...}` envelope; errors
//! come back as `{"success": false, "error": ...}` via `AppError`.

use crate::{
    errors::AppError,
    models::media::MediaItem,
    services::media_service::{
        AssembleRequest, DirectFile, ListMediaParams, MediaService, MediaUpdate,
        StoreChunkRequest,
    },
};
use axum::{
    Json,
    body::Body,
    extract::{Multipart, Path, Query, State},
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use base64::{Engine as _, engine::general_purpose};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio_util::io::ReaderStream;
use uuid::Uuid;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSessionReq {
    pub file_name: String,
    pub file_type: String,
    pub total_chunks: i64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSessionResp {
    pub success: bool,
    pub upload_id: Uuid,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkUploadResp {
    pub success: bool,
    pub chunk_id: String,
    pub message: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssembleReq {
    pub chunk_ids: Vec<String>,
    pub file_name: String,
    pub file_type: String,
    pub uploaded_by: Option<String>,
    pub caption: Option<String>,
    pub upload_id: Option<Uuid>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaResp<T> {
    pub success: bool,
    pub data: T,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaListResp {
    pub success: bool,
    pub data: Vec<MediaItem>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_cursor: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ListMediaQuery {
    pub limit: Option<usize>,
    pub cursor: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateMediaReq {
    pub caption: Option<String>,
    pub tags: Option<Vec<String>>,
    pub is_public: Option<bool>,
}

/// POST `/api/media/session` — mint an upload session for one file.
pub async fn create_session(
    State(service): State<MediaService>,
    Json(req): Json<CreateSessionReq>,
) -> Result<Json<CreateSessionResp>, AppError> {
    let session = service
        .create_session(req.file_name, req.file_type, req.total_chunks)
        .await?;
    Ok(Json(CreateSessionResp {
        success: true,
        upload_id: session.id,
    }))
}

/// POST `/api/media/chunk` — accept one chunk of a larger file.
pub async fn upload_chunk(
    State(service): State<MediaService>,
    mut multipart: Multipart,
) -> Result<Json<ChunkUploadResp>, AppError> {
    let mut data = None;
    let mut chunk_index: Option<i64> = None;
    let mut total_chunks: Option<i64> = None;
    let mut file_name = None;
    let mut file_type = None;
    let mut session_id = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|err| AppError::bad_request(err.to_string()))?
    {
        match field.name() {
            Some("chunk") => {
                data = Some(
                    field
                        .bytes()
                        .await
                        .map_err(|err| AppError::bad_request(err.to_string()))?,
                );
            }
            Some("chunkIndex") => chunk_index = Some(parse_field(field, "chunkIndex").await?),
            Some("totalChunks") => total_chunks = Some(parse_field(field, "totalChunks").await?),
            Some("fileName") => file_name = Some(text_field(field).await?),
            Some("fileType") => file_type = Some(text_field(field).await?),
            Some("uploadId") => session_id = Some(parse_field(field, "uploadId").await?),
            _ => {}
        }
    }

    let data = data.ok_or_else(|| AppError::bad_request("no chunk provided"))?;
    let total_chunks =
        total_chunks.ok_or_else(|| AppError::bad_request("missing totalChunks"))?;
    let chunk_index = chunk_index.ok_or_else(|| AppError::bad_request("missing chunkIndex"))?;

    let chunk_id = service
        .store_chunk(StoreChunkRequest {
            session_id,
            chunk_index,
            total_chunks,
            file_name: file_name.ok_or_else(|| AppError::bad_request("missing fileName"))?,
            file_type: file_type.ok_or_else(|| AppError::bad_request("missing fileType"))?,
            data,
        })
        .await?;

    Ok(Json(ChunkUploadResp {
        success: true,
        message: format!("Chunk {}/{} uploaded successfully", chunk_index + 1, total_chunks),
        chunk_id,
    }))
}

/// POST `/api/media/assemble` — concatenate a stored chunk set into one
/// durable gallery item.
pub async fn assemble(
    State(service): State<MediaService>,
    Json(req): Json<AssembleReq>,
) -> Result<Json<MediaResp<MediaItem>>, AppError> {
    let item = service
        .assemble(AssembleRequest {
            chunk_ids: req.chunk_ids,
            file_name: req.file_name,
            file_type: req.file_type,
            uploaded_by: req.uploaded_by,
            caption: req.caption,
            session_id: req.upload_id,
        })
        .await?;
    Ok(Json(MediaResp {
        success: true,
        data: item,
        message: Some("File assembled and uploaded successfully".into()),
    }))
}

/// POST `/api/media` — direct multipart upload of one or more small files.
pub async fn direct_upload(
    State(service): State<MediaService>,
    mut multipart: Multipart,
) -> Result<Json<MediaResp<Vec<MediaItem>>>, AppError> {
    let mut files = Vec::new();
    let mut uploaded_by = None;
    let mut caption = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|err| AppError::bad_request(err.to_string()))?
    {
        match field.name() {
            Some("files") => {
                let file_name = field.file_name().unwrap_or("unnamed").to_string();
                let file_type = field
                    .content_type()
                    .unwrap_or("application/octet-stream")
                    .to_string();
                let data = field
                    .bytes()
                    .await
                    .map_err(|err| AppError::bad_request(err.to_string()))?;
                files.push(DirectFile {
                    file_name,
                    file_type,
                    data,
                });
            }
            Some("uploadedBy") => uploaded_by = Some(text_field(field).await?),
            Some("caption") => caption = Some(text_field(field).await?),
            _ => {}
        }
    }

    let items = service.direct_upload(files, uploaded_by, caption).await?;
    let message = format!("{} file(s) uploaded successfully", items.len());
    Ok(Json(MediaResp {
        success: true,
        data: items,
        message: Some(message),
    }))
}

/// GET `/api/media` — public gallery items, newest first.
pub async fn list_media(
    State(service): State<MediaService>,
    Query(q): Query<ListMediaQuery>,
) -> Result<Json<MediaListResp>, AppError> {
    let before = q.cursor.as_deref().and_then(decode_cursor);
    let result = service
        .list_media(ListMediaParams {
            limit: q.limit.unwrap_or(100),
            before,
        })
        .await?;
    Ok(Json(MediaListResp {
        success: true,
        data: result.items,
        next_cursor: result.next_before.map(|ts| encode_cursor(&ts)),
    }))
}

/// GET `/api/media/{id}`
pub async fn get_media(
    State(service): State<MediaService>,
    Path(id): Path<Uuid>,
) -> Result<Json<MediaResp<MediaItem>>, AppError> {
    let item = service.get_media(id).await?;
    Ok(Json(MediaResp {
        success: true,
        data: item,
        message: None,
    }))
}

/// PUT `/api/media/{id}` — update caption, tags, or visibility.
pub async fn update_media(
    State(service): State<MediaService>,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateMediaReq>,
) -> Result<Json<MediaResp<MediaItem>>, AppError> {
    let item = service
        .update_media(
            id,
            MediaUpdate {
                caption: req.caption,
                tags: req.tags,
                is_public: req.is_public,
            },
        )
        .await?;
    Ok(Json(MediaResp {
        success: true,
        data: item,
        message: None,
    }))
}

/// DELETE `/api/media/{id}`
pub async fn delete_media(
    State(service): State<MediaService>,
    Path(id): Path<Uuid>,
) -> Result<Json<MediaResp<MediaItem>>, AppError> {
    let item = service.delete_media(id).await?;
    Ok(Json(MediaResp {
        success: true,
        data: item,
        message: Some("Media deleted".into()),
    }))
}

/// GET `/media/{*public_id}` — stream a hosted payload.
pub async fn stream_media(
    State(service): State<MediaService>,
    Path(public_id): Path<String>,
) -> Result<Response, AppError> {
    let item = service.get_media_by_public_id(&public_id).await?;
    let (file, len) = service.host.open(&public_id).await.map_err(|err| {
        AppError::from(crate::services::media_service::GalleryError::Host(err))
    })?;

    let stream = ReaderStream::new(file);
    let mut response = Response::new(Body::from_stream(stream));
    *response.status_mut() = StatusCode::OK;
    // The row carries the original MIME type; the host only stores bytes.
    let content_type = mime_for(&item.filename)
        .unwrap_or("application/octet-stream")
        .to_string();
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_str(&content_type)
            .unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream")),
    );
    response.headers_mut().insert(
        header::CONTENT_LENGTH,
        HeaderValue::from_str(&len.to_string())
            .unwrap_or_else(|_| HeaderValue::from_static("0")),
    );
    Ok(response)
}

async fn text_field(field: axum::extract::multipart::Field<'_>) -> Result<String, AppError> {
    field
        .text()
        .await
        .map_err(|err| AppError::bad_request(err.to_string()))
}

async fn parse_field<T: std::str::FromStr>(
    field: axum::extract::multipart::Field<'_>,
    name: &str,
) -> Result<T, AppError> {
    text_field(field)
        .await?
        .parse::<T>()
        .map_err(|_| AppError::bad_request(format!("invalid {}", name)))
}

fn encode_cursor(ts: &DateTime<Utc>) -> String {
    general_purpose::STANDARD.encode(ts.to_rfc3339())
}

fn decode_cursor(token: &str) -> Option<DateTime<Utc>> {
    let bytes = general_purpose::STANDARD.decode(token).ok()?;
    let text = String::from_utf8(bytes).ok()?;
    DateTime::parse_from_rfc3339(&text)
        .ok()
        .map(|ts| ts.with_timezone(&Utc))
}

fn mime_for(filename: &str) -> Option<&'static str> {
    let ext = filename.rsplit('.').next()?.to_ascii_lowercase();
    match ext.as_str() {
        "jpg" | "jpeg" => Some("image/jpeg"),
        "png" => Some("image/png"),
        "gif" => Some("image/gif"),
        "webp" => Some("image/webp"),
        "mp4" => Some("video/mp4"),
        "webm" => Some("video/webm"),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cursor_roundtrip() {
        let ts = Utc::now();
        let decoded = decode_cursor(&encode_cursor(&ts)).unwrap();
        assert_eq!(decoded.timestamp_micros(), ts.timestamp_micros());
    }

    #[test]
    fn bad_cursor_is_ignored() {
        assert!(decode_cursor("not-base64!").is_none());
        let garbage = general_purpose::STANDARD.encode("not a timestamp");
        assert!(decode_cursor(&garbage).is_none());
    }

    #[test]
    fn extension_mime_lookup() {
        assert_eq!(mime_for("abc_photo.JPG"), Some("image/jpeg"));
        assert_eq!(mime_for("clip.webm"), Some("video/webm"));
        assert_eq!(mime_for("noext"), None);
    }
}
