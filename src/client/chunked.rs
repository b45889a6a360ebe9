//! Chunk splitter & sender.
//!
//! Transmits one large file as an ordered sequence of bounded-size chunks:
//! fixed 4 MiB ranges, sent strictly sequentially, each with its own retry
//! budget and timeout, with a short pacing delay between chunks so the
//! receiving endpoint is never hammered. When every chunk has been accepted
//! the assembly call turns the set into a single gallery item.

use crate::client::UploadError;
use crate::client::compression::UploadFile;
use crate::models::media::MediaItem;
use serde::{Deserialize, Serialize};
use std::{sync::Arc, time::Duration};
use tokio::time::sleep;
use tracing::{debug, warn};
use uuid::Uuid;

/// Fixed chunk size: stays under the platform's per-request ceiling while
/// keeping the chunk count low for very large files.
pub const DEFAULT_CHUNK_SIZE: usize = 4 * 1024 * 1024;
pub const DEFAULT_MAX_RETRIES: u32 = 5;
pub const DEFAULT_CHUNK_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_ASSEMBLE_TIMEOUT: Duration = Duration::from_secs(300);
pub const DEFAULT_RETRY_BASE_DELAY: Duration = Duration::from_secs(2);
pub const DEFAULT_INTER_CHUNK_DELAY: Duration = Duration::from_millis(200);

/// Progress observer, called with a percentage in [0, 100].
pub type ProgressFn = Arc<dyn Fn(f64) + Send + Sync>;

#[derive(Clone, Debug)]
pub struct ChunkUploadOptions {
    pub chunk_size: usize,
    /// Attempts per chunk before the whole file upload aborts.
    pub max_retries: u32,
    /// Independent timeout for each chunk attempt.
    pub chunk_timeout: Duration,
    /// Timeout for the assembly call.
    pub assemble_timeout: Duration,
    /// Seed for the exponential backoff between attempts.
    pub retry_base_delay: Duration,
    /// Delay between successive chunks (not between retries).
    pub inter_chunk_delay: Duration,
}

impl Default for ChunkUploadOptions {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            max_retries: DEFAULT_MAX_RETRIES,
            chunk_timeout: DEFAULT_CHUNK_TIMEOUT,
            assemble_timeout: DEFAULT_ASSEMBLE_TIMEOUT,
            retry_base_delay: DEFAULT_RETRY_BASE_DELAY,
            inter_chunk_delay: DEFAULT_INTER_CHUNK_DELAY,
        }
    }
}

/// Number of chunks a file of `len` bytes splits into.
pub fn chunk_count(len: usize, chunk_size: usize) -> usize {
    len.div_ceil(chunk_size)
}

/// Byte range `[i*cs, min((i+1)*cs, len))` of chunk `index`.
pub fn chunk_range(index: usize, chunk_size: usize, len: usize) -> std::ops::Range<usize> {
    let start = index * chunk_size;
    let end = ((index + 1) * chunk_size).min(len);
    start..end
}

/// Exponential backoff: `base × 2^attempt`.
pub fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    base * 2u32.saturating_pow(attempt)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SessionResp {
    upload_id: Uuid,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChunkResp {
    chunk_id: String,
}

#[derive(Debug, Deserialize)]
struct AssembleResp {
    data: MediaItem,
}

#[derive(Debug, Deserialize)]
struct ErrorResp {
    error: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SessionBody<'a> {
    file_name: &'a str,
    file_type: &'a str,
    total_chunks: usize,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct AssembleBody<'a> {
    chunk_ids: &'a [String],
    file_name: &'a str,
    file_type: &'a str,
    uploaded_by: Option<&'a str>,
    caption: Option<&'a str>,
    upload_id: Option<Uuid>,
}

/// Reliable chunked transmission of one file.
pub struct ChunkedUploader {
    http: reqwest::Client,
    base_url: String,
    options: ChunkUploadOptions,
}

impl ChunkedUploader {
    pub fn new(http: reqwest::Client, base_url: impl Into<String>, options: ChunkUploadOptions) -> Self {
        Self {
            http,
            base_url: base_url.into(),
            options,
        }
    }

    /// Upload `file` chunk by chunk, then assemble. Aborts the whole file as
    /// soon as one chunk exhausts its retries; chunks the server already
    /// accepted are left to its expiry backstop.
    pub async fn upload(
        &self,
        file: &UploadFile,
        uploaded_by: Option<&str>,
        caption: Option<&str>,
        progress: Option<&ProgressFn>,
    ) -> Result<MediaItem, UploadError> {
        if file.data.is_empty() {
            return Err(UploadError::Rejected(format!("`{}` is empty", file.file_name)));
        }
        let total = chunk_count(file.size(), self.options.chunk_size);

        // Sessions tie the chunk set and assembly together server-side. A
        // failure here degrades to the plain chunk-id flow rather than
        // blocking the upload.
        let upload_id = match self.create_session(file, total).await {
            Ok(id) => Some(id),
            Err(err) => {
                warn!("could not open upload session, continuing without: {}", err);
                None
            }
        };

        let mut chunk_ids = Vec::with_capacity(total);
        for index in 0..total {
            let range = chunk_range(index, self.options.chunk_size, file.size());
            let chunk = file.data.slice(range);
            debug!(
                "uploading chunk {}/{} of `{}`, {} bytes",
                index + 1,
                total,
                file.file_name,
                chunk.len()
            );
            let chunk_id = self.send_chunk(file, chunk, index, total, upload_id).await?;
            chunk_ids.push(chunk_id);

            if let Some(progress) = progress {
                progress((index + 1) as f64 / total as f64 * 100.0);
            }
            if index + 1 < total {
                sleep(self.options.inter_chunk_delay).await;
            }
        }

        self.assemble(file, &chunk_ids, uploaded_by, caption, upload_id)
            .await
    }

    async fn create_session(&self, file: &UploadFile, total: usize) -> Result<Uuid, UploadError> {
        let resp = self
            .http
            .post(format!("{}/api/media/session", self.base_url))
            .json(&SessionBody {
                file_name: &file.file_name,
                file_type: &file.file_type,
                total_chunks: total,
            })
            .timeout(self.options.chunk_timeout)
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(UploadError::Status(resp.status().as_u16()));
        }
        let session: SessionResp = resp
            .json()
            .await
            .map_err(|err| UploadError::BadResponse(err.to_string()))?;
        Ok(session.upload_id)
    }

    /// Send one chunk with bounded retries. Timeouts and 5xx responses are
    /// transient and retried with exponential backoff; 4xx responses are
    /// validation failures and never retried.
    async fn send_chunk(
        &self,
        file: &UploadFile,
        chunk: bytes::Bytes,
        index: usize,
        total: usize,
        upload_id: Option<Uuid>,
    ) -> Result<String, UploadError> {
        let url = format!("{}/api/media/chunk", self.base_url);
        let mut last_reason = String::new();

        for attempt in 0..self.options.max_retries {
            let mut form = reqwest::multipart::Form::new()
                .part(
                    "chunk",
                    reqwest::multipart::Part::bytes(chunk.to_vec())
                        .file_name(file.file_name.clone()),
                )
                .text("chunkIndex", index.to_string())
                .text("totalChunks", total.to_string())
                .text("fileName", file.file_name.clone())
                .text("fileType", file.file_type.clone());
            if let Some(id) = upload_id {
                form = form.text("uploadId", id.to_string());
            }

            let result = self
                .http
                .post(&url)
                .multipart(form)
                .timeout(self.options.chunk_timeout)
                .send()
                .await;

            match result {
                Ok(resp) if resp.status().is_success() => {
                    let body: ChunkResp = resp
                        .json()
                        .await
                        .map_err(|err| UploadError::BadResponse(err.to_string()))?;
                    return Ok(body.chunk_id);
                }
                Ok(resp) if resp.status() == reqwest::StatusCode::PAYLOAD_TOO_LARGE => {
                    return Err(UploadError::PayloadTooLarge);
                }
                Ok(resp) if resp.status().is_client_error() => {
                    return Err(UploadError::Rejected(error_message(resp).await));
                }
                Ok(resp) => {
                    last_reason = format!("status {}", resp.status().as_u16());
                }
                Err(err) if err.is_timeout() => {
                    last_reason = "timeout".to_string();
                }
                Err(err) => {
                    last_reason = err.to_string();
                }
            }

            if attempt + 1 < self.options.max_retries {
                let delay = backoff_delay(self.options.retry_base_delay, attempt);
                debug!(
                    "chunk {}/{} attempt {} failed ({}), retrying in {:?}",
                    index + 1,
                    total,
                    attempt + 1,
                    last_reason,
                    delay
                );
                sleep(delay).await;
            }
        }

        Err(UploadError::ChunkExhausted {
            index,
            attempts: self.options.max_retries,
            reason: last_reason,
        })
    }

    async fn assemble(
        &self,
        file: &UploadFile,
        chunk_ids: &[String],
        uploaded_by: Option<&str>,
        caption: Option<&str>,
        upload_id: Option<Uuid>,
    ) -> Result<MediaItem, UploadError> {
        let resp = self
            .http
            .post(format!("{}/api/media/assemble", self.base_url))
            .json(&AssembleBody {
                chunk_ids,
                file_name: &file.file_name,
                file_type: &file.file_type,
                uploaded_by,
                caption,
                upload_id,
            })
            .timeout(self.options.assemble_timeout)
            .send()
            .await?;

        if !resp.status().is_success() {
            return Err(UploadError::Assembly(error_message(resp).await));
        }
        let body: AssembleResp = resp
            .json()
            .await
            .map_err(|err| UploadError::BadResponse(err.to_string()))?;
        Ok(body.data)
    }
}

async fn error_message(resp: reqwest::Response) -> String {
    let status = resp.status().as_u16();
    match resp.json::<ErrorResp>().await {
        Ok(ErrorResp { error: Some(msg) }) => msg,
        _ => format!("status {}", status),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MIB: usize = 1024 * 1024;

    #[test]
    fn chunk_count_rounds_up() {
        assert_eq!(chunk_count(10 * MIB, 4 * MIB), 3);
        assert_eq!(chunk_count(8 * MIB, 4 * MIB), 2);
        assert_eq!(chunk_count(1, 4 * MIB), 1);
        assert_eq!(chunk_count(0, 4 * MIB), 0);
    }

    #[test]
    fn chunk_ranges_cover_file_exactly() {
        let len = 10 * MIB;
        let cs = 4 * MIB;
        assert_eq!(chunk_range(0, cs, len), 0..4 * MIB);
        assert_eq!(chunk_range(1, cs, len), 4 * MIB..8 * MIB);
        // Final chunk is truncated to the file size.
        assert_eq!(chunk_range(2, cs, len), 8 * MIB..10 * MIB);
    }

    #[test]
    fn backoff_doubles_each_attempt() {
        let base = Duration::from_secs(2);
        assert_eq!(backoff_delay(base, 0), Duration::from_secs(2));
        assert_eq!(backoff_delay(base, 1), Duration::from_secs(4));
        assert_eq!(backoff_delay(base, 2), Duration::from_secs(8));
        assert_eq!(backoff_delay(base, 3), Duration::from_secs(16));
    }
}
