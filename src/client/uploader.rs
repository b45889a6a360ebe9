//! Upload orchestrator.
//!
//! Decides per batch between one direct multipart request and the chunked
//! pipeline, runs compression first, and reports a uniform progress
//! percentage either way. A batch is an explicit list of independent
//! per-file results: on the chunked path a failure on file N leaves files
//! 1..N-1 persisted, and the report says so.

use crate::client::UploadError;
use crate::client::chunked::{ChunkUploadOptions, ChunkedUploader, ProgressFn};
use crate::client::compression::{Compress, Passthrough, Quality, UploadFile, compress_best_effort};
use crate::models::media::MediaItem;
use serde::Deserialize;
use std::sync::Arc;
use tracing::info;

/// A single file this large always goes through the chunked path.
pub const LARGE_FILE_THRESHOLD: usize = 10 * 1024 * 1024;
/// A batch totalling more than this goes through the chunked path, keeping
/// the direct request under the platform's body ceiling.
pub const BATCH_TOTAL_THRESHOLD: usize = 4 * 1024 * 1024;

/// Route a batch: chunked when any single file exceeds the large-file
/// threshold or the batch total exceeds the batch threshold.
pub fn requires_chunking(files: &[UploadFile]) -> bool {
    let total: usize = files.iter().map(|f| f.size()).sum();
    files.iter().any(|f| f.size() > LARGE_FILE_THRESHOLD) || total > BATCH_TOTAL_THRESHOLD
}

/// Outcome for one file of a batch.
#[derive(Debug)]
pub struct FileResult {
    pub file_name: String,
    pub outcome: Result<MediaItem, UploadError>,
}

/// Explicit per-file results for a batch upload.
#[derive(Debug)]
pub struct BatchReport {
    pub results: Vec<FileResult>,
    pub message: String,
}

impl BatchReport {
    pub fn all_succeeded(&self) -> bool {
        self.results.iter().all(|r| r.outcome.is_ok())
    }

    pub fn items(&self) -> Vec<&MediaItem> {
        self.results
            .iter()
            .filter_map(|r| r.outcome.as_ref().ok())
            .collect()
    }
}

#[derive(Debug, Deserialize)]
struct DirectResp {
    data: Vec<MediaItem>,
}

/// Client-side entry point for guest uploads.
pub struct GalleryClient {
    http: reqwest::Client,
    base_url: String,
    options: ChunkUploadOptions,
    quality: Quality,
    compressor: Arc<dyn Compress>,
}

impl GalleryClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
            options: ChunkUploadOptions::default(),
            quality: Quality::default(),
            compressor: Arc::new(Passthrough),
        }
    }

    pub fn with_options(mut self, options: ChunkUploadOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_quality(mut self, quality: Quality) -> Self {
        self.quality = quality;
        self
    }

    pub fn with_compressor(mut self, compressor: Arc<dyn Compress>) -> Self {
        self.compressor = compressor;
        self
    }

    /// Upload a batch of files with an optional progress observer.
    ///
    /// A blank uploader name falls back to `"guest"`. Compression runs
    /// first, best-effort, images only.
    pub async fn upload_batch(
        &self,
        files: Vec<UploadFile>,
        uploaded_by: &str,
        caption: &str,
        progress: Option<ProgressFn>,
    ) -> BatchReport {
        let uploaded_by = resolve_uploader_name(uploaded_by);
        let profile = self.quality.profile();
        let files: Vec<UploadFile> = files
            .into_iter()
            .map(|f| compress_best_effort(self.compressor.as_ref(), f, &profile))
            .collect();

        if requires_chunking(&files) {
            self.upload_chunked(files, &uploaded_by, caption, progress)
                .await
        } else {
            self.upload_direct(files, &uploaded_by, caption, progress)
                .await
        }
    }

    /// One multipart request for the whole batch: all-or-nothing.
    async fn upload_direct(
        &self,
        files: Vec<UploadFile>,
        uploaded_by: &str,
        caption: &str,
        progress: Option<ProgressFn>,
    ) -> BatchReport {
        let result = self.send_direct(&files, uploaded_by, caption).await;
        match result {
            Ok(items) => {
                if let Some(progress) = &progress {
                    progress(100.0);
                }
                let count = items.len();
                let results = files
                    .into_iter()
                    .zip(items)
                    .map(|(file, item)| FileResult {
                        file_name: file.file_name,
                        outcome: Ok(item),
                    })
                    .collect();
                BatchReport {
                    results,
                    message: format!("{} file(s) uploaded successfully", count),
                }
            }
            Err(err) => {
                let message = err.to_string();
                let results = files
                    .into_iter()
                    .map(|file| FileResult {
                        file_name: file.file_name,
                        outcome: Err(clone_shallow(&err)),
                    })
                    .collect();
                BatchReport { results, message }
            }
        }
    }

    async fn send_direct(
        &self,
        files: &[UploadFile],
        uploaded_by: &str,
        caption: &str,
    ) -> Result<Vec<MediaItem>, UploadError> {
        let mut form = reqwest::multipart::Form::new();
        for file in files {
            let part = reqwest::multipart::Part::bytes(file.data.to_vec())
                .file_name(file.file_name.clone())
                .mime_str(&file.file_type)
                .map_err(|err| UploadError::Rejected(err.to_string()))?;
            form = form.part("files", part);
        }
        form = form
            .text("uploadedBy", uploaded_by.to_string())
            .text("caption", caption.to_string());

        let resp = self
            .http
            .post(format!("{}/api/media", self.base_url))
            .multipart(form)
            .timeout(self.options.assemble_timeout)
            .send()
            .await?;

        if resp.status() == reqwest::StatusCode::PAYLOAD_TOO_LARGE {
            return Err(UploadError::PayloadTooLarge);
        }
        if !resp.status().is_success() {
            return Err(UploadError::Status(resp.status().as_u16()));
        }
        let body: DirectResp = resp
            .json()
            .await
            .map_err(|err| UploadError::BadResponse(err.to_string()))?;
        Ok(body.data)
    }

    /// Chunked path: files go one at a time, each an independent saga. A
    /// failure does not roll back earlier files.
    async fn upload_chunked(
        &self,
        files: Vec<UploadFile>,
        uploaded_by: &str,
        caption: &str,
        progress: Option<ProgressFn>,
    ) -> BatchReport {
        let uploader = ChunkedUploader::new(
            self.http.clone(),
            self.base_url.clone(),
            self.options.clone(),
        );
        let total_files = files.len();
        let mut results = Vec::with_capacity(total_files);

        for (file_index, file) in files.into_iter().enumerate() {
            let per_file_progress: Option<ProgressFn> = progress.as_ref().map(|outer| {
                let outer = Arc::clone(outer);
                Arc::new(move |pct: f64| {
                    let overall =
                        (file_index as f64 + pct / 100.0) / total_files as f64 * 100.0;
                    outer(overall);
                }) as ProgressFn
            });

            let outcome = uploader
                .upload(
                    &file,
                    Some(uploaded_by),
                    Some(caption),
                    per_file_progress.as_ref(),
                )
                .await;
            results.push(FileResult {
                file_name: file.file_name,
                outcome,
            });
        }

        let succeeded = results.iter().filter(|r| r.outcome.is_ok()).count();
        let message = if succeeded == total_files {
            format!("{} file(s) uploaded successfully", succeeded)
        } else {
            format!("{} of {} file(s) uploaded", succeeded, total_files)
        };
        info!("{}", message);
        BatchReport { results, message }
    }
}

/// Uploads with a blank display name are attributed to "guest".
pub fn resolve_uploader_name(name: &str) -> String {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        "guest".to_string()
    } else {
        trimmed.to_string()
    }
}

/// Duplicate an error for fan-out into per-file results. `reqwest::Error`
/// is not `Clone`, so it degrades to its message.
fn clone_shallow(err: &UploadError) -> UploadError {
    match err {
        UploadError::PayloadTooLarge => UploadError::PayloadTooLarge,
        UploadError::Timeout => UploadError::Timeout,
        UploadError::Status(code) => UploadError::Status(*code),
        UploadError::Rejected(msg) => UploadError::Rejected(msg.clone()),
        UploadError::ChunkExhausted {
            index,
            attempts,
            reason,
        } => UploadError::ChunkExhausted {
            index: *index,
            attempts: *attempts,
            reason: reason.clone(),
        },
        UploadError::Assembly(msg) => UploadError::Assembly(msg.clone()),
        UploadError::BadResponse(msg) => UploadError::BadResponse(msg.clone()),
        UploadError::Http(err) => UploadError::BadResponse(err.to_string()),
    }
}
