//! Best-effort client-side compression.
//!
//! Compression is treated as a pure function: raw bytes plus a quality
//! profile in, (hopefully) smaller bytes out. Non-image files pass through
//! untouched, and any compressor failure falls back to the original bytes —
//! a worse upload beats a lost one.

use bytes::Bytes;
use thiserror::Error;
use tracing::warn;

/// A file as the client holds it before upload.
#[derive(Clone, Debug)]
pub struct UploadFile {
    pub file_name: String,
    /// MIME type.
    pub file_type: String,
    pub data: Bytes,
}

impl UploadFile {
    pub fn new(file_name: impl Into<String>, file_type: impl Into<String>, data: Bytes) -> Self {
        Self {
            file_name: file_name.into(),
            file_type: file_type.into(),
            data,
        }
    }

    pub fn size(&self) -> usize {
        self.data.len()
    }

    pub fn is_image(&self) -> bool {
        self.file_type.starts_with("image/")
    }
}

/// Named quality presets guests can pick from.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub enum Quality {
    High,
    #[default]
    Medium,
    Low,
    /// Most aggressive preset, for very constrained uplinks.
    Ultra,
}

/// Targets a compressor aims for: an output size ceiling, a maximum pixel
/// dimension, and a quality factor in (0, 1].
#[derive(Clone, Copy, Debug)]
pub struct CompressionProfile {
    pub max_bytes: usize,
    pub max_dimension: u32,
    pub quality: f32,
}

impl Quality {
    pub fn profile(self) -> CompressionProfile {
        match self {
            Quality::High => CompressionProfile {
                max_bytes: 5 * 1024 * 1024,
                max_dimension: 2560,
                quality: 0.9,
            },
            Quality::Medium => CompressionProfile {
                max_bytes: 2 * 1024 * 1024,
                max_dimension: 1920,
                quality: 0.8,
            },
            Quality::Low => CompressionProfile {
                max_bytes: 1024 * 1024,
                max_dimension: 1280,
                quality: 0.6,
            },
            Quality::Ultra => CompressionProfile {
                max_bytes: 512 * 1024,
                max_dimension: 960,
                quality: 0.4,
            },
        }
    }
}

#[derive(Debug, Error)]
#[error("compression failed: {0}")]
pub struct CompressionError(pub String);

/// Image size/quality reduction seam. Implementations must be pure: same
/// bytes and profile in, same bytes out, no side effects.
pub trait Compress: Send + Sync {
    fn compress(&self, data: &Bytes, profile: &CompressionProfile)
    -> Result<Bytes, CompressionError>;
}

/// Identity compressor. The real codec lives with the front end; the
/// pipeline only needs the seam and the pass-through semantics.
#[derive(Clone, Copy, Debug, Default)]
pub struct Passthrough;

impl Compress for Passthrough {
    fn compress(
        &self,
        data: &Bytes,
        _profile: &CompressionProfile,
    ) -> Result<Bytes, CompressionError> {
        Ok(data.clone())
    }
}

/// Apply a compressor to a file, best-effort. Non-image files and any
/// compressor error yield the original file unchanged.
pub fn compress_best_effort(
    compressor: &dyn Compress,
    file: UploadFile,
    profile: &CompressionProfile,
) -> UploadFile {
    if !file.is_image() {
        return file;
    }
    match compressor.compress(&file.data, profile) {
        Ok(data) => UploadFile { data, ..file },
        Err(err) => {
            warn!("compression of `{}` failed, using original: {}", file.file_name, err);
            file
        }
    }
}
