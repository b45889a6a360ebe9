//! Media host abstraction.
//!
//! The gallery treats the durable media backend as a black box that accepts
//! an assembled file and hands back a durable URL plus an identifier. The
//! default implementation stores payloads on local disk, sharded beneath
//! `base_path/{resource}/{shard}/{shard}/{filename}` to keep directory
//! fan-out bounded.

use crate::models::media::MediaType;
use async_trait::async_trait;
use bytes::Bytes;
use std::{
    io::{self, ErrorKind},
    path::{Path, PathBuf},
};
use thiserror::Error;
use tokio::{
    fs::{self, File},
    io::AsyncWriteExt,
};
use tracing::debug;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum HostError {
    #[error("media `{0}` not found at host")]
    NotFound(String),
    #[error("media host rejected the file: {0}")]
    Rejected(String),
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// What the host returns after accepting an upload.
#[derive(Clone, Debug)]
pub struct HostedMedia {
    /// Durable, retrievable location of the payload.
    pub url: String,
    /// Host-assigned identifier, used for later retrieval and deletion.
    pub public_id: String,
}

/// Durable storage backend for assembled media files.
#[async_trait]
pub trait MediaHost: Send + Sync {
    /// Persist an assembled file and return its durable location.
    async fn store(
        &self,
        filename: &str,
        media_type: MediaType,
        data: Bytes,
    ) -> Result<HostedMedia, HostError>;

    /// Open a previously stored payload for streaming out, with its length.
    async fn open(&self, public_id: &str) -> Result<(File, u64), HostError>;

    /// Remove a stored payload.
    async fn delete(&self, public_id: &str) -> Result<(), HostError>;
}

/// Local-disk media host.
#[derive(Clone, Debug)]
pub struct LocalMediaHost {
    base_path: PathBuf,
}

impl LocalMediaHost {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
        }
    }

    /// Reject filenames that could escape the storage root.
    fn ensure_name_safe(name: &str) -> Result<(), HostError> {
        if name.is_empty() {
            return Err(HostError::Rejected("empty filename".into()));
        }
        if name.contains('/') || name.contains('\\') || name.contains("..") {
            return Err(HostError::Rejected(format!("unsafe filename `{}`", name)));
        }
        if name.bytes().any(|b| b.is_ascii_control()) {
            return Err(HostError::Rejected(format!("unsafe filename `{}`", name)));
        }
        Ok(())
    }

    fn resource_dir(media_type: MediaType) -> &'static str {
        match media_type {
            MediaType::Photo => "image",
            MediaType::Video => "video",
        }
    }

    /// Generate two-level shard identifiers for a stored filename.
    ///
    /// Uses MD5(resource/filename) and returns the first two bytes as
    /// lowercase hexadecimal strings (00–ff).
    fn shards(resource: &str, filename: &str) -> (String, String) {
        let digest = md5::compute(format!("{}/{}", resource, filename));
        (format!("{:02x}", digest[0]), format!("{:02x}", digest[1]))
    }

    fn payload_path(&self, resource: &str, filename: &str) -> PathBuf {
        let (shard_a, shard_b) = Self::shards(resource, filename);
        let mut path = self.base_path.clone();
        path.push(resource);
        path.push(shard_a);
        path.push(shard_b);
        path.push(filename);
        path
    }

    /// Split a public id back into (resource, filename).
    fn parse_public_id(public_id: &str) -> Result<(&str, &str), HostError> {
        let (resource, filename) = public_id
            .split_once('/')
            .ok_or_else(|| HostError::NotFound(public_id.to_string()))?;
        if !matches!(resource, "image" | "video") {
            return Err(HostError::NotFound(public_id.to_string()));
        }
        Self::ensure_name_safe(filename)?;
        Ok((resource, filename))
    }

    /// Recursively remove empty directories up to the storage root.
    async fn prune_empty_dirs(&self, start: &Path) {
        let mut current = start.to_path_buf();
        while current.starts_with(&self.base_path) && current != self.base_path {
            match fs::remove_dir(&current).await {
                Ok(_) => {
                    if let Some(parent) = current.parent() {
                        current = parent.to_path_buf();
                    } else {
                        break;
                    }
                }
                Err(err) if err.kind() == ErrorKind::NotFound => break,
                Err(err) if err.kind() == ErrorKind::DirectoryNotEmpty => break,
                Err(err) => {
                    debug!("failed to prune directory {}: {}", current.display(), err);
                    break;
                }
            }
        }
    }
}

#[async_trait]
impl MediaHost for LocalMediaHost {
    /// Write the payload to a temporary file, fsync, then atomically rename
    /// into its sharded final location.
    async fn store(
        &self,
        filename: &str,
        media_type: MediaType,
        data: Bytes,
    ) -> Result<HostedMedia, HostError> {
        Self::ensure_name_safe(filename)?;
        let resource = Self::resource_dir(media_type);
        let file_path = self.payload_path(resource, filename);
        let parent = file_path
            .parent()
            .map(Path::to_path_buf)
            .ok_or_else(|| HostError::Rejected("payload path missing parent".into()))?;
        fs::create_dir_all(&parent).await?;

        let tmp_path = parent.join(format!(".tmp-{}", Uuid::new_v4()));
        let mut file = File::create(&tmp_path).await?;
        if let Err(err) = file.write_all(&data).await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(HostError::Io(err));
        }
        if let Err(err) = file.sync_all().await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(HostError::Io(err));
        }
        if let Err(err) = fs::rename(&tmp_path, &file_path).await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(HostError::Io(err));
        }

        let public_id = format!("{}/{}", resource, filename);
        Ok(HostedMedia {
            url: format!("/media/{}", public_id),
            public_id,
        })
    }

    async fn open(&self, public_id: &str) -> Result<(File, u64), HostError> {
        let (resource, filename) = Self::parse_public_id(public_id)?;
        let file_path = self.payload_path(resource, filename);
        let file = File::open(&file_path).await.map_err(|err| {
            if err.kind() == ErrorKind::NotFound {
                HostError::NotFound(public_id.to_string())
            } else {
                HostError::Io(err)
            }
        })?;
        let len = file.metadata().await?.len();
        Ok((file, len))
    }

    async fn delete(&self, public_id: &str) -> Result<(), HostError> {
        let (resource, filename) = Self::parse_public_id(public_id)?;
        let file_path = self.payload_path(resource, filename);
        match fs::remove_file(&file_path).await {
            Ok(_) => debug!("removed hosted file {}", file_path.display()),
            Err(err) if err.kind() == ErrorKind::NotFound => {
                return Err(HostError::NotFound(public_id.to_string()));
            }
            Err(err) => return Err(HostError::Io(err)),
        }
        if let Some(parent) = file_path.parent() {
            self.prune_empty_dirs(parent).await;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn store_then_open_roundtrip() {
        let dir = TempDir::new().unwrap();
        let host = LocalMediaHost::new(dir.path());

        let hosted = host
            .store("a.jpg", MediaType::Photo, Bytes::from_static(b"jpegdata"))
            .await
            .unwrap();
        assert_eq!(hosted.public_id, "image/a.jpg");
        assert_eq!(hosted.url, "/media/image/a.jpg");

        let (mut file, len) = host.open(&hosted.public_id).await.unwrap();
        assert_eq!(len, 8);
        let mut buf = Vec::new();
        tokio::io::AsyncReadExt::read_to_end(&mut file, &mut buf)
            .await
            .unwrap();
        assert_eq!(buf, b"jpegdata");
    }

    #[tokio::test]
    async fn videos_and_photos_do_not_collide() {
        let dir = TempDir::new().unwrap();
        let host = LocalMediaHost::new(dir.path());

        host.store("clip", MediaType::Video, Bytes::from_static(b"v"))
            .await
            .unwrap();
        host.store("clip", MediaType::Photo, Bytes::from_static(b"p"))
            .await
            .unwrap();

        let (_, video_len) = host.open("video/clip").await.unwrap();
        let (_, photo_len) = host.open("image/clip").await.unwrap();
        assert_eq!(video_len, 1);
        assert_eq!(photo_len, 1);
    }

    #[tokio::test]
    async fn delete_removes_payload() {
        let dir = TempDir::new().unwrap();
        let host = LocalMediaHost::new(dir.path());

        let hosted = host
            .store("b.png", MediaType::Photo, Bytes::from_static(b"png"))
            .await
            .unwrap();
        host.delete(&hosted.public_id).await.unwrap();
        assert!(matches!(
            host.open(&hosted.public_id).await,
            Err(HostError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn open_missing_is_not_found() {
        let dir = TempDir::new().unwrap();
        let host = LocalMediaHost::new(dir.path());
        assert!(matches!(
            host.open("image/nope.jpg").await,
            Err(HostError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn traversal_names_are_rejected() {
        let dir = TempDir::new().unwrap();
        let host = LocalMediaHost::new(dir.path());
        let res = host
            .store("../evil", MediaType::Photo, Bytes::from_static(b"x"))
            .await;
        assert!(matches!(res, Err(HostError::Rejected(_))));
    }
}
