//! Shared setup for integration tests: a file-backed SQLite database and a
//! local media host, both inside one temp directory.

use keepsake::services::{media_host::LocalMediaHost, media_service::MediaService};
use sqlx::SqlitePool;
use sqlx::sqlite::SqlitePoolOptions;
use std::sync::Arc;
use tempfile::TempDir;

pub struct TestEnv {
    pub service: MediaService,
    pub db: Arc<SqlitePool>,
    // Holds the database and media files alive for the test's duration.
    pub dir: TempDir,
}

pub async fn setup() -> TestEnv {
    setup_with_retention(3600).await
}

pub async fn setup_with_retention(retention_secs: u64) -> TestEnv {
    let dir = TempDir::new().expect("create temp dir");
    let db_path = dir.path().join("keepsake.db");
    let url = format!("sqlite://{}?mode=rwc", db_path.display());
    let db = Arc::new(
        SqlitePoolOptions::new()
            .max_connections(5)
            .connect(&url)
            .await
            .expect("connect sqlite"),
    );

    for stmt in include_str!("../../migrations/0001_init.sql")
        .split(';')
        .map(str::trim)
        .filter(|s| !s.is_empty())
    {
        sqlx::query(stmt).execute(&*db).await.expect("migrate");
    }

    let host = Arc::new(LocalMediaHost::new(dir.path().join("media")));
    let service = MediaService::new(db.clone(), host, retention_secs);
    TestEnv { service, db, dir }
}

/// Read back an assembled payload through the media host.
pub async fn read_hosted(service: &MediaService, public_id: &str) -> Vec<u8> {
    use tokio::io::AsyncReadExt;
    let (mut file, _) = service.host.open(public_id).await.expect("open hosted file");
    let mut buf = Vec::new();
    file.read_to_end(&mut buf).await.expect("read hosted file");
    buf
}

pub fn sha256(data: &[u8]) -> String {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}
