use anyhow::{Context, Result};
use clap::Parser;
use std::env;

/// Centralized application configuration.
/// Combines environment variables and CLI arguments.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub media_dir: String,
    pub database_url: String,
    /// Seconds an unconsumed chunk survives before the expiry backstop
    /// removes it.
    pub chunk_retention_secs: u64,
}

/// Command-line + environment configuration.
#[derive(Parser, Debug)]
#[command(author, version, about = "Shared event gallery with chunked media uploads")]
pub struct Args {
    /// Host to bind to (overrides KEEPSAKE_HOST)
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to (overrides KEEPSAKE_PORT)
    #[arg(long)]
    pub port: Option<u16>,

    /// Directory where hosted media payloads are stored (overrides KEEPSAKE_MEDIA_DIR)
    #[arg(long)]
    pub media_dir: Option<String>,

    /// Database URL (overrides KEEPSAKE_DATABASE_URL)
    #[arg(long)]
    pub database_url: Option<String>,

    /// Chunk retention window in seconds (overrides KEEPSAKE_CHUNK_RETENTION_SECS)
    #[arg(long)]
    pub chunk_retention_secs: Option<u64>,

    /// Run migrations and exit
    #[arg(long)]
    pub migrate: bool,
}

impl AppConfig {
    /// Parse environment variables + CLI args into AppConfig and migrate flag.
    pub fn from_env_and_args() -> Result<(Self, bool)> {
        // Parse CLI once
        let args = Args::parse();

        // --- Environment fallback ---
        let env_host = env::var("KEEPSAKE_HOST").unwrap_or_else(|_| "0.0.0.0".into());
        let env_port = match env::var("KEEPSAKE_PORT") {
            Ok(value) => value
                .parse::<u16>()
                .with_context(|| format!("parsing KEEPSAKE_PORT value `{}`", value))?,
            Err(env::VarError::NotPresent) => 3000,
            Err(err) => return Err(err).context("reading KEEPSAKE_PORT"),
        };
        let env_media = env::var("KEEPSAKE_MEDIA_DIR").unwrap_or_else(|_| "./data/media".into());
        let env_db = env::var("KEEPSAKE_DATABASE_URL")
            .unwrap_or_else(|_| "sqlite://./data/meta/keepsake.db".into());
        let env_retention = match env::var("KEEPSAKE_CHUNK_RETENTION_SECS") {
            Ok(value) => value.parse::<u64>().with_context(|| {
                format!("parsing KEEPSAKE_CHUNK_RETENTION_SECS value `{}`", value)
            })?,
            Err(env::VarError::NotPresent) => 3600,
            Err(err) => return Err(err).context("reading KEEPSAKE_CHUNK_RETENTION_SECS"),
        };

        // --- Merge ---
        let cfg = Self {
            host: args.host.unwrap_or(env_host),
            port: args.port.unwrap_or(env_port),
            media_dir: args.media_dir.unwrap_or(env_media),
            database_url: args.database_url.unwrap_or(env_db),
            chunk_retention_secs: args.chunk_retention_secs.unwrap_or(env_retention),
        };

        Ok((cfg, args.migrate))
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
