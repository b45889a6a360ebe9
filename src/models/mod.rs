//! Core data models for the shared event gallery.
//!
//! These entities cover the durable gallery items, the transient upload
//! chunks, and server-minted upload sessions. They map cleanly to database
//! tables via `sqlx::FromRow` and serialize naturally as JSON via `serde`.

pub mod chunk;
pub mod media;
pub mod session;
