//! Keepsake — a shared event gallery built around a chunked large-media
//! upload pipeline: guests' files are compressed client-side, split into
//! bounded chunks, transmitted with bounded retries, held transiently
//! server-side, and reassembled in index order into durable gallery items.

pub mod client;
pub mod config;
pub mod errors;
pub mod handlers;
pub mod models;
pub mod routes;
pub mod services;
