pub mod media_host;
pub mod media_service;
