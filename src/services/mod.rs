//! Services behind the HTTP handlers.
//!
//! Each service owns one concern and its own error type; the upload
//! pipeline composes them.

pub mod credential_store;
pub mod media_validator;
pub mod metadata_generator;
pub mod upload_history;
pub mod upload_pipeline;
pub mod upload_store;
pub mod youtube_client;
