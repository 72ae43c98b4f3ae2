//! Core data models for the video upload service.
//!
//! These types describe an upload request as it moves through the pipeline,
//! the technical and generated metadata attached to it, and the events
//! streamed back to the browser. They serialize as camelCase JSON via `serde`.

pub mod credential;
pub mod media;
pub mod progress;
pub mod record;
pub mod upload;
