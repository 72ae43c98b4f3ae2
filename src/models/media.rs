//! Technical and descriptive metadata attached to an upload.

use serde::{Deserialize, Serialize};

use super::upload::Language;

/// Technical properties of a probed video file.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct VideoMetadata {
    /// Duration in seconds.
    pub duration: f64,
    pub width: u32,
    pub height: u32,
    /// Width divided by height.
    pub aspect_ratio: f64,
    pub has_audio: bool,
    /// Container format names as reported by the probe (e.g. `mov,mp4,m4a`).
    pub format: String,
    /// Overall bitrate in bits per second, when known.
    pub bitrate: Option<u64>,
    /// Frames per second of the first video stream; 0 when unknown.
    pub fps: f64,
    /// Codec names of every stream, in stream order.
    pub codecs: Vec<String>,
}

/// Title, description and tags generated for an upload.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GeneratedMetadata {
    pub title: String,
    pub description: String,
    pub tags: Vec<String>,
    pub language: Language,
}

/// Outcome of validating a video file.
#[derive(Serialize, Clone, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct VideoValidation {
    pub valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<VideoMetadata>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
}

/// Outcome of validating a thumbnail image.
#[derive(Serialize, Clone, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct ThumbnailValidation {
    pub valid: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
}
