//! Progress events streamed to the browser and the result of an upload
//! attempt.

use serde::{Deserialize, Serialize};

/// Named phase of the upload pipeline. Stages are visited in declaration
/// order; `Complete` and `Error` are terminal.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Parsing,
    Saving,
    Validating,
    Generating,
    Authenticating,
    Uploading,
    Complete,
    Error,
}

impl Stage {
    /// Progress percentage reported when the stage starts.
    pub fn base_progress(&self) -> u8 {
        match self {
            Stage::Parsing => 5,
            Stage::Saving => 10,
            Stage::Validating => 20,
            Stage::Generating => 30,
            Stage::Authenticating => 35,
            Stage::Uploading => 40,
            Stage::Complete => 100,
            Stage::Error => 0,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Stage::Complete | Stage::Error)
    }
}

/// One frame of the upload event stream.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProgressEvent {
    pub stage: Stage,
    pub progress: u8,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub video_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub video_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ProgressEvent {
    pub fn new(stage: Stage, progress: u8, message: impl Into<String>) -> Self {
        Self {
            stage,
            progress: progress.min(100),
            message: message.into(),
            video_id: None,
            video_url: None,
            error: None,
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        let message = message.into();
        Self {
            error: Some(message.clone()),
            ..Self::new(Stage::Error, 0, message)
        }
    }

    pub fn complete(video_id: String, video_url: String) -> Self {
        Self {
            video_id: Some(video_id),
            video_url: Some(video_url),
            ..Self::new(Stage::Complete, 100, "Upload complete")
        }
    }
}

/// Result of one upload attempt, or of a sequence of retried attempts.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct UploadResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub video_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub video_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Whether repeating the attempt could help. False once the video exists
    /// on the platform, so a retry would create a duplicate.
    #[serde(skip)]
    pub retryable: bool,
}

impl UploadResult {
    pub fn uploaded(video_id: impl Into<String>) -> Self {
        let video_id = video_id.into();
        Self {
            success: true,
            video_url: Some(watch_url(&video_id)),
            video_id: Some(video_id),
            error: None,
            retryable: false,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            retryable: true,
            ..Default::default()
        }
    }

    /// The video was created but a follow-up call failed.
    pub fn partially_failed(video_id: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            retryable: false,
            ..Self::uploaded(video_id)
        }
    }
}

/// Public watch URL of a video.
pub fn watch_url(video_id: &str) -> String {
    format!("https://www.youtube.com/watch?v={}", video_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_serializes_camel_case_without_empty_fields() {
        let event = ProgressEvent::new(Stage::Authenticating, 35, "Checking credentials");
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["stage"], "authenticating");
        assert_eq!(json["progress"], 35);
        assert!(json.get("videoUrl").is_none());

        let done = ProgressEvent::complete("abc".into(), watch_url("abc"));
        let json = serde_json::to_value(&done).unwrap();
        assert_eq!(json["videoUrl"], "https://www.youtube.com/watch?v=abc");
        assert_eq!(json["progress"], 100);
    }

    #[test]
    fn partial_failure_keeps_video_id_and_is_not_retryable() {
        let result = UploadResult::partially_failed("vid1", "thumbnail rejected");
        assert!(!result.success);
        assert!(!result.retryable);
        assert_eq!(result.video_id.as_deref(), Some("vid1"));

        let json = serde_json::to_value(&result).unwrap();
        assert!(json.get("retryable").is_none());
    }
}
