//! Represents the recorded outcome of an upload.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// One row of upload history.
///
/// Written once the upload stage finishes, whether it succeeded or not.
#[derive(Serialize, Deserialize, Clone, FromRow, Debug)]
#[serde(rename_all = "camelCase")]
pub struct UploadRecord {
    /// Internal UUID for DB indexing.
    pub id: Uuid,

    /// Platform video id, when the video was created.
    pub video_id: Option<String>,

    /// Public watch URL, when the video was created.
    pub video_url: Option<String>,

    /// Generated title sent to the platform.
    pub title: String,

    /// Topic as entered in the form.
    pub topic: String,

    /// Language code (`hi`, `en`, `hinglish`).
    pub language: String,

    /// Privacy status requested (`public`, `unlisted`, `private`).
    pub privacy: String,

    /// `uploaded` or `failed`.
    pub status: String,

    /// Last error message for failed uploads.
    pub error: Option<String>,

    /// MD5 checksum of the uploaded video file.
    pub video_md5: String,

    /// When the upload finished.
    pub created_at: DateTime<Utc>,
}
