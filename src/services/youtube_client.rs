//! YouTube Data API v3 client.
//!
//! Covers the OAuth2 authorization-code flow, the resumable video upload,
//! custom thumbnails and playlist insertion. The pipeline talks to it through
//! the [`VideoHost`] trait, which never fails out-of-band: every outcome is an
//! [`UploadResult`].

use crate::models::{
    credential::StoredCredential,
    progress::UploadResult,
    upload::{Language, UploadJob},
};
use async_trait::async_trait;
use chrono::SecondsFormat;
use futures::TryStreamExt;
use reqwest::{StatusCode, header};
use serde::Deserialize;
use serde_json::{Value, json};
use std::{io, path::Path, sync::Arc, time::Duration};
use thiserror::Error;
use tokio::fs::File;
use tokio_util::io::ReaderStream;
use tracing::{debug, info, warn};
use url::Url;

/// Upload scopes requested during authorization.
pub const SCOPES: [&str; 2] = [
    "https://www.googleapis.com/auth/youtube.upload",
    "https://www.googleapis.com/auth/youtube",
];

const CATEGORY_PEOPLE_AND_BLOGS: &str = "22";

/// Receives transport progress as a percentage in `0.0..=100.0`.
pub type ProgressFn = Arc<dyn Fn(f64) + Send + Sync>;

#[derive(Debug, Error)]
pub enum UploadError {
    #[error("authorization code rejected: {0}")]
    CodeRejected(String),
    #[error("token response did not include a refresh token")]
    MissingRefreshToken,
    #[error("platform returned {status}: {body}")]
    Api { status: StatusCode, body: String },
    #[error("upload session was not created: {0}")]
    Session(String),
    #[error("invalid endpoint url: {0}")]
    Url(#[from] url::ParseError),
    #[error(transparent)]
    Http(#[from] reqwest::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type UploadClientResult<T> = Result<T, UploadError>;

/// Uploads one video with its follow-up calls.
#[async_trait]
pub trait VideoHost: Send + Sync {
    /// Perform a single upload attempt.
    async fn upload_video(
        &self,
        credential: &StoredCredential,
        job: &UploadJob,
        on_progress: Option<ProgressFn>,
    ) -> UploadResult;
}

/// OAuth2 application credentials.
#[derive(Clone)]
pub struct OAuthConfig {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: String,
}

/// Platform endpoints. Overridable so tests can point at a local server.
#[derive(Debug, Clone)]
pub struct Endpoints {
    pub auth: String,
    pub token: String,
    pub videos_upload: String,
    pub thumbnails_set: String,
    pub playlist_items: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            auth: "https://accounts.google.com/o/oauth2/v2/auth".into(),
            token: "https://oauth2.googleapis.com/token".into(),
            videos_upload: "https://www.googleapis.com/upload/youtube/v3/videos".into(),
            thumbnails_set: "https://www.googleapis.com/upload/youtube/v3/thumbnails/set".into(),
            playlist_items: "https://www.googleapis.com/youtube/v3/playlistItems".into(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct VideoResponse {
    id: String,
}

pub struct YouTubeClient {
    oauth: OAuthConfig,
    playlist_id: Option<String>,
    endpoints: Endpoints,
    http: reqwest::Client,
}

impl YouTubeClient {
    pub fn new(oauth: OAuthConfig, playlist_id: Option<String>) -> UploadClientResult<Self> {
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(15))
            .build()?;
        Ok(Self {
            oauth,
            playlist_id,
            endpoints: Endpoints::default(),
            http,
        })
    }

    pub fn with_endpoints(mut self, endpoints: Endpoints) -> Self {
        self.endpoints = endpoints;
        self
    }

    pub fn with_http_client(mut self, http: reqwest::Client) -> Self {
        self.http = http;
        self
    }

    /// Authorization URL requesting offline access and forced consent, so
    /// the platform always returns a refresh token.
    pub fn auth_url(&self) -> UploadClientResult<String> {
        let scope = SCOPES.join(" ");
        let url = Url::parse_with_params(
            &self.endpoints.auth,
            &[
                ("client_id", self.oauth.client_id.as_str()),
                ("redirect_uri", self.oauth.redirect_uri.as_str()),
                ("response_type", "code"),
                ("scope", scope.as_str()),
                ("access_type", "offline"),
                ("prompt", "consent"),
            ],
        )?;
        Ok(url.into())
    }

    /// Exchange an authorization code for a token pair.
    pub async fn exchange_code(&self, code: &str) -> UploadClientResult<StoredCredential> {
        let response = self
            .http
            .post(&self.endpoints.token)
            .form(&[
                ("code", code),
                ("client_id", self.oauth.client_id.as_str()),
                ("client_secret", self.oauth.client_secret.as_str()),
                ("redirect_uri", self.oauth.redirect_uri.as_str()),
                ("grant_type", "authorization_code"),
            ])
            .send()
            .await?;

        if !response.status().is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(UploadError::CodeRejected(body));
        }

        let tokens: TokenResponse = response.json().await?;
        let refresh_token = tokens
            .refresh_token
            .ok_or(UploadError::MissingRefreshToken)?;
        info!("authorization code exchanged for tokens");
        Ok(StoredCredential {
            access_token: tokens.access_token,
            refresh_token,
        })
    }

    /// Obtain a fresh access token. The new token is used for the current
    /// attempt only and is not persisted.
    pub async fn refresh_access_token(&self, refresh_token: &str) -> UploadClientResult<String> {
        let response = self
            .http
            .post(&self.endpoints.token)
            .form(&[
                ("refresh_token", refresh_token),
                ("client_id", self.oauth.client_id.as_str()),
                ("client_secret", self.oauth.client_secret.as_str()),
                ("grant_type", "refresh_token"),
            ])
            .send()
            .await?;
        let response = error_for_status(response).await?;
        let tokens: TokenResponse = response.json().await?;
        debug!("access token refreshed");
        Ok(tokens.access_token)
    }

    /// Open a resumable upload session and return its URI.
    async fn start_session(
        &self,
        access_token: &str,
        job: &UploadJob,
        size_bytes: u64,
    ) -> UploadClientResult<String> {
        let response = self
            .http
            .post(&self.endpoints.videos_upload)
            .query(&[("uploadType", "resumable"), ("part", "snippet,status")])
            .bearer_auth(access_token)
            .header("X-Upload-Content-Length", size_bytes)
            .header("X-Upload-Content-Type", video_content_type(&job.video_path))
            .json(&video_resource(job))
            .send()
            .await?;
        let response = error_for_status(response).await?;

        response
            .headers()
            .get(header::LOCATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .ok_or_else(|| UploadError::Session("response had no Location header".into()))
    }

    /// Stream the file to the session URI, reporting progress as chunks are
    /// handed to the transport. Returns the new video id.
    async fn send_file(
        &self,
        session_uri: &str,
        path: &Path,
        size_bytes: u64,
        on_progress: Option<ProgressFn>,
    ) -> UploadClientResult<String> {
        let file = File::open(path).await?;
        let mut sent: u64 = 0;
        let stream = ReaderStream::new(file).inspect_ok(move |chunk| {
            sent += chunk.len() as u64;
            if let Some(report) = &on_progress {
                report(percent(sent, size_bytes));
            }
        });

        let response = self
            .http
            .put(session_uri)
            .header(header::CONTENT_LENGTH, size_bytes)
            .header(header::CONTENT_TYPE, video_content_type(path))
            .body(reqwest::Body::wrap_stream(stream))
            .send()
            .await?;
        let response = error_for_status(response).await?;
        let video: VideoResponse = response.json().await?;
        Ok(video.id)
    }

    /// Primary upload: session start (with one token refresh on 401) and
    /// file transfer. Returns the video id and the access token that worked.
    async fn upload_file(
        &self,
        credential: &StoredCredential,
        job: &UploadJob,
        on_progress: Option<ProgressFn>,
    ) -> UploadClientResult<(String, String)> {
        let size_bytes = tokio::fs::metadata(&job.video_path).await?.len();
        let mut access_token = credential.access_token.clone();

        let session_uri = match self.start_session(&access_token, job, size_bytes).await {
            Err(UploadError::Api { status, .. }) if status == StatusCode::UNAUTHORIZED => {
                warn!("access token rejected, refreshing");
                access_token = self
                    .refresh_access_token(&credential.refresh_token)
                    .await?;
                self.start_session(&access_token, job, size_bytes).await?
            }
            other => other?,
        };
        debug!("upload session opened");

        let video_id = self
            .send_file(&session_uri, &job.video_path, size_bytes, on_progress)
            .await?;
        Ok((video_id, access_token))
    }

    pub async fn set_thumbnail(
        &self,
        access_token: &str,
        video_id: &str,
        path: &Path,
    ) -> UploadClientResult<()> {
        let bytes = tokio::fs::read(path).await?;
        let response = self
            .http
            .post(&self.endpoints.thumbnails_set)
            .query(&[("videoId", video_id)])
            .bearer_auth(access_token)
            .header(header::CONTENT_TYPE, image_content_type(path))
            .body(bytes)
            .send()
            .await?;
        error_for_status(response).await?;
        debug!(video_id, "thumbnail set");
        Ok(())
    }

    pub async fn add_to_playlist(
        &self,
        access_token: &str,
        playlist_id: &str,
        video_id: &str,
    ) -> UploadClientResult<()> {
        let response = self
            .http
            .post(&self.endpoints.playlist_items)
            .query(&[("part", "snippet")])
            .bearer_auth(access_token)
            .json(&json!({
                "snippet": {
                    "playlistId": playlist_id,
                    "resourceId": { "kind": "youtube#video", "videoId": video_id }
                }
            }))
            .send()
            .await?;
        error_for_status(response).await?;
        debug!(video_id, playlist_id, "video added to playlist");
        Ok(())
    }
}

#[async_trait]
impl VideoHost for YouTubeClient {
    async fn upload_video(
        &self,
        credential: &StoredCredential,
        job: &UploadJob,
        on_progress: Option<ProgressFn>,
    ) -> UploadResult {
        let (video_id, access_token) = match self.upload_file(credential, job, on_progress).await
        {
            Ok(uploaded) => uploaded,
            Err(err) => {
                warn!("video upload failed: {}", err);
                return UploadResult::failed(err.to_string());
            }
        };
        info!(video_id = %video_id, "video uploaded");

        if let Some(thumbnail) = &job.thumbnail_path {
            if let Err(err) = self.set_thumbnail(&access_token, &video_id, thumbnail).await {
                warn!(video_id = %video_id, "thumbnail failed: {}", err);
                return UploadResult::partially_failed(
                    video_id,
                    format!("Video uploaded but the thumbnail could not be set: {}", err),
                );
            }
        }

        if let Some(playlist_id) = &self.playlist_id {
            if let Err(err) = self
                .add_to_playlist(&access_token, playlist_id, &video_id)
                .await
            {
                warn!(video_id = %video_id, "playlist insert failed: {}", err);
                return UploadResult::partially_failed(
                    video_id,
                    format!("Video uploaded but could not be added to the playlist: {}", err),
                );
            }
        }

        UploadResult::uploaded(video_id)
    }
}

/// Backoff settings for [`retry_upload`].
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total number of attempts.
    pub max_retries: u32,
    /// Multiplied by `2^attempt` to get the wait after a failed attempt.
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    /// Wait after the 1-based `attempt` failed: 2s, 4s, 8s, ...
    pub fn delay_after(&self, attempt: u32) -> Duration {
        self.base_delay
            .saturating_mul(2u32.saturating_pow(attempt))
    }
}

/// Call `upload_video` until it succeeds, fails permanently, or the attempts
/// run out.
pub async fn retry_upload(
    host: &dyn VideoHost,
    credential: &StoredCredential,
    job: &UploadJob,
    policy: &RetryPolicy,
    on_progress: Option<ProgressFn>,
) -> UploadResult {
    let attempts = policy.max_retries.max(1);
    let mut last_error = String::from("no attempt was made");

    for attempt in 1..=attempts {
        let result = host.upload_video(credential, job, on_progress.clone()).await;
        if result.success {
            if attempt > 1 {
                info!(attempt, "upload succeeded after retry");
            }
            return result;
        }
        if !result.retryable {
            return result;
        }

        last_error = result.error.unwrap_or_else(|| "unknown error".into());
        if attempt < attempts {
            let delay = policy.delay_after(attempt);
            warn!(
                "Upload attempt {}/{} failed: {}. Retrying in {:?}",
                attempt, attempts, last_error, delay
            );
            tokio::time::sleep(delay).await;
        }
    }

    UploadResult::failed(format!(
        "Failed after {} attempts. Last error: {}",
        attempts, last_error
    ))
}

/// Video resource sent when opening the upload session. Scheduled videos
/// must be private until `publishAt`.
pub fn video_resource(job: &UploadJob) -> Value {
    let language = match job.metadata.language {
        Language::En => "en",
        Language::Hi | Language::Hinglish => "hi",
    };
    let mut status = json!({
        "privacyStatus": job.privacy.as_str(),
        "selfDeclaredMadeForKids": false,
    });
    if let Some(publish_at) = job.schedule_time {
        status["privacyStatus"] = json!("private");
        status["publishAt"] = json!(publish_at.to_rfc3339_opts(SecondsFormat::Secs, true));
    }

    json!({
        "snippet": {
            "title": job.metadata.title,
            "description": job.metadata.description,
            "tags": job.metadata.tags,
            "categoryId": CATEGORY_PEOPLE_AND_BLOGS,
            "defaultLanguage": language,
            "defaultAudioLanguage": language,
        },
        "status": status,
    })
}

fn percent(done: u64, total: u64) -> f64 {
    if total == 0 {
        100.0
    } else {
        (done as f64 / total as f64 * 100.0).min(100.0)
    }
}

fn extension(path: &Path) -> String {
    path.extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default()
}

fn video_content_type(path: &Path) -> &'static str {
    match extension(path).as_str() {
        "mp4" | "m4v" => "video/mp4",
        "mov" => "video/quicktime",
        "webm" => "video/webm",
        "mkv" => "video/x-matroska",
        _ => "application/octet-stream",
    }
}

fn image_content_type(path: &Path) -> &'static str {
    match extension(path).as_str() {
        "png" => "image/png",
        _ => "image/jpeg",
    }
}

async fn error_for_status(response: reqwest::Response) -> UploadClientResult<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(UploadError::Api { status, body })
}
