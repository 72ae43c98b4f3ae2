//! Upload orchestration.
//!
//! One request runs through the stages
//! `Parsing -> Saving -> Validating -> Generating -> Authenticating ->
//! Uploading -> Complete`, emitting progress events as it goes. Any failure
//! ends the request with a single `Error` event.

use crate::{
    models::{
        credential::StoredCredential,
        progress::{ProgressEvent, Stage, UploadResult},
        record::UploadRecord,
        upload::{UploadForm, UploadJob, UploadRequest, parse_schedule_time},
    },
    services::{
        credential_store::{CredentialError, CredentialStore},
        media_validator::MediaValidator,
        metadata_generator::MetadataGenerator,
        upload_history::UploadHistory,
        upload_store::{FileKind, StoreError, UploadStore},
        youtube_client::{ProgressFn, RetryPolicy, VideoHost, retry_upload},
    },
};
use chrono::Utc;
use futures::FutureExt;
use std::{
    any::Any,
    panic::AssertUnwindSafe,
    path::PathBuf,
    sync::{
        Arc,
        atomic::{AtomicU8, Ordering},
    },
};
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

const UPLOAD_SPAN: f64 = 60.0;

/// Failures that end a request. Every variant becomes one `Error` event.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("{0}")]
    Input(String),
    #[error("Video validation failed: {}", .0.join("; "))]
    InvalidVideo(Vec<String>),
    #[error("Thumbnail validation failed: {}", .0.join("; "))]
    InvalidThumbnail(Vec<String>),
    #[error("Not authenticated with YouTube. Please connect your account first.")]
    NotAuthenticated,
    #[error("Could not read stored credentials: {0}")]
    Credential(#[from] CredentialError),
    #[error("{message}")]
    Upload {
        message: String,
        video_id: Option<String>,
        video_url: Option<String>,
    },
    #[error("Could not save uploaded file: {0}")]
    Store(#[from] StoreError),
    #[error("Unexpected error during upload")]
    Unexpected,
}

/// Sends progress events to the response stream.
///
/// Progress never decreases within a request, even when a retried upload
/// restarts its transport progress at zero. Sends after the client has gone
/// away are dropped.
#[derive(Clone)]
pub struct ProgressReporter {
    tx: mpsc::UnboundedSender<ProgressEvent>,
    high_water: Arc<AtomicU8>,
}

impl ProgressReporter {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<ProgressEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                tx,
                high_water: Arc::new(AtomicU8::new(0)),
            },
            rx,
        )
    }

    pub fn emit(&self, mut event: ProgressEvent) {
        let previous = self.high_water.fetch_max(event.progress, Ordering::SeqCst);
        event.progress = event.progress.max(previous);
        if self.tx.send(event).is_err() {
            debug!("progress receiver dropped; continuing without client");
        }
    }

    pub fn stage(&self, stage: Stage, message: impl Into<String>) {
        info!(stage = ?stage, "upload stage");
        self.emit(ProgressEvent::new(stage, stage.base_progress(), message));
    }

    pub fn fail(&self, err: &PipelineError) {
        let mut event = ProgressEvent::failed(err.to_string());
        if let PipelineError::Upload {
            video_id,
            video_url,
            ..
        } = err
        {
            event.video_id = video_id.clone();
            event.video_url = video_url.clone();
        }
        self.emit(event);
    }

    /// Callback that rescales transport progress into the Uploading range.
    pub fn upload_progress(&self) -> ProgressFn {
        let reporter = self.clone();
        Arc::new(move |transport: f64| {
            let scaled = Stage::Uploading.base_progress() as f64
                + transport.clamp(0.0, 100.0) * UPLOAD_SPAN / 100.0;
            reporter.emit(ProgressEvent::new(
                Stage::Uploading,
                scaled.round() as u8,
                format!("Uploading video... {:.0}%", transport.clamp(0.0, 100.0)),
            ));
        })
    }
}

/// Files written for one request, removed when the request ends.
#[derive(Default)]
struct RequestFiles {
    paths: Vec<PathBuf>,
}

/// Drives a request through every stage.
pub struct UploadPipeline {
    pub store: UploadStore,
    pub validator: MediaValidator,
    pub generator: MetadataGenerator,
    pub credentials: Arc<dyn CredentialStore>,
    pub host: Arc<dyn VideoHost>,
    pub retry: RetryPolicy,
    pub history: Option<UploadHistory>,
}

impl UploadPipeline {
    /// Run the request to its terminal event.
    ///
    /// A panic in any stage still removes the request's files and ends the
    /// stream with an `Error` event.
    pub async fn execute(&self, form: UploadForm, events: &ProgressReporter) {
        let mut files = RequestFiles::default();
        let outcome = AssertUnwindSafe(self.run(form, events, &mut files))
            .catch_unwind()
            .await
            .unwrap_or_else(|panic| {
                error!("upload pipeline panicked: {}", panic_message(&*panic));
                Err(PipelineError::Unexpected)
            });

        for path in &files.paths {
            self.store.discard(path).await;
        }

        match outcome {
            Ok((video_id, video_url)) => {
                info!(video_id = %video_id, "upload complete");
                events.emit(ProgressEvent::complete(video_id, video_url));
            }
            Err(err) => {
                match &err {
                    PipelineError::Store(_) | PipelineError::Credential(_) => {
                        error!("upload request failed: {}", err)
                    }
                    PipelineError::Unexpected => {}
                    _ => warn!("upload request stopped: {}", err),
                }
                events.fail(&err);
            }
        }
    }

    async fn run(
        &self,
        form: UploadForm,
        events: &ProgressReporter,
        files: &mut RequestFiles,
    ) -> Result<(String, String), PipelineError> {
        events.stage(Stage::Parsing, "Parsing upload request");
        let staged: Vec<PathBuf> = form
            .video
            .iter()
            .chain(form.thumbnail.iter())
            .map(|f| f.path.clone())
            .collect();
        files.paths.extend(staged);
        let request = parse_request(form)?;

        events.stage(Stage::Saving, "Saving uploaded files");
        let video_path = self.store.persist(&request.video, FileKind::Video).await?;
        files.paths.push(video_path.clone());
        let thumbnail_path = match &request.thumbnail {
            Some(thumbnail) => {
                let path = self.store.persist(thumbnail, FileKind::Thumbnail).await?;
                files.paths.push(path.clone());
                Some(path)
            }
            None => None,
        };

        events.stage(Stage::Validating, "Validating video");
        let video_check = self.validator.validate_video(&video_path).await;
        if !video_check.valid {
            return Err(PipelineError::InvalidVideo(video_check.errors));
        }
        if let Some(path) = &thumbnail_path {
            let thumbnail_check = self.validator.validate_thumbnail(path).await;
            if !thumbnail_check.valid {
                return Err(PipelineError::InvalidThumbnail(thumbnail_check.errors));
            }
        }

        events.stage(Stage::Generating, "Generating title, description and tags");
        let metadata =
            self.generator
                .generate(&request.topic, &request.summary, request.language, &[]);

        events.stage(Stage::Authenticating, "Checking YouTube credentials");
        let credential: StoredCredential = self
            .credentials
            .load()
            .await?
            .ok_or(PipelineError::NotAuthenticated)?;

        events.stage(Stage::Uploading, "Uploading video to YouTube");
        let job = UploadJob {
            video_path,
            thumbnail_path,
            metadata,
            privacy: request.privacy,
            schedule_time: request.schedule_time,
        };
        let result = retry_upload(
            self.host.as_ref(),
            &credential,
            &job,
            &self.retry,
            Some(events.upload_progress()),
        )
        .await;
        self.record(&request, &job, &result).await;

        match result {
            UploadResult {
                success: true,
                video_id: Some(video_id),
                video_url: Some(video_url),
                ..
            } => Ok((video_id, video_url)),
            UploadResult {
                video_id,
                video_url,
                error,
                ..
            } => Err(PipelineError::Upload {
                message: error.unwrap_or_else(|| "Upload failed".into()),
                video_id,
                video_url,
            }),
        }
    }

    /// Write the outcome to history. Failures are logged and never fail the
    /// upload.
    async fn record(&self, request: &UploadRequest, job: &UploadJob, result: &UploadResult) {
        let Some(history) = &self.history else {
            return;
        };
        let record = UploadRecord {
            id: Uuid::new_v4(),
            video_id: result.video_id.clone(),
            video_url: result.video_url.clone(),
            title: job.metadata.title.clone(),
            topic: request.topic.clone(),
            language: request.language.as_str().into(),
            privacy: request.privacy.as_str().into(),
            status: if result.success { "uploaded" } else { "failed" }.into(),
            error: result.error.clone(),
            video_md5: request.video.md5.clone(),
            created_at: Utc::now(),
        };
        if let Err(err) = history.record(&record).await {
            warn!("failed to record upload history: {}", err);
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    panic
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| panic.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("non-string panic payload")
}

/// Turn the raw form into a request, reporting the first problem found.
fn parse_request(form: UploadForm) -> Result<UploadRequest, PipelineError> {
    let required = |value: Option<String>, name: &str| {
        value
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .ok_or_else(|| PipelineError::Input(format!("Missing required field: {}", name)))
    };

    let video = form
        .video
        .ok_or_else(|| PipelineError::Input("Missing required field: video".into()))?;
    let topic = required(form.topic, "topic")?;
    let summary = required(form.summary, "summary")?;

    let language = match form.language.as_deref().map(str::trim) {
        None | Some("") => Default::default(),
        Some(raw) => raw.parse().map_err(PipelineError::Input)?,
    };
    let privacy = match form.privacy.as_deref().map(str::trim) {
        None | Some("") => Default::default(),
        Some(raw) => raw.parse().map_err(PipelineError::Input)?,
    };
    let schedule_time = match form.schedule_time.as_deref().map(str::trim) {
        None | Some("") => None,
        Some(raw) => Some(parse_schedule_time(raw).map_err(PipelineError::Input)?),
    };

    Ok(UploadRequest {
        video,
        thumbnail: form.thumbnail,
        topic,
        summary,
        language,
        privacy,
        schedule_time,
    })
}
