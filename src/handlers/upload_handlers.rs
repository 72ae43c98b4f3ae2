//! `POST /api/upload`
//!
//! Reads the multipart form, runs the upload pipeline in a background task
//! and streams its progress back as server-sent events. Each frame is
//! `data: <ProgressEvent JSON>`; the stream ends after the `complete` or
//! `error` event.

use crate::{
    models::{
        progress::{ProgressEvent, Stage},
        upload::{StagedFile, UploadForm},
    },
    services::{
        upload_pipeline::{PipelineError, ProgressReporter},
        upload_store::{FileKind, StoreError, UploadStore},
    },
    state::AppState,
};
use axum::{
    extract::{Multipart, State, multipart::Field},
    http::{HeaderName, header},
    response::{
        IntoResponse,
        sse::{Event, KeepAlive, Sse},
    },
};
use futures::{Stream, TryStreamExt, stream};
use std::io;
use tokio::sync::mpsc;
use tracing::{debug, warn};

const X_ACCEL_BUFFERING: HeaderName = HeaderName::from_static("x-accel-buffering");

pub async fn upload(State(state): State<AppState>, multipart: Multipart) -> impl IntoResponse {
    let (reporter, rx) = ProgressReporter::channel();

    tokio::spawn(async move {
        let pipeline = state.pipeline;
        let mut form = UploadForm::default();
        if let Err(message) = read_form(&pipeline.store, multipart, &mut form).await {
            warn!("could not read upload form: {}", message);
            for staged in form.video.iter().chain(form.thumbnail.iter()) {
                pipeline.store.discard(&staged.path).await;
            }
            reporter.stage(Stage::Parsing, "Parsing upload request");
            reporter.fail(&PipelineError::Input(message));
            return;
        }
        pipeline.execute(form, &reporter).await;
    });

    (
        [
            (header::CACHE_CONTROL, "no-cache"),
            (X_ACCEL_BUFFERING, "no"),
        ],
        Sse::new(event_stream(rx)).keep_alive(KeepAlive::default()),
    )
}

/// SSE frames for every event the pipeline sends. Ends when the pipeline
/// drops its sender.
fn event_stream(
    rx: mpsc::UnboundedReceiver<ProgressEvent>,
) -> impl Stream<Item = Result<Event, axum::Error>> {
    stream::unfold(rx, |mut rx| async move {
        let event = rx.recv().await?;
        Some((Event::default().json_data(&event), rx))
    })
}

/// Collect the form fields, spooling file parts to disk as they arrive.
///
/// An empty file part counts as absent. Unknown fields are skipped.
async fn read_form(
    store: &UploadStore,
    mut multipart: Multipart,
    form: &mut UploadForm,
) -> Result<(), String> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| format!("Failed to read upload form: {}", e.body_text()))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "video" | "thumbnail" => {
                let kind = if name == "video" {
                    FileKind::Video
                } else {
                    FileKind::Thumbnail
                };
                let Some(staged) = spool_field(store, kind, field).await? else {
                    continue;
                };
                let slot = match kind {
                    FileKind::Video => &mut form.video,
                    FileKind::Thumbnail => &mut form.thumbnail,
                };
                if slot.is_some() {
                    debug!("ignoring repeated {} part", kind.as_str());
                    store.discard(&staged.path).await;
                } else {
                    *slot = Some(staged);
                }
            }
            "topic" | "summary" | "language" | "privacy" | "scheduleTime" => {
                let value = field
                    .text()
                    .await
                    .map_err(|e| format!("Failed to read field {}: {}", name, e.body_text()))?;
                let slot = match name.as_str() {
                    "topic" => &mut form.topic,
                    "summary" => &mut form.summary,
                    "language" => &mut form.language,
                    "privacy" => &mut form.privacy,
                    _ => &mut form.schedule_time,
                };
                *slot = Some(value);
            }
            other => debug!("skipping unknown form field `{}`", other),
        }
    }
    Ok(())
}

async fn spool_field(
    store: &UploadStore,
    kind: FileKind,
    field: Field<'_>,
) -> Result<Option<StagedFile>, String> {
    let original_name = field.file_name().map(str::to_string);
    let body = field.map_err(|e| io::Error::other(e.body_text()));

    match store.spool(kind, original_name, body).await {
        Ok(staged) => Ok(Some(staged)),
        Err(StoreError::Empty(_)) => Ok(None),
        Err(err) => Err(format!("Failed to save {}: {}", kind.as_str(), err)),
    }
}
