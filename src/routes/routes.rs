//! HTTP routes.
//!
//! - `POST /api/upload`        -> multipart upload, answered with an SSE progress stream
//! - `GET  /api/auth/url`      -> authorization URL for connecting the account
//! - `GET  /api/auth/callback` -> OAuth redirect target
//! - `GET  /api/auth/status`   -> whether a credential is stored
//! - `GET  /api/uploads`       -> recent upload history
//! - `GET  /healthz`, `GET /readyz`

use crate::{
    handlers::{
        auth_handlers::{auth_callback, auth_status, auth_url},
        health_handlers::{healthz, readyz},
        history_handlers::list_uploads,
        upload_handlers::upload,
    },
    state::AppState,
};
use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{get, post},
};
use tower_http::trace::TraceLayer;

/// Build the router. `max_upload_bytes` bounds the upload request body; the
/// other routes keep axum's default limit.
pub fn routes(max_upload_bytes: usize) -> Router<AppState> {
    Router::new()
        // health endpoints (mounted at root)
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route(
            "/api/upload",
            post(upload).layer(DefaultBodyLimit::max(max_upload_bytes)),
        )
        .route("/api/auth/url", get(auth_url))
        .route("/api/auth/callback", get(auth_callback))
        .route("/api/auth/status", get(auth_status))
        .route("/api/uploads", get(list_uploads))
        .layer(TraceLayer::new_for_http())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        models::{
            credential::StoredCredential,
            progress::{ProgressEvent, Stage, UploadResult},
        },
        services::{
            credential_store::{CredentialStore, MemoryCredentialStore},
            upload_history::tests::memory_history,
            upload_pipeline::tests::{PanickingHost, ScriptedHost, credential, pipeline},
            youtube_client::{OAuthConfig, VideoHost, YouTubeClient},
        },
    };
    use axum::{
        body::{Body, to_bytes},
        http::{Request, StatusCode, header},
    };
    use std::{path::Path, sync::Arc};
    use tower::ServiceExt;

    const BOUNDARY: &str = "uploadboundary";

    async fn app(dir: &Path, credential: Option<StoredCredential>) -> (Router, AppState) {
        let host = Arc::new(ScriptedHost::new(vec![UploadResult::uploaded("vid1")]));
        app_with_host(dir, credential, host).await
    }

    async fn app_with_host(
        dir: &Path,
        credential: Option<StoredCredential>,
        host: Arc<dyn VideoHost>,
    ) -> (Router, AppState) {
        let mut pipeline = pipeline(dir, host, None, 400.0);
        let credentials: Arc<dyn CredentialStore> =
            Arc::new(MemoryCredentialStore::new(credential));
        pipeline.credentials = credentials.clone();
        let history = memory_history().await;
        pipeline.history = Some(history.clone());

        let youtube = YouTubeClient::new(
            OAuthConfig {
                client_id: "client-123".into(),
                client_secret: "secret".into(),
                redirect_uri: "http://localhost:3000/api/auth/callback".into(),
            },
            None,
        )
        .unwrap();

        let state = AppState {
            pipeline: Arc::new(pipeline),
            youtube: Arc::new(youtube),
            credentials,
            history,
        };
        (routes(1024 * 1024).with_state(state.clone()), state)
    }

    fn multipart(fields: &[(&str, Option<&str>, &str)]) -> Body {
        let mut body = String::new();
        for (name, file_name, value) in fields {
            body.push_str(&format!("--{}\r\n", BOUNDARY));
            match file_name {
                Some(file_name) => body.push_str(&format!(
                    "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\n\
                     Content-Type: application/octet-stream\r\n\r\n",
                    name, file_name
                )),
                None => body.push_str(&format!(
                    "Content-Disposition: form-data; name=\"{}\"\r\n\r\n",
                    name
                )),
            }
            body.push_str(value);
            body.push_str("\r\n");
        }
        body.push_str(&format!("--{}--\r\n", BOUNDARY));
        Body::from(body)
    }

    fn upload_request(body: Body) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/api/upload")
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={}", BOUNDARY),
            )
            .body(body)
            .unwrap()
    }

    async fn sse_events(router: Router, request: Request<Body>) -> Vec<ProgressEvent> {
        let response = router.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(
            response.headers()[header::CONTENT_TYPE]
                .to_str()
                .unwrap()
                .starts_with("text/event-stream")
        );
        assert_eq!(response.headers()["x-accel-buffering"], "no");
        assert_eq!(response.headers()[header::CACHE_CONTROL], "no-cache");

        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(bytes.to_vec())
            .unwrap()
            .lines()
            .filter_map(|line| line.strip_prefix("data: "))
            .map(|data| serde_json::from_str(data).unwrap())
            .collect()
    }

    async fn get_json(router: Router, uri: &str) -> (StatusCode, serde_json::Value) {
        let response = router
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn upload_streams_progress_until_complete() {
        let dir = tempfile::tempdir().unwrap();
        let (router, state) = app(dir.path(), Some(credential())).await;

        let body = multipart(&[
            ("video", Some("clip.mp4"), "not really a video"),
            ("thumbnail", Some(""), ""),
            ("topic", None, "Dyatlov Pass"),
            ("summary", None, "Nine hikers, one tent."),
            ("language", None, "hinglish"),
            ("privacy", None, "unlisted"),
        ]);
        let events = sse_events(router, upload_request(body)).await;

        assert_eq!(events.first().unwrap().stage, Stage::Parsing);
        let last = events.last().unwrap();
        assert_eq!(last.stage, Stage::Complete);
        assert_eq!(last.progress, 100);
        assert_eq!(
            last.video_url.as_deref(),
            Some("https://www.youtube.com/watch?v=vid1")
        );

        let history = state.history.recent(5).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].privacy, "unlisted");
        assert_eq!(history[0].language, "hinglish");
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn upload_without_topic_ends_with_error_frame() {
        let dir = tempfile::tempdir().unwrap();
        let (router, _) = app(dir.path(), Some(credential())).await;

        let body = multipart(&[
            ("video", Some("clip.mp4"), "bytes"),
            ("summary", None, "Something happened."),
        ]);
        let events = sse_events(router, upload_request(body)).await;

        let stages: Vec<_> = events.iter().map(|e| e.stage).collect();
        assert_eq!(stages, vec![Stage::Parsing, Stage::Error]);
        assert_eq!(
            events[1].error.as_deref(),
            Some("Missing required field: topic")
        );
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn upload_without_credential_reports_authentication_error() {
        let dir = tempfile::tempdir().unwrap();
        let (router, _) = app(dir.path(), None).await;

        let body = multipart(&[
            ("video", Some("clip.mp4"), "bytes"),
            ("topic", None, "Zodiac"),
            ("summary", None, "Ciphers."),
        ]);
        let events = sse_events(router, upload_request(body)).await;

        let last = events.last().unwrap();
        assert_eq!(last.stage, Stage::Error);
        assert!(last.message.contains("Not authenticated"));
    }

    #[tokio::test]
    async fn panicking_host_still_ends_stream_with_error_frame() {
        let dir = tempfile::tempdir().unwrap();
        let (router, _) =
            app_with_host(dir.path(), Some(credential()), Arc::new(PanickingHost)).await;

        let body = multipart(&[
            ("video", Some("clip.mp4"), "bytes"),
            ("topic", None, "Roopkund"),
            ("summary", None, "A lake of skeletons."),
        ]);
        let events = sse_events(router, upload_request(body)).await;

        assert!(events.iter().any(|e| e.stage == Stage::Uploading));
        let last = events.last().unwrap();
        assert_eq!(last.stage, Stage::Error);
        assert_eq!(last.message, "Unexpected error during upload");
        assert_eq!(
            events.iter().filter(|e| e.stage == Stage::Error).count(),
            1
        );
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn auth_status_reflects_stored_credential() {
        let dir = tempfile::tempdir().unwrap();
        let (router, state) = app(dir.path(), None).await;

        let (status, body) = get_json(router.clone(), "/api/auth/status").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["authenticated"], false);

        state.credentials.save(&credential()).await.unwrap();
        let (_, body) = get_json(router, "/api/auth/status").await;
        assert_eq!(body["authenticated"], true);
    }

    #[tokio::test]
    async fn auth_url_requests_offline_access() {
        let dir = tempfile::tempdir().unwrap();
        let (router, _) = app(dir.path(), None).await;

        let (status, body) = get_json(router, "/api/auth/url").await;
        assert_eq!(status, StatusCode::OK);
        let url = body["url"].as_str().unwrap();
        assert!(url.contains("client_id=client-123"));
        assert!(url.contains("access_type=offline"));
        assert!(url.contains("prompt=consent"));
    }

    #[tokio::test]
    async fn callback_without_code_is_bad_request() {
        let dir = tempfile::tempdir().unwrap();
        let (router, _) = app(dir.path(), None).await;

        let (status, body) = get_json(router.clone(), "/api/auth/callback").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["status"], 400);

        let (status, body) = get_json(router, "/api/auth/callback?error=access_denied").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains("access_denied"));
    }

    #[tokio::test]
    async fn uploads_history_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        let (router, _) = app(dir.path(), None).await;

        let (status, body) = get_json(router, "/api/uploads?limit=5").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, serde_json::json!([]));
    }

    #[tokio::test]
    async fn health_and_readiness() {
        let dir = tempfile::tempdir().unwrap();
        let (router, _) = app(dir.path(), None).await;

        let (status, body) = get_json(router.clone(), "/healthz").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");

        let (status, body) = get_json(router, "/readyz").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["checks"]["sqlite"]["ok"], true);
        assert_eq!(body["checks"]["disk"]["ok"], true);
        assert_eq!(body["checks"]["ffprobe"]["ok"], true);
    }
}
