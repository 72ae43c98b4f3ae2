use anyhow::{Context, Result};
use axum::Router;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use std::{io::ErrorKind, str::FromStr, sync::Arc};
use tokio::{fs, net::TcpListener};
use tracing_subscriber::EnvFilter;

mod config;
mod errors;
mod handlers;
mod models;
mod routes;
mod services;
mod state;

use services::{
    credential_store::{CredentialStore, FileCredentialStore},
    media_validator::{FfprobeProbe, MediaValidator},
    metadata_generator::MetadataGenerator,
    upload_history::UploadHistory,
    upload_pipeline::UploadPipeline,
    upload_store::UploadStore,
    youtube_client::{OAuthConfig, RetryPolicy, YouTubeClient},
};

#[tokio::main]
async fn main() -> Result<()> {
    // --- Logging setup ---
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // --- Parse config + migrate flag ---
    let (cfg, migrate) = config::AppConfig::from_env_and_args()?;

    tracing::info!("Starting video-uploader with config: {:?}", cfg);

    // --- Ensure upload directory exists ---
    if fs::metadata(&cfg.upload_dir).await.is_err() {
        fs::create_dir_all(&cfg.upload_dir)
            .await
            .with_context(|| format!("creating upload directory {}", cfg.upload_dir.display()))?;
        tracing::info!("Created upload directory at {}", cfg.upload_dir.display());
    }

    // --- Initialize SQLite connection ---
    tracing::debug!("Connecting to {}", cfg.database_url);
    let connect_options = SqliteConnectOptions::from_str(&cfg.database_url)
        .with_context(|| format!("parsing database url `{}`", cfg.database_url))?
        .create_if_missing(true);
    if let Some(parent) = connect_options.get_filename().parent() {
        if !parent.as_os_str().is_empty() && fs::metadata(parent).await.is_err() {
            fs::create_dir_all(parent).await?;
            tracing::info!("Created missing directory {:?}", parent);
        }
    }

    let db: Arc<sqlx::Pool<sqlx::Sqlite>> = Arc::new(
        SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(connect_options)
            .await?,
    );
    let history = UploadHistory::new(db.clone());

    // --- Schema (idempotent) ---
    let applied = history.migrate().await?;
    tracing::info!("Applied {} migration statements", applied);
    if migrate {
        tracing::info!("Database migration complete.");
        return Ok(()); // exit after migration
    }

    // --- Initialize services ---
    let youtube = Arc::new(YouTubeClient::new(
        OAuthConfig {
            client_id: cfg.youtube.client_id.clone(),
            client_secret: cfg.youtube.client_secret.clone(),
            redirect_uri: cfg.youtube.redirect_uri.clone(),
        },
        cfg.youtube.playlist_id.clone(),
    )?);
    let credentials: Arc<dyn CredentialStore> =
        Arc::new(FileCredentialStore::new(cfg.token_path.clone()));

    let probe = Arc::new(FfprobeProbe::new(cfg.ffprobe_path.clone()));
    let pipeline = UploadPipeline {
        store: UploadStore::new(cfg.upload_dir.clone()),
        validator: MediaValidator::new(probe),
        generator: MetadataGenerator::new(),
        credentials: credentials.clone(),
        host: youtube.clone(),
        retry: RetryPolicy::default(),
        history: Some(history.clone()),
    };
    if !pipeline.validator.probe().is_available().await {
        tracing::warn!(
            "{} not found; uploads will skip video validation",
            cfg.ffprobe_path
        );
    }

    let state = state::AppState {
        pipeline: Arc::new(pipeline),
        youtube,
        credentials,
        history,
    };

    // --- Build router ---
    let app: Router = routes::routes::routes(cfg.max_upload_bytes()).with_state(state);

    // --- Start server ---
    let addr = cfg.addr();
    let listener = match TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(err)
            if err.kind() == ErrorKind::PermissionDenied
                && matches!(cfg.host.as_str(), "0.0.0.0" | "::") =>
        {
            let fallback_addr = format!("127.0.0.1:{}", cfg.port);
            tracing::warn!(
                "Permission denied binding to {} ({}). Falling back to {}",
                addr,
                err,
                fallback_addr
            );
            TcpListener::bind(&fallback_addr).await?
        }
        Err(err) => return Err(err.into()),
    };

    tracing::info!("Server listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app).await?;

    Ok(())
}
