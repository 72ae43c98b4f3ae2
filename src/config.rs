use anyhow::{Context, Result};
use clap::Parser;
use std::{env, fmt, path::PathBuf};

/// Centralized application configuration.
/// Combines environment variables and CLI arguments.
#[derive(Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub upload_dir: PathBuf,
    pub token_path: PathBuf,
    pub database_url: String,
    pub ffprobe_path: String,
    pub max_upload_mb: u64,
    pub youtube: YouTubeConfig,
}

/// OAuth client registration and upload target on the video platform.
#[derive(Clone)]
pub struct YouTubeConfig {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: String,
    pub playlist_id: Option<String>,
}

impl fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("upload_dir", &self.upload_dir)
            .field("token_path", &self.token_path)
            .field("database_url", &self.database_url)
            .field("ffprobe_path", &self.ffprobe_path)
            .field("max_upload_mb", &self.max_upload_mb)
            .field("youtube", &self.youtube)
            .finish()
    }
}

impl fmt::Debug for YouTubeConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("YouTubeConfig")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("redirect_uri", &self.redirect_uri)
            .field("playlist_id", &self.playlist_id)
            .finish()
    }
}

/// Command-line + environment configuration.
#[derive(Parser, Debug, Default)]
#[command(author, version, about = "Video uploader with live progress")]
pub struct Args {
    /// Host to bind to (overrides UPLOADER_HOST)
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to (overrides UPLOADER_PORT)
    #[arg(long)]
    pub port: Option<u16>,

    /// Directory for request files (overrides UPLOADER_UPLOAD_DIR)
    #[arg(long)]
    pub upload_dir: Option<PathBuf>,

    /// Where the OAuth token pair is stored (overrides UPLOADER_TOKEN_PATH)
    #[arg(long)]
    pub token_path: Option<PathBuf>,

    /// Database URL (overrides UPLOADER_DATABASE_URL)
    #[arg(long)]
    pub database_url: Option<String>,

    /// ffprobe binary used for video validation (overrides UPLOADER_FFPROBE_PATH)
    #[arg(long)]
    pub ffprobe_path: Option<String>,

    /// Largest accepted request body in MiB (overrides UPLOADER_MAX_UPLOAD_MB)
    #[arg(long)]
    pub max_upload_mb: Option<u64>,

    /// Run migrations and exit
    #[arg(long)]
    pub migrate: bool,
}

impl AppConfig {
    /// Parse environment variables + CLI args into AppConfig and migrate flag.
    pub fn from_env_and_args() -> Result<(Self, bool)> {
        let args = Args::parse();
        let migrate = args.migrate;
        let cfg = Self::from_sources(args, |key| env::var(key).ok())?;
        Ok((cfg, migrate))
    }

    /// Merge CLI args over variables read through `var`.
    pub fn from_sources<F>(args: Args, var: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        // --- Environment fallback ---
        let env_host = var("UPLOADER_HOST").unwrap_or_else(|| "0.0.0.0".into());
        let env_port = match var("UPLOADER_PORT") {
            Some(value) => value
                .parse::<u16>()
                .with_context(|| format!("parsing UPLOADER_PORT value `{}`", value))?,
            None => 3000,
        };
        let env_upload_dir = var("UPLOADER_UPLOAD_DIR").unwrap_or_else(|| "./data/uploads".into());
        let env_token_path =
            var("UPLOADER_TOKEN_PATH").unwrap_or_else(|| "./data/tokens.json".into());
        let env_db =
            var("UPLOADER_DATABASE_URL").unwrap_or_else(|| "sqlite://./data/uploader.db".into());
        let env_ffprobe = var("UPLOADER_FFPROBE_PATH").unwrap_or_else(|| "ffprobe".into());
        let env_max_upload = match var("UPLOADER_MAX_UPLOAD_MB") {
            Some(value) => value
                .parse::<u64>()
                .with_context(|| format!("parsing UPLOADER_MAX_UPLOAD_MB value `{}`", value))?,
            None => 2048,
        };

        let required = |key: &str| {
            var(key)
                .filter(|v| !v.trim().is_empty())
                .with_context(|| format!("{} must be set", key))
        };
        let youtube = YouTubeConfig {
            client_id: required("YOUTUBE_CLIENT_ID")?,
            client_secret: required("YOUTUBE_CLIENT_SECRET")?,
            redirect_uri: required("YOUTUBE_REDIRECT_URI")?,
            playlist_id: var("YOUTUBE_PLAYLIST_ID").filter(|v| !v.trim().is_empty()),
        };

        // --- Merge ---
        Ok(Self {
            host: args.host.unwrap_or(env_host),
            port: args.port.unwrap_or(env_port),
            upload_dir: args.upload_dir.unwrap_or_else(|| env_upload_dir.into()),
            token_path: args.token_path.unwrap_or_else(|| env_token_path.into()),
            database_url: args.database_url.unwrap_or(env_db),
            ffprobe_path: args.ffprobe_path.unwrap_or(env_ffprobe),
            max_upload_mb: args.max_upload_mb.unwrap_or(env_max_upload),
            youtube,
        })
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Body limit for the upload route, in bytes.
    pub fn max_upload_bytes(&self) -> usize {
        usize::try_from(self.max_upload_mb.saturating_mul(1024 * 1024)).unwrap_or(usize::MAX)
    }
}
