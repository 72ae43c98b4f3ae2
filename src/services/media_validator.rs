//! Technical validation of uploaded media.
//!
//! Videos are probed with `ffprobe` (behind the [`MediaProbe`] trait so the
//! pipeline can run without it); thumbnails are inspected with the `image`
//! crate's header decoders. Every failing rule is reported, not just the
//! first one.

use crate::models::media::{ThumbnailValidation, VideoMetadata, VideoValidation};
use async_trait::async_trait;
use image::{ImageFormat, ImageReader};
use serde::Deserialize;
use std::{
    io,
    path::{Path, PathBuf},
    process::Stdio,
    sync::Arc,
};
use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, warn};

pub const MIN_DURATION_SECS: f64 = 300.0;
pub const MAX_DURATION_SECS: f64 = 600.0;
pub const MIN_WIDTH: u32 = 1920;
pub const MIN_HEIGHT: u32 = 1080;
pub const TARGET_ASPECT_RATIO: f64 = 16.0 / 9.0;
pub const ASPECT_RATIO_TOLERANCE: f64 = 0.01;
pub const REQUIRED_CONTAINER: &str = "mp4";

pub const THUMBNAIL_WIDTH: u32 = 1280;
pub const THUMBNAIL_HEIGHT: u32 = 720;
pub const THUMBNAIL_MAX_BYTES: u64 = 2 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("media probe `{0}` is not available")]
    Unavailable(String),
    #[error("probe failed: {0}")]
    Failed(String),
    #[error("could not parse probe output: {0}")]
    Parse(#[from] serde_json::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Reads technical metadata from a video file.
#[async_trait]
pub trait MediaProbe: Send + Sync {
    async fn probe(&self, path: &Path) -> Result<VideoMetadata, ProbeError>;

    /// Whether the underlying tool can be run at all.
    async fn is_available(&self) -> bool;
}

/// [`MediaProbe`] backed by the `ffprobe` executable.
#[derive(Debug, Clone)]
pub struct FfprobeProbe {
    ffprobe_path: String,
}

impl FfprobeProbe {
    pub fn new(ffprobe_path: impl Into<String>) -> Self {
        Self {
            ffprobe_path: ffprobe_path.into(),
        }
    }

    fn map_spawn_error(&self, err: io::Error) -> ProbeError {
        if err.kind() == io::ErrorKind::NotFound {
            ProbeError::Unavailable(self.ffprobe_path.clone())
        } else {
            ProbeError::Io(err)
        }
    }
}

#[async_trait]
impl MediaProbe for FfprobeProbe {
    #[tracing::instrument(skip(self), fields(ffprobe = %self.ffprobe_path))]
    async fn probe(&self, path: &Path) -> Result<VideoMetadata, ProbeError> {
        let output = Command::new(&self.ffprobe_path)
            .args([
                "-v",
                "quiet",
                "-print_format",
                "json",
                "-show_format",
                "-show_streams",
            ])
            .arg(path)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|err| self.map_spawn_error(err))?;

        if !output.status.success() {
            return Err(ProbeError::Failed(format!(
                "ffprobe exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        let parsed: FfprobeOutput = serde_json::from_slice(&output.stdout)?;
        metadata_from_probe(parsed)
    }

    async fn is_available(&self) -> bool {
        Command::new(&self.ffprobe_path)
            .arg("-version")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .map(|status| status.success())
            .unwrap_or(false)
    }
}

#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    #[serde(default)]
    streams: Vec<FfprobeStream>,
    format: Option<FfprobeFormat>,
}

#[derive(Debug, Deserialize)]
struct FfprobeStream {
    codec_type: Option<String>,
    codec_name: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    r_frame_rate: Option<String>,
    duration: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FfprobeFormat {
    format_name: Option<String>,
    duration: Option<String>,
    bit_rate: Option<String>,
}

fn metadata_from_probe(output: FfprobeOutput) -> Result<VideoMetadata, ProbeError> {
    let video = output
        .streams
        .iter()
        .find(|s| s.codec_type.as_deref() == Some("video"))
        .ok_or_else(|| ProbeError::Failed("no video stream found".into()))?;

    let format = output.format.as_ref();
    let duration = format
        .and_then(|f| f.duration.as_deref())
        .or(video.duration.as_deref())
        .and_then(|d| d.trim().parse::<f64>().ok())
        .ok_or_else(|| ProbeError::Failed("could not read duration".into()))?;

    let width = video.width.unwrap_or(0);
    let height = video.height.unwrap_or(0);
    let aspect_ratio = if height > 0 {
        width as f64 / height as f64
    } else {
        0.0
    };

    Ok(VideoMetadata {
        duration,
        width,
        height,
        aspect_ratio,
        has_audio: output
            .streams
            .iter()
            .any(|s| s.codec_type.as_deref() == Some("audio")),
        format: format
            .and_then(|f| f.format_name.clone())
            .unwrap_or_default(),
        bitrate: format
            .and_then(|f| f.bit_rate.as_deref())
            .and_then(|b| b.parse::<u64>().ok()),
        fps: video
            .r_frame_rate
            .as_deref()
            .map(parse_frame_rate)
            .unwrap_or(0.0),
        codecs: output
            .streams
            .iter()
            .filter_map(|s| s.codec_name.clone())
            .collect(),
    })
}

/// Parse a rational frame rate such as `30000/1001` or `25`.
///
/// Both sides are parsed as integers; malformed input or a zero denominator
/// yields 0.
pub fn parse_frame_rate(raw: &str) -> f64 {
    let raw = raw.trim();
    let (num, den) = match raw.split_once('/') {
        Some((num, den)) => (num.trim(), den.trim()),
        None => (raw, "1"),
    };
    match (num.parse::<u64>(), den.parse::<u64>()) {
        (Ok(num), Ok(den)) if den > 0 => num as f64 / den as f64,
        _ => 0.0,
    }
}

/// Check probed metadata against the upload requirements.
pub fn check_video(meta: &VideoMetadata) -> Vec<String> {
    let mut errors = Vec::new();

    if !(MIN_DURATION_SECS..=MAX_DURATION_SECS).contains(&meta.duration) {
        errors.push(format!(
            "Duration must be between {} and {} seconds (got {:.1}s)",
            MIN_DURATION_SECS, MAX_DURATION_SECS, meta.duration
        ));
    }
    if meta.width < MIN_WIDTH {
        errors.push(format!(
            "Width must be at least {}px (got {}px)",
            MIN_WIDTH, meta.width
        ));
    }
    if meta.height < MIN_HEIGHT {
        errors.push(format!(
            "Height must be at least {}px (got {}px)",
            MIN_HEIGHT, meta.height
        ));
    }
    if (meta.aspect_ratio - TARGET_ASPECT_RATIO).abs() > ASPECT_RATIO_TOLERANCE {
        errors.push(format!(
            "Aspect ratio must be 16:9 (got {:.2})",
            meta.aspect_ratio
        ));
    }
    if !meta.has_audio {
        errors.push("Video must contain an audio track".to_string());
    }
    if !meta
        .format
        .split(',')
        .any(|name| name.trim().eq_ignore_ascii_case(REQUIRED_CONTAINER))
    {
        errors.push(format!(
            "Video must be an MP4 file (got `{}`)",
            if meta.format.is_empty() {
                "unknown"
            } else {
                meta.format.as_str()
            }
        ));
    }

    errors
}

/// Header-level facts about a thumbnail image.
#[derive(Debug, Clone, PartialEq)]
pub struct ThumbnailInfo {
    pub dimensions: Option<(u32, u32)>,
    pub size_bytes: u64,
    pub format: Option<ImageFormat>,
}

/// Check a thumbnail against the platform's custom thumbnail rules. All
/// three rules run independently.
pub fn check_thumbnail(info: &ThumbnailInfo) -> Vec<String> {
    let mut errors = Vec::new();

    match info.dimensions {
        Some((w, h)) if w == THUMBNAIL_WIDTH && h == THUMBNAIL_HEIGHT => {}
        Some((w, h)) => errors.push(format!(
            "Thumbnail must be {}x{} (got {}x{})",
            THUMBNAIL_WIDTH, THUMBNAIL_HEIGHT, w, h
        )),
        None => errors.push("Thumbnail dimensions could not be read".to_string()),
    }

    if info.size_bytes > THUMBNAIL_MAX_BYTES {
        errors.push(format!(
            "Thumbnail must be 2MB or smaller (got {:.2}MB)",
            info.size_bytes as f64 / (1024.0 * 1024.0)
        ));
    }

    match info.format {
        Some(ImageFormat::Jpeg) | Some(ImageFormat::Png) => {}
        Some(other) => errors.push(format!(
            "Thumbnail must be JPEG or PNG (got {})",
            other
                .extensions_str()
                .first()
                .copied()
                .unwrap_or("unknown")
        )),
        None => errors.push("Thumbnail must be JPEG or PNG (format not recognised)".to_string()),
    }

    errors
}

/// Validates saved uploads before anything is sent to the platform.
#[derive(Clone)]
pub struct MediaValidator {
    probe: Arc<dyn MediaProbe>,
}

impl MediaValidator {
    pub fn new(probe: Arc<dyn MediaProbe>) -> Self {
        Self { probe }
    }

    pub fn probe(&self) -> &Arc<dyn MediaProbe> {
        &self.probe
    }

    /// Probe and check a video. A missing probe tool never blocks the
    /// upload: the file is then assumed valid.
    pub async fn validate_video(&self, path: &Path) -> VideoValidation {
        match self.probe.probe(path).await {
            Ok(metadata) => {
                let errors = check_video(&metadata);
                debug!(
                    path = %path.display(),
                    duration = metadata.duration,
                    width = metadata.width,
                    height = metadata.height,
                    errors = errors.len(),
                    "video probed"
                );
                VideoValidation {
                    valid: errors.is_empty(),
                    metadata: Some(metadata),
                    errors,
                }
            }
            Err(ProbeError::Unavailable(tool)) => {
                warn!("{} not available, skipping video validation", tool);
                VideoValidation {
                    valid: true,
                    metadata: None,
                    errors: Vec::new(),
                }
            }
            Err(err) => VideoValidation {
                valid: false,
                metadata: None,
                errors: vec![format!("Could not read video metadata: {}", err)],
            },
        }
    }

    pub async fn validate_thumbnail(&self, path: &Path) -> ThumbnailValidation {
        let info = match inspect_thumbnail(path.to_path_buf()).await {
            Ok(info) => info,
            Err(err) => {
                return ThumbnailValidation {
                    valid: false,
                    errors: vec![format!("Could not read thumbnail: {}", err)],
                };
            }
        };
        let errors = check_thumbnail(&info);
        ThumbnailValidation {
            valid: errors.is_empty(),
            errors,
        }
    }
}

/// Read size, format and dimensions without decoding pixel data.
async fn inspect_thumbnail(path: PathBuf) -> io::Result<ThumbnailInfo> {
    let size_bytes = tokio::fs::metadata(&path).await?.len();
    tokio::task::spawn_blocking(move || {
        let reader = ImageReader::open(&path)?.with_guessed_format()?;
        let format = reader.format();
        let dimensions = reader.into_dimensions().ok();
        Ok(ThumbnailInfo {
            dimensions,
            size_bytes,
            format,
        })
    })
    .await
    .map_err(io::Error::other)?
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageBuffer, Rgb};
    use std::sync::Mutex;

    fn hd_metadata(duration: f64) -> VideoMetadata {
        VideoMetadata {
            duration,
            width: 1920,
            height: 1080,
            aspect_ratio: 1920.0 / 1080.0,
            has_audio: true,
            format: "mov,mp4,m4a,3gp,3g2,mj2".into(),
            bitrate: Some(8_000_000),
            fps: 30.0,
            codecs: vec!["h264".into(), "aac".into()],
        }
    }

    struct FixedProbe(Mutex<Option<Result<VideoMetadata, ProbeError>>>);

    #[async_trait]
    impl MediaProbe for FixedProbe {
        async fn probe(&self, _path: &Path) -> Result<VideoMetadata, ProbeError> {
            self.0
                .lock()
                .unwrap()
                .take()
                .unwrap_or_else(|| Err(ProbeError::Failed("probed twice".into())))
        }

        async fn is_available(&self) -> bool {
            true
        }
    }

    fn validator(result: Result<VideoMetadata, ProbeError>) -> MediaValidator {
        MediaValidator::new(Arc::new(FixedProbe(Mutex::new(Some(result)))))
    }

    #[test]
    fn short_video_fails_duration_check() {
        let errors = check_video(&hd_metadata(250.0));
        assert_eq!(errors.len(), 1);
        assert!(errors[0].starts_with("Duration must be between 300 and 600"));
    }

    #[test]
    fn hd_video_within_range_passes() {
        assert!(check_video(&hd_metadata(450.0)).is_empty());
        assert!(check_video(&hd_metadata(300.0)).is_empty());
        assert!(check_video(&hd_metadata(600.0)).is_empty());
    }

    #[test]
    fn every_failing_video_rule_is_reported() {
        let meta = VideoMetadata {
            duration: 900.0,
            width: 1280,
            height: 960,
            aspect_ratio: 1280.0 / 960.0,
            has_audio: false,
            format: "avi".into(),
            ..hd_metadata(0.0)
        };
        assert_eq!(check_video(&meta).len(), 6);
    }

    #[test]
    fn ultrawide_video_fails_aspect_ratio_only() {
        let meta = VideoMetadata {
            width: 2560,
            height: 1080,
            aspect_ratio: 2560.0 / 1080.0,
            ..hd_metadata(450.0)
        };
        let errors = check_video(&meta);
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("Aspect ratio"));
    }

    #[test]
    fn frame_rate_is_parsed_as_rational() {
        assert!((parse_frame_rate("30000/1001") - 29.97).abs() < 0.01);
        assert_eq!(parse_frame_rate("25/1"), 25.0);
        assert_eq!(parse_frame_rate("60"), 60.0);
        assert_eq!(parse_frame_rate("0/0"), 0.0);
        assert_eq!(parse_frame_rate("1/0"), 0.0);
        assert_eq!(parse_frame_rate("process.exit()"), 0.0);
        assert_eq!(parse_frame_rate("2*3/1"), 0.0);
    }

    #[test]
    fn probe_output_maps_to_metadata() {
        let json = r#"{
            "streams": [
                {"codec_type": "video", "codec_name": "h264", "width": 1920, "height": 1080, "r_frame_rate": "30/1"},
                {"codec_type": "audio", "codec_name": "aac"}
            ],
            "format": {"format_name": "mov,mp4,m4a,3gp,3g2,mj2", "duration": "412.500000", "bit_rate": "5000000"}
        }"#;
        let parsed: FfprobeOutput = serde_json::from_str(json).unwrap();
        let meta = metadata_from_probe(parsed).unwrap();
        assert_eq!(meta.duration, 412.5);
        assert_eq!(meta.fps, 30.0);
        assert!(meta.has_audio);
        assert_eq!(meta.bitrate, Some(5_000_000));
        assert_eq!(meta.codecs, vec!["h264", "aac"]);
        assert!(check_video(&meta).is_empty());
    }

    #[test]
    fn probe_output_without_video_stream_is_an_error() {
        let parsed: FfprobeOutput =
            serde_json::from_str(r#"{"streams": [{"codec_type": "audio"}], "format": {}}"#)
                .unwrap();
        assert!(matches!(
            metadata_from_probe(parsed),
            Err(ProbeError::Failed(_))
        ));
    }

    #[tokio::test]
    async fn missing_probe_tool_assumes_valid() {
        let result = validator(Err(ProbeError::Unavailable("ffprobe".into())))
            .validate_video(Path::new("/nonexistent.mp4"))
            .await;
        assert!(result.valid);
        assert!(result.metadata.is_none());
        assert!(result.errors.is_empty());
    }

    #[tokio::test]
    async fn unreadable_video_is_invalid() {
        let result = validator(Err(ProbeError::Failed("moov atom not found".into())))
            .validate_video(Path::new("/broken.mp4"))
            .await;
        assert!(!result.valid);
        assert_eq!(result.errors.len(), 1);
    }

    #[tokio::test]
    async fn ffprobe_missing_from_path_reports_unavailable() {
        let probe = FfprobeProbe::new("definitely-not-a-real-ffprobe-binary");
        assert!(!probe.is_available().await);
        let err = probe.probe(Path::new("x.mp4")).await.unwrap_err();
        assert!(matches!(err, ProbeError::Unavailable(_)));
    }

    #[test]
    fn large_png_fails_resolution_only() {
        let errors = check_thumbnail(&ThumbnailInfo {
            dimensions: Some((1920, 1080)),
            size_bytes: 500 * 1024,
            format: Some(ImageFormat::Png),
        });
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("1280x720"));
    }

    #[test]
    fn heavy_jpeg_fails_size_only() {
        let errors = check_thumbnail(&ThumbnailInfo {
            dimensions: Some((1280, 720)),
            size_bytes: 3 * 1024 * 1024,
            format: Some(ImageFormat::Jpeg),
        });
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("2MB"));
    }

    #[test]
    fn gif_fails_format_and_compounds_with_other_failures() {
        let gif = ThumbnailInfo {
            dimensions: Some((1280, 720)),
            size_bytes: 100 * 1024,
            format: Some(ImageFormat::Gif),
        };
        let errors = check_thumbnail(&gif);
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("JPEG or PNG"));

        let worse = ThumbnailInfo {
            dimensions: Some((640, 480)),
            size_bytes: 3 * 1024 * 1024,
            ..gif
        };
        assert_eq!(check_thumbnail(&worse).len(), 3);
    }

    #[tokio::test]
    async fn real_png_thumbnail_is_inspected() {
        let dir = tempfile::tempdir().unwrap();
        let validator = validator(Err(ProbeError::Failed("unused".into())));

        let good = dir.path().join("good.png");
        ImageBuffer::from_pixel(1280, 720, Rgb([10u8, 20, 30]))
            .save(&good)
            .unwrap();
        let result = validator.validate_thumbnail(&good).await;
        assert!(result.valid, "{:?}", result.errors);

        let wrong = dir.path().join("wrong.png");
        ImageBuffer::from_pixel(1920, 1080, Rgb([0u8, 0, 0]))
            .save(&wrong)
            .unwrap();
        let result = validator.validate_thumbnail(&wrong).await;
        assert!(!result.valid);
        assert_eq!(result.errors.len(), 1);
    }

    #[tokio::test]
    async fn missing_thumbnail_is_invalid() {
        let validator = validator(Err(ProbeError::Failed("unused".into())));
        let result = validator
            .validate_thumbnail(Path::new("/no/such/thumb.jpg"))
            .await;
        assert!(!result.valid);
    }
}
