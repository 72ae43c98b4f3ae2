//! Upload request as submitted by the browser form.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{fmt, path::PathBuf, str::FromStr};

use super::media::GeneratedMetadata;

/// Language the generated title and description are written in.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    #[default]
    Hi,
    En,
    Hinglish,
}

impl Language {
    pub const ALL: [Language; 3] = [Language::Hi, Language::En, Language::Hinglish];

    pub fn as_str(&self) -> &'static str {
        match self {
            Language::Hi => "hi",
            Language::En => "en",
            Language::Hinglish => "hinglish",
        }
    }
}

impl FromStr for Language {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "hi" => Ok(Language::Hi),
            "en" => Ok(Language::En),
            "hinglish" => Ok(Language::Hinglish),
            other => Err(format!(
                "unsupported language `{}` (expected hi, en or hinglish)",
                other
            )),
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Visibility of the uploaded video on the platform.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Privacy {
    #[default]
    Public,
    Unlisted,
    Private,
}

impl Privacy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Privacy::Public => "public",
            Privacy::Unlisted => "unlisted",
            Privacy::Private => "private",
        }
    }
}

impl FromStr for Privacy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "public" => Ok(Privacy::Public),
            "unlisted" => Ok(Privacy::Unlisted),
            "private" => Ok(Privacy::Private),
            other => Err(format!(
                "unsupported privacy `{}` (expected public, unlisted or private)",
                other
            )),
        }
    }
}

impl fmt::Display for Privacy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A file part spooled to the uploads directory but not yet given its
/// final name.
#[derive(Debug, Clone)]
pub struct StagedFile {
    /// Location of the partial file on disk.
    pub path: PathBuf,

    /// Filename the browser reported, if any.
    pub original_name: Option<String>,

    /// Number of bytes written.
    pub size_bytes: u64,

    /// Lowercase hex MD5 of the payload.
    pub md5: String,
}

/// Raw multipart form as received. Text fields are kept verbatim so the
/// pipeline can report missing or malformed values as a stage error.
#[derive(Debug, Default)]
pub struct UploadForm {
    pub video: Option<StagedFile>,
    pub thumbnail: Option<StagedFile>,
    pub topic: Option<String>,
    pub summary: Option<String>,
    pub language: Option<String>,
    pub privacy: Option<String>,
    pub schedule_time: Option<String>,
}

/// Validated upload request. Created per HTTP call, dropped after the
/// pipeline finishes.
#[derive(Debug)]
pub struct UploadRequest {
    pub video: StagedFile,
    pub thumbnail: Option<StagedFile>,
    pub topic: String,
    pub summary: String,
    pub language: Language,
    pub privacy: Privacy,
    pub schedule_time: Option<DateTime<Utc>>,
}

/// Everything the upload client needs for one attempt.
#[derive(Debug, Clone)]
pub struct UploadJob {
    pub video_path: PathBuf,
    pub thumbnail_path: Option<PathBuf>,
    pub metadata: GeneratedMetadata,
    pub privacy: Privacy,
    pub schedule_time: Option<DateTime<Utc>>,
}

/// Parse a schedule timestamp from the form.
///
/// Accepts RFC 3339 and the `datetime-local` shape browsers submit
/// (`2025-01-31T18:30` or with seconds), which is taken as UTC.
pub fn parse_schedule_time(raw: &str) -> Result<DateTime<Utc>, String> {
    let raw = raw.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Ok(ts.with_timezone(&Utc));
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M:%S"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, fmt) {
            return Ok(naive.and_utc());
        }
    }
    Err(format!("invalid scheduleTime `{}`", raw))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Timelike};

    #[test]
    fn language_parses_case_insensitively() {
        assert_eq!("EN".parse::<Language>().unwrap(), Language::En);
        assert_eq!(" hinglish ".parse::<Language>().unwrap(), Language::Hinglish);
        assert!("fr".parse::<Language>().is_err());
    }

    #[test]
    fn privacy_defaults_to_public() {
        assert_eq!(Privacy::default(), Privacy::Public);
        assert_eq!("Unlisted".parse::<Privacy>().unwrap(), Privacy::Unlisted);
        assert!("friends".parse::<Privacy>().is_err());
    }

    #[test]
    fn schedule_time_accepts_rfc3339_and_datetime_local() {
        let ts = parse_schedule_time("2025-03-01T10:00:00+05:30").unwrap();
        assert_eq!(ts.hour(), 4);
        assert_eq!(ts.minute(), 30);

        let local = parse_schedule_time("2025-03-01T18:45").unwrap();
        assert_eq!(local.day(), 1);
        assert_eq!(local.hour(), 18);

        assert!(parse_schedule_time("tomorrow").is_err());
    }
}
