//! src/services/upload_store.rs
//!
//! UploadStore: spools multipart file parts into the uploads directory and
//! gives them unique per-request names. Files live only for the duration of
//! one upload request; nothing here is durable.

use crate::models::upload::StagedFile;
use bytes::Bytes;
use chrono::Utc;
use futures::{Stream, StreamExt, pin_mut};
use md5::Context;
use std::{
    io::{self, ErrorKind},
    path::{Path, PathBuf},
};
use thiserror::Error;
use tokio::{
    fs::{self, File},
    io::AsyncWriteExt,
};
use tracing::debug;
use uuid::Uuid;

const MAX_EXTENSION_LEN: usize = 8;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("uploaded {0} is empty")]
    Empty(&'static str),
    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Kind of uploaded file; decides the final filename prefix and the fallback
/// extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    Video,
    Thumbnail,
}

impl FileKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FileKind::Video => "video",
            FileKind::Thumbnail => "thumbnail",
        }
    }

    fn default_extension(&self) -> &'static str {
        match self {
            FileKind::Video => "mp4",
            FileKind::Thumbnail => "jpg",
        }
    }
}

#[derive(Debug, Clone)]
pub struct UploadStore {
    /// Directory where request files are written.
    pub base_path: PathBuf,
}

impl UploadStore {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
        }
    }

    /// Stream a file part to disk.
    ///
    /// - Writes chunks to a `.part-<uuid>` file.
    /// - Computes size and MD5 while streaming.
    /// - Flushes and syncs before returning.
    ///
    /// The partial file is removed on any error, including an empty part.
    pub async fn spool<S>(
        &self,
        kind: FileKind,
        original_name: Option<String>,
        stream: S,
    ) -> StoreResult<StagedFile>
    where
        S: Stream<Item = io::Result<Bytes>>,
    {
        fs::create_dir_all(&self.base_path).await?;
        let tmp_path = self
            .base_path
            .join(format!(".part-{}-{}", kind.as_str(), Uuid::new_v4()));
        let mut file = File::create(&tmp_path).await?;

        let mut size_bytes: u64 = 0;
        let mut digest = Context::new();
        pin_mut!(stream);
        while let Some(chunk_res) = stream.next().await {
            let chunk = match chunk_res {
                Ok(chunk) => chunk,
                Err(err) => {
                    let _ = fs::remove_file(&tmp_path).await;
                    return Err(StoreError::Io(err));
                }
            };
            size_bytes += chunk.len() as u64;
            digest.consume(&chunk);
            if let Err(err) = file.write_all(&chunk).await {
                let _ = fs::remove_file(&tmp_path).await;
                return Err(StoreError::Io(err));
            }
        }
        if let Err(err) = file.flush().await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(StoreError::Io(err));
        }
        if let Err(err) = file.sync_all().await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(StoreError::Io(err));
        }
        drop(file);

        if size_bytes == 0 {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(StoreError::Empty(kind.as_str()));
        }

        let md5 = format!("{:x}", digest.compute());
        debug!(
            "spooled {} ({} bytes, md5 {}) to {}",
            kind.as_str(),
            size_bytes,
            md5,
            tmp_path.display()
        );

        Ok(StagedFile {
            path: tmp_path,
            original_name,
            size_bytes,
            md5,
        })
    }

    /// Move a spooled file to its final name,
    /// `<kind>_<unix-millis>_<uuid8>.<ext>`.
    pub async fn persist(&self, staged: &StagedFile, kind: FileKind) -> StoreResult<PathBuf> {
        let extension = staged
            .original_name
            .as_deref()
            .and_then(safe_extension)
            .unwrap_or_else(|| kind.default_extension().to_string());
        let unique = Uuid::new_v4().simple().to_string();
        let final_path = self.base_path.join(format!(
            "{}_{}_{}.{}",
            kind.as_str(),
            Utc::now().timestamp_millis(),
            &unique[..8],
            extension
        ));

        if let Err(err) = fs::rename(&staged.path, &final_path).await {
            if err.kind() == ErrorKind::AlreadyExists {
                fs::remove_file(&final_path).await?;
                fs::rename(&staged.path, &final_path).await?;
            } else {
                return Err(StoreError::Io(err));
            }
        }
        debug!("saved {} to {}", kind.as_str(), final_path.display());
        Ok(final_path)
    }

    /// Best-effort removal of a request file.
    pub async fn discard(&self, path: &Path) {
        match fs::remove_file(path).await {
            Ok(_) => debug!("removed {}", path.display()),
            Err(err) if err.kind() == ErrorKind::NotFound => {
                debug!("file {} already missing", path.display());
            }
            Err(err) => debug!("failed to remove {}: {}", path.display(), err),
        }
    }
}

/// Lowercased extension of a client-supplied filename, if it is short and
/// plain ASCII alphanumeric. Anything else is ignored so the name cannot
/// escape the uploads directory.
fn safe_extension(name: &str) -> Option<String> {
    let file_name = name.rsplit(['/', '\\']).next()?;
    let (stem, ext) = file_name.rsplit_once('.')?;
    if stem.is_empty() || ext.is_empty() || ext.len() > MAX_EXTENSION_LEN {
        return None;
    }
    if !ext.bytes().all(|b| b.is_ascii_alphanumeric()) {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;

    fn chunks(parts: &[&'static [u8]]) -> impl Stream<Item = io::Result<Bytes>> + use<> {
        stream::iter(
            parts
                .iter()
                .map(|p| Ok(Bytes::from_static(p)))
                .collect::<Vec<_>>(),
        )
    }

    #[tokio::test]
    async fn spool_and_persist_compute_size_and_checksum() {
        let dir = tempfile::tempdir().unwrap();
        let store = UploadStore::new(dir.path());

        let staged = store
            .spool(
                FileKind::Video,
                Some("My Clip.MOV".into()),
                chunks(&[b"hello ", b"world"]),
            )
            .await
            .unwrap();
        assert_eq!(staged.size_bytes, 11);
        assert_eq!(staged.md5, format!("{:x}", md5::compute(b"hello world")));

        let final_path = store.persist(&staged, FileKind::Video).await.unwrap();
        let name = final_path.file_name().unwrap().to_str().unwrap();
        assert!(name.starts_with("video_"));
        assert!(name.ends_with(".mov"));
        assert!(!staged.path.exists());
        assert_eq!(std::fs::read(&final_path).unwrap(), b"hello world");
    }

    #[tokio::test]
    async fn persisted_names_are_unique() {
        let dir = tempfile::tempdir().unwrap();
        let store = UploadStore::new(dir.path());
        let mut names = std::collections::HashSet::new();
        for _ in 0..5 {
            let staged = store
                .spool(FileKind::Thumbnail, None, chunks(&[b"x"]))
                .await
                .unwrap();
            let path = store.persist(&staged, FileKind::Thumbnail).await.unwrap();
            assert!(path.extension().unwrap() == "jpg");
            names.insert(path);
        }
        assert_eq!(names.len(), 5);
    }

    #[tokio::test]
    async fn failed_stream_leaves_no_partial_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = UploadStore::new(dir.path());
        let failing = stream::iter(vec![
            Ok(Bytes::from_static(b"abc")),
            Err(io::Error::new(ErrorKind::ConnectionReset, "client went away")),
        ]);
        let err = store
            .spool(FileKind::Video, None, failing)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Io(_)));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn empty_part_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = UploadStore::new(dir.path());
        let err = store
            .spool(FileKind::Thumbnail, Some("".into()), chunks(&[]))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Empty("thumbnail")));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn discard_tolerates_missing_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = UploadStore::new(dir.path());
        store.discard(&dir.path().join("gone.mp4")).await;
    }

    #[test]
    fn extensions_are_sanitized() {
        assert_eq!(safe_extension("clip.MP4").as_deref(), Some("mp4"));
        assert_eq!(safe_extension("../../etc/passwd"), None);
        assert_eq!(safe_extension("a.b/../x.sh;rm").as_deref(), None);
        assert_eq!(safe_extension(".hidden"), None);
        assert_eq!(safe_extension("C:\\videos\\take1.mkv").as_deref(), Some("mkv"));
        assert_eq!(safe_extension("x.verylongext"), None);
    }
}
