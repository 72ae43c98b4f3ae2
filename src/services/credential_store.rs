//! Persistence of the OAuth token pair.
//!
//! The pipeline only sees the [`CredentialStore`] trait. Production uses a
//! JSON file next to the uploads directory; tests use the in-memory store.

use crate::models::credential::StoredCredential;
use async_trait::async_trait;
use std::{
    io::{self, ErrorKind},
    path::PathBuf,
    sync::RwLock,
};
use thiserror::Error;
use tokio::fs;
use tracing::debug;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("credential file is corrupt: {0}")]
    Corrupt(#[from] serde_json::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type CredentialResult<T> = Result<T, CredentialError>;

#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Stored credential, or `None` if the account was never connected.
    async fn load(&self) -> CredentialResult<Option<StoredCredential>>;

    async fn save(&self, credential: &StoredCredential) -> CredentialResult<()>;
}

/// Token pair stored as `{"accessToken": ..., "refreshToken": ...}`.
#[derive(Debug, Clone)]
pub struct FileCredentialStore {
    path: PathBuf,
}

impl FileCredentialStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl CredentialStore for FileCredentialStore {
    async fn load(&self) -> CredentialResult<Option<StoredCredential>> {
        match fs::read(&self.path).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    /// Write to a temp file and rename so a crash never leaves a truncated
    /// credential behind.
    async fn save(&self, credential: &StoredCredential) -> CredentialResult<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await?;
            }
        }
        let body = serde_json::to_vec_pretty(credential)?;
        let tmp_path = self.path.with_extension(format!("tmp-{}", Uuid::new_v4()));
        if let Err(err) = fs::write(&tmp_path, &body).await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(err.into());
        }
        if let Err(err) = fs::rename(&tmp_path, &self.path).await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(err.into());
        }
        debug!("saved credential to {}", self.path.display());
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct MemoryCredentialStore {
    inner: RwLock<Option<StoredCredential>>,
}

impl MemoryCredentialStore {
    pub fn new(initial: Option<StoredCredential>) -> Self {
        Self {
            inner: RwLock::new(initial),
        }
    }
}

#[async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn load(&self) -> CredentialResult<Option<StoredCredential>> {
        Ok(self
            .inner
            .read()
            .map_err(|_| io::Error::other("credential lock poisoned"))?
            .clone())
    }

    async fn save(&self, credential: &StoredCredential) -> CredentialResult<()> {
        *self
            .inner
            .write()
            .map_err(|_| io::Error::other("credential lock poisoned"))? = Some(credential.clone());
        Ok(())
    }
}
