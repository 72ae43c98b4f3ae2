//! Shared state handed to every handler.

use crate::services::{
    credential_store::CredentialStore, upload_history::UploadHistory,
    upload_pipeline::UploadPipeline, youtube_client::YouTubeClient,
};
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<UploadPipeline>,
    pub youtube: Arc<YouTubeClient>,
    pub credentials: Arc<dyn CredentialStore>,
    pub history: UploadHistory,
}
