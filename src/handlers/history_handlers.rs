//! `GET /api/uploads?limit=N` -> recent upload outcomes, newest first.

use crate::{errors::AppError, models::record::UploadRecord, state::AppState};
use axum::{
    Json,
    extract::{Query, State},
};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub limit: Option<usize>,
}

pub async fn list_uploads(
    State(state): State<AppState>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<Vec<UploadRecord>>, AppError> {
    let records = state.history.recent(query.limit.unwrap_or(20)).await?;
    Ok(Json(records))
}
