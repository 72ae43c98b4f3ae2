//! OAuth connection endpoints.
//!
//! - GET /api/auth/url       -> `{"url": ...}` to start authorization
//! - GET /api/auth/callback  -> redirect target; stores the token pair
//! - GET /api/auth/status    -> `{"authenticated": bool}`

use crate::{errors::AppError, state::AppState};
use axum::{
    Json,
    extract::{Query, State},
    response::Redirect,
};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

#[derive(Debug, Deserialize)]
pub struct CallbackQuery {
    pub code: Option<String>,
    /// Set by the platform when the user denies access.
    pub error: Option<String>,
}

#[derive(Serialize)]
pub struct AuthUrlResponse {
    pub url: String,
}

#[derive(Serialize)]
pub struct AuthStatusResponse {
    pub authenticated: bool,
}

pub async fn auth_url(State(state): State<AppState>) -> Result<Json<AuthUrlResponse>, AppError> {
    let url = state.youtube.auth_url()?;
    Ok(Json(AuthUrlResponse { url }))
}

pub async fn auth_callback(
    State(state): State<AppState>,
    Query(query): Query<CallbackQuery>,
) -> Result<Redirect, AppError> {
    let code = match (query.code, query.error) {
        (Some(code), _) if !code.is_empty() => code,
        (_, Some(error)) => {
            return Err(AppError::bad_request(format!(
                "Authorization was not granted: {}",
                error
            )));
        }
        _ => return Err(AppError::bad_request("Missing authorization code")),
    };

    let credential = state.youtube.exchange_code(&code).await?;
    state.credentials.save(&credential).await?;
    info!("YouTube account connected");

    Ok(Redirect::to("/?auth=success"))
}

/// A credential that cannot be read counts as not connected.
pub async fn auth_status(State(state): State<AppState>) -> Json<AuthStatusResponse> {
    let authenticated = match state.credentials.load().await {
        Ok(credential) => credential.is_some(),
        Err(err) => {
            warn!("stored credential unreadable: {}", err);
            false
        }
    };
    Json(AuthStatusResponse { authenticated })
}
