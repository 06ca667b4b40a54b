//! Login flow and credential status endpoints
//!
//! - `GET  /login`: start PKCE login, redirect to Spotify
//! - `GET  /callback`: exchange the code, persist tokens
//! - `GET  /auth/status`: login state without tokens
//! - `POST /auth/logout`: forget stored credentials

use axum::Json;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Redirect, Response};
use serde::Deserialize;
use spotify_auth::unix_millis;
use tracing::{info, warn};

use crate::AppState;
use crate::error::ApiError;

/// GET /login: store a fresh PKCE attempt and send the browser to Spotify.
pub async fn login(State(state): State<AppState>) -> Result<Redirect, ApiError> {
    let url = state.session.start_login().await?;
    Ok(Redirect::to(&url))
}

#[derive(Debug, Deserialize)]
pub struct CallbackParams {
    code: Option<String>,
    error: Option<String>,
}

/// GET /callback: finish the login Spotify redirected back from.
pub async fn callback(
    State(state): State<AppState>,
    Query(params): Query<CallbackParams>,
) -> Result<Response, ApiError> {
    if let Some(error) = params.error {
        warn!(error, "authorization was not granted");
        return Err(ApiError::new(
            StatusCode::BAD_REQUEST,
            "authorization_denied",
            format!("Spotify authorization failed: {error}"),
        ));
    }
    let code = params
        .code
        .filter(|c| !c.is_empty())
        .ok_or_else(|| ApiError::bad_request("callback is missing the code parameter"))?;

    state.session.complete_login(&code).await.map_err(|e| {
        warn!(error = %e, "token exchange failed");
        ApiError::from(e)
    })?;
    info!("Spotify login completed");

    Ok((
        StatusCode::OK,
        "Logged in to Spotify. You can close this tab.",
    )
        .into_response())
}

/// GET /auth/status
pub async fn status(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.session.status(unix_millis()).await)
}

/// POST /auth/logout
pub async fn logout(State(state): State<AppState>) -> StatusCode {
    state.session.clear().await;
    StatusCode::NO_CONTENT
}
