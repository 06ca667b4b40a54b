//! Spotify proxy endpoints
//!
//! Each handler builds one Web API request, sends it through the session's
//! authenticated pipeline, and reshapes the JSON for the client.
//!
//! - `GET  /api/search?q=..&limit=..`
//! - `GET  /api/now-playing`
//! - `POST /api/player/{play|pause|next|previous}`
//! - `GET  /api/queue`
//! - `POST /api/queue` `{"uri":"spotify:track:.."}`

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use reqwest::Method;
use reqwest::header::CONTENT_LENGTH;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::AppState;
use crate::error::ApiError;
use crate::tracks::{CurrentlyPlaying, NowPlaying, Queue, QueueResponse, SearchResponse, Track};

const DEFAULT_SEARCH_LIMIT: u32 = 10;
const MAX_SEARCH_LIMIT: u32 = 50;

/// Send through the pipeline and fail on any non-2xx status.
async fn send(
    state: &AppState,
    request: reqwest::RequestBuilder,
) -> Result<reqwest::Response, ApiError> {
    let request = request.build().map_err(|e| {
        ApiError::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "internal_error",
            format!("building upstream request: {e}"),
        )
    })?;
    let response = state.session.call(request).await?;
    Ok(state.session.check(response).await?)
}

async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, ApiError> {
    response.json::<T>().await.map_err(|e| {
        ApiError::new(
            StatusCode::BAD_GATEWAY,
            "invalid_upstream_response",
            e.to_string(),
        )
    })
}

/// Empty-bodied write, as the player endpoints expect.
fn empty(request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
    request.header(CONTENT_LENGTH, "0")
}

#[derive(Debug, Deserialize)]
pub struct SearchParams {
    q: Option<String>,
    limit: Option<u32>,
    offset: Option<u32>,
}

#[derive(Debug, serde::Serialize)]
pub struct SearchResults {
    tracks: Vec<Track>,
}

/// GET /api/search
pub async fn search(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> Result<Json<SearchResults>, ApiError> {
    let query = params
        .q
        .map(|q| q.trim().to_string())
        .filter(|q| !q.is_empty())
        .ok_or_else(|| ApiError::bad_request("q must be a non-empty search string"))?;
    let limit = params
        .limit
        .unwrap_or(DEFAULT_SEARCH_LIMIT)
        .clamp(1, MAX_SEARCH_LIMIT);
    let offset = params.offset.unwrap_or(0);

    debug!(limit, offset, "searching tracks");
    let (limit, offset) = (limit.to_string(), offset.to_string());
    let request = state.session.request(Method::GET, "/search").query(&[
        ("q", query.as_str()),
        ("type", "track"),
        ("limit", limit.as_str()),
        ("offset", offset.as_str()),
    ]);
    let results: SearchResponse = decode(send(&state, request).await?).await?;

    Ok(Json(SearchResults {
        tracks: results.tracks.items.into_iter().map(Track::from).collect(),
    }))
}

/// GET /api/now-playing: `{"playing":false}` when nothing is playing.
pub async fn now_playing(State(state): State<AppState>) -> Result<Json<NowPlaying>, ApiError> {
    let request = state
        .session
        .request(Method::GET, "/me/player/currently-playing");
    let response = send(&state, request).await?;
    if response.status() == reqwest::StatusCode::NO_CONTENT {
        return Ok(Json(NowPlaying::idle()));
    }
    let current: CurrentlyPlaying = decode(response).await?;
    Ok(Json(current.into()))
}

/// POST /api/player/{action}
pub async fn player(
    State(state): State<AppState>,
    Path(action): Path<String>,
) -> Result<StatusCode, ApiError> {
    let (method, path) = match action.as_str() {
        "play" => (Method::PUT, "/me/player/play"),
        "pause" => (Method::PUT, "/me/player/pause"),
        "next" => (Method::POST, "/me/player/next"),
        "previous" => (Method::POST, "/me/player/previous"),
        other => {
            return Err(ApiError::new(
                StatusCode::NOT_FOUND,
                "unknown_action",
                format!("unknown player action: {other}"),
            ));
        }
    };
    send(&state, empty(state.session.request(method, path))).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /api/queue
pub async fn queue(State(state): State<AppState>) -> Result<Json<Queue>, ApiError> {
    let request = state.session.request(Method::GET, "/me/player/queue");
    let response: QueueResponse = decode(send(&state, request).await?).await?;
    Ok(Json(response.into()))
}

#[derive(Debug, Deserialize)]
pub struct EnqueueRequest {
    uri: String,
}

/// POST /api/queue
pub async fn enqueue(
    State(state): State<AppState>,
    Json(body): Json<EnqueueRequest>,
) -> Result<StatusCode, ApiError> {
    let uri = body.uri.trim();
    if !uri.starts_with("spotify:track:") && !uri.starts_with("spotify:episode:") {
        return Err(ApiError::bad_request(
            "uri must be a spotify:track: or spotify:episode: URI",
        ));
    }
    let request = empty(
        state
            .session
            .request(Method::POST, "/me/player/queue")
            .query(&[("uri", uri)]),
    );
    send(&state, request).await?;
    Ok(StatusCode::NO_CONTENT)
}
