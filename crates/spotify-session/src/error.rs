//! Error types for session and pipeline operations

use std::sync::Arc;

/// Errors surfaced to handlers calling through the session.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// No access token exists and none could be minted: log in again.
    #[error("reauthentication required: no usable Spotify credentials")]
    NotAuthenticated,

    #[error("no login in progress (start at /login)")]
    NoPendingLogin,

    #[error(transparent)]
    Auth(#[from] spotify_auth::Error),

    /// Shared by every caller that joined the same refresh.
    #[error("{0}")]
    Refresh(Arc<spotify_auth::Error>),

    #[error("upstream request failed: {0}")]
    Transport(String),

    #[error("upstream rejected credentials: {body}")]
    UpstreamUnauthorized { body: String, reauth_required: bool },

    #[error("upstream rate limited (retry after {retry_after:?}s): {body}")]
    UpstreamRateLimited {
        retry_after: Option<u64>,
        body: String,
    },

    #[error("upstream returned {status}: {body}")]
    UpstreamError { status: u16, body: String },

    #[error("internal error: {0}")]
    Internal(String),
}

/// Result alias for session operations.
pub type Result<T> = std::result::Result<T, Error>;
