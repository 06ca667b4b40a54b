//! Error types for OAuth authentication operations

/// Errors from OAuth authentication operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("HTTP request failed: {0}")]
    Http(String),

    /// Bad or expired authorization code, or PKCE mismatch. Never retried.
    #[error("token exchange failed: {0}")]
    ExchangeFailed(String),

    #[error("token refresh failed: {0}")]
    RefreshFailed(String),

    /// The refresh token was rejected; the user has to log in again.
    #[error("refresh token rejected: {0}")]
    InvalidGrant(String),

    #[error("no refresh token stored")]
    MissingRefreshToken,

    #[error("invalid authorization settings: {0}")]
    InvalidSettings(String),

    #[error("credential storage unavailable: {0}")]
    PersistenceUnavailable(String),

    #[error("credential parse error: {0}")]
    CredentialParse(String),
}

impl Error {
    /// Whether retrying the refresh with the same refresh token is pointless.
    pub fn requires_reauthentication(&self) -> bool {
        matches!(self, Error::InvalidGrant(_) | Error::MissingRefreshToken)
    }
}

/// Result alias for auth operations.
pub type Result<T> = std::result::Result<T, Error>;
