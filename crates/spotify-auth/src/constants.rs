//! Spotify OAuth constants
//!
//! Public client configuration. The client ID is supplied by the operator;
//! Spotify PKCE clients carry no secret, so nothing here is sensitive.

/// Spotify accounts service (authorize + token endpoints)
pub const DEFAULT_ACCOUNTS_URL: &str = "https://accounts.spotify.com";

/// Spotify Web API base
pub const DEFAULT_API_URL: &str = "https://api.spotify.com/v1";

/// Authorization endpoint path, relative to the accounts service
pub const AUTHORIZE_PATH: &str = "/authorize";

/// Token endpoint path for code exchange and token refresh
pub const TOKEN_PATH: &str = "/api/token";

/// Permission scopes requested at login. Playback state and control for the
/// transport endpoints, playlist read for the client's library views.
pub const SCOPES: &[&str] = &[
    "user-read-playback-state",
    "user-modify-playback-state",
    "user-read-currently-playing",
    "playlist-read-private",
    "playlist-read-collaborative",
];

/// Random bytes in a PKCE verifier (512 bits).
pub const VERIFIER_BYTES: usize = 64;

/// Refresh this long before `expires_at` so a token does not lapse mid-flight.
pub const DEFAULT_REFRESH_MARGIN_SECS: u64 = 60;
