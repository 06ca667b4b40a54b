//! Authenticated access to the Spotify Web API
//!
//! `Session` owns the bridge's single credential set and the pending PKCE
//! login, and is the only way the rest of the service talks to Spotify:
//!
//! 1. `/login` → `Session::start_login()` stores a fresh PKCE attempt
//! 2. `/callback` → `Session::complete_login()` exchanges the code and persists tokens
//! 3. Every API call goes through `Session::call()`, which refreshes stale
//!    tokens, injects the bearer header, and retries once on 401 or 429
//! 4. Refreshes are single-flight: concurrent callers share one token request
//! 5. A background task refreshes proactively before expiry

pub mod error;
pub mod pipeline;
pub mod refresh;
pub mod session;

pub use error::{Error, Result};
pub use pipeline::{classify_status, retry_after_secs};
pub use refresh::spawn_refresh_task;
pub use session::{AuthStatus, Session, SessionConfig};

#[cfg(test)]
mod test_support;
