//! Spotify OAuth authentication library
//!
//! Provides PKCE generation, authorization-code exchange, token refresh,
//! the refresh decision, and the single-slot credential file. This crate has
//! no dependency on the HTTP server and can be tested on its own.
//!
//! Credential flow:
//! 1. `pkce::PkceAttempt::generate()` creates the verifier and S256 challenge
//! 2. User authorizes via `pkce::build_authorization_url()`
//! 3. Callback calls `token::exchange_code()` with the code and verifier
//! 4. Tokens stored via `credentials::CredentialStore::replace()`
//! 5. `guard::needs_refresh()` decides when `token::refresh_token()` runs
//! 6. Refreshed tokens merged via `CredentialSet::apply_refresh()`

pub mod constants;
pub mod credentials;
pub mod error;
pub mod guard;
pub mod pkce;
pub mod settings;
pub mod token;

pub use constants::*;
pub use credentials::{CredentialSet, CredentialStore, Mutation};
pub use error::{Error, Result};
pub use guard::{is_valid, needs_refresh, unix_millis};
pub use pkce::{PkceAttempt, build_authorization_url, compute_challenge, generate_verifier};
pub use settings::OAuthSettings;
pub use token::{TokenResponse, exchange_code, refresh_token};
