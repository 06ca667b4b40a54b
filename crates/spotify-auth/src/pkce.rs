//! PKCE (Proof Key for Code Exchange) per RFC 7636
//!
//! A login attempt holds the verifier server-side and sends only the S256
//! challenge to the authorize endpoint. At callback time the same verifier is
//! presented to the token endpoint, which re-derives the challenge and
//! compares.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use common::Secret;
use rand::RngExt;
use sha2::{Digest, Sha256};

use crate::constants::{SCOPES, VERIFIER_BYTES};
use crate::error::{Error, Result};
use crate::settings::OAuthSettings;

/// Generate a cryptographically random PKCE code verifier.
///
/// 64 random bytes encoded as URL-safe base64 without padding (86 chars,
/// inside RFC 7636's 43..=128 range).
pub fn generate_verifier() -> String {
    let mut bytes = [0u8; VERIFIER_BYTES];
    rand::rng().fill(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// `challenge = BASE64URL(SHA256(verifier))`
pub fn compute_challenge(verifier: &str) -> String {
    let hash = Sha256::digest(verifier.as_bytes());
    URL_SAFE_NO_PAD.encode(hash)
}

/// One in-flight login: the secret verifier and the challenge derived from it.
#[derive(Debug, Clone)]
pub struct PkceAttempt {
    verifier: Secret<String>,
    challenge: String,
}

impl PkceAttempt {
    pub fn generate() -> Self {
        Self::from_verifier(generate_verifier())
    }

    pub fn from_verifier(verifier: String) -> Self {
        let challenge = compute_challenge(&verifier);
        Self {
            verifier: verifier.into(),
            challenge,
        }
    }

    pub fn verifier(&self) -> &str {
        self.verifier.expose()
    }

    pub fn challenge(&self) -> &str {
        &self.challenge
    }
}

/// Build the authorize URL for a login attempt.
///
/// Query values are form-encoded, so the space-separated scope list goes out
/// as `+`-joined words.
pub fn build_authorization_url(settings: &OAuthSettings, challenge: &str) -> Result<String> {
    let scope = SCOPES.join(" ");
    let url = reqwest::Url::parse_with_params(
        &settings.authorize_endpoint(),
        &[
            ("client_id", settings.client_id.as_str()),
            ("response_type", "code"),
            ("redirect_uri", settings.redirect_uri.as_str()),
            ("code_challenge_method", "S256"),
            ("code_challenge", challenge),
            ("scope", scope.as_str()),
        ],
    )
    .map_err(|e| Error::InvalidSettings(format!("authorize endpoint: {e}")))?;
    Ok(url.into())
}
