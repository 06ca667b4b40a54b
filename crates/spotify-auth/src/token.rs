//! OAuth token exchange and refresh
//!
//! Both operations POST a form-encoded body to the accounts service token
//! endpoint with different grant types:
//! 1. `authorization_code` at the end of the login flow
//! 2. `refresh_token` whenever the guard says the access token is stale
//!
//! Neither call retries. Authorization codes are single-use, and a refresh
//! failure is handed back to the session which decides what it means.

use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};
use crate::settings::OAuthSettings;

/// Response from the token endpoint for both exchange and refresh.
///
/// `expires_in` is a lifetime in seconds counted from issuance; callers turn
/// it into an absolute timestamp before storing. `refresh_token` is omitted
/// by Spotify on refreshes that do not rotate it.
#[derive(Debug, Deserialize, Serialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    pub expires_in: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
}

/// Exchange an authorization code for tokens.
///
/// The verifier must be the one whose challenge was sent to the authorize
/// endpoint for this login attempt.
pub async fn exchange_code(
    client: &reqwest::Client,
    settings: &OAuthSettings,
    code: &str,
    verifier: &str,
) -> Result<TokenResponse> {
    let response = client
        .post(settings.token_endpoint())
        .form(&[
            ("client_id", settings.client_id.as_str()),
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", settings.redirect_uri.as_str()),
            ("code_verifier", verifier),
        ])
        .send()
        .await
        .map_err(|e| Error::Http(format!("token exchange request failed: {e}")))?;

    let status = response.status();
    if !status.is_success() {
        let body = read_body(response).await;
        return Err(Error::ExchangeFailed(format!(
            "token endpoint returned {status}: {body}"
        )));
    }

    let token = response
        .json::<TokenResponse>()
        .await
        .map_err(|e| Error::ExchangeFailed(format!("invalid token response: {e}")))?;

    if token.refresh_token.is_none() {
        return Err(Error::ExchangeFailed(
            "token response is missing refresh_token".into(),
        ));
    }
    debug!(expires_in = token.expires_in, "authorization code exchanged");
    Ok(token)
}

/// Mint a new access token from a refresh token.
///
/// 400 `invalid_grant`, 401 and 403 mean the refresh token itself is no good
/// and are reported as `InvalidGrant`; anything else is `RefreshFailed`.
pub async fn refresh_token(
    client: &reqwest::Client,
    settings: &OAuthSettings,
    refresh: &str,
) -> Result<TokenResponse> {
    let response = client
        .post(settings.token_endpoint())
        .form(&[
            ("client_id", settings.client_id.as_str()),
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh),
        ])
        .send()
        .await
        .map_err(|e| Error::Http(format!("token refresh request failed: {e}")))?;

    let status = response.status();
    if !status.is_success() {
        let body = read_body(response).await;
        let rejected = match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => true,
            StatusCode::BAD_REQUEST => body.contains("invalid_grant"),
            _ => false,
        };
        if rejected {
            return Err(Error::InvalidGrant(format!("{status}: {body}")));
        }
        return Err(Error::RefreshFailed(format!(
            "token endpoint returned {status}: {body}"
        )));
    }

    response
        .json::<TokenResponse>()
        .await
        .map_err(|e| Error::RefreshFailed(format!("invalid refresh response: {e}")))
}

async fn read_body(response: reqwest::Response) -> String {
    response
        .text()
        .await
        .unwrap_or_else(|_| String::from("<no body>"))
}
