//! Authenticated request pipeline
//!
//! Every call to the Web API passes through `Session::call`:
//!
//! ```text
//! Start → (refresh if stale) → Sent ─┬─ 401 → force refresh → Sent' → done
//!                                    ├─ 429 → sleep(Retry-After + 1) → Sent' → done
//!                                    └─ anything else → done
//! ```
//!
//! At most one retry happens per call whatever the cause. The pipeline never
//! reads response bodies; `Session::check` turns a finished non-2xx response
//! into a typed error for handlers that want one.

use std::time::Duration;

use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue, RETRY_AFTER};
use reqwest::{Method, StatusCode};
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::session::Session;

/// Retry delay used when the upstream sends no usable `Retry-After`.
const DEFAULT_RETRY_AFTER_SECS: u64 = 1;

/// Seconds from a `Retry-After` header, if present and numeric.
pub fn retry_after_secs(headers: &HeaderMap) -> Option<u64> {
    headers
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
}

/// Map a finished non-2xx status and body to the session's error kinds.
pub fn classify_status(
    status: StatusCode,
    retry_after: Option<u64>,
    body: String,
    reauth_required: bool,
) -> Error {
    match status {
        StatusCode::UNAUTHORIZED => Error::UpstreamUnauthorized {
            body,
            reauth_required,
        },
        StatusCode::TOO_MANY_REQUESTS => Error::UpstreamRateLimited { retry_after, body },
        other => Error::UpstreamError {
            status: other.as_u16(),
            body,
        },
    }
}

impl Session {
    /// Start a request against the Web API. `path` is relative to the API
    /// base, e.g. `/me/player/currently-playing`.
    pub fn request(&self, method: Method, path: &str) -> reqwest::RequestBuilder {
        let url = format!(
            "{}/{}",
            self.inner.config.api_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        );
        self.inner.http.request(method, url)
    }

    /// Send `request` with a valid bearer token, retrying once on 401 or 429.
    ///
    /// The response is returned as-is, including a second 401 or 429.
    /// Fails without contacting the API only when there is no access token
    /// at all and none could be obtained.
    pub async fn call(&self, request: reqwest::Request) -> Result<reqwest::Response> {
        let credentials = self.fresh_credentials().await;
        let mut access = credentials.access_token.ok_or(Error::NotAuthenticated)?;

        let mut request = request;
        let mut already_retried = false;
        loop {
            let retry = if already_retried {
                None
            } else {
                request.try_clone()
            };

            let response = self.send_authorized(request, &access).await?;
            if already_retried {
                return Ok(response);
            }

            let status = response.status();
            let delay = match status {
                StatusCode::UNAUTHORIZED => None,
                StatusCode::TOO_MANY_REQUESTS => {
                    let secs = retry_after_secs(response.headers())
                        .unwrap_or(DEFAULT_RETRY_AFTER_SECS);
                    Some(Duration::from_secs(secs.saturating_add(1)))
                }
                _ => return Ok(response),
            };

            let Some(next) = retry else {
                warn!(%status, "request body cannot be replayed, returning without retry");
                return Ok(response);
            };

            match delay {
                None => {
                    metrics::counter!("bridge_upstream_retries_total", "cause" => "unauthorized")
                        .increment(1);
                    info!("upstream returned 401, refreshing token and retrying once");
                    match self.force_refresh(&access).await {
                        Ok(refreshed) => {
                            if let Some(token) = refreshed.access_token {
                                access = token;
                            }
                        }
                        Err(e) => {
                            warn!(error = %e, "forced refresh failed, retrying with stored token");
                        }
                    }
                }
                Some(delay) => {
                    metrics::counter!("bridge_upstream_retries_total", "cause" => "rate_limited")
                        .increment(1);
                    info!(
                        delay_secs = delay.as_secs(),
                        "upstream returned 429, retrying once after delay"
                    );
                    tokio::time::sleep(delay).await;
                }
            }

            request = next;
            already_retried = true;
        }
    }

    /// Pass a 2xx response through; turn anything else into an error.
    pub async fn check(&self, response: reqwest::Response) -> Result<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let retry_after = retry_after_secs(response.headers());
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| String::from("<no body>"));
        debug!(%status, "upstream returned error status");
        Err(classify_status(
            status,
            retry_after,
            body,
            self.reauth_required(),
        ))
    }

    async fn send_authorized(
        &self,
        mut request: reqwest::Request,
        access: &str,
    ) -> Result<reqwest::Response> {
        let value = HeaderValue::from_str(&format!("Bearer {access}"))
            .map_err(|e| Error::Internal(format!("invalid token value: {e}")))?;
        request.headers_mut().insert(AUTHORIZATION, value);

        self.inner
            .http
            .execute(request)
            .await
            .map_err(|e| Error::Transport(e.to_string()))
    }
}
