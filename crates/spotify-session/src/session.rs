//! Owned session service
//!
//! Holds the credential store, the single PKCE login slot and the one
//! in-flight refresh. Handlers receive a cloned `Session` through axum state
//! instead of reaching for module-level globals.
//!
//! Refresh is single-flight: the first caller to find the token stale installs
//! a shared future, later callers await that same future, and the slot is
//! emptied when it resolves.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use futures_util::FutureExt;
use futures_util::future::{BoxFuture, Shared};
use serde::Serialize;
use spotify_auth::{
    CredentialSet, CredentialStore, DEFAULT_API_URL, DEFAULT_REFRESH_MARGIN_SECS, OAuthSettings,
    PkceAttempt, build_authorization_url, exchange_code, is_valid, needs_refresh, unix_millis,
};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};

type RefreshFlight = Shared<BoxFuture<'static, std::result::Result<CredentialSet, Arc<spotify_auth::Error>>>>;

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub oauth: OAuthSettings,
    /// Web API base, e.g. `https://api.spotify.com/v1`
    pub api_url: String,
    /// Refresh this long before the token's expiry.
    pub refresh_margin: Duration,
}

impl SessionConfig {
    pub fn new(oauth: OAuthSettings) -> Self {
        Self {
            oauth,
            api_url: DEFAULT_API_URL.to_string(),
            refresh_margin: Duration::from_secs(DEFAULT_REFRESH_MARGIN_SECS),
        }
    }
}

/// Login state for the status endpoint. Never carries tokens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuthStatus {
    /// A login has completed at some point (a refresh token is stored).
    pub authenticated: bool,
    /// The access token is unexpired right now.
    pub valid: bool,
    pub expires_at: Option<u64>,
    pub reauth_required: bool,
}

#[derive(Clone)]
pub struct Session {
    pub(crate) inner: Arc<Inner>,
}

pub(crate) struct Inner {
    pub(crate) config: SessionConfig,
    pub(crate) http: reqwest::Client,
    store: CredentialStore,
    pending_login: Mutex<Option<PkceAttempt>>,
    refresh_flight: Mutex<Option<RefreshFlight>>,
    reauth_required: AtomicBool,
}

impl Session {
    pub fn new(config: SessionConfig, http: reqwest::Client, store: CredentialStore) -> Self {
        info!(
            api_url = %config.api_url,
            refresh_margin_secs = config.refresh_margin.as_secs(),
            "session initialized"
        );
        Self {
            inner: Arc::new(Inner {
                config,
                http,
                store,
                pending_login: Mutex::new(None),
                refresh_flight: Mutex::new(None),
                reauth_required: AtomicBool::new(false),
            }),
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.inner.config
    }

    /// Start a login: store a fresh PKCE attempt and return the authorize URL.
    ///
    /// An unfinished earlier attempt is overwritten; its callback will fail.
    pub async fn start_login(&self) -> Result<String> {
        let attempt = PkceAttempt::generate();
        let url = build_authorization_url(&self.inner.config.oauth, attempt.challenge())?;

        let previous = self.inner.pending_login.lock().await.replace(attempt);
        if previous.is_some() {
            debug!("replaced unfinished login attempt");
        }
        info!("login started");
        Ok(url)
    }

    /// Finish a login with the authorization code from the callback.
    ///
    /// Consumes the pending PKCE attempt whether or not the exchange succeeds,
    /// since the code is single-use either way.
    pub async fn complete_login(&self, code: &str) -> Result<CredentialSet> {
        let attempt = self
            .inner
            .pending_login
            .lock()
            .await
            .take()
            .ok_or(Error::NoPendingLogin)?;

        let issued_at = unix_millis();
        let token = exchange_code(
            &self.inner.http,
            &self.inner.config.oauth,
            code,
            attempt.verifier(),
        )
        .await?;

        let mutation = self
            .inner
            .store
            .replace(CredentialSet::from_exchange(token, issued_at))
            .await;
        self.inner.reauth_required.store(false, Ordering::Relaxed);
        info!(
            expires_at = mutation.credentials.expires_at,
            persisted = mutation.persisted.is_ok(),
            "login completed"
        );
        Ok(mutation.credentials)
    }

    /// Snapshot of the stored credential set.
    pub async fn credentials(&self) -> CredentialSet {
        self.inner.store.get().await
    }

    pub async fn status(&self, now_millis: u64) -> AuthStatus {
        let credentials = self.inner.store.get().await;
        AuthStatus {
            authenticated: credentials.refresh_token.is_some(),
            valid: is_valid(&credentials, now_millis),
            expires_at: credentials.access_token.as_ref().map(|_| credentials.expires_at),
            reauth_required: self.reauth_required(),
        }
    }

    /// Forget the stored credentials and any pending login.
    pub async fn clear(&self) {
        self.inner.pending_login.lock().await.take();
        let mutation = self.inner.store.clear().await;
        self.inner.reauth_required.store(false, Ordering::Relaxed);
        info!(persisted = mutation.persisted.is_ok(), "credentials cleared");
    }

    /// True once the token endpoint has rejected the stored refresh token.
    pub fn reauth_required(&self) -> bool {
        self.inner.reauth_required.load(Ordering::Relaxed)
    }

    /// Refresh the access token, joining a refresh already in flight.
    pub async fn refresh(&self) -> Result<CredentialSet> {
        let flight = {
            let mut slot = self.inner.refresh_flight.lock().await;
            match slot.as_ref() {
                Some(flight) => {
                    debug!("joining in-flight token refresh");
                    flight.clone()
                }
                None => {
                    let inner = Arc::clone(&self.inner);
                    let flight = async move {
                        let outcome = inner.refresh_once().await.map_err(Arc::new);
                        inner.refresh_flight.lock().await.take();
                        outcome
                    }
                    .boxed()
                    .shared();
                    *slot = Some(flight.clone());
                    flight
                }
            }
        };
        flight.await.map_err(Error::Refresh)
    }

    /// Refresh after the upstream rejected `stale_access`.
    ///
    /// If the stored token already differs from the rejected one, another
    /// caller refreshed in the meantime and the stored set is returned as is.
    pub async fn force_refresh(&self, stale_access: &str) -> Result<CredentialSet> {
        let current = self.inner.store.get().await;
        match current.access_token.as_deref() {
            Some(access) if access != stale_access => {
                debug!("token already replaced since rejection, skipping refresh");
                Ok(current)
            }
            _ => self.refresh().await,
        }
    }

    /// Credentials to send with the next request.
    ///
    /// Refreshes first when the guard says so. A failed refresh is logged and
    /// the stored (possibly stale) set is used anyway.
    pub async fn fresh_credentials(&self) -> CredentialSet {
        let current = self.inner.store.get().await;
        if !needs_refresh(&current, unix_millis(), self.inner.config.refresh_margin) {
            return current;
        }
        match self.refresh().await {
            Ok(refreshed) => refreshed,
            Err(e) => {
                warn!(error = %e, "token refresh failed, continuing with stored token");
                self.inner.store.get().await
            }
        }
    }
}

impl Inner {
    async fn refresh_once(&self) -> spotify_auth::Result<CredentialSet> {
        let current = self.store.get().await;
        let Some(refresh) = current.refresh_token else {
            metrics::counter!("bridge_token_refreshes_total", "outcome" => "no_refresh_token")
                .increment(1);
            return Err(spotify_auth::Error::MissingRefreshToken);
        };

        let issued_at = unix_millis();
        match spotify_auth::refresh_token(&self.http, &self.config.oauth, &refresh).await {
            Ok(token) => {
                let rotated = token.refresh_token.is_some();
                // A logout or a new login while the grant was in flight wins.
                let mut applied = false;
                let mutation = self
                    .store
                    .update(|credentials| {
                        if credentials.refresh_token.as_deref() == Some(refresh.as_str()) {
                            credentials.apply_refresh(token, issued_at);
                            applied = true;
                        }
                    })
                    .await;
                if !applied {
                    metrics::counter!("bridge_token_refreshes_total", "outcome" => "superseded")
                        .increment(1);
                    info!("credentials changed during refresh, discarding refreshed token");
                    return Ok(mutation.credentials);
                }
                self.reauth_required.store(false, Ordering::Relaxed);
                metrics::counter!("bridge_token_refreshes_total", "outcome" => "success")
                    .increment(1);
                info!(
                    rotated,
                    expires_at = mutation.credentials.expires_at,
                    persisted = mutation.persisted.is_ok(),
                    "access token refreshed"
                );
                Ok(mutation.credentials)
            }
            Err(e @ spotify_auth::Error::InvalidGrant(_)) => {
                let still_current = self.store.get().await.refresh_token.as_deref()
                    == Some(refresh.as_str());
                if still_current {
                    self.reauth_required.store(true, Ordering::Relaxed);
                }
                metrics::counter!("bridge_token_refreshes_total", "outcome" => "rejected")
                    .increment(1);
                warn!(error = %e, still_current, "refresh token rejected");
                Err(e)
            }
            Err(e) => {
                metrics::counter!("bridge_token_refreshes_total", "outcome" => "failed")
                    .increment(1);
                warn!(error = %e, "token refresh failed");
                Err(e)
            }
        }
    }
}
