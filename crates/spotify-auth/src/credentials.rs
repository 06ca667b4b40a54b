//! Credential set and its single-slot file store
//!
//! The store keeps exactly one credential set in memory behind a tokio Mutex
//! and mirrors every mutation to a JSON file. Writes go through a temp file +
//! rename so a crash never leaves a half-written file. The in-memory copy is
//! authoritative for the lifetime of the process; a failed write is reported
//! but never rolls the mutation back.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::token::TokenResponse;

/// The bridge's one set of user credentials.
///
/// On disk the fields are `accessToken`, `refreshToken` and `expiresIn`.
/// `expiresIn` holds the absolute expiry as unix milliseconds, not a lifetime.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CredentialSet {
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(rename = "expiresIn", default)]
    pub expires_at: u64,
}

impl CredentialSet {
    /// Build a full credential set from an authorization-code exchange.
    pub fn from_exchange(token: TokenResponse, issued_at_millis: u64) -> Self {
        Self {
            access_token: Some(token.access_token),
            refresh_token: token.refresh_token,
            expires_at: expiry(issued_at_millis, token.expires_in),
        }
    }

    /// Merge a refresh response. The refresh token is replaced only when the
    /// upstream rotated it.
    pub fn apply_refresh(&mut self, token: TokenResponse, issued_at_millis: u64) {
        self.access_token = Some(token.access_token);
        if let Some(rotated) = token.refresh_token {
            self.refresh_token = Some(rotated);
        }
        self.expires_at = expiry(issued_at_millis, token.expires_in);
    }

    /// True until the first successful login.
    pub fn is_empty(&self) -> bool {
        self.access_token.is_none() && self.refresh_token.is_none()
    }
}

fn expiry(issued_at_millis: u64, expires_in_secs: u64) -> u64 {
    issued_at_millis.saturating_add(expires_in_secs.saturating_mul(1000))
}

impl fmt::Debug for CredentialSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialSet")
            .field("access_token", &self.access_token.as_ref().map(|_| "[REDACTED]"))
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "[REDACTED]"))
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Outcome of a mutate-then-persist step.
///
/// `credentials` is the new in-memory state, which holds regardless of
/// whether `persisted` succeeded.
#[derive(Debug)]
#[must_use]
pub struct Mutation {
    pub credentials: CredentialSet,
    pub persisted: Result<()>,
}

/// Single-slot credential file manager.
pub struct CredentialStore {
    path: PathBuf,
    state: Mutex<CredentialSet>,
}

impl CredentialStore {
    /// Load the credential set from `path`.
    ///
    /// Never fails: a missing, unreadable or malformed file all mean "no prior
    /// login" and start the store empty.
    pub async fn load(path: PathBuf) -> Self {
        let state = match tokio::fs::read_to_string(&path).await {
            Ok(contents) => match serde_json::from_str::<CredentialSet>(&contents) {
                Ok(credentials) => {
                    info!(
                        path = %path.display(),
                        has_refresh_token = credentials.refresh_token.is_some(),
                        "loaded credentials"
                    );
                    credentials
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "credential file is malformed, starting fresh");
                    CredentialSet::default()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!(path = %path.display(), "credential file not found, starting with empty store");
                CredentialSet::default()
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "credential file unreadable, starting fresh");
                CredentialSet::default()
            }
        };

        Self {
            path,
            state: Mutex::new(state),
        }
    }

    /// Snapshot of the current credential set.
    pub async fn get(&self) -> CredentialSet {
        self.state.lock().await.clone()
    }

    /// Apply `mutate` to the credential set and persist the result.
    ///
    /// The lock is held across the write so two mutations can never reach the
    /// file out of order. A persistence failure is logged and returned in the
    /// `Mutation`; the in-memory change stands.
    pub async fn update<F>(&self, mutate: F) -> Mutation
    where
        F: FnOnce(&mut CredentialSet),
    {
        let mut state = self.state.lock().await;
        mutate(&mut state);
        let persisted = write_atomic(&self.path, &state).await;
        if let Err(e) = &persisted {
            warn!(path = %self.path.display(), error = %e, "failed to persist credentials, keeping in-memory copy");
        }
        Mutation {
            credentials: state.clone(),
            persisted,
        }
    }

    /// Overwrite the whole credential set (after a login).
    pub async fn replace(&self, credentials: CredentialSet) -> Mutation {
        self.update(move |state| *state = credentials).await
    }

    /// Forget the stored credentials.
    pub async fn clear(&self) -> Mutation {
        self.update(|state| *state = CredentialSet::default()).await
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Write the credential set to `path` atomically with 0600 permissions.
async fn write_atomic(path: &Path, data: &CredentialSet) -> Result<()> {
    let json = serde_json::to_string_pretty(data)
        .map_err(|e| Error::CredentialParse(format!("serializing credentials: {e}")))?;

    let dir = path.parent().ok_or_else(|| {
        Error::PersistenceUnavailable("credential path has no parent directory".into())
    })?;

    let tmp_path = dir.join(format!(".credentials.tmp.{}", std::process::id()));

    tokio::fs::write(&tmp_path, json.as_bytes())
        .await
        .map_err(|e| Error::PersistenceUnavailable(format!("writing temp credential file: {e}")))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o600);
        tokio::fs::set_permissions(&tmp_path, perms)
            .await
            .map_err(|e| {
                Error::PersistenceUnavailable(format!("setting credential file permissions: {e}"))
            })?;
    }

    tokio::fs::rename(&tmp_path, path)
        .await
        .map_err(|e| Error::PersistenceUnavailable(format!("renaming temp credential file: {e}")))?;

    debug!(path = %path.display(), "persisted credentials");
    Ok(())
}
