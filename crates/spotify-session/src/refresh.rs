//! Proactive background token refresh
//!
//! Spawns a periodic task that refreshes the access token before it enters
//! the request-time margin, so most calls never wait on the token endpoint.
//! It goes through `Session::refresh`, so it shares the single-flight slot
//! with request-time refreshes.

use std::time::Duration;

use spotify_auth::{needs_refresh, unix_millis};
use tracing::{debug, info, warn};

use crate::session::Session;

/// Spawn a background task that refreshes an expiring token every `interval`.
///
/// A token is refreshed when it would otherwise enter the request margin
/// before the next tick. Nothing happens before the first login or after the
/// refresh token has been rejected.
pub fn spawn_refresh_task(session: Session, interval: Duration) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        // Skip the immediate first tick, the request path covers startup
        ticker.tick().await;

        loop {
            ticker.tick().await;
            refresh_cycle(&session, interval).await;
        }
    })
}

/// Run one check and refresh if the token expires before the next one.
async fn refresh_cycle(session: &Session, interval: Duration) {
    let credentials = session.credentials().await;
    if credentials.refresh_token.is_none() {
        debug!("no login yet, skipping background refresh");
        return;
    }
    if session.reauth_required() {
        debug!("refresh token rejected earlier, waiting for a new login");
        return;
    }

    let threshold = interval.saturating_add(session.config().refresh_margin);
    if !needs_refresh(&credentials, unix_millis(), threshold) {
        return;
    }

    match session.refresh().await {
        Ok(_) => info!("background token refresh succeeded"),
        Err(e) => warn!(error = %e, "background token refresh failed, will retry next cycle"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{MockSpotify, Reply, session_with};
    use spotify_auth::CredentialSet;

    fn expiring_in(millis: u64) -> CredentialSet {
        CredentialSet {
            access_token: Some("at_old".into()),
            refresh_token: Some("rt_old".into()),
            expires_at: unix_millis() + millis,
        }
    }

    fn refresh_ok() -> Reply {
        Reply::json(200, r#"{"access_token":"at_{n}","expires_in":3600}"#)
    }

    #[tokio::test]
    async fn cycle_skips_valid_tokens() {
        let mock = MockSpotify::builder().token(refresh_ok()).start().await;
        let dir = tempfile::tempdir().unwrap();
        let session = session_with(&mock, &dir, Some(expiring_in(3_600_000))).await;

        refresh_cycle(&session, Duration::from_secs(300)).await;
        assert_eq!(mock.token_hits(), 0);
    }

    #[tokio::test]
    async fn cycle_refreshes_token_expiring_before_next_tick() {
        let mock = MockSpotify::builder().token(refresh_ok()).start().await;
        let dir = tempfile::tempdir().unwrap();
        // outside the 60s margin, inside interval + margin
        let session = session_with(&mock, &dir, Some(expiring_in(200_000))).await;

        refresh_cycle(&session, Duration::from_secs(300)).await;
        assert_eq!(mock.token_hits(), 1);
        assert_eq!(
            session.credentials().await.access_token.as_deref(),
            Some("at_1")
        );
    }

    #[tokio::test]
    async fn huge_interval_saturates_threshold() {
        let mock = MockSpotify::builder().token(refresh_ok()).start().await;
        let dir = tempfile::tempdir().unwrap();
        let session = session_with(&mock, &dir, Some(expiring_in(3_600_000))).await;

        // every token expires "before the next tick" when the interval is unbounded
        refresh_cycle(&session, Duration::MAX).await;
        assert_eq!(mock.token_hits(), 1);
    }

    #[tokio::test]
    async fn cycle_does_nothing_before_login() {
        let mock = MockSpotify::builder().token(refresh_ok()).start().await;
        let dir = tempfile::tempdir().unwrap();
        let session = session_with(&mock, &dir, None).await;

        refresh_cycle(&session, Duration::from_secs(300)).await;
        assert_eq!(mock.token_hits(), 0);
    }

    #[tokio::test]
    async fn cycle_stops_after_rejection() {
        let mock = MockSpotify::builder()
            .token(Reply::json(400, r#"{"error":"invalid_grant"}"#))
            .start()
            .await;
        let dir = tempfile::tempdir().unwrap();
        let session = session_with(&mock, &dir, Some(expiring_in(0))).await;

        refresh_cycle(&session, Duration::from_secs(300)).await;
        refresh_cycle(&session, Duration::from_secs(300)).await;
        assert_eq!(mock.token_hits(), 1);
        assert!(session.reauth_required());
    }
}
