//! Refresh decision
//!
//! Pure functions over a credential set and a caller-supplied instant, so the
//! boundary behavior is testable without a clock.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::credentials::CredentialSet;

/// Current time as unix milliseconds.
pub fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Whether the access token must be refreshed before it is used.
///
/// True when there is no access token, or when `now` has reached
/// `expires_at - margin`.
pub fn needs_refresh(credentials: &CredentialSet, now_millis: u64, margin: Duration) -> bool {
    if credentials.access_token.is_none() {
        return true;
    }
    let margin_millis = u64::try_from(margin.as_millis()).unwrap_or(u64::MAX);
    now_millis >= credentials.expires_at.saturating_sub(margin_millis)
}

/// Whether the access token is still valid at `now`, with no margin.
///
/// Only for status reporting; outbound calls gate on `needs_refresh`.
pub fn is_valid(credentials: &CredentialSet, now_millis: u64) -> bool {
    credentials.access_token.is_some() && now_millis < credentials.expires_at
}

#[cfg(test)]
mod tests {
    use super::*;

    const NOW: u64 = 1_760_000_000_000;
    const MARGIN: Duration = Duration::from_secs(60);

    fn expiring_at(expires_at: u64) -> CredentialSet {
        CredentialSet {
            access_token: Some("at".into()),
            refresh_token: Some("rt".into()),
            expires_at,
        }
    }

    #[test]
    fn missing_access_token_needs_refresh() {
        let credentials = CredentialSet {
            access_token: None,
            refresh_token: Some("rt".into()),
            expires_at: NOW + 3_600_000,
        };
        assert!(needs_refresh(&credentials, NOW, MARGIN));
        assert!(!is_valid(&credentials, NOW));
    }

    #[test]
    fn inside_margin_needs_refresh() {
        // expires in 30s, margin 60s
        let credentials = expiring_at(NOW + 30_000);
        assert!(needs_refresh(&credentials, NOW, MARGIN));
        assert!(is_valid(&credentials, NOW));
    }

    #[test]
    fn boundary_is_inclusive() {
        let credentials = expiring_at(NOW + 60_000);
        assert!(needs_refresh(&credentials, NOW, MARGIN));
        assert!(!needs_refresh(&credentials, NOW - 1, MARGIN));
    }

    #[test]
    fn every_instant_before_boundary_is_fresh() {
        let expires_at = NOW + 600_000;
        let boundary = expires_at - 60_000;
        let credentials = expiring_at(expires_at);
        for offset in [1u64, 2, 1_000, 59_999, 300_000] {
            assert!(
                !needs_refresh(&credentials, boundary - offset, MARGIN),
                "{offset}ms before boundary must not need refresh"
            );
            assert!(needs_refresh(&credentials, boundary + offset - 1, MARGIN));
        }
    }

    #[test]
    fn expired_token_is_invalid() {
        let credentials = expiring_at(NOW);
        assert!(!is_valid(&credentials, NOW));
        assert!(is_valid(&credentials, NOW - 1));
    }

    #[test]
    fn margin_larger_than_timestamp_saturates() {
        let credentials = expiring_at(10);
        assert!(needs_refresh(&credentials, 0, MARGIN));
    }

    #[test]
    fn unbounded_margin_always_needs_refresh() {
        let credentials = expiring_at(u64::MAX);
        assert!(needs_refresh(&credentials, NOW, Duration::MAX));
    }
}
