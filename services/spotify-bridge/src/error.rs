//! HTTP error responses
//!
//! Every handler failure leaves the bridge as
//! `{"error":{"type":"...","message":"...","request_id":"req_..."}}`.
//! Upstream failures keep the upstream status and body in `message` rather
//! than being reinterpreted.

use axum::http::{HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use spotify_session::Error as SessionError;
use tracing::warn;

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    kind: &'static str,
    message: String,
    retry_after: Option<u64>,
}

impl ApiError {
    pub fn new(status: StatusCode, kind: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            kind,
            message: message.into(),
            retry_after: None,
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "invalid_request", message)
    }

    #[cfg(test)]
    pub fn status(&self) -> StatusCode {
        self.status
    }

    #[cfg(test)]
    pub fn kind(&self) -> &'static str {
        self.kind
    }

    fn reauthentication_required(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "reauthentication_required", message)
    }
}

impl From<SessionError> for ApiError {
    fn from(err: SessionError) -> Self {
        match err {
            SessionError::NotAuthenticated => {
                Self::reauthentication_required("no Spotify login, visit /login")
            }
            SessionError::NoPendingLogin => Self::new(
                StatusCode::BAD_REQUEST,
                "no_pending_login",
                "no login in progress, start again at /login",
            ),
            SessionError::Auth(e @ spotify_auth::Error::ExchangeFailed(_))
            | SessionError::Auth(e @ spotify_auth::Error::Http(_)) => {
                Self::new(StatusCode::BAD_GATEWAY, "exchange_failed", e.to_string())
            }
            SessionError::Auth(e) => {
                Self::new(StatusCode::INTERNAL_SERVER_ERROR, "auth_error", e.to_string())
            }
            SessionError::Refresh(e) if e.requires_reauthentication() => {
                Self::reauthentication_required(format!("{e}, visit /login"))
            }
            SessionError::Refresh(e) => {
                Self::new(StatusCode::BAD_GATEWAY, "refresh_failed", e.to_string())
            }
            SessionError::Transport(msg) => {
                Self::new(StatusCode::BAD_GATEWAY, "upstream_unreachable", msg)
            }
            SessionError::UpstreamUnauthorized {
                reauth_required: true,
                body,
            } => Self::reauthentication_required(format!(
                "Spotify rejected the stored refresh token, visit /login ({body})"
            )),
            SessionError::UpstreamUnauthorized { body, .. } => {
                Self::new(StatusCode::UNAUTHORIZED, "upstream_unauthorized", body)
            }
            SessionError::UpstreamRateLimited { retry_after, body } => Self {
                retry_after,
                ..Self::new(StatusCode::TOO_MANY_REQUESTS, "rate_limited", body)
            },
            SessionError::UpstreamError { status, body } => Self::new(
                StatusCode::from_u16(status).unwrap_or(StatusCode::BAD_GATEWAY),
                "upstream_error",
                body,
            ),
            SessionError::Internal(msg) => {
                Self::new(StatusCode::INTERNAL_SERVER_ERROR, "internal_error", msg)
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let request_id = format!("req_{}", uuid::Uuid::new_v4().as_simple());
        if self.status.is_server_error() {
            warn!(request_id, kind = self.kind, status = %self.status, message = %self.message, "request failed");
        }

        let mut body = serde_json::json!({
            "error": {
                "type": self.kind,
                "message": self.message,
                "request_id": request_id,
            }
        });
        if self.kind == "reauthentication_required" {
            body["error"]["login"] = serde_json::Value::from("/login");
        }

        let mut response = (
            self.status,
            [(header::CONTENT_TYPE, "application/json")],
            body.to_string(),
        )
            .into_response();
        if let Some(secs) = self.retry_after {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(secs));
        }
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), 1024 * 1024)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn response_has_type_message_and_request_id() {
        let response = ApiError::bad_request("missing q").into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let json = body_json(response).await;
        assert_eq!(json["error"]["type"], "invalid_request");
        assert_eq!(json["error"]["message"], "missing q");
        assert!(
            json["error"]["request_id"]
                .as_str()
                .unwrap()
                .starts_with("req_")
        );
    }

    #[tokio::test]
    async fn unauthorized_after_rejected_refresh_asks_for_login() {
        let err: ApiError = SessionError::UpstreamUnauthorized {
            body: "{}".into(),
            reauth_required: true,
        }
        .into();
        assert_eq!(err.status(), StatusCode::UNAUTHORIZED);

        let json = body_json(err.into_response()).await;
        assert_eq!(json["error"]["type"], "reauthentication_required");
        assert_eq!(json["error"]["login"], "/login");
    }

    #[test]
    fn plain_unauthorized_stays_upstream_error() {
        let err: ApiError = SessionError::UpstreamUnauthorized {
            body: "{}".into(),
            reauth_required: false,
        }
        .into();
        assert_eq!(err.kind(), "upstream_unauthorized");
    }

    #[test]
    fn upstream_status_is_preserved() {
        let err: ApiError = SessionError::UpstreamError {
            status: 404,
            body: r#"{"error":{"status":404,"message":"No active device found"}}"#.into(),
        }
        .into();
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
        assert_eq!(err.kind(), "upstream_error");
    }

    #[test]
    fn rate_limit_sets_retry_after_header() {
        let err: ApiError = SessionError::UpstreamRateLimited {
            retry_after: Some(7),
            body: "{}".into(),
        }
        .into();
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers()[header::RETRY_AFTER], "7");
    }

    #[test]
    fn revoked_refresh_token_requires_login() {
        let err: ApiError = SessionError::Refresh(Arc::new(spotify_auth::Error::InvalidGrant(
            "revoked".into(),
        )))
        .into();
        assert_eq!(err.kind(), "reauthentication_required");
    }

    #[test]
    fn exchange_failure_is_bad_gateway() {
        let err: ApiError =
            SessionError::Auth(spotify_auth::Error::ExchangeFailed("bad code".into())).into();
        assert_eq!(err.status(), StatusCode::BAD_GATEWAY);
        assert_eq!(err.kind(), "exchange_failed");
    }
}
