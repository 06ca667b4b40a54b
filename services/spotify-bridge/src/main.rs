//! Spotify Bridge
//!
//! Single-binary Rust service that:
//! 1. Runs the PKCE login against Spotify and keeps the resulting tokens
//! 2. Refreshes them before they expire (request-time and in the background)
//! 3. Exposes a small JSON API (search, now playing, transport, queue) that
//!    forwards to the Spotify Web API with the stored credentials

mod api;
mod auth;
mod config;
mod error;
mod metrics;
mod tracks;

use anyhow::{Context, Result};
use axum::Router;
use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use spotify_auth::{CredentialStore, OAuthSettings};
use spotify_session::{Session, SessionConfig};
use std::net::SocketAddr;
use std::time::{Duration, Instant};
use tokio::net::TcpListener;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use metrics_exporter_prometheus::PrometheusHandle;

use crate::config::Config;

/// How long in-flight requests may take to finish after a shutdown signal.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

/// Shared application state accessible from all handlers
#[derive(Clone)]
pub(crate) struct AppState {
    session: Session,
    prometheus: PrometheusHandle,
    started_at: Instant,
}

/// Build the axum router with all routes and shared state.
fn build_router(state: AppState, max_connections: usize) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .route("/login", get(auth::login))
        .route("/callback", get(auth::callback))
        .route("/auth/status", get(auth::status))
        .route("/auth/logout", post(auth::logout))
        .route("/api/search", get(api::search))
        .route("/api/now-playing", get(api::now_playing))
        .route("/api/player/{action}", post(api::player))
        .route("/api/queue", get(api::queue).post(api::enqueue))
        .layer(axum::middleware::from_fn(metrics::track_requests))
        .layer(tower::limit::ConcurrencyLimitLayer::new(max_connections))
        .with_state(state)
}

#[tokio::main]
async fn main() -> Result<()> {
    // JSON logs, filtered by LOG_LEVEL or RUST_LOG
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_env("LOG_LEVEL")
                .or_else(|_| EnvFilter::try_from_default_env())
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    info!("starting spotify-bridge");

    let prometheus_handle = metrics::install_recorder()?;

    let args: Vec<String> = std::env::args().collect();
    let cli_config_path = args
        .iter()
        .position(|a| a == "--config")
        .and_then(|i| args.get(i + 1))
        .map(|s| s.as_str());

    let (config_path, required) = Config::resolve_path(cli_config_path);
    info!(path = %config_path.display(), required, "loading configuration");

    let config = Config::load(&config_path, required)
        .with_context(|| format!("failed to load config from {}", config_path.display()))?;

    info!(
        listen_addr = %config.server.listen_addr,
        redirect_uri = %config.spotify.redirect_uri,
        credentials_path = %config.tokens.credentials_path.display(),
        tls = config.server.tls_cert.is_some(),
        "configuration loaded"
    );

    let oauth = OAuthSettings::new(
        config.spotify.client_id.clone(),
        config.spotify.redirect_uri.clone(),
    )
    .with_accounts_url(config.spotify.accounts_url.clone());
    let mut session_config = SessionConfig::new(oauth);
    session_config.api_url = config.spotify.api_url.clone();
    session_config.refresh_margin = Duration::from_secs(config.tokens.refresh_margin_secs);

    let store = CredentialStore::load(config.tokens.credentials_path.clone()).await;
    let session = Session::new(session_config, reqwest::Client::new(), store);

    let refresh_task = spotify_session::spawn_refresh_task(
        session.clone(),
        Duration::from_secs(config.tokens.refresh_interval_secs),
    );

    let app_state = AppState {
        session,
        prometheus: prometheus_handle,
        started_at: Instant::now(),
    };
    let app = build_router(app_state, config.server.max_connections);
    let listen_addr = config.server.listen_addr;

    match (&config.server.tls_cert, &config.server.tls_key) {
        (Some(cert), Some(key)) => {
            let tls = axum_server::tls_rustls::RustlsConfig::from_pem_file(cert, key)
                .await
                .with_context(|| {
                    format!(
                        "failed to load TLS certificate {} / key {}",
                        cert.display(),
                        key.display()
                    )
                })?;
            serve_tls(app, listen_addr, tls).await?;
        }
        _ => serve_plain(app, listen_addr).await?,
    }

    refresh_task.abort();
    info!("shutdown complete");
    Ok(())
}

/// Serve plain HTTP until a shutdown signal, then drain for `DRAIN_TIMEOUT`.
async fn serve_plain(app: Router, listen_addr: SocketAddr) -> Result<()> {
    let listener = TcpListener::bind(listen_addr)
        .await
        .with_context(|| format!("failed to bind to {listen_addr}"))?;
    info!(addr = %listen_addr, "listening on http");

    // The drain timer starts at signal receipt, not at server start
    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();
    let server_handle = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
            })
            .await
    });

    shutdown_signal().await;
    let _ = shutdown_tx.send(());

    match tokio::time::timeout(DRAIN_TIMEOUT, server_handle).await {
        Ok(Ok(Ok(()))) => info!("all in-flight requests drained"),
        Ok(Ok(Err(e))) => error!(error = %e, "server error during shutdown"),
        Ok(Err(e)) => error!(error = %e, "server task panicked"),
        Err(_) => warn!(
            drain_timeout_secs = DRAIN_TIMEOUT.as_secs(),
            "drain timeout exceeded, forcing shutdown"
        ),
    }
    Ok(())
}

/// Serve HTTPS with rustls; the handle enforces the same drain timeout.
async fn serve_tls(
    app: Router,
    listen_addr: SocketAddr,
    tls: axum_server::tls_rustls::RustlsConfig,
) -> Result<()> {
    let handle = axum_server::Handle::new();
    let shutdown_handle = handle.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        shutdown_handle.graceful_shutdown(Some(DRAIN_TIMEOUT));
    });

    info!(addr = %listen_addr, "listening on https");
    axum_server::bind_rustls(listen_addr, tls)
        .handle(handle)
        .serve(app.into_make_service())
        .await
        .with_context(|| format!("https server on {listen_addr} failed"))
}

/// Liveness plus whether a Spotify login is stored.
async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    let credentials = state.session.credentials().await;
    axum::Json(serde_json::json!({
        "ok": true,
        "authenticated": credentials.refresh_token.is_some(),
        "uptime_seconds": state.started_at.elapsed().as_secs(),
    }))
}

/// Prometheus metrics endpoint in text exposition format.
async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    (
        axum::http::StatusCode::OK,
        [(
            axum::http::header::CONTENT_TYPE,
            "text/plain; version=0.0.4; charset=utf-8",
        )],
        state.prometheus.render(),
    )
}

/// Wait for SIGTERM or SIGINT for graceful shutdown.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received SIGINT, shutting down"),
        _ = terminate => info!("received SIGTERM, shutting down"),
    }
}
