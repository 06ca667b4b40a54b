//! Scripted mock of the Spotify accounts service and Web API for tests.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::body::Body;
use axum::extract::State;
use axum::http::{HeaderMap, Response};
use axum::routing::post;
use spotify_auth::{CredentialSet, CredentialStore, OAuthSettings};
use tokio::net::TcpListener;

use crate::session::{Session, SessionConfig};

#[derive(Clone)]
pub struct Reply {
    status: u16,
    headers: Vec<(&'static str, String)>,
    body: String,
    delay: Duration,
}

impl Reply {
    /// `{n}` in the body is replaced with the endpoint's hit count.
    pub fn json(status: u16, body: &str) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: body.to_string(),
            delay: Duration::ZERO,
        }
    }

    pub fn with_header(mut self, name: &'static str, value: &str) -> Self {
        self.headers.push((name, value.to_string()));
        self
    }

    /// Hold this reply back for `delay` before answering.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    fn render(&self, hit: usize) -> Response<Body> {
        let mut builder = Response::builder()
            .status(self.status)
            .header("content-type", "application/json");
        for (name, value) in &self.headers {
            builder = builder.header(*name, value);
        }
        builder
            .body(Body::from(self.body.replace("{n}", &hit.to_string())))
            .unwrap()
    }
}

/// Replies served in order; the last one repeats.
struct Script(Mutex<VecDeque<Reply>>);

impl Script {
    fn next(&self, fallback: &Reply) -> Reply {
        let mut replies = self.0.lock().unwrap();
        if replies.len() > 1 {
            replies.pop_front().unwrap()
        } else {
            replies.front().cloned().unwrap_or_else(|| fallback.clone())
        }
    }
}

struct MockState {
    token: Script,
    api: Script,
    token_delay: Duration,
    token_hits: AtomicUsize,
    api_hits: AtomicUsize,
    token_forms: Mutex<Vec<HashMap<String, String>>>,
    authorizations: Mutex<Vec<String>>,
}

#[derive(Default)]
pub struct MockSpotifyBuilder {
    token: Vec<Reply>,
    api: Vec<Reply>,
    token_delay: Duration,
}

impl MockSpotifyBuilder {
    pub fn token(mut self, reply: Reply) -> Self {
        self.token.push(reply);
        self
    }

    pub fn api(mut self, reply: Reply) -> Self {
        self.api.push(reply);
        self
    }

    pub fn token_delay(mut self, delay: Duration) -> Self {
        self.token_delay = delay;
        self
    }

    pub async fn start(self) -> MockSpotify {
        let state = Arc::new(MockState {
            token: Script(Mutex::new(self.token.into())),
            api: Script(Mutex::new(self.api.into())),
            token_delay: self.token_delay,
            token_hits: AtomicUsize::new(0),
            api_hits: AtomicUsize::new(0),
            token_forms: Mutex::new(Vec::new()),
            authorizations: Mutex::new(Vec::new()),
        });

        let app = axum::Router::new()
            .route("/api/token", post(token_handler))
            .fallback(api_handler)
            .with_state(state.clone());

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        MockSpotify {
            base_url: format!("http://{addr}"),
            state,
        }
    }
}

pub struct MockSpotify {
    pub base_url: String,
    state: Arc<MockState>,
}

impl MockSpotify {
    pub fn builder() -> MockSpotifyBuilder {
        MockSpotifyBuilder::default()
    }

    pub fn token_hits(&self) -> usize {
        self.state.token_hits.load(Ordering::SeqCst)
    }

    pub fn api_hits(&self) -> usize {
        self.state.api_hits.load(Ordering::SeqCst)
    }

    pub fn token_forms(&self) -> Vec<HashMap<String, String>> {
        self.state.token_forms.lock().unwrap().clone()
    }

    pub fn authorizations(&self) -> Vec<String> {
        self.state.authorizations.lock().unwrap().clone()
    }
}

async fn token_handler(
    State(state): State<Arc<MockState>>,
    axum::Form(form): axum::Form<HashMap<String, String>>,
) -> Response<Body> {
    let hit = state.token_hits.fetch_add(1, Ordering::SeqCst) + 1;
    state.token_forms.lock().unwrap().push(form);
    let reply = state
        .token
        .next(&Reply::json(500, r#"{"error":"unscripted"}"#));
    let delay = state.token_delay + reply.delay;
    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }
    reply.render(hit)
}

async fn api_handler(State(state): State<Arc<MockState>>, headers: HeaderMap) -> Response<Body> {
    let hit = state.api_hits.fetch_add(1, Ordering::SeqCst) + 1;
    let authorization = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();
    state.authorizations.lock().unwrap().push(authorization);
    state.api.next(&Reply::json(200, "{}")).render(hit)
}

/// Session pointed at `mock`, with `credentials` pre-written to the token file.
pub async fn session_with(
    mock: &MockSpotify,
    dir: &tempfile::TempDir,
    credentials: Option<CredentialSet>,
) -> Session {
    let path = dir.path().join("tokens.json");
    if let Some(credentials) = credentials {
        tokio::fs::write(&path, serde_json::to_string(&credentials).unwrap())
            .await
            .unwrap();
    }
    let store = CredentialStore::load(path).await;

    let oauth = OAuthSettings::new("client-123", "https://127.0.0.1:8888/callback")
        .with_accounts_url(mock.base_url.clone());
    let mut config = SessionConfig::new(oauth);
    config.api_url = format!("{}/v1", mock.base_url);
    Session::new(config, reqwest::Client::new(), store)
}
