//! Configuration types and loading
//!
//! Precedence: env vars > config file > defaults. The file is optional when
//! the environment supplies the client ID and redirect URI. Missing identity
//! or a malformed redirect target is fatal at startup: the bridge cannot
//! complete a login without them.

use serde::Deserialize;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use spotify_auth::{DEFAULT_ACCOUNTS_URL, DEFAULT_API_URL, DEFAULT_REFRESH_MARGIN_SECS};

/// Root configuration
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub spotify: SpotifyConfig,
    pub server: ServerConfig,
    pub tokens: TokenConfig,
}

/// Spotify client identity and upstream endpoints
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct SpotifyConfig {
    pub client_id: String,
    /// Must be https and end with `/callback`
    pub redirect_uri: String,
    pub accounts_url: String,
    pub api_url: String,
}

impl Default for SpotifyConfig {
    fn default() -> Self {
        Self {
            client_id: String::new(),
            redirect_uri: String::new(),
            accounts_url: DEFAULT_ACCOUNTS_URL.to_string(),
            api_url: DEFAULT_API_URL.to_string(),
        }
    }
}

/// HTTP listener settings
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub listen_addr: SocketAddr,
    pub max_connections: usize,
    /// PEM certificate chain; serves HTTPS when set together with `tls_key`
    pub tls_cert: Option<PathBuf>,
    pub tls_key: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([127, 0, 0, 1], 8888)),
            max_connections: 1000,
            tls_cert: None,
            tls_key: None,
        }
    }
}

/// Token persistence and refresh timing
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct TokenConfig {
    pub credentials_path: PathBuf,
    pub refresh_margin_secs: u64,
    pub refresh_interval_secs: u64,
}

impl Default for TokenConfig {
    fn default() -> Self {
        Self {
            credentials_path: PathBuf::from("tokens.json"),
            refresh_margin_secs: DEFAULT_REFRESH_MARGIN_SECS,
            refresh_interval_secs: 300,
        }
    }
}

impl Config {
    /// Load the TOML file (if any), overlay the process environment, validate.
    ///
    /// `required` is true when the path came from the CLI or `CONFIG_PATH`,
    /// in which case a missing file is an error.
    pub fn load(path: &Path, required: bool) -> common::Result<Self> {
        let mut config = if path.exists() || required {
            let contents = std::fs::read_to_string(path)?;
            toml::from_str(&contents)?
        } else {
            Config::default()
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Overlay `SPOTIFY_CLIENT_ID`, `REDIRECT_URI`, `PORT` and
    /// `CREDENTIALS_PATH` from `lookup`.
    pub fn apply_env<F>(&mut self, lookup: F) -> common::Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(client_id) = lookup("SPOTIFY_CLIENT_ID") {
            self.spotify.client_id = client_id;
        }
        if let Some(redirect_uri) = lookup("REDIRECT_URI") {
            self.spotify.redirect_uri = redirect_uri;
        }
        if let Some(port) = lookup("PORT") {
            let port: u16 = port.trim().parse().map_err(|e| {
                common::Error::Config(format!("PORT must be a port number, got {port:?}: {e}"))
            })?;
            self.server.listen_addr.set_port(port);
        }
        if let Some(path) = lookup("CREDENTIALS_PATH") {
            self.tokens.credentials_path = PathBuf::from(path.trim());
        }

        self.spotify.client_id = self.spotify.client_id.trim().to_string();
        self.spotify.redirect_uri = self.spotify.redirect_uri.trim().to_string();
        Ok(())
    }

    pub fn validate(&self) -> common::Result<()> {
        if self.spotify.client_id.is_empty() {
            return Err(common::Error::Missing("SPOTIFY_CLIENT_ID"));
        }
        if self.spotify.redirect_uri.is_empty() {
            return Err(common::Error::Missing("REDIRECT_URI"));
        }
        let redirect = &self.spotify.redirect_uri;
        let host_and_path = redirect
            .strip_prefix("https://")
            .and_then(|rest| rest.strip_suffix("/callback"));
        if host_and_path.is_none_or(str::is_empty) {
            return Err(common::Error::Config(format!(
                "REDIRECT_URI must be https and end with /callback (e.g. https://127.0.0.1:8888/callback), got: {redirect}"
            )));
        }

        for (name, url) in [
            ("accounts_url", &self.spotify.accounts_url),
            ("api_url", &self.spotify.api_url),
        ] {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err(common::Error::Config(format!(
                    "{name} must start with http:// or https://, got: {url}"
                )));
            }
        }

        if self.server.max_connections == 0 {
            return Err(common::Error::Config(
                "max_connections must be greater than 0".into(),
            ));
        }
        if self.tokens.refresh_margin_secs == 0 {
            return Err(common::Error::Config(
                "refresh_margin_secs must be greater than 0".into(),
            ));
        }
        if self.tokens.refresh_interval_secs == 0 {
            return Err(common::Error::Config(
                "refresh_interval_secs must be greater than 0".into(),
            ));
        }
        if self.server.tls_cert.is_some() != self.server.tls_key.is_some() {
            return Err(common::Error::Config(
                "tls_cert and tls_key must be set together".into(),
            ));
        }
        Ok(())
    }

    /// Resolve the config file path from the CLI arg or `CONFIG_PATH`.
    ///
    /// Returns the path and whether it was explicitly requested.
    pub fn resolve_path(cli_path: Option<&str>) -> (PathBuf, bool) {
        if let Some(p) = cli_path {
            return (PathBuf::from(p), true);
        }
        if let Ok(p) = std::env::var("CONFIG_PATH") {
            return (PathBuf::from(p), true);
        }
        (PathBuf::from("spotify-bridge.toml"), false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn parse(toml_str: &str) -> Config {
        toml::from_str(toml_str).unwrap()
    }

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    fn valid_toml() -> &'static str {
        r#"
[spotify]
client_id = "abc123"
redirect_uri = "https://127.0.0.1:8888/callback"

[server]
listen_addr = "0.0.0.0:9443"
tls_cert = "certs/127.0.0.1.pem"
tls_key = "certs/127.0.0.1-key.pem"

[tokens]
credentials_path = "/var/lib/bridge/tokens.json"
refresh_margin_secs = 90
"#
    }

    #[test]
    fn parses_full_file() {
        let config = parse(valid_toml());
        config.validate().unwrap();
        assert_eq!(config.spotify.client_id, "abc123");
        assert_eq!(config.spotify.accounts_url, "https://accounts.spotify.com");
        assert_eq!(config.server.listen_addr.port(), 9443);
        assert_eq!(config.server.max_connections, 1000);
        assert_eq!(config.tokens.refresh_margin_secs, 90);
        assert_eq!(config.tokens.refresh_interval_secs, 300);
        assert!(config.server.tls_cert.is_some());
    }

    #[test]
    fn defaults_without_file() {
        let config = Config::default();
        assert_eq!(config.server.listen_addr.to_string(), "127.0.0.1:8888");
        assert_eq!(config.tokens.credentials_path, PathBuf::from("tokens.json"));
        assert_eq!(config.tokens.refresh_margin_secs, 60);
    }

    #[test]
    fn env_overrides_file_and_is_trimmed() {
        let mut config = parse(valid_toml());
        config
            .apply_env(env(&[
                ("SPOTIFY_CLIENT_ID", "  from-env \n"),
                ("REDIRECT_URI", "https://bridge.local/callback "),
                ("PORT", "8443"),
                ("CREDENTIALS_PATH", "/tmp/tokens.json"),
            ]))
            .unwrap();
        config.validate().unwrap();

        assert_eq!(config.spotify.client_id, "from-env");
        assert_eq!(config.spotify.redirect_uri, "https://bridge.local/callback");
        assert_eq!(config.server.listen_addr.to_string(), "0.0.0.0:8443");
        assert_eq!(
            config.tokens.credentials_path,
            PathBuf::from("/tmp/tokens.json")
        );
    }

    #[test]
    fn invalid_port_is_rejected() {
        let mut config = Config::default();
        let result = config.apply_env(env(&[("PORT", "eighty")]));
        assert!(matches!(result, Err(common::Error::Config(_))));
    }

    #[test]
    fn missing_client_id_is_fatal() {
        let mut config = Config::default();
        config
            .apply_env(env(&[("REDIRECT_URI", "https://127.0.0.1:8888/callback")]))
            .unwrap();
        assert!(matches!(
            config.validate(),
            Err(common::Error::Missing("SPOTIFY_CLIENT_ID"))
        ));
    }

    #[test]
    fn redirect_must_be_https_callback() {
        for bad in [
            "http://127.0.0.1:8888/callback",
            "https://127.0.0.1:8888/cb",
            "https:///callback",
        ] {
            let mut config = Config::default();
            config
                .apply_env(env(&[("SPOTIFY_CLIENT_ID", "id"), ("REDIRECT_URI", bad)]))
                .unwrap();
            assert!(config.validate().is_err(), "{bad} must be rejected");
        }
    }

    #[test]
    fn tls_requires_both_files() {
        let mut config = parse(valid_toml());
        config.server.tls_key = None;
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_margin_is_rejected() {
        let mut config = parse(valid_toml());
        config.tokens.refresh_margin_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn load_missing_required_file_fails() {
        let result = Config::load(Path::new("/nonexistent/spotify-bridge.toml"), true);
        assert!(matches!(result, Err(common::Error::Io(_))));
    }

    #[test]
    fn load_invalid_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "not valid {{{{ toml").unwrap();

        assert!(matches!(
            Config::load(&path, true),
            Err(common::Error::Toml(_))
        ));
    }
}
