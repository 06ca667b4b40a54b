//! Identity of the OAuth client
//!
//! One client ID, one redirect target, one accounts service. The endpoints are
//! derived from `accounts_url` so tests can point the whole flow at a local
//! mock server.

use crate::constants::{AUTHORIZE_PATH, DEFAULT_ACCOUNTS_URL, TOKEN_PATH};

#[derive(Debug, Clone)]
pub struct OAuthSettings {
    pub client_id: String,
    pub redirect_uri: String,
    pub accounts_url: String,
}

impl OAuthSettings {
    pub fn new(client_id: impl Into<String>, redirect_uri: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            redirect_uri: redirect_uri.into(),
            accounts_url: DEFAULT_ACCOUNTS_URL.to_string(),
        }
    }

    pub fn with_accounts_url(mut self, accounts_url: impl Into<String>) -> Self {
        self.accounts_url = accounts_url.into();
        self
    }

    pub fn authorize_endpoint(&self) -> String {
        format!("{}{AUTHORIZE_PATH}", self.accounts_url.trim_end_matches('/'))
    }

    pub fn token_endpoint(&self) -> String {
        format!("{}{TOKEN_PATH}", self.accounts_url.trim_end_matches('/'))
    }
}
