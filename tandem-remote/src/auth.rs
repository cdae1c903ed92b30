//! Bearer tokens for the board API.

use std::sync::Mutex;
use std::time::{Duration, Instant};

use serde::Deserialize;

use tandem_core::{BoardConfig, RetryPolicy};
use tandem_sync::PortError;

use crate::http;
use crate::retry;

const GRAPH_SCOPE: &str = "https://graph.microsoft.com/.default";

/// Tokens are refreshed this long before they expire.
const EXPIRY_MARGIN: Duration = Duration::from_secs(60);

/// Source of bearer tokens.
pub trait TokenProvider: Send + Sync {
    fn bearer(&self) -> Result<String, PortError>;
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: u64,
}

#[derive(Debug, Clone)]
struct CachedToken {
    value: String,
    refresh_at: Instant,
}

impl CachedToken {
    fn new(value: String, expires_in: Duration, issued_at: Instant) -> Self {
        Self {
            value,
            refresh_at: issued_at + expires_in.saturating_sub(EXPIRY_MARGIN),
        }
    }

    fn is_fresh(&self, now: Instant) -> bool {
        now < self.refresh_at
    }
}

/// OAuth2 client-credential flow against the identity authority.
pub struct ClientCredentialTokenProvider {
    agent: ureq::Agent,
    token_url: String,
    client_id: String,
    client_secret: String,
    retry: RetryPolicy,
    cached: Mutex<Option<CachedToken>>,
}

impl ClientCredentialTokenProvider {
    pub fn new(config: &BoardConfig, agent: ureq::Agent, retry: RetryPolicy) -> Self {
        Self {
            agent,
            token_url: format!(
                "{}/{}/oauth2/v2.0/token",
                config.authority.trim_end_matches('/'),
                config.tenant_id
            ),
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
            retry,
            cached: Mutex::new(None),
        }
    }

    fn request(&self) -> Result<TokenResponse, PortError> {
        let response = self
            .agent
            .post(&self.token_url)
            .send_form(&[
                ("grant_type", "client_credentials"),
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
                ("scope", GRAPH_SCOPE),
            ])
            .map_err(|err| match err {
                ureq::Error::Status(status, _) => PortError::Auth {
                    reason: format!("token request rejected with status {status}"),
                },
                ureq::Error::Transport(transport) => {
                    PortError::transport("acquire token", transport)
                }
            })?;
        http::read_json("acquire token", response)
    }
}

impl TokenProvider for ClientCredentialTokenProvider {
    fn bearer(&self) -> Result<String, PortError> {
        let mut cached = self.cached.lock().map_err(|_| PortError::Auth {
            reason: "token cache poisoned".to_string(),
        })?;
        if let Some(token) = cached.as_ref().filter(|t| t.is_fresh(Instant::now())) {
            return Ok(token.value.clone());
        }

        let issued_at = Instant::now();
        let response = retry::call(&self.retry, "acquire token", || self.request())?;
        tracing::debug!(expires_in = response.expires_in, "acquired board access token");
        let token = CachedToken::new(
            response.access_token,
            Duration::from_secs(response.expires_in),
            issued_at,
        );
        let value = token.value.clone();
        *cached = Some(token);
        Ok(value)
    }
}
