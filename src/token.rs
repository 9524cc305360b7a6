//! Client-credentials bearer tokens for the Nexar API.
//!
//! [`TokenManager`] owns the single live [`AccessToken`]. Every call to
//! [`TokenManager::bearer`] checks the expiry under a mutex and refreshes
//! synchronously when the token is within [`REFRESH_MARGIN_SECS`] of expiring,
//! so concurrent callers never trigger more than one refresh.

use std::sync::Mutex;
use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Utc};
use reqwest::blocking::Client;
use reqwest::redirect::Policy;
use serde::Deserialize;

use crate::error::SourcingError;

pub const REFRESH_MARGIN_SECS: i64 = 300;
pub const DEFAULT_TOKEN_URL: &str = "https://identity.nexar.com/connect/token";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessToken {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

impl AccessToken {
    /// Builds a token from a signed JWT, reading the `exp` claim of its payload.
    pub fn from_jwt(raw: &str) -> Result<Self, SourcingError> {
        let payload = raw
            .split('.')
            .nth(1)
            .ok_or_else(|| SourcingError::Auth("access token is not a JWT".to_string()))?;
        let bytes = URL_SAFE_NO_PAD
            .decode(payload.trim_end_matches('='))
            .map_err(|err| SourcingError::Auth(format!("token payload decode: {err}")))?;
        let claims: Claims = serde_json::from_slice(&bytes)
            .map_err(|err| SourcingError::Auth(format!("token payload parse: {err}")))?;
        let exp = claims
            .exp
            .ok_or_else(|| SourcingError::Auth("access token has no exp claim".to_string()))?;
        let expires_at = DateTime::<Utc>::from_timestamp(exp, 0)
            .ok_or_else(|| SourcingError::Auth(format!("invalid exp claim: {exp}")))?;
        Ok(Self {
            token: raw.to_string(),
            expires_at,
        })
    }

    /// True once `now` is within the refresh margin of expiry. An expiry too
    /// close to the minimum representable time always needs a refresh.
    pub fn needs_refresh(&self, now: DateTime<Utc>) -> bool {
        self.expires_at
            .checked_sub_signed(chrono::Duration::seconds(REFRESH_MARGIN_SECS))
            .map(|deadline| now >= deadline)
            .unwrap_or(true)
    }
}

#[derive(Debug, Deserialize)]
struct Claims {
    #[serde(default)]
    exp: Option<i64>,
}

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Issues fresh raw access tokens.
pub trait TokenSource: Send + Sync {
    fn fetch(&self) -> Result<String, SourcingError>;
}

#[derive(Clone)]
pub struct HttpTokenSource {
    client: Client,
    token_url: String,
    client_id: String,
    client_secret: String,
}

impl HttpTokenSource {
    pub fn new(
        token_url: &str,
        client_id: &str,
        client_secret: &str,
    ) -> Result<Self, SourcingError> {
        if client_id.trim().is_empty() || client_secret.trim().is_empty() {
            return Err(SourcingError::Auth(
                "client_id and/or client_secret are empty".to_string(),
            ));
        }
        let client = Client::builder()
            .redirect(Policy::none())
            .timeout(Duration::from_secs(30))
            .user_agent(format!("part-sourcing/{}", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|err| SourcingError::Auth(err.to_string()))?;
        Ok(Self {
            client,
            token_url: token_url.to_string(),
            client_id: client_id.to_string(),
            client_secret: client_secret.to_string(),
        })
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    #[serde(default)]
    access_token: Option<String>,
}

impl TokenSource for HttpTokenSource {
    fn fetch(&self) -> Result<String, SourcingError> {
        let form = [
            ("grant_type", "client_credentials"),
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
        ];
        let response = self
            .client
            .post(&self.token_url)
            .form(&form)
            .send()
            .map_err(|err| SourcingError::Auth(err.to_string()))?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response
                .text()
                .unwrap_or_else(|_| "identity request failed".to_string());
            return Err(SourcingError::Auth(format!("status {status}: {message}")));
        }
        let body: TokenResponse = response
            .json()
            .map_err(|err| SourcingError::Auth(err.to_string()))?;
        body.access_token
            .filter(|token| !token.is_empty())
            .ok_or_else(|| SourcingError::Auth("identity response has no access_token".to_string()))
    }
}

pub struct TokenManager {
    source: Box<dyn TokenSource>,
    clock: Box<dyn Clock>,
    current: Mutex<Option<AccessToken>>,
}

impl TokenManager {
    pub fn new(source: Box<dyn TokenSource>, clock: Box<dyn Clock>) -> Self {
        Self {
            source,
            clock,
            current: Mutex::new(None),
        }
    }

    /// Returns a token valid for at least the refresh margin, acquiring or
    /// refreshing it first when needed.
    pub fn bearer(&self) -> Result<String, SourcingError> {
        let mut current = self
            .current
            .lock()
            .map_err(|_| SourcingError::Auth("token state poisoned".to_string()))?;
        let now = self.clock.now();
        let stale = current
            .as_ref()
            .map(|token| token.needs_refresh(now))
            .unwrap_or(true);
        if stale {
            *current = Some(self.refresh()?);
        }
        current
            .as_ref()
            .map(|token| token.token.clone())
            .ok_or_else(|| SourcingError::Auth("no access token".to_string()))
    }

    pub fn refresh(&self) -> Result<AccessToken, SourcingError> {
        let raw = self.source.fetch()?;
        let token = AccessToken::from_jwt(&raw)?;
        tracing::debug!(expires_at = %token.expires_at, "access token refreshed");
        Ok(token)
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.current
            .lock()
            .ok()
            .and_then(|current| current.as_ref().map(|token| token.expires_at))
    }
}
