//! Application bearer-token provider for the marketplace API.
//!
//! One provider is constructed per process and handed to the client, so the
//! credential cache is explicit state rather than a module-level global. A
//! redundant refresh under concurrent expiry is harmless — the grant is
//! idempotent — so the cache is only guarded by the expiry check itself.

use std::time::{Duration, Instant};

use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::config::{Config, TOKEN_EXPIRY_MARGIN_SECS};
use crate::error::{AppError, Result};

#[derive(Debug, Clone)]
struct CachedToken {
    token: String,
    expires_at: Instant,
}

impl CachedToken {
    fn is_valid(&self) -> bool {
        Instant::now() < self.expires_at
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    /// Lifetime in seconds.
    expires_in: u64,
}

pub struct TokenProvider {
    http: reqwest::Client,
    auth_url: String,
    client_id: String,
    client_secret: String,
    cached: Mutex<Option<CachedToken>>,
}

impl TokenProvider {
    pub fn new(cfg: &Config) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self {
            http,
            auth_url: cfg.auth_url.clone(),
            client_id: cfg.client_id.clone(),
            client_secret: cfg.client_secret.clone(),
            cached: Mutex::new(None),
        })
    }

    /// Test double: a provider that always returns `token` and never hits
    /// the network.
    pub fn with_static_token(token: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            auth_url: String::new(),
            client_id: String::new(),
            client_secret: String::new(),
            cached: Mutex::new(Some(CachedToken {
                token: token.to_string(),
                expires_at: Instant::now() + Duration::from_secs(86_400),
            })),
        }
    }

    /// Return the cached token, regenerating it only when expired.
    pub async fn get_valid_token(&self) -> Result<String> {
        let mut cached = self.cached.lock().await;
        if let Some(token) = cached.as_ref() {
            if token.is_valid() {
                debug!("Using cached application token");
                return Ok(token.token.clone());
            }
        }

        let fresh = self.fetch_token().await?;
        let token = fresh.token.clone();
        *cached = Some(fresh);
        Ok(token)
    }

    async fn fetch_token(&self) -> Result<CachedToken> {
        info!("Generating new application token");

        let resp = self
            .http
            .post(&self.auth_url)
            .basic_auth(&self.client_id, Some(&self.client_secret))
            .header("Content-Type", "application/x-www-form-urlencoded")
            .body("grant_type=client_credentials&scope=https://api.ebay.com/oauth/api_scope")
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(AppError::Auth(format!(
                "token grant failed: {} {body}",
                status.as_u16()
            )));
        }

        let token: TokenResponse = resp.json().await?;

        // Regenerate ahead of the server-side expiry so an in-flight search
        // never races the cutoff.
        let lifetime = token
            .expires_in
            .saturating_sub(TOKEN_EXPIRY_MARGIN_SECS)
            .max(60);

        Ok(CachedToken {
            token: token.access_token,
            expires_at: Instant::now() + Duration::from_secs(lifetime),
        })
    }
}
