//! OAuth token cache for the Questrade API

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Access token issued by the login server.
///
/// `expires_at` and `time_refreshed` are added locally when the token is
/// refreshed; everything else comes straight from the token endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Token {
    pub access_token: String,
    pub token_type: String,
    pub expires_in: i64,
    pub refresh_token: String,
    /// Base URL for API calls, with trailing slash
    pub api_server: String,
    /// Unix time (seconds) at which the access token stops working
    #[serde(default)]
    pub expires_at: Option<f64>,
    #[serde(default)]
    pub time_refreshed: Option<String>,
}

impl Token {
    /// Stamp refresh time and absolute expiry relative to `now`
    pub fn stamped(mut self, now: DateTime<Utc>) -> Self {
        self.expires_at = Some(now.timestamp() as f64 + self.expires_in as f64);
        self.time_refreshed = Some(now.to_rfc3339());
        self
    }

    /// A token without a recorded expiry counts as expired
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        match self.expires_at {
            Some(expires_at) => expires_at < now.timestamp() as f64,
            None => true,
        }
    }

    /// `Authorization` header value
    pub fn authorization(&self) -> String {
        format!("{} {}", self.token_type, self.access_token)
    }

    /// Join an API path onto `api_server`
    pub fn endpoint(&self, path: &str) -> String {
        if self.api_server.ends_with('/') {
            format!("{}{}", self.api_server, path)
        } else {
            format!("{}/{}", self.api_server, path)
        }
    }
}

/// Token file on disk
#[derive(Debug, Clone)]
pub struct TokenStore {
    path: PathBuf,
}

impl TokenStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the cached token; `Ok(None)` when no file exists yet
    pub async fn load(&self) -> anyhow::Result<Option<Token>> {
        if !tokio::fs::try_exists(&self.path).await? {
            return Ok(None);
        }
        let content = tokio::fs::read_to_string(&self.path).await?;
        let token = serde_json::from_str(&content).map_err(|e| {
            anyhow::anyhow!("Malformed token file {}: {}", self.path.display(), e)
        })?;
        Ok(Some(token))
    }

    /// Persist the token, creating the parent directory if needed
    pub async fn save(&self, token: &Token) -> anyhow::Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        let content = serde_json::to_string_pretty(token)?;
        tokio::fs::write(&self.path, content).await?;
        tracing::debug!(path = %self.path.display(), "Saved API token");
        Ok(())
    }
}
