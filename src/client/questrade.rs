//! Questrade REST client
//!
//! Authenticates with a refresh token, caches the resulting access token on
//! disk, and transparently refreshes it once when the API answers 401.

use super::token::{Token, TokenStore};
use super::{MarketDataClient, SymbolInfo, SymbolMatch};
use crate::candle::{format_api_timestamp, Interval, RemoteCandle};
use crate::config::ApiConfig;
use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, Utc};
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;
use tokio::sync::Mutex;

/// Client for the Questrade market data API
pub struct QuestradeClient {
    login_url: String,
    bootstrap_refresh_token: Option<String>,
    client: Client,
    tokens: TokenStore,
    cached: Mutex<Option<Token>>,
}

impl QuestradeClient {
    /// Create a client from API configuration
    pub fn with_config(config: &ApiConfig) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to create HTTP client: {}", e))?;

        Ok(Self {
            login_url: config.login_url.trim_end_matches('/').to_string(),
            bootstrap_refresh_token: config.refresh_token.clone(),
            client,
            tokens: TokenStore::new(&config.token_path),
            cached: Mutex::new(None),
        })
    }

    /// Current access token, refreshing it if missing or expired
    async fn token(&self) -> anyhow::Result<Token> {
        let mut cached = self.cached.lock().await;
        let now = Utc::now();

        if let Some(token) = cached.as_ref().filter(|t| !t.is_expired(now)) {
            return Ok(token.clone());
        }

        let token = match self.tokens.load().await? {
            Some(token) if !token.is_expired(now) => token,
            Some(stale) => self.refresh(&stale.refresh_token).await?,
            None => {
                let refresh_token = self.bootstrap_refresh_token.as_deref().ok_or_else(|| {
                    anyhow::anyhow!(
                        "No token file at {} and no refresh token configured",
                        self.tokens.path().display()
                    )
                })?;
                self.refresh(refresh_token).await?
            }
        };

        *cached = Some(token.clone());
        Ok(token)
    }

    /// Drop the cached token and exchange its refresh token for a new one
    async fn force_refresh(&self, stale: &Token) -> anyhow::Result<Token> {
        let mut cached = self.cached.lock().await;
        let token = self.refresh(&stale.refresh_token).await?;
        *cached = Some(token.clone());
        Ok(token)
    }

    /// Exchange a refresh token at the login server and persist the result
    async fn refresh(&self, refresh_token: &str) -> anyhow::Result<Token> {
        let url = format!("{}/oauth2/token", self.login_url);
        tracing::info!(url = %url, "Refreshing API token");

        let response = self
            .client
            .get(&url)
            .query(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token),
            ])
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Token refresh failed: {} - {}", status, body);
        }

        let token: Token = response.json().await?;
        let token = token.stamped(Utc::now());
        self.tokens.save(&token).await?;
        Ok(token)
    }

    /// Authorized GET returning parsed JSON; retries once after a 401
    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> anyhow::Result<T> {
        let token = self.token().await?;
        let mut response = self.send(&token, path, query).await?;

        if response.status() == StatusCode::UNAUTHORIZED {
            tracing::warn!(path = %path, "API rejected token, refreshing once");
            let token = self.force_refresh(&token).await?;
            response = self.send(&token, path, query).await?;
        }

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Questrade API error on {}: {} - {}", path, status, body);
        }

        Ok(response.json().await?)
    }

    async fn send(
        &self,
        token: &Token,
        path: &str,
        query: &[(&str, String)],
    ) -> anyhow::Result<reqwest::Response> {
        let url = token.endpoint(path);
        tracing::debug!(url = %url, "API request");
        let response = self
            .client
            .get(&url)
            .header(reqwest::header::AUTHORIZATION, token.authorization())
            .query(query)
            .send()
            .await?;
        Ok(response)
    }
}

#[async_trait]
impl MarketDataClient for QuestradeClient {
    async fn get_candles(
        &self,
        symbol_id: i64,
        start: DateTime<FixedOffset>,
        end: DateTime<FixedOffset>,
        interval: Interval,
    ) -> anyhow::Result<Vec<RemoteCandle>> {
        let path = format!("v1/markets/candles/{}", symbol_id);
        let response: CandlesResponse = self
            .get_json(&path, &candles_query(start, end, interval))
            .await?;
        Ok(response.candles)
    }

    async fn search_symbol(&self, ticker: &str) -> anyhow::Result<SymbolMatch> {
        let query = [("prefix", ticker.to_string()), ("offset", "0".to_string())];
        let response: SymbolsResponse<SymbolMatch> =
            self.get_json("v1/symbols/search", &query).await?;
        response
            .first()
            .ok_or_else(|| anyhow::anyhow!("No symbol matches {:?}", ticker))
    }

    async fn get_symbol_details(&self, symbol_id: i64) -> anyhow::Result<SymbolInfo> {
        let path = format!("v1/symbols/{}", symbol_id);
        let response: SymbolsResponse<SymbolInfo> = self.get_json(&path, &[]).await?;
        response
            .first()
            .ok_or_else(|| anyhow::anyhow!("No details for symbol id {}", symbol_id))
    }
}

/// Query parameters for the candles endpoint
fn candles_query(
    start: DateTime<FixedOffset>,
    end: DateTime<FixedOffset>,
    interval: Interval,
) -> Vec<(&'static str, String)> {
    vec![
        ("startTime", format_api_timestamp(&start)),
        ("endTime", format_api_timestamp(&end)),
        ("interval", interval.as_str().to_string()),
    ]
}

#[derive(Debug, Deserialize)]
struct CandlesResponse {
    #[serde(default)]
    candles: Vec<RemoteCandle>,
}

/// Both symbol endpoints wrap their results in `{"symbols": [...]}`
#[derive(Debug, Deserialize)]
struct SymbolsResponse<T> {
    #[serde(default = "Vec::new")]
    symbols: Vec<T>,
}

impl<T> SymbolsResponse<T> {
    fn first(self) -> Option<T> {
        self.symbols.into_iter().next()
    }
}
