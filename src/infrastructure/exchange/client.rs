//! Hyperliquid API client.
//!
//! Leaderboard reads try the stats endpoint first and fall back to the
//! info API. Per-wallet clearinghouse reads swallow every failure into
//! `None`; the ingester turns those into failed-wallet accounting rather
//! than aborted cycles.

use super::parse::{
    self, ClearinghouseStateWire, LeaderboardResponse,
};
use crate::config::Config;
use crate::domain::errors::ExchangeError;
use crate::domain::ports::{ExchangeService, WalletPositions};
use crate::domain::types::{LeaderboardSource, LeaderboardWallet};
use crate::infrastructure::core::http_client_factory::HttpClientFactory;
use anyhow::Result;
use async_trait::async_trait;
use futures_util::{StreamExt, stream};
use reqwest::StatusCode;
use reqwest_middleware::ClientWithMiddleware;
use serde_json::json;
use std::collections::HashMap;
use tracing::{error, warn};

pub struct HyperliquidClient {
    client: ClientWithMiddleware,
    stats_url: String,
    api_url: String,
    timeout_sec: u64,
}

impl HyperliquidClient {
    pub fn new(config: &Config) -> Self {
        Self {
            client: HttpClientFactory::create_client(config.request_timeout()),
            stats_url: config.stats_url.trim_end_matches('/').to_string(),
            api_url: config.api_url.trim_end_matches('/').to_string(),
            timeout_sec: config.request_timeout_sec,
        }
    }

    async fn leaderboard_from_stats(&self) -> Result<Vec<LeaderboardWallet>, ExchangeError> {
        let url = format!("{}/Mainnet/leaderboard", self.stats_url);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;
        let response = check_status(response)?;

        let parsed: LeaderboardResponse =
            response.json().await.map_err(|e| ExchangeError::Malformed {
                reason: e.to_string(),
            })?;

        Ok(parse::parse_leaderboard_rows(&parsed.leaderboard_rows))
    }

    async fn leaderboard_from_info(&self) -> Result<Vec<LeaderboardWallet>, ExchangeError> {
        let response = self
            .client
            .post(format!("{}/info", self.api_url))
            .json(&json!({"type": "leaderboard"}))
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;
        let response = check_status(response)?;

        let value: serde_json::Value =
            response.json().await.map_err(|e| ExchangeError::Malformed {
                reason: e.to_string(),
            })?;

        let raw_rows = parse::extract_fallback_rows(value)?;
        let rows: Vec<_> = raw_rows
            .into_iter()
            .filter_map(|row| serde_json::from_value(row).ok())
            .collect();

        Ok(parse::parse_leaderboard_rows(&rows))
    }

    async fn clearinghouse_state(
        &self,
        wallet_id: &str,
    ) -> Result<WalletPositions, ExchangeError> {
        let response = self
            .client
            .post(format!("{}/info", self.api_url))
            .json(&json!({"type": "clearinghouseState", "user": wallet_id}))
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;
        let response = check_status(response)?;

        let state: ClearinghouseStateWire =
            response.json().await.map_err(|e| ExchangeError::Malformed {
                reason: e.to_string(),
            })?;

        Ok(parse::parse_positions(state))
    }

    fn map_send_error(&self, err: reqwest_middleware::Error) -> ExchangeError {
        match err {
            reqwest_middleware::Error::Reqwest(e) if e.is_timeout() => ExchangeError::Timeout {
                timeout_sec: self.timeout_sec,
            },
            other => ExchangeError::Transport {
                reason: other.to_string(),
            },
        }
    }
}

fn check_status(response: reqwest::Response) -> Result<reqwest::Response, ExchangeError> {
    let status = response.status();
    if status == StatusCode::TOO_MANY_REQUESTS {
        Err(ExchangeError::RateLimited)
    } else if !status.is_success() {
        Err(ExchangeError::Status {
            status: status.as_u16(),
        })
    } else {
        Ok(response)
    }
}

#[async_trait]
impl ExchangeService for HyperliquidClient {
    async fn fetch_leaderboard(&self) -> Result<(Vec<LeaderboardWallet>, LeaderboardSource)> {
        match self.leaderboard_from_stats().await {
            Ok(rows) => return Ok((rows, LeaderboardSource::Stats)),
            Err(e) => {
                warn!("Primary leaderboard endpoint failed: {}", e);
            }
        }

        match self.leaderboard_from_info().await {
            Ok(rows) => Ok((rows, LeaderboardSource::InfoApi)),
            Err(e) => {
                error!("Fallback leaderboard endpoint also failed: {}", e);
                Err(anyhow::anyhow!("both leaderboard endpoints failed: {}", e))
            }
        }
    }

    async fn fetch_wallet_positions(&self, wallet_id: &str) -> Option<WalletPositions> {
        match self.clearinghouse_state(wallet_id).await {
            Ok(positions) => Some(positions),
            Err(ExchangeError::RateLimited) => {
                warn!("Rate limited on wallet {}", wallet_id);
                None
            }
            Err(e) if e.is_transient() => {
                warn!("Failed to fetch wallet {}: {}", wallet_id, e);
                None
            }
            Err(e) => {
                error!("Malformed clearinghouse state for {}: {}", wallet_id, e);
                None
            }
        }
    }

    async fn fetch_multiple(
        &self,
        wallet_ids: &[String],
        max_concurrency: usize,
    ) -> HashMap<String, Option<WalletPositions>> {
        stream::iter(wallet_ids.iter().cloned())
            .map(|wallet_id| async move {
                let result = self.fetch_wallet_positions(&wallet_id).await;
                (wallet_id, result)
            })
            .buffer_unordered(max_concurrency.max(1))
            .collect()
            .await
    }
}
