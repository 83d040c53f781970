//! Service Port Abstractions
//!
//! The exchange sits behind [`ExchangeService`] so the ingestion side can
//! be exercised against a scripted stub: tests feed deterministic
//! leaderboards and position maps without touching the network.

use crate::domain::types::{Asset, LeaderboardSource, LeaderboardWallet};
use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashMap;

/// Position detail for one coin inside a clearinghouse response.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AssetPositionDetail {
    pub szi: f64,
    pub entry_px: Option<f64>,
    pub liq_px: Option<f64>,
    pub leverage: Option<f64>,
    pub margin_used: Option<f64>,
}

/// Parsed clearinghouse state of one wallet: its open positions keyed by
/// coin, in response order.
#[derive(Debug, Clone, Default)]
pub struct WalletPositions {
    pub positions: Vec<(String, AssetPositionDetail)>,
}

impl WalletPositions {
    /// Position for a tracked asset: the first entry whose coin matches,
    /// else an explicit zero-szi record.
    pub fn for_asset(&self, asset: Asset) -> AssetPositionDetail {
        self.positions
            .iter()
            .find(|(coin, _)| coin == asset.as_str())
            .map(|(_, detail)| detail.clone())
            .unwrap_or_default()
    }
}

/// Read-only exchange surface consumed by the ingestion side.
#[async_trait]
pub trait ExchangeService: Send + Sync {
    /// Fetch the full leaderboard, trying the stats endpoint first and
    /// the info API as fallback. Fails only when both endpoints fail.
    async fn fetch_leaderboard(&self) -> Result<(Vec<LeaderboardWallet>, LeaderboardSource)>;

    /// Fetch positions for one wallet. All per-request failures
    /// (timeouts, 429s, transport errors) collapse to `None`.
    async fn fetch_wallet_positions(&self, wallet_id: &str) -> Option<WalletPositions>;

    /// Fetch positions for many wallets with at most `max_concurrency`
    /// requests in flight. Never fails; failed wallets map to `None`.
    async fn fetch_multiple(
        &self,
        wallet_ids: &[String],
        max_concurrency: usize,
    ) -> HashMap<String, Option<WalletPositions>>;
}
