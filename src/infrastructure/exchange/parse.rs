//! Wire models for the Hyperliquid endpoints and their conversion into
//! domain values.
//!
//! Numeric fields arrive as JSON strings or numbers depending on the
//! endpoint; everything is normalized to `f64` here and nowhere else.

use crate::domain::errors::ExchangeError;
use crate::domain::ports::{AssetPositionDetail, WalletPositions};
use crate::domain::types::LeaderboardWallet;
use serde::Deserialize;
use serde_json::Value;
use tracing::{info, warn};

/// A numeric that may be encoded as a string.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum F64OrString {
    Num(f64),
    Text(String),
}

impl F64OrString {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            F64OrString::Num(n) => Some(*n),
            F64OrString::Text(s) => s.parse().ok(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaderboardResponse {
    pub leaderboard_rows: Vec<LeaderboardRowWire>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaderboardRowWire {
    #[serde(default)]
    pub eth_address: Option<String>,
    #[serde(default)]
    pub account_value: Option<F64OrString>,
    /// Pairs of (window name, performance), e.g. `["month", {...}]`.
    #[serde(default)]
    pub window_performances: Vec<(String, WindowPerformanceWire)>,
}

#[derive(Debug, Deserialize)]
pub struct WindowPerformanceWire {
    #[serde(default)]
    pub pnl: Option<F64OrString>,
    #[serde(default)]
    pub roi: Option<F64OrString>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClearinghouseStateWire {
    #[serde(default)]
    pub asset_positions: Vec<AssetPositionWire>,
}

#[derive(Debug, Deserialize)]
pub struct AssetPositionWire {
    pub position: PositionWire,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PositionWire {
    pub coin: String,
    #[serde(default)]
    pub szi: Option<F64OrString>,
    #[serde(default)]
    pub entry_px: Option<F64OrString>,
    #[serde(default)]
    pub liquidation_px: Option<F64OrString>,
    #[serde(default)]
    pub leverage: Option<LeverageWire>,
    #[serde(default)]
    pub margin_used: Option<F64OrString>,
}

/// Leverage shows up either structured (`{"type": "cross", "value": 20}`)
/// or as a bare scalar.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum LeverageWire {
    Structured { value: F64OrString },
    Scalar(F64OrString),
}

impl LeverageWire {
    fn as_f64(&self) -> Option<f64> {
        match self {
            LeverageWire::Structured { value } => value.as_f64(),
            LeverageWire::Scalar(value) => value.as_f64(),
        }
    }
}

/// Parse one leaderboard row. Rows without an address are dropped; a
/// missing month window defaults to zero PnL/ROI; account value stays
/// absent when the exchange omits it.
pub fn parse_leaderboard_row(row: &LeaderboardRowWire) -> Option<LeaderboardWallet> {
    let wallet_id = row.eth_address.clone()?;
    if wallet_id.is_empty() {
        return None;
    }

    let month = row
        .window_performances
        .iter()
        .find(|(window, _)| window == "month")
        .map(|(_, perf)| perf);

    let month_pnl = month
        .and_then(|p| p.pnl.as_ref())
        .and_then(F64OrString::as_f64)
        .unwrap_or(0.0);
    let month_roi = month
        .and_then(|p| p.roi.as_ref())
        .and_then(F64OrString::as_f64)
        .unwrap_or(0.0);

    Some(LeaderboardWallet {
        wallet_id,
        account_value: row.account_value.as_ref().and_then(F64OrString::as_f64),
        month_pnl,
        month_roi,
    })
}

/// Parse and filter a full set of leaderboard rows.
pub fn parse_leaderboard_rows(rows: &[LeaderboardRowWire]) -> Vec<LeaderboardWallet> {
    let parsed: Vec<_> = rows.iter().filter_map(parse_leaderboard_row).collect();
    let dropped = rows.len() - parsed.len();
    if dropped > 0 {
        warn!("Dropped {} leaderboard rows without an address", dropped);
    }
    parsed
}

/// Locate the row array inside the fallback leaderboard response, whose
/// shape varies. Accepts a bare array or an object wrapping one under
/// `leaderboard` / `leaderboardRows`; anything else is malformed.
pub fn extract_fallback_rows(value: Value) -> Result<Vec<Value>, ExchangeError> {
    match value {
        Value::Array(rows) => {
            info!("Fallback leaderboard returned a bare array ({} rows)", rows.len());
            Ok(rows)
        }
        Value::Object(mut map) => {
            let keys: Vec<&str> = map.keys().map(String::as_str).collect();
            info!("Fallback leaderboard returned an object with keys {:?}", keys);
            for key in ["leaderboard", "leaderboardRows"] {
                if let Some(Value::Array(rows)) = map.remove(key) {
                    return Ok(rows);
                }
            }
            Err(ExchangeError::Malformed {
                reason: "fallback leaderboard object carries no row array".to_string(),
            })
        }
        other => Err(ExchangeError::Malformed {
            reason: format!("fallback leaderboard is a JSON {}", json_kind(&other)),
        }),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Convert a clearinghouse response into domain positions, in response
/// order. Individual positions that fail to parse are dropped with a
/// warning rather than failing the wallet.
pub fn parse_positions(state: ClearinghouseStateWire) -> WalletPositions {
    let positions = state
        .asset_positions
        .into_iter()
        .filter_map(|entry| {
            let p = entry.position;
            let Some(szi) = p.szi.as_ref().and_then(F64OrString::as_f64) else {
                warn!("Unparsable szi for coin {}, dropping position", p.coin);
                return None;
            };
            Some((
                p.coin,
                AssetPositionDetail {
                    szi,
                    entry_px: p.entry_px.as_ref().and_then(F64OrString::as_f64),
                    liq_px: p.liquidation_px.as_ref().and_then(F64OrString::as_f64),
                    leverage: p.leverage.as_ref().and_then(LeverageWire::as_f64),
                    margin_used: p.margin_used.as_ref().and_then(F64OrString::as_f64),
                },
            ))
        })
        .collect();

    WalletPositions { positions }
}
