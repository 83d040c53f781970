mod client;
mod parse;

pub use client::HyperliquidClient;
pub use parse::{ClearinghouseStateWire, LeaderboardRowWire};
