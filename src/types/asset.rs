use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AssetType {
    Spot,
    Futures,
}

impl AssetType {
    pub fn as_str(self) -> &'static str {
        match self {
            AssetType::Spot => "SPOT",
            AssetType::Futures => "FUTURES",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "SPOT" => Some(AssetType::Spot),
            "FUTURES" => Some(AssetType::Futures),
            _ => None,
        }
    }
}

/// Tradeable instrument. Reference data, seeded once and never mutated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Asset {
    pub id: Uuid,
    pub symbol: String,
    pub name: String,
    pub asset_type: AssetType,
    pub created_at: DateTime<Utc>,
}

/// Seed list: (symbol, name, type).
pub const DEFAULT_ASSETS: &[(&str, &str, AssetType)] = &[
    ("USDC", "USD Coin", AssetType::Spot),
    ("USDT", "Tether USD", AssetType::Spot),
    ("BTC", "Bitcoin", AssetType::Spot),
    ("ETH", "Ethereum", AssetType::Spot),
    ("SOL", "Solana", AssetType::Spot),
    ("BTC-PERP", "Bitcoin Perpetual Futures", AssetType::Futures),
    ("ETH-PERP", "Ethereum Perpetual Futures", AssetType::Futures),
    ("SOL-PERP", "Solana Perpetual Futures", AssetType::Futures),
];
