use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::asset::Asset;

/// Holding per (account, asset). Quantity is always > 0 while the row exists;
/// a fully sold position is deleted rather than zeroed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    pub id: Uuid,
    pub account_id: Uuid,
    pub asset_id: Uuid,
    pub quantity: Decimal,
    pub avg_price: Decimal,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Position joined with its asset, as returned by holdings queries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Holding {
    #[serde(flatten)]
    pub position: Position,
    pub asset: Asset,
}
