use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::position::Holding;

/// A holding priced at the current oracle quote.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HoldingValuation {
    #[serde(flatten)]
    pub holding: Holding,
    pub current_price: Decimal,
    pub value: Decimal,
    pub pnl: Decimal,
    pub pnl_percent: Decimal,
}

/// Derived view of an account's worth. Never authoritative.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortfolioSnapshot {
    pub account_id: Uuid,
    pub cash: Decimal,
    pub total_value: Decimal,
    pub pnl: Decimal,
    pub holdings: Vec<HoldingValuation>,
    pub as_of: DateTime<Utc>,
}
