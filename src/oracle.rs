//! Price oracle capability and the mock implementation the service runs with.

use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::BTreeMap;
use std::sync::Mutex;
use thiserror::Error;

use crate::positions::round_money;

#[derive(Debug, Error)]
pub enum OracleError {
    #[error("no price available for {0}")]
    Unavailable(String),
}

/// Source of current reference prices. Quotes may differ between calls.
#[async_trait]
pub trait PriceOracle: Send + Sync {
    async fn price(&self, symbol: &str) -> Result<Decimal, OracleError>;
}

/// Price for symbols the mock has no base price for.
pub const FALLBACK_PRICE: Decimal = dec!(1.00);

/// Maximum deviation from the base price, in basis points.
const VARIATION_BPS: i64 = 200;

const BASE_PRICES: &[(&str, Decimal)] = &[
    ("BTC", dec!(45000.00)),
    ("ETH", dec!(2500.00)),
    ("SOL", dec!(100.00)),
    ("USDC", dec!(1.00)),
    ("USDT", dec!(1.00)),
    ("BTC-PERP", dec!(45000.00)),
    ("ETH-PERP", dec!(2500.00)),
    ("SOL-PERP", dec!(100.00)),
];

fn is_stablecoin(symbol: &str) -> bool {
    matches!(symbol, "USDC" | "USDT")
}

/// Mock quotes: base price moved uniformly within ±2% on every call.
/// Stablecoins are pinned. The RNG belongs to the instance.
pub struct MockPriceOracle {
    base: BTreeMap<String, Decimal>,
    rng: Mutex<StdRng>,
}

impl MockPriceOracle {
    pub fn new() -> Self {
        Self::with_rng(StdRng::from_entropy())
    }

    /// Deterministic sequence of quotes, for tests and reproducible runs.
    pub fn seeded(seed: u64) -> Self {
        Self::with_rng(StdRng::seed_from_u64(seed))
    }

    fn with_rng(rng: StdRng) -> Self {
        let base = BASE_PRICES
            .iter()
            .map(|(symbol, price)| (symbol.to_string(), *price))
            .collect();
        Self {
            base,
            rng: Mutex::new(rng),
        }
    }

    pub fn base_price(&self, symbol: &str) -> Decimal {
        self.base.get(symbol).copied().unwrap_or(FALLBACK_PRICE)
    }

    pub fn quote(&self, symbol: &str) -> Decimal {
        let Some(base) = self.base.get(symbol).copied() else {
            return FALLBACK_PRICE;
        };
        if is_stablecoin(symbol) {
            return base;
        }
        let bps = {
            let mut rng = self.rng.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            rng.gen_range(-VARIATION_BPS..=VARIATION_BPS)
        };
        round_money(base * (Decimal::ONE + Decimal::new(bps, 4)))
    }

    /// One quote for every symbol with a base price.
    pub fn prices(&self) -> BTreeMap<String, Decimal> {
        self.base
            .keys()
            .map(|symbol| (symbol.clone(), self.quote(symbol)))
            .collect()
    }
}

impl Default for MockPriceOracle {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PriceOracle for MockPriceOracle {
    async fn price(&self, symbol: &str) -> Result<Decimal, OracleError> {
        Ok(self.quote(symbol))
    }
}
