//! Portfolio valuation: prices an account's positions and reports unrealized
//! P&L. Read-only; results are memoized in the cache until the next trade.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::cache::{self, Cache};
use crate::error::ValuationError;
use crate::oracle::PriceOracle;
use crate::persistence::LedgerStore;
use crate::positions;
use crate::types::account::{Account, INITIAL_BALANCE};
use crate::types::portfolio::{HoldingValuation, PortfolioSnapshot};
use crate::types::position::Holding;

pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(30);

pub struct ValuationService {
    store: Arc<dyn LedgerStore>,
    oracle: Arc<dyn PriceOracle>,
    cache: Option<Arc<dyn Cache>>,
    cache_ttl: Duration,
}

impl ValuationService {
    pub fn new(store: Arc<dyn LedgerStore>, oracle: Arc<dyn PriceOracle>) -> Self {
        Self {
            store,
            oracle,
            cache: None,
            cache_ttl: DEFAULT_CACHE_TTL,
        }
    }

    pub fn with_cache(mut self, cache: Option<Arc<dyn Cache>>, ttl: Duration) -> Self {
        self.cache = cache;
        self.cache_ttl = ttl;
        self
    }

    pub async fn get_portfolio(&self, account_id: Uuid) -> Result<PortfolioSnapshot, ValuationError> {
        let key = cache::portfolio_key(account_id);
        if let Some(snapshot) = cache::get_json::<PortfolioSnapshot>(self.cache.as_deref(), &key).await {
            debug!(%account_id, "[cache] portfolio hit");
            return Ok(snapshot);
        }

        let (account, holdings) = self.load(account_id).await?;

        // One quote per distinct symbol.
        let mut quotes: HashMap<String, Decimal> = HashMap::new();
        let mut priced = Vec::with_capacity(holdings.len());
        for holding in holdings {
            let symbol = holding.asset.symbol.clone();
            let price = match quotes.get(&symbol) {
                Some(price) => *price,
                None => {
                    let price = self.oracle.price(&symbol).await?;
                    quotes.insert(symbol, price);
                    price
                }
            };
            priced.push((holding, price));
        }

        let snapshot = value_portfolio(&account, priced, Utc::now());
        self.cache_if_current(&key, &snapshot, &account).await;
        Ok(snapshot)
    }

    pub async fn get_holdings(&self, account_id: Uuid) -> Result<Vec<Holding>, ValuationError> {
        let key = cache::holdings_key(account_id);
        if let Some(holdings) = cache::get_json::<Vec<Holding>>(self.cache.as_deref(), &key).await {
            debug!(%account_id, "[cache] holdings hit");
            return Ok(holdings);
        }

        let (account, holdings) = self.load(account_id).await?;
        self.cache_if_current(&key, &holdings, &account).await;
        Ok(holdings)
    }

    async fn load(&self, account_id: Uuid) -> Result<(Account, Vec<Holding>), ValuationError> {
        self.store
            .load_portfolio(account_id)
            .await?
            .ok_or(ValuationError::AccountNotFound(account_id))
    }

    /// Store `value` unless a trade committed after `read` was loaded.
    ///
    /// Every settlement rewrites the account row and invalidates only after
    /// commit. So if the account still matches once the entry is written, any
    /// later trade's invalidation will remove it; if it no longer matches, the
    /// entry may have missed that invalidation and is dropped here.
    async fn cache_if_current<T: Serialize>(&self, key: &str, value: &T, read: &Account) {
        let Some(cache) = self.cache.as_deref() else {
            return;
        };
        cache::set_json(Some(cache), key, value, self.cache_ttl).await;
        let current = match self.store.get_account(read.id).await {
            Ok(current) => current,
            Err(err) => {
                warn!(account_id = %read.id, error = %err, "[cache] recheck failed, dropping entry");
                None
            }
        };
        if current.as_ref() != Some(read) {
            debug!(account_id = %read.id, key, "[cache] ledger moved during read, dropping entry");
            if let Err(err) = cache.delete(key).await {
                warn!(key, error = %err, "[cache] delete failed");
            }
        }
    }
}

/// Value priced holdings against the account's cash.
///
/// `total_value = cash + Σ quantity × price`; overall P&L is measured against
/// [`INITIAL_BALANCE`], not the account's own funding history.
pub fn value_portfolio(
    account: &Account,
    priced: Vec<(Holding, Decimal)>,
    as_of: DateTime<Utc>,
) -> PortfolioSnapshot {
    let mut total_value = account.balance;
    let holdings: Vec<HoldingValuation> = priced
        .into_iter()
        .map(|(holding, current_price)| {
            let value = holding.position.quantity * current_price;
            total_value += value;
            HoldingValuation {
                pnl: positions::unrealized_pnl(&holding.position, current_price),
                pnl_percent: positions::pnl_percent(holding.position.avg_price, current_price),
                current_price,
                value,
                holding,
            }
        })
        .collect();

    PortfolioSnapshot {
        account_id: account.id,
        cash: account.balance,
        total_value,
        pnl: total_value - INITIAL_BALANCE,
        holdings,
        as_of,
    }
}
