#![allow(dead_code)]

use async_trait::async_trait;
use paper_exchange::oracle::{OracleError, PriceOracle};
use paper_exchange::persistence::{LedgerStore, MemoryLedgerStore};
use paper_exchange::types::account::{Account, NewAccount};
use paper_exchange::types::position::Holding;
use paper_exchange::types::trade::TradeRecord;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use uuid::Uuid;

pub fn fresh_store() -> MemoryLedgerStore {
    MemoryLedgerStore::with_default_assets()
}

/// New account with the standard starting balance.
pub async fn open_account(store: &dyn LedgerStore, name: &str) -> Account {
    store
        .create_account(NewAccount {
            email: format!("{name}@example.com"),
            username: name.to_string(),
            password_hash: "not-a-real-hash".to_string(),
        })
        .await
        .unwrap()
}

/// Everything a settlement may touch for one account.
#[derive(Debug, PartialEq)]
pub struct LedgerSnapshot {
    pub account: Account,
    pub holdings: Vec<Holding>,
    pub trades: Vec<TradeRecord>,
}

pub async fn snapshot(store: &dyn LedgerStore, account_id: Uuid) -> LedgerSnapshot {
    LedgerSnapshot {
        account: store.get_account(account_id).await.unwrap().unwrap(),
        holdings: store.list_holdings(account_id).await.unwrap(),
        trades: store.list_trades(account_id, usize::MAX).await.unwrap(),
    }
}

pub async fn holding(store: &dyn LedgerStore, account_id: Uuid, symbol: &str) -> Option<Holding> {
    store
        .list_holdings(account_id)
        .await
        .unwrap()
        .into_iter()
        .find(|h| h.asset.symbol == symbol)
}

/// Oracle with settable prices that counts lookups per symbol.
#[derive(Default)]
pub struct FixedPriceOracle {
    prices: Mutex<HashMap<String, Decimal>>,
    calls: Mutex<HashMap<String, usize>>,
    total_calls: AtomicUsize,
}

impl FixedPriceOracle {
    pub fn new(prices: &[(&str, Decimal)]) -> Self {
        let oracle = Self::default();
        for (symbol, price) in prices {
            oracle.set(symbol, *price);
        }
        oracle
    }

    pub fn set(&self, symbol: &str, price: Decimal) {
        self.prices.lock().unwrap().insert(symbol.to_string(), price);
    }

    pub fn calls_for(&self, symbol: &str) -> usize {
        self.calls.lock().unwrap().get(symbol).copied().unwrap_or(0)
    }

    pub fn total_calls(&self) -> usize {
        self.total_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PriceOracle for FixedPriceOracle {
    async fn price(&self, symbol: &str) -> Result<Decimal, OracleError> {
        self.total_calls.fetch_add(1, Ordering::SeqCst);
        *self.calls.lock().unwrap().entry(symbol.to_string()).or_default() += 1;
        self.prices
            .lock()
            .unwrap()
            .get(symbol)
            .copied()
            .ok_or_else(|| OracleError::Unavailable(symbol.to_string()))
    }
}
