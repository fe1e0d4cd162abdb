mod common;

use async_trait::async_trait;
use common::{FixedPriceOracle, fresh_store, open_account};
use paper_exchange::cache::{Cache, CacheError, MemoryCache, holdings_key, portfolio_key};
use paper_exchange::error::{StoreError, ValuationError};
use paper_exchange::oracle::PriceOracle;
use paper_exchange::persistence::{LedgerStore, LedgerTxn, MemoryLedgerStore};
use paper_exchange::settlement::SettlementEngine;
use paper_exchange::types::account::{Account, NewAccount};
use paper_exchange::types::asset::Asset;
use paper_exchange::types::position::Holding;
use paper_exchange::types::trade::TradeRecord;
use paper_exchange::valuation::{ValuationService, value_portfolio};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use uuid::Uuid;

struct Harness {
    store: MemoryLedgerStore,
    oracle: Arc<FixedPriceOracle>,
    cache: Arc<MemoryCache>,
    engine: SettlementEngine,
    valuation: ValuationService,
}

fn harness(with_cache: bool) -> Harness {
    let store = fresh_store();
    let oracle = Arc::new(FixedPriceOracle::new(&[
        ("BTC", dec!(50000)),
        ("ETH", dec!(2500)),
        ("SOL", dec!(100)),
    ]));
    let cache = Arc::new(MemoryCache::new());
    let shared: Option<Arc<dyn Cache>> = with_cache.then(|| cache.clone() as Arc<dyn Cache>);
    let engine = SettlementEngine::new(Arc::new(store.clone())).with_cache(shared.clone());
    let valuation = ValuationService::new(Arc::new(store.clone()), oracle.clone() as Arc<dyn PriceOracle>)
        .with_cache(shared, Duration::from_secs(30));
    Harness {
        store,
        oracle,
        cache,
        engine,
        valuation,
    }
}

#[tokio::test]
async fn empty_portfolio_is_all_cash() {
    let h = harness(false);
    let account = open_account(&h.store, "alice").await;

    let snap = h.valuation.get_portfolio(account.id).await.unwrap();

    assert_eq!(snap.account_id, account.id);
    assert_eq!(snap.cash, dec!(10000));
    assert_eq!(snap.total_value, dec!(10000));
    assert_eq!(snap.pnl, Decimal::ZERO);
    assert!(snap.holdings.is_empty());
    assert_eq!(h.oracle.total_calls(), 0);
}

#[tokio::test]
async fn holdings_are_priced_at_current_quotes() {
    let h = harness(false);
    let account = open_account(&h.store, "bob").await;
    h.engine.execute_buy(account.id, "BTC", dec!(0.1), dec!(45000)).await.unwrap();
    h.engine.execute_buy(account.id, "BTC", dec!(0.1), dec!(47000)).await.unwrap();

    let snap = h.valuation.get_portfolio(account.id).await.unwrap();

    assert_eq!(snap.cash, dec!(800));
    assert_eq!(snap.total_value, dec!(10800));
    assert_eq!(snap.pnl, dec!(800));
    assert_eq!(snap.holdings.len(), 1);
    let btc = &snap.holdings[0];
    assert_eq!(btc.holding.asset.symbol, "BTC");
    assert_eq!(btc.current_price, dec!(50000));
    assert_eq!(btc.value, dec!(10000));
    assert_eq!(btc.pnl, dec!(800));
    assert_eq!(btc.pnl_percent, dec!(8.6957));
}

#[tokio::test]
async fn losing_position_reports_negative_pnl() {
    let h = harness(false);
    let account = open_account(&h.store, "carol").await;
    h.engine.execute_buy(account.id, "ETH", dec!(2), dec!(3000)).await.unwrap();

    let snap = h.valuation.get_portfolio(account.id).await.unwrap();

    assert_eq!(snap.total_value, dec!(9000));
    assert_eq!(snap.pnl, dec!(-1000));
    assert_eq!(snap.holdings[0].pnl, dec!(-1000));
}

#[tokio::test]
async fn one_quote_per_symbol() {
    let h = harness(false);
    let account = open_account(&h.store, "dave").await;
    for symbol in ["BTC", "ETH", "SOL"] {
        h.engine.execute_buy(account.id, symbol, dec!(0.01), dec!(100)).await.unwrap();
    }

    h.valuation.get_portfolio(account.id).await.unwrap();

    assert_eq!(h.oracle.total_calls(), 3);
    for symbol in ["BTC", "ETH", "SOL"] {
        assert_eq!(h.oracle.calls_for(symbol), 1, "{symbol}");
    }
}

#[tokio::test]
async fn oracle_failure_surfaces_as_error() {
    let h = harness(false);
    let account = open_account(&h.store, "erin").await;
    h.engine.execute_buy(account.id, "USDC", dec!(10), dec!(1)).await.unwrap();

    let err = h.valuation.get_portfolio(account.id).await.unwrap_err();
    assert!(matches!(err, ValuationError::Oracle(_)));
}

#[tokio::test]
async fn unknown_account_is_not_found() {
    let h = harness(false);
    let err = h.valuation.get_portfolio(Uuid::new_v4()).await.unwrap_err();
    assert!(matches!(err, ValuationError::AccountNotFound(_)));
}

#[tokio::test]
async fn cached_snapshot_is_served_until_a_trade() {
    let h = harness(true);
    let account = open_account(&h.store, "frank").await;
    h.engine.execute_buy(account.id, "SOL", dec!(10), dec!(100)).await.unwrap();

    let first = h.valuation.get_portfolio(account.id).await.unwrap();
    assert!(h.cache.get(&portfolio_key(account.id)).await.unwrap().is_some());

    // Price moves, but the cached snapshot is served.
    h.oracle.set("SOL", dec!(150));
    let second = h.valuation.get_portfolio(account.id).await.unwrap();
    assert_eq!(second, first);
    assert_eq!(h.oracle.calls_for("SOL"), 1);

    // A trade invalidates, so the next read is fresh.
    h.engine.execute_sell(account.id, "SOL", dec!(5), dec!(150)).await.unwrap();
    let third = h.valuation.get_portfolio(account.id).await.unwrap();
    assert_eq!(third.cash, dec!(9750));
    assert_eq!(third.total_value, dec!(10500));
    assert_eq!(h.oracle.calls_for("SOL"), 2);
}

#[tokio::test]
async fn holdings_reflect_trades_despite_cache() {
    let h = harness(true);
    let account = open_account(&h.store, "grace").await;

    assert!(h.valuation.get_holdings(account.id).await.unwrap().is_empty());
    h.engine.execute_buy(account.id, "ETH", dec!(1), dec!(2500)).await.unwrap();

    let holdings = h.valuation.get_holdings(account.id).await.unwrap();
    assert_eq!(holdings.len(), 1);
    assert_eq!(holdings[0].asset.symbol, "ETH");
    assert_eq!(holdings[0].position.quantity, dec!(1));
}

#[tokio::test]
async fn value_portfolio_sums_cash_and_positions() {
    let h = harness(false);
    let account = open_account(&h.store, "heidi").await;
    h.engine.execute_buy(account.id, "SOL", dec!(4), dec!(100)).await.unwrap();
    h.engine.execute_buy(account.id, "ETH", dec!(1), dec!(2000)).await.unwrap();
    let account = common::snapshot(&h.store, account.id).await;

    let priced = account
        .holdings
        .iter()
        .map(|holding| {
            let price = if holding.asset.symbol == "SOL" { dec!(90) } else { dec!(2200) };
            (holding.clone(), price)
        })
        .collect();
    let snap = value_portfolio(&account.account, priced, chrono::Utc::now());

    assert_eq!(snap.cash, dec!(7600));
    assert_eq!(snap.total_value, dec!(7600) + dec!(360) + dec!(2200));
    assert_eq!(snap.pnl, dec!(160));
}

/// Memory store that settles one buy right after the first portfolio read,
/// before the reader gets to write its cache entry.
struct TradeAfterFirstLoad {
    inner: MemoryLedgerStore,
    engine: SettlementEngine,
    account_id: Uuid,
    fired: AtomicBool,
}

#[async_trait]
impl LedgerStore for TradeAfterFirstLoad {
    async fn begin(&self) -> Result<Box<dyn LedgerTxn>, StoreError> {
        self.inner.begin().await
    }
    async fn create_account(&self, new_account: NewAccount) -> Result<Account, StoreError> {
        self.inner.create_account(new_account).await
    }
    async fn get_account(&self, account_id: Uuid) -> Result<Option<Account>, StoreError> {
        self.inner.get_account(account_id).await
    }
    async fn find_credentials(&self, email: &str) -> Result<Option<(Account, String)>, StoreError> {
        self.inner.find_credentials(email).await
    }
    async fn list_assets(&self) -> Result<Vec<Asset>, StoreError> {
        self.inner.list_assets().await
    }
    async fn list_holdings(&self, account_id: Uuid) -> Result<Vec<Holding>, StoreError> {
        self.inner.list_holdings(account_id).await
    }
    async fn load_portfolio(&self, account_id: Uuid) -> Result<Option<(Account, Vec<Holding>)>, StoreError> {
        let loaded = self.inner.load_portfolio(account_id).await;
        if !self.fired.swap(true, Ordering::SeqCst) {
            self.engine
                .execute_buy(self.account_id, "BTC", dec!(0.1), dec!(50000))
                .await
                .unwrap();
        }
        loaded
    }
    async fn list_trades(&self, account_id: Uuid, limit: usize) -> Result<Vec<TradeRecord>, StoreError> {
        self.inner.list_trades(account_id, limit).await
    }
    async fn set_trade_external_ref(&self, trade_id: Uuid, reference: &str) -> Result<(), StoreError> {
        self.inner.set_trade_external_ref(trade_id, reference).await
    }
}

#[tokio::test]
async fn snapshot_read_before_a_trade_is_consistent_and_not_cached() {
    let inner = fresh_store();
    let account = open_account(&inner, "ivan").await;
    let cache = Arc::new(MemoryCache::new());
    let shared: Option<Arc<dyn Cache>> = Some(cache.clone() as Arc<dyn Cache>);
    let store = Arc::new(TradeAfterFirstLoad {
        inner: inner.clone(),
        engine: SettlementEngine::new(Arc::new(inner.clone())).with_cache(shared.clone()),
        account_id: account.id,
        fired: AtomicBool::new(false),
    });
    let oracle = Arc::new(FixedPriceOracle::new(&[("BTC", dec!(50000))]));
    let valuation = ValuationService::new(store, oracle as Arc<dyn PriceOracle>)
        .with_cache(shared, Duration::from_secs(30));

    let before = valuation.get_portfolio(account.id).await.unwrap();
    assert_eq!(before.cash, dec!(10000));
    assert_eq!(before.total_value, dec!(10000), "cash and holdings come from one instant");
    assert!(before.holdings.is_empty());
    assert!(
        cache.get(&portfolio_key(account.id)).await.unwrap().is_none(),
        "pre-trade snapshot must not outlive the trade in the cache"
    );

    let after = valuation.get_portfolio(account.id).await.unwrap();
    assert_eq!(after.cash, dec!(5000));
    assert_eq!(after.total_value, dec!(10000));
    assert_eq!(after.holdings.len(), 1);
    assert!(cache.get(&portfolio_key(account.id)).await.unwrap().is_some());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn portfolio_never_mixes_pre_and_post_trade_state() {
    let h = harness(false);
    let account = open_account(&h.store, "judy").await;
    let engine = Arc::new(h.engine);
    let valuation = Arc::new(h.valuation);

    // Round trips at the quoted price keep total value at exactly 10000.
    let trader = {
        let engine = Arc::clone(&engine);
        tokio::spawn(async move {
            for _ in 0..50 {
                engine.execute_buy(account.id, "SOL", dec!(3), dec!(100)).await.unwrap();
                engine.execute_sell(account.id, "SOL", dec!(3), dec!(100)).await.unwrap();
            }
        })
    };
    for _ in 0..200 {
        let snap = valuation.get_portfolio(account.id).await.unwrap();
        assert_eq!(snap.total_value, dec!(10000), "cash {} holdings {:?}", snap.cash, snap.holdings);
        tokio::task::yield_now().await;
    }
    trader.await.unwrap();
}

/// Cache backend that is down for every call.
struct UnavailableCache;

#[async_trait]
impl Cache for UnavailableCache {
    async fn get(&self, _key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        Err(CacheError::Unavailable("connection refused".into()))
    }
    async fn set(&self, _key: &str, _value: Vec<u8>, _ttl: Duration) -> Result<(), CacheError> {
        Err(CacheError::Unavailable("connection refused".into()))
    }
    async fn delete(&self, _key: &str) -> Result<(), CacheError> {
        Err(CacheError::Unavailable("connection refused".into()))
    }
}

#[tokio::test]
async fn unavailable_cache_degrades_to_always_miss() {
    let store = fresh_store();
    let account = open_account(&store, "kim").await;
    let oracle = Arc::new(FixedPriceOracle::new(&[("SOL", dec!(100))]));
    let cache: Option<Arc<dyn Cache>> = Some(Arc::new(UnavailableCache));
    let engine = SettlementEngine::new(Arc::new(store.clone())).with_cache(cache.clone());
    let valuation = ValuationService::new(Arc::new(store.clone()), oracle.clone() as Arc<dyn PriceOracle>)
        .with_cache(cache, Duration::from_secs(30));

    let s = engine.execute_buy(account.id, "SOL", dec!(10), dec!(90)).await.unwrap();
    assert_eq!(s.balance, dec!(9100));

    for _ in 0..2 {
        let snap = valuation.get_portfolio(account.id).await.unwrap();
        assert_eq!(snap.total_value, dec!(10100));
    }
    assert_eq!(oracle.calls_for("SOL"), 2, "every read misses");

    let holdings = valuation.get_holdings(account.id).await.unwrap();
    assert_eq!(holdings.len(), 1);

    let s = engine.execute_sell(account.id, "SOL", dec!(10), dec!(100)).await.unwrap();
    assert_eq!(s.balance, dec!(10100));
    assert!(valuation.get_holdings(account.id).await.unwrap().is_empty());
}

#[tokio::test]
async fn holdings_read_before_a_trade_is_not_cached() {
    let inner = fresh_store();
    let account = open_account(&inner, "lars").await;
    let cache = Arc::new(MemoryCache::new());
    let shared: Option<Arc<dyn Cache>> = Some(cache.clone() as Arc<dyn Cache>);
    let store = Arc::new(TradeAfterFirstLoad {
        inner: inner.clone(),
        engine: SettlementEngine::new(Arc::new(inner.clone())).with_cache(shared.clone()),
        account_id: account.id,
        fired: AtomicBool::new(false),
    });
    let oracle = Arc::new(FixedPriceOracle::default());
    let valuation = ValuationService::new(store, oracle as Arc<dyn PriceOracle>)
        .with_cache(shared, Duration::from_secs(30));

    assert!(valuation.get_holdings(account.id).await.unwrap().is_empty());
    assert!(cache.get(&holdings_key(account.id)).await.unwrap().is_none());
    assert_eq!(valuation.get_holdings(account.id).await.unwrap().len(), 1);
}
