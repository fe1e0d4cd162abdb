//! Settlement engine: turns a trade intent into one atomic update of the
//! account balance, the position and the trade log.
//!
//! The storage transaction covers only the ledger reads and writes. The
//! external ledger call and cache invalidation run after commit and can never
//! undo a settlement.

use chrono::Utc;
use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::cache::{self, Cache};
use crate::error::{ErrorKind, SettlementError};
use crate::notifier::LedgerNotifier;
use crate::persistence::{LedgerStore, LedgerTxn};
use crate::positions::{self, PositionChange};
use crate::types::trade::{TradeRecord, TradeSide};

pub const DEFAULT_NOTIFY_TIMEOUT: Duration = Duration::from_secs(5);

/// A validated request to trade. Quantity and price are positive; the symbol
/// is normalized to uppercase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TradeIntent {
    pub account_id: Uuid,
    pub symbol: String,
    pub side: TradeSide,
    pub quantity: Decimal,
    pub price: Decimal,
}

impl TradeIntent {
    pub fn new(
        account_id: Uuid,
        symbol: &str,
        side: TradeSide,
        quantity: Decimal,
        price: Decimal,
    ) -> Self {
        Self {
            account_id,
            symbol: symbol.trim().to_uppercase(),
            side,
            quantity,
            price,
        }
    }
}

/// Outcome of a committed trade.
#[derive(Debug, Clone)]
pub struct Settlement {
    pub trade: TradeRecord,
    /// External ledger reference; empty when notification failed or was skipped.
    pub reference: String,
    /// Cash balance right after commit.
    pub balance: Decimal,
}

pub struct SettlementEngine {
    store: Arc<dyn LedgerStore>,
    cache: Option<Arc<dyn Cache>>,
    notifier: Option<Arc<dyn LedgerNotifier>>,
    notify_timeout: Duration,
}

impl SettlementEngine {
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        Self {
            store,
            cache: None,
            notifier: None,
            notify_timeout: DEFAULT_NOTIFY_TIMEOUT,
        }
    }

    pub fn with_cache(mut self, cache: Option<Arc<dyn Cache>>) -> Self {
        self.cache = cache;
        self
    }

    pub fn with_notifier(mut self, notifier: Option<Arc<dyn LedgerNotifier>>, timeout: Duration) -> Self {
        self.notifier = notifier;
        self.notify_timeout = timeout;
        self
    }

    pub async fn execute_buy(
        &self,
        account_id: Uuid,
        symbol: &str,
        quantity: Decimal,
        price: Decimal,
    ) -> Result<Settlement, SettlementError> {
        self.execute(TradeIntent::new(account_id, symbol, TradeSide::Buy, quantity, price))
            .await
    }

    pub async fn execute_sell(
        &self,
        account_id: Uuid,
        symbol: &str,
        quantity: Decimal,
        price: Decimal,
    ) -> Result<Settlement, SettlementError> {
        self.execute(TradeIntent::new(account_id, symbol, TradeSide::Sell, quantity, price))
            .await
    }

    /// Settle one intent. No automatic retry: a `Conflict` is returned to the
    /// caller with nothing committed.
    pub async fn execute(&self, intent: TradeIntent) -> Result<Settlement, SettlementError> {
        let (mut trade, balance) = match self.settle(&intent).await {
            Ok(outcome) => outcome,
            Err(err) => {
                match err.kind() {
                    ErrorKind::Validation => debug!(
                        account_id = %intent.account_id,
                        symbol = %intent.symbol,
                        side = %intent.side,
                        reason = %err,
                        "trade rejected"
                    ),
                    ErrorKind::Conflict => warn!(
                        account_id = %intent.account_id,
                        symbol = %intent.symbol,
                        "trade aborted on write conflict"
                    ),
                    ErrorKind::Storage => error!(
                        account_id = %intent.account_id,
                        symbol = %intent.symbol,
                        error = %err,
                        "trade failed in storage"
                    ),
                }
                return Err(err);
            }
        };

        info!(
            trade_id = %trade.id,
            account_id = %trade.account_id,
            symbol = %trade.symbol,
            side = %trade.side,
            quantity = %trade.quantity,
            price = %trade.price,
            total = %trade.total_amount,
            balance = %balance,
            "trade settled"
        );

        cache::invalidate_account(self.cache.as_deref(), trade.account_id).await;

        let reference = self.notify(&trade).await.unwrap_or_default();
        if !reference.is_empty() {
            match self.store.set_trade_external_ref(trade.id, &reference).await {
                Ok(()) => trade.external_ref = Some(reference.clone()),
                Err(err) => warn!(
                    trade_id = %trade.id,
                    error = %err,
                    "failed to attach external ledger reference"
                ),
            }
        }

        Ok(Settlement {
            trade,
            reference,
            balance,
        })
    }

    /// Run the ledger mutations in one transaction. Every early exit rolls back.
    async fn settle(&self, intent: &TradeIntent) -> Result<(TradeRecord, Decimal), SettlementError> {
        let mut txn = self.store.begin().await?;
        match apply(txn.as_mut(), intent).await {
            Ok(outcome) => {
                txn.commit().await?;
                Ok(outcome)
            }
            Err(err) => {
                if let Err(rollback_err) = txn.rollback().await {
                    warn!(error = %rollback_err, "rollback failed");
                }
                Err(err)
            }
        }
    }

    async fn notify(&self, trade: &TradeRecord) -> Option<String> {
        let notifier = self.notifier.as_ref()?;
        let call = notifier.record(
            trade.account_id,
            &trade.symbol,
            trade.side,
            trade.quantity,
            trade.price,
        );
        match tokio::time::timeout(self.notify_timeout, call).await {
            Ok(Ok(reference)) => Some(reference),
            Ok(Err(err)) => {
                warn!(trade_id = %trade.id, error = %err, "external ledger notification failed");
                None
            }
            Err(_) => {
                warn!(
                    trade_id = %trade.id,
                    timeout_ms = self.notify_timeout.as_millis() as u64,
                    "external ledger notification timed out"
                );
                None
            }
        }
    }
}

async fn apply(
    txn: &mut dyn LedgerTxn,
    intent: &TradeIntent,
) -> Result<(TradeRecord, Decimal), SettlementError> {
    let asset = txn
        .get_asset(&intent.symbol)
        .await?
        .ok_or_else(|| SettlementError::AssetNotFound(intent.symbol.clone()))?;

    let Some(mut account) = txn.get_account(intent.account_id).await? else {
        // Callers are authenticated, so a missing account means a broken ledger.
        error!(account_id = %intent.account_id, "authenticated account missing from ledger");
        return Err(SettlementError::AccountNotFound(intent.account_id));
    };

    let now = Utc::now();
    let total = positions::trade_total(intent.side, intent.quantity, intent.price);
    let existing = txn.get_position(account.id, asset.id).await?;

    match intent.side {
        TradeSide::Buy => {
            if account.balance < total {
                return Err(SettlementError::InsufficientFunds {
                    balance: account.balance,
                    cost: total,
                });
            }
            account.balance -= total;
            let position = positions::apply_buy(
                existing,
                account.id,
                asset.id,
                intent.quantity,
                intent.price,
                now,
            );
            txn.save_position(&position).await?;
        }
        TradeSide::Sell => {
            let position = existing.ok_or_else(|| SettlementError::NoPosition(asset.symbol.clone()))?;
            if position.quantity < intent.quantity {
                return Err(SettlementError::InsufficientQuantity {
                    held: position.quantity,
                    requested: intent.quantity,
                });
            }
            account.balance += total;
            match positions::apply_sell(position, intent.quantity, now) {
                PositionChange::Reduced(position) => txn.save_position(&position).await?,
                PositionChange::Closed(position) => txn.delete_position(&position).await?,
            }
        }
    }

    account.updated_at = now;
    txn.save_account(&account).await?;

    let trade = TradeRecord {
        id: Uuid::new_v4(),
        account_id: account.id,
        asset_id: asset.id,
        symbol: asset.symbol,
        side: intent.side,
        quantity: intent.quantity,
        price: intent.price,
        total_amount: total,
        external_ref: None,
        created_at: now,
    };
    txn.insert_trade(&trade).await?;

    Ok((trade, account.balance))
}
