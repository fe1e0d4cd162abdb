//! In-process ledger store. Same transaction discipline as the Postgres store:
//! a transaction takes the account's lock on first touch and holds it until
//! commit, rollback or drop; writes are staged and applied in one step.

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};
use uuid::Uuid;

use crate::error::StoreError;
use crate::persistence::store::{LedgerStore, LedgerTxn};
use crate::types::account::{Account, INITIAL_BALANCE, NewAccount};
use crate::types::asset::{Asset, DEFAULT_ASSETS};
use crate::types::position::{Holding, Position};
use crate::types::trade::TradeRecord;

#[derive(Default)]
struct LedgerState {
    accounts: HashMap<Uuid, Account>,
    password_hashes: HashMap<Uuid, String>,
    assets: HashMap<String, Asset>,
    /// Asset id to symbol, for joining positions.
    asset_symbols: HashMap<Uuid, String>,
    positions: HashMap<(Uuid, Uuid), Position>,
    trades: Vec<TradeRecord>,
}

impl LedgerState {
    fn holdings_of(&self, account_id: Uuid) -> Vec<Holding> {
        let mut holdings: Vec<Holding> = self
            .positions
            .values()
            .filter(|p| p.account_id == account_id)
            .filter_map(|p| {
                let asset = self
                    .asset_symbols
                    .get(&p.asset_id)
                    .and_then(|symbol| self.assets.get(symbol))?;
                Some(Holding {
                    position: p.clone(),
                    asset: asset.clone(),
                })
            })
            .collect();
        holdings.sort_by(|a, b| a.asset.symbol.cmp(&b.asset.symbol));
        holdings
    }
}

/// One lock per account with a transaction in flight. Entries are pruned when
/// the last transaction holding or waiting on them finishes.
type AccountLocks = Arc<DashMap<Uuid, Arc<Mutex<()>>>>;

#[derive(Clone, Default)]
pub struct MemoryLedgerStore {
    state: Arc<RwLock<LedgerState>>,
    account_locks: AccountLocks,
}

impl MemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Accounts that currently have a lock entry.
    pub fn locked_account_count(&self) -> usize {
        self.account_locks.len()
    }

    /// Store seeded with the standard asset list.
    pub fn with_default_assets() -> Self {
        let now = Utc::now();
        let mut state = LedgerState::default();
        for (symbol, name, asset_type) in DEFAULT_ASSETS {
            let asset = Asset {
                id: Uuid::new_v4(),
                symbol: symbol.to_string(),
                name: name.to_string(),
                asset_type: *asset_type,
                created_at: now,
            };
            state.asset_symbols.insert(asset.id, asset.symbol.clone());
            state.assets.insert(asset.symbol.clone(), asset);
        }
        Self {
            state: Arc::new(RwLock::new(state)),
            account_locks: AccountLocks::default(),
        }
    }
}

#[async_trait]
impl LedgerStore for MemoryLedgerStore {
    async fn begin(&self) -> Result<Box<dyn LedgerTxn>, StoreError> {
        Ok(Box::new(MemoryTxn {
            state: Arc::clone(&self.state),
            account_locks: Arc::clone(&self.account_locks),
            held: HashMap::new(),
            accounts: HashMap::new(),
            positions: HashMap::new(),
            trades: Vec::new(),
        }))
    }

    async fn create_account(&self, new_account: NewAccount) -> Result<Account, StoreError> {
        let mut state = self.state.write().await;
        if state.accounts.values().any(|a| a.email == new_account.email) {
            return Err(StoreError::Duplicate("email".into()));
        }
        if state.accounts.values().any(|a| a.username == new_account.username) {
            return Err(StoreError::Duplicate("username".into()));
        }
        let now = Utc::now();
        let account = Account {
            id: Uuid::new_v4(),
            email: new_account.email,
            username: new_account.username,
            balance: INITIAL_BALANCE,
            created_at: now,
            updated_at: now,
        };
        state.password_hashes.insert(account.id, new_account.password_hash);
        state.accounts.insert(account.id, account.clone());
        Ok(account)
    }

    async fn get_account(&self, account_id: Uuid) -> Result<Option<Account>, StoreError> {
        Ok(self.state.read().await.accounts.get(&account_id).cloned())
    }

    async fn find_credentials(&self, email: &str) -> Result<Option<(Account, String)>, StoreError> {
        let state = self.state.read().await;
        Ok(state
            .accounts
            .values()
            .find(|a| a.email == email)
            .and_then(|a| {
                state
                    .password_hashes
                    .get(&a.id)
                    .map(|hash| (a.clone(), hash.clone()))
            }))
    }

    async fn list_assets(&self) -> Result<Vec<Asset>, StoreError> {
        let mut assets: Vec<Asset> = self.state.read().await.assets.values().cloned().collect();
        assets.sort_by(|a, b| a.symbol.cmp(&b.symbol));
        Ok(assets)
    }

    async fn list_holdings(&self, account_id: Uuid) -> Result<Vec<Holding>, StoreError> {
        Ok(self.state.read().await.holdings_of(account_id))
    }

    async fn load_portfolio(
        &self,
        account_id: Uuid,
    ) -> Result<Option<(Account, Vec<Holding>)>, StoreError> {
        let state = self.state.read().await;
        Ok(state
            .accounts
            .get(&account_id)
            .map(|account| (account.clone(), state.holdings_of(account_id))))
    }

    async fn list_trades(&self, account_id: Uuid, limit: usize) -> Result<Vec<TradeRecord>, StoreError> {
        let state = self.state.read().await;
        // Appended in commit order, so reverse iteration is newest first.
        Ok(state
            .trades
            .iter()
            .rev()
            .filter(|t| t.account_id == account_id)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn set_trade_external_ref(&self, trade_id: Uuid, reference: &str) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        if let Some(trade) = state.trades.iter_mut().find(|t| t.id == trade_id) {
            if trade.external_ref.is_none() {
                trade.external_ref = Some(reference.to_string());
            }
        }
        Ok(())
    }
}

/// Staged writes plus the account locks acquired so far.
pub struct MemoryTxn {
    state: Arc<RwLock<LedgerState>>,
    account_locks: AccountLocks,
    held: HashMap<Uuid, OwnedMutexGuard<()>>,
    accounts: HashMap<Uuid, Account>,
    /// `None` marks a staged delete.
    positions: HashMap<(Uuid, Uuid), Option<Position>>,
    trades: Vec<TradeRecord>,
}

impl MemoryTxn {
    async fn lock_account(&mut self, account_id: Uuid) {
        if self.held.contains_key(&account_id) {
            return;
        }
        let lock = Arc::clone(self.account_locks.entry(account_id).or_default().value());
        let guard = lock.lock_owned().await;
        self.held.insert(account_id, guard);
    }
}

impl Drop for MemoryTxn {
    fn drop(&mut self) {
        for (account_id, guard) in self.held.drain() {
            drop(guard);
            // Map entry is the only reference left: nobody holds or awaits it.
            self.account_locks
                .remove_if(&account_id, |_, lock| Arc::strong_count(lock) == 1);
        }
    }
}

#[async_trait]
impl LedgerTxn for MemoryTxn {
    async fn get_asset(&mut self, symbol: &str) -> Result<Option<Asset>, StoreError> {
        Ok(self.state.read().await.assets.get(symbol).cloned())
    }

    async fn get_account(&mut self, account_id: Uuid) -> Result<Option<Account>, StoreError> {
        self.lock_account(account_id).await;
        if let Some(staged) = self.accounts.get(&account_id) {
            return Ok(Some(staged.clone()));
        }
        Ok(self.state.read().await.accounts.get(&account_id).cloned())
    }

    async fn get_position(
        &mut self,
        account_id: Uuid,
        asset_id: Uuid,
    ) -> Result<Option<Position>, StoreError> {
        self.lock_account(account_id).await;
        if let Some(staged) = self.positions.get(&(account_id, asset_id)) {
            return Ok(staged.clone());
        }
        Ok(self
            .state
            .read()
            .await
            .positions
            .get(&(account_id, asset_id))
            .cloned())
    }

    async fn save_account(&mut self, account: &Account) -> Result<(), StoreError> {
        self.lock_account(account.id).await;
        self.accounts.insert(account.id, account.clone());
        Ok(())
    }

    async fn save_position(&mut self, position: &Position) -> Result<(), StoreError> {
        self.lock_account(position.account_id).await;
        self.positions
            .insert((position.account_id, position.asset_id), Some(position.clone()));
        Ok(())
    }

    async fn delete_position(&mut self, position: &Position) -> Result<(), StoreError> {
        self.lock_account(position.account_id).await;
        self.positions.insert((position.account_id, position.asset_id), None);
        Ok(())
    }

    async fn insert_trade(&mut self, trade: &TradeRecord) -> Result<(), StoreError> {
        self.lock_account(trade.account_id).await;
        self.trades.push(trade.clone());
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        let mut txn = self;
        // Same checks the schema enforces with CHECK constraints.
        if let Some(account) = txn.accounts.values().find(|a| a.balance < Decimal::ZERO) {
            return Err(StoreError::Invariant(format!(
                "negative balance for account {}",
                account.id
            )));
        }
        if let Some(position) = txn
            .positions
            .values()
            .flatten()
            .find(|p| p.quantity <= Decimal::ZERO)
        {
            return Err(StoreError::Invariant(format!(
                "non-positive quantity for position {}",
                position.id
            )));
        }

        let shared = Arc::clone(&txn.state);
        let mut state = shared.write().await;
        for (id, account) in std::mem::take(&mut txn.accounts) {
            state.accounts.insert(id, account);
        }
        for (key, position) in std::mem::take(&mut txn.positions) {
            match position {
                Some(position) => {
                    state.positions.insert(key, position);
                }
                None => {
                    state.positions.remove(&key);
                }
            }
        }
        state.trades.append(&mut txn.trades);
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), StoreError> {
        Ok(())
    }
}
