//! Ledger store contract: transactional read-modify-write over one account's
//! balance, positions and trades, plus the plain reads the API needs.

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::StoreError;
use crate::types::account::{Account, NewAccount};
use crate::types::asset::Asset;
use crate::types::position::{Holding, Position};
use crate::types::trade::TradeRecord;

/// One atomic unit of work. Reads of the account and position rows lock them
/// until commit or rollback, so two transactions on the same account cannot
/// both act on a stale balance or quantity. Dropping a transaction without
/// committing discards every staged write.
#[async_trait]
pub trait LedgerTxn: Send {
    async fn get_asset(&mut self, symbol: &str) -> Result<Option<Asset>, StoreError>;
    async fn get_account(&mut self, account_id: Uuid) -> Result<Option<Account>, StoreError>;
    async fn get_position(
        &mut self,
        account_id: Uuid,
        asset_id: Uuid,
    ) -> Result<Option<Position>, StoreError>;
    async fn save_account(&mut self, account: &Account) -> Result<(), StoreError>;
    async fn save_position(&mut self, position: &Position) -> Result<(), StoreError>;
    async fn delete_position(&mut self, position: &Position) -> Result<(), StoreError>;
    async fn insert_trade(&mut self, trade: &TradeRecord) -> Result<(), StoreError>;
    async fn commit(self: Box<Self>) -> Result<(), StoreError>;
    async fn rollback(self: Box<Self>) -> Result<(), StoreError>;
}

#[async_trait]
pub trait LedgerStore: Send + Sync {
    async fn begin(&self) -> Result<Box<dyn LedgerTxn>, StoreError>;

    /// Create an account funded with [`INITIAL_BALANCE`](crate::types::account::INITIAL_BALANCE).
    async fn create_account(&self, new_account: NewAccount) -> Result<Account, StoreError>;
    async fn get_account(&self, account_id: Uuid) -> Result<Option<Account>, StoreError>;
    /// Account plus password hash, by lowercase email. For login.
    async fn find_credentials(&self, email: &str)
    -> Result<Option<(Account, String)>, StoreError>;

    async fn list_assets(&self) -> Result<Vec<Asset>, StoreError>;
    async fn list_holdings(&self, account_id: Uuid) -> Result<Vec<Holding>, StoreError>;
    /// Account and holdings read as of one instant, never straddling a
    /// settlement. `None` when the account does not exist.
    async fn load_portfolio(
        &self,
        account_id: Uuid,
    ) -> Result<Option<(Account, Vec<Holding>)>, StoreError>;
    /// Most recent first.
    async fn list_trades(&self, account_id: Uuid, limit: usize)
    -> Result<Vec<TradeRecord>, StoreError>;

    /// Attach the external ledger reference to a committed trade. Write-once:
    /// a trade that already carries a reference is left as is.
    async fn set_trade_external_ref(&self, trade_id: Uuid, reference: &str)
    -> Result<(), StoreError>;
}
