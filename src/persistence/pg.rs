//! Postgres-backed ledger store. Settlement transactions run at REPEATABLE READ
//! and lock the account and position rows they read.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use crate::error::StoreError;
use crate::persistence::store::{LedgerStore, LedgerTxn};
use crate::persistence::{accounts, assets, positions, trades};
use crate::types::account::{Account, INITIAL_BALANCE, NewAccount};
use crate::types::asset::Asset;
use crate::types::position::{Holding, Position};
use crate::types::trade::TradeRecord;

#[derive(Clone)]
pub struct PgLedgerStore {
    pool: PgPool,
}

impl PgLedgerStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn unique_violation_on(err: &sqlx::Error) -> Option<String> {
    let sqlx::Error::Database(db_err) = err else {
        return None;
    };
    if db_err.code().as_deref() != Some("23505") {
        return None;
    }
    let field = match db_err.constraint() {
        Some(c) if c.contains("username") => "username",
        _ => "email",
    };
    Some(field.to_string())
}

#[async_trait]
impl LedgerStore for PgLedgerStore {
    async fn begin(&self) -> Result<Box<dyn LedgerTxn>, StoreError> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("SET TRANSACTION ISOLATION LEVEL REPEATABLE READ")
            .execute(&mut *tx)
            .await?;
        Ok(Box::new(PgLedgerTxn { tx }))
    }

    async fn create_account(&self, new_account: NewAccount) -> Result<Account, StoreError> {
        let now = Utc::now();
        let account = Account {
            id: Uuid::new_v4(),
            email: new_account.email,
            username: new_account.username,
            balance: INITIAL_BALANCE,
            created_at: now,
            updated_at: now,
        };
        if let Err(err) =
            accounts::insert_account(&self.pool, &account, &new_account.password_hash).await
        {
            return Err(match unique_violation_on(&err) {
                Some(field) => StoreError::Duplicate(field),
                None => err.into(),
            });
        }
        Ok(account)
    }

    async fn get_account(&self, account_id: Uuid) -> Result<Option<Account>, StoreError> {
        let row = accounts::get_account(&self.pool, account_id).await?;
        Ok(row.map(Account::from))
    }

    async fn find_credentials(&self, email: &str) -> Result<Option<(Account, String)>, StoreError> {
        let row = accounts::get_credentials_by_email(&self.pool, email).await?;
        Ok(row.map(|r| (Account::from(r.account), r.password_hash)))
    }

    async fn list_assets(&self) -> Result<Vec<Asset>, StoreError> {
        Ok(assets::list_assets(&self.pool).await?)
    }

    async fn list_holdings(&self, account_id: Uuid) -> Result<Vec<Holding>, StoreError> {
        Ok(positions::list_holdings(&self.pool, account_id).await?)
    }

    async fn load_portfolio(
        &self,
        account_id: Uuid,
    ) -> Result<Option<(Account, Vec<Holding>)>, StoreError> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("SET TRANSACTION ISOLATION LEVEL REPEATABLE READ, READ ONLY")
            .execute(&mut *tx)
            .await?;
        let Some(row) = accounts::get_account(&mut *tx, account_id).await? else {
            tx.rollback().await?;
            return Ok(None);
        };
        let holdings = positions::list_holdings(&mut *tx, account_id).await?;
        tx.commit().await?;
        Ok(Some((Account::from(row), holdings)))
    }

    async fn list_trades(&self, account_id: Uuid, limit: usize) -> Result<Vec<TradeRecord>, StoreError> {
        Ok(trades::list_trades_for_account(&self.pool, account_id, limit).await?)
    }

    async fn set_trade_external_ref(&self, trade_id: Uuid, reference: &str) -> Result<(), StoreError> {
        Ok(trades::set_external_ref(&self.pool, trade_id, reference).await?)
    }
}

/// Wraps a `sqlx` transaction; dropping it without commit rolls back.
pub struct PgLedgerTxn {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl LedgerTxn for PgLedgerTxn {
    async fn get_asset(&mut self, symbol: &str) -> Result<Option<Asset>, StoreError> {
        Ok(assets::get_asset_by_symbol(&mut *self.tx, symbol).await?)
    }

    async fn get_account(&mut self, account_id: Uuid) -> Result<Option<Account>, StoreError> {
        let row = accounts::get_account_for_update(&mut *self.tx, account_id).await?;
        Ok(row.map(Account::from))
    }

    async fn get_position(
        &mut self,
        account_id: Uuid,
        asset_id: Uuid,
    ) -> Result<Option<Position>, StoreError> {
        Ok(positions::get_position_for_update(&mut *self.tx, account_id, asset_id).await?)
    }

    async fn save_account(&mut self, account: &Account) -> Result<(), StoreError> {
        Ok(accounts::update_balance(&mut *self.tx, account).await?)
    }

    async fn save_position(&mut self, position: &Position) -> Result<(), StoreError> {
        Ok(positions::upsert_position(&mut *self.tx, position).await?)
    }

    async fn delete_position(&mut self, position: &Position) -> Result<(), StoreError> {
        Ok(positions::delete_position(&mut *self.tx, position.id).await?)
    }

    async fn insert_trade(&mut self, trade: &TradeRecord) -> Result<(), StoreError> {
        Ok(trades::insert_trade(&mut *self.tx, trade).await?)
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        Ok(self.tx.commit().await?)
    }

    async fn rollback(self: Box<Self>) -> Result<(), StoreError> {
        Ok(self.tx.rollback().await?)
    }
}
