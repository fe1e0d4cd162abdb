//! Account persistence: create, lookup, locked read and balance update.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{FromRow, PgExecutor};
use uuid::Uuid;

use crate::types::account::Account;

#[derive(Debug, FromRow)]
pub struct AccountRow {
    pub id: Uuid,
    pub email: String,
    pub username: String,
    pub balance: Decimal,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<AccountRow> for Account {
    fn from(row: AccountRow) -> Self {
        Account {
            id: row.id,
            email: row.email,
            username: row.username,
            balance: row.balance,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

/// Row with the password hash, for login only.
#[derive(FromRow)]
pub struct CredentialRow {
    #[sqlx(flatten)]
    pub account: AccountRow,
    pub password_hash: String,
}

/// Insert an account. Email must already be lowercase.
pub async fn insert_account<'e, E: PgExecutor<'e>>(
    executor: E,
    account: &Account,
    password_hash: &str,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO accounts (id, email, username, password_hash, balance, created_at, updated_at) \
         VALUES ($1, $2, $3, $4, $5, $6, $7)",
    )
    .bind(account.id)
    .bind(&account.email)
    .bind(&account.username)
    .bind(password_hash)
    .bind(account.balance)
    .bind(account.created_at)
    .bind(account.updated_at)
    .execute(executor)
    .await?;
    Ok(())
}

pub async fn get_account<'e, E: PgExecutor<'e>>(
    executor: E,
    account_id: Uuid,
) -> Result<Option<AccountRow>, sqlx::Error> {
    sqlx::query_as::<_, AccountRow>(
        "SELECT id, email, username, balance, created_at, updated_at FROM accounts WHERE id = $1",
    )
    .bind(account_id)
    .fetch_optional(executor)
    .await
}

/// Read and row-lock an account inside a transaction.
pub async fn get_account_for_update<'e, E: PgExecutor<'e>>(
    executor: E,
    account_id: Uuid,
) -> Result<Option<AccountRow>, sqlx::Error> {
    sqlx::query_as::<_, AccountRow>(
        "SELECT id, email, username, balance, created_at, updated_at \
         FROM accounts WHERE id = $1 FOR UPDATE",
    )
    .bind(account_id)
    .fetch_optional(executor)
    .await
}

pub async fn get_credentials_by_email<'e, E: PgExecutor<'e>>(
    executor: E,
    email_lowercase: &str,
) -> Result<Option<CredentialRow>, sqlx::Error> {
    sqlx::query_as::<_, CredentialRow>(
        "SELECT id, email, username, balance, created_at, updated_at, password_hash \
         FROM accounts WHERE email = $1",
    )
    .bind(email_lowercase)
    .fetch_optional(executor)
    .await
}

pub async fn update_balance<'e, E: PgExecutor<'e>>(
    executor: E,
    account: &Account,
) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE accounts SET balance = $1, updated_at = $2 WHERE id = $3")
        .bind(account.balance)
        .bind(account.updated_at)
        .bind(account.id)
        .execute(executor)
        .await?;
    Ok(())
}
