//! Position persistence: locked read, upsert, delete, and holdings listing.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{FromRow, PgExecutor};
use uuid::Uuid;

use crate::persistence::assets::{AssetRow, asset_row_to_asset};
use crate::types::position::{Holding, Position};

#[derive(Debug, FromRow)]
pub struct PositionRow {
    pub id: Uuid,
    pub account_id: Uuid,
    pub asset_id: Uuid,
    pub quantity: Decimal,
    pub avg_price: Decimal,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<PositionRow> for Position {
    fn from(row: PositionRow) -> Self {
        Position {
            id: row.id,
            account_id: row.account_id,
            asset_id: row.asset_id,
            quantity: row.quantity,
            avg_price: row.avg_price,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

/// Read and row-lock the position for (account, asset) inside a transaction.
pub async fn get_position_for_update<'e, E: PgExecutor<'e>>(
    executor: E,
    account_id: Uuid,
    asset_id: Uuid,
) -> Result<Option<Position>, sqlx::Error> {
    let row = sqlx::query_as::<_, PositionRow>(
        "SELECT id, account_id, asset_id, quantity, avg_price, created_at, updated_at \
         FROM positions WHERE account_id = $1 AND asset_id = $2 FOR UPDATE",
    )
    .bind(account_id)
    .bind(asset_id)
    .fetch_optional(executor)
    .await?;
    Ok(row.map(Position::from))
}

/// Insert or update by id. Two concurrent first buys carry different ids and
/// collide on the (account_id, asset_id) unique key instead.
pub async fn upsert_position<'e, E: PgExecutor<'e>>(
    executor: E,
    position: &Position,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO positions (id, account_id, asset_id, quantity, avg_price, created_at, updated_at) \
         VALUES ($1, $2, $3, $4, $5, $6, $7) \
         ON CONFLICT (id) DO UPDATE SET quantity = $4, avg_price = $5, updated_at = $7",
    )
    .bind(position.id)
    .bind(position.account_id)
    .bind(position.asset_id)
    .bind(position.quantity)
    .bind(position.avg_price)
    .bind(position.created_at)
    .bind(position.updated_at)
    .execute(executor)
    .await?;
    Ok(())
}

pub async fn delete_position<'e, E: PgExecutor<'e>>(
    executor: E,
    position_id: Uuid,
) -> Result<(), sqlx::Error> {
    sqlx::query("DELETE FROM positions WHERE id = $1")
        .bind(position_id)
        .execute(executor)
        .await?;
    Ok(())
}

#[derive(FromRow)]
struct HoldingRow {
    #[sqlx(flatten)]
    position: PositionRow,
    asset_symbol: String,
    asset_name: String,
    asset_type: String,
    asset_created_at: DateTime<Utc>,
}

/// List an account's positions joined with their assets (for GET /portfolio/holdings).
pub async fn list_holdings<'e, E: PgExecutor<'e>>(
    executor: E,
    account_id: Uuid,
) -> Result<Vec<Holding>, sqlx::Error> {
    let rows = sqlx::query_as::<_, HoldingRow>(
        "SELECT p.id, p.account_id, p.asset_id, p.quantity, p.avg_price, p.created_at, p.updated_at, \
                a.symbol AS asset_symbol, a.name AS asset_name, a.asset_type, a.created_at AS asset_created_at \
         FROM positions p JOIN assets a ON a.id = p.asset_id \
         WHERE p.account_id = $1 ORDER BY a.symbol",
    )
    .bind(account_id)
    .fetch_all(executor)
    .await?;
    Ok(rows
        .into_iter()
        .filter_map(|row| {
            let asset = asset_row_to_asset(AssetRow {
                id: row.position.asset_id,
                symbol: row.asset_symbol,
                name: row.asset_name,
                asset_type: row.asset_type,
                created_at: row.asset_created_at,
            })?;
            Some(Holding {
                position: row.position.into(),
                asset,
            })
        })
        .collect())
}
