//! Trade persistence: append on settlement, list for history.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{FromRow, PgExecutor};
use uuid::Uuid;

use crate::types::trade::{TradeRecord, TradeSide};

#[derive(Debug, FromRow)]
pub struct TradeRow {
    pub id: Uuid,
    pub account_id: Uuid,
    pub asset_id: Uuid,
    pub symbol: String,
    pub side: String,
    pub quantity: Decimal,
    pub price: Decimal,
    pub total_amount: Decimal,
    pub external_ref: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Convert a row, skipping unknown sides.
pub fn trade_row_to_trade(row: TradeRow) -> Option<TradeRecord> {
    let side = TradeSide::parse(&row.side)?;
    Some(TradeRecord {
        id: row.id,
        account_id: row.account_id,
        asset_id: row.asset_id,
        symbol: row.symbol,
        side,
        quantity: row.quantity,
        price: row.price,
        total_amount: row.total_amount,
        external_ref: row.external_ref,
        created_at: row.created_at,
    })
}

/// Append a trade. Called once per settlement, inside its transaction.
pub async fn insert_trade<'e, E: PgExecutor<'e>>(
    executor: E,
    trade: &TradeRecord,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO trades (id, account_id, asset_id, side, quantity, price, total_amount, external_ref, created_at) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
    )
    .bind(trade.id)
    .bind(trade.account_id)
    .bind(trade.asset_id)
    .bind(trade.side.as_str())
    .bind(trade.quantity)
    .bind(trade.price)
    .bind(trade.total_amount)
    .bind(&trade.external_ref)
    .bind(trade.created_at)
    .execute(executor)
    .await?;
    Ok(())
}

/// List an account's trades, newest first (for GET /trades/history).
pub async fn list_trades_for_account<'e, E: PgExecutor<'e>>(
    executor: E,
    account_id: Uuid,
    limit: usize,
) -> Result<Vec<TradeRecord>, sqlx::Error> {
    let rows = sqlx::query_as::<_, TradeRow>(
        "SELECT t.id, t.account_id, t.asset_id, a.symbol, t.side, t.quantity, t.price, t.total_amount, \
                t.external_ref, t.created_at \
         FROM trades t JOIN assets a ON a.id = t.asset_id \
         WHERE t.account_id = $1 ORDER BY t.created_at DESC LIMIT $2",
    )
    .bind(account_id)
    .bind(i64::try_from(limit).unwrap_or(i64::MAX))
    .fetch_all(executor)
    .await?;
    Ok(rows.into_iter().filter_map(trade_row_to_trade).collect())
}

/// Fill in the external ledger reference if it is still empty.
pub async fn set_external_ref<'e, E: PgExecutor<'e>>(
    executor: E,
    trade_id: Uuid,
    reference: &str,
) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE trades SET external_ref = $1 WHERE id = $2 AND external_ref IS NULL")
        .bind(reference)
        .bind(trade_id)
        .execute(executor)
        .await?;
    Ok(())
}
