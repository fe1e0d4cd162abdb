//! Asset reference data: lookup by symbol and list.

use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgExecutor};
use uuid::Uuid;

use crate::types::asset::{Asset, AssetType};

#[derive(Debug, FromRow)]
pub struct AssetRow {
    pub id: Uuid,
    pub symbol: String,
    pub name: String,
    pub asset_type: String,
    pub created_at: DateTime<Utc>,
}

/// Convert a row, skipping unknown asset types.
pub fn asset_row_to_asset(row: AssetRow) -> Option<Asset> {
    let asset_type = AssetType::parse(&row.asset_type)?;
    Some(Asset {
        id: row.id,
        symbol: row.symbol,
        name: row.name,
        asset_type,
        created_at: row.created_at,
    })
}

pub async fn get_asset_by_symbol<'e, E: PgExecutor<'e>>(
    executor: E,
    symbol: &str,
) -> Result<Option<Asset>, sqlx::Error> {
    let row = sqlx::query_as::<_, AssetRow>(
        "SELECT id, symbol, name, asset_type, created_at FROM assets WHERE symbol = $1",
    )
    .bind(symbol)
    .fetch_optional(executor)
    .await?;
    Ok(row.and_then(asset_row_to_asset))
}

pub async fn list_assets<'e, E: PgExecutor<'e>>(executor: E) -> Result<Vec<Asset>, sqlx::Error> {
    let rows = sqlx::query_as::<_, AssetRow>(
        "SELECT id, symbol, name, asset_type, created_at FROM assets ORDER BY symbol",
    )
    .fetch_all(executor)
    .await?;
    Ok(rows.into_iter().filter_map(asset_row_to_asset).collect())
}
