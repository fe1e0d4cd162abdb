use axum::Json;
use axum::extract::State;
use rust_decimal::Decimal;
use std::collections::BTreeMap;

use crate::api::auth::AuthUser;
use crate::api::error::ApiError;
use crate::api::routes::AppState;
use crate::types::asset::Asset;
use crate::types::portfolio::PortfolioSnapshot;
use crate::types::position::Holding;

/// GET /api/portfolio
pub async fn portfolio(
    auth: AuthUser,
    State(state): State<AppState>,
) -> Result<Json<PortfolioSnapshot>, ApiError> {
    Ok(Json(state.valuation.get_portfolio(auth.account_id).await?))
}

/// GET /api/portfolio/holdings
pub async fn holdings(
    auth: AuthUser,
    State(state): State<AppState>,
) -> Result<Json<Vec<Holding>>, ApiError> {
    Ok(Json(state.valuation.get_holdings(auth.account_id).await?))
}

/// GET /api/assets
pub async fn assets(State(state): State<AppState>) -> Result<Json<Vec<Asset>>, ApiError> {
    Ok(Json(state.store.list_assets().await?))
}

/// GET /api/prices: one current quote per listed asset.
pub async fn prices(
    State(state): State<AppState>,
) -> Result<Json<BTreeMap<String, Decimal>>, ApiError> {
    let mut quotes = BTreeMap::new();
    for asset in state.store.list_assets().await? {
        let price = state
            .oracle
            .price(&asset.symbol)
            .await
            .map_err(|e| ApiError::Internal(e.to_string()))?;
        quotes.insert(asset.symbol, price);
    }
    Ok(Json(quotes))
}
