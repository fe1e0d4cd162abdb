use axum::Json;
use axum::extract::State;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::api::auth::AuthUser;
use crate::api::error::ApiError;
use crate::api::routes::AppState;
use crate::positions::{PRICE_SCALE, QUANTITY_SCALE, fits_scale};
use crate::settlement::{Settlement, TradeIntent};
use crate::types::trade::{TradeRecord, TradeSide};

/// Trade history page size.
const HISTORY_LIMIT: usize = 100;

#[derive(Debug, Deserialize)]
pub struct TradeRequest {
    pub asset_symbol: String,
    pub quantity: Decimal,
    pub price: Decimal,
}

#[derive(Debug, Serialize)]
pub struct TradeResponse {
    pub message: String,
    pub trade: TradeRecord,
    pub reference: String,
    pub remaining_balance: Decimal,
}

impl From<Settlement> for TradeResponse {
    fn from(s: Settlement) -> Self {
        Self {
            message: "Trade executed successfully".to_string(),
            trade: s.trade,
            reference: s.reference,
            remaining_balance: s.balance,
        }
    }
}

/// Shape checks the engine relies on: non-empty symbol, positive amounts
/// within the stored precision.
fn validate(req: &TradeRequest) -> Result<(), ApiError> {
    if req.asset_symbol.trim().is_empty() {
        return Err(ApiError::BadRequest("asset_symbol is required".into()));
    }
    if req.quantity <= Decimal::ZERO {
        return Err(ApiError::BadRequest("quantity must be greater than 0".into()));
    }
    if req.price <= Decimal::ZERO {
        return Err(ApiError::BadRequest("price must be greater than 0".into()));
    }
    if !fits_scale(req.quantity, QUANTITY_SCALE) {
        return Err(ApiError::BadRequest(format!(
            "quantity supports at most {QUANTITY_SCALE} decimal places"
        )));
    }
    if !fits_scale(req.price, PRICE_SCALE) {
        return Err(ApiError::BadRequest(format!(
            "price supports at most {PRICE_SCALE} decimal places"
        )));
    }
    Ok(())
}

async fn execute(
    state: AppState,
    auth: AuthUser,
    side: TradeSide,
    req: TradeRequest,
) -> Result<Json<TradeResponse>, ApiError> {
    validate(&req)?;
    let intent = TradeIntent::new(
        auth.account_id,
        &req.asset_symbol,
        side,
        req.quantity.normalize(),
        req.price.normalize(),
    );
    let settlement = state.settlement.execute(intent).await?;
    Ok(Json(settlement.into()))
}

/// POST /api/trade/buy
pub async fn buy(
    auth: AuthUser,
    State(state): State<AppState>,
    Json(req): Json<TradeRequest>,
) -> Result<Json<TradeResponse>, ApiError> {
    execute(state, auth, TradeSide::Buy, req).await
}

/// POST /api/trade/sell
pub async fn sell(
    auth: AuthUser,
    State(state): State<AppState>,
    Json(req): Json<TradeRequest>,
) -> Result<Json<TradeResponse>, ApiError> {
    execute(state, auth, TradeSide::Sell, req).await
}

/// GET /api/trades/history
pub async fn history(
    auth: AuthUser,
    State(state): State<AppState>,
) -> Result<Json<Vec<TradeRecord>>, ApiError> {
    let trades = state.store.list_trades(auth.account_id, HISTORY_LIMIT).await?;
    Ok(Json(trades))
}
