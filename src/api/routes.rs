use axum::{
    Router,
    routing::{get, post},
};
use std::sync::Arc;

use crate::api::{auth, portfolio, trade};
use crate::oracle::PriceOracle;
use crate::persistence::LedgerStore;
use crate::settlement::SettlementEngine;
use crate::valuation::ValuationService;

/// Shared handler state. Everything behind `Arc`, cheap to clone per request.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn LedgerStore>,
    pub settlement: Arc<SettlementEngine>,
    pub valuation: Arc<ValuationService>,
    pub oracle: Arc<dyn PriceOracle>,
    pub jwt_secret: Vec<u8>,
}

async fn health() -> &'static str {
    "healthy"
}

pub fn app_router(state: AppState) -> Router {
    let api = Router::new()
        .route("/register", post(auth::register))
        .route("/login", post(auth::login))
        .route("/user/profile", get(auth::profile))
        .route("/trade/buy", post(trade::buy))
        .route("/trade/sell", post(trade::sell))
        .route("/trades/history", get(trade::history))
        .route("/portfolio", get(portfolio::portfolio))
        .route("/portfolio/holdings", get(portfolio::holdings))
        .route("/assets", get(portfolio::assets))
        .route("/prices", get(portfolio::prices));

    Router::new()
        .route("/health", get(health))
        .nest("/api", api)
        .with_state(state)
}
