//! External ledger notifier: advisory record of a settled trade kept outside
//! the primary store. Never gates settlement.

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

use crate::types::trade::TradeSide;

#[derive(Debug, Error)]
pub enum NotifierError {
    #[error("ledger request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("ledger returned an empty reference")]
    EmptyReference,
}

#[async_trait]
pub trait LedgerNotifier: Send + Sync {
    /// Record the trade and return the ledger's reference (signature) for it.
    async fn record(
        &self,
        account_id: Uuid,
        symbol: &str,
        side: TradeSide,
        quantity: Decimal,
        price: Decimal,
    ) -> Result<String, NotifierError>;
}

/// Memo line written to the external ledger:
/// `TRADE:{account}:{symbol}:{side}:{quantity:.8}:{price:.2}`.
pub fn trade_memo(
    account_id: Uuid,
    symbol: &str,
    side: TradeSide,
    quantity: Decimal,
    price: Decimal,
) -> String {
    format!("TRADE:{account_id}:{symbol}:{side}:{quantity:.8}:{price:.2}")
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RecordTradeRequest {
    pub memo: String,
    pub account_id: Uuid,
    pub symbol: String,
    pub side: TradeSide,
    pub quantity: Decimal,
    pub price: Decimal,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RecordTradeResponse {
    pub signature: String,
}

/// Posts trades as JSON to a ledger gateway endpoint.
pub struct HttpLedgerNotifier {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpLedgerNotifier {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self, NotifierError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
        })
    }
}

#[async_trait]
impl LedgerNotifier for HttpLedgerNotifier {
    async fn record(
        &self,
        account_id: Uuid,
        symbol: &str,
        side: TradeSide,
        quantity: Decimal,
        price: Decimal,
    ) -> Result<String, NotifierError> {
        let body = RecordTradeRequest {
            memo: trade_memo(account_id, symbol, side, quantity, price),
            account_id,
            symbol: symbol.to_string(),
            side,
            quantity,
            price,
        };
        let response: RecordTradeResponse = self
            .client
            .post(&self.endpoint)
            .json(&body)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        if response.signature.is_empty() {
            return Err(NotifierError::EmptyReference);
        }
        tracing::debug!(signature = %response.signature, memo = %body.memo, "trade recorded on external ledger");
        Ok(response.signature)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn memo_pads_quantity_and_price() {
        let account_id = Uuid::nil();
        let memo = trade_memo(account_id, "BTC", TradeSide::Buy, dec!(0.1), dec!(45000));
        assert_eq!(
            memo,
            "TRADE:00000000-0000-0000-0000-000000000000:BTC:BUY:0.10000000:45000.00"
        );
    }
}
