//! Error types for the ledger store, settlement and valuation.

use rust_decimal::Decimal;
use thiserror::Error;
use uuid::Uuid;

use crate::oracle::OracleError;

/// Failures raised by a [`LedgerStore`](crate::persistence::LedgerStore).
#[derive(Debug, Error)]
pub enum StoreError {
    /// Concurrent write on the same rows; the whole unit may be retried.
    #[error("write conflict with a concurrent transaction")]
    Conflict,

    #[error("{0} already taken")]
    Duplicate(String),

    /// A write would break a ledger invariant (negative balance, empty position).
    #[error("ledger invariant violated: {0}")]
    Invariant(String),

    #[error("ledger store unavailable: {0}")]
    Unavailable(String),

    #[error("database error: {0}")]
    Database(sqlx::Error),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db_err) = &err {
            // serialization_failure, deadlock_detected, unique_violation
            if matches!(db_err.code().as_deref(), Some("40001" | "40P01" | "23505")) {
                return StoreError::Conflict;
            }
        }
        StoreError::Database(err)
    }
}

/// Coarse classification used to decide retry and response semantics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Rejected request. Terminal, nothing changed.
    Validation,
    /// Transient. Safe to retry the whole operation.
    Conflict,
    /// Backend failure. Nothing committed.
    Storage,
}

#[derive(Debug, Error)]
pub enum SettlementError {
    #[error("asset {0} not found")]
    AssetNotFound(String),

    #[error("account {0} not found")]
    AccountNotFound(Uuid),

    #[error("no position found for {0}")]
    NoPosition(String),

    #[error("insufficient balance: {balance} available, {cost} required")]
    InsufficientFunds { balance: Decimal, cost: Decimal },

    #[error("insufficient quantity: {held} held, {requested} requested")]
    InsufficientQuantity { held: Decimal, requested: Decimal },

    #[error("trade conflicted with a concurrent update, retry")]
    Conflict,

    #[error("storage failure: {0}")]
    Storage(StoreError),
}

impl SettlementError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SettlementError::AssetNotFound(_)
            | SettlementError::AccountNotFound(_)
            | SettlementError::NoPosition(_)
            | SettlementError::InsufficientFunds { .. }
            | SettlementError::InsufficientQuantity { .. } => ErrorKind::Validation,
            SettlementError::Conflict => ErrorKind::Conflict,
            SettlementError::Storage(_) => ErrorKind::Storage,
        }
    }
}

impl From<StoreError> for SettlementError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict => SettlementError::Conflict,
            other => SettlementError::Storage(other),
        }
    }
}

#[derive(Debug, Error)]
pub enum ValuationError {
    #[error("account {0} not found")]
    AccountNotFound(Uuid),

    #[error("storage failure: {0}")]
    Storage(#[from] StoreError),

    #[error("price lookup failed: {0}")]
    Oracle(#[from] OracleError),
}
