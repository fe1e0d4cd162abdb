//! Paper-trading exchange: cash accounts, weighted-average positions and an
//! append-only trade log, settled atomically against caller-supplied prices.

pub mod api;
pub mod cache;
pub mod config;
pub mod error;
pub mod logging;
pub mod notifier;
pub mod oracle;
pub mod persistence;
pub mod positions;
pub mod settlement;
pub mod types;
pub mod valuation;
