pub mod account;
pub mod asset;
pub mod portfolio;
pub mod position;
pub mod trade;
