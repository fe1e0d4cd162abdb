pub mod auth;
pub mod error;
pub mod portfolio;
pub mod routes;
pub mod trade;
