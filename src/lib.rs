//! Catalog pricing driven by a scraped gold-per-gram quote.

pub mod catalog;
pub mod channel;
pub mod config;
pub mod error;
pub mod extract;
pub mod price;
pub mod query;
pub mod refresh;
pub mod server;
