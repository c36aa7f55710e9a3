//! Store-facing half of the kline pipeline: durable SQLite storage, the
//! cache-aside read path, interval aggregation and the service facade that
//! ties them to the exchanges in `kline_ingestor`.

#![deny(missing_docs)]

pub mod aggregate;
pub mod cache;
pub mod config;
pub mod db;
/// Errors returned by the service facade.
pub mod error;
pub mod exchanges;
pub mod models;
pub mod repo;
pub mod retrieve;
/// Diesel table definitions.
#[allow(missing_docs)]
pub mod schema;
pub mod service;
pub mod symbols;
pub mod timestamp;
