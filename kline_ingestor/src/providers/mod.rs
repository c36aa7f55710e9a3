//! Exchange abstraction for kline sources.
//!
//! [`ExchangeSource`] is the single interface the batch loader and the
//! service layer use to talk to an exchange. Each concrete adapter (currently
//! [`binance_rest::BinanceProvider`]) handles its own URL layout, query
//! parameters, response parsing and client-side rate limiting.
//!
//! The trait is object safe, so adapters are registered and selected at
//! runtime as `Arc<dyn ExchangeSource>`.
//!
//! # Example
//!
//! ```rust
//! use std::collections::BTreeSet;
//!
//! use async_trait::async_trait;
//! use kline_ingestor::models::{interval::Interval, kline::Kline, time_range::TimeRange};
//! use kline_ingestor::providers::{ExchangeSource, ProviderError};
//!
//! struct Quiet;
//!
//! #[async_trait]
//! impl ExchangeSource for Quiet {
//!     fn name(&self) -> &str { "quiet" }
//!     fn base_interval(&self) -> Interval { Interval::OneMinute }
//!     fn max_records_per_call(&self) -> u32 { 500 }
//!
//!     async fn list_symbols(&self) -> Result<BTreeSet<String>, ProviderError> {
//!         Ok(BTreeSet::from(["BTCUSDT".to_string()]))
//!     }
//!
//!     async fn fetch_klines(&self, _symbol: &str, _range: TimeRange) -> Result<Vec<Kline>, ProviderError> {
//!         Ok(vec![])
//!     }
//! }
//!
//! assert_eq!(Quiet.time_span_per_call(), 30_000_000);
//! ```

pub mod binance_rest;
pub mod errors;

use std::collections::BTreeSet;

use async_trait::async_trait;

pub use errors::{ProviderError, ProviderInitError, RowError};

use crate::models::{interval::Interval, kline::Kline, time_range::TimeRange};

/// A source of historical klines for one exchange.
#[async_trait]
pub trait ExchangeSource: Send + Sync {
    /// Registry name, lowercase (e.g. `"binance"`).
    fn name(&self) -> &str;

    /// Interval the source fetches and the store holds.
    fn base_interval(&self) -> Interval;

    /// The exchange's per-call record cap.
    fn max_records_per_call(&self) -> u32;

    /// Every tradable symbol, ordered. An empty listing is a fetch error.
    async fn list_symbols(&self) -> Result<BTreeSet<String>, ProviderError>;

    /// Fetches base-interval klines opening inside `range`.
    ///
    /// `range` must not span more than [`time_span_per_call`](Self::time_span_per_call).
    /// Rows that fail to parse are dropped and logged, not returned as errors.
    async fn fetch_klines(&self, symbol: &str, range: TimeRange)
    -> Result<Vec<Kline>, ProviderError>;

    /// Milliseconds one call can cover: `base_interval * max_records_per_call`.
    fn time_span_per_call(&self) -> i64 {
        self.base_interval().duration_millis() * i64::from(self.max_records_per_call())
    }
}
