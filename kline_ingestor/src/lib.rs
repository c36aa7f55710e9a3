//! Exchange-facing half of the kline pipeline.
//!
//! - [`models`]: the interval catalog, the canonical [`Kline`](models::kline::Kline)
//!   record and half-open time ranges.
//! - [`providers`]: the [`ExchangeSource`](providers::ExchangeSource) capability and
//!   the Binance REST adapter.
//! - [`io`]: the [`KlineSink`](io::sink::KlineSink) write capability a durable store implements.
//! - [`requests`]: the batch partitioner that splits a large range into
//!   exchange-sized calls and drives them concurrently.

pub mod io;
pub mod models;
pub mod providers;
pub mod requests;
