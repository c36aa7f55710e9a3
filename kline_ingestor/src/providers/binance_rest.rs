//! Binance spot REST adapter.
//!
//! * [`params`]: query-string construction for `/api/v3/klines`.
//! * [`response`]: array-row parsing into [`Kline`](crate::models::kline::Kline).
//! * [`provider`]: the [`BinanceProvider`] itself.

pub mod params;
pub mod provider;
pub mod response;

pub use provider::{BinanceProvider, BinanceSettings};
