//! Canonical in-memory representation of a kline (OHLCV candle).
//!
//! This struct is the standard output of every [`ExchangeSource`](crate::providers::ExchangeSource)
//! implementation and the unit the store, cache and aggregator work on.
//!
//! Prices and volumes are fixed-point [`Decimal`]s, never floats, so sums and
//! min/max over many candles are exact. Values are limited to 20 integer digits
//! and 8 fractional digits; see [`Kline::validate`].

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Maximum number of fractional digits a price or volume may carry.
pub const MAX_FRACTION_DIGITS: u32 = 8;
/// Maximum number of integer digits a price or volume may carry.
pub const MAX_INTEGER_DIGITS: u32 = 20;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum KlineError {
    #[error("symbol must not be empty")]
    EmptySymbol,

    #[error("{field} must be non-negative, got {value}")]
    NegativeTime { field: &'static str, value: i64 },

    #[error("open_time {open_time} must be before close_time {close_time}")]
    InvertedTimes { open_time: i64, close_time: i64 },

    #[error("{field} = {value} exceeds 20 integer / 8 fractional digits")]
    Precision { field: &'static str, value: Decimal },
}

/// A single OHLCV data point for one symbol and one interval bucket.
///
/// The primary key is `(symbol, open_time, close_time)`; inserting the same key
/// twice is a no-op at the store. Aggregation never edits a `Kline`, it derives
/// a new one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Kline {
    /// Trading pair as the exchange names it (e.g. "BTCUSDT").
    pub symbol: String,

    /// Bucket start, epoch milliseconds (UTC).
    pub open_time: i64,

    /// Last millisecond covered by the candle, epoch milliseconds (UTC).
    pub close_time: i64,

    pub open_price: Decimal,
    pub high_price: Decimal,
    pub low_price: Decimal,
    pub close_price: Decimal,

    /// Base-asset volume traded during the candle.
    pub volume: Decimal,

    /// Quote-asset volume traded during the candle.
    pub quote_asset_volume: Decimal,

    pub number_of_trades: u64,

    /// Base-asset volume bought by takers.
    pub taker_buy_base_volume: Decimal,

    /// Quote-asset volume bought by takers.
    pub taker_buy_quote_volume: Decimal,
}

impl Kline {
    /// Checks the record invariants: non-empty symbol, non-negative
    /// `open_time < close_time`, and every decimal within 20.8 digits.
    pub fn validate(&self) -> Result<(), KlineError> {
        if self.symbol.trim().is_empty() {
            return Err(KlineError::EmptySymbol);
        }
        if self.open_time < 0 {
            return Err(KlineError::NegativeTime {
                field: "open_time",
                value: self.open_time,
            });
        }
        if self.close_time < 0 {
            return Err(KlineError::NegativeTime {
                field: "close_time",
                value: self.close_time,
            });
        }
        if self.open_time >= self.close_time {
            return Err(KlineError::InvertedTimes {
                open_time: self.open_time,
                close_time: self.close_time,
            });
        }
        for (field, value) in self.decimal_fields() {
            check_precision(field, value)?;
        }
        Ok(())
    }

    /// Milliseconds between open and close time.
    pub fn span_millis(&self) -> i64 {
        self.close_time - self.open_time
    }

    fn decimal_fields(&self) -> [(&'static str, Decimal); 8] {
        [
            ("open_price", self.open_price),
            ("high_price", self.high_price),
            ("low_price", self.low_price),
            ("close_price", self.close_price),
            ("volume", self.volume),
            ("quote_asset_volume", self.quote_asset_volume),
            ("taker_buy_base_volume", self.taker_buy_base_volume),
            ("taker_buy_quote_volume", self.taker_buy_quote_volume),
        ]
    }
}

/// Rejects values with more than 8 significant fractional digits or 20 integer digits.
pub fn check_precision(field: &'static str, value: Decimal) -> Result<(), KlineError> {
    let integer_limit = Decimal::from_i128_with_scale(10_i128.pow(MAX_INTEGER_DIGITS), 0);
    if value.normalize().scale() > MAX_FRACTION_DIGITS || value.trunc().abs() >= integer_limit {
        return Err(KlineError::Precision { field, value });
    }
    Ok(())
}
