//! Resampling klines into a coarser interval.
//!
//! Records are grouped by `target.bucket_start(open_time)`. Each group
//! becomes one new record:
//!
//! | field | rule |
//! |---|---|
//! | `open_time` | bucket start |
//! | `close_time` | last member's `close_time` |
//! | `open_price` | first member's `open_price` |
//! | `close_price` | last member's `close_price` |
//! | `high_price` / `low_price` | max / min over the group |
//! | the four volumes | exact decimal sum |
//! | `number_of_trades` | integer sum |
//!
//! "First" and "last" are the members with the smallest and largest
//! `open_time`, so input order does not matter. Output is ordered by bucket
//! start. Inputs are never modified.

use std::collections::BTreeMap;

use kline_ingestor::models::{interval::Interval, kline::Kline};
use rust_decimal::Decimal;
use thiserror::Error;

/// Aggregation preconditions that did not hold.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AggregateError {
    /// Target buckets are narrower than the input candles.
    #[error("target interval {target} is finer than the {native_span_millis}ms input candles")]
    FinerThanInput {
        /// Requested interval.
        target: Interval,
        /// Width of the offending input candle.
        native_span_millis: i64,
    },

    /// A decimal sum left the representable range.
    #[error("{field} overflowed while summing bucket {bucket_start}")]
    Overflow {
        /// Summed field.
        field: &'static str,
        /// Bucket being reduced.
        bucket_start: i64,
    },
}

struct Bucket<'a> {
    first: &'a Kline,
    last: &'a Kline,
    high: Decimal,
    low: Decimal,
    volume: Decimal,
    quote_asset_volume: Decimal,
    taker_buy_base_volume: Decimal,
    taker_buy_quote_volume: Decimal,
    trades: u64,
}

impl<'a> Bucket<'a> {
    fn open(k: &'a Kline) -> Self {
        Self {
            first: k,
            last: k,
            high: k.high_price,
            low: k.low_price,
            volume: k.volume,
            quote_asset_volume: k.quote_asset_volume,
            taker_buy_base_volume: k.taker_buy_base_volume,
            taker_buy_quote_volume: k.taker_buy_quote_volume,
            trades: k.number_of_trades,
        }
    }

    fn add(&mut self, k: &'a Kline, bucket_start: i64) -> Result<(), AggregateError> {
        if k.open_time < self.first.open_time {
            self.first = k;
        }
        if k.open_time > self.last.open_time {
            self.last = k;
        }
        self.high = self.high.max(k.high_price);
        self.low = self.low.min(k.low_price);

        let sum = |field: &'static str, acc: Decimal, v: Decimal| {
            acc.checked_add(v)
                .ok_or(AggregateError::Overflow { field, bucket_start })
        };
        self.volume = sum("volume", self.volume, k.volume)?;
        self.quote_asset_volume = sum("quote_asset_volume", self.quote_asset_volume, k.quote_asset_volume)?;
        self.taker_buy_base_volume =
            sum("taker_buy_base_volume", self.taker_buy_base_volume, k.taker_buy_base_volume)?;
        self.taker_buy_quote_volume =
            sum("taker_buy_quote_volume", self.taker_buy_quote_volume, k.taker_buy_quote_volume)?;
        self.trades = self
            .trades
            .checked_add(k.number_of_trades)
            .ok_or(AggregateError::Overflow {
                field: "number_of_trades",
                bucket_start,
            })?;
        Ok(())
    }

    fn finish(self, bucket_start: i64) -> Kline {
        Kline {
            symbol: self.first.symbol.clone(),
            open_time: bucket_start,
            close_time: self.last.close_time,
            open_price: self.first.open_price,
            high_price: self.high,
            low_price: self.low,
            close_price: self.last.close_price,
            volume: self.volume,
            quote_asset_volume: self.quote_asset_volume,
            number_of_trades: self.trades,
            taker_buy_base_volume: self.taker_buy_base_volume,
            taker_buy_quote_volume: self.taker_buy_quote_volume,
        }
    }
}

/// Resamples `records` into `target` buckets.
///
/// Empty input gives empty output. Every record must be no wider than
/// `target` (`close_time - open_time + 1 <= target` width); all records are
/// assumed to share one symbol.
pub fn aggregate(records: &[Kline], target: Interval) -> Result<Vec<Kline>, AggregateError> {
    let width = target.duration_millis();
    let mut buckets: BTreeMap<i64, Bucket<'_>> = BTreeMap::new();

    for k in records {
        let native_span_millis = k.span_millis() + 1;
        if native_span_millis > width {
            return Err(AggregateError::FinerThanInput {
                target,
                native_span_millis,
            });
        }

        let bucket_start = target.bucket_start(k.open_time);
        match buckets.get_mut(&bucket_start) {
            Some(bucket) => bucket.add(k, bucket_start)?,
            None => {
                buckets.insert(bucket_start, Bucket::open(k));
            }
        }
    }

    Ok(buckets
        .into_iter()
        .map(|(start, bucket)| bucket.finish(start))
        .collect())
}
