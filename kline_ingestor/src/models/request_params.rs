use serde::{Deserialize, Serialize};

use crate::models::{interval::Interval, time_range::TimeRange};

/// Exchange-agnostic parameters for one kline request.
///
/// A request covers exactly one sub-range produced by the batch partitioner,
/// so `range.len_millis()` never exceeds `interval.duration_millis() * limit`.
/// Each [`ExchangeSource`](crate::providers::ExchangeSource) maps these onto its
/// own query string.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct KlineRequest {
    /// Trading pair, e.g. `"BTCUSDT"`.
    pub symbol: String,

    /// Candle width to request.
    pub interval: Interval,

    /// Requested window, start inclusive and end exclusive.
    pub range: TimeRange,

    /// Maximum number of records the exchange should return.
    pub limit: u32,
}
