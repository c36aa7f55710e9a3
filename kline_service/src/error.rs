use kline_ingestor::{
    models::{interval::IntervalError, time_range::TimeRangeError},
    providers::ProviderError,
    requests::historical::LoadError,
};
use thiserror::Error;

use crate::aggregate::AggregateError;

/// Errors surfaced by [`KlineService`](crate::service::KlineService).
#[derive(Debug, Error)]
pub enum ServiceError {
    /// Bad caller input: empty or inverted range, unknown exchange or symbol.
    #[error("invalid input: {0}")]
    InputInvalid(String),

    /// The interval label is not in the catalog.
    #[error(transparent)]
    UnsupportedInterval(#[from] IntervalError),

    /// Neither cache nor store hold any record for the range.
    #[error("no klines for {symbol} in [{start}, {end})")]
    NoData {
        /// Requested symbol.
        symbol: String,
        /// Requested start.
        start: i64,
        /// Requested end.
        end: i64,
    },

    /// The exchange could not be reached or answered badly (symbol listing).
    #[error("exchange error: {0}")]
    Provider(#[from] ProviderError),

    /// The batch loader refused the request.
    #[error(transparent)]
    Load(#[from] LoadError),

    /// Aggregation precondition or overflow.
    #[error(transparent)]
    Aggregate(#[from] AggregateError),

    /// Store or cache failure.
    #[error("storage error: {0:#}")]
    Storage(anyhow::Error),
}

impl From<TimeRangeError> for ServiceError {
    fn from(err: TimeRangeError) -> Self {
        ServiceError::InputInvalid(err.to_string())
    }
}
