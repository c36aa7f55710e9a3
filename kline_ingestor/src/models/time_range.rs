//! Half-open millisecond ranges and the partitioning used by batch loads.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Latest accepted range end: 10000-01-01T00:00:00Z, exclusive.
pub const MAX_TIMESTAMP_MILLIS: i64 = 253_402_300_800_000;

/// Most pieces [`TimeRange::partition`] will produce for one range.
pub const MAX_PARTITIONS: usize = 100_000;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TimeRangeError {
    #[error("start time must be non-negative, got {0}")]
    NegativeStart(i64),

    #[error("start time {start} must be before end time {end}")]
    Empty { start: i64, end: i64 },

    #[error("end time {end} is past the latest supported timestamp {max}")]
    EndTooLate { end: i64, max: i64 },

    #[error("time span per call must be positive, got {0}")]
    NonPositiveSpan(i64),

    #[error("range splits into {count} pieces, more than the {max} allowed")]
    TooManyParts { count: i64, max: usize },
}

/// `[start, end)` in epoch milliseconds (UTC).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: i64,
    pub end: i64,
}

impl TimeRange {
    /// Builds a range, enforcing `0 <= start < end <= MAX_TIMESTAMP_MILLIS`.
    pub fn new(start: i64, end: i64) -> Result<Self, TimeRangeError> {
        if start < 0 {
            return Err(TimeRangeError::NegativeStart(start));
        }
        if start >= end {
            return Err(TimeRangeError::Empty { start, end });
        }
        if end > MAX_TIMESTAMP_MILLIS {
            return Err(TimeRangeError::EndTooLate {
                end,
                max: MAX_TIMESTAMP_MILLIS,
            });
        }
        Ok(Self { start, end })
    }

    pub fn len_millis(&self) -> i64 {
        self.end - self.start
    }

    pub fn contains(&self, ts_millis: i64) -> bool {
        self.start <= ts_millis && ts_millis < self.end
    }

    /// Splits the range into `ceil(len / span)` contiguous pieces of `span`
    /// milliseconds each. The last piece is clamped to `end`. More than
    /// [`MAX_PARTITIONS`] pieces is an error.
    ///
    /// ```
    /// use kline_ingestor::models::time_range::TimeRange;
    ///
    /// let parts = TimeRange::new(0, 250).unwrap().partition(100).unwrap();
    /// let bounds: Vec<_> = parts.iter().map(|r| (r.start, r.end)).collect();
    /// assert_eq!(bounds, vec![(0, 100), (100, 200), (200, 250)]);
    /// ```
    pub fn partition(&self, span_millis: i64) -> Result<Vec<TimeRange>, TimeRangeError> {
        if span_millis <= 0 {
            return Err(TimeRangeError::NonPositiveSpan(span_millis));
        }
        let len = self.len_millis();
        let count = len / span_millis + i64::from(len % span_millis != 0);
        let capacity = usize::try_from(count)
            .ok()
            .filter(|&n| n <= MAX_PARTITIONS)
            .ok_or(TimeRangeError::TooManyParts {
                count,
                max: MAX_PARTITIONS,
            })?;

        let mut parts = Vec::with_capacity(capacity);
        for i in 0..count {
            let start = self.start + i * span_millis;
            let end = start.saturating_add(span_millis).min(self.end);
            parts.push(TimeRange { start, end });
        }
        Ok(parts)
    }
}
