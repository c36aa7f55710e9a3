//! Interval catalog and bucket alignment.
//!
//! An [`Interval`] is one of the fixed-width candle sizes the pipeline knows
//! about. Every interval has a short label (`"1m"`, `"5m"`, `"1h"`, `"1d"`) and a
//! width in milliseconds. Bucket math is plain integer arithmetic on epoch
//! milliseconds (UTC), anchored at the Unix epoch:
//!
//! ```
//! use kline_ingestor::models::interval::Interval;
//!
//! let hour: Interval = "1h".parse().unwrap();
//! assert_eq!(hour.duration_millis(), 3_600_000);
//! assert_eq!(hour.bucket_start(3_600_001), 3_600_000);
//! assert_eq!(hour.bucket_end_exclusive(3_600_001), Some(7_200_000));
//! assert_eq!(hour.align_up(i64::MAX), None);
//! ```

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Milliseconds in a minute.
pub const MILLIS_PER_MINUTE: i64 = 60_000;
/// Milliseconds in an hour.
pub const MILLIS_PER_HOUR: i64 = 60 * MILLIS_PER_MINUTE;
/// Milliseconds in a day.
pub const MILLIS_PER_DAY: i64 = 24 * MILLIS_PER_HOUR;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum IntervalError {
    #[error("Unsupported interval: {0}")]
    Unsupported(String),
}

/// Candle width. The catalog is closed; unknown labels are rejected by [`FromStr`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Interval {
    OneMinute,
    FiveMinutes,
    OneHour,
    OneDay,
}

impl Interval {
    /// Every interval in the catalog, finest first.
    pub const ALL: [Interval; 4] = [
        Interval::OneMinute,
        Interval::FiveMinutes,
        Interval::OneHour,
        Interval::OneDay,
    ];

    pub const fn label(self) -> &'static str {
        match self {
            Interval::OneMinute => "1m",
            Interval::FiveMinutes => "5m",
            Interval::OneHour => "1h",
            Interval::OneDay => "1d",
        }
    }

    /// Width of one bucket in milliseconds. Always > 0.
    pub const fn duration_millis(self) -> i64 {
        match self {
            Interval::OneMinute => MILLIS_PER_MINUTE,
            Interval::FiveMinutes => 5 * MILLIS_PER_MINUTE,
            Interval::OneHour => MILLIS_PER_HOUR,
            Interval::OneDay => MILLIS_PER_DAY,
        }
    }

    /// Start of the bucket containing `ts_millis`: `floor(ts / width) * width`.
    pub fn bucket_start(self, ts_millis: i64) -> i64 {
        let width = self.duration_millis();
        ts_millis.div_euclid(width) * width
    }

    /// Exclusive end of the bucket containing `ts_millis`, or `None` when
    /// that boundary does not fit in an `i64`.
    pub fn bucket_end_exclusive(self, ts_millis: i64) -> Option<i64> {
        self.bucket_start(ts_millis).checked_add(self.duration_millis())
    }

    /// Smallest bucket boundary that is `>= ts_millis`, or `None` when that
    /// boundary does not fit in an `i64`.
    ///
    /// A timestamp already on a boundary is returned unchanged, so a range
    /// ending exactly on a boundary never grows a trailing empty bucket.
    pub fn align_up(self, ts_millis: i64) -> Option<i64> {
        let start = self.bucket_start(ts_millis);
        if start < ts_millis {
            start.checked_add(self.duration_millis())
        } else {
            Some(start)
        }
    }

    /// Looks up a label in the catalog.
    pub fn from_label(label: &str) -> Result<Self, IntervalError> {
        Interval::ALL
            .into_iter()
            .find(|i| i.label() == label)
            .ok_or_else(|| IntervalError::Unsupported(label.to_string()))
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Interval {
    type Err = IntervalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Interval::from_label(s.trim())
    }
}

impl TryFrom<String> for Interval {
    type Error = IntervalError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Interval> for String {
    fn from(value: Interval) -> Self {
        value.label().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn labels_round_trip() {
        for interval in Interval::ALL {
            assert_eq!(interval.label().parse::<Interval>().unwrap(), interval);
            assert_eq!(interval.to_string(), interval.label());
        }
    }

    #[test]
    fn durations_match_catalog() {
        assert_eq!(Interval::OneMinute.duration_millis(), 60_000);
        assert_eq!(Interval::FiveMinutes.duration_millis(), 300_000);
        assert_eq!(Interval::OneHour.duration_millis(), 3_600_000);
        assert_eq!(Interval::OneDay.duration_millis(), 86_400_000);
    }

    #[test]
    fn unknown_label_is_unsupported() {
        assert_eq!(
            "2h".parse::<Interval>(),
            Err(IntervalError::Unsupported("2h".into()))
        );
        assert!(Interval::from_label("").is_err());
        // labels are case sensitive: "1M" is not "1m"
        assert!(Interval::from_label("1M").is_err());
    }

    #[test]
    fn bucket_alignment_floors() {
        let m5 = Interval::FiveMinutes;
        assert_eq!(m5.bucket_start(0), 0);
        assert_eq!(m5.bucket_start(299_999), 0);
        assert_eq!(m5.bucket_start(300_000), 300_000);
        assert_eq!(m5.bucket_end_exclusive(300_000), Some(600_000));
    }

    #[test]
    fn align_up_keeps_boundaries() {
        let m1 = Interval::OneMinute;
        assert_eq!(m1.align_up(120_000), Some(120_000));
        assert_eq!(m1.align_up(120_001), Some(180_000));
        assert_eq!(m1.align_up(0), Some(0));
    }

    #[test]
    fn boundaries_past_i64_max_are_none() {
        for interval in Interval::ALL {
            assert_eq!(interval.align_up(i64::MAX - 1), None);
            assert_eq!(interval.bucket_end_exclusive(i64::MAX), None);
        }
        let last = Interval::OneDay.bucket_start(i64::MAX);
        assert_eq!(Interval::OneDay.align_up(last), Some(last));
    }

    #[test]
    fn serde_uses_labels() {
        let json = serde_json::to_string(&Interval::OneHour).unwrap();
        assert_eq!(json, "\"1h\"");
        let back: Interval = serde_json::from_str("\"5m\"").unwrap();
        assert_eq!(back, Interval::FiveMinutes);
        assert!(serde_json::from_str::<Interval>("\"7m\"").is_err());
    }
}
