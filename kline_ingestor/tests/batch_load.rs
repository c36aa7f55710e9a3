use std::{
    collections::{BTreeSet, HashSet},
    num::NonZeroUsize,
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use kline_ingestor::{
    io::sink::{KlineSink, SinkError},
    models::{
        interval::Interval,
        kline::Kline,
        time_range::{MAX_PARTITIONS, MAX_TIMESTAMP_MILLIS, TimeRange, TimeRangeError},
    },
    providers::{ExchangeSource, ProviderError},
    requests::historical::{BatchLoader, LoadError, SubRangeError},
};
use rust_decimal::Decimal;

fn minute_kline(symbol: &str, open_time: i64) -> Kline {
    Kline {
        symbol: symbol.to_string(),
        open_time,
        close_time: open_time + 59_999,
        open_price: Decimal::ONE,
        high_price: Decimal::TWO,
        low_price: Decimal::ONE,
        close_price: Decimal::TWO,
        volume: Decimal::ONE,
        quote_asset_volume: Decimal::TEN,
        number_of_trades: 1,
        taker_buy_base_volume: Decimal::ZERO,
        taker_buy_quote_volume: Decimal::ZERO,
    }
}

/// Scripted one-minute source. Returns one kline per minute of the range
/// unless the sub-range start is listed as failing or hanging.
#[derive(Default)]
struct ScriptedSource {
    limit: u32,
    delay: Duration,
    empty: bool,
    fail_at: HashSet<i64>,
    hang_at: HashSet<i64>,
    calls: Mutex<Vec<TimeRange>>,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

impl ScriptedSource {
    fn with_limit(limit: u32) -> Self {
        Self {
            limit,
            ..Default::default()
        }
    }
}

#[async_trait]
impl ExchangeSource for ScriptedSource {
    fn name(&self) -> &str {
        "scripted"
    }

    fn base_interval(&self) -> Interval {
        Interval::OneMinute
    }

    fn max_records_per_call(&self) -> u32 {
        self.limit
    }

    async fn list_symbols(&self) -> Result<BTreeSet<String>, ProviderError> {
        Ok(BTreeSet::from(["BTCUSDT".to_string()]))
    }

    async fn fetch_klines(
        &self,
        symbol: &str,
        range: TimeRange,
    ) -> Result<Vec<Kline>, ProviderError> {
        self.calls.lock().unwrap().push(range);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);

        if self.hang_at.contains(&range.start) {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        }
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if self.fail_at.contains(&range.start) {
            return Err(ProviderError::Api {
                status: 503,
                message: "try again later".into(),
            });
        }
        if self.empty {
            return Ok(vec![]);
        }
        Ok((range.start..range.end)
            .step_by(60_000)
            .map(|t| minute_kline(symbol, t))
            .collect())
    }
}

#[derive(Default)]
struct RecordingSink {
    writes: Mutex<Vec<Vec<Kline>>>,
}

impl RecordingSink {
    fn write_count(&self) -> usize {
        self.writes.lock().unwrap().len()
    }
}

#[async_trait]
impl KlineSink for RecordingSink {
    async fn write(&self, data: &[Kline]) -> Result<usize, SinkError> {
        self.writes.lock().unwrap().push(data.to_vec());
        Ok(data.len())
    }
}

#[tokio::test]
async fn twenty_minutes_fit_in_one_call() {
    let sink = Arc::new(RecordingSink::default());
    let source = Arc::new(ScriptedSource::with_limit(500));
    let loader = BatchLoader::new(sink.clone());

    let report = loader.load("BTCUSDT", 0, 1_200_000, source.clone()).await.unwrap();

    assert!(report.is_complete());
    assert_eq!(report.outcomes.len(), 1);
    assert_eq!(report.outcomes[0].range, TimeRange { start: 0, end: 1_200_000 });
    assert_eq!(report.records_fetched(), 20);
    assert_eq!(report.records_written(), 20);
    assert_eq!(sink.write_count(), 1);
    assert_eq!(*source.calls.lock().unwrap(), vec![TimeRange { start: 0, end: 1_200_000 }]);
}

#[tokio::test]
async fn failed_sub_range_does_not_stop_siblings() {
    let sink = Arc::new(RecordingSink::default());
    let source = Arc::new(ScriptedSource {
        fail_at: HashSet::from([1_200_000]),
        ..ScriptedSource::with_limit(10)
    });
    let loader = BatchLoader::new(sink.clone());

    // 50 minutes in 10-minute calls
    let report = loader.load("BTCUSDT", 0, 3_000_000, source).await.unwrap();

    assert!(!report.is_complete());
    assert_eq!(report.outcomes.len(), 5);
    let failed: Vec<_> = report.failed().collect();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].range.start, 1_200_000);
    assert!(matches!(
        failed[0].result,
        Err(SubRangeError::Fetch(ProviderError::Api { status: 503, .. }))
    ));
    assert_eq!(report.records_written(), 40);
    assert_eq!(sink.write_count(), 4);

    let starts: Vec<i64> = report.outcomes.iter().map(|o| o.range.start).collect();
    assert_eq!(starts, vec![0, 600_000, 1_200_000, 1_800_000, 2_400_000]);
}

#[tokio::test(start_paused = true)]
async fn in_flight_fetches_respect_the_bound() {
    let sink = Arc::new(RecordingSink::default());
    let source = Arc::new(ScriptedSource {
        delay: Duration::from_millis(50),
        ..ScriptedSource::with_limit(1)
    });
    let loader = BatchLoader::new(sink.clone()).with_max_concurrency(NonZeroUsize::new(3).unwrap());

    let report = loader.load("BTCUSDT", 0, 1_200_000, source.clone()).await.unwrap();

    assert!(report.is_complete());
    assert_eq!(report.outcomes.len(), 20);
    assert_eq!(source.peak.load(Ordering::SeqCst), 3);
    assert_eq!(sink.write_count(), 20);
}

#[tokio::test(start_paused = true)]
async fn slow_sub_range_times_out_as_a_fetch_failure() {
    let sink = Arc::new(RecordingSink::default());
    let source = Arc::new(ScriptedSource {
        hang_at: HashSet::from([600_000]),
        ..ScriptedSource::with_limit(10)
    });
    let loader = BatchLoader::new(sink.clone()).with_sub_range_timeout(Duration::from_secs(30));

    let report = loader.load("BTCUSDT", 0, 1_800_000, source).await.unwrap();

    let failed: Vec<_> = report.failed().collect();
    assert_eq!(failed.len(), 1);
    let err = failed[0].result.as_ref().unwrap_err();
    assert!(matches!(err, SubRangeError::Timeout(d) if *d == Duration::from_secs(30)));
    assert!(err.is_fetch_failure());
    assert_eq!(sink.write_count(), 2);
}

#[tokio::test]
async fn empty_response_still_writes_once() {
    let sink = Arc::new(RecordingSink::default());
    let source = Arc::new(ScriptedSource {
        empty: true,
        ..ScriptedSource::with_limit(500)
    });
    let loader = BatchLoader::new(sink.clone());

    let report = loader.load("BTCUSDT", 0, 600_000, source).await.unwrap();

    assert!(report.is_complete());
    assert_eq!(report.records_written(), 0);
    let writes = sink.writes.lock().unwrap();
    assert_eq!(writes.len(), 1);
    assert!(writes[0].is_empty());
}

#[tokio::test]
async fn rejects_bad_input_before_fetching() {
    let sink = Arc::new(RecordingSink::default());
    let source = Arc::new(ScriptedSource::with_limit(500));
    let loader = BatchLoader::new(sink.clone());

    let inverted = loader.load("BTCUSDT", 10, 10, source.clone()).await;
    assert!(matches!(inverted, Err(LoadError::Range(_))));

    let blank = loader.load("  ", 0, 10, source.clone()).await;
    assert!(matches!(blank, Err(LoadError::EmptySymbol)));

    assert!(source.calls.lock().unwrap().is_empty());
    assert_eq!(sink.write_count(), 0);
}

#[tokio::test]
async fn mistyped_far_future_end_is_refused_up_front() {
    let sink = Arc::new(RecordingSink::default());
    let source = Arc::new(ScriptedSource::with_limit(500));
    let loader = BatchLoader::new(sink.clone());

    let past_max = loader.load("BTCUSDT", 0, i64::MAX, source.clone()).await;
    assert!(matches!(
        past_max,
        Err(LoadError::Range(TimeRangeError::EndTooLate { .. }))
    ));

    // year 9999 in 500-minute calls is millions of sub-ranges
    let huge = loader
        .load("BTCUSDT", 0, MAX_TIMESTAMP_MILLIS, source.clone())
        .await;
    assert!(matches!(
        huge,
        Err(LoadError::Range(TimeRangeError::TooManyParts { max: MAX_PARTITIONS, .. }))
    ));

    assert!(source.calls.lock().unwrap().is_empty());
    assert_eq!(sink.write_count(), 0);
}
