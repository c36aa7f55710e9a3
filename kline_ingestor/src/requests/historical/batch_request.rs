//! Batch loading: split a range into exchange-sized calls, fetch them
//! concurrently and write each one to a sink.
//!
//! A load with range `[start, end)` against a source whose calls cover
//! `span = base_interval * max_records_per_call` milliseconds runs
//! `ceil((end - start) / span)` sub-range tasks, refusing ranges that would
//! need more than `MAX_PARTITIONS`. At most `max_concurrency` are spawned at
//! once. Each task fetches its sub-range (bounded by a timeout) and
//! then issues exactly one sink write with the records it got back, even if
//! there were none.
//!
//! A failing sub-range never cancels its siblings. The caller gets a
//! [`LoadReport`] listing every sub-range in range order with either its
//! write counts or the error that stopped it.

use std::{num::NonZeroUsize, sync::Arc, time::Duration};

use thiserror::Error;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::{
    io::sink::{KlineSink, SinkError},
    models::time_range::{TimeRange, TimeRangeError},
    providers::{ExchangeSource, ProviderError},
};

pub const DEFAULT_MAX_CONCURRENCY: NonZeroUsize = NonZeroUsize::new(8).unwrap();
pub const DEFAULT_SUB_RANGE_TIMEOUT: Duration = Duration::from_secs(30);

/// Errors that stop a load before any sub-range runs.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("symbol must not be empty")]
    EmptySymbol,

    #[error("invalid load range: {0}")]
    Range(#[from] TimeRangeError),
}

/// Why a single sub-range produced no write.
#[derive(Debug, Error)]
pub enum SubRangeError {
    #[error("fetch failed: {0}")]
    Fetch(#[from] ProviderError),

    #[error("fetch timed out after {0:?}")]
    Timeout(Duration),

    #[error("write failed: {0}")]
    Sink(#[from] SinkError),

    #[error("sub-range task did not finish: {0}")]
    Aborted(String),
}

impl SubRangeError {
    /// True for the fetch failure class (transport, bad response, timeout).
    pub fn is_fetch_failure(&self) -> bool {
        matches!(self, SubRangeError::Fetch(_) | SubRangeError::Timeout(_))
    }
}

/// Counts for a sub-range whose write went through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SubRangeWrite {
    /// Records parsed from the exchange response.
    pub fetched: usize,
    /// Records the sink reported as new.
    pub inserted: usize,
}

#[derive(Debug)]
pub struct SubRangeOutcome {
    pub range: TimeRange,
    pub result: Result<SubRangeWrite, SubRangeError>,
}

/// Per-sub-range summary of one load.
#[derive(Debug)]
pub struct LoadReport {
    pub symbol: String,
    pub exchange: String,
    pub range: TimeRange,
    /// One entry per sub-range, ordered by `range.start`.
    pub outcomes: Vec<SubRangeOutcome>,
}

impl LoadReport {
    /// Every sub-range fetched and wrote successfully.
    pub fn is_complete(&self) -> bool {
        self.outcomes.iter().all(|o| o.result.is_ok())
    }

    pub fn failed(&self) -> impl Iterator<Item = &SubRangeOutcome> {
        self.outcomes.iter().filter(|o| o.result.is_err())
    }

    pub fn records_fetched(&self) -> usize {
        self.writes().map(|w| w.fetched).sum()
    }

    pub fn records_written(&self) -> usize {
        self.writes().map(|w| w.inserted).sum()
    }

    fn writes(&self) -> impl Iterator<Item = &SubRangeWrite> {
        self.outcomes.iter().filter_map(|o| o.result.as_ref().ok())
    }
}

/// Drives concurrent fetch + write for a range.
#[derive(Clone)]
pub struct BatchLoader {
    sink: Arc<dyn KlineSink>,
    max_concurrency: NonZeroUsize,
    sub_range_timeout: Duration,
}

impl BatchLoader {
    pub fn new(sink: Arc<dyn KlineSink>) -> Self {
        Self {
            sink,
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
            sub_range_timeout: DEFAULT_SUB_RANGE_TIMEOUT,
        }
    }

    pub fn with_max_concurrency(mut self, max_concurrency: NonZeroUsize) -> Self {
        self.max_concurrency = max_concurrency;
        self
    }

    pub fn with_sub_range_timeout(mut self, timeout: Duration) -> Self {
        self.sub_range_timeout = timeout;
        self
    }

    /// Loads `[start, end)` for `symbol` from `source` into the sink.
    ///
    /// The symbol is expected to be known to `source`; that check belongs to
    /// the caller. Returns once every sub-range task has finished.
    pub async fn load(
        &self,
        symbol: &str,
        start: i64,
        end: i64,
        source: Arc<dyn ExchangeSource>,
    ) -> Result<LoadReport, LoadError> {
        let symbol = symbol.trim();
        if symbol.is_empty() {
            return Err(LoadError::EmptySymbol);
        }
        let range = TimeRange::new(start, end)?;
        let parts = range.partition(source.time_span_per_call())?;

        info!(
            exchange = source.name(),
            symbol,
            start,
            end,
            sub_ranges = parts.len(),
            max_concurrency = self.max_concurrency.get(),
            "starting batch load"
        );

        // tasks are spawned only as slots free up
        let limit = self.max_concurrency.get();
        let mut results: Vec<Option<Result<SubRangeWrite, SubRangeError>>> =
            parts.iter().map(|_| None).collect();
        let mut tasks = JoinSet::new();
        for (index, part) in parts.iter().copied().enumerate() {
            while tasks.len() >= limit {
                if let Some(joined) = tasks.join_next().await {
                    collect(symbol, joined, &mut results);
                }
            }

            let source = Arc::clone(&source);
            let sink = Arc::clone(&self.sink);
            let symbol = symbol.to_string();
            let timeout = self.sub_range_timeout;
            tasks.spawn(async move {
                let result =
                    run_sub_range(&symbol, part, source.as_ref(), sink.as_ref(), timeout).await;
                (index, result)
            });
        }
        while let Some(joined) = tasks.join_next().await {
            collect(symbol, joined, &mut results);
        }

        let outcomes: Vec<SubRangeOutcome> = parts
            .into_iter()
            .zip(results)
            .map(|(range, result)| SubRangeOutcome {
                range,
                result: result.unwrap_or_else(|| {
                    Err(SubRangeError::Aborted("task panicked or was cancelled".to_string()))
                }),
            })
            .collect();

        let report = LoadReport {
            symbol: symbol.to_string(),
            exchange: source.name().to_string(),
            range,
            outcomes,
        };
        info!(
            exchange = %report.exchange,
            symbol,
            sub_ranges = report.outcomes.len(),
            failed = report.failed().count(),
            fetched = report.records_fetched(),
            written = report.records_written(),
            "batch load finished"
        );
        Ok(report)
    }
}

type Joined = Result<(usize, Result<SubRangeWrite, SubRangeError>), tokio::task::JoinError>;

fn collect(
    symbol: &str,
    joined: Joined,
    results: &mut [Option<Result<SubRangeWrite, SubRangeError>>],
) {
    match joined {
        Ok((index, result)) => results[index] = Some(result),
        Err(join_err) => warn!(symbol, error = %join_err, "sub-range task failed to join"),
    }
}

async fn run_sub_range(
    symbol: &str,
    range: TimeRange,
    source: &dyn ExchangeSource,
    sink: &dyn KlineSink,
    timeout: Duration,
) -> Result<SubRangeWrite, SubRangeError> {
    debug!(symbol, start = range.start, end = range.end, "fetching sub-range");

    let fetched = tokio::time::timeout(timeout, source.fetch_klines(symbol, range)).await;
    let klines = match fetched {
        Ok(Ok(klines)) => klines,
        Ok(Err(err)) => {
            warn!(symbol, start = range.start, end = range.end, error = %err, "sub-range fetch failed");
            return Err(err.into());
        }
        Err(_) => {
            warn!(symbol, start = range.start, end = range.end, ?timeout, "sub-range fetch timed out");
            return Err(SubRangeError::Timeout(timeout));
        }
    };

    let inserted = sink.write(&klines).await.inspect_err(|err| {
        warn!(symbol, start = range.start, end = range.end, error = %err, "sub-range write failed");
    })?;

    debug!(symbol, start = range.start, fetched = klines.len(), inserted, "sub-range stored");
    Ok(SubRangeWrite {
        fetched: klines.len(),
        inserted,
    })
}
