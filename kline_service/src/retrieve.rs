//! Cache-aside retrieval of base-interval klines.
//!
//! For a query `[start, end)` at interval `I` (width `d`):
//!
//! 1. `aligned_start = bucket_start(start)`, `aligned_end = align_up(end)`:
//!    the bucket containing `end` is included unless `end` already sits on
//!    a boundary.
//! 2. `expected = (aligned_end - aligned_start) / d`.
//! 3. Read the cache namespace for keys in `[aligned_start, aligned_end]`
//!    (inclusive on both ends).
//! 4. If fewer than `expected` entries came back, query the store for
//!    `open_time >= aligned_start AND close_time <= aligned_end`, write every
//!    row back into the cache, reset the namespace TTL, and return the union
//!    keyed by `open_time` with store rows winning collisions.
//! 5. Otherwise return the cached entries as they are.
//!
//! Coverage is judged by count only. A namespace holding `expected` entries
//! for the wrong buckets is treated as complete and no store query runs.
//!
//! Concurrent misses on one namespace are collapsed: the first caller runs
//! the store query while the others wait, then re-read the now backfilled
//! cache. A namespace's gate is dropped once nobody is waiting on it.

use std::{
    collections::{BTreeMap, HashMap},
    sync::{Arc, Mutex},
    time::Duration,
};

use anyhow::{Context, anyhow};
use kline_ingestor::models::{interval::Interval, kline::Kline, time_range::TimeRange};
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, info};

use crate::{
    cache::{CacheIndex, namespace},
    repo::KlineRepo,
};

/// Default cache lifetime after a backfill.
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(3600);

/// A query range snapped to bucket boundaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AlignedRange {
    /// Start of the bucket containing the query start.
    pub start: i64,
    /// First boundary at or after the query end.
    pub end: i64,
    /// Buckets a complete range holds.
    pub expected: usize,
}

/// Snaps `range` to `interval` buckets.
pub fn align_query(interval: Interval, range: TimeRange) -> anyhow::Result<AlignedRange> {
    let aligned_start = interval.bucket_start(range.start);
    let aligned_end = interval
        .align_up(range.end)
        .with_context(|| format!("end {} cannot be aligned to {interval}", range.end))?;
    let expected = (aligned_end - aligned_start) / interval.duration_millis();
    Ok(AlignedRange {
        start: aligned_start,
        end: aligned_end,
        expected: usize::try_from(expected)?,
    })
}

/// Reconciles the cache index against the durable store.
pub struct CacheAsideRetriever {
    repo: Arc<dyn KlineRepo>,
    cache: Arc<dyn CacheIndex>,
    interval: Interval,
    ttl: Duration,
    in_flight: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl CacheAsideRetriever {
    /// Retriever for records stored at `interval`.
    pub fn new(repo: Arc<dyn KlineRepo>, cache: Arc<dyn CacheIndex>, interval: Interval) -> Self {
        Self {
            repo,
            cache,
            interval,
            ttl: DEFAULT_CACHE_TTL,
            in_flight: Mutex::new(HashMap::new()),
        }
    }

    /// Overrides the TTL set after each backfill.
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Interval the retriever reads at.
    pub fn interval(&self) -> Interval {
        self.interval
    }

    /// Ordered, de-duplicated records for `symbol` covering `[start, end)`.
    ///
    /// May be empty when neither cache nor store hold anything for the range.
    pub async fn retrieve(&self, symbol: &str, start: i64, end: i64) -> anyhow::Result<Vec<Kline>> {
        let range = TimeRange::new(start, end).context("invalid retrieve range")?;
        let aligned = align_query(self.interval, range)?;
        let ns = namespace(symbol, self.interval);

        let cached = self.cache.range_by_key(&ns, aligned.start, aligned.end).await?;
        if cached.len() >= aligned.expected {
            debug!(namespace = %ns, expected = aligned.expected, cached = cached.len(), "cache hit");
            return Ok(cached);
        }

        let gate = self.gate(&ns)?;
        let flight = gate.lock().await;
        let result = self.backfill(symbol, &ns, aligned).await;
        drop(flight);
        self.release_gate(&ns, gate)?;
        result
    }

    async fn backfill(&self, symbol: &str, ns: &str, aligned: AlignedRange) -> anyhow::Result<Vec<Kline>> {
        // another caller may have backfilled while we waited
        let cached = self.cache.range_by_key(ns, aligned.start, aligned.end).await?;
        if cached.len() >= aligned.expected {
            debug!(namespace = %ns, cached = cached.len(), "cache filled by concurrent miss");
            return Ok(cached);
        }

        info!(
            namespace = %ns,
            expected = aligned.expected,
            cached = cached.len(),
            "cache miss, querying store"
        );
        let from_store = self.repo.query_range(symbol, aligned.start, aligned.end).await?;

        self.cache.upsert_all(ns, &from_store).await?;
        self.cache.expire_after(ns, self.ttl).await?;
        debug!(namespace = %ns, backfilled = from_store.len(), ttl = ?self.ttl, "cache backfilled");

        Ok(merge_by_open_time(cached, from_store))
    }

    fn gate(&self, ns: &str) -> anyhow::Result<Arc<AsyncMutex<()>>> {
        let mut gates = self
            .in_flight
            .lock()
            .map_err(|_| anyhow!("in-flight map mutex poisoned"))?;
        Ok(Arc::clone(gates.entry(ns.to_string()).or_default()))
    }

    /// Removes the gate for `ns` unless another caller still holds it.
    fn release_gate(&self, ns: &str, gate: Arc<AsyncMutex<()>>) -> anyhow::Result<()> {
        let mut gates = self
            .in_flight
            .lock()
            .map_err(|_| anyhow!("in-flight map mutex poisoned"))?;
        // one reference in the map, one here
        if Arc::strong_count(&gate) <= 2 {
            gates.remove(ns);
        }
        Ok(())
    }

    /// Namespaces with a backfill running or waited on.
    pub fn in_flight_namespaces(&self) -> usize {
        self.in_flight.lock().map(|gates| gates.len()).unwrap_or(0)
    }
}

/// Union keyed by `open_time`; `later` wins collisions. Output is ordered.
pub fn merge_by_open_time(earlier: Vec<Kline>, later: Vec<Kline>) -> Vec<Kline> {
    let mut merged: BTreeMap<i64, Kline> = BTreeMap::new();
    for k in earlier.into_iter().chain(later) {
        merged.insert(k.open_time, k);
    }
    merged.into_values().collect()
}
