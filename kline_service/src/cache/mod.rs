//! Ordered, expiring cache index of klines.
//!
//! Each namespace holds the klines of one `(symbol, interval)` pair keyed by
//! `open_time`. The cache is never the source of truth: a namespace can
//! expire or be partially filled at any moment, and the retriever always
//! reconciles it against the durable store.
//!
//! Two implementations:
//! - [`memory::MemoryCacheIndex`]: in-process `BTreeMap`s, for tests and
//!   single-binary deployments.
//! - [`redis::RedisCacheIndex`]: one Redis sorted set per namespace
//!   (score = `open_time`, member = JSON record).

/// In-process implementation.
pub mod memory;
/// Redis sorted-set implementation.
pub mod redis;

use std::time::Duration;

use async_trait::async_trait;
use kline_ingestor::models::{interval::Interval, kline::Kline};

pub use self::memory::MemoryCacheIndex;
pub use self::redis::RedisCacheIndex;

/// Prefix shared by every namespace.
pub const NAMESPACE_PREFIX: &str = "klineData";

/// Namespace key for one `(symbol, interval)` pair: `klineData:<symbol>:<label>`.
pub fn namespace(symbol: &str, interval: Interval) -> String {
    format!("{NAMESPACE_PREFIX}:{symbol}:{}", interval.label())
}

/// Cache surface used by the retriever.
#[async_trait]
pub trait CacheIndex: Send + Sync {
    /// Entries whose key lies in `[low, high]` (both inclusive), ordered by key.
    async fn range_by_key(&self, namespace: &str, low: i64, high: i64) -> anyhow::Result<Vec<Kline>>;

    /// Stores `record` under `key`, replacing whatever held that key.
    async fn upsert(&self, namespace: &str, record: &Kline, key: i64) -> anyhow::Result<()>;

    /// Resets the namespace lifetime to `ttl` from now.
    async fn expire_after(&self, namespace: &str, ttl: Duration) -> anyhow::Result<()>;

    /// Upserts every record keyed by its `open_time`.
    async fn upsert_all(&self, namespace: &str, records: &[Kline]) -> anyhow::Result<()> {
        for record in records {
            self.upsert(namespace, record, record.open_time).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn namespace_format() {
        assert_eq!(namespace("BTCUSDT", Interval::OneMinute), "klineData:BTCUSDT:1m");
        assert_eq!(namespace("ETHUSDT", Interval::OneDay), "klineData:ETHUSDT:1d");
    }
}
