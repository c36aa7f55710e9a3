use std::{
    collections::{BTreeMap, HashMap},
    sync::Mutex,
    time::Duration,
};

use anyhow::anyhow;
use async_trait::async_trait;
use kline_ingestor::models::kline::Kline;
use tokio::time::Instant;

use crate::cache::CacheIndex;

#[derive(Default)]
struct Namespace {
    entries: BTreeMap<i64, Kline>,
    expires_at: Option<Instant>,
}

impl Namespace {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

/// In-process [`CacheIndex`].
///
/// Expiry follows Redis semantics: a namespace without a TTL never expires,
/// an upsert keeps the current TTL, and an expired namespace reads as empty
/// and is dropped on the next access.
#[derive(Default)]
pub struct MemoryCacheIndex {
    namespaces: Mutex<HashMap<String, Namespace>>,
}

impl MemoryCacheIndex {
    /// Empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Live entries in `namespace`, for diagnostics and tests.
    pub fn len(&self, namespace: &str) -> anyhow::Result<usize> {
        self.with_live(namespace, |ns| ns.map_or(0, |ns| ns.entries.len()))
    }

    /// Remaining lifetime of `namespace`, if it has one.
    pub fn ttl(&self, namespace: &str) -> anyhow::Result<Option<Duration>> {
        let now = Instant::now();
        self.with_live(namespace, |ns| {
            ns.and_then(|ns| ns.expires_at).map(|at| at.saturating_duration_since(now))
        })
    }

    fn with_live<T>(&self, namespace: &str, f: impl FnOnce(Option<&mut Namespace>) -> T) -> anyhow::Result<T> {
        let mut map = self
            .namespaces
            .lock()
            .map_err(|_| anyhow!("cache mutex poisoned"))?;
        if map.get(namespace).is_some_and(|ns| ns.is_expired(Instant::now())) {
            map.remove(namespace);
        }
        Ok(f(map.get_mut(namespace)))
    }
}

#[async_trait]
impl CacheIndex for MemoryCacheIndex {
    async fn range_by_key(&self, namespace: &str, low: i64, high: i64) -> anyhow::Result<Vec<Kline>> {
        if low > high {
            return Ok(Vec::new());
        }
        self.with_live(namespace, |ns| {
            ns.map(|ns| ns.entries.range(low..=high).map(|(_, k)| k.clone()).collect())
                .unwrap_or_default()
        })
    }

    async fn upsert(&self, namespace: &str, record: &Kline, key: i64) -> anyhow::Result<()> {
        let mut map = self
            .namespaces
            .lock()
            .map_err(|_| anyhow!("cache mutex poisoned"))?;
        let ns = map.entry(namespace.to_string()).or_default();
        if ns.is_expired(Instant::now()) {
            *ns = Namespace::default();
        }
        ns.entries.insert(key, record.clone());
        Ok(())
    }

    async fn expire_after(&self, namespace: &str, ttl: Duration) -> anyhow::Result<()> {
        let expires_at = Instant::now() + ttl;
        self.with_live(namespace, |ns| {
            // like EXPIRE on a missing key: nothing to do
            if let Some(ns) = ns {
                ns.expires_at = Some(expires_at);
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use super::*;

    fn kline(open_time: i64, close: i64) -> Kline {
        Kline {
            symbol: "BTCUSDT".into(),
            open_time,
            close_time: open_time + 59_999,
            open_price: Decimal::ONE,
            high_price: Decimal::from(close),
            low_price: Decimal::ONE,
            close_price: Decimal::from(close),
            volume: Decimal::ONE,
            quote_asset_volume: Decimal::ONE,
            number_of_trades: 1,
            taker_buy_base_volume: Decimal::ZERO,
            taker_buy_quote_volume: Decimal::ZERO,
        }
    }

    const NS: &str = "klineData:BTCUSDT:1m";

    #[tokio::test]
    async fn range_is_inclusive_and_ordered() {
        let cache = MemoryCacheIndex::new();
        for t in [180_000, 0, 120_000, 60_000] {
            cache.upsert(NS, &kline(t, 2), t).await.unwrap();
        }
        let got = cache.range_by_key(NS, 60_000, 180_000).await.unwrap();
        let keys: Vec<i64> = got.iter().map(|k| k.open_time).collect();
        assert_eq!(keys, vec![60_000, 120_000, 180_000]);

        assert!(cache.range_by_key("klineData:ETHUSDT:1m", 0, 180_000).await.unwrap().is_empty());
        assert!(cache.range_by_key(NS, 10, 5).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn upsert_replaces_same_key() {
        let cache = MemoryCacheIndex::new();
        cache.upsert(NS, &kline(0, 2), 0).await.unwrap();
        cache.upsert(NS, &kline(0, 7), 0).await.unwrap();
        let got = cache.range_by_key(NS, 0, 0).await.unwrap();
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].close_price, Decimal::from(7));
    }

    #[tokio::test(start_paused = true)]
    async fn namespace_expires_after_ttl() {
        let cache = MemoryCacheIndex::new();
        cache.upsert_all(NS, &[kline(0, 2), kline(60_000, 2)]).await.unwrap();
        assert_eq!(cache.ttl(NS).unwrap(), None);

        cache.expire_after(NS, Duration::from_secs(3600)).await.unwrap();
        tokio::time::advance(Duration::from_secs(3599)).await;
        assert_eq!(cache.len(NS).unwrap(), 2);
        assert_eq!(cache.ttl(NS).unwrap(), Some(Duration::from_secs(1)));

        tokio::time::advance(Duration::from_secs(1)).await;
        assert!(cache.range_by_key(NS, 0, 60_000).await.unwrap().is_empty());
        assert_eq!(cache.len(NS).unwrap(), 0);
    }

    #[tokio::test]
    async fn expire_on_missing_namespace_is_a_no_op() {
        let cache = MemoryCacheIndex::new();
        cache.expire_after(NS, Duration::from_secs(1)).await.unwrap();
        assert_eq!(cache.ttl(NS).unwrap(), None);
    }
}
