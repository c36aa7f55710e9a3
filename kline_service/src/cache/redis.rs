use std::time::Duration;

use ::redis::{AsyncCommands, Client, aio::ConnectionManager};
use anyhow::Context;
use async_trait::async_trait;
use kline_ingestor::models::kline::Kline;
use tracing::debug;

use crate::cache::CacheIndex;

/// [`CacheIndex`] over Redis sorted sets.
///
/// Score is `open_time`, member is the JSON-encoded record. Because a sorted
/// set is keyed by member, not score, an upsert first removes whatever sits at
/// the score and then adds the new member, both in one `MULTI` block.
#[derive(Clone)]
pub struct RedisCacheIndex {
    conn: ConnectionManager,
}

impl RedisCacheIndex {
    /// Connects and keeps a self-reconnecting connection manager.
    pub async fn connect(url: &str) -> anyhow::Result<Self> {
        let client = Client::open(url).with_context(|| format!("invalid redis url {url}"))?;
        let conn = client
            .get_connection_manager()
            .await
            .context("connect to redis")?;
        Ok(Self { conn })
    }
}

#[async_trait]
impl CacheIndex for RedisCacheIndex {
    async fn range_by_key(&self, namespace: &str, low: i64, high: i64) -> anyhow::Result<Vec<Kline>> {
        let mut conn = self.conn.clone();
        let members: Vec<String> = conn
            .zrangebyscore(namespace, low, high)
            .await
            .with_context(|| format!("ZRANGEBYSCORE {namespace} {low} {high}"))?;

        members
            .iter()
            .map(|m| {
                serde_json::from_str::<Kline>(m)
                    .with_context(|| format!("undecodable member in {namespace}"))
            })
            .collect()
    }

    async fn upsert(&self, namespace: &str, record: &Kline, key: i64) -> anyhow::Result<()> {
        let member = serde_json::to_string(record)?;
        let mut conn = self.conn.clone();

        let mut pipe = ::redis::pipe();
        pipe.atomic()
            .zrembyscore(namespace, key, key)
            .ignore()
            .zadd(namespace, member, key)
            .ignore();
        let (): () = pipe
            .query_async(&mut conn)
            .await
            .with_context(|| format!("upsert {namespace} @ {key}"))?;
        Ok(())
    }

    async fn upsert_all(&self, namespace: &str, records: &[Kline]) -> anyhow::Result<()> {
        if records.is_empty() {
            return Ok(());
        }
        let mut pipe = ::redis::pipe();
        pipe.atomic();
        for record in records {
            let key = record.open_time;
            pipe.zrembyscore(namespace, key, key)
                .ignore()
                .zadd(namespace, serde_json::to_string(record)?, key)
                .ignore();
        }

        let mut conn = self.conn.clone();
        let (): () = pipe
            .query_async(&mut conn)
            .await
            .with_context(|| format!("bulk upsert into {namespace}"))?;
        debug!(namespace, count = records.len(), "cache backfilled");
        Ok(())
    }

    async fn expire_after(&self, namespace: &str, ttl: Duration) -> anyhow::Result<()> {
        // EXPIRE has whole-second resolution; 0 would delete the key
        let secs = i64::try_from(ttl.as_secs()).unwrap_or(i64::MAX).max(1);
        let mut conn = self.conn.clone();
        let (): () = conn
            .expire(namespace, secs)
            .await
            .with_context(|| format!("EXPIRE {namespace} {secs}"))?;
        Ok(())
    }
}
