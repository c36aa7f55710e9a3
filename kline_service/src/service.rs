//! The two inbound calls: load a range from an exchange into the store, and
//! read a range back resampled to a requested interval.
//!
//! Every collaborator is passed in explicitly; [`KlineService::from_config`]
//! is the one place that builds them from a [`ServiceConfig`].

use std::{num::NonZeroUsize, sync::Arc, time::Duration};

use kline_ingestor::{
    models::{interval::Interval, kline::Kline, time_range::TimeRange},
    requests::historical::{BatchLoader, LoadReport},
};
use tracing::{info, warn};

use crate::{
    aggregate::{AggregateError, aggregate},
    cache::{CacheIndex, MemoryCacheIndex, RedisCacheIndex},
    config::ServiceConfig,
    db::migrate,
    error::ServiceError,
    exchanges::{ExchangeEntry, ExchangeRegistry},
    repo::{KlineRepo, SqliteKlineRepo, StoreSink},
    retrieve::CacheAsideRetriever,
};

/// Tunables for [`KlineService::new`].
#[derive(Debug, Clone)]
pub struct ServiceSettings {
    /// Interval held by store and cache.
    pub default_interval: Interval,
    /// Exchange used to validate symbols on retrieval.
    pub default_exchange: String,
    /// Cache TTL set after each backfill.
    pub cache_ttl: Duration,
    /// Sub-ranges in flight per load.
    pub max_concurrency: NonZeroUsize,
    /// Fetch timeout per sub-range.
    pub sub_range_timeout: Duration,
}

impl From<&ServiceConfig> for ServiceSettings {
    fn from(cfg: &ServiceConfig) -> Self {
        Self {
            default_interval: cfg.default_interval,
            default_exchange: cfg.default_exchange.clone(),
            cache_ttl: cfg.cache.ttl(),
            max_concurrency: cfg.load.max_concurrency(),
            sub_range_timeout: cfg.load.sub_range_timeout(),
        }
    }
}

/// Facade over loader, retriever and aggregator.
pub struct KlineService {
    registry: ExchangeRegistry,
    loader: BatchLoader,
    retriever: CacheAsideRetriever,
    default_exchange: String,
    default_interval: Interval,
}

impl KlineService {
    /// Wires the service from explicit collaborators.
    pub fn new(
        registry: ExchangeRegistry,
        repo: Arc<dyn KlineRepo>,
        cache: Arc<dyn CacheIndex>,
        settings: ServiceSettings,
    ) -> Self {
        let mismatched = registry
            .names()
            .filter_map(|name| registry.get(name))
            .filter(|entry| entry.source.base_interval() != settings.default_interval);
        for entry in mismatched {
            warn!(
                exchange = entry.source.name(),
                source_interval = %entry.source.base_interval(),
                default_interval = %settings.default_interval,
                "exchange fetches a different interval than the store is read at"
            );
        }

        let loader = BatchLoader::new(Arc::new(StoreSink::new(Arc::clone(&repo))))
            .with_max_concurrency(settings.max_concurrency)
            .with_sub_range_timeout(settings.sub_range_timeout);
        let retriever = CacheAsideRetriever::new(repo, cache, settings.default_interval)
            .with_ttl(settings.cache_ttl);

        Self {
            registry,
            loader,
            retriever,
            default_exchange: settings.default_exchange.trim().to_lowercase(),
            default_interval: settings.default_interval,
        }
    }

    /// Runs migrations, opens the store, connects the cache (Redis when
    /// `redis_url` is set, in-process otherwise) and builds the exchanges.
    pub async fn from_config(cfg: &ServiceConfig) -> anyhow::Result<Self> {
        migrate::run_sqlite(&cfg.database_url)?;
        let repo: Arc<dyn KlineRepo> = Arc::new(SqliteKlineRepo::open(&cfg.database_url)?);

        let cache: Arc<dyn CacheIndex> = match &cfg.redis_url {
            Some(url) => Arc::new(RedisCacheIndex::connect(url).await?),
            None => {
                info!("no redis_url configured, using in-process cache");
                Arc::new(MemoryCacheIndex::new())
            }
        };

        let registry = ExchangeRegistry::from_config(cfg)?;
        Ok(Self::new(registry, repo, cache, ServiceSettings::from(cfg)))
    }

    /// Registered exchanges.
    pub fn registry(&self) -> &ExchangeRegistry {
        &self.registry
    }

    /// Fetches `[start, end)` for `symbol` from `exchange_name` and stores it.
    ///
    /// Input problems fail fast. Sub-range failures do not; they are listed
    /// in the returned [`LoadReport`].
    pub async fn load_data(
        &self,
        symbol: &str,
        start: i64,
        end: i64,
        exchange_name: &str,
    ) -> Result<LoadReport, ServiceError> {
        let range = TimeRange::new(start, end)?;
        let entry = self.exchange(exchange_name)?;
        let symbol = self.known_symbol(entry, symbol).await?;

        let report = self
            .loader
            .load(symbol, range.start, range.end, Arc::clone(&entry.source))
            .await?;
        if !report.is_complete() {
            warn!(
                exchange = %report.exchange,
                symbol,
                failed = report.failed().count(),
                of = report.outcomes.len(),
                "load finished with failed sub-ranges"
            );
        }
        Ok(report)
    }

    /// Reads `[start, end)` for `symbol` through the cache and resamples it
    /// to `interval_label`.
    pub async fn retrieve_and_aggregate(
        &self,
        symbol: &str,
        start: i64,
        end: i64,
        interval_label: &str,
    ) -> Result<Vec<Kline>, ServiceError> {
        TimeRange::new(start, end)?;
        let target: Interval = interval_label.parse()?;
        if target.duration_millis() < self.default_interval.duration_millis() {
            return Err(AggregateError::FinerThanInput {
                target,
                native_span_millis: self.default_interval.duration_millis(),
            }
            .into());
        }
        let entry = self.exchange(&self.default_exchange)?;
        let symbol = self.known_symbol(entry, symbol).await?;

        let records = self
            .retriever
            .retrieve(symbol, start, end)
            .await
            .map_err(ServiceError::Storage)?;
        if records.is_empty() {
            return Err(ServiceError::NoData {
                symbol: symbol.to_string(),
                start,
                end,
            });
        }

        Ok(aggregate(&records, target)?)
    }

    fn exchange(&self, name: &str) -> Result<&ExchangeEntry, ServiceError> {
        self.registry.get(name).ok_or_else(|| {
            ServiceError::InputInvalid(format!("unknown exchange '{}'", name.trim()))
        })
    }

    async fn known_symbol<'a>(
        &self,
        entry: &ExchangeEntry,
        symbol: &'a str,
    ) -> Result<&'a str, ServiceError> {
        let symbol = symbol.trim();
        if symbol.is_empty() {
            return Err(ServiceError::InputInvalid("symbol must not be empty".into()));
        }
        if !entry.symbols.contains(symbol).await? {
            return Err(ServiceError::InputInvalid(format!(
                "unknown symbol '{symbol}' for exchange {}",
                entry.source.name()
            )));
        }
        Ok(symbol)
    }
}
