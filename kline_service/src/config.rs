//! Service configuration: parsing, normalization, environment overrides.
//!
//! The TOML file describes:
//! - where the durable store lives (`database_url`) and, optionally, Redis
//! - the default interval the store holds and the default exchange used for
//!   symbol validation on the read path
//! - cache lifetime and load concurrency
//! - one `[exchanges.<name>]` table per registered exchange
//!
//! ```toml
//! database_url = "data/klines.db"
//! default_interval = "1m"
//! default_exchange = "binance"
//!
//! [cache]
//! ttl_secs = 3600
//!
//! [load]
//! max_concurrency = 8
//! sub_range_timeout_secs = 30
//!
//! [exchanges.binance]
//! provider = "binance"
//! base_url = "https://api.binance.com"
//! limit = 500
//! requests_per_second = 10
//! ```
//!
//! Entrypoints:
//! - Parse + normalize from a TOML string: [`load_config_str`]
//! - Parse + normalize from a file path: [`load_config_path`]
//! - Environment overrides: [`apply_env_overrides`]

use std::{num::NonZeroUsize, time::Duration};

use anyhow::{Context, bail};
use indexmap::IndexMap;
use kline_ingestor::{
    models::interval::Interval,
    providers::binance_rest::{
        params::{DEFAULT_LIMIT, MAX_LIMIT},
        provider::DEFAULT_BASE_URL,
    },
};
use serde::{Deserialize, Serialize};
use shared_utils::env::{get_env_var_opt, parse_env_var};
use toml::from_str;
use tracing::info;

/// Environment variable overriding [`ServiceConfig::database_url`].
pub const DATABASE_URL_ENV: &str = "DATABASE_URL";
/// Environment variable overriding [`ServiceConfig::redis_url`].
pub const REDIS_URL_ENV: &str = "REDIS_URL";
/// Optional Binance API key, sent as `X-MBX-APIKEY`.
pub const BINANCE_API_KEY_ENV: &str = "BINANCE_API_KEY";
/// Environment variable overriding [`LoadCfg::max_concurrency`].
pub const LOAD_MAX_CONCURRENCY_ENV: &str = "KLINE_LOAD_MAX_CONCURRENCY";

/// Top-level service configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ServiceConfig {
    /// SQLite path (a `sqlite:` prefix is accepted).
    pub database_url: String,

    /// Redis URL. Without one the cache is in-process.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redis_url: Option<String>,

    /// Interval fetched from exchanges and held by the store and cache.
    #[serde(default = "default_interval")]
    pub default_interval: Interval,

    /// Exchange used to validate symbols on the read path.
    #[serde(default = "default_exchange")]
    pub default_exchange: String,

    /// Cache settings.
    #[serde(default)]
    pub cache: CacheCfg,

    /// Batch load settings.
    #[serde(default)]
    pub load: LoadCfg,

    /// Map of exchange name -> configuration.
    ///
    /// Names are normalized (trimmed, lowercase) by [`normalize_config`].
    pub exchanges: IndexMap<String, ExchangeCfg>,
}

/// Cache lifetime.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct CacheCfg {
    /// TTL applied to a namespace after each backfill.
    #[serde(default = "default_ttl_secs")]
    pub ttl_secs: u64,
}

impl Default for CacheCfg {
    fn default() -> Self {
        Self {
            ttl_secs: default_ttl_secs(),
        }
    }
}

impl CacheCfg {
    /// TTL as a [`Duration`].
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

/// Batch load bounds.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct LoadCfg {
    /// Sub-ranges fetched at once per load.
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,

    /// Per sub-range fetch timeout.
    #[serde(default = "default_sub_range_timeout_secs")]
    pub sub_range_timeout_secs: u64,
}

impl Default for LoadCfg {
    fn default() -> Self {
        Self {
            max_concurrency: default_max_concurrency(),
            sub_range_timeout_secs: default_sub_range_timeout_secs(),
        }
    }
}

impl LoadCfg {
    /// Concurrency bound; zero is rejected by normalization and clamped to one here.
    pub fn max_concurrency(&self) -> NonZeroUsize {
        NonZeroUsize::new(self.max_concurrency).unwrap_or(NonZeroUsize::MIN)
    }

    /// Timeout as a [`Duration`].
    pub fn sub_range_timeout(&self) -> Duration {
        Duration::from_secs(self.sub_range_timeout_secs)
    }
}

/// Which adapter serves an exchange entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// Binance spot REST.
    Binance,
}

/// One registered exchange.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ExchangeCfg {
    /// Adapter variant.
    pub provider: ProviderKind,

    /// REST base URL.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Records per call, `1..=1000`.
    #[serde(default = "default_limit")]
    pub limit: u32,

    /// Client-side request budget.
    #[serde(default = "default_requests_per_second")]
    pub requests_per_second: u32,
}

fn default_interval() -> Interval {
    Interval::OneMinute
}
fn default_exchange() -> String {
    "binance".to_string()
}
fn default_ttl_secs() -> u64 {
    3600
}
fn default_max_concurrency() -> usize {
    8
}
fn default_sub_range_timeout_secs() -> u64 {
    30
}
fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}
fn default_limit() -> u32 {
    DEFAULT_LIMIT
}
fn default_requests_per_second() -> u32 {
    10
}

/// Summary of changes performed during normalization.
#[derive(Debug, Default)]
pub struct NormalizationReport {
    /// Exchange keys that changed when lowercasing/trimming.
    pub exchanges_renamed: usize,
    /// Whether `default_exchange` itself had to be lowercased/trimmed.
    pub default_exchange_renamed: bool,
}

/// Normalize a configuration in-place.
///
/// - Lowercase + trim exchange keys; reject empties and duplicates
/// - Trim URLs; reject an empty `database_url` or `base_url`
/// - `default_exchange` must name a declared exchange
/// - `limit` within `1..=1000`, `requests_per_second >= 1`,
///   `max_concurrency >= 1`, `sub_range_timeout_secs >= 1`, `ttl_secs >= 1`
pub fn normalize_config(cfg: &mut ServiceConfig) -> anyhow::Result<NormalizationReport> {
    let mut report = NormalizationReport::default();

    cfg.database_url = cfg.database_url.trim().to_string();
    if cfg.database_url.is_empty() {
        bail!("database_url cannot be empty");
    }
    cfg.redis_url = cfg
        .redis_url
        .take()
        .map(|u| u.trim().to_string())
        .filter(|u| !u.is_empty());

    let mut rebuilt: IndexMap<String, ExchangeCfg> = IndexMap::new();
    for (raw_name, mut ex) in std::mem::take(&mut cfg.exchanges) {
        let name = raw_name.trim().to_lowercase();
        if name.is_empty() {
            bail!("exchange name cannot be empty after trimming");
        }
        if name != raw_name {
            report.exchanges_renamed += 1;
        }
        if rebuilt.contains_key(&name) {
            bail!("duplicate exchange name after normalization: {name}");
        }

        ex.base_url = ex.base_url.trim().trim_end_matches('/').to_string();
        if ex.base_url.is_empty() {
            bail!("exchanges.{name}.base_url cannot be empty");
        }
        if ex.limit == 0 || ex.limit > MAX_LIMIT {
            bail!("exchanges.{name}.limit must be within 1..={MAX_LIMIT}, got {}", ex.limit);
        }
        if ex.requests_per_second == 0 {
            bail!("exchanges.{name}.requests_per_second must be at least 1");
        }
        rebuilt.insert(name, ex);
    }
    if rebuilt.is_empty() {
        bail!("at least one [exchanges.<name>] table is required");
    }
    cfg.exchanges = rebuilt;

    let default_exchange = cfg.default_exchange.trim().to_lowercase();
    report.default_exchange_renamed = default_exchange != cfg.default_exchange;
    if !cfg.exchanges.contains_key(&default_exchange) {
        bail!("default_exchange '{default_exchange}' is not declared under [exchanges]");
    }
    cfg.default_exchange = default_exchange;

    if cfg.load.max_concurrency == 0 {
        bail!("load.max_concurrency must be at least 1");
    }
    if cfg.load.sub_range_timeout_secs == 0 {
        bail!("load.sub_range_timeout_secs must be at least 1");
    }
    if cfg.cache.ttl_secs == 0 {
        bail!("cache.ttl_secs must be at least 1");
    }

    Ok(report)
}

/// Parse and normalize a configuration from a TOML string.
pub fn load_config_str(toml_str: &str) -> anyhow::Result<ServiceConfig> {
    let mut cfg: ServiceConfig = from_str(toml_str).context("failed to parse service config TOML")?;
    let report = normalize_config(&mut cfg).context("normalize_config failed")?;
    info!(
        exchanges = cfg.exchanges.len(),
        renamed = report.exchanges_renamed,
        "service config loaded"
    );
    Ok(cfg)
}

/// Read a TOML file from disk, parse, and normalize it.
pub fn load_config_path(path: impl AsRef<std::path::Path>) -> anyhow::Result<ServiceConfig> {
    let text = std::fs::read_to_string(path.as_ref())
        .with_context(|| format!("read config file {}", path.as_ref().display()))?;
    load_config_str(&text)
}

/// Applies `DATABASE_URL`, `REDIS_URL` and `KLINE_LOAD_MAX_CONCURRENCY`
/// when set and non-empty. Run [`normalize_config`] again afterwards.
pub fn apply_env_overrides(cfg: &mut ServiceConfig) -> anyhow::Result<()> {
    if let Some(url) = get_env_var_opt(DATABASE_URL_ENV) {
        cfg.database_url = url.trim().to_string();
    }
    if let Some(url) = get_env_var_opt(REDIS_URL_ENV) {
        cfg.redis_url = Some(url.trim().to_string());
    }
    if let Some(n) = parse_env_var::<usize>(LOAD_MAX_CONCURRENCY_ENV)? {
        cfg.load.max_concurrency = n;
    }
    Ok(())
}
