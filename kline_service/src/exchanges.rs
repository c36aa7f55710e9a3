//! Name -> exchange registry.
//!
//! Each entry pairs an [`ExchangeSource`] with its [`SymbolDirectory`].
//! Entries are selected at runtime by their lowercase name.

use std::{num::NonZeroU32, sync::Arc};

use anyhow::{Context, bail};
use indexmap::IndexMap;
use kline_ingestor::providers::{
    ExchangeSource,
    binance_rest::{BinanceProvider, BinanceSettings},
};
use secrecy::SecretString;
use shared_utils::env::get_env_var_opt;

use crate::{
    config::{BINANCE_API_KEY_ENV, ProviderKind, ServiceConfig},
    symbols::SymbolDirectory,
};

/// A registered exchange.
pub struct ExchangeEntry {
    /// The adapter.
    pub source: Arc<dyn ExchangeSource>,
    /// Its symbol listing.
    pub symbols: SymbolDirectory,
}

/// Registered exchanges in declaration order.
#[derive(Default)]
pub struct ExchangeRegistry {
    entries: IndexMap<String, ExchangeEntry>,
}

impl ExchangeRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds one adapter per `[exchanges.<name>]` table.
    ///
    /// `BINANCE_API_KEY`, when set, is attached to every Binance entry.
    pub fn from_config(cfg: &ServiceConfig) -> anyhow::Result<Self> {
        let api_key = get_env_var_opt(BINANCE_API_KEY_ENV).map(SecretString::from);

        let mut registry = Self::new();
        for (name, ex) in &cfg.exchanges {
            let source: Arc<dyn ExchangeSource> = match ex.provider {
                ProviderKind::Binance => {
                    let requests_per_second = NonZeroU32::new(ex.requests_per_second)
                        .with_context(|| format!("exchanges.{name}.requests_per_second is zero"))?;
                    let provider = BinanceProvider::new(BinanceSettings {
                        name: name.clone(),
                        base_url: ex.base_url.clone(),
                        base_interval: cfg.default_interval,
                        limit: ex.limit,
                        requests_per_second,
                        api_key: api_key.clone(),
                    })
                    .with_context(|| format!("build exchange {name}"))?;
                    Arc::new(provider)
                }
            };
            registry.register(source)?;
        }
        Ok(registry)
    }

    /// Adds `source` under its own name. Names must be unique.
    pub fn register(&mut self, source: Arc<dyn ExchangeSource>) -> anyhow::Result<()> {
        let name = source.name().trim().to_lowercase();
        if name.is_empty() {
            bail!("exchange source has an empty name");
        }
        if self.entries.contains_key(&name) {
            bail!("exchange {name} is already registered");
        }
        let symbols = SymbolDirectory::new(Arc::clone(&source));
        self.entries.insert(name, ExchangeEntry { source, symbols });
        Ok(())
    }

    /// Looks up an entry; `name` is matched case-insensitively.
    pub fn get(&self, name: &str) -> Option<&ExchangeEntry> {
        self.entries.get(name.trim().to_lowercase().as_str())
    }

    /// Registered names in declaration order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }
}
