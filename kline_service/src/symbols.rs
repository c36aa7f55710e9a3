//! Read-mostly symbol directory per exchange.
//!
//! Readers call [`SymbolDirectory::contains`], which loads an
//! `Arc<BTreeSet<..>>` snapshot without locking. A miss triggers at most one
//! refresh from the exchange (concurrent misses wait on the same refresh)
//! before the symbol is reported as unknown.
//!
//! Implementation notes:
//! - Uses `arc-swap` for atomic pointer swaps + cheap reads.
//! - Starts empty; the first lookup fills it.

use std::{collections::BTreeSet, sync::Arc};

use arc_swap::ArcSwap;
use kline_ingestor::providers::{ExchangeSource, ProviderError};
use tokio::sync::Mutex;
use tracing::{debug, info};

/// Snapshot type held inside the directory.
pub type SymbolSet = BTreeSet<String>;

/// Cached symbol listing of one exchange.
pub struct SymbolDirectory {
    source: Arc<dyn ExchangeSource>,
    snapshot: ArcSwap<SymbolSet>,
    refresh_lock: Mutex<()>,
}

impl SymbolDirectory {
    /// Empty directory over `source`.
    pub fn new(source: Arc<dyn ExchangeSource>) -> Self {
        Self {
            source,
            snapshot: ArcSwap::from_pointee(SymbolSet::new()),
            refresh_lock: Mutex::new(()),
        }
    }

    /// Returns `true` if `symbol` is listed, refreshing once on a miss.
    pub async fn contains(&self, symbol: &str) -> Result<bool, ProviderError> {
        if self.snapshot.load().contains(symbol) {
            return Ok(true);
        }

        let seen = Arc::as_ptr(&self.snapshot.load_full());
        let _guard = self.refresh_lock.lock().await;
        // someone else refreshed while we waited
        if Arc::as_ptr(&self.snapshot.load_full()) != seen {
            return Ok(self.snapshot.load().contains(symbol));
        }

        debug!(exchange = self.source.name(), symbol, "symbol miss, refreshing listing");
        let fresh = self.refresh_locked().await?;
        Ok(fresh.contains(symbol))
    }

    /// Fetches the listing and swaps it in.
    pub async fn refresh(&self) -> Result<Arc<SymbolSet>, ProviderError> {
        let _guard = self.refresh_lock.lock().await;
        self.refresh_locked().await
    }

    /// Current snapshot (possibly empty if never refreshed).
    pub fn snapshot(&self) -> Arc<SymbolSet> {
        self.snapshot.load_full()
    }

    async fn refresh_locked(&self) -> Result<Arc<SymbolSet>, ProviderError> {
        let symbols = Arc::new(self.source.list_symbols().await?);
        info!(exchange = self.source.name(), count = symbols.len(), "symbol listing refreshed");
        self.snapshot.store(Arc::clone(&symbols));
        Ok(symbols)
    }
}
