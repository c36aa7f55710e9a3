use async_trait::async_trait;
use thiserror::Error;

use crate::models::kline::Kline;

#[derive(Debug, Error)]
pub enum SinkError {
    /// The store refused or failed the write, kept with its source.
    #[error("Sink backend error: {0}")]
    Backend(#[source] Box<dyn std::error::Error + Send + Sync>),
}

/// Write side of the durable store.
///
/// Writes are idempotent per primary key `(symbol, open_time, close_time)`:
/// a record already present is silently ignored.
#[async_trait]
pub trait KlineSink: Send + Sync {
    /// Persists `data` in one batch and returns how many rows were new.
    ///
    /// An empty slice is a no-op that returns `Ok(0)`.
    async fn write(&self, data: &[Kline]) -> Result<usize, SinkError>;
}
