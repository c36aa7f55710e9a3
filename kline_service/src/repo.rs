//! Durable kline store (SQLite).
//!
//! The store is the source of truth. From the pipeline's point of view it is
//! append-only: inserts ignore rows whose `(symbol, open_time, close_time)`
//! already exists, and nothing is ever updated in place.
//!
//! The free functions take a `&mut SqliteConnection` and are synchronous.
//! [`SqliteKlineRepo`] wraps them behind the async [`KlineRepo`] trait by
//! running each call on the blocking pool.

use std::sync::{Arc, Mutex};

use anyhow::{Context, anyhow};
use async_trait::async_trait;
use diesel::{SqliteConnection, prelude::*};
use kline_ingestor::{
    io::sink::{KlineSink, SinkError},
    models::kline::Kline,
};
use tracing::debug;

use crate::{db::connection::connect_sqlite, models::KlineRow, schema::kline_data};

/// Result type used throughout the store for fallible operations.
pub type RepoResult<T> = anyhow::Result<T>;

/// Rows per INSERT statement (12 bind parameters each).
pub const INSERT_CHUNK: usize = 500;

/// Portable store surface; the SQLite implementation is [`SqliteKlineRepo`].
#[async_trait]
pub trait KlineRepo: Send + Sync {
    /// Inserts `records`, skipping primary-key duplicates. Returns how many
    /// rows were new.
    async fn batch_insert_ignoring_duplicates(&self, records: &[Kline]) -> RepoResult<usize>;

    /// Records with `open_time >= start`, `close_time <= end` and the given
    /// symbol, ordered by `open_time` ascending.
    async fn query_range(&self, symbol: &str, start: i64, end: i64) -> RepoResult<Vec<Kline>>;
}

/// `INSERT OR IGNORE` in chunks, all inside one transaction.
pub fn insert_klines(conn: &mut SqliteConnection, records: &[Kline]) -> RepoResult<usize> {
    if records.is_empty() {
        return Ok(0);
    }
    let rows = records
        .iter()
        .map(KlineRow::try_from)
        .collect::<anyhow::Result<Vec<_>>>()?;

    conn.transaction::<usize, anyhow::Error, _>(|conn| {
        let mut inserted = 0;
        for chunk in rows.chunks(INSERT_CHUNK) {
            inserted += diesel::insert_or_ignore_into(kline_data::table)
                .values(chunk)
                .execute(conn)
                .context("insert kline_data chunk")?;
        }
        Ok(inserted)
    })
}

/// Range read used by the cache-aside path.
pub fn query_klines(
    conn: &mut SqliteConnection,
    symbol_v: &str,
    start: i64,
    end: i64,
) -> RepoResult<Vec<Kline>> {
    use crate::schema::kline_data::dsl::*;

    let rows: Vec<KlineRow> = kline_data
        .filter(symbol.eq(symbol_v))
        .filter(open_time.ge(start))
        .filter(close_time.le(end))
        .order(open_time.asc())
        .select(KlineRow::as_select())
        .load(conn)
        .with_context(|| format!("query kline_data for {symbol_v} [{start}, {end}]"))?;

    rows.into_iter().map(Kline::try_from).collect()
}

/// SQLite-backed [`KlineRepo`] sharing one connection.
#[derive(Clone)]
pub struct SqliteKlineRepo {
    conn: Arc<Mutex<SqliteConnection>>,
}

impl SqliteKlineRepo {
    /// Opens the database. Migrations are not run here.
    pub fn open(database_url: &str) -> RepoResult<Self> {
        Ok(Self::from_connection(connect_sqlite(database_url)?))
    }

    /// Wraps an already configured connection.
    pub fn from_connection(conn: SqliteConnection) -> Self {
        Self {
            conn: Arc::new(Mutex::new(conn)),
        }
    }

    async fn with_conn<T, F>(&self, f: F) -> RepoResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut SqliteConnection) -> RepoResult<T> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut guard = conn
                .lock()
                .map_err(|_| anyhow!("sqlite connection mutex poisoned"))?;
            f(&mut *guard)
        })
        .await
        .context("sqlite task panicked")?
    }
}

#[async_trait]
impl KlineRepo for SqliteKlineRepo {
    async fn batch_insert_ignoring_duplicates(&self, records: &[Kline]) -> RepoResult<usize> {
        if records.is_empty() {
            return Ok(0);
        }
        let records = records.to_vec();
        let total = records.len();
        let inserted = self.with_conn(move |conn| insert_klines(conn, &records)).await?;
        debug!(total, inserted, "stored klines");
        Ok(inserted)
    }

    async fn query_range(&self, symbol: &str, start: i64, end: i64) -> RepoResult<Vec<Kline>> {
        let symbol = symbol.to_string();
        self.with_conn(move |conn| query_klines(conn, &symbol, start, end))
            .await
    }
}

/// Adapts any [`KlineRepo`] into the loader's write side.
pub struct StoreSink {
    repo: Arc<dyn KlineRepo>,
}

impl StoreSink {
    /// Wraps `repo`.
    pub fn new(repo: Arc<dyn KlineRepo>) -> Self {
        Self { repo }
    }
}

#[async_trait]
impl KlineSink for StoreSink {
    async fn write(&self, data: &[Kline]) -> Result<usize, SinkError> {
        self.repo
            .batch_insert_ignoring_duplicates(data)
            .await
            .map_err(|e| SinkError::Backend(e.into()))
    }
}
