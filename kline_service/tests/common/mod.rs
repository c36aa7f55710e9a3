#![allow(dead_code)]

use std::{
    collections::BTreeSet,
    path::PathBuf,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use diesel::{QueryableByName, prelude::*, sql_query, sql_types::Text};
use kline_ingestor::{
    models::{interval::Interval, kline::Kline, time_range::TimeRange},
    providers::{ExchangeSource, ProviderError},
};
use kline_service::{
    db::{connection, migrate},
    repo::{KlineRepo, RepoResult, SqliteKlineRepo},
};
use rust_decimal::Decimal;
use tempfile::TempDir;

pub const SYMBOL: &str = "BTCUSDT";
pub const MINUTE: i64 = 60_000;
pub const HOUR: i64 = 3_600_000;

#[derive(QueryableByName)]
struct JournalMode {
    #[diesel(sql_type = Text)]
    journal_mode: String,
}

pub struct TestDb {
    _dir: TempDir,    // keep alive for the life of the test
    pub path: String, // <tmpdir>/test.db
}

pub fn setup_db() -> (TestDb, SqliteConnection) {
    let dir = TempDir::new().expect("tempdir");
    let mut p = PathBuf::from(dir.path());
    p.push("test.db");
    let path = p.to_string_lossy().to_string();

    migrate::run_sqlite(&path).expect("migrations");

    let conn = connection::connect_sqlite(&path).expect("connect");
    (TestDb { _dir: dir, path }, conn)
}

/// Migrated temp database behind the async repo.
pub fn setup_repo() -> (TestDb, Arc<SqliteKlineRepo>) {
    let (db, conn) = setup_db();
    (db, Arc::new(SqliteKlineRepo::from_connection(conn)))
}

pub fn assert_wal(conn: &mut SqliteConnection) {
    let jm: JournalMode = sql_query("PRAGMA journal_mode;").get_result(conn).unwrap();
    assert_eq!(jm.journal_mode.to_lowercase(), "wal");
}

/// One-minute kline whose close price encodes its minute index.
pub fn minute_kline(symbol: &str, open_time: i64) -> Kline {
    let minute = open_time.div_euclid(MINUTE);
    Kline {
        symbol: symbol.to_string(),
        open_time,
        close_time: open_time + MINUTE - 1,
        open_price: Decimal::new(100_00 + minute, 2),
        high_price: Decimal::new(101_00 + minute, 2),
        low_price: Decimal::new(99_00 + minute, 2),
        close_price: Decimal::new(100_50 + minute, 2),
        volume: Decimal::ONE,
        quote_asset_volume: Decimal::new(100_12345678, 8),
        number_of_trades: 2,
        taker_buy_base_volume: Decimal::new(5, 1),
        taker_buy_quote_volume: Decimal::new(50_00000001, 8),
    }
}

/// Consecutive one-minute klines covering `[start, end)`.
pub fn minutes(symbol: &str, start: i64, end: i64) -> Vec<Kline> {
    (start..end)
        .step_by(MINUTE as usize)
        .map(|t| minute_kline(symbol, t))
        .collect()
}

/// In-memory exchange producing one kline per minute of any requested range.
pub struct MockExchange {
    pub name: String,
    pub symbols: BTreeSet<String>,
    pub limit: u32,
    pub fetches: AtomicUsize,
    pub listings: AtomicUsize,
}

impl MockExchange {
    pub fn new(name: &str, symbols: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            symbols: symbols.iter().map(|s| s.to_string()).collect(),
            limit: 500,
            fetches: AtomicUsize::new(0),
            listings: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl ExchangeSource for MockExchange {
    fn name(&self) -> &str {
        &self.name
    }

    fn base_interval(&self) -> Interval {
        Interval::OneMinute
    }

    fn max_records_per_call(&self) -> u32 {
        self.limit
    }

    async fn list_symbols(&self) -> Result<BTreeSet<String>, ProviderError> {
        self.listings.fetch_add(1, Ordering::SeqCst);
        Ok(self.symbols.clone())
    }

    async fn fetch_klines(
        &self,
        symbol: &str,
        range: TimeRange,
    ) -> Result<Vec<Kline>, ProviderError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        let first = Interval::OneMinute.align_up(range.start).unwrap_or(range.end);
        Ok(minutes(symbol, first, range.end))
    }
}

/// Wraps a repo, counting range queries and optionally slowing them down.
pub struct CountingRepo {
    inner: Arc<dyn KlineRepo>,
    pub queries: AtomicUsize,
    delay: Duration,
}

impl CountingRepo {
    pub fn new(inner: Arc<dyn KlineRepo>) -> Self {
        Self {
            inner,
            queries: AtomicUsize::new(0),
            delay: Duration::ZERO,
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn query_count(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl KlineRepo for CountingRepo {
    async fn batch_insert_ignoring_duplicates(&self, records: &[Kline]) -> RepoResult<usize> {
        self.inner.batch_insert_ignoring_duplicates(records).await
    }

    async fn query_range(&self, symbol: &str, start: i64, end: i64) -> RepoResult<Vec<Kline>> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.inner.query_range(symbol, start, end).await
    }
}
