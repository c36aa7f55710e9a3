//! Embedded schema migrations.

use anyhow::anyhow;
use diesel::SqliteConnection;
use diesel_migrations::{EmbeddedMigrations, MigrationHarness, embed_migrations};
use tracing::info;

use crate::db::connection::connect_sqlite;

/// Embedded Diesel migrations bundled with this crate.
pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

/// Applies every pending migration on an open connection. Returns the
/// versions that were applied.
pub fn run_pending(conn: &mut SqliteConnection) -> anyhow::Result<Vec<String>> {
    let applied = conn
        .run_pending_migrations(MIGRATIONS)
        .map_err(|e| anyhow!(e))?
        .into_iter()
        .map(|v| v.to_string())
        .collect::<Vec<_>>();
    if !applied.is_empty() {
        info!(migrations = ?applied, "applied database migrations");
    }
    Ok(applied)
}

/// Runs pending Diesel migrations on the SQLite database at the given URL.
pub fn run_sqlite(url: &str) -> anyhow::Result<Vec<String>> {
    let mut conn = connect_sqlite(url)?;
    run_pending(&mut conn)
}
