//! Database utilities for connections and schema migrations.
//!
//! - [`connection::connect_sqlite`] opens a SQLite database with WAL journaling
//!   and a 5000ms busy timeout.
//! - [`migrate::run_sqlite`] applies the embedded Diesel migrations.
//!
//! Example:
//! ```no_run
//! use kline_service::db::{connection, migrate};
//!
//! let db_path = std::env::temp_dir().join("kline_service_example.db");
//! migrate::run_sqlite(db_path.to_str().unwrap()).expect("migrations");
//! let _conn = connection::connect_sqlite(db_path.to_str().unwrap()).expect("connect");
//! ```

pub mod connection;
pub mod migrate;
