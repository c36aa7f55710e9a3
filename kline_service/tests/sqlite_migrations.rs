mod common;
use common::{assert_wal, setup_db};

use diesel::QueryableByName;
use diesel::prelude::*;
use diesel::sql_query;
use diesel::sql_types::Integer;
use kline_service::db::{connection::connect_sqlite, migrate};

#[derive(QueryableByName)]
struct Cnt {
    #[diesel(sql_type = Integer)]
    cnt: i32,
}

#[test]
fn migrations_create_table_index_and_wal() {
    let (db, mut conn) = setup_db();
    assert_wal(&mut conn);

    let tbl: Cnt = sql_query(
        "SELECT COUNT(*) AS cnt FROM sqlite_master WHERE type='table' AND name='kline_data';",
    )
    .get_result(&mut conn)
    .unwrap();
    assert_eq!(tbl.cnt, 1);

    let idx: Cnt = sql_query(
        "SELECT COUNT(*) AS cnt FROM sqlite_master
            WHERE type='index' AND name='idx_kline_data_symbol_close_time';",
    )
    .get_result(&mut conn)
    .unwrap();
    assert_eq!(idx.cnt, 1);

    // a second connection sees WAL too (persistent per file)
    let mut second = connect_sqlite(&db.path).unwrap();
    assert_wal(&mut second);
    assert!(migrate::run_sqlite(&db.path).unwrap().is_empty());
}

#[test]
fn schema_rejects_inverted_times() {
    let (_db, mut conn) = setup_db();
    let res = sql_query(
        "INSERT INTO kline_data VALUES ('BTCUSDT', 60000, 0, '1', '1', '1', '1', '0', '0', 0, '0', '0');",
    )
    .execute(&mut conn);
    assert!(res.is_err(), "close_time < open_time must be rejected");
}
