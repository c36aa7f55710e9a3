//! Row structs mapping [`Kline`] onto the `kline_data` table.
//!
//! Decimals are stored as their canonical text so the column keeps the exact
//! fixed-point value; SQLite's REAL would round.

use std::str::FromStr;

use anyhow::Context;
use diesel::prelude::*;
use kline_ingestor::models::kline::Kline;
use rust_decimal::Decimal;

use crate::schema::kline_data;

/// One `kline_data` row, used for both inserts and selects.
#[derive(Queryable, Selectable, Insertable, Debug, Clone, PartialEq, Eq)]
#[diesel(table_name = kline_data)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct KlineRow {
    /// Trading pair.
    pub symbol: String,
    /// Epoch ms, inclusive.
    pub open_time: i64,
    /// Epoch ms, last millisecond of the candle.
    pub close_time: i64,
    /// Decimal text.
    pub open_price: String,
    /// Decimal text.
    pub high_price: String,
    /// Decimal text.
    pub low_price: String,
    /// Decimal text.
    pub close_price: String,
    /// Decimal text.
    pub volume: String,
    /// Decimal text.
    pub quote_asset_volume: String,
    /// Non-negative.
    pub number_of_trades: i64,
    /// Decimal text.
    pub taker_buy_base_volume: String,
    /// Decimal text.
    pub taker_buy_quote_volume: String,
}

impl TryFrom<&Kline> for KlineRow {
    type Error = anyhow::Error;

    fn try_from(k: &Kline) -> anyhow::Result<Self> {
        Ok(Self {
            symbol: k.symbol.clone(),
            open_time: k.open_time,
            close_time: k.close_time,
            open_price: k.open_price.to_string(),
            high_price: k.high_price.to_string(),
            low_price: k.low_price.to_string(),
            close_price: k.close_price.to_string(),
            volume: k.volume.to_string(),
            quote_asset_volume: k.quote_asset_volume.to_string(),
            number_of_trades: i64::try_from(k.number_of_trades)
                .with_context(|| format!("number_of_trades {} overflows i64", k.number_of_trades))?,
            taker_buy_base_volume: k.taker_buy_base_volume.to_string(),
            taker_buy_quote_volume: k.taker_buy_quote_volume.to_string(),
        })
    }
}

impl TryFrom<KlineRow> for Kline {
    type Error = anyhow::Error;

    fn try_from(row: KlineRow) -> anyhow::Result<Self> {
        let dec = |name: &str, text: &str| {
            Decimal::from_str(text).with_context(|| {
                format!("{}@{}: column {name} holds non-decimal {text:?}", row.symbol, row.open_time)
            })
        };
        Ok(Kline {
            open_price: dec("open_price", &row.open_price)?,
            high_price: dec("high_price", &row.high_price)?,
            low_price: dec("low_price", &row.low_price)?,
            close_price: dec("close_price", &row.close_price)?,
            volume: dec("volume", &row.volume)?,
            quote_asset_volume: dec("quote_asset_volume", &row.quote_asset_volume)?,
            number_of_trades: u64::try_from(row.number_of_trades)
                .with_context(|| format!("negative number_of_trades {}", row.number_of_trades))?,
            taker_buy_base_volume: dec("taker_buy_base_volume", &row.taker_buy_base_volume)?,
            taker_buy_quote_volume: dec("taker_buy_quote_volume", &row.taker_buy_quote_volume)?,
            open_time: row.open_time,
            close_time: row.close_time,
            symbol: row.symbol,
        })
    }
}
