//! Parsing for Binance kline and ticker payloads.
//!
//! A kline row is a positional array:
//!
//! ```text
//! [openTime, open, high, low, close, volume, closeTime,
//!  quoteAssetVolume, numberOfTrades, takerBuyBase, takerBuyQuote, ignore]
//! ```
//!
//! Times and the trade count are JSON numbers, prices and volumes are JSON
//! strings. Decimals are parsed straight from their text so nothing passes
//! through `f64`.

use std::str::FromStr;

use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::Value;

use crate::{
    models::kline::Kline,
    providers::{ProviderError, RowError},
};

/// Minimum number of positional fields in a kline row.
pub const ROW_FIELDS: usize = 12;

/// One entry of `/api/v3/ticker/price`.
#[derive(Deserialize, Debug)]
pub struct TickerPrice {
    pub symbol: Option<String>,
    pub price: Option<String>,
}

/// Result of parsing a klines body: the good rows plus what was dropped.
#[derive(Debug, Default)]
pub struct ParsedKlines {
    pub klines: Vec<Kline>,
    pub dropped: usize,
    /// Reason for the first dropped row, for logging.
    pub first_error: Option<RowError>,
}

/// Parses a full klines body. Anything but a JSON array is a fetch failure;
/// bad rows inside the array are dropped and counted.
pub fn parse_klines(symbol: &str, body: &Value) -> Result<ParsedKlines, ProviderError> {
    let rows = body.as_array().ok_or_else(|| {
        ProviderError::MalformedResponse(format!("expected a JSON array, got {}", kind(body)))
    })?;

    let mut parsed = ParsedKlines {
        klines: Vec::with_capacity(rows.len()),
        ..Default::default()
    };
    for row in rows {
        match parse_row(symbol, row) {
            Ok(kline) => parsed.klines.push(kline),
            Err(err) => {
                parsed.dropped += 1;
                parsed.first_error.get_or_insert(err);
            }
        }
    }
    Ok(parsed)
}

/// Parses a single positional row.
pub fn parse_row(symbol: &str, row: &Value) -> Result<Kline, RowError> {
    let fields = row.as_array().ok_or(RowError::NotAnArray)?;
    if fields.len() < ROW_FIELDS {
        return Err(RowError::TooFewFields {
            found: fields.len(),
            expected: ROW_FIELDS,
        });
    }

    let kline = Kline {
        symbol: symbol.to_string(),
        open_time: int_field(fields, 0, "open_time")?,
        open_price: decimal_field(fields, 1, "open_price")?,
        high_price: decimal_field(fields, 2, "high_price")?,
        low_price: decimal_field(fields, 3, "low_price")?,
        close_price: decimal_field(fields, 4, "close_price")?,
        volume: decimal_field(fields, 5, "volume")?,
        close_time: int_field(fields, 6, "close_time")?,
        quote_asset_volume: decimal_field(fields, 7, "quote_asset_volume")?,
        number_of_trades: count_field(fields, 8, "number_of_trades")?,
        taker_buy_base_volume: decimal_field(fields, 9, "taker_buy_base_volume")?,
        taker_buy_quote_volume: decimal_field(fields, 10, "taker_buy_quote_volume")?,
    };
    kline.validate()?;
    Ok(kline)
}

/// Collects the non-empty symbols of a ticker listing, returning how many
/// entries were skipped for lacking one.
pub fn collect_symbols(tickers: Vec<TickerPrice>) -> (Vec<String>, usize) {
    let mut skipped = 0;
    let symbols = tickers
        .into_iter()
        .filter_map(|t| match t.symbol {
            Some(s) if !s.trim().is_empty() => Some(s),
            _ => {
                skipped += 1;
                None
            }
        })
        .collect();
    (symbols, skipped)
}

fn int_field(fields: &[Value], index: usize, name: &'static str) -> Result<i64, RowError> {
    fields[index].as_i64().ok_or_else(|| RowError::InvalidField {
        index,
        name,
        reason: format!("expected an integer, got {}", kind(&fields[index])),
    })
}

fn count_field(fields: &[Value], index: usize, name: &'static str) -> Result<u64, RowError> {
    fields[index].as_u64().ok_or_else(|| RowError::InvalidField {
        index,
        name,
        reason: format!("expected a non-negative integer, got {}", kind(&fields[index])),
    })
}

fn decimal_field(fields: &[Value], index: usize, name: &'static str) -> Result<Decimal, RowError> {
    let invalid = |reason: String| RowError::InvalidField { index, name, reason };
    match &fields[index] {
        Value::String(s) => Decimal::from_str(s.trim()).map_err(|e| invalid(e.to_string())),
        Value::Number(n) => Decimal::from_str(&n.to_string()).map_err(|e| invalid(e.to_string())),
        other => Err(invalid(format!("expected a decimal, got {}", kind(other)))),
    }
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn row(open_time: i64) -> Value {
        json!([
            open_time,
            "0.01634790",
            "0.80000000",
            "0.01575800",
            "0.01577100",
            "148976.11427815",
            open_time + 59_999,
            "2434.19055334",
            308,
            "1756.87402397",
            "28.46694368",
            "0"
        ])
    }

    #[test]
    fn parses_a_well_formed_row() {
        let kline = parse_row("BNBBTC", &row(1_499_040_000_000)).unwrap();
        assert_eq!(kline.symbol, "BNBBTC");
        assert_eq!(kline.open_time, 1_499_040_000_000);
        assert_eq!(kline.close_time, 1_499_040_059_999);
        assert_eq!(kline.high_price.to_string(), "0.80000000");
        assert_eq!(kline.volume.to_string(), "148976.11427815");
        assert_eq!(kline.number_of_trades, 308);
        assert_eq!(kline.taker_buy_quote_volume.to_string(), "28.46694368");
    }

    #[test]
    fn short_row_is_rejected() {
        let err = parse_row("BNBBTC", &json!([0, "1", "1"])).unwrap_err();
        assert_eq!(err, RowError::TooFewFields { found: 3, expected: 12 });
    }

    #[test]
    fn bad_decimal_names_the_field() {
        let mut bad = row(0);
        bad[4] = json!("not-a-price");
        let err = parse_row("BNBBTC", &bad).unwrap_err();
        assert!(matches!(err, RowError::InvalidField { index: 4, name: "close_price", .. }));
    }

    #[test]
    fn bad_rows_are_dropped_not_fatal() {
        let body = json!([row(0), "garbage", row(60_000), [1, 2]]);
        let parsed = parse_klines("BNBBTC", &body).unwrap();
        assert_eq!(parsed.klines.len(), 2);
        assert_eq!(parsed.dropped, 2);
        assert_eq!(parsed.first_error, Some(RowError::NotAnArray));
    }

    #[test]
    fn non_array_body_is_a_fetch_error() {
        let body = json!({"code": -1121, "msg": "Invalid symbol."});
        assert!(matches!(
            parse_klines("NOPE", &body),
            Err(ProviderError::MalformedResponse(_))
        ));
    }

    #[test]
    fn ticker_entries_without_symbol_are_skipped() {
        let tickers: Vec<TickerPrice> = serde_json::from_value(json!([
            {"symbol": "BTCUSDT", "price": "42000.00"},
            {"price": "1.0"},
            {"symbol": "", "price": "1.0"},
            {"symbol": "ETHUSDT", "price": "2500.00"}
        ]))
        .unwrap();
        let (symbols, skipped) = collect_symbols(tickers);
        assert_eq!(symbols, vec!["BTCUSDT", "ETHUSDT"]);
        assert_eq!(skipped, 2);
    }
}
