use crate::{
    models::{interval::Interval, request_params::KlineRequest},
    providers::ProviderError,
};

/// Largest `limit` `/api/v3/klines` accepts.
pub const MAX_LIMIT: u32 = 1000;

/// Default `limit` when a configuration does not name one.
pub const DEFAULT_LIMIT: u32 = 500;

/// Rejects limits outside `1..=1000`.
pub fn validate_limit(limit: u32) -> Result<u32, ProviderError> {
    if limit == 0 || limit > MAX_LIMIT {
        return Err(ProviderError::Validation(format!(
            "limit must be within 1..={MAX_LIMIT}, got {limit}"
        )));
    }
    Ok(limit)
}

/// Binance uses the same labels as our catalog ("1m", "5m", "1h", "1d").
pub fn interval_param(interval: Interval) -> &'static str {
    interval.label()
}

/// Builds the query pairs for one klines call.
///
/// Binance treats `endTime` as inclusive, so the half-open range end is sent
/// as `end - 1`. A candle opening exactly at `range.end` belongs to the next
/// sub-range.
pub fn construct_params(req: &KlineRequest) -> Vec<(String, String)> {
    vec![
        ("symbol".to_string(), req.symbol.clone()),
        ("interval".to_string(), interval_param(req.interval).to_string()),
        ("startTime".to_string(), req.range.start.to_string()),
        ("endTime".to_string(), (req.range.end - 1).to_string()),
        ("limit".to_string(), req.limit.to_string()),
    ]
}
