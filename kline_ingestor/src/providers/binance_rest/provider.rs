use std::{collections::BTreeSet, num::NonZeroU32};

use async_trait::async_trait;
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use nonzero_ext::nonzero;
use reqwest::{Client, Response, header};
use secrecy::{ExposeSecret, SecretString};
use serde_json::Value;
use tracing::{debug, warn};

use crate::{
    models::{interval::Interval, kline::Kline, request_params::KlineRequest, time_range::TimeRange},
    providers::{
        ExchangeSource, ProviderError, ProviderInitError,
        binance_rest::{
            params::{DEFAULT_LIMIT, construct_params, validate_limit},
            response::{TickerPrice, collect_symbols, parse_klines},
        },
    },
};

/// Public spot endpoint.
pub const DEFAULT_BASE_URL: &str = "https://api.binance.com";

const KLINES_PATH: &str = "/api/v3/klines";
const TICKER_PRICE_PATH: &str = "/api/v3/ticker/price";
const API_KEY_HEADER: &str = "X-MBX-APIKEY";

/// Everything needed to build a [`BinanceProvider`].
#[derive(Debug, Clone)]
pub struct BinanceSettings {
    /// Registry name this instance answers to.
    pub name: String,
    pub base_url: String,
    pub base_interval: Interval,
    pub limit: u32,
    pub requests_per_second: NonZeroU32,
    /// Optional; public market data does not need it.
    pub api_key: Option<SecretString>,
}

impl Default for BinanceSettings {
    fn default() -> Self {
        Self {
            name: "binance".to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
            base_interval: Interval::OneMinute,
            limit: DEFAULT_LIMIT,
            requests_per_second: nonzero!(10u32),
            api_key: None,
        }
    }
}

pub struct BinanceProvider {
    client: Client,
    name: String,
    base_url: String,
    base_interval: Interval,
    limit: u32,
    limiter: DefaultDirectRateLimiter,
}

impl BinanceProvider {
    /// Creates a new Binance provider.
    ///
    /// When `settings.api_key` is set it is sent on every request as
    /// `X-MBX-APIKEY`.
    pub fn new(settings: BinanceSettings) -> Result<Self, ProviderInitError> {
        let limit = validate_limit(settings.limit)
            .map_err(|e| ProviderInitError::InvalidSettings(e.to_string()))?;
        let base_url = settings.base_url.trim().trim_end_matches('/').to_string();
        if base_url.is_empty() {
            return Err(ProviderInitError::InvalidSettings(
                "base_url must not be empty".to_string(),
            ));
        }

        let mut headers = header::HeaderMap::new();
        if let Some(key) = &settings.api_key {
            let mut value = header::HeaderValue::from_str(key.expose_secret())?;
            value.set_sensitive(true);
            headers.insert(API_KEY_HEADER, value);
        }
        let client = Client::builder().default_headers(headers).build()?;

        let limiter = RateLimiter::direct(Quota::per_second(settings.requests_per_second));

        Ok(Self {
            client,
            name: settings.name,
            base_url,
            base_interval: settings.base_interval,
            limit,
            limiter,
        })
    }

    async fn get(&self, path: &str, query: &[(String, String)]) -> Result<Value, ProviderError> {
        self.limiter.until_ready().await;

        let url = format!("{}{}", self.base_url, path);
        debug!(%url, ?query, "binance request");
        let response = self.client.get(&url).query(query).send().await?;
        let response = check_status(response).await?;
        Ok(response.json::<Value>().await?)
    }
}

async fn check_status(response: Response) -> Result<Response, ProviderError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let message = response
        .text()
        .await
        .unwrap_or_else(|_| "Unknown API error".to_string());
    Err(ProviderError::Api {
        status: status.as_u16(),
        message,
    })
}

#[async_trait]
impl ExchangeSource for BinanceProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn base_interval(&self) -> Interval {
        self.base_interval
    }

    fn max_records_per_call(&self) -> u32 {
        self.limit
    }

    async fn list_symbols(&self) -> Result<BTreeSet<String>, ProviderError> {
        let body = self.get(TICKER_PRICE_PATH, &[]).await?;
        let tickers: Vec<TickerPrice> = serde_json::from_value(body)
            .map_err(|e| ProviderError::MalformedResponse(e.to_string()))?;

        let (symbols, skipped) = collect_symbols(tickers);
        if skipped > 0 {
            warn!(exchange = %self.name, skipped, "ticker entries without a symbol were skipped");
        }
        if symbols.is_empty() {
            return Err(ProviderError::MalformedResponse(
                "symbol listing is empty".to_string(),
            ));
        }
        Ok(symbols.into_iter().collect())
    }

    async fn fetch_klines(
        &self,
        symbol: &str,
        range: TimeRange,
    ) -> Result<Vec<Kline>, ProviderError> {
        let request = KlineRequest {
            symbol: symbol.to_string(),
            interval: self.base_interval,
            range,
            limit: self.limit,
        };
        let body = self.get(KLINES_PATH, &construct_params(&request)).await?;
        let parsed = parse_klines(symbol, &body)?;

        if parsed.dropped > 0 {
            warn!(
                exchange = %self.name,
                symbol,
                start = range.start,
                end = range.end,
                dropped = parsed.dropped,
                first_error = ?parsed.first_error,
                "dropped malformed kline rows"
            );
        }
        Ok(parsed.klines)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_bad_settings() {
        let too_many = BinanceSettings {
            limit: 5000,
            ..Default::default()
        };
        assert!(matches!(
            BinanceProvider::new(too_many),
            Err(ProviderInitError::InvalidSettings(_))
        ));

        let no_url = BinanceSettings {
            base_url: "  ".into(),
            ..Default::default()
        };
        assert!(BinanceProvider::new(no_url).is_err());
    }

    #[test]
    fn span_per_call_follows_interval_and_limit() {
        let provider = BinanceProvider::new(BinanceSettings::default()).unwrap();
        assert_eq!(provider.name(), "binance");
        assert_eq!(provider.time_span_per_call(), 60_000 * 500);
    }

    #[test]
    fn base_url_trailing_slash_is_trimmed() {
        let provider = BinanceProvider::new(BinanceSettings {
            base_url: "http://localhost:9000/".into(),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(provider.base_url, "http://localhost:9000");
    }

    #[test]
    fn api_key_must_be_a_valid_header_value() {
        let ok = BinanceSettings {
            api_key: Some(SecretString::from("abc123")),
            ..Default::default()
        };
        assert!(BinanceProvider::new(ok).is_ok());

        let bad = BinanceSettings {
            api_key: Some(SecretString::from("line\nbreak")),
            ..Default::default()
        };
        assert!(matches!(
            BinanceProvider::new(bad),
            Err(ProviderInitError::InvalidApiKey(_))
        ));
    }
}
