use reqwest::header::InvalidHeaderValue;
use thiserror::Error;

use crate::models::kline::KlineError;

/// Errors that can occur within an `ExchangeSource` implementation.
///
/// Every variant is a fetch failure from the caller's point of view: the
/// whole request produced nothing usable.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// Transport failure (connect, TLS, body read, decode).
    #[error("API request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The exchange answered with a non-success status.
    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    /// The body was valid JSON but not the shape we expect, or was empty.
    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    /// The request parameters were invalid for this exchange.
    #[error("Invalid parameters for provider: {0}")]
    Validation(String),
}

/// Errors that can occur while building a provider instance.
#[derive(Debug, Error)]
pub enum ProviderInitError {
    #[error("Failed to build HTTP client: {0}")]
    ClientBuild(#[from] reqwest::Error),

    #[error("API key is not a valid header value")]
    InvalidApiKey(#[from] InvalidHeaderValue),

    #[error("Invalid provider settings: {0}")]
    InvalidSettings(String),
}

/// A single exchange row that could not be turned into a [`Kline`](crate::models::kline::Kline).
///
/// Row errors never fail a batch; the row is dropped and counted.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RowError {
    #[error("row is not an array")]
    NotAnArray,

    #[error("row has {found} fields, expected at least {expected}")]
    TooFewFields { found: usize, expected: usize },

    #[error("field {index} ({name}): {reason}")]
    InvalidField {
        index: usize,
        name: &'static str,
        reason: String,
    },

    #[error("invalid kline: {0}")]
    Invalid(#[from] KlineError),
}
