//! Error types shared across the order pipeline.

use thiserror::Error;

/// A pre-trade check refused the order before it reached an exchange.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RiskCheckError {
    #[error("invalid side '{0}': expected buy or sell")]
    InvalidSide(String),

    #[error("invalid symbol '{0}': expected BASE/QUOTE")]
    InvalidSymbol(String),

    #[error("invalid order type '{0}': expected market or limit")]
    InvalidOrderType(String),

    #[error("limit order requires a price")]
    MissingPrice,

    #[error("invalid price {0}")]
    InvalidPrice(f64),

    #[error("amount {amount} outside allowed range [{min}, {max}]")]
    AmountOutOfRange { amount: f64, min: f64, max: f64 },

    #[error("order value ${value:.2} exceeds limit ${max:.2}")]
    NotionalExceeded { value: f64, max: f64 },

    #[error("no reference price available for {0}")]
    NoReferencePrice(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("connector '{0}' not found")]
pub struct ConnectorNotFoundError(pub String);

#[derive(Debug, Error)]
pub enum ConnectorError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{exchange} api error ({status}): {message}")]
    Api {
        exchange: &'static str,
        status: String,
        message: String,
    },

    #[error("unexpected response from {exchange}: {message}")]
    Decode {
        exchange: &'static str,
        message: String,
    },

    #[error("{0} is not supported by this connector")]
    Unsupported(&'static str),

    #[error("order {0} not found")]
    OrderNotFound(String),
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("corrupt row: {0}")]
    Corrupt(String),
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("MIN_ORDER_QTY ({min}) must be below MAX_ORDER_QTY ({max})")]
    InvertedQtyBounds { min: f64, max: f64 },

    #[error("{0} must be positive")]
    NonPositive(&'static str),

    #[error("{0} must be a finite number")]
    NotFinite(&'static str),

    #[error("{0} must not be empty")]
    Empty(&'static str),
}
