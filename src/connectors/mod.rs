//! Exchange connectivity.
//!
//! Every venue sits behind [`ExchangeConnector`], which speaks the unified
//! order model (`BASE/QUOTE` symbols, [`OrderPayload`] in, [`ExchangeOrder`]
//! out). Connectors are created per use through a [`ConnectorProvider`] and
//! closed by whoever opened them.

pub mod binance;
pub mod bybit;
pub mod kucoin;
pub mod mt5;
pub mod oanda;
pub mod paper;
pub mod rate_limiter;
pub mod registry;
pub mod signing;
pub mod types;

use async_trait::async_trait;

use crate::core::{ConnectorError, ConnectorNotFoundError};

pub use binance::BinanceConnector;
pub use bybit::BybitConnector;
pub use kucoin::KuCoinConnector;
pub use mt5::Mt5Connector;
pub use oanda::OandaConnector;
pub use paper::PaperConnector;
pub use rate_limiter::{RateLimitConfig, RateLimiter};
pub use registry::ConnectorRegistry;
pub use types::{Candle, ExchangeOrder, OrderPayload};

#[async_trait]
pub trait ExchangeConnector: Send + Sync {
    fn name(&self) -> &'static str;

    /// Submits one order. Implementations must not retry internally.
    async fn create_order(&self, payload: &OrderPayload) -> Result<ExchangeOrder, ConnectorError>;

    async fn cancel_order(&self, order_id: &str, symbol: &str) -> Result<ExchangeOrder, ConnectorError>;

    async fn fetch_order(&self, order_id: &str, symbol: &str) -> Result<ExchangeOrder, ConnectorError>;

    async fn fetch_price(&self, symbol: &str) -> Result<f64, ConnectorError>;

    /// Oldest candle first.
    async fn fetch_candles(
        &self,
        symbol: &str,
        interval: &str,
        limit: usize,
    ) -> Result<Vec<Candle>, ConnectorError>;

    async fn close(&self) -> Result<(), ConnectorError> {
        Ok(())
    }
}

/// Resolves a connector by exchange name.
pub trait ConnectorProvider: Send + Sync {
    fn connect(&self, name: &str) -> Result<Box<dyn ExchangeConnector>, ConnectorNotFoundError>;
}
