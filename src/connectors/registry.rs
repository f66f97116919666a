use std::sync::Arc;

use super::paper::PaperBook;
use super::{
    BinanceConnector, BybitConnector, ConnectorProvider, ExchangeConnector, KuCoinConnector,
    Mt5Connector, OandaConnector, PaperConnector,
};
use crate::core::config::ExchangesConfig;
use crate::core::ConnectorNotFoundError;

pub const CONNECTOR_NAMES: [&str; 6] = ["binance", "bybit", "kucoin", "oanda", "mt5", "paper"];

/// Builds connectors by name from configured credentials.
pub struct ConnectorRegistry {
    exchanges: ExchangesConfig,
    paper_book: Arc<PaperBook>,
    paper_market_data: Option<String>,
}

impl ConnectorRegistry {
    pub fn new(exchanges: ExchangesConfig) -> Self {
        Self {
            exchanges,
            paper_book: Arc::new(PaperBook::new()),
            paper_market_data: None,
        }
    }

    /// Paper connectors will price market orders and serve candles from
    /// the named live connector.
    pub fn with_paper_market_data(mut self, name: &str) -> Self {
        if name != "paper" {
            self.paper_market_data = Some(name.to_string());
        }
        self
    }

    pub fn paper_book(&self) -> Arc<PaperBook> {
        self.paper_book.clone()
    }

    fn live(&self, name: &str) -> Option<Box<dyn ExchangeConnector>> {
        let connector: Box<dyn ExchangeConnector> = match name {
            "binance" => Box::new(BinanceConnector::new(self.exchanges.binance.clone())),
            "bybit" => Box::new(BybitConnector::new(self.exchanges.bybit.clone())),
            "kucoin" => Box::new(KuCoinConnector::new(self.exchanges.kucoin.clone())),
            "oanda" => Box::new(OandaConnector::new(self.exchanges.oanda.clone())),
            "mt5" => Box::new(Mt5Connector::new(self.exchanges.mt5.clone())),
            _ => return None,
        };
        Some(connector)
    }
}

impl ConnectorProvider for ConnectorRegistry {
    fn connect(&self, name: &str) -> Result<Box<dyn ExchangeConnector>, ConnectorNotFoundError> {
        let key = name.trim().to_ascii_lowercase();

        if key == "paper" {
            let connector = match self.paper_market_data.as_deref().and_then(|n| self.live(n)) {
                Some(source) => PaperConnector::with_market_data(self.paper_book.clone(), source),
                None => PaperConnector::new(self.paper_book.clone()),
            };
            return Ok(Box::new(connector));
        }

        self.live(&key)
            .ok_or_else(|| ConnectorNotFoundError(name.to_string()))
    }
}
