//! In-process simulated venue for dry runs.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::types::{Candle, ExchangeOrder, OrderPayload};
use super::ExchangeConnector;
use crate::core::ConnectorError;
use crate::models::{OrderType, Side};

const EXCHANGE: &str = "paper";

#[derive(Debug, Clone)]
struct RestingOrder {
    side: Side,
    limit: f64,
    amount: f64,
    order: ExchangeOrder,
}

/// Prices and orders shared by every paper connector built from one registry.
#[derive(Debug, Default)]
pub struct PaperBook {
    prices: RwLock<HashMap<String, f64>>,
    orders: RwLock<HashMap<String, RestingOrder>>,
}

impl PaperBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_prices(prices: HashMap<String, f64>) -> Self {
        Self {
            prices: RwLock::new(prices),
            orders: RwLock::new(HashMap::new()),
        }
    }

    /// Records a mark and fills resting limit orders it crosses.
    pub async fn set_price(&self, symbol: &str, price: f64) {
        self.prices.write().await.insert(symbol.to_string(), price);

        let mut orders = self.orders.write().await;
        for resting in orders.values_mut() {
            if resting.order.symbol != symbol || resting.order.status != "open" {
                continue;
            }
            let crosses = match resting.side {
                Side::Buy => price <= resting.limit,
                Side::Sell => price >= resting.limit,
            };
            if crosses {
                resting.order.status = "closed".to_string();
                resting.order.filled = resting.amount;
                resting.order.average_price = Some(resting.limit);
                tracing::info!(
                    order_id = %resting.order.id,
                    symbol,
                    price = resting.limit,
                    "paper limit order filled"
                );
            }
        }
    }

    pub async fn price(&self, symbol: &str) -> Option<f64> {
        self.prices.read().await.get(symbol).copied()
    }
}

pub struct PaperConnector {
    book: Arc<PaperBook>,
    market_data: Option<Box<dyn ExchangeConnector>>,
}

impl PaperConnector {
    pub fn new(book: Arc<PaperBook>) -> Self {
        Self {
            book,
            market_data: None,
        }
    }

    /// Uses a live connector for prices and candles; orders stay simulated.
    pub fn with_market_data(book: Arc<PaperBook>, market_data: Box<dyn ExchangeConnector>) -> Self {
        Self {
            book,
            market_data: Some(market_data),
        }
    }

    async fn reference_price(&self, symbol: &str) -> Option<f64> {
        if let Some(price) = self.book.price(symbol).await {
            return Some(price);
        }
        match &self.market_data {
            Some(source) => match source.fetch_price(symbol).await {
                Ok(price) => Some(price),
                Err(e) => {
                    tracing::warn!(symbol, error = %e, "paper price lookup failed");
                    None
                }
            },
            None => None,
        }
    }
}

#[async_trait]
impl ExchangeConnector for PaperConnector {
    fn name(&self) -> &'static str {
        EXCHANGE
    }

    async fn create_order(&self, payload: &OrderPayload) -> Result<ExchangeOrder, ConnectorError> {
        let id = Uuid::new_v4().to_string();

        let order = match payload.order_type {
            OrderType::Market => {
                match self.reference_price(&payload.symbol).await {
                    Some(price) => ExchangeOrder {
                        id: id.clone(),
                        symbol: payload.symbol.clone(),
                        status: "closed".to_string(),
                        filled: payload.amount,
                        average_price: Some(price),
                    },
                    None => ExchangeOrder {
                        id: id.clone(),
                        symbol: payload.symbol.clone(),
                        status: "rejected".to_string(),
                        filled: 0.0,
                        average_price: None,
                    },
                }
            }
            OrderType::Limit => ExchangeOrder {
                id: id.clone(),
                symbol: payload.symbol.clone(),
                status: "open".to_string(),
                filled: 0.0,
                average_price: None,
            },
        };

        tracing::info!(
            order_id = %&id[..8],
            symbol = %payload.symbol,
            side = %payload.side,
            order_type = %payload.order_type,
            amount = payload.amount,
            status = %order.status,
            "paper order"
        );

        self.book.orders.write().await.insert(
            id,
            RestingOrder {
                side: payload.side,
                limit: payload.price.unwrap_or_default(),
                amount: payload.amount,
                order: order.clone(),
            },
        );

        Ok(order)
    }

    async fn cancel_order(&self, order_id: &str, _symbol: &str) -> Result<ExchangeOrder, ConnectorError> {
        let mut orders = self.book.orders.write().await;
        let resting = orders
            .get_mut(order_id)
            .ok_or_else(|| ConnectorError::OrderNotFound(order_id.to_string()))?;

        if resting.order.status == "open" {
            resting.order.status = "canceled".to_string();
        }
        Ok(resting.order.clone())
    }

    async fn fetch_order(&self, order_id: &str, _symbol: &str) -> Result<ExchangeOrder, ConnectorError> {
        self.book
            .orders
            .read()
            .await
            .get(order_id)
            .map(|r| r.order.clone())
            .ok_or_else(|| ConnectorError::OrderNotFound(order_id.to_string()))
    }

    async fn fetch_price(&self, symbol: &str) -> Result<f64, ConnectorError> {
        self.reference_price(symbol)
            .await
            .ok_or(ConnectorError::Unsupported("price lookup without market data"))
    }

    async fn fetch_candles(
        &self,
        symbol: &str,
        interval: &str,
        limit: usize,
    ) -> Result<Vec<Candle>, ConnectorError> {
        match &self.market_data {
            Some(source) => source.fetch_candles(symbol, interval, limit).await,
            None => Err(ConnectorError::Unsupported("candles without market data")),
        }
    }

    async fn close(&self) -> Result<(), ConnectorError> {
        if let Some(source) = &self.market_data {
            source.close().await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload(order_type: OrderType, price: Option<f64>) -> OrderPayload {
        OrderPayload {
            client_order_id: "c1".to_string(),
            symbol: "BTC/USDT".to_string(),
            side: Side::Buy,
            order_type,
            amount: 0.5,
            price,
        }
    }

    fn book_with_btc(price: f64) -> Arc<PaperBook> {
        Arc::new(PaperBook::with_prices(HashMap::from([(
            "BTC/USDT".to_string(),
            price,
        )])))
    }

    #[tokio::test]
    async fn test_market_order_fills_at_reference_price() {
        let connector = PaperConnector::new(book_with_btc(30000.0));

        let order = connector.create_order(&payload(OrderType::Market, None)).await.unwrap();

        assert_eq!(order.status, "closed");
        assert_eq!(order.filled, 0.5);
        assert_eq!(order.average_price, Some(30000.0));
    }

    #[tokio::test]
    async fn test_market_order_ignores_payload_price() {
        let connector = PaperConnector::new(book_with_btc(30000.0));

        let order = connector
            .create_order(&payload(OrderType::Market, Some(1.0)))
            .await
            .unwrap();

        assert_eq!(order.average_price, Some(30000.0));
    }

    #[tokio::test]
    async fn test_market_order_without_price_is_rejected() {
        let connector = PaperConnector::new(Arc::new(PaperBook::new()));

        let order = connector.create_order(&payload(OrderType::Market, None)).await.unwrap();

        assert_eq!(order.status, "rejected");
        assert_eq!(order.filled, 0.0);
    }

    #[tokio::test]
    async fn test_limit_order_rests_then_fills_when_crossed() {
        let book = book_with_btc(30000.0);
        let connector = PaperConnector::new(book.clone());

        let order = connector
            .create_order(&payload(OrderType::Limit, Some(29000.0)))
            .await
            .unwrap();
        assert_eq!(order.status, "open");

        book.set_price("BTC/USDT", 29500.0).await;
        let still_open = connector.fetch_order(&order.id, "BTC/USDT").await.unwrap();
        assert_eq!(still_open.status, "open");

        book.set_price("BTC/USDT", 28950.0).await;
        let filled = connector.fetch_order(&order.id, "BTC/USDT").await.unwrap();
        assert_eq!(filled.status, "closed");
        assert_eq!(filled.filled, 0.5);
    }

    #[tokio::test]
    async fn test_cancel_resting_order() {
        let connector = PaperConnector::new(book_with_btc(30000.0));
        let order = connector
            .create_order(&payload(OrderType::Limit, Some(100.0)))
            .await
            .unwrap();

        let canceled = connector.cancel_order(&order.id, "BTC/USDT").await.unwrap();
        assert_eq!(canceled.status, "canceled");

        let missing = connector.cancel_order("nope", "BTC/USDT").await;
        assert!(matches!(missing, Err(ConnectorError::OrderNotFound(_))));
    }

    #[tokio::test]
    async fn test_candles_unsupported_without_market_data() {
        let connector = PaperConnector::new(Arc::new(PaperBook::new()));
        let result = connector.fetch_candles("BTC/USDT", "15m", 10).await;
        assert!(matches!(result, Err(ConnectorError::Unsupported(_))));
    }
}
