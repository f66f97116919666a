use async_trait::async_trait;
use mockall::mock;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use retail_trading_bot::connectors::{
    Candle, ConnectorProvider, ExchangeConnector, ExchangeOrder, OrderPayload,
};
use retail_trading_bot::core::config::RiskConfig;
use retail_trading_bot::core::{ConnectorError, ConnectorNotFoundError, RiskCheckError};
use retail_trading_bot::models::{Order, OrderRequest, OrderStatus, OrderType, Side};
use retail_trading_bot::storage::{OrderStore, SqliteStore};
use retail_trading_bot::trading::{OrderRouter, RiskManager, RouterError};

mock! {
    pub Exchange {}

    #[async_trait]
    impl ExchangeConnector for Exchange {
        fn name(&self) -> &'static str;
        async fn create_order(&self, payload: &OrderPayload) -> Result<ExchangeOrder, ConnectorError>;
        async fn cancel_order(&self, order_id: &str, symbol: &str) -> Result<ExchangeOrder, ConnectorError>;
        async fn fetch_order(&self, order_id: &str, symbol: &str) -> Result<ExchangeOrder, ConnectorError>;
        async fn fetch_price(&self, symbol: &str) -> Result<f64, ConnectorError>;
        async fn fetch_candles(&self, symbol: &str, interval: &str, limit: usize) -> Result<Vec<Candle>, ConnectorError>;
        async fn close(&self) -> Result<(), ConnectorError>;
    }
}

/// Hands out prepared mocks for "binance", one per `connect`.
struct MockProvider {
    connectors: Mutex<VecDeque<MockExchange>>,
}

impl MockProvider {
    fn new(connectors: Vec<MockExchange>) -> Self {
        Self {
            connectors: Mutex::new(connectors.into()),
        }
    }
}

impl ConnectorProvider for MockProvider {
    fn connect(&self, name: &str) -> Result<Box<dyn ExchangeConnector>, ConnectorNotFoundError> {
        if name != "binance" {
            return Err(ConnectorNotFoundError(name.to_string()));
        }
        let connector = self.connectors.lock().unwrap().pop_front().expect("no connector prepared");
        Ok(Box::new(connector))
    }
}

/// A mock that must be closed exactly once.
fn exchange() -> MockExchange {
    let mut mock = MockExchange::new();
    mock.expect_name().returning(|| "binance");
    mock.expect_close().times(1).returning(|| Ok(()));
    mock
}

fn ack(id: &str, status: &str, filled: f64, average_price: Option<f64>) -> ExchangeOrder {
    ExchangeOrder {
        id: id.to_string(),
        symbol: "BTC/USDT".to_string(),
        status: status.to_string(),
        filled,
        average_price,
    }
}

async fn setup(connectors: Vec<MockExchange>) -> (OrderRouter, Arc<SqliteStore>) {
    let store = Arc::new(SqliteStore::in_memory().await.unwrap());
    let router = OrderRouter::new(
        store.clone(),
        Arc::new(MockProvider::new(connectors)),
        RiskManager::new(RiskConfig::default()),
    );
    (router, store)
}

async fn only_row(store: &SqliteStore) -> Order {
    let mut orders = store.orders_for_user("user-1").await.unwrap();
    assert_eq!(orders.len(), 1, "expected exactly one order row");
    orders.remove(0)
}

#[tokio::test]
async fn limit_order_is_submitted_once_and_stored_open() {
    let mut mock = exchange();
    mock.expect_fetch_price().never();
    mock.expect_create_order()
        .withf(|p| {
            p.symbol == "BTC/USDT"
                && p.side == Side::Buy
                && p.order_type == OrderType::Limit
                && p.amount == 0.01
                && p.price == Some(50_000.0)
        })
        .times(1)
        .returning(|_| Ok(ack("ex-1", "open", 0.0, None)));
    let (router, store) = setup(vec![mock]).await;

    let request = OrderRequest::limit("BTC/USDT", Side::Buy, 0.01, 50_000.0);
    let order = router.route_order("user-1", "binance", &request).await.unwrap();

    assert_eq!(order.status, OrderStatus::Open);
    assert_eq!(order.external_id.as_deref(), Some("ex-1"));

    let row = only_row(&store).await;
    assert_eq!(row.id, order.id);
    assert_eq!(row.status, OrderStatus::Open);
    assert_eq!(row.connector, "binance");
}

#[tokio::test]
async fn closed_market_order_with_fill_is_filled() {
    let mut mock = exchange();
    mock.expect_fetch_price().times(1).returning(|_| Ok(100.0));
    mock.expect_create_order()
        .times(1)
        .returning(|_| Ok(ack("ex-2", "closed", 1.5, Some(100.5))));
    let (router, store) = setup(vec![mock]).await;

    let request = OrderRequest::market("BTC/USDT", Side::Sell, 1.5);
    let order = router.route_order("user-1", "binance", &request).await.unwrap();

    assert_eq!(order.status, OrderStatus::Filled);
    assert_eq!(order.price, Some(100.5));

    let row = only_row(&store).await;
    assert_eq!(row.status, OrderStatus::Filled);
    assert_eq!(row.side, "sell");
}

#[tokio::test]
async fn oversized_amount_is_rejected_without_touching_the_exchange() {
    let mut mock = MockExchange::new();
    mock.expect_create_order().never();
    mock.expect_close().never();
    let (router, store) = setup(vec![mock]).await;

    let request = OrderRequest::limit("BTC/USDT", Side::Buy, 101.0, 10.0);
    let err = router.route_order("user-1", "binance", &request).await.unwrap_err();

    assert!(matches!(err, RouterError::Risk(RiskCheckError::AmountOutOfRange { .. })));
    let row = only_row(&store).await;
    assert_eq!(row.status, OrderStatus::Rejected);
    assert!(row.external_id.is_none());
    assert!(row.reason.is_some());
}

#[tokio::test]
async fn symbol_without_separator_is_rejected() {
    let (router, store) = setup(vec![]).await;

    let request = OrderRequest::market("BTCUSDT", Side::Buy, 0.01);
    let err = router.route_order("user-1", "binance", &request).await.unwrap_err();

    assert!(matches!(err, RouterError::Risk(RiskCheckError::InvalidSymbol(_))));
    let row = only_row(&store).await;
    assert_eq!(row.status, OrderStatus::Rejected);
    assert!(row.external_id.is_none());
}

#[tokio::test]
async fn unknown_connector_is_rejected_and_recorded() {
    let (router, store) = setup(vec![]).await;

    let request = OrderRequest::limit("BTC/USDT", Side::Buy, 0.01, 50_000.0);
    let err = router.route_order("user-1", "ftx", &request).await.unwrap_err();

    assert!(matches!(err, RouterError::ConnectorNotFound(ConnectorNotFoundError(ref n)) if n == "ftx"));
    let row = only_row(&store).await;
    assert_eq!(row.status, OrderStatus::Rejected);
    assert_eq!(row.connector, "ftx");
}

#[tokio::test]
async fn exchange_failure_leaves_single_rejected_row() {
    let mut mock = exchange();
    mock.expect_create_order().times(1).returning(|_| {
        Err(ConnectorError::Api {
            exchange: "binance",
            status: "400".to_string(),
            message: "insufficient balance".to_string(),
        })
    });
    let (router, store) = setup(vec![mock]).await;

    let request = OrderRequest::limit("BTC/USDT", Side::Buy, 0.01, 50_000.0);
    let err = router.route_order("user-1", "binance", &request).await.unwrap_err();

    assert!(matches!(err, RouterError::Exchange(ConnectorError::Api { .. })));
    let row = only_row(&store).await;
    assert_eq!(row.status, OrderStatus::Rejected);
    assert!(row.external_id.is_none());
    assert!(row.reason.unwrap().contains("insufficient balance"));
}

#[tokio::test]
async fn market_order_over_notional_limit_is_rejected() {
    let mut mock = exchange();
    mock.expect_fetch_price().returning(|_| Ok(1_000_000.0));
    mock.expect_create_order().never();
    let (router, store) = setup(vec![mock]).await;

    let request = OrderRequest::market("BTC/USDT", Side::Buy, 1.0);
    let err = router.route_order("user-1", "binance", &request).await.unwrap_err();

    assert!(matches!(err, RouterError::Risk(RiskCheckError::NotionalExceeded { .. })));
    assert_eq!(only_row(&store).await.status, OrderStatus::Rejected);
}

#[tokio::test]
async fn market_order_without_reference_price_is_rejected() {
    let mut mock = exchange();
    mock.expect_fetch_price()
        .returning(|_| Err(ConnectorError::Unsupported("ticker")));
    mock.expect_create_order().never();
    let (router, store) = setup(vec![mock]).await;

    let request = OrderRequest::market("BTC/USDT", Side::Buy, 0.01);
    let err = router.route_order("user-1", "binance", &request).await.unwrap_err();

    assert!(matches!(err, RouterError::Risk(RiskCheckError::NoReferencePrice(_))));
    let row = only_row(&store).await;
    assert_eq!(row.status, OrderStatus::Rejected);
    assert!(row.external_id.is_none());
}

#[tokio::test]
async fn exchange_side_rejection_is_stored_with_external_id() {
    let mut mock = exchange();
    mock.expect_create_order()
        .times(1)
        .returning(|_| Ok(ack("ex-3", "rejected", 0.0, None)));
    let (router, store) = setup(vec![mock]).await;

    let request = OrderRequest::limit("BTC/USDT", Side::Buy, 0.01, 50_000.0);
    let order = router.route_order("user-1", "binance", &request).await.unwrap();

    assert_eq!(order.status, OrderStatus::Rejected);
    let row = only_row(&store).await;
    assert_eq!(row.external_id.as_deref(), Some("ex-3"));
}

#[tokio::test]
async fn resting_order_can_be_canceled() {
    let mut submit = exchange();
    submit
        .expect_create_order()
        .times(1)
        .returning(|_| Ok(ack("ex-4", "open", 0.0, None)));

    let mut cancel = exchange();
    cancel
        .expect_cancel_order()
        .withf(|id, symbol| id == "ex-4" && symbol == "BTC/USDT")
        .times(1)
        .returning(|_, _| Ok(ack("ex-4", "canceled", 0.0, None)));

    let (router, store) = setup(vec![submit, cancel]).await;

    let request = OrderRequest::limit("BTC/USDT", Side::Buy, 0.01, 50_000.0);
    let order = router.route_order("user-1", "binance", &request).await.unwrap();
    let canceled = router.cancel_order(&order.id).await.unwrap();

    assert_eq!(canceled.status, OrderStatus::Canceled);
    assert_eq!(only_row(&store).await.status, OrderStatus::Canceled);
}

#[tokio::test]
async fn refresh_picks_up_fill() {
    let mut submit = exchange();
    submit
        .expect_create_order()
        .returning(|_| Ok(ack("ex-5", "open", 0.0, None)));

    let mut poll = exchange();
    poll.expect_fetch_order()
        .times(1)
        .returning(|_, _| Ok(ack("ex-5", "closed", 0.01, Some(49_990.0))));

    let (router, store) = setup(vec![submit, poll]).await;

    let request = OrderRequest::limit("BTC/USDT", Side::Buy, 0.01, 50_000.0);
    let order = router.route_order("user-1", "binance", &request).await.unwrap();
    let refreshed = router.refresh_order(&order.id).await.unwrap();

    assert_eq!(refreshed.status, OrderStatus::Filled);
    let row = only_row(&store).await;
    assert_eq!(row.status, OrderStatus::Filled);
    assert_eq!(row.price, Some(49_990.0));
}

#[tokio::test]
async fn rejected_order_cannot_be_canceled() {
    let (router, store) = setup(vec![]).await;

    let request = OrderRequest::market("BTCUSDT", Side::Buy, 0.01);
    let _ = router.route_order("user-1", "binance", &request).await;
    let row = only_row(&store).await;

    let err = router.cancel_order(&row.id).await.unwrap_err();
    assert!(matches!(err, RouterError::InvalidState { status: OrderStatus::Rejected, .. }));

    let err = router.cancel_order("missing").await.unwrap_err();
    assert!(matches!(err, RouterError::UnknownOrder(_)));
}

fn market_with_price(amount: f64, price: f64) -> OrderRequest {
    OrderRequest {
        price: Some(price),
        ..OrderRequest::market("BTC/USDT", Side::Buy, amount)
    }
}

#[tokio::test]
async fn market_order_is_valued_at_reference_not_request_price() {
    let mut mock = exchange();
    mock.expect_fetch_price().times(1).returning(|_| Ok(30_000.0));
    mock.expect_create_order().never();
    let (router, store) = setup(vec![mock]).await;

    let request = market_with_price(50.0, 1.0);
    let err = router.route_order("user-1", "binance", &request).await.unwrap_err();

    assert!(matches!(err, RouterError::Risk(RiskCheckError::NotionalExceeded { .. })));
    let row = only_row(&store).await;
    assert_eq!(row.status, OrderStatus::Rejected);
    assert!(row.external_id.is_none());
}

#[tokio::test]
async fn market_order_price_is_not_forwarded() {
    let mut mock = exchange();
    mock.expect_fetch_price().times(1).returning(|_| Ok(30_000.0));
    mock.expect_create_order()
        .withf(|p| p.order_type == OrderType::Market && p.price.is_none())
        .times(1)
        .returning(|_| Ok(ack("ex-6", "closed", 0.1, Some(30_010.0))));
    let (router, store) = setup(vec![mock]).await;

    let request = market_with_price(0.1, 1.0);
    let order = router.route_order("user-1", "binance", &request).await.unwrap();

    assert_eq!(order.status, OrderStatus::Filled);
    assert_eq!(only_row(&store).await.price, Some(30_010.0));
}
