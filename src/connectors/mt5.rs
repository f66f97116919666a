//! MetaTrader 5 through a REST bridge.
//!
//! MT5 has no native HTTP API; terminals are reached through a small bridge
//! service running next to the terminal, which forwards `order_send`,
//! `orders_get`, `symbol_info_tick` and `copy_rates_from_pos` calls.

use async_trait::async_trait;
use reqwest::{Client, Method};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;

use super::rate_limiter::{RateLimitConfig, RateLimiter};
use super::types::{concat_symbol, Candle, ExchangeOrder, OrderPayload};
use super::ExchangeConnector;
use crate::core::config::Mt5Config;
use crate::core::ConnectorError;
use crate::models::OrderType;

const EXCHANGE: &str = "mt5";

const RETCODE_PLACED: i64 = 10008;
const RETCODE_DONE: i64 = 10009;
const RETCODE_DONE_PARTIAL: i64 = 10010;

#[derive(Debug, Deserialize)]
struct TradeResult {
    retcode: i64,
    #[serde(default)]
    order: u64,
    #[serde(default)]
    volume: f64,
    #[serde(default)]
    price: f64,
    #[serde(default)]
    comment: String,
}

#[derive(Debug, Deserialize)]
struct BridgeOrder {
    ticket: u64,
    state: i64,
    volume_initial: f64,
    volume_current: f64,
    #[serde(default)]
    price_open: f64,
}

#[derive(Debug, Deserialize)]
struct Tick {
    bid: f64,
    ask: f64,
    #[serde(default)]
    last: f64,
}

#[derive(Debug, Deserialize)]
struct Rate {
    time: i64,
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    tick_volume: f64,
}

pub struct Mt5Connector {
    client: Client,
    config: Mt5Config,
    limiter: RateLimiter,
}

impl Mt5Connector {
    pub fn new(config: Mt5Config) -> Self {
        Self {
            client: Client::new(),
            config,
            limiter: RateLimiter::new(EXCHANGE, RateLimitConfig::mt5_bridge()),
        }
    }

    /// `15m` -> `M15`, `1h` -> `H1`, `1d` -> `D1`.
    pub fn timeframe(interval: &str) -> String {
        let (digits, unit) = interval.split_at(interval.len().saturating_sub(1));
        match unit {
            "m" => format!("M{}", digits),
            "h" => format!("H{}", digits),
            "d" => "D1".to_string(),
            "w" => "W1".to_string(),
            _ => "M15".to_string(),
        }
    }

    /// MT5 `ORDER_STATE_*` values.
    pub fn unify_state(state: i64) -> &'static str {
        match state {
            4 => "closed",
            2 | 6 => "canceled",
            5 => "rejected",
            _ => "open",
        }
    }

    async fn request<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<serde_json::Value>,
    ) -> Result<T, ConnectorError> {
        let _guard = self.limiter.acquire(path, 1).await;

        let url = format!("{}{}", self.config.bridge_url, path);
        let mut request = self
            .client
            .request(method, &url)
            .header("X-Bridge-Token", &self.config.bridge_token);
        if let Some(body) = body {
            request = request.json(&body);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let message = response.text().await?;
            tracing::error!(%status, %message, "mt5 bridge error");
            return Err(ConnectorError::Api {
                exchange: EXCHANGE,
                status: status.to_string(),
                message,
            });
        }

        response.json().await.map_err(|e| ConnectorError::Decode {
            exchange: EXCHANGE,
            message: e.to_string(),
        })
    }
}

fn from_trade_result(result: TradeResult, symbol: &str, requested: f64) -> ExchangeOrder {
    let (status, filled) = match result.retcode {
        RETCODE_DONE => ("closed", if result.volume > 0.0 { result.volume } else { requested }),
        RETCODE_DONE_PARTIAL => ("open", result.volume),
        RETCODE_PLACED => ("open", 0.0),
        code => {
            tracing::warn!(retcode = code, comment = %result.comment, "mt5 order refused");
            ("rejected", 0.0)
        }
    };

    ExchangeOrder {
        id: result.order.to_string(),
        symbol: symbol.to_string(),
        status: status.to_string(),
        filled,
        average_price: (result.price > 0.0 && filled > 0.0).then_some(result.price),
    }
}

fn from_bridge_order(order: BridgeOrder, symbol: &str) -> ExchangeOrder {
    let filled = (order.volume_initial - order.volume_current).max(0.0);
    ExchangeOrder {
        id: order.ticket.to_string(),
        symbol: symbol.to_string(),
        status: Mt5Connector::unify_state(order.state).to_string(),
        filled,
        average_price: (order.price_open > 0.0).then_some(order.price_open),
    }
}

#[async_trait]
impl ExchangeConnector for Mt5Connector {
    fn name(&self) -> &'static str {
        EXCHANGE
    }

    async fn create_order(&self, payload: &OrderPayload) -> Result<ExchangeOrder, ConnectorError> {
        let mut body = json!({
            "symbol": concat_symbol(&payload.symbol),
            "action": payload.side.as_str(),
            "type": payload.order_type.as_str(),
            "volume": payload.amount,
            "comment": payload.client_order_id,
        });
        if let (OrderType::Limit, Some(price)) = (payload.order_type, payload.price) {
            body["price"] = json!(price);
        }

        let result: TradeResult = self.request(Method::POST, "/order", Some(body)).await?;
        Ok(from_trade_result(result, &payload.symbol, payload.amount))
    }

    async fn cancel_order(&self, order_id: &str, symbol: &str) -> Result<ExchangeOrder, ConnectorError> {
        let result: TradeResult = self
            .request(Method::DELETE, &format!("/order/{}", order_id), None)
            .await?;

        if result.retcode != RETCODE_DONE {
            return Err(ConnectorError::Api {
                exchange: EXCHANGE,
                status: result.retcode.to_string(),
                message: result.comment,
            });
        }

        Ok(ExchangeOrder {
            id: order_id.to_string(),
            symbol: symbol.to_string(),
            status: "canceled".to_string(),
            filled: 0.0,
            average_price: None,
        })
    }

    async fn fetch_order(&self, order_id: &str, symbol: &str) -> Result<ExchangeOrder, ConnectorError> {
        let order: BridgeOrder = self
            .request(Method::GET, &format!("/order/{}", order_id), None)
            .await?;
        Ok(from_bridge_order(order, symbol))
    }

    async fn fetch_price(&self, symbol: &str) -> Result<f64, ConnectorError> {
        let tick: Tick = self
            .request(Method::GET, &format!("/tick/{}", concat_symbol(symbol)), None)
            .await?;

        if tick.last > 0.0 {
            Ok(tick.last)
        } else {
            Ok((tick.bid + tick.ask) / 2.0)
        }
    }

    async fn fetch_candles(
        &self,
        symbol: &str,
        interval: &str,
        limit: usize,
    ) -> Result<Vec<Candle>, ConnectorError> {
        let path = format!(
            "/rates/{}?timeframe={}&count={}",
            concat_symbol(symbol),
            Self::timeframe(interval),
            limit
        );
        let rates: Vec<Rate> = self.request(Method::GET, &path, None).await?;

        Ok(rates
            .into_iter()
            .map(|r| Candle {
                open_time: r.time * 1000,
                open: r.open,
                high: r.high,
                low: r.low,
                close: r.close,
                volume: r.tick_volume,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_done_retcode_is_closed() {
        let result: TradeResult = serde_json::from_str(
            r#"{"retcode":10009,"order":123456,"deal":98765,"volume":0.1,"price":1.0851,"comment":"Request executed"}"#,
        )
        .unwrap();
        let order = from_trade_result(result, "EUR/USD", 0.1);

        assert_eq!(order.id, "123456");
        assert_eq!(order.status, "closed");
        assert_eq!(order.filled, 0.1);
        assert_eq!(order.average_price, Some(1.0851));
    }

    #[test]
    fn test_refused_retcode_is_rejected() {
        let result: TradeResult =
            serde_json::from_str(r#"{"retcode":10019,"comment":"No money"}"#).unwrap();
        let order = from_trade_result(result, "EUR/USD", 0.1);

        assert_eq!(order.status, "rejected");
        assert_eq!(order.filled, 0.0);
    }

    #[test]
    fn test_order_state_mapping() {
        assert_eq!(Mt5Connector::unify_state(1), "open");
        assert_eq!(Mt5Connector::unify_state(4), "closed");
        assert_eq!(Mt5Connector::unify_state(6), "canceled");
        assert_eq!(Mt5Connector::timeframe("1h"), "H1");
    }

    #[test]
    fn test_partial_bridge_order_fill() {
        let order = BridgeOrder {
            ticket: 7,
            state: 3,
            volume_initial: 1.0,
            volume_current: 0.4,
            price_open: 1.1,
        };
        let unified = from_bridge_order(order, "EUR/USD");
        assert_eq!(unified.status, "open");
        assert!((unified.filled - 0.6).abs() < 1e-9);
    }
}
