use async_trait::async_trait;
use reqwest::{Client, Method};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;

use super::rate_limiter::{RateLimitConfig, RateLimiter};
use super::signing::{sign_base64, timestamp_millis};
use super::types::{dashed_symbol, format_amount, parse_number, Candle, ExchangeOrder, OrderPayload};
use super::ExchangeConnector;
use crate::core::config::KuCoinCredentials;
use crate::core::ConnectorError;
use crate::models::OrderType;

const EXCHANGE: &str = "kucoin";
const SUCCESS_CODE: &str = "200000";

#[derive(Debug, Deserialize)]
struct KuCoinResponse<T> {
    code: String,
    #[serde(default)]
    msg: Option<String>,
    data: Option<T>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OrderAck {
    order_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct KuCoinOrder {
    id: String,
    is_active: bool,
    cancel_exist: bool,
    #[serde(default)]
    deal_size: String,
    #[serde(default)]
    deal_funds: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CancelAck {
    cancelled_order_ids: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct Level1 {
    price: String,
}

/// KuCoin spot REST with key-version-2 signing.
pub struct KuCoinConnector {
    client: Client,
    credentials: KuCoinCredentials,
    limiter: RateLimiter,
}

impl KuCoinConnector {
    pub fn new(credentials: KuCoinCredentials) -> Self {
        Self {
            client: Client::new(),
            credentials,
            limiter: RateLimiter::new(EXCHANGE, RateLimitConfig::kucoin()),
        }
    }

    fn generate_signature(&self, timestamp: u64, method: &str, endpoint: &str, body: &str) -> String {
        let str_to_sign = format!("{}{}{}{}", timestamp, method, endpoint, body);
        sign_base64(&self.credentials.api_secret, &str_to_sign)
    }

    fn generate_passphrase(&self) -> String {
        sign_base64(&self.credentials.api_secret, &self.credentials.api_passphrase)
    }

    /// `15m` -> `15min`, `1h` -> `1hour`, `1d` -> `1day`.
    pub fn interval(interval: &str) -> String {
        let (digits, unit) = interval.split_at(interval.len().saturating_sub(1));
        let unit = match unit {
            "m" => "min",
            "h" => "hour",
            "d" => "day",
            "w" => "week",
            _ => return "15min".to_string(),
        };
        format!("{}{}", digits, unit)
    }

    async fn request<T: DeserializeOwned>(
        &self,
        method: Method,
        endpoint: &str,
        body: Option<serde_json::Value>,
        weight: u32,
    ) -> Result<T, ConnectorError> {
        let _guard = self.limiter.acquire(endpoint, weight).await;

        let timestamp = timestamp_millis();
        let body_str = body.as_ref().map(|b| b.to_string()).unwrap_or_default();
        let signature = self.generate_signature(timestamp, method.as_str(), endpoint, &body_str);
        let url = format!("{}{}", self.credentials.base_url, endpoint);

        let mut request = self
            .client
            .request(method, &url)
            .header("KC-API-KEY", &self.credentials.api_key)
            .header("KC-API-SIGN", signature)
            .header("KC-API-TIMESTAMP", timestamp.to_string())
            .header("KC-API-PASSPHRASE", self.generate_passphrase())
            .header("KC-API-KEY-VERSION", "2")
            .header("Content-Type", "application/json");

        if body.is_some() {
            request = request.body(body_str);
        }

        let response = request.send().await?;
        let status = response.status();

        if !status.is_success() {
            let message = response.text().await?;
            tracing::error!(%status, %message, "kucoin api error");
            return Err(ConnectorError::Api {
                exchange: EXCHANGE,
                status: status.to_string(),
                message,
            });
        }

        let envelope: KuCoinResponse<T> = response.json().await.map_err(|e| ConnectorError::Decode {
            exchange: EXCHANGE,
            message: e.to_string(),
        })?;

        if envelope.code != SUCCESS_CODE {
            return Err(ConnectorError::Api {
                exchange: EXCHANGE,
                status: envelope.code,
                message: envelope.msg.unwrap_or_default(),
            });
        }

        envelope.data.ok_or_else(|| ConnectorError::Decode {
            exchange: EXCHANGE,
            message: "missing data".to_string(),
        })
    }
}

fn to_exchange_order(order: KuCoinOrder, symbol: &str) -> ExchangeOrder {
    let filled = parse_number(&order.deal_size);
    let funds = parse_number(&order.deal_funds);
    let status = if order.is_active {
        "open"
    } else if order.cancel_exist {
        "canceled"
    } else {
        "closed"
    };

    ExchangeOrder {
        id: order.id,
        symbol: symbol.to_string(),
        status: status.to_string(),
        filled,
        average_price: (filled > 0.0).then(|| funds / filled),
    }
}

/// KuCoin candle rows: `[time(s), open, close, high, low, volume, turnover]`.
fn parse_candle(row: &[String]) -> Option<Candle> {
    Some(Candle {
        open_time: row.first()?.parse::<i64>().ok()? * 1000,
        open: parse_number(row.get(1)?),
        close: parse_number(row.get(2)?),
        high: parse_number(row.get(3)?),
        low: parse_number(row.get(4)?),
        volume: parse_number(row.get(5)?),
    })
}

fn order_body(payload: &OrderPayload) -> serde_json::Value {
    let mut body = json!({
        "clientOid": payload.client_order_id,
        "side": payload.side.as_str(),
        "symbol": dashed_symbol(&payload.symbol),
        "type": payload.order_type.as_str(),
        "size": format_amount(payload.amount),
    });
    // market orders take no price on KuCoin
    if let (OrderType::Limit, Some(price)) = (payload.order_type, payload.price) {
        body["price"] = json!(format_amount(price));
    }
    body
}

#[async_trait]
impl ExchangeConnector for KuCoinConnector {
    fn name(&self) -> &'static str {
        EXCHANGE
    }

    async fn create_order(&self, payload: &OrderPayload) -> Result<ExchangeOrder, ConnectorError> {
        let body = order_body(payload);

        let ack: OrderAck = self
            .request(Method::POST, "/api/v1/orders", Some(body), 2)
            .await?;

        Ok(ExchangeOrder {
            id: ack.order_id,
            symbol: payload.symbol.clone(),
            status: "open".to_string(),
            filled: 0.0,
            average_price: None,
        })
    }

    async fn cancel_order(&self, order_id: &str, symbol: &str) -> Result<ExchangeOrder, ConnectorError> {
        let endpoint = format!("/api/v1/orders/{}", order_id);
        let ack: CancelAck = self.request(Method::DELETE, &endpoint, None, 3).await?;

        if !ack.cancelled_order_ids.iter().any(|id| id == order_id) {
            return Err(ConnectorError::OrderNotFound(order_id.to_string()));
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
        let endpoint = format!("/api/v1/orders/{}", order_id);
        let order: KuCoinOrder = self.request(Method::GET, &endpoint, None, 2).await?;
        Ok(to_exchange_order(order, symbol))
    }

    async fn fetch_price(&self, symbol: &str) -> Result<f64, ConnectorError> {
        let endpoint = format!(
            "/api/v1/market/orderbook/level1?symbol={}",
            dashed_symbol(symbol)
        );
        let level1: Level1 = self.request(Method::GET, &endpoint, None, 2).await?;
        Ok(parse_number(&level1.price))
    }

    async fn fetch_candles(
        &self,
        symbol: &str,
        interval: &str,
        limit: usize,
    ) -> Result<Vec<Candle>, ConnectorError> {
        let endpoint = format!(
            "/api/v1/market/candles?type={}&symbol={}",
            Self::interval(interval),
            dashed_symbol(symbol)
        );
        let rows: Vec<Vec<String>> = self.request(Method::GET, &endpoint, None, 3).await?;

        // Newest first; keep the most recent `limit`, oldest first.
        let mut candles = rows
            .iter()
            .take(limit)
            .map(|row| {
                parse_candle(row).ok_or_else(|| ConnectorError::Decode {
                    exchange: EXCHANGE,
                    message: "malformed candle row".to_string(),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        candles.reverse();
        Ok(candles)
    }
}
