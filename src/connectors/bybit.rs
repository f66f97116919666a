use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;

use super::rate_limiter::{RateLimitConfig, RateLimiter};
use super::signing::{sign_hex, timestamp_millis};
use super::types::{concat_symbol, format_amount, parse_number, Candle, ExchangeOrder, OrderPayload};
use super::ExchangeConnector;
use crate::core::config::ApiCredentials;
use crate::core::ConnectorError;
use crate::models::{OrderType, Side};

const EXCHANGE: &str = "bybit";
const RECV_WINDOW_MS: &str = "5000";
const CATEGORY: &str = "spot";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BybitResponse<T> {
    ret_code: i64,
    ret_msg: String,
    result: Option<T>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OrderAck {
    order_id: String,
}

#[derive(Debug, Deserialize)]
struct ListResult<T> {
    list: Vec<T>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BybitOrder {
    order_id: String,
    order_status: String,
    #[serde(default)]
    cum_exec_qty: String,
    #[serde(default)]
    avg_price: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BybitTicker {
    last_price: String,
}

/// Bybit unified v5 REST, spot category.
pub struct BybitConnector {
    client: Client,
    credentials: ApiCredentials,
    limiter: RateLimiter,
}

impl BybitConnector {
    pub fn new(credentials: ApiCredentials) -> Self {
        Self {
            client: Client::new(),
            credentials,
            limiter: RateLimiter::new(EXCHANGE, RateLimitConfig::bybit()),
        }
    }

    pub fn unify_status(status: &str) -> &'static str {
        match status {
            "Filled" => "closed",
            "Cancelled" | "PartiallyFilledCanceled" | "Deactivated" => "canceled",
            "Rejected" => "rejected",
            _ => "open",
        }
    }

    /// `15m` -> `15`, `1h` -> `60`, `1d` -> `D`.
    pub fn interval(interval: &str) -> String {
        match interval {
            "1d" => "D".to_string(),
            "1w" => "W".to_string(),
            other => {
                let (digits, unit) = other.split_at(other.len().saturating_sub(1));
                let n: u32 = digits.parse().unwrap_or(15);
                match unit {
                    "h" => (n * 60).to_string(),
                    _ => n.to_string(),
                }
            }
        }
    }

    async fn request<T: DeserializeOwned>(
        &self,
        post: bool,
        path: &str,
        query: &str,
        body: Option<serde_json::Value>,
        signed: bool,
    ) -> Result<T, ConnectorError> {
        let _guard = self.limiter.acquire(path, 1).await;

        let url = if query.is_empty() {
            format!("{}{}", self.credentials.base_url, path)
        } else {
            format!("{}{}?{}", self.credentials.base_url, path, query)
        };
        let body_str = body.as_ref().map(|b| b.to_string()).unwrap_or_default();

        let mut request = if post {
            self.client
                .post(&url)
                .header("Content-Type", "application/json")
                .body(body_str.clone())
        } else {
            self.client.get(&url)
        };

        if signed {
            let timestamp = timestamp_millis().to_string();
            let payload = if post { body_str.as_str() } else { query };
            let prehash = format!(
                "{}{}{}{}",
                timestamp, self.credentials.api_key, RECV_WINDOW_MS, payload
            );
            request = request
                .header("X-BAPI-API-KEY", &self.credentials.api_key)
                .header("X-BAPI-TIMESTAMP", timestamp)
                .header("X-BAPI-RECV-WINDOW", RECV_WINDOW_MS)
                .header("X-BAPI-SIGN", sign_hex(&self.credentials.api_secret, &prehash));
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let message = response.text().await?;
            tracing::error!(%status, %message, "bybit api error");
            return Err(ConnectorError::Api {
                exchange: EXCHANGE,
                status: status.to_string(),
                message,
            });
        }

        let envelope: BybitResponse<T> = response.json().await.map_err(|e| ConnectorError::Decode {
            exchange: EXCHANGE,
            message: e.to_string(),
        })?;

        if envelope.ret_code != 0 {
            return Err(ConnectorError::Api {
                exchange: EXCHANGE,
                status: envelope.ret_code.to_string(),
                message: envelope.ret_msg,
            });
        }

        envelope.result.ok_or_else(|| ConnectorError::Decode {
            exchange: EXCHANGE,
            message: "missing result".to_string(),
        })
    }
}

fn to_exchange_order(order: BybitOrder, symbol: &str) -> ExchangeOrder {
    let average = parse_number(&order.avg_price);
    ExchangeOrder {
        id: order.order_id,
        symbol: symbol.to_string(),
        status: BybitConnector::unify_status(&order.order_status).to_string(),
        filled: parse_number(&order.cum_exec_qty),
        average_price: (average > 0.0).then_some(average),
    }
}

fn parse_kline(row: &[String]) -> Option<Candle> {
    Some(Candle {
        open_time: row.first()?.parse().ok()?,
        open: parse_number(row.get(1)?),
        high: parse_number(row.get(2)?),
        low: parse_number(row.get(3)?),
        close: parse_number(row.get(4)?),
        volume: parse_number(row.get(5)?),
    })
}

#[async_trait]
impl ExchangeConnector for BybitConnector {
    fn name(&self) -> &'static str {
        EXCHANGE
    }

    async fn create_order(&self, payload: &OrderPayload) -> Result<ExchangeOrder, ConnectorError> {
        let mut body = json!({
            "category": CATEGORY,
            "symbol": concat_symbol(&payload.symbol),
            "side": match payload.side { Side::Buy => "Buy", Side::Sell => "Sell" },
            "orderType": match payload.order_type { OrderType::Market => "Market", OrderType::Limit => "Limit" },
            "qty": format_amount(payload.amount),
            "orderLinkId": payload.client_order_id,
        });
        if let (OrderType::Limit, Some(price)) = (payload.order_type, payload.price) {
            body["price"] = json!(format_amount(price));
            body["timeInForce"] = json!("GTC");
        }

        let ack: OrderAck = self
            .request(true, "/v5/order/create", "", Some(body), true)
            .await?;

        // Bybit acknowledges asynchronously; fills arrive via fetch_order.
        Ok(ExchangeOrder {
            id: ack.order_id,
            symbol: payload.symbol.clone(),
            status: "open".to_string(),
            filled: 0.0,
            average_price: None,
        })
    }

    async fn cancel_order(&self, order_id: &str, symbol: &str) -> Result<ExchangeOrder, ConnectorError> {
        let body = json!({
            "category": CATEGORY,
            "symbol": concat_symbol(symbol),
            "orderId": order_id,
        });
        let ack: OrderAck = self
            .request(true, "/v5/order/cancel", "", Some(body), true)
            .await?;

        Ok(ExchangeOrder {
            id: ack.order_id,
            symbol: symbol.to_string(),
            status: "canceled".to_string(),
            filled: 0.0,
            average_price: None,
        })
    }

    async fn fetch_order(&self, order_id: &str, symbol: &str) -> Result<ExchangeOrder, ConnectorError> {
        let query = format!(
            "category={}&symbol={}&orderId={}",
            CATEGORY,
            concat_symbol(symbol),
            order_id
        );
        let result: ListResult<BybitOrder> = self
            .request(false, "/v5/order/realtime", &query, None, true)
            .await?;

        result
            .list
            .into_iter()
            .next()
            .map(|order| to_exchange_order(order, symbol))
            .ok_or_else(|| ConnectorError::OrderNotFound(order_id.to_string()))
    }

    async fn fetch_price(&self, symbol: &str) -> Result<f64, ConnectorError> {
        let query = format!("category={}&symbol={}", CATEGORY, concat_symbol(symbol));
        let result: ListResult<BybitTicker> = self
            .request(false, "/v5/market/tickers", &query, None, false)
            .await?;

        result
            .list
            .first()
            .map(|t| parse_number(&t.last_price))
            .ok_or_else(|| ConnectorError::Decode {
                exchange: EXCHANGE,
                message: format!("no ticker for {}", symbol),
            })
    }

    async fn fetch_candles(
        &self,
        symbol: &str,
        interval: &str,
        limit: usize,
    ) -> Result<Vec<Candle>, ConnectorError> {
        let query = format!(
            "category={}&symbol={}&interval={}&limit={}",
            CATEGORY,
            concat_symbol(symbol),
            Self::interval(interval),
            limit.min(1000)
        );
        let result: ListResult<Vec<String>> = self
            .request(false, "/v5/market/kline", &query, None, false)
            .await?;

        // Bybit returns newest first.
        let mut candles = result
            .list
            .iter()
            .map(|row| {
                parse_kline(row).ok_or_else(|| ConnectorError::Decode {
                    exchange: EXCHANGE,
                    message: "malformed kline row".to_string(),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        candles.reverse();
        Ok(candles)
    }
}
