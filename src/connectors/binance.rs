use async_trait::async_trait;
use reqwest::{Client, Method};
use serde::de::DeserializeOwned;
use serde::Deserialize;

use super::rate_limiter::{RateLimitConfig, RateLimiter};
use super::signing::{sign_hex, timestamp_millis};
use super::types::{concat_symbol, format_amount, parse_number, Candle, ExchangeOrder, OrderPayload};
use super::ExchangeConnector;
use crate::core::config::ApiCredentials;
use crate::core::ConnectorError;
use crate::models::{OrderType, Side};

const EXCHANGE: &str = "binance";
const RECV_WINDOW_MS: u64 = 5000;

#[derive(Debug, Deserialize)]
struct BinanceError {
    code: i64,
    msg: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BinanceOrder {
    symbol: String,
    order_id: u64,
    status: String,
    #[serde(default)]
    executed_qty: String,
    #[serde(default)]
    cummulative_quote_qty: String,
}

#[derive(Debug, Deserialize)]
struct BinanceTicker {
    price: String,
}

/// Binance spot REST (`/api/v3`).
pub struct BinanceConnector {
    client: Client,
    credentials: ApiCredentials,
    limiter: RateLimiter,
}

impl BinanceConnector {
    pub fn new(credentials: ApiCredentials) -> Self {
        Self {
            client: Client::new(),
            credentials,
            limiter: RateLimiter::new(EXCHANGE, RateLimitConfig::binance()),
        }
    }

    /// Maps Binance order states onto the unified vocabulary.
    pub fn unify_status(status: &str) -> &'static str {
        match status {
            "FILLED" => "closed",
            "CANCELED" | "PENDING_CANCEL" | "EXPIRED" | "EXPIRED_IN_MATCH" => "canceled",
            "REJECTED" => "rejected",
            _ => "open",
        }
    }

    fn to_exchange_order(order: BinanceOrder, unified_symbol: &str) -> ExchangeOrder {
        let filled = parse_number(&order.executed_qty);
        let quote = parse_number(&order.cummulative_quote_qty);
        tracing::trace!(native_symbol = %order.symbol, "binance order decoded");

        ExchangeOrder {
            id: order.order_id.to_string(),
            symbol: unified_symbol.to_string(),
            status: Self::unify_status(&order.status).to_string(),
            filled,
            average_price: (filled > 0.0).then(|| quote / filled),
        }
    }

    async fn request<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        mut params: Vec<(&str, String)>,
        signed: bool,
        weight: u32,
    ) -> Result<T, ConnectorError> {
        let _guard = self.limiter.acquire(path, weight).await;

        if signed {
            params.push(("recvWindow", RECV_WINDOW_MS.to_string()));
            params.push(("timestamp", timestamp_millis().to_string()));
        }

        let mut query = params
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join("&");

        if signed {
            let signature = sign_hex(&self.credentials.api_secret, &query);
            query = format!("{}&signature={}", query, signature);
        }

        let url = if query.is_empty() {
            format!("{}{}", self.credentials.base_url, path)
        } else {
            format!("{}{}?{}", self.credentials.base_url, path, query)
        };

        let mut request = self.client.request(method, &url);
        if signed {
            request = request.header("X-MBX-APIKEY", &self.credentials.api_key);
        }

        let response = request.send().await?;
        let status = response.status();

        if !status.is_success() {
            let body = response.text().await?;
            let message = serde_json::from_str::<BinanceError>(&body)
                .map(|e| format!("{} (code {})", e.msg, e.code))
                .unwrap_or(body);
            tracing::error!(%status, %message, "binance api error");
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

fn parse_kline(row: &[serde_json::Value]) -> Option<Candle> {
    let num = |i: usize| -> Option<f64> { row.get(i)?.as_str().map(parse_number) };
    Some(Candle {
        open_time: row.first()?.as_i64()?,
        open: num(1)?,
        high: num(2)?,
        low: num(3)?,
        close: num(4)?,
        volume: num(5)?,
    })
}

#[async_trait]
impl ExchangeConnector for BinanceConnector {
    fn name(&self) -> &'static str {
        EXCHANGE
    }

    async fn create_order(&self, payload: &OrderPayload) -> Result<ExchangeOrder, ConnectorError> {
        let mut params = vec![
            ("symbol", concat_symbol(&payload.symbol)),
            (
                "side",
                match payload.side {
                    Side::Buy => "BUY",
                    Side::Sell => "SELL",
                }
                .to_string(),
            ),
            (
                "type",
                match payload.order_type {
                    OrderType::Market => "MARKET",
                    OrderType::Limit => "LIMIT",
                }
                .to_string(),
            ),
            ("quantity", format_amount(payload.amount)),
            ("newClientOrderId", payload.client_order_id.clone()),
            ("newOrderRespType", "FULL".to_string()),
        ];
        if payload.order_type == OrderType::Limit {
            let price = payload.price.ok_or_else(|| ConnectorError::Decode {
                exchange: EXCHANGE,
                message: "limit order without price".to_string(),
            })?;
            params.push(("price", format_amount(price)));
            params.push(("timeInForce", "GTC".to_string()));
        }

        let order: BinanceOrder = self
            .request(Method::POST, "/api/v3/order", params, true, 1)
            .await?;
        Ok(Self::to_exchange_order(order, &payload.symbol))
    }

    async fn cancel_order(&self, order_id: &str, symbol: &str) -> Result<ExchangeOrder, ConnectorError> {
        let params = vec![
            ("symbol", concat_symbol(symbol)),
            ("orderId", order_id.to_string()),
        ];
        let order: BinanceOrder = self
            .request(Method::DELETE, "/api/v3/order", params, true, 1)
            .await?;
        Ok(Self::to_exchange_order(order, symbol))
    }

    async fn fetch_order(&self, order_id: &str, symbol: &str) -> Result<ExchangeOrder, ConnectorError> {
        let params = vec![
            ("symbol", concat_symbol(symbol)),
            ("orderId", order_id.to_string()),
        ];
        let order: BinanceOrder = self
            .request(Method::GET, "/api/v3/order", params, true, 4)
            .await?;
        Ok(Self::to_exchange_order(order, symbol))
    }

    async fn fetch_price(&self, symbol: &str) -> Result<f64, ConnectorError> {
        let params = vec![("symbol", concat_symbol(symbol))];
        let ticker: BinanceTicker = self
            .request(Method::GET, "/api/v3/ticker/price", params, false, 2)
            .await?;
        Ok(parse_number(&ticker.price))
    }

    async fn fetch_candles(
        &self,
        symbol: &str,
        interval: &str,
        limit: usize,
    ) -> Result<Vec<Candle>, ConnectorError> {
        let params = vec![
            ("symbol", concat_symbol(symbol)),
            ("interval", interval.to_string()),
            ("limit", limit.min(1000).to_string()),
        ];
        let rows: Vec<Vec<serde_json::Value>> = self
            .request(Method::GET, "/api/v3/klines", params, false, 2)
            .await?;

        rows.iter()
            .map(|row| {
                parse_kline(row).ok_or_else(|| ConnectorError::Decode {
                    exchange: EXCHANGE,
                    message: "malformed kline row".to_string(),
                })
            })
            .collect()
    }
}
