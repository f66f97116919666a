use async_trait::async_trait;
use chrono::DateTime;
use reqwest::{Client, Method};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;

use super::rate_limiter::{RateLimitConfig, RateLimiter};
use super::types::{format_amount, parse_number, underscored_symbol, Candle, ExchangeOrder, OrderPayload};
use super::ExchangeConnector;
use crate::core::config::OandaConfig;
use crate::core::ConnectorError;
use crate::models::{OrderType, Side};

const EXCHANGE: &str = "oanda";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OandaError {
    error_message: String,
}

#[derive(Debug, Deserialize)]
struct Transaction {
    id: String,
    #[serde(default)]
    units: Option<String>,
    #[serde(default)]
    price: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateOrderResponse {
    order_create_transaction: Transaction,
    #[serde(default)]
    order_fill_transaction: Option<Transaction>,
    #[serde(default)]
    order_cancel_transaction: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct OrderEnvelope {
    order: OandaOrder,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OandaOrder {
    id: String,
    state: String,
    #[serde(default)]
    units: Option<String>,
    #[serde(default)]
    price: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PricingResponse {
    prices: Vec<Price>,
}

#[derive(Debug, Deserialize)]
struct Price {
    bids: Vec<PriceBucket>,
    asks: Vec<PriceBucket>,
}

#[derive(Debug, Deserialize)]
struct PriceBucket {
    price: String,
}

#[derive(Debug, Deserialize)]
struct CandlesResponse {
    candles: Vec<OandaCandle>,
}

#[derive(Debug, Deserialize)]
struct OandaCandle {
    time: String,
    volume: f64,
    complete: bool,
    mid: Option<Ohlc>,
}

#[derive(Debug, Deserialize)]
struct Ohlc {
    o: String,
    h: String,
    l: String,
    c: String,
}

/// Oanda v20 REST. Sells are expressed as negative units.
pub struct OandaConnector {
    client: Client,
    config: OandaConfig,
    limiter: RateLimiter,
}

impl OandaConnector {
    pub fn new(config: OandaConfig) -> Self {
        Self {
            client: Client::new(),
            config,
            limiter: RateLimiter::new(EXCHANGE, RateLimitConfig::oanda()),
        }
    }

    /// `15m` -> `M15`, `4h` -> `H4`, `1d` -> `D`.
    pub fn granularity(interval: &str) -> String {
        let (digits, unit) = interval.split_at(interval.len().saturating_sub(1));
        match unit {
            "m" => format!("M{}", digits),
            "h" => format!("H{}", digits),
            "d" => "D".to_string(),
            "w" => "W".to_string(),
            _ => "M15".to_string(),
        }
    }

    pub fn unify_state(state: &str) -> &'static str {
        match state {
            "FILLED" => "closed",
            "CANCELLED" => "canceled",
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

        let url = format!("{}{}", self.config.base_url, path);
        let mut request = self
            .client
            .request(method, &url)
            .bearer_auth(&self.config.api_token)
            .header("Accept-Datetime-Format", "RFC3339");
        if let Some(body) = body {
            request = request.json(&body);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await?;
            let message = serde_json::from_str::<OandaError>(&body)
                .map(|e| e.error_message)
                .unwrap_or(body);
            tracing::error!(%status, %message, "oanda api error");
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

    fn account_path(&self, suffix: &str) -> String {
        format!("/v3/accounts/{}{}", self.config.account_id, suffix)
    }
}

fn units_abs(units: Option<&String>) -> f64 {
    units.map(|u| parse_number(u).abs()).unwrap_or(0.0)
}

fn from_create_response(response: CreateOrderResponse, symbol: &str) -> ExchangeOrder {
    if let Some(fill) = response.order_fill_transaction {
        return ExchangeOrder {
            id: response.order_create_transaction.id,
            symbol: symbol.to_string(),
            status: "closed".to_string(),
            filled: units_abs(fill.units.as_ref()),
            average_price: fill.price.as_deref().map(parse_number),
        };
    }

    let status = if response.order_cancel_transaction.is_some() {
        "canceled"
    } else {
        "open"
    };
    ExchangeOrder {
        id: response.order_create_transaction.id,
        symbol: symbol.to_string(),
        status: status.to_string(),
        filled: 0.0,
        average_price: None,
    }
}

fn from_order(order: OandaOrder, symbol: &str) -> ExchangeOrder {
    let status = OandaConnector::unify_state(&order.state);
    ExchangeOrder {
        id: order.id,
        symbol: symbol.to_string(),
        status: status.to_string(),
        filled: if status == "closed" {
            units_abs(order.units.as_ref())
        } else {
            0.0
        },
        average_price: order.price.as_deref().map(parse_number),
    }
}

fn to_candle(candle: &OandaCandle) -> Option<Candle> {
    let mid = candle.mid.as_ref()?;
    Some(Candle {
        open_time: DateTime::parse_from_rfc3339(&candle.time).ok()?.timestamp_millis(),
        open: parse_number(&mid.o),
        high: parse_number(&mid.h),
        low: parse_number(&mid.l),
        close: parse_number(&mid.c),
        volume: candle.volume,
    })
}

#[async_trait]
impl ExchangeConnector for OandaConnector {
    fn name(&self) -> &'static str {
        EXCHANGE
    }

    async fn create_order(&self, payload: &OrderPayload) -> Result<ExchangeOrder, ConnectorError> {
        let signed_units = match payload.side {
            Side::Buy => payload.amount,
            Side::Sell => -payload.amount,
        };

        let mut order = json!({
            "instrument": underscored_symbol(&payload.symbol),
            "units": format_amount(signed_units),
            "positionFill": "DEFAULT",
            "clientExtensions": { "id": payload.client_order_id },
        });
        match (payload.order_type, payload.price) {
            (OrderType::Limit, Some(price)) => {
                order["type"] = json!("LIMIT");
                order["price"] = json!(format_amount(price));
                order["timeInForce"] = json!("GTC");
            }
            _ => {
                order["type"] = json!("MARKET");
                order["timeInForce"] = json!("FOK");
            }
        }

        let response: CreateOrderResponse = self
            .request(Method::POST, &self.account_path("/orders"), Some(json!({ "order": order })))
            .await?;
        Ok(from_create_response(response, &payload.symbol))
    }

    async fn cancel_order(&self, order_id: &str, symbol: &str) -> Result<ExchangeOrder, ConnectorError> {
        let path = self.account_path(&format!("/orders/{}/cancel", order_id));
        let _: serde_json::Value = self.request(Method::PUT, &path, None).await?;

        Ok(ExchangeOrder {
            id: order_id.to_string(),
            symbol: symbol.to_string(),
            status: "canceled".to_string(),
            filled: 0.0,
            average_price: None,
        })
    }

    async fn fetch_order(&self, order_id: &str, symbol: &str) -> Result<ExchangeOrder, ConnectorError> {
        let path = self.account_path(&format!("/orders/{}", order_id));
        let envelope: OrderEnvelope = self.request(Method::GET, &path, None).await?;
        Ok(from_order(envelope.order, symbol))
    }

    async fn fetch_price(&self, symbol: &str) -> Result<f64, ConnectorError> {
        let path = self.account_path(&format!(
            "/pricing?instruments={}",
            underscored_symbol(symbol)
        ));
        let pricing: PricingResponse = self.request(Method::GET, &path, None).await?;

        let price = pricing.prices.first().and_then(|p| {
            let bid = parse_number(&p.bids.first()?.price);
            let ask = parse_number(&p.asks.first()?.price);
            Some((bid + ask) / 2.0)
        });
        price.ok_or_else(|| ConnectorError::Decode {
            exchange: EXCHANGE,
            message: format!("no price for {}", symbol),
        })
    }

    async fn fetch_candles(
        &self,
        symbol: &str,
        interval: &str,
        limit: usize,
    ) -> Result<Vec<Candle>, ConnectorError> {
        let path = format!(
            "/v3/instruments/{}/candles?granularity={}&count={}&price=M",
            underscored_symbol(symbol),
            Self::granularity(interval),
            limit.min(5000)
        );
        let response: CandlesResponse = self.request(Method::GET, &path, None).await?;

        Ok(response
            .candles
            .iter()
            .filter(|c| c.complete)
            .filter_map(to_candle)
            .collect())
    }
}
