use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Buy => "buy",
            Side::Sell => "sell",
        }
    }
}

impl FromStr for Side {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "buy" => Ok(Side::Buy),
            "sell" => Ok(Side::Sell),
            other => Err(other.to_string()),
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderType {
    Market,
    Limit,
}

impl OrderType {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderType::Market => "market",
            OrderType::Limit => "limit",
        }
    }
}

impl FromStr for OrderType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "market" => Ok(OrderType::Market),
            "limit" => Ok(OrderType::Limit),
            other => Err(other.to_string()),
        }
    }
}

impl fmt::Display for OrderType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Local lifecycle of a routed order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Pending,
    Open,
    Filled,
    Canceled,
    Rejected,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Open => "open",
            OrderStatus::Filled => "filled",
            OrderStatus::Canceled => "canceled",
            OrderStatus::Rejected => "rejected",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OrderStatus::Filled | OrderStatus::Canceled | OrderStatus::Rejected
        )
    }
}

impl FromStr for OrderStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(OrderStatus::Pending),
            "open" => Ok(OrderStatus::Open),
            "filled" => Ok(OrderStatus::Filled),
            "canceled" => Ok(OrderStatus::Canceled),
            "rejected" => Ok(OrderStatus::Rejected),
            other => Err(format!("unknown order status '{}'", other)),
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unvalidated order input, in the JSON shape strategies and callers submit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderRequest {
    pub symbol: String,
    pub side: String,
    #[serde(rename = "type")]
    pub order_type: String,
    pub amount: f64,
    #[serde(default)]
    pub price: Option<f64>,
}

impl OrderRequest {
    pub fn market(symbol: &str, side: Side, amount: f64) -> Self {
        Self {
            symbol: symbol.to_string(),
            side: side.as_str().to_string(),
            order_type: OrderType::Market.as_str().to_string(),
            amount,
            price: None,
        }
    }

    pub fn limit(symbol: &str, side: Side, amount: f64, price: f64) -> Self {
        Self {
            symbol: symbol.to_string(),
            side: side.as_str().to_string(),
            order_type: OrderType::Limit.as_str().to_string(),
            amount,
            price: Some(price),
        }
    }
}

/// Persisted order row. `side` and `order_type` stay as submitted so that
/// rejected requests with malformed fields are still recorded verbatim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: String,
    pub user_id: String,
    pub connector: String,
    pub symbol: String,
    pub side: String,
    pub order_type: String,
    pub qty: f64,
    pub price: Option<f64>,
    pub status: OrderStatus,
    pub external_id: Option<String>,
    pub reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    pub fn from_request(
        user_id: &str,
        connector: &str,
        request: &OrderRequest,
        status: OrderStatus,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            connector: connector.to_string(),
            symbol: request.symbol.clone(),
            side: request.side.clone(),
            order_type: request.order_type.clone(),
            qty: request.amount,
            price: request.price,
            status,
            external_id: None,
            reason: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn rejected(user_id: &str, connector: &str, request: &OrderRequest, reason: String) -> Self {
        let mut order = Self::from_request(user_id, connector, request, OrderStatus::Rejected);
        order.reason = Some(reason);
        order
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_side_parsing_is_case_insensitive() {
        assert_eq!("BUY".parse::<Side>(), Ok(Side::Buy));
        assert_eq!(" sell ".parse::<Side>(), Ok(Side::Sell));
        assert!("hold".parse::<Side>().is_err());
    }

    #[test]
    fn test_status_round_trips_through_text() {
        for status in [
            OrderStatus::Pending,
            OrderStatus::Open,
            OrderStatus::Filled,
            OrderStatus::Canceled,
            OrderStatus::Rejected,
        ] {
            assert_eq!(status.as_str().parse::<OrderStatus>(), Ok(status));
        }
    }

    #[test]
    fn test_request_deserializes_type_field() {
        let request: OrderRequest = serde_json::from_str(
            r#"{"symbol":"BTC/USDT","side":"buy","type":"limit","amount":0.5,"price":30000.0}"#,
        )
        .unwrap();

        assert_eq!(request, OrderRequest::limit("BTC/USDT", Side::Buy, 0.5, 30000.0));
    }

    #[test]
    fn test_rejected_order_has_no_external_id() {
        let request = OrderRequest::market("BTCUSDT", Side::Buy, 1.0);
        let order = Order::rejected("u1", "paper", &request, "bad symbol".to_string());

        assert_eq!(order.status, OrderStatus::Rejected);
        assert_eq!(order.external_id, None);
        assert_eq!(order.reason.as_deref(), Some("bad symbol"));
    }
}
