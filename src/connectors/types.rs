use serde::{Deserialize, Serialize};

use crate::models::{OrderType, Side};

/// Validated order handed to a connector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderPayload {
    pub client_order_id: String,
    pub symbol: String,
    pub side: Side,
    pub order_type: OrderType,
    pub amount: f64,
    pub price: Option<f64>,
}

/// Exchange acknowledgement normalised to one vocabulary:
/// `open`, `closed`, `canceled` or `rejected`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExchangeOrder {
    pub id: String,
    pub symbol: String,
    pub status: String,
    pub filled: f64,
    pub average_price: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub open_time: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Candle {
    pub fn is_bullish(&self) -> bool {
        self.close > self.open
    }

    pub fn is_bearish(&self) -> bool {
        self.close < self.open
    }

    pub fn range(&self) -> f64 {
        self.high - self.low
    }

    pub fn body(&self) -> f64 {
        (self.close - self.open).abs()
    }
}

/// Splits a unified `BASE/QUOTE` symbol.
pub fn split_symbol(symbol: &str) -> Option<(&str, &str)> {
    let (base, quote) = symbol.split_once('/')?;
    if base.is_empty() || quote.is_empty() {
        return None;
    }
    Some((base, quote))
}

/// `BTC/USDT` -> `BTCUSDT` (Binance, Bybit, MT5).
pub fn concat_symbol(symbol: &str) -> String {
    symbol.replace('/', "").to_uppercase()
}

/// `BTC/USDT` -> `BTC-USDT` (KuCoin).
pub fn dashed_symbol(symbol: &str) -> String {
    symbol.replace('/', "-").to_uppercase()
}

/// `EUR/USD` -> `EUR_USD` (Oanda).
pub fn underscored_symbol(symbol: &str) -> String {
    symbol.replace('/', "_").to_uppercase()
}

/// Renders a quantity or price without float noise (`0.30000000000000004` -> `0.3`).
pub fn format_amount(value: f64) -> String {
    let text = format!("{:.8}", value);
    let text = text.trim_end_matches('0').trim_end_matches('.');
    if text.is_empty() || text == "-" {
        "0".to_string()
    } else {
        text.to_string()
    }
}

/// Exchanges send most numbers as strings; missing or malformed is zero.
pub fn parse_number(value: &str) -> f64 {
    value.trim().parse().unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_amount_trims_noise() {
        assert_eq!(format_amount(0.1 + 0.2), "0.3");
        assert_eq!(format_amount(100.0), "100");
        assert_eq!(format_amount(0.00012), "0.00012");
        assert_eq!(format_amount(0.0), "0");
    }

    #[test]
    fn test_symbol_conversions() {
        assert_eq!(concat_symbol("btc/usdt"), "BTCUSDT");
        assert_eq!(dashed_symbol("BTC/USDT"), "BTC-USDT");
        assert_eq!(underscored_symbol("EUR/USD"), "EUR_USD");
    }

    #[test]
    fn test_split_symbol_requires_both_halves() {
        assert_eq!(split_symbol("ETH/USDT"), Some(("ETH", "USDT")));
        assert_eq!(split_symbol("ETH/"), None);
        assert_eq!(split_symbol("ETHUSDT"), None);
    }
}
