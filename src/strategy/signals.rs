use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::models::Side;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub enum SignalType {
    Long,
    Short,
    Hold,
}

impl SignalType {
    pub fn side(&self) -> Option<Side> {
        match self {
            SignalType::Long => Some(Side::Buy),
            SignalType::Short => Some(Side::Sell),
            SignalType::Hold => None,
        }
    }
}

impl fmt::Display for SignalType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SignalType::Long => write!(f, "LONG"),
            SignalType::Short => write!(f, "SHORT"),
            SignalType::Hold => write!(f, "HOLD"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeSignal {
    pub symbol: String,
    pub strategy: String,
    pub signal_type: SignalType,
    pub confidence: f64,
    pub entry_price: f64,
    pub stop_loss: f64,
    pub take_profit: f64,
    pub reason: String,
    /// Open time of the candle that produced the signal.
    pub candle_time: i64,
    pub timestamp: DateTime<Utc>,
}

impl TradeSignal {
    /// Builds a signal with a default 2% stop and a confidence-scaled target.
    pub fn new(
        symbol: &str,
        strategy: &str,
        signal_type: SignalType,
        confidence: f64,
        entry_price: f64,
    ) -> Self {
        let risk_percent = 0.02;
        let reward_ratio = 2.0 + confidence;

        let (stop_loss, take_profit) = match signal_type {
            SignalType::Long => (
                entry_price * (1.0 - risk_percent),
                entry_price * (1.0 + risk_percent * reward_ratio),
            ),
            SignalType::Short => (
                entry_price * (1.0 + risk_percent),
                entry_price * (1.0 - risk_percent * reward_ratio),
            ),
            SignalType::Hold => (entry_price, entry_price),
        };

        Self {
            symbol: symbol.to_string(),
            strategy: strategy.to_string(),
            signal_type,
            confidence: confidence.clamp(0.0, 1.0),
            entry_price,
            stop_loss,
            take_profit,
            reason: String::new(),
            candle_time: 0,
            timestamp: Utc::now(),
        }
    }

    /// Sets the stop from market structure; the target keeps a 2:1 reward.
    pub fn with_stop(mut self, stop_loss: f64) -> Self {
        let risk = (self.entry_price - stop_loss).abs();
        if risk > 0.0 {
            self.stop_loss = stop_loss;
            self.take_profit = match self.signal_type {
                SignalType::Long => self.entry_price + 2.0 * risk,
                SignalType::Short => self.entry_price - 2.0 * risk,
                SignalType::Hold => self.entry_price,
            };
        }
        self
    }

    pub fn with_reason(mut self, reason: String) -> Self {
        self.reason = reason;
        self
    }

    pub fn at_candle(mut self, open_time: i64) -> Self {
        self.candle_time = open_time;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_levels_bracket_entry() {
        let long = TradeSignal::new("BTC/USDT", "test", SignalType::Long, 0.8, 100.0);
        assert!(long.stop_loss < 100.0 && long.take_profit > 100.0);

        let short = TradeSignal::new("BTC/USDT", "test", SignalType::Short, 0.8, 100.0);
        assert!(short.stop_loss > 100.0 && short.take_profit < 100.0);
    }

    #[test]
    fn test_structural_stop_sets_two_to_one_target() {
        let signal = TradeSignal::new("BTC/USDT", "test", SignalType::Short, 0.7, 100.0).with_stop(105.0);
        assert_eq!(signal.stop_loss, 105.0);
        assert_eq!(signal.take_profit, 90.0);
    }
}
