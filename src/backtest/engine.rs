use serde::{Deserialize, Serialize};

use crate::connectors::Candle;
use crate::strategy::{SignalType, Strategy, TradeSignal};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitReason {
    StopLoss,
    TakeProfit,
    EndOfData,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BacktestTrade {
    pub side: SignalType,
    pub entry_price: f64,
    pub exit_price: f64,
    pub entry_time: i64,
    pub exit_time: i64,
    pub exit_reason: ExitReason,
    pub return_pct: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BacktestReport {
    pub symbol: String,
    pub strategy: String,
    pub candles: usize,
    pub trades: Vec<BacktestTrade>,
    /// Fraction of trades with a positive return, 0 when nothing traded.
    pub win_rate: f64,
    pub total_return_pct: f64,
    pub max_drawdown_pct: f64,
}

struct OpenPosition {
    side: SignalType,
    entry_price: f64,
    stop_loss: f64,
    take_profit: f64,
    entry_time: i64,
}

impl OpenPosition {
    fn from_signal(signal: &TradeSignal) -> Option<Self> {
        match signal.signal_type {
            SignalType::Hold => None,
            side => Some(Self {
                side,
                entry_price: signal.entry_price,
                stop_loss: signal.stop_loss,
                take_profit: signal.take_profit,
                entry_time: signal.candle_time,
            }),
        }
    }

    /// Stop is checked before target, so a bar touching both stops out.
    fn exit_on(&self, candle: &Candle) -> Option<(f64, ExitReason)> {
        match self.side {
            SignalType::Long if candle.low <= self.stop_loss => Some((self.stop_loss, ExitReason::StopLoss)),
            SignalType::Long if candle.high >= self.take_profit => {
                Some((self.take_profit, ExitReason::TakeProfit))
            }
            SignalType::Short if candle.high >= self.stop_loss => Some((self.stop_loss, ExitReason::StopLoss)),
            SignalType::Short if candle.low <= self.take_profit => {
                Some((self.take_profit, ExitReason::TakeProfit))
            }
            _ => None,
        }
    }

    fn close(self, exit_price: f64, exit_time: i64, exit_reason: ExitReason) -> BacktestTrade {
        let change = match self.side {
            SignalType::Short => self.entry_price - exit_price,
            _ => exit_price - self.entry_price,
        };
        BacktestTrade {
            side: self.side,
            entry_price: self.entry_price,
            exit_price,
            entry_time: self.entry_time,
            exit_time,
            exit_reason,
            return_pct: change / self.entry_price * 100.0,
        }
    }
}

/// Replays a strategy over historical candles, one position at a time.
#[derive(Debug, Clone)]
pub struct Backtester {
    /// Candles handed to the strategy on each step.
    pub window: usize,
}

impl Default for Backtester {
    fn default() -> Self {
        Self { window: 200 }
    }
}

impl Backtester {
    pub fn new(window: usize) -> Self {
        Self { window }
    }

    pub fn run(&self, strategy: &dyn Strategy, symbol: &str, candles: &[Candle]) -> BacktestReport {
        let mut trades = Vec::new();
        let mut position: Option<OpenPosition> = None;
        let first = strategy.min_candles().max(1) - 1;

        for i in first..candles.len() {
            let candle = &candles[i];

            if let Some(open) = position.take() {
                match open.exit_on(candle) {
                    Some((price, reason)) => trades.push(open.close(price, candle.open_time, reason)),
                    None => position = Some(open),
                }
                continue;
            }

            let start = (i + 1).saturating_sub(self.window.max(strategy.min_candles()));
            if let Some(signal) = strategy.evaluate(symbol, &candles[start..=i]) {
                position = OpenPosition::from_signal(&signal);
            }
        }

        if let (Some(open), Some(last)) = (position, candles.last()) {
            trades.push(open.close(last.close, last.open_time, ExitReason::EndOfData));
        }

        let report = Self::summarize(symbol, strategy.name(), candles.len(), trades);
        tracing::info!(
            symbol,
            strategy = strategy.name(),
            trades = report.trades.len(),
            win_rate = report.win_rate,
            total_return_pct = report.total_return_pct,
            max_drawdown_pct = report.max_drawdown_pct,
            "backtest finished"
        );
        report
    }

    fn summarize(symbol: &str, strategy: &str, candles: usize, trades: Vec<BacktestTrade>) -> BacktestReport {
        let wins = trades.iter().filter(|t| t.return_pct > 0.0).count();
        let win_rate = if trades.is_empty() {
            0.0
        } else {
            wins as f64 / trades.len() as f64
        };

        let mut equity = 1.0;
        let mut peak = 1.0;
        let mut max_drawdown = 0.0_f64;
        for trade in &trades {
            equity *= 1.0 + trade.return_pct / 100.0;
            peak = f64::max(peak, equity);
            max_drawdown = max_drawdown.max((peak - equity) / peak);
        }

        BacktestReport {
            symbol: symbol.to_string(),
            strategy: strategy.to_string(),
            candles,
            trades,
            win_rate,
            total_return_pct: (equity - 1.0) * 100.0,
            max_drawdown_pct: max_drawdown * 100.0,
        }
    }
}
