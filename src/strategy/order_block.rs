use super::signals::{SignalType, TradeSignal};
use super::Strategy;
use crate::connectors::Candle;

/// Last opposite-colored candle before an impulsive move. When price comes
/// back into that candle's range the block is expected to hold.
#[derive(Debug, Clone)]
pub struct OrderBlock {
    pub lookback: usize,
    /// Impulse body must be at least this many average ranges.
    pub impulse_multiple: f64,
}

impl Default for OrderBlock {
    fn default() -> Self {
        Self {
            lookback: 30,
            impulse_multiple: 2.0,
        }
    }
}

impl OrderBlock {
    fn find(
        &self,
        candles: &[Candle],
        start: usize,
        avg_range: f64,
        direction: SignalType,
    ) -> Option<TradeSignal> {
        let last_idx = candles.len() - 1;
        let last = &candles[last_idx];

        // the block needs an impulse after it and at least one candle
        // between the impulse and the retest
        for j in (start..last_idx.saturating_sub(2)).rev() {
            let block = &candles[j];
            let impulse = &candles[j + 1];

            let shaped = match direction {
                SignalType::Long => {
                    block.is_bearish() && impulse.is_bullish() && impulse.close > block.high
                }
                _ => block.is_bullish() && impulse.is_bearish() && impulse.close < block.low,
            };
            if !shaped || impulse.body() < self.impulse_multiple * avg_range {
                continue;
            }

            let broken = candles[j + 2..last_idx].iter().any(|c| match direction {
                SignalType::Long => c.close < block.low,
                _ => c.close > block.high,
            });
            if broken {
                continue;
            }

            let (retested, stop) = match direction {
                SignalType::Long => (last.low <= block.high && last.close > block.low, block.low),
                _ => (last.high >= block.low && last.close < block.high, block.high),
            };
            if !retested {
                continue;
            }

            let strength = impulse.body() / avg_range - self.impulse_multiple;
            let confidence = 0.65 + (strength * 0.1).min(0.25);

            return Some(
                TradeSignal::new("", self.name(), direction, confidence, last.close)
                    .with_stop(stop)
                    .with_reason(format!(
                        "{} block [{:.4}, {:.4}] retested after {:.1}x impulse",
                        direction,
                        block.low,
                        block.high,
                        impulse.body() / avg_range
                    ))
                    .at_candle(last.open_time),
            );
        }
        None
    }
}

impl Strategy for OrderBlock {
    fn name(&self) -> &'static str {
        "order_block"
    }

    fn min_candles(&self) -> usize {
        5
    }

    fn evaluate(&self, symbol: &str, candles: &[Candle]) -> Option<TradeSignal> {
        if candles.len() < self.min_candles() {
            return None;
        }
        let start = candles.len().saturating_sub(self.lookback);
        let window = &candles[start..];
        let avg_range = window.iter().map(Candle::range).sum::<f64>() / window.len() as f64;
        if avg_range <= 0.0 {
            return None;
        }

        let mut signal = self
            .find(candles, start, avg_range, SignalType::Long)
            .or_else(|| self.find(candles, start, avg_range, SignalType::Short))?;
        signal.symbol = symbol.to_string();
        Some(signal)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategy::test_support::{candle, flat, series};

    #[test]
    fn test_bullish_block_retest_goes_long() {
        let mut candles = flat(10, 100.0);
        candles.push(candle(100.5, 101.0, 99.5, 99.8));
        candles.push(candle(99.8, 108.0, 99.7, 107.5));
        candles.push(candle(107.5, 109.0, 106.0, 108.0));
        candles.push(candle(108.0, 108.2, 100.8, 102.0));
        let candles = series(candles);

        let signal = OrderBlock::default().evaluate("SOL/USDT", &candles).unwrap();

        assert_eq!(signal.symbol, "SOL/USDT");
        assert_eq!(signal.signal_type, SignalType::Long);
        assert_eq!(signal.stop_loss, 99.5);
        assert_eq!(signal.entry_price, 102.0);
        assert_eq!(signal.candle_time, candles[13].open_time);
    }

    #[test]
    fn test_bearish_block_retest_goes_short() {
        let mut candles = flat(10, 100.0);
        candles.push(candle(99.5, 100.5, 99.0, 100.2));
        candles.push(candle(100.2, 100.3, 92.0, 92.5));
        candles.push(candle(92.5, 94.0, 91.0, 92.0));
        candles.push(candle(92.0, 99.2, 91.8, 98.0));

        let signal = OrderBlock::default().evaluate("SOL/USDT", &series(candles)).unwrap();

        assert_eq!(signal.signal_type, SignalType::Short);
        assert_eq!(signal.stop_loss, 100.5);
    }

    #[test]
    fn test_weak_move_is_not_an_impulse() {
        let mut candles = flat(10, 100.0);
        candles.push(candle(100.5, 101.0, 99.5, 99.8));
        candles.push(candle(99.8, 102.0, 99.7, 101.5));
        candles.push(candle(101.5, 102.0, 101.0, 101.8));
        candles.push(candle(101.8, 101.9, 100.5, 100.9));

        assert!(OrderBlock::default().evaluate("SOL/USDT", &series(candles)).is_none());
    }
}
