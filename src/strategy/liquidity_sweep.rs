use super::signals::{SignalType, TradeSignal};
use super::Strategy;
use crate::connectors::Candle;

/// Stop run beyond a recent swing extreme that closes back inside the range.
#[derive(Debug, Clone)]
pub struct LiquiditySweep {
    pub lookback: usize,
    /// Rejection wick as a fraction of the sweep candle's range.
    pub min_wick_ratio: f64,
}

impl Default for LiquiditySweep {
    fn default() -> Self {
        Self {
            lookback: 20,
            min_wick_ratio: 0.5,
        }
    }
}

impl Strategy for LiquiditySweep {
    fn name(&self) -> &'static str {
        "liquidity_sweep"
    }

    fn min_candles(&self) -> usize {
        self.lookback + 1
    }

    fn evaluate(&self, symbol: &str, candles: &[Candle]) -> Option<TradeSignal> {
        if self.lookback == 0 || candles.len() < self.min_candles() {
            return None;
        }
        let (last, history) = candles.split_last()?;
        let window = &history[history.len() - self.lookback..];

        let swing_low = window.iter().map(|c| c.low).fold(f64::INFINITY, f64::min);
        let swing_high = window.iter().map(|c| c.high).fold(f64::NEG_INFINITY, f64::max);
        let avg_range = window.iter().map(Candle::range).sum::<f64>() / window.len() as f64;
        let range = last.range();
        if range <= 0.0 || avg_range <= 0.0 {
            return None;
        }

        let lower_wick = last.open.min(last.close) - last.low;
        let upper_wick = last.high - last.open.max(last.close);

        let (signal_type, level, depth, wick) = if last.low < swing_low
            && last.close > swing_low
            && lower_wick / range >= self.min_wick_ratio
        {
            (SignalType::Long, swing_low, swing_low - last.low, lower_wick)
        } else if last.high > swing_high
            && last.close < swing_high
            && upper_wick / range >= self.min_wick_ratio
        {
            (SignalType::Short, swing_high, last.high - swing_high, upper_wick)
        } else {
            return None;
        };

        let confidence = (0.6 + 0.1 * (depth / avg_range) + 0.1 * (wick / range)).min(0.9);
        let stop = match signal_type {
            SignalType::Long => last.low,
            _ => last.high,
        };

        Some(
            TradeSignal::new(symbol, self.name(), signal_type, confidence, last.close)
                .with_stop(stop)
                .with_reason(format!(
                    "swept {:.4} by {:.4} and closed back inside",
                    level, depth
                ))
                .at_candle(last.open_time),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategy::test_support::{candle, flat, series};

    #[test]
    fn test_sweep_of_lows_goes_long() {
        let mut candles = flat(20, 100.0);
        candles.push(candle(99.5, 99.8, 97.5, 99.6));

        let signal = LiquiditySweep::default().evaluate("XAU/USD", &series(candles)).unwrap();

        assert_eq!(signal.signal_type, SignalType::Long);
        assert_eq!(signal.stop_loss, 97.5);
        assert!(signal.confidence >= 0.6 && signal.confidence <= 0.9);
    }

    #[test]
    fn test_sweep_of_highs_goes_short() {
        let mut candles = flat(20, 100.0);
        candles.push(candle(100.5, 102.5, 100.2, 100.4));

        let signal = LiquiditySweep::default().evaluate("XAU/USD", &series(candles)).unwrap();

        assert_eq!(signal.signal_type, SignalType::Short);
        assert_eq!(signal.stop_loss, 102.5);
    }

    #[test]
    fn test_breakdown_without_reclaim_is_ignored() {
        let mut candles = flat(20, 100.0);
        candles.push(candle(100.0, 100.5, 97.5, 98.0));

        assert!(LiquiditySweep::default().evaluate("XAU/USD", &series(candles)).is_none());
    }
}
