use super::signals::{SignalType, TradeSignal};
use super::Strategy;
use crate::connectors::Candle;

/// Three-candle imbalance: the wicks of the first and third candle leave
/// a gap that price later revisits. The newest candle must trade back into
/// the most recent unfilled gap and close on its far side of the gap edge.
#[derive(Debug, Clone)]
pub struct FairValueGap {
    pub lookback: usize,
    /// Gap height as a fraction of price.
    pub min_gap_pct: f64,
}

impl Default for FairValueGap {
    fn default() -> Self {
        Self {
            lookback: 20,
            min_gap_pct: 0.001,
        }
    }
}

struct Gap {
    signal_type: SignalType,
    bottom: f64,
    top: f64,
    /// Far wick of the impulse candle.
    invalidation: f64,
}

impl FairValueGap {
    fn gap_at(&self, candles: &[Candle], i: usize) -> Option<Gap> {
        let first = &candles[i - 2];
        let impulse = &candles[i - 1];
        let third = &candles[i];

        if first.high < third.low && (third.low - first.high) / first.high >= self.min_gap_pct {
            return Some(Gap {
                signal_type: SignalType::Long,
                bottom: first.high,
                top: third.low,
                invalidation: impulse.low.min(first.high),
            });
        }
        if first.low > third.high && (first.low - third.high) / first.low >= self.min_gap_pct {
            return Some(Gap {
                signal_type: SignalType::Short,
                bottom: third.high,
                top: first.low,
                invalidation: impulse.high.max(first.low),
            });
        }
        None
    }

    /// A gap is spent once any later candle closes through it.
    fn filled_between(gap: &Gap, candles: &[Candle]) -> bool {
        candles.iter().any(|c| match gap.signal_type {
            SignalType::Long => c.close < gap.bottom,
            _ => c.close > gap.top,
        })
    }
}

impl Strategy for FairValueGap {
    fn name(&self) -> &'static str {
        "fair_value_gap"
    }

    fn min_candles(&self) -> usize {
        4
    }

    fn evaluate(&self, symbol: &str, candles: &[Candle]) -> Option<TradeSignal> {
        if candles.len() < self.min_candles() {
            return None;
        }
        let last_idx = candles.len() - 1;
        let last = &candles[last_idx];
        let start = last_idx.saturating_sub(self.lookback).max(2);

        for i in (start..last_idx).rev() {
            let Some(gap) = self.gap_at(candles, i) else {
                continue;
            };
            if Self::filled_between(&gap, &candles[i + 1..last_idx]) {
                continue;
            }

            let retested = match gap.signal_type {
                SignalType::Long => last.low <= gap.top && last.close >= gap.bottom,
                _ => last.high >= gap.bottom && last.close <= gap.top,
            };
            if !retested {
                continue;
            }

            let gap_pct = (gap.top - gap.bottom) / gap.bottom;
            let confidence = 0.65 + (gap_pct * 50.0).min(0.25);

            return Some(
                TradeSignal::new(symbol, self.name(), gap.signal_type, confidence, last.close)
                    .with_stop(gap.invalidation)
                    .with_reason(format!(
                        "{} gap [{:.4}, {:.4}] retested",
                        gap.signal_type, gap.bottom, gap.top
                    ))
                    .at_candle(last.open_time),
            );
        }

        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategy::test_support::{candle, flat, series};

    fn bullish_gap_setup() -> Vec<Candle> {
        let mut candles = flat(5, 100.0);
        candles.push(candle(100.0, 101.0, 99.0, 100.5));
        candles.push(candle(100.5, 106.0, 100.4, 105.5));
        candles.push(candle(105.5, 107.0, 103.0, 106.5));
        candles.push(candle(106.5, 107.5, 105.0, 106.0));
        candles
    }

    #[test]
    fn test_retest_of_bullish_gap_goes_long() {
        let mut candles = bullish_gap_setup();
        candles.push(candle(106.0, 106.2, 102.5, 103.5));
        let candles = series(candles);

        let signal = FairValueGap::default().evaluate("ETH/USDT", &candles).unwrap();

        assert_eq!(signal.signal_type, SignalType::Long);
        assert_eq!(signal.entry_price, 103.5);
        assert_eq!(signal.stop_loss, 100.4);
        assert!(signal.take_profit > signal.entry_price);
        assert!(signal.confidence > 0.65 && signal.confidence < 0.95);
    }

    #[test]
    fn test_no_signal_without_retest() {
        let mut candles = bullish_gap_setup();
        candles.push(candle(106.0, 108.0, 105.5, 107.5));

        assert!(FairValueGap::default().evaluate("ETH/USDT", &series(candles)).is_none());
    }

    #[test]
    fn test_filled_gap_is_ignored() {
        let mut candles = bullish_gap_setup();
        candles.push(candle(106.0, 106.0, 99.5, 100.0));
        candles.push(candle(100.0, 102.8, 100.0, 102.0));

        assert!(FairValueGap::default().evaluate("ETH/USDT", &series(candles)).is_none());
    }

    #[test]
    fn test_retest_of_bearish_gap_goes_short() {
        let mut candles = flat(5, 100.0);
        candles.push(candle(100.0, 101.0, 99.0, 99.5));
        candles.push(candle(99.5, 99.6, 94.0, 94.5));
        candles.push(candle(94.5, 97.0, 93.0, 93.5));
        candles.push(candle(93.5, 95.0, 92.5, 94.0));
        candles.push(candle(94.0, 97.5, 93.8, 96.5));

        let signal = FairValueGap::default().evaluate("ETH/USDT", &series(candles)).unwrap();

        assert_eq!(signal.signal_type, SignalType::Short);
        assert_eq!(signal.stop_loss, 99.6);
    }
}
