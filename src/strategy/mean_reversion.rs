use super::indicators::Indicators;
use super::signals::{SignalType, TradeSignal};
use super::Strategy;
use crate::connectors::Candle;

/// Fades closes outside the Bollinger bands when RSI agrees.
#[derive(Debug, Clone)]
pub struct MeanReversion {
    pub band_period: usize,
    pub band_std_dev: f64,
    pub rsi_period: usize,
    pub oversold: f64,
    pub overbought: f64,
}

impl Default for MeanReversion {
    fn default() -> Self {
        Self {
            band_period: 20,
            band_std_dev: 2.0,
            rsi_period: 14,
            oversold: 30.0,
            overbought: 70.0,
        }
    }
}

impl Strategy for MeanReversion {
    fn name(&self) -> &'static str {
        "mean_reversion"
    }

    fn min_candles(&self) -> usize {
        self.band_period.max(self.rsi_period + 1)
    }

    fn evaluate(&self, symbol: &str, candles: &[Candle]) -> Option<TradeSignal> {
        if candles.len() < self.min_candles() {
            return None;
        }
        let last = candles.last()?;
        let indicators = Indicators::from_candles(candles);
        let (upper, middle, lower) = indicators.bollinger_bands(self.band_period, self.band_std_dev)?;
        let rsi = indicators.rsi(self.rsi_period)?;

        let width = upper - lower;
        if width <= 0.0 {
            return None;
        }

        let close = last.close;
        let (signal_type, depth, rsi_edge) = if close < lower && rsi < self.oversold {
            (SignalType::Long, (lower - close) / width, (self.oversold - rsi) / self.oversold)
        } else if close > upper && rsi > self.overbought {
            (
                SignalType::Short,
                (close - upper) / width,
                (rsi - self.overbought) / (100.0 - self.overbought),
            )
        } else {
            return None;
        };

        let confidence = (0.6 + 0.2 * depth.min(1.0) + 0.2 * rsi_edge.min(1.0)).min(0.95);
        let atr = indicators.atr(self.rsi_period).unwrap_or(width / 4.0);
        let stop = match signal_type {
            SignalType::Long => close - 1.5 * atr,
            _ => close + 1.5 * atr,
        };

        Some(
            TradeSignal::new(symbol, self.name(), signal_type, confidence, close)
                .with_stop(stop)
                .with_reason(format!(
                    "close {:.4} outside bands [{:.4}, {:.4}], mid {:.4}, rsi {:.1}",
                    close, lower, upper, middle, rsi
                ))
                .at_candle(last.open_time),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategy::test_support::{candle, series};

    fn oscillating(count: usize) -> Vec<Candle> {
        (0..count)
            .map(|i| {
                let p = 100.0 + (i % 2) as f64;
                candle(p, p + 0.5, p - 0.5, p)
            })
            .collect()
    }

    #[test]
    fn test_sharp_drop_below_lower_band_goes_long() {
        let mut candles = oscillating(26);
        candles.push(candle(101.0, 101.0, 95.5, 96.0));
        candles.push(candle(96.0, 96.0, 89.5, 90.0));
        let candles = series(candles);

        let signal = MeanReversion::default().evaluate("BTC/USDT", &candles).unwrap();

        assert_eq!(signal.signal_type, SignalType::Long);
        assert_eq!(signal.entry_price, 90.0);
        assert!(signal.stop_loss < 90.0);
        assert!(signal.confidence >= 0.6 && signal.confidence <= 0.95);
        assert_eq!(signal.candle_time, candles.last().unwrap().open_time);
    }

    #[test]
    fn test_sharp_rally_above_upper_band_goes_short() {
        let mut candles = oscillating(26);
        candles.push(candle(101.0, 105.5, 101.0, 105.0));
        candles.push(candle(105.0, 111.5, 105.0, 111.0));

        let signal = MeanReversion::default().evaluate("BTC/USDT", &series(candles)).unwrap();
        assert_eq!(signal.signal_type, SignalType::Short);
    }

    #[test]
    fn test_ranging_market_is_quiet() {
        let candles = series(oscillating(40));
        assert!(MeanReversion::default().evaluate("BTC/USDT", &candles).is_none());
    }

    #[test]
    fn test_too_few_candles() {
        let candles = series(oscillating(10));
        assert!(MeanReversion::default().evaluate("BTC/USDT", &candles).is_none());
    }
}
