use std::collections::VecDeque;

use crate::connectors::Candle;

/// Rolling window of closes, volumes and true ranges.
pub struct Indicators {
    prices: VecDeque<f64>,
    volumes: VecDeque<f64>,
    true_ranges: VecDeque<f64>,
    max_len: usize,
}

impl Indicators {
    pub fn new(max_len: usize) -> Self {
        Self {
            prices: VecDeque::with_capacity(max_len),
            volumes: VecDeque::with_capacity(max_len),
            true_ranges: VecDeque::with_capacity(max_len),
            max_len,
        }
    }

    pub fn from_candles(candles: &[Candle]) -> Self {
        let mut indicators = Self::new(candles.len().max(1));
        for candle in candles {
            indicators.add_candle(candle);
        }
        indicators
    }

    pub fn add_data(&mut self, price: f64, volume: f64) {
        if self.prices.len() >= self.max_len {
            self.prices.pop_front();
            self.volumes.pop_front();
        }

        self.prices.push_back(price);
        self.volumes.push_back(volume);
    }

    pub fn add_candle(&mut self, candle: &Candle) {
        let true_range = match self.prices.back() {
            Some(&prev_close) => (candle.high - candle.low)
                .max((candle.high - prev_close).abs())
                .max((candle.low - prev_close).abs()),
            None => candle.high - candle.low,
        };
        if self.true_ranges.len() >= self.max_len {
            self.true_ranges.pop_front();
        }
        self.true_ranges.push_back(true_range);

        self.add_data(candle.close, candle.volume);
    }

    pub fn len(&self) -> usize {
        self.prices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.prices.is_empty()
    }

    pub fn sma(&self, period: usize) -> Option<f64> {
        if period == 0 || self.prices.len() < period {
            return None;
        }

        let sum: f64 = self.prices.iter().rev().take(period).sum();
        Some(sum / period as f64)
    }

    pub fn ema(&self, period: usize) -> Option<f64> {
        if period == 0 || self.prices.len() < period {
            return None;
        }

        let multiplier = 2.0 / (period as f64 + 1.0);
        let mut ema = self.prices[0];

        for price in self.prices.iter().skip(1) {
            ema = (price - ema) * multiplier + ema;
        }

        Some(ema)
    }

    pub fn rsi(&self, period: usize) -> Option<f64> {
        if period == 0 || self.prices.len() < period + 1 {
            return None;
        }

        let mut gains = 0.0;
        let mut losses = 0.0;

        for i in (self.prices.len() - period)..self.prices.len() {
            let change = self.prices[i] - self.prices[i - 1];
            if change > 0.0 {
                gains += change;
            } else {
                losses += -change;
            }
        }

        let avg_gain = gains / period as f64;
        let avg_loss = losses / period as f64;

        if avg_loss == 0.0 {
            return Some(if avg_gain == 0.0 { 50.0 } else { 100.0 });
        }

        let rs = avg_gain / avg_loss;
        Some(100.0 - (100.0 / (1.0 + rs)))
    }

    /// `(upper, middle, lower)`
    pub fn bollinger_bands(&self, period: usize, std_dev: f64) -> Option<(f64, f64, f64)> {
        let sma = self.sma(period)?;

        let variance: f64 = self
            .prices
            .iter()
            .rev()
            .take(period)
            .map(|p| (p - sma).powi(2))
            .sum::<f64>()
            / period as f64;

        let std = variance.sqrt();
        Some((sma + std_dev * std, sma, sma - std_dev * std))
    }

    pub fn volatility(&self, period: usize) -> Option<f64> {
        let mean = self.sma(period)?;
        if mean == 0.0 {
            return None;
        }

        let variance = self
            .prices
            .iter()
            .rev()
            .take(period)
            .map(|p| (p - mean).powi(2))
            .sum::<f64>()
            / period as f64;

        Some(variance.sqrt() / mean)
    }

    pub fn volume_ratio(&self, period: usize) -> Option<f64> {
        if period == 0 || self.volumes.len() < period {
            return None;
        }

        let recent_avg: f64 = self.volumes.iter().rev().take(period).sum::<f64>() / period as f64;
        if recent_avg == 0.0 {
            return None;
        }
        let latest = *self.volumes.back()?;

        Some(latest / recent_avg)
    }

    /// Simple average of the last `period` true ranges.
    pub fn atr(&self, period: usize) -> Option<f64> {
        if period == 0 || self.true_ranges.len() < period {
            return None;
        }
        Some(self.true_ranges.iter().rev().take(period).sum::<f64>() / period as f64)
    }
}
