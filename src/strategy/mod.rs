//! Technical-analysis strategies evaluated on closed candles.

pub mod fair_value_gap;
pub mod indicators;
pub mod liquidity_sweep;
pub mod mean_reversion;
pub mod order_block;
pub mod signals;

use crate::connectors::Candle;

pub use fair_value_gap::FairValueGap;
pub use indicators::Indicators;
pub use liquidity_sweep::LiquiditySweep;
pub use mean_reversion::MeanReversion;
pub use order_block::OrderBlock;
pub use signals::{SignalType, TradeSignal};

pub trait Strategy: Send + Sync {
    fn name(&self) -> &'static str;

    /// Fewest candles `evaluate` needs before it can fire.
    fn min_candles(&self) -> usize;

    /// Looks at the last candle in `candles` (oldest first).
    fn evaluate(&self, symbol: &str, candles: &[Candle]) -> Option<TradeSignal>;
}

pub fn strategy_by_name(name: &str) -> Option<Box<dyn Strategy>> {
    let strategy: Box<dyn Strategy> = match name.trim().to_ascii_lowercase().as_str() {
        "mean_reversion" => Box::new(MeanReversion::default()),
        "fair_value_gap" | "fvg" => Box::new(FairValueGap::default()),
        "order_block" => Box::new(OrderBlock::default()),
        "liquidity_sweep" => Box::new(LiquiditySweep::default()),
        _ => return None,
    };
    Some(strategy)
}

/// Resolves configured names, logging and skipping unknown ones.
pub fn strategies_from_names(names: &[String]) -> Vec<Box<dyn Strategy>> {
    names
        .iter()
        .filter_map(|name| {
            let strategy = strategy_by_name(name);
            if strategy.is_none() {
                tracing::warn!(strategy = %name, "unknown strategy ignored");
            }
            strategy
        })
        .collect()
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_by_name() {
        for name in ["mean_reversion", "fair_value_gap", "fvg", "order_block", "liquidity_sweep"] {
            assert!(strategy_by_name(name).is_some(), "{} missing", name);
        }
        assert!(strategy_by_name("quantum_consciousness").is_none());
    }

    #[test]
    fn test_unknown_names_skipped() {
        let names = vec!["order_block".to_string(), "nope".to_string()];
        let strategies = strategies_from_names(&names);
        assert_eq!(strategies.len(), 1);
        assert_eq!(strategies[0].name(), "order_block");
    }
}
