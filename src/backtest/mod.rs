pub mod engine;

pub use engine::{BacktestReport, BacktestTrade, Backtester, ExitReason};
