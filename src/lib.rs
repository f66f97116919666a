//! Retail trading bot: risk-checked order routing across crypto, forex and
//! MT5 venues, a small strategy library, and background backtests.

pub mod backtest;
pub mod connectors;
pub mod core;
pub mod jobs;
pub mod models;
pub mod storage;
pub mod strategy;
pub mod trading;
