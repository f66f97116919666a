use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use super::order_router::{OrderRouter, RouterError};
use crate::connectors::{ConnectorProvider, ExchangeConnector};
use crate::core::config::TradingConfig;
use crate::core::HealthChecker;
use crate::models::OrderRequest;
use crate::strategy::{strategies_from_names, Strategy, TradeSignal};

/// Counts from one pass over the watchlist.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleSummary {
    pub signals: usize,
    pub routed: usize,
    pub failed: usize,
}

/// Turns strategy signals on closed candles into routed market orders.
pub struct TradingOrchestrator {
    router: Arc<OrderRouter>,
    connectors: Arc<dyn ConnectorProvider>,
    strategies: Vec<Box<dyn Strategy>>,
    config: TradingConfig,
    health: Arc<HealthChecker>,
    /// Last candle acted on per (symbol, strategy).
    last_seen: Mutex<HashMap<(String, &'static str), i64>>,
}

impl TradingOrchestrator {
    pub fn new(
        router: Arc<OrderRouter>,
        connectors: Arc<dyn ConnectorProvider>,
        config: TradingConfig,
        health: Arc<HealthChecker>,
    ) -> Self {
        let strategies = strategies_from_names(&config.strategies);
        Self {
            router,
            connectors,
            strategies,
            config,
            health,
            last_seen: Mutex::new(HashMap::new()),
        }
    }

    pub fn strategy_names(&self) -> Vec<&'static str> {
        self.strategies.iter().map(|s| s.name()).collect()
    }

    /// Marks `order_connector` healthy when the configured venue resolves.
    /// Run once at startup, before any order has been routed.
    pub async fn check_order_connector(&self) -> bool {
        let name = &self.config.order_connector;
        let resolved = match self.connectors.connect(name) {
            Ok(connector) => {
                if let Err(e) = connector.close().await {
                    tracing::warn!(connector = %name, error = %e, "connector close failed");
                }
                true
            }
            Err(e) => {
                tracing::error!(connector = %name, error = %e, "order connector unavailable");
                false
            }
        };
        self.health.update_component("order_connector", resolved).await;
        resolved
    }

    pub fn start(self: Arc<Self>) -> JoinHandle<()> {
        tracing::info!(
            symbols = ?self.config.symbols,
            strategies = ?self.strategy_names(),
            interval_secs = self.config.scan_interval_secs,
            "trading loop starting"
        );

        tokio::spawn(async move {
            let mut interval =
                tokio::time::interval(tokio::time::Duration::from_secs(self.config.scan_interval_secs));

            loop {
                interval.tick().await;
                let summary = self.run_cycle().await;
                tracing::debug!(
                    signals = summary.signals,
                    routed = summary.routed,
                    failed = summary.failed,
                    "cycle finished"
                );
            }
        })
    }

    pub async fn run_cycle(&self) -> CycleSummary {
        let mut summary = CycleSummary::default();

        let market_data = match self.connectors.connect(&self.config.market_data_connector) {
            Ok(connector) => connector,
            Err(e) => {
                tracing::error!(error = %e, "market data connector unavailable");
                self.health.update_component("market_data", false).await;
                return summary;
            }
        };

        let mut market_data_ok = true;
        for symbol in &self.config.symbols {
            let signals = match self.evaluate_symbol(market_data.as_ref(), symbol).await {
                Some(signals) => signals,
                None => {
                    market_data_ok = false;
                    continue;
                }
            };

            for signal in signals {
                summary.signals += 1;
                match self.act_on(&signal).await {
                    Some(true) => summary.routed += 1,
                    Some(false) => summary.failed += 1,
                    None => {}
                }
            }
        }

        if let Err(e) = market_data.close().await {
            tracing::warn!(connector = market_data.name(), error = %e, "connector close failed");
        }
        self.health.update_component("market_data", market_data_ok).await;

        summary
    }

    /// New signals for `symbol`, or `None` when candles could not be fetched.
    async fn evaluate_symbol(
        &self,
        market_data: &dyn ExchangeConnector,
        symbol: &str,
    ) -> Option<Vec<TradeSignal>> {
        let limit = self
            .strategies
            .iter()
            .map(|s| s.min_candles())
            .max()
            .unwrap_or(1)
            .max(100);

        let candles = match market_data
            .fetch_candles(symbol, &self.config.candle_interval, limit)
            .await
        {
            Ok(candles) => candles,
            Err(e) => {
                tracing::warn!(symbol, error = %e, "candle fetch failed");
                return None;
            }
        };

        let mut last_seen = self.last_seen.lock().await;
        let mut fresh = Vec::new();
        for strategy in &self.strategies {
            let Some(signal) = strategy.evaluate(symbol, &candles) else {
                continue;
            };

            let key = (symbol.to_string(), strategy.name());
            if last_seen.get(&key).is_some_and(|&seen| seen >= signal.candle_time) {
                continue;
            }
            last_seen.insert(key, signal.candle_time);

            tracing::info!(
                symbol,
                strategy = strategy.name(),
                signal = %signal.signal_type,
                confidence = signal.confidence,
                entry = signal.entry_price,
                reason = %signal.reason,
                "signal"
            );
            fresh.push(signal);
        }

        Some(fresh)
    }

    /// `Some(true)` when routed, `Some(false)` when the router refused,
    /// `None` when the signal was not actionable.
    async fn act_on(&self, signal: &TradeSignal) -> Option<bool> {
        if signal.confidence < self.config.confidence_threshold {
            tracing::debug!(
                symbol = %signal.symbol,
                confidence = signal.confidence,
                threshold = self.config.confidence_threshold,
                "signal below threshold"
            );
            return None;
        }
        let side = signal.signal_type.side()?;

        let request = OrderRequest::market(&signal.symbol, side, self.config.order_amount);
        match self
            .router
            .route_order(&self.config.bot_user_id, &self.config.order_connector, &request)
            .await
        {
            Ok(order) => {
                self.health.update_component("order_connector", true).await;
                self.health.update_component("database", true).await;
                tracing::info!(
                    order_id = %order.id,
                    symbol = %order.symbol,
                    status = %order.status,
                    strategy = %signal.strategy,
                    "signal executed"
                );
                Some(true)
            }
            Err(e) => {
                match &e {
                    RouterError::Exchange(_) | RouterError::ConnectorNotFound(_) => {
                        self.health.update_component("order_connector", false).await
                    }
                    RouterError::Storage(_) => self.health.update_component("database", false).await,
                    _ => {}
                }
                tracing::error!(symbol = %signal.symbol, error = %e, "signal not executed");
                Some(false)
            }
        }
    }
}
