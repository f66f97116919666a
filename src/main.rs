use anyhow::{Context, Result};
use std::sync::Arc;

use retail_trading_bot::connectors::{ConnectorProvider, ConnectorRegistry};
use retail_trading_bot::core::{logging, Config, HealthChecker};
use retail_trading_bot::jobs::{JobWorker, QueueBridge};
use retail_trading_bot::storage::SqliteStore;
use retail_trading_bot::trading::{OrderRouter, RiskManager, TradingOrchestrator};

const JOB_QUEUE_CAPACITY: usize = 64;

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_env()?;

    logging::init_logging(&config.monitoring.log_level);

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "retail trading bot starting");
    tracing::info!(
        order_connector = %config.trading.order_connector,
        market_data = %config.trading.market_data_connector,
        "connectors configured"
    );

    let health_checker = Arc::new(HealthChecker::new());

    let store = Arc::new(
        SqliteStore::new(&config.database.url)
            .await
            .with_context(|| format!("failed to open database {}", config.database.url))?,
    );
    health_checker.update_component("database", store.ping().await).await;

    let registry = ConnectorRegistry::new(config.exchanges.clone())
        .with_paper_market_data(&config.trading.market_data_connector);
    let connectors: Arc<dyn ConnectorProvider> = Arc::new(registry);

    let router = Arc::new(OrderRouter::new(
        store.clone(),
        connectors.clone(),
        RiskManager::new(config.risk),
    ));

    let (bridge, receiver) = QueueBridge::new(JOB_QUEUE_CAPACITY);
    let worker = JobWorker::new(
        receiver,
        bridge.statuses(),
        connectors.clone(),
        &config.trading.market_data_connector,
    );
    tokio::spawn(worker.run());
    submit_startup_backtests(&bridge, &config).await;

    let health_clone = health_checker.clone();
    let health_port = config.monitoring.health_port;
    tokio::spawn(async move { start_health_server(health_clone, health_port).await });
    tracing::info!(port = health_port, "health endpoint running");

    let orchestrator = Arc::new(TradingOrchestrator::new(
        router,
        connectors,
        config.trading.clone(),
        health_checker.clone(),
    ));
    orchestrator.check_order_connector().await;
    orchestrator.start();

    loop {
        tokio::time::sleep(tokio::time::Duration::from_secs(60)).await;

        let status = health_checker.get_status().await;
        match store.get_statistics().await {
            Ok(stats) => tracing::info!(
                status = %status.status,
                uptime_secs = status.uptime_seconds,
                orders = stats.total_orders,
                filled = stats.filled_orders,
                open = stats.open_orders,
                rejected = stats.rejected_orders,
                "bot status"
            ),
            Err(e) => {
                health_checker.update_component("database", false).await;
                tracing::error!(error = %e, "order statistics unavailable");
            }
        }
    }
}

async fn submit_startup_backtests(bridge: &QueueBridge, config: &Config) {
    for symbol in &config.trading.symbols {
        for strategy in &config.trading.strategies {
            let payload = serde_json::json!({
                "symbol": symbol,
                "strategy": strategy,
                "interval": config.trading.candle_interval,
            });
            match bridge.submit("backtest", payload).await {
                Ok(ticket) => tracing::debug!(job_id = %ticket.id, %symbol, %strategy, "startup backtest queued"),
                Err(e) => tracing::warn!(%symbol, %strategy, error = %e, "startup backtest not queued"),
            }
        }
    }
}

async fn start_health_server(health_checker: Arc<HealthChecker>, port: u16) {
    use warp::Filter;

    let health = warp::path("health")
        .and(warp::any().map(move || health_checker.clone()))
        .and_then(|checker: Arc<HealthChecker>| async move {
            let status = checker.get_status().await;
            Ok::<_, warp::Rejection>(warp::reply::json(&status))
        });

    warp::serve(health).run(([0, 0, 0, 0], port)).await;
}
