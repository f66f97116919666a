use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::mpsc;

use super::queue::Job;
use super::{JobError, JobKind, JobStatus, JobStatusMap};
use crate::backtest::Backtester;
use crate::connectors::{Candle, ConnectorProvider};
use crate::strategy::{strategy_by_name, Strategy, TradeSignal};

fn default_interval() -> String {
    "15m".to_string()
}

fn default_limit() -> usize {
    500
}

#[derive(Debug, Deserialize)]
struct BacktestParams {
    symbol: String,
    strategy: String,
    #[serde(default = "default_interval")]
    interval: String,
    #[serde(default = "default_limit")]
    limit: usize,
}

#[derive(Debug, Deserialize)]
struct ScanParams {
    symbols: Vec<String>,
    strategies: Vec<String>,
    #[serde(default = "default_interval")]
    interval: String,
}

/// Consumer side of the job queue. Runs one job at a time.
pub struct JobWorker {
    receiver: mpsc::Receiver<Job>,
    statuses: JobStatusMap,
    connectors: Arc<dyn ConnectorProvider>,
    market_data_connector: String,
    backtester: Backtester,
}

impl JobWorker {
    pub fn new(
        receiver: mpsc::Receiver<Job>,
        statuses: JobStatusMap,
        connectors: Arc<dyn ConnectorProvider>,
        market_data_connector: &str,
    ) -> Self {
        Self {
            receiver,
            statuses,
            connectors,
            market_data_connector: market_data_connector.to_string(),
            backtester: Backtester::default(),
        }
    }

    /// Runs until every [`super::QueueBridge`] clone is dropped.
    pub async fn run(mut self) {
        tracing::info!(connector = %self.market_data_connector, "job worker started");

        while let Some(job) = self.receiver.recv().await {
            self.set_status(&job.id, JobStatus::Running).await;

            let status = match self.execute(&job).await {
                Ok(result) => {
                    tracing::info!(job_id = %job.id, kind = %job.kind, "job completed");
                    JobStatus::Completed(result)
                }
                Err(e) => {
                    tracing::error!(job_id = %job.id, kind = %job.kind, error = %e, "job failed");
                    JobStatus::Failed(e.to_string())
                }
            };
            self.set_status(&job.id, status).await;
        }

        tracing::info!("job worker stopped");
    }

    async fn set_status(&self, job_id: &str, status: JobStatus) {
        self.statuses.write().await.insert(job_id, status);
    }

    async fn execute(&self, job: &Job) -> Result<serde_json::Value, JobError> {
        match job.kind {
            JobKind::Backtest => {
                let params: BacktestParams = serde_json::from_value(job.payload.clone())?;
                let strategy = strategy_by_name(&params.strategy)
                    .ok_or_else(|| JobError::UnknownStrategy(params.strategy.clone()))?;
                let candles = self.candles(&params.symbol, &params.interval, params.limit).await?;

                let report = self.backtester.run(strategy.as_ref(), &params.symbol, &candles);
                Ok(serde_json::to_value(report)?)
            }
            JobKind::MarketScan => {
                let params: ScanParams = serde_json::from_value(job.payload.clone())?;
                let strategies = params
                    .strategies
                    .iter()
                    .map(|name| strategy_by_name(name).ok_or_else(|| JobError::UnknownStrategy(name.clone())))
                    .collect::<Result<Vec<Box<dyn Strategy>>, _>>()?;
                let needed = strategies.iter().map(|s| s.min_candles()).max().unwrap_or(1);

                let mut signals: Vec<TradeSignal> = Vec::new();
                for symbol in &params.symbols {
                    let candles = self.candles(symbol, &params.interval, needed.max(100)).await?;
                    signals.extend(strategies.iter().filter_map(|s| s.evaluate(symbol, &candles)));
                }
                Ok(serde_json::to_value(signals)?)
            }
        }
    }

    async fn candles(&self, symbol: &str, interval: &str, limit: usize) -> Result<Vec<Candle>, JobError> {
        let connector = self.connectors.connect(&self.market_data_connector)?;
        let result = connector.fetch_candles(symbol, interval, limit).await;
        if let Err(e) = connector.close().await {
            tracing::warn!(connector = connector.name(), error = %e, "connector close failed");
        }
        Ok(result?)
    }
}
