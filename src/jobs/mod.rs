//! Background jobs: backtests and one-shot market scans.
//!
//! [`QueueBridge`] hands out tickets immediately; a single [`JobWorker`]
//! drains the bounded queue and records each job's [`JobStatus`].

pub mod queue;
pub mod worker;

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;

use crate::core::{ConnectorError, ConnectorNotFoundError};

pub use queue::{Job, JobTicket, QueueBridge};
pub use worker::JobWorker;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    Backtest,
    MarketScan,
}

impl JobKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobKind::Backtest => "backtest",
            JobKind::MarketScan => "scan",
        }
    }
}

impl FromStr for JobKind {
    type Err = JobError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "backtest" => Ok(JobKind::Backtest),
            "scan" | "market_scan" => Ok(JobKind::MarketScan),
            _ => Err(JobError::UnknownJobType(s.to_string())),
        }
    }
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", content = "detail", rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Running,
    Completed(serde_json::Value),
    Failed(String),
}

impl JobStatus {
    pub fn is_finished(&self) -> bool {
        matches!(self, JobStatus::Completed(_) | JobStatus::Failed(_))
    }
}

/// Finished jobs kept for status lookups before the oldest are evicted.
pub const FINISHED_RETAINED: usize = 256;

/// Job statuses by id. Queued and running jobs are always kept; finished
/// ones are evicted oldest first past a fixed cap.
#[derive(Debug)]
pub struct JobStatusBook {
    statuses: HashMap<String, JobStatus>,
    finished: VecDeque<String>,
    retain: usize,
}

impl Default for JobStatusBook {
    fn default() -> Self {
        Self::with_retention(FINISHED_RETAINED)
    }
}

impl JobStatusBook {
    pub fn with_retention(retain: usize) -> Self {
        Self {
            statuses: HashMap::new(),
            finished: VecDeque::new(),
            retain,
        }
    }

    pub fn get(&self, job_id: &str) -> Option<&JobStatus> {
        self.statuses.get(job_id)
    }

    pub fn insert(&mut self, job_id: &str, status: JobStatus) {
        let finished = status.is_finished();
        let previous = self.statuses.insert(job_id.to_string(), status);
        if !finished || previous.is_some_and(|p| p.is_finished()) {
            return;
        }

        self.finished.push_back(job_id.to_string());
        while self.finished.len() > self.retain {
            if let Some(oldest) = self.finished.pop_front() {
                self.statuses.remove(&oldest);
                tracing::debug!(job_id = %oldest, "finished job status evicted");
            }
        }
    }

    pub fn remove(&mut self, job_id: &str) -> Option<JobStatus> {
        self.statuses.remove(job_id)
    }

    pub fn len(&self) -> usize {
        self.statuses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.statuses.is_empty()
    }
}

pub type JobStatusMap = Arc<RwLock<JobStatusBook>>;

#[derive(Debug, Error)]
pub enum JobError {
    #[error("unknown job type: {0}")]
    UnknownJobType(String),

    #[error("job queue is full")]
    QueueFull,

    #[error("job queue is closed")]
    QueueClosed,

    #[error("invalid job payload: {0}")]
    InvalidPayload(#[from] serde_json::Error),

    #[error("unknown strategy: {0}")]
    UnknownStrategy(String),

    #[error(transparent)]
    ConnectorNotFound(#[from] ConnectorNotFoundError),

    #[error("market data error: {0}")]
    Connector(#[from] ConnectorError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_kind_parsing() {
        assert_eq!("backtest".parse::<JobKind>().unwrap(), JobKind::Backtest);
        assert_eq!(" SCAN ".parse::<JobKind>().unwrap(), JobKind::MarketScan);
        assert!(matches!(
            "retrain".parse::<JobKind>(),
            Err(JobError::UnknownJobType(t)) if t == "retrain"
        ));
    }

    #[test]
    fn test_finished_statuses_are_capped() {
        let mut book = JobStatusBook::with_retention(2);
        book.insert("live", JobStatus::Running);
        for id in ["a", "b", "c"] {
            book.insert(id, JobStatus::Queued);
            book.insert(id, JobStatus::Completed(serde_json::json!({})));
        }

        assert_eq!(book.len(), 3);
        assert!(book.get("a").is_none());
        assert!(book.get("b").is_some());
        assert!(book.get("c").is_some());
        assert_eq!(book.get("live"), Some(&JobStatus::Running));
    }

    #[test]
    fn test_status_serializes_with_state_tag() {
        let json = serde_json::to_value(JobStatus::Failed("boom".into())).unwrap();
        assert_eq!(json, serde_json::json!({"state": "failed", "detail": "boom"}));
    }
}
