use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};
use uuid::Uuid;

use super::{JobError, JobKind, JobStatus, JobStatusBook, JobStatusMap};

#[derive(Debug, Clone)]
pub struct Job {
    pub id: String,
    pub kind: JobKind,
    pub payload: serde_json::Value,
    pub submitted_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct JobTicket {
    pub id: String,
    pub kind: JobKind,
    pub submitted_at: DateTime<Utc>,
}

/// Producer side of the job queue.
#[derive(Clone)]
pub struct QueueBridge {
    sender: mpsc::Sender<Job>,
    statuses: JobStatusMap,
}

impl QueueBridge {
    /// Returns the bridge and the receiver to hand to a [`super::JobWorker`].
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<Job>) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        let bridge = Self {
            sender,
            statuses: Arc::new(RwLock::new(JobStatusBook::default())),
        };
        (bridge, receiver)
    }

    pub fn statuses(&self) -> JobStatusMap {
        self.statuses.clone()
    }

    /// Enqueues without waiting for the job to run.
    pub async fn submit(&self, job_type: &str, payload: serde_json::Value) -> Result<JobTicket, JobError> {
        let kind: JobKind = job_type.parse()?;
        let job = Job {
            id: Uuid::new_v4().to_string(),
            kind,
            payload,
            submitted_at: Utc::now(),
        };
        let ticket = JobTicket {
            id: job.id.clone(),
            kind,
            submitted_at: job.submitted_at,
        };

        // status goes in first so the worker never sees an unknown id
        self.statuses.write().await.insert(&job.id, JobStatus::Queued);

        if let Err(e) = self.sender.try_send(job) {
            self.statuses.write().await.remove(&ticket.id);
            return Err(match e {
                mpsc::error::TrySendError::Full(_) => JobError::QueueFull,
                mpsc::error::TrySendError::Closed(_) => JobError::QueueClosed,
            });
        }

        tracing::info!(job_id = %ticket.id, kind = %kind, "job queued");
        Ok(ticket)
    }

    pub async fn status(&self, job_id: &str) -> Option<JobStatus> {
        self.statuses.read().await.get(job_id).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tokio_test::{assert_err, assert_ok};

    #[tokio::test]
    async fn test_submit_returns_ticket_and_queues() {
        let (bridge, mut receiver) = QueueBridge::new(4);

        let ticket = assert_ok!(bridge.submit("backtest", json!({"symbol": "BTC/USDT"})).await);

        assert_eq!(ticket.kind, JobKind::Backtest);
        assert_eq!(bridge.status(&ticket.id).await, Some(JobStatus::Queued));

        let job = receiver.recv().await.unwrap();
        assert_eq!(job.id, ticket.id);
        assert_eq!(job.payload["symbol"], "BTC/USDT");
    }

    #[tokio::test]
    async fn test_unknown_job_type_is_refused() {
        let (bridge, mut receiver) = QueueBridge::new(4);

        let err = assert_err!(bridge.submit("retrain_model", json!({})).await);

        assert!(matches!(err, JobError::UnknownJobType(_)));
        assert!(receiver.try_recv().is_err());
        assert!(bridge.statuses().read().await.is_empty());
    }

    #[tokio::test]
    async fn test_full_queue_is_reported() {
        let (bridge, _receiver) = QueueBridge::new(1);

        assert_ok!(bridge.submit("scan", json!({})).await);
        let err = assert_err!(bridge.submit("scan", json!({})).await);

        assert!(matches!(err, JobError::QueueFull));
        assert_eq!(bridge.statuses().read().await.len(), 1);
    }

    #[tokio::test]
    async fn test_closed_queue_is_reported() {
        let (bridge, receiver) = QueueBridge::new(1);
        drop(receiver);

        let err = bridge.submit("scan", json!({})).await.unwrap_err();
        assert!(matches!(err, JobError::QueueClosed));
    }
}
