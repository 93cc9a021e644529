//! `WorkQueue` (§4.8): FIFO with blocking dequeue, a deadline parameter, and
//! bounded re-enqueue. An in-process bounded channel is the default backing
//! so the gateway runs standalone; swap for a real broker behind the trait.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{Mutex, mpsc};

#[derive(Debug, Clone)]
pub struct QueueItem {
    pub job_id: String,
    pub admission_deadline: std::time::Instant,
}

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("queue is at capacity")]
    Full,
    #[error("queue is closed")]
    Closed,
}

#[async_trait]
pub trait WorkQueue: Send + Sync {
    async fn enqueue(&self, item: QueueItem) -> Result<(), QueueError>;

    /// Blocks up to `timeout` for an item, returning `None` on timeout.
    async fn dequeue(&self, timeout: Duration) -> Option<QueueItem>;
}

pub struct BoundedWorkQueue {
    tx: mpsc::Sender<QueueItem>,
    rx: Arc<Mutex<mpsc::Receiver<QueueItem>>>,
}

impl BoundedWorkQueue {
    pub fn new(capacity: usize) -> Self {
        let (tx, rx) = mpsc::channel(capacity);
        Self {
            tx,
            rx: Arc::new(Mutex::new(rx)),
        }
    }
}

#[async_trait]
impl WorkQueue for BoundedWorkQueue {
    async fn enqueue(&self, item: QueueItem) -> Result<(), QueueError> {
        self.tx.try_send(item).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => QueueError::Full,
            mpsc::error::TrySendError::Closed(_) => QueueError::Closed,
        })
    }

    async fn dequeue(&self, timeout: Duration) -> Option<QueueItem> {
        let mut rx = self.rx.lock().await;
        tokio::time::timeout(timeout, rx.recv()).await.ok().flatten()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fifo_order_is_preserved() {
        let q = BoundedWorkQueue::new(4);
        for i in 0..3 {
            q.enqueue(QueueItem {
                job_id: format!("job-{i}"),
                admission_deadline: std::time::Instant::now() + Duration::from_secs(30),
            })
            .await
            .unwrap();
        }
        for i in 0..3 {
            let item = q.dequeue(Duration::from_millis(100)).await.unwrap();
            assert_eq!(item.job_id, format!("job-{i}"));
        }
    }

    #[tokio::test]
    async fn dequeue_times_out_on_empty_queue() {
        let q = BoundedWorkQueue::new(4);
        assert!(q.dequeue(Duration::from_millis(10)).await.is_none());
    }

    #[tokio::test]
    async fn enqueue_rejects_past_capacity() {
        let q = BoundedWorkQueue::new(1);
        q.enqueue(QueueItem {
            job_id: "a".into(),
            admission_deadline: std::time::Instant::now(),
        })
        .await
        .unwrap();

        let err = q
            .enqueue(QueueItem {
                job_id: "b".into(),
                admission_deadline: std::time::Instant::now(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, QueueError::Full));
    }
}
