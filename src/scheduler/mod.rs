//! `Scheduler` (§4.6) — "the heart": a small worker-task pool draining the
//! job queue, allocating a GPU lease per job, invoking the backend, and
//! releasing the lease on every terminal path (including a caught panic).

use crate::backend::{ExecuteRequest, InferenceBackend};
use crate::error::GatewayError;
use crate::gpu::GpuPool;
use crate::job::{Job, JobRegistry, JobResult, JobState};
use crate::metrics::MetricsSink;
use crate::queue::{QueueItem, WorkQueue};
use futures::FutureExt;
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tensorgate_schema::Usage;
use tokio::sync::{Mutex, mpsc, oneshot};
use tokio_stream::StreamExt;
use tracing::error;
use uuid::Uuid;

const BACKOFF_BASE: Duration = Duration::from_millis(10);
const BACKOFF_CAP: Duration = Duration::from_millis(250);

pub struct BlockingResult {
    pub text: String,
    pub usage: Usage,
}

pub enum Dispatch {
    Blocking(oneshot::Receiver<Result<BlockingResult, GatewayError>>),
    Streaming(mpsc::Receiver<Result<String, GatewayError>>),
}

enum PendingDispatch {
    Blocking(oneshot::Sender<Result<BlockingResult, GatewayError>>),
    Streaming(mpsc::Sender<Result<String, GatewayError>>),
}

struct PendingJob {
    request: ExecuteRequest,
    attempts: u32,
    dispatch: PendingDispatch,
}

/// A deferred re-admission attempt, ordered by wake time. Mirrors a
/// credential pool's cooldown/waiting-room reclaim pattern, applied here to
/// GPU admission backoff instead of upstream rate-limit cooldowns.
struct RetryTicket {
    wake_at: Instant,
    item: QueueItem,
}

impl PartialEq for RetryTicket {
    fn eq(&self, other: &Self) -> bool {
        self.wake_at == other.wake_at
    }
}
impl Eq for RetryTicket {}
impl PartialOrd for RetryTicket {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for RetryTicket {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        // Reverse so the heap pops the earliest wake time first.
        Reverse(self.wake_at).cmp(&Reverse(other.wake_at))
    }
}

struct Shared {
    gpu: Mutex<GpuPool>,
    jobs: JobRegistry,
    backend: Arc<dyn InferenceBackend>,
    metrics: Arc<dyn MetricsSink>,
    queue: Arc<dyn WorkQueue>,
    pending: Mutex<HashMap<String, PendingJob>>,
    waiting_room: Mutex<BinaryHeap<RetryTicket>>,
}

pub struct Scheduler {
    shared: Arc<Shared>,
}

impl Scheduler {
    pub fn new(
        gpu: GpuPool,
        jobs: JobRegistry,
        backend: Arc<dyn InferenceBackend>,
        metrics: Arc<dyn MetricsSink>,
        queue: Arc<dyn WorkQueue>,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                gpu: Mutex::new(gpu),
                jobs,
                backend,
                metrics,
                queue,
                pending: Mutex::new(HashMap::new()),
                waiting_room: Mutex::new(BinaryHeap::new()),
            }),
        }
    }

    /// Spawns `worker_count` dispatch loops (sized ~2x GPU count per §5).
    pub fn spawn_workers(&self, worker_count: usize) {
        for _ in 0..worker_count {
            let shared = self.shared.clone();
            tokio::spawn(async move { worker_loop(shared).await });
        }
    }

    pub async fn submit(
        &self,
        principal_id: i64,
        request: ExecuteRequest,
        stream: bool,
        admission_deadline: Duration,
    ) -> Result<(String, Dispatch), GatewayError> {
        let job_id = Uuid::new_v4().to_string();
        let job = Job::new(job_id.clone(), principal_id, request.clone());
        self.shared
            .jobs
            .create(job)
            .await
            .map_err(|e| GatewayError::Internal(e.to_string()))?;

        let (dispatch_tx, dispatch_rx) = if stream {
            let (tx, rx) = mpsc::channel(64);
            (PendingDispatch::Streaming(tx), Dispatch::Streaming(rx))
        } else {
            let (tx, rx) = oneshot::channel();
            (PendingDispatch::Blocking(tx), Dispatch::Blocking(rx))
        };

        self.shared.pending.lock().await.insert(
            job_id.clone(),
            PendingJob {
                request,
                attempts: 0,
                dispatch: dispatch_tx,
            },
        );

        self.shared
            .queue
            .enqueue(QueueItem {
                job_id: job_id.clone(),
                admission_deadline: Instant::now() + admission_deadline,
            })
            .await
            .map_err(|_| GatewayError::NoCapacity)?;

        Ok((job_id, dispatch_rx))
    }

    pub async fn cancel(&self, job_id: &str, principal_id: i64) -> Result<(), GatewayError> {
        let job = self
            .shared
            .jobs
            .get(job_id)
            .await
            .map_err(|e| GatewayError::Internal(e.to_string()))?
            .ok_or_else(|| GatewayError::InvalidRequest("job not found".to_string()))?;

        if job.principal_id != principal_id {
            return Err(GatewayError::Permission(
                "job is not owned by this principal".to_string(),
            ));
        }

        let _ = self
            .shared
            .jobs
            .update_state(job_id, JobState::Cancelled, |j| {
                j.completed_at = Some(chrono::Utc::now());
            })
            .await;
        Ok(())
    }
}

async fn worker_loop(shared: Arc<Shared>) {
    loop {
        reclaim_ready_tickets(&shared).await;

        let Some(item) = shared.queue.dequeue(Duration::from_millis(200)).await else {
            continue;
        };

        if Instant::now() >= item.admission_deadline {
            fail_no_capacity(&shared, &item.job_id).await;
            continue;
        }

        let model = {
            let pending = shared.pending.lock().await;
            match pending.get(&item.job_id) {
                Some(p) => p.request.model.clone(),
                None => continue,
            }
        };

        let lease = shared.gpu.lock().await.try_allocate(&model);
        let Some(lease) = lease else {
            requeue_with_backoff(&shared, item).await;
            continue;
        };

        let Some(pending_job) = shared.pending.lock().await.remove(&item.job_id) else {
            shared.gpu.lock().await.release(&lease);
            continue;
        };

        let transition = shared
            .jobs
            .update_state(&item.job_id, JobState::Running, |j| {
                j.gpu_device = Some(lease.device_id.clone());
                j.started_at = Some(chrono::Utc::now());
            })
            .await;

        if transition.is_err() {
            // Job was cancelled (or otherwise made terminal) while queued.
            shared.gpu.lock().await.release(&lease);
            continue;
        }

        shared.metrics.counter_inc("scheduler.jobs_dispatched", 1);

        let job_id = item.job_id.clone();
        let outcome =
            std::panic::AssertUnwindSafe(run_job(shared.clone(), job_id.clone(), pending_job))
                .catch_unwind()
                .await;

        shared.gpu.lock().await.release(&lease);

        if outcome.is_err() {
            error!(job_id = %job_id, "scheduler worker caught a panic; job marked failed");
            let _ = shared
                .jobs
                .update_state(&job_id, JobState::Failed, |j| {
                    j.error = Some("internal worker panic".to_string());
                    j.completed_at = Some(chrono::Utc::now());
                })
                .await;
        }
    }
}

/// Drains any tickets whose backoff has elapsed back onto the work queue.
/// Called at the top of every worker iteration, before the next blocking
/// dequeue, so a requeued job is visible to whichever worker wakes first.
async fn reclaim_ready_tickets(shared: &Arc<Shared>) {
    let now = Instant::now();
    let mut ready = Vec::new();
    {
        let mut room = shared.waiting_room.lock().await;
        while room.peek().is_some_and(|t| t.wake_at <= now) {
            ready.push(room.pop().unwrap().item);
        }
    }
    for item in ready {
        let _ = shared.queue.enqueue(item).await;
    }
}

async fn requeue_with_backoff(shared: &Arc<Shared>, item: QueueItem) {
    if Instant::now() >= item.admission_deadline {
        fail_no_capacity(shared, &item.job_id).await;
        return;
    }

    let attempts = {
        let mut pending = shared.pending.lock().await;
        match pending.get_mut(&item.job_id) {
            Some(p) => {
                p.attempts += 1;
                p.attempts
            }
            None => return,
        }
    };

    let backoff = (BACKOFF_BASE * 2u32.pow(attempts.min(6))).min(BACKOFF_CAP);
    shared.waiting_room.lock().await.push(RetryTicket {
        wake_at: Instant::now() + backoff,
        item,
    });
}

async fn fail_no_capacity(shared: &Arc<Shared>, job_id: &str) {
    if let Some(pending) = shared.pending.lock().await.remove(job_id) {
        dispatch_error(pending.dispatch, GatewayError::NoCapacity).await;
    }
    let _ = shared
        .jobs
        .update_state(job_id, JobState::Failed, |j| {
            j.error = Some("no_capacity".to_string());
            j.completed_at = Some(chrono::Utc::now());
        })
        .await;
}

async fn dispatch_error(dispatch: PendingDispatch, err: GatewayError) {
    match dispatch {
        PendingDispatch::Blocking(tx) => {
            let _ = tx.send(Err(err));
        }
        PendingDispatch::Streaming(tx) => {
            let _ = tx.send(Err(err)).await;
        }
    }
}

async fn run_job(shared: Arc<Shared>, job_id: String, pending: PendingJob) {
    let prompt_tokens: u32 = pending
        .request
        .messages
        .iter()
        .map(|m| m.content.split_whitespace().count() as u32)
        .sum();

    let execution = match shared.backend.execute(pending.request).await {
        Ok(e) => e,
        Err(e) => {
            let _ = shared
                .jobs
                .update_state(&job_id, JobState::Failed, |j| {
                    j.error = Some(e.to_string());
                    j.completed_at = Some(chrono::Utc::now());
                })
                .await;
            dispatch_error(pending.dispatch, e).await;
            return;
        }
    };

    let mut tokens = execution.tokens;
    let mut completion_tokens: u32 = 0;
    let mut text = String::new();
    let mut failure_message: Option<String> = None;
    let mut disconnected = false;
    let mut result: Option<JobResult> = None;

    match pending.dispatch {
        PendingDispatch::Streaming(tx) => {
            while let Some(next) = tokens.next().await {
                match next {
                    Ok(tok) => {
                        completion_tokens += 1;
                        if tx.send(Ok(tok)).await.is_err() {
                            // Client disconnected: stop pulling from the backend
                            // and treat the job as cancelled, not completed.
                            disconnected = true;
                            break;
                        }
                    }
                    Err(e) => {
                        failure_message = Some(e.to_string());
                        let _ = tx.send(Err(e)).await;
                        break;
                    }
                }
            }
        }
        PendingDispatch::Blocking(tx) => {
            let mut backend_err = None;
            while let Some(next) = tokens.next().await {
                match next {
                    Ok(tok) => {
                        completion_tokens += 1;
                        text.push_str(&tok);
                    }
                    Err(e) => {
                        backend_err = Some(e);
                        break;
                    }
                }
            }
            match backend_err {
                Some(e) => {
                    failure_message = Some(e.to_string());
                    let _ = tx.send(Err(e));
                }
                None => {
                    let usage = Usage {
                        prompt_tokens,
                        completion_tokens,
                        total_tokens: prompt_tokens + completion_tokens,
                    };
                    result = Some(JobResult {
                        text: text.clone(),
                        usage,
                    });
                    let _ = tx.send(Ok(BlockingResult { text, usage }));
                }
            }
        }
    }

    let terminal = if disconnected {
        JobState::Cancelled
    } else if failure_message.is_some() {
        JobState::Failed
    } else {
        JobState::Completed
    };
    let _ = shared
        .jobs
        .update_state(&job_id, terminal, |j| {
            j.completed_at = Some(chrono::Utc::now());
            j.error = failure_message.clone();
            j.result = result.clone();
        })
        .await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MockBackend;
    use crate::gpu::Gib;
    use crate::kvstore::MemoryKvStore;
    use std::collections::BTreeMap;
    use tensorgate_schema::ChatMessage;

    fn scheduler() -> Scheduler {
        let gpu = GpuPool::new([("gpu0".to_string(), Gib(80))], BTreeMap::new(), true);
        let jobs = JobRegistry::new(Arc::new(MemoryKvStore::default()), Duration::from_secs(3600));
        let queue: Arc<dyn WorkQueue> = Arc::new(crate::queue::BoundedWorkQueue::new(16));
        Scheduler::new(gpu, jobs, Arc::new(MockBackend), crate::metrics::noop(), queue)
    }

    fn request() -> ExecuteRequest {
        ExecuteRequest {
            model: "gpt-4o-mini".to_string(),
            messages: vec![ChatMessage {
                role: "user".to_string(),
                content: "hi".to_string(),
                extra: Default::default(),
            }],
            max_tokens: None,
            temperature: None,
        }
    }

    #[tokio::test]
    async fn cancel_by_the_owning_principal_succeeds() {
        let scheduler = scheduler();
        let (job_id, _dispatch) = scheduler
            .submit(1, request(), false, Duration::from_secs(5))
            .await
            .unwrap();

        scheduler.cancel(&job_id, 1).await.unwrap();

        let job = scheduler.shared.jobs.get(&job_id).await.unwrap().unwrap();
        assert_eq!(job.state, JobState::Cancelled);
    }

    #[tokio::test]
    async fn cancel_by_a_different_principal_is_rejected() {
        let scheduler = scheduler();
        let (job_id, _dispatch) = scheduler
            .submit(1, request(), false, Duration::from_secs(5))
            .await
            .unwrap();

        let err = scheduler.cancel(&job_id, 2).await.unwrap_err();
        assert!(matches!(err, GatewayError::Permission(_)));
    }

    #[tokio::test]
    async fn cancel_of_an_unknown_job_is_rejected() {
        let scheduler = scheduler();
        let err = scheduler.cancel("no-such-job", 1).await.unwrap_err();
        assert!(matches!(err, GatewayError::InvalidRequest(_)));
    }
}
