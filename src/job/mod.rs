//! `JobRegistry` (§4.4): a façade over `KVStore`. The writer that owns a
//! `running` job always observes its own writes; other readers tolerate
//! bounded staleness. State transitions are monotonic and never re-enter a
//! prior state.

use crate::backend::ExecuteRequest;
use crate::kvstore::{KVStore, KvError};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tensorgate_schema::Usage;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Queued,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl JobState {
    fn is_terminal(self) -> bool {
        matches!(
            self,
            JobState::Completed | JobState::Failed | JobState::Cancelled
        )
    }

    /// Legal forward transitions: `queued -> running -> {completed, failed,
    /// cancelled}`, plus `queued -> cancelled` directly (a queued job can be
    /// cancelled before a worker ever picks it up).
    fn can_transition_to(self, next: JobState) -> bool {
        match (self, next) {
            (JobState::Queued, JobState::Running | JobState::Cancelled) => true,
            (JobState::Running, JobState::Completed | JobState::Failed | JobState::Cancelled) => {
                true
            }
            _ => false,
        }
    }
}

/// A completed job's output, mirroring the scheduler's in-flight
/// `BlockingResult` so a job record stays self-contained once it lands in
/// `completed` state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobResult {
    pub text: String,
    pub usage: Usage,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: String,
    pub principal_id: i64,
    pub model: String,
    pub params: ExecuteRequest,
    pub state: JobState,
    pub gpu_device: Option<String>,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub started_at: Option<chrono::DateTime<chrono::Utc>>,
    pub completed_at: Option<chrono::DateTime<chrono::Utc>>,
    pub result: Option<JobResult>,
    pub error: Option<String>,
}

impl Job {
    pub fn new(id: String, principal_id: i64, params: ExecuteRequest) -> Self {
        Self {
            id,
            principal_id,
            model: params.model.clone(),
            params,
            state: JobState::Queued,
            gpu_device: None,
            created_at: chrono::Utc::now(),
            started_at: None,
            completed_at: None,
            result: None,
            error: None,
        }
    }
}

#[derive(Debug, Error)]
pub enum JobError {
    #[error("job not found")]
    NotFound,
    #[error("illegal state transition from {from:?} to {to:?}")]
    IllegalTransition { from: JobState, to: JobState },
    #[error("store error: {0}")]
    Store(#[from] KvError),
    #[error("corrupt job record: {0}")]
    Corrupt(String),
}

pub struct JobRegistry {
    kv: Arc<dyn KVStore>,
    ttl: Duration,
}

impl JobRegistry {
    pub fn new(kv: Arc<dyn KVStore>, ttl: Duration) -> Self {
        Self { kv, ttl }
    }

    fn key(id: &str) -> String {
        format!("job:{id}")
    }

    pub async fn create(&self, job: Job) -> Result<(), JobError> {
        let body = serde_json::to_string(&job).map_err(|e| JobError::Corrupt(e.to_string()))?;
        self.kv.set_with_ttl(&Self::key(&job.id), body, self.ttl).await?;
        Ok(())
    }

    pub async fn get(&self, id: &str) -> Result<Option<Job>, JobError> {
        let Some(raw) = self.kv.get(&Self::key(id)).await? else {
            return Ok(None);
        };
        let job = serde_json::from_str(&raw).map_err(|e| JobError::Corrupt(e.to_string()))?;
        Ok(Some(job))
    }

    /// Re-reads the job, lets `mutate` apply a transition, and writes the
    /// result back — aborting instead of writing if the in-flight state no
    /// longer matches what `mutate` expected (e.g. a cancel racing a worker
    /// that has already marked the job terminal).
    pub async fn update_state(
        &self,
        id: &str,
        to: JobState,
        mutate: impl FnOnce(&mut Job),
    ) -> Result<Job, JobError> {
        let mut job = self.get(id).await?.ok_or(JobError::NotFound)?;

        if job.state.is_terminal() {
            return Err(JobError::IllegalTransition {
                from: job.state,
                to,
            });
        }
        if !job.state.can_transition_to(to) {
            return Err(JobError::IllegalTransition {
                from: job.state,
                to,
            });
        }

        job.state = to;
        mutate(&mut job);

        let body = serde_json::to_string(&job).map_err(|e| JobError::Corrupt(e.to_string()))?;
        self.kv.set_with_ttl(&Self::key(id), body, self.ttl).await?;
        Ok(job)
    }

    pub async fn delete(&self, id: &str) -> Result<(), JobError> {
        self.kv.delete(&Self::key(id)).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kvstore::MemoryKvStore;

    fn registry() -> JobRegistry {
        JobRegistry::new(Arc::new(MemoryKvStore::default()), Duration::from_secs(3600))
    }

    fn params(model: &str) -> ExecuteRequest {
        ExecuteRequest {
            model: model.to_string(),
            messages: vec![],
            max_tokens: None,
            temperature: None,
        }
    }

    #[tokio::test]
    async fn create_then_get_round_trips() {
        let reg = registry();
        let job = Job::new("j1".into(), 1, params("gpt-4"));
        reg.create(job.clone()).await.unwrap();
        let fetched = reg.get("j1").await.unwrap().unwrap();
        assert_eq!(fetched.state, JobState::Queued);
    }

    #[tokio::test]
    async fn cannot_reenter_a_prior_state() {
        let reg = registry();
        reg.create(Job::new("j1".into(), 1, params("gpt-4"))).await.unwrap();
        reg.update_state("j1", JobState::Running, |_| {}).await.unwrap();
        reg.update_state("j1", JobState::Completed, |_| {}).await.unwrap();

        let err = reg.update_state("j1", JobState::Running, |_| {}).await.unwrap_err();
        assert!(matches!(err, JobError::IllegalTransition { .. }));
    }

    #[tokio::test]
    async fn cancel_after_completion_is_rejected() {
        let reg = registry();
        reg.create(Job::new("j1".into(), 1, params("gpt-4"))).await.unwrap();
        reg.update_state("j1", JobState::Running, |_| {}).await.unwrap();
        reg.update_state("j1", JobState::Failed, |_| {}).await.unwrap();

        let err = reg.update_state("j1", JobState::Cancelled, |_| {}).await.unwrap_err();
        assert!(matches!(err, JobError::IllegalTransition { .. }));
    }
}
