use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};

use super::domain::{ExamScope, JobId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    GenerateResults,
    PublishResults,
}

impl JobKind {
    pub const fn label(self) -> &'static str {
        match self {
            Self::GenerateResults => "result generation",
            Self::PublishResults => "result publishing",
        }
    }
}

/// Durable request handed to the job runner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobSpec {
    pub kind: JobKind,
    pub scope: ExamScope,
    /// Per-student units in the batch; drives progress reporting.
    pub units: usize,
}

/// Polling view of a job batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobStatus {
    pub total_jobs: usize,
    pub pending_jobs: usize,
    pub failed_jobs: usize,
    pub processed_jobs: usize,
    pub progress_percent: u8,
    pub finished: bool,
    pub cancelled: bool,
}

impl JobStatus {
    pub fn queued(total_jobs: usize) -> Self {
        Self {
            total_jobs,
            pending_jobs: total_jobs,
            failed_jobs: 0,
            processed_jobs: 0,
            progress_percent: 0,
            finished: false,
            cancelled: false,
        }
    }

    pub fn in_flight(&self) -> bool {
        !self.finished && !self.cancelled
    }

    fn settle(&mut self, report: JobReport) {
        self.processed_jobs = report.processed;
        self.failed_jobs = report.failed;
        self.total_jobs = self.total_jobs.max(report.processed + report.failed);
        self.pending_jobs = 0;
        self.progress_percent = 100;
        self.finished = true;
    }
}

/// Counts reported by the runner once a job has executed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobReport {
    pub processed: usize,
    pub failed: usize,
}

/// A job id paired with its last known status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobTicket {
    pub job_id: JobId,
    pub kind: JobKind,
    pub status: JobStatus,
}

/// Claimed work item on the runner side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueuedJob {
    pub id: JobId,
    pub spec: JobSpec,
}

/// Hand-off to whatever queue technology runs generation and publishing.
pub trait JobDispatcher: Send + Sync {
    fn enqueue(&self, spec: JobSpec) -> Result<JobId, DispatchError>;

    fn status(&self, job_id: &JobId) -> Result<Option<JobStatus>, DispatchError>;
}

#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("job queue unavailable: {0}")]
    Unavailable(String),
    #[error("job {0} is unknown to the queue")]
    UnknownJob(JobId),
}

#[derive(Debug, Default)]
struct QueueState {
    sequence: u64,
    pending: VecDeque<JobId>,
    claimed: HashSet<JobId>,
    jobs: HashMap<JobId, (JobSpec, JobStatus)>,
}

/// At-least-once in-process queue. Claimed jobs stay in flight until completed or failed;
/// only jobs still waiting in the queue can be cancelled.
#[derive(Debug, Default, Clone)]
pub struct InMemoryJobQueue {
    state: Arc<Mutex<QueueState>>,
}

impl InMemoryJobQueue {
    fn with_state<T>(
        &self,
        f: impl FnOnce(&mut QueueState) -> Result<T, DispatchError>,
    ) -> Result<T, DispatchError> {
        let mut guard = self
            .state
            .lock()
            .map_err(|_| DispatchError::Unavailable("job queue lock poisoned".to_string()))?;
        f(&mut guard)
    }

    /// Take the oldest pending job, skipping any that were cancelled while queued.
    pub fn claim_next(&self) -> Result<Option<QueuedJob>, DispatchError> {
        self.with_state(|state| {
            while let Some(id) = state.pending.pop_front() {
                if let Some((spec, status)) = state.jobs.get(&id) {
                    if status.cancelled {
                        continue;
                    }
                    state.claimed.insert(id.clone());
                    return Ok(Some(QueuedJob {
                        id,
                        spec: spec.clone(),
                    }));
                }
            }
            Ok(None)
        })
    }

    pub fn complete(&self, job_id: &JobId, report: JobReport) -> Result<JobStatus, DispatchError> {
        self.with_state(|state| {
            let (_, status) = state
                .jobs
                .get_mut(job_id)
                .ok_or_else(|| DispatchError::UnknownJob(job_id.clone()))?;
            status.settle(report);
            let status = *status;
            state.claimed.remove(job_id);
            Ok(status)
        })
    }

    /// Record a job whose execution failed as a whole.
    pub fn fail(&self, job_id: &JobId) -> Result<JobStatus, DispatchError> {
        self.with_state(|state| {
            let (_, status) = state
                .jobs
                .get_mut(job_id)
                .ok_or_else(|| DispatchError::UnknownJob(job_id.clone()))?;
            let processed = status.processed_jobs;
            let failed = status.total_jobs.saturating_sub(processed).max(1);
            status.settle(JobReport { processed, failed });
            let status = *status;
            state.claimed.remove(job_id);
            Ok(status)
        })
    }

    /// Withdraw a job that no runner has claimed yet. A claimed job runs to completion and
    /// its status is returned unchanged.
    pub fn cancel(&self, job_id: &JobId) -> Result<JobStatus, DispatchError> {
        self.with_state(|state| {
            let running = state.claimed.contains(job_id);
            let (_, status) = state
                .jobs
                .get_mut(job_id)
                .ok_or_else(|| DispatchError::UnknownJob(job_id.clone()))?;
            if status.in_flight() && !running {
                status.cancelled = true;
            }
            Ok(*status)
        })
    }

    /// Put a claimed job back at the front of the queue, e.g. after a worker timeout.
    pub fn requeue(&self, job_id: &JobId) -> Result<(), DispatchError> {
        self.with_state(|state| {
            if !state.jobs.contains_key(job_id) {
                return Err(DispatchError::UnknownJob(job_id.clone()));
            }
            state.claimed.remove(job_id);
            state.pending.push_front(job_id.clone());
            Ok(())
        })
    }

    pub fn pending_len(&self) -> Result<usize, DispatchError> {
        self.with_state(|state| Ok(state.pending.len()))
    }
}

impl JobDispatcher for InMemoryJobQueue {
    fn enqueue(&self, spec: JobSpec) -> Result<JobId, DispatchError> {
        self.with_state(|state| {
            state.sequence += 1;
            let id = JobId(format!("job-{:06}", state.sequence));
            let status = JobStatus::queued(spec.units);
            state.jobs.insert(id.clone(), (spec, status));
            state.pending.push_back(id.clone());
            Ok(id)
        })
    }

    fn status(&self, job_id: &JobId) -> Result<Option<JobStatus>, DispatchError> {
        self.with_state(|state| Ok(state.jobs.get(job_id).map(|(_, status)| *status)))
    }
}
