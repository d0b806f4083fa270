use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};

use super::directory::StudentDirectory;
use super::domain::{ExamScope, JobId, PaperId, ResultStatus};
use super::error::ExamError;
use super::jobs::{
    DispatchError, InMemoryJobQueue, JobDispatcher, JobKind, JobReport, JobSpec, JobTicket,
    QueuedJob,
};
use super::readiness::{self, roster};
use super::results::{self, GradingScale};
use super::status::{EntityKind, ExamAction, PaperAction, StatusPolicy};
use super::store::{ExamRecord, ExamStore};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum GenerateOutcome {
    /// Provisional rows exist and match the current marks.
    Ready { provisional: usize },
    /// Generation was queued; poll the job and retry.
    Generating { job_id: JobId },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum PublishOutcome {
    Publishing { job_id: JobId },
    /// Provisional rows were missing or out of date, so generation runs first.
    Generating { job_id: JobId },
    AlreadyPublished { published_at: DateTime<Utc> },
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LockSummary {
    pub papers_locked: Vec<PaperId>,
    pub papers_skipped: Vec<PaperId>,
}

/// Two-phase result pipeline: generate provisional rows, then publish them behind the
/// readiness checklist. Both phases run as jobs and are safe to re-run.
pub struct ResultPublishOrchestrator<S, D, J> {
    store: Arc<S>,
    directory: Arc<D>,
    dispatcher: Arc<J>,
    grading: GradingScale,
}

impl<S, D, J> ResultPublishOrchestrator<S, D, J>
where
    S: ExamStore + 'static,
    D: StudentDirectory + 'static,
    J: JobDispatcher + 'static,
{
    pub fn new(
        store: Arc<S>,
        directory: Arc<D>,
        dispatcher: Arc<J>,
        grading: GradingScale,
    ) -> Self {
        Self {
            store,
            directory,
            dispatcher,
            grading,
        }
    }

    pub fn grading(&self) -> &GradingScale {
        &self.grading
    }

    /// Report provisional rows, or queue generation when they are missing or stale.
    pub fn generate(&self, scope: &ExamScope) -> Result<GenerateOutcome, ExamError> {
        let snapshot = self.store.snapshot(scope)?;
        let students = roster(self.directory.as_ref(), &snapshot)?;

        self.store.transact(scope, |record| {
            ensure_unpublished(record)?;
            self.ensure_idle(record.generation_job.as_ref(), JobKind::GenerateResults)?;

            if results::provisional_is_current(record, &students, &self.grading)? {
                let provisional = record.provisional_results();
                return Ok(GenerateOutcome::Ready { provisional });
            }
            let job_id = self.enqueue(record, JobKind::GenerateResults, students.len())?;
            Ok(GenerateOutcome::Generating { job_id })
        })
    }

    /// Queue generation even when provisional rows exist, e.g. after marks were corrected.
    pub fn regenerate(&self, scope: &ExamScope) -> Result<JobId, ExamError> {
        let units = self.scoped_students(scope)?;
        self.store.transact(scope, |record| {
            ensure_unpublished(record)?;
            self.ensure_idle(record.generation_job.as_ref(), JobKind::GenerateResults)?;
            self.enqueue(record, JobKind::GenerateResults, units)
        })
    }

    /// Request publishing. The checklist is evaluated against the state being written.
    pub fn publish(&self, scope: &ExamScope) -> Result<PublishOutcome, ExamError> {
        let snapshot = self.store.snapshot(scope)?;
        let students = roster(self.directory.as_ref(), &snapshot)?;

        self.store.transact(scope, |record| {
            if let Some(published_at) = record.exam.results_published_at {
                return Ok(PublishOutcome::AlreadyPublished { published_at });
            }
            self.ensure_idle(record.publish_job.as_ref(), JobKind::PublishResults)?;
            self.ensure_idle(record.generation_job.as_ref(), JobKind::GenerateResults)?;

            let checklist = readiness::evaluate(record, &students);
            if !checklist.ready_to_publish {
                warn!(
                    exam = %scope,
                    blocked_by = %checklist.summary(),
                    "result publish blocked"
                );
                return Err(ExamError::ReadinessBlocked(checklist));
            }

            if !results::provisional_is_current(record, &students, &self.grading)? {
                let job_id = self.enqueue(record, JobKind::GenerateResults, students.len())?;
                return Ok(PublishOutcome::Generating { job_id });
            }
            let provisional = record.provisional_results();
            let job_id = self.enqueue(record, JobKind::PublishResults, provisional)?;
            Ok(PublishOutcome::Publishing { job_id })
        })
    }

    /// Runner entry point for a claimed job.
    pub fn execute(&self, job: &QueuedJob, now: DateTime<Utc>) -> Result<JobReport, ExamError> {
        match job.spec.kind {
            JobKind::GenerateResults => self.execute_generation(&job.spec.scope, &job.id),
            JobKind::PublishResults => self.execute_publish(&job.spec.scope, now),
        }
    }

    /// Upsert one provisional row per scoped student. Published rows are never touched.
    pub fn execute_generation(
        &self,
        scope: &ExamScope,
        job_id: &JobId,
    ) -> Result<JobReport, ExamError> {
        let snapshot = self.store.snapshot(scope)?;
        let students = roster(self.directory.as_ref(), &snapshot)?;

        self.store.transact(scope, |record| {
            let computed = results::compute(record, &students, &self.grading, job_id)?;
            record.results.retain(|_, result| !result.is_provisional());

            let mut report = JobReport::default();
            for result in computed {
                if record.results.contains_key(&result.student_id) {
                    continue;
                }
                record.results.insert(result.student_id.clone(), result);
                report.processed += 1;
            }

            info!(exam = %scope, job = %job_id, rows = report.processed, "results generated");
            Ok(report)
        })
    }

    /// Flip provisional rows to published. `published_at` is stamped once per row and once
    /// on the exam, so a replayed job changes nothing.
    pub fn execute_publish(
        &self,
        scope: &ExamScope,
        now: DateTime<Utc>,
    ) -> Result<JobReport, ExamError> {
        let snapshot = self.store.snapshot(scope)?;
        let students = roster(self.directory.as_ref(), &snapshot)?;

        self.store.transact(scope, |record| {
            if record.exam.results_published_at.is_some() && record.provisional_results() == 0 {
                return Ok(JobReport::default());
            }

            let checklist = readiness::evaluate(record, &students);
            if !checklist.ready_to_publish {
                warn!(
                    exam = %scope,
                    blocked_by = %checklist.summary(),
                    "publish job blocked"
                );
                return Err(ExamError::ReadinessBlocked(checklist));
            }
            if !results::provisional_is_current(record, &students, &self.grading)? {
                warn!(exam = %scope, "publish job found stale provisional results");
                return Err(ExamError::validation(
                    "provisional results no longer match the verified marks; regenerate first",
                ));
            }

            let mut report = JobReport::default();
            for result in record.results.values_mut() {
                if result.status == ResultStatus::Provisional {
                    result.status = ResultStatus::Published;
                    result.published_at.get_or_insert(now);
                    report.processed += 1;
                }
            }
            let published_at = *record.exam.results_published_at.get_or_insert(now);

            info!(
                exam = %scope,
                rows = report.processed,
                published_at = %published_at,
                "results published"
            );
            Ok(report)
        })
    }

    /// Poll a job recorded against this exam. Jobs of other exams are not found.
    pub fn job_status(&self, scope: &ExamScope, job_id: &JobId) -> Result<JobTicket, ExamError> {
        let record = self.store.snapshot(scope)?;
        let kind = *record
            .jobs
            .get(job_id)
            .ok_or_else(|| ExamError::not_found(EntityKind::Job, job_id))?;
        let status = self
            .dispatcher
            .status(job_id)?
            .ok_or_else(|| DispatchError::UnknownJob(job_id.clone()))?;
        Ok(JobTicket {
            job_id: job_id.clone(),
            kind,
            status,
        })
    }

    /// Lock the exam and every approved paper in one unit; other papers are left as they are.
    /// A locked exam accepts no new papers or marks.
    pub fn lock_exam(
        &self,
        scope: &ExamScope,
        now: DateTime<Utc>,
    ) -> Result<LockSummary, ExamError> {
        self.store.transact(scope, |record| {
            record.exam.status = record.exam.status.transition(ExamAction::Lock)?;
            record.exam.locked_at = Some(now);

            let mut summary = LockSummary::default();
            for paper in record.papers.values_mut() {
                match paper.status.next(PaperAction::Lock) {
                    Some(next) => {
                        paper.status = next;
                        summary.papers_locked.push(paper.id.clone());
                    }
                    None => summary.papers_skipped.push(paper.id.clone()),
                }
            }

            info!(
                exam = %scope,
                papers_locked = summary.papers_locked.len(),
                papers_skipped = summary.papers_skipped.len(),
                "exam locked"
            );
            Ok(summary)
        })
    }

    fn scoped_students(&self, scope: &ExamScope) -> Result<usize, ExamError> {
        let snapshot = self.store.snapshot(scope)?;
        Ok(roster(self.directory.as_ref(), &snapshot)?.len())
    }

    fn ensure_idle(&self, job_id: Option<&JobId>, kind: JobKind) -> Result<(), ExamError> {
        let Some(job_id) = job_id else {
            return Ok(());
        };
        match self.dispatcher.status(job_id)? {
            Some(status) if status.in_flight() => Err(ExamError::JobInFlight(JobTicket {
                job_id: job_id.clone(),
                kind,
                status,
            })),
            _ => Ok(()),
        }
    }

    fn enqueue(
        &self,
        record: &mut ExamRecord,
        kind: JobKind,
        units: usize,
    ) -> Result<JobId, ExamError> {
        let scope = record.exam.scope();
        let job_id = self.dispatcher.enqueue(JobSpec {
            kind,
            scope: scope.clone(),
            units,
        })?;

        record.jobs.insert(job_id.clone(), kind);
        match kind {
            JobKind::GenerateResults => record.generation_job = Some(job_id.clone()),
            JobKind::PublishResults => record.publish_job = Some(job_id.clone()),
        }
        info!(exam = %scope, job = %job_id, kind = kind.label(), units, "job queued");
        Ok(job_id)
    }
}

impl<S, D> ResultPublishOrchestrator<S, D, InMemoryJobQueue>
where
    S: ExamStore + 'static,
    D: StudentDirectory + 'static,
{
    /// Claim and run every pending job on the in-process queue, settling each one.
    pub fn drain_queue(&self, now: DateTime<Utc>) -> Result<usize, ExamError> {
        let mut executed = 0;
        while let Some(job) = self.dispatcher.claim_next()? {
            match self.execute(&job, now) {
                Ok(report) => {
                    self.dispatcher.complete(&job.id, report)?;
                }
                Err(error) => {
                    warn!(job = %job.id, kind = job.spec.kind.label(), %error, "job failed");
                    self.dispatcher.fail(&job.id)?;
                }
            }
            executed += 1;
        }
        Ok(executed)
    }
}

fn ensure_unpublished(record: &ExamRecord) -> Result<(), ExamError> {
    if record.exam.results_published_at.is_some() {
        return Err(ExamError::validation(format!(
            "results for exam {} are already published",
            record.exam.id
        )));
    }
    Ok(())
}
