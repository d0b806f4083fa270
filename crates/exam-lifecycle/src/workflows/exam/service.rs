use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::Deserialize;
use tracing::info;

use super::datesheet::DatesheetWorkflow;
use super::directory::StudentDirectory;
use super::domain::{ClassId, Exam, ExamScope, SchoolId};
use super::error::ExamError;
use super::jobs::JobDispatcher;
use super::marks::MarkWorkflow;
use super::papers::PaperWorkflow;
use super::publish::ResultPublishOrchestrator;
use super::readiness::PublishReadinessEvaluator;
use super::results::GradingScale;
use super::store::{ExamRecord, ExamStore};

static EXAM_SEQUENCE: AtomicU64 = AtomicU64::new(1);

fn next_exam_id() -> String {
    let id = EXAM_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    format!("exam-{id:06}")
}

/// Fields accepted when an exam is opened.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct NewExam {
    #[serde(default)]
    pub exam_id: Option<String>,
    pub name: String,
    pub session: String,
    pub class_ids: Vec<ClassId>,
}

/// Entry point composing every exam workflow over shared collaborators.
pub struct ExamLifecycleService<S, D, J> {
    store: Arc<S>,
    datesheets: DatesheetWorkflow<S>,
    papers: PaperWorkflow<S>,
    marks: MarkWorkflow<S>,
    readiness: PublishReadinessEvaluator<S, D>,
    results: ResultPublishOrchestrator<S, D, J>,
}

impl<S, D, J> ExamLifecycleService<S, D, J>
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
            datesheets: DatesheetWorkflow::new(Arc::clone(&store)),
            papers: PaperWorkflow::new(Arc::clone(&store)),
            marks: MarkWorkflow::new(Arc::clone(&store)),
            readiness: PublishReadinessEvaluator::new(Arc::clone(&store), Arc::clone(&directory)),
            results: ResultPublishOrchestrator::new(
                Arc::clone(&store),
                directory,
                dispatcher,
                grading,
            ),
            store,
        }
    }

    pub fn create_exam(&self, school_id: SchoolId, request: NewExam) -> Result<Exam, ExamError> {
        if request.name.trim().is_empty() {
            return Err(ExamError::validation("exam name is required"));
        }
        if request.session.trim().is_empty() {
            return Err(ExamError::validation("session is required"));
        }
        if request.class_ids.is_empty() {
            return Err(ExamError::validation("an exam needs at least one class"));
        }

        let exam_id = request
            .exam_id
            .map(|id| id.trim().to_string())
            .filter(|id| !id.is_empty())
            .unwrap_or_else(next_exam_id);
        let scope = ExamScope::new(school_id.0, exam_id);

        let mut class_ids = request.class_ids;
        class_ids.sort();
        class_ids.dedup();

        let record = self.store.create(Exam::new(
            &scope,
            request.name.trim(),
            request.session.trim(),
            class_ids,
        ))?;
        info!(exam = %scope, classes = record.exam.class_ids.len(), "exam created");
        Ok(record.exam)
    }

    pub fn exam(&self, scope: &ExamScope) -> Result<ExamRecord, ExamError> {
        self.store.snapshot(scope)
    }

    pub fn datesheets(&self) -> &DatesheetWorkflow<S> {
        &self.datesheets
    }

    pub fn papers(&self) -> &PaperWorkflow<S> {
        &self.papers
    }

    pub fn marks(&self) -> &MarkWorkflow<S> {
        &self.marks
    }

    pub fn readiness(&self) -> &PublishReadinessEvaluator<S, D> {
        &self.readiness
    }

    pub fn results(&self) -> &ResultPublishOrchestrator<S, D, J> {
        &self.results
    }
}
