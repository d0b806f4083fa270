use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, RwLock};

use serde::Serialize;

use super::domain::{
    Datesheet, Exam, ExamMark, ExamPaper, ExamResult, ExamScope, JobId, MarkId, PaperId, StudentId,
};
use super::error::ExamError;
use super::jobs::JobKind;
use super::status::{EntityKind, ExamStatus};

/// Everything owned by one (school, exam) pair.
#[derive(Debug, Clone, Serialize)]
pub struct ExamRecord {
    pub exam: Exam,
    pub datesheet: Option<Datesheet>,
    pub papers: BTreeMap<PaperId, ExamPaper>,
    pub marks: BTreeMap<MarkId, ExamMark>,
    pub results: BTreeMap<StudentId, ExamResult>,
    pub generation_job: Option<JobId>,
    pub publish_job: Option<JobId>,
    pub jobs: BTreeMap<JobId, JobKind>,
}

impl ExamRecord {
    pub fn new(exam: Exam) -> Self {
        Self {
            exam,
            datesheet: None,
            papers: BTreeMap::new(),
            marks: BTreeMap::new(),
            results: BTreeMap::new(),
            generation_job: None,
            publish_job: None,
            jobs: BTreeMap::new(),
        }
    }

    pub fn provisional_results(&self) -> usize {
        self.results
            .values()
            .filter(|result| result.is_provisional())
            .count()
    }

    /// Refuse new papers and marks once the exam is locked or its results are out.
    pub fn ensure_open(&self) -> Result<(), ExamError> {
        if self.exam.status == ExamStatus::Locked {
            return Err(ExamError::validation(format!("exam {} is locked", self.exam.id)));
        }
        if self.exam.results_published_at.is_some() {
            return Err(ExamError::validation(format!(
                "results for exam {} are already published",
                self.exam.id
            )));
        }
        Ok(())
    }

    pub fn paper(&self, id: &PaperId) -> Result<&ExamPaper, ExamError> {
        self.papers
            .get(id)
            .ok_or_else(|| ExamError::not_found(EntityKind::Paper, id))
    }

    pub fn paper_mut(&mut self, id: &PaperId) -> Result<&mut ExamPaper, ExamError> {
        self.papers
            .get_mut(id)
            .ok_or_else(|| ExamError::not_found(EntityKind::Paper, id))
    }

    pub fn mark_mut(&mut self, id: &MarkId) -> Result<&mut ExamMark, ExamError> {
        self.marks
            .get_mut(id)
            .ok_or_else(|| ExamError::not_found(EntityKind::Mark, id))
    }

    pub fn datesheet_mut(&mut self) -> Result<&mut Datesheet, ExamError> {
        let exam_id = self.exam.id.clone();
        self.datesheet
            .as_mut()
            .ok_or_else(|| ExamError::not_found(EntityKind::Datesheet, exam_id))
    }
}

/// Transactional access to exam state.
///
/// `transact` runs `unit` against the exam's state while holding it exclusively; the changes
/// become visible only if the unit returns `Ok`. Scopes whose school does not own the exam
/// resolve to `NotFound`.
pub trait ExamStore: Send + Sync {
    fn create(&self, exam: Exam) -> Result<ExamRecord, ExamError>;

    fn snapshot(&self, scope: &ExamScope) -> Result<ExamRecord, ExamError>;

    fn transact<T, F>(&self, scope: &ExamScope, unit: F) -> Result<T, ExamError>
    where
        F: FnOnce(&mut ExamRecord) -> Result<T, ExamError>;
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("exam {0} already exists")]
    Conflict(ExamScope),
    #[error("exam store unavailable: {0}")]
    Unavailable(String),
}

/// Process-local store; each exam is guarded by its own mutex.
#[derive(Debug, Default, Clone)]
pub struct InMemoryExamStore {
    records: Arc<RwLock<HashMap<ExamScope, Arc<Mutex<ExamRecord>>>>>,
}

impl InMemoryExamStore {
    fn slot(&self, scope: &ExamScope) -> Result<Arc<Mutex<ExamRecord>>, ExamError> {
        let guard = self
            .records
            .read()
            .map_err(|_| StoreError::Unavailable("exam index lock poisoned".to_string()))?;
        guard
            .get(scope)
            .cloned()
            .ok_or_else(|| ExamError::not_found(EntityKind::Exam, &scope.exam_id))
    }
}

impl ExamStore for InMemoryExamStore {
    fn create(&self, exam: Exam) -> Result<ExamRecord, ExamError> {
        let scope = exam.scope();
        let mut guard = self
            .records
            .write()
            .map_err(|_| StoreError::Unavailable("exam index lock poisoned".to_string()))?;
        if guard.contains_key(&scope) {
            return Err(StoreError::Conflict(scope).into());
        }
        let record = ExamRecord::new(exam);
        guard.insert(scope, Arc::new(Mutex::new(record.clone())));
        Ok(record)
    }

    fn snapshot(&self, scope: &ExamScope) -> Result<ExamRecord, ExamError> {
        let slot = self.slot(scope)?;
        let record = slot
            .lock()
            .map_err(|_| StoreError::Unavailable(format!("exam {scope} lock poisoned")))?;
        Ok(record.clone())
    }

    fn transact<T, F>(&self, scope: &ExamScope, unit: F) -> Result<T, ExamError>
    where
        F: FnOnce(&mut ExamRecord) -> Result<T, ExamError>,
    {
        let slot = self.slot(scope)?;
        let mut record = slot
            .lock()
            .map_err(|_| StoreError::Unavailable(format!("exam {scope} lock poisoned")))?;

        let mut working = record.clone();
        let value = unit(&mut working)?;
        *record = working;
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflows::exam::domain::{ClassId, SubjectId};

    fn exam(scope: &ExamScope) -> Exam {
        Exam::new(scope, "Mid Term", "2024-25", vec![ClassId::from("7")])
    }

    #[test]
    fn failed_units_leave_state_untouched() {
        let store = InMemoryExamStore::default();
        let scope = ExamScope::new("school-1", "exam-1");
        store.create(exam(&scope)).expect("exam created");

        let outcome: Result<(), ExamError> = store.transact(&scope, |record| {
            record.papers.insert(
                PaperId::from("p-1"),
                ExamPaper::new(PaperId::from("p-1"), ClassId::from("7"), SubjectId::from("math")),
            );
            Err(ExamError::validation("abort"))
        });

        assert!(matches!(outcome, Err(ExamError::Validation(_))));
        let record = store.snapshot(&scope).expect("snapshot");
        assert!(record.papers.is_empty());
    }

    #[test]
    fn other_tenants_cannot_see_the_exam() {
        let store = InMemoryExamStore::default();
        let scope = ExamScope::new("school-1", "exam-1");
        store.create(exam(&scope)).expect("exam created");

        let foreign = ExamScope::new("school-2", "exam-1");
        match store.snapshot(&foreign) {
            Err(ExamError::NotFound { entity, .. }) => assert_eq!(entity, EntityKind::Exam),
            other => panic!("expected not found, got {other:?}"),
        }
    }

    #[test]
    fn duplicate_exams_are_rejected() {
        let store = InMemoryExamStore::default();
        let scope = ExamScope::new("school-1", "exam-1");
        store.create(exam(&scope)).expect("exam created");

        assert!(matches!(
            store.create(exam(&scope)),
            Err(ExamError::Storage(StoreError::Conflict(_)))
        ));
    }
}
