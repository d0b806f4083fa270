use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::domain::{
    ClassId, ExamMark, ExamScope, MarkId, MarkInput, SectionId, StaffId, SubjectId,
};
use super::error::ExamError;
use super::status::{MarkAction, MarkStatus, StatusPolicy};
use super::store::{ExamRecord, ExamStore};

static MARK_SEQUENCE: AtomicU64 = AtomicU64::new(1);

fn next_mark_id() -> MarkId {
    let id = MARK_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    MarkId(format!("mark-{id:06}"))
}

/// Slice of an exam's marks targeted by a batch transition.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarkSelection {
    pub classes: Vec<ClassId>,
    pub subjects: Vec<SubjectId>,
    /// Empty means every section.
    #[serde(default)]
    pub sections: Vec<SectionId>,
}

impl MarkSelection {
    fn validate(&self) -> Result<(), ExamError> {
        if self.classes.is_empty() {
            return Err(ExamError::validation("select at least one class"));
        }
        if self.subjects.is_empty() {
            return Err(ExamError::validation("select at least one subject"));
        }
        Ok(())
    }

    pub fn matches(&self, mark: &ExamMark) -> bool {
        self.classes.contains(&mark.class_id)
            && self.subjects.contains(&mark.subject_id)
            && (self.sections.is_empty()
                || mark
                    .section_id
                    .as_ref()
                    .map(|section| self.sections.contains(section))
                    .unwrap_or(false))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedMark {
    pub mark_id: MarkId,
    pub status: MarkStatus,
}

/// Per-row outcome of a batch transition. Skipped rows need attention; they are not errors.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchOutcome {
    pub transitioned: Vec<MarkId>,
    pub skipped: Vec<SkippedMark>,
}

impl BatchOutcome {
    pub fn count(&self) -> usize {
        self.transitioned.len()
    }
}

enum RowOutcome {
    Moved,
    Skipped(MarkStatus),
}

/// Drives marks through entry, verification, and locking.
///
/// Batch variants read the matching rows once and then apply one guarded unit per row.
/// Overlapping batches are not serialized against each other: a row moves at most once per
/// action, and a row already moved by a concurrent batch shows up as skipped.
pub struct MarkWorkflow<S> {
    store: Arc<S>,
}

impl<S> MarkWorkflow<S>
where
    S: ExamStore + 'static,
{
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Create the student's mark or rewrite it while still in draft.
    pub fn record(&self, scope: &ExamScope, input: MarkInput) -> Result<ExamMark, ExamError> {
        if input.student_id.as_str().trim().is_empty() {
            return Err(ExamError::validation("student_id is required"));
        }
        if !input.is_absent && !(input.marks_obtained.is_finite() && input.marks_obtained >= 0.0)
        {
            return Err(ExamError::validation(
                "marks_obtained must be a non-negative number",
            ));
        }

        self.store.transact(scope, |record| {
            record.ensure_open()?;
            if !record.exam.covers_class(&input.class_id) {
                return Err(ExamError::validation(format!(
                    "class {} is not part of exam {}",
                    input.class_id, record.exam.id
                )));
            }

            if let Some(mark) = record.marks.values_mut().find(|mark| mark.matches(&input)) {
                mark.status.transition(MarkAction::Edit)?;
                mark.rewrite(&input);
                debug!(exam = %scope, mark = %mark.id, "mark rewritten");
                return Ok(mark.clone());
            }

            let mark = ExamMark::new(next_mark_id(), input);
            record.marks.insert(mark.id.clone(), mark.clone());
            debug!(exam = %scope, mark = %mark.id, "mark recorded");
            Ok(mark)
        })
    }

    pub fn submit(&self, scope: &ExamScope, mark_id: &MarkId) -> Result<ExamMark, ExamError> {
        self.store.transact(scope, |record| {
            let mark = record.mark_mut(mark_id)?;
            mark.status = mark.status.transition(MarkAction::Submit)?;
            Ok(mark.clone())
        })
    }

    pub fn verify(
        &self,
        scope: &ExamScope,
        mark_id: &MarkId,
        verifier: StaffId,
    ) -> Result<ExamMark, ExamError> {
        self.store.transact(scope, |record| {
            let mark = record.mark_mut(mark_id)?;
            mark.status = mark.status.transition(MarkAction::Verify)?;
            mark.verified_by = Some(verifier);
            Ok(mark.clone())
        })
    }

    pub fn lock(&self, scope: &ExamScope, mark_id: &MarkId) -> Result<ExamMark, ExamError> {
        self.store.transact(scope, |record| {
            let mark = record.mark_mut(mark_id)?;
            mark.status = mark.status.transition(MarkAction::Lock)?;
            Ok(mark.clone())
        })
    }

    pub fn submit_marks(
        &self,
        scope: &ExamScope,
        selection: &MarkSelection,
    ) -> Result<BatchOutcome, ExamError> {
        self.apply_batch(scope, selection, MarkAction::Submit, None)
    }

    pub fn verify_marks(
        &self,
        scope: &ExamScope,
        selection: &MarkSelection,
        verifier: StaffId,
    ) -> Result<BatchOutcome, ExamError> {
        self.apply_batch(scope, selection, MarkAction::Verify, Some(verifier))
    }

    pub fn lock_marks(
        &self,
        scope: &ExamScope,
        selection: &MarkSelection,
    ) -> Result<BatchOutcome, ExamError> {
        self.apply_batch(scope, selection, MarkAction::Lock, None)
    }

    pub fn list(
        &self,
        scope: &ExamScope,
        selection: &MarkSelection,
    ) -> Result<Vec<ExamMark>, ExamError> {
        let record = self.store.snapshot(scope)?;
        Ok(record
            .marks
            .into_values()
            .filter(|mark| selection.matches(mark))
            .collect())
    }

    fn apply_batch(
        &self,
        scope: &ExamScope,
        selection: &MarkSelection,
        action: MarkAction,
        verifier: Option<StaffId>,
    ) -> Result<BatchOutcome, ExamError> {
        selection.validate()?;
        let candidates = select(&self.store.snapshot(scope)?, selection);

        let mut outcome = BatchOutcome::default();
        for mark_id in candidates {
            let row = self.store.transact(scope, |record| {
                let mark = record.mark_mut(&mark_id)?;
                match mark.status.next(action) {
                    Some(next) => {
                        mark.status = next;
                        if action == MarkAction::Verify {
                            mark.verified_by = verifier.clone();
                        }
                        Ok(RowOutcome::Moved)
                    }
                    None => Ok(RowOutcome::Skipped(mark.status)),
                }
            })?;

            match row {
                RowOutcome::Moved => outcome.transitioned.push(mark_id),
                RowOutcome::Skipped(status) => {
                    debug!(
                        exam = %scope,
                        mark = %mark_id,
                        status = status.label(),
                        "mark skipped by batch"
                    );
                    outcome.skipped.push(SkippedMark { mark_id, status });
                }
            }
        }

        info!(
            exam = %scope,
            action = MarkStatus::action_label(action),
            transitioned = outcome.count(),
            skipped = outcome.skipped.len(),
            "batch mark transition applied"
        );
        Ok(outcome)
    }
}

fn select(record: &ExamRecord, selection: &MarkSelection) -> Vec<MarkId> {
    record
        .marks
        .values()
        .filter(|mark| selection.matches(mark))
        .map(|mark| mark.id.clone())
        .collect()
}
