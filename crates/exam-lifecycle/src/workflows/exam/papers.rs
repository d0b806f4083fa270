use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tracing::info;

use super::domain::{
    ClassId, ExamPaper, ExamQuestion, ExamScope, PaperId, QuestionDraft, QuestionId, StaffId,
    SubjectId,
};
use super::error::ExamError;
use super::status::{EntityKind, PaperAction, StatusPolicy};
use super::store::ExamStore;

static PAPER_SEQUENCE: AtomicU64 = AtomicU64::new(1);
static QUESTION_SEQUENCE: AtomicU64 = AtomicU64::new(1);

fn next_paper_id() -> PaperId {
    let id = PAPER_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    PaperId(format!("paper-{id:06}"))
}

fn next_question_id() -> QuestionId {
    let id = QUESTION_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    QuestionId(format!("question-{id:06}"))
}

/// Drives a paper through authoring, review, and locking.
pub struct PaperWorkflow<S> {
    store: Arc<S>,
}

impl<S> PaperWorkflow<S>
where
    S: ExamStore + 'static,
{
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// One paper per (exam, class, subject).
    pub fn create(
        &self,
        scope: &ExamScope,
        class_id: ClassId,
        subject_id: SubjectId,
    ) -> Result<ExamPaper, ExamError> {
        self.store.transact(scope, |record| {
            record.ensure_open()?;
            if !record.exam.covers_class(&class_id) {
                return Err(ExamError::validation(format!(
                    "class {class_id} is not part of exam {}",
                    record.exam.id
                )));
            }
            if record
                .papers
                .values()
                .any(|paper| paper.class_id == class_id && paper.subject_id == subject_id)
            {
                return Err(ExamError::validation(format!(
                    "a paper for class {class_id} and subject {subject_id} already exists"
                )));
            }

            let paper = ExamPaper::new(next_paper_id(), class_id, subject_id);
            record.papers.insert(paper.id.clone(), paper.clone());
            info!(exam = %scope, paper = %paper.id, "paper created");
            Ok(paper)
        })
    }

    pub fn get(&self, scope: &ExamScope, paper_id: &PaperId) -> Result<ExamPaper, ExamError> {
        self.store.snapshot(scope)?.paper(paper_id).cloned()
    }

    pub fn add_question(
        &self,
        scope: &ExamScope,
        paper_id: &PaperId,
        draft: QuestionDraft,
    ) -> Result<ExamPaper, ExamError> {
        validate_question(&draft)?;
        self.edit(scope, paper_id, |paper| {
            paper.questions.push(ExamQuestion {
                id: next_question_id(),
                prompt: draft.prompt,
                marks: draft.marks,
            });
            Ok(())
        })
    }

    pub fn update_question(
        &self,
        scope: &ExamScope,
        paper_id: &PaperId,
        question_id: &QuestionId,
        draft: QuestionDraft,
    ) -> Result<ExamPaper, ExamError> {
        validate_question(&draft)?;
        self.edit(scope, paper_id, |paper| {
            let question = paper
                .questions
                .iter_mut()
                .find(|question| &question.id == question_id)
                .ok_or_else(|| ExamError::not_found(EntityKind::Question, question_id))?;
            question.prompt = draft.prompt;
            question.marks = draft.marks;
            Ok(())
        })
    }

    pub fn delete_question(
        &self,
        scope: &ExamScope,
        paper_id: &PaperId,
        question_id: &QuestionId,
    ) -> Result<ExamPaper, ExamError> {
        self.edit(scope, paper_id, |paper| {
            let before = paper.questions.len();
            paper.questions.retain(|question| &question.id != question_id);
            if paper.questions.len() == before {
                return Err(ExamError::not_found(EntityKind::Question, question_id));
            }
            Ok(())
        })
    }

    pub fn submit(&self, scope: &ExamScope, paper_id: &PaperId) -> Result<ExamPaper, ExamError> {
        self.store.transact(scope, |record| {
            let paper = record.paper_mut(paper_id)?;
            let next = paper.status.transition(PaperAction::Submit)?;
            if paper.questions.is_empty() {
                return Err(ExamError::validation(format!(
                    "paper {paper_id} has no questions"
                )));
            }
            paper.status = next;
            info!(
                exam = %scope,
                paper = %paper_id,
                total_marks = paper.total_marks,
                "paper submitted"
            );
            Ok(paper.clone())
        })
    }

    pub fn approve(
        &self,
        scope: &ExamScope,
        paper_id: &PaperId,
        reviewer: StaffId,
        comment: Option<String>,
    ) -> Result<ExamPaper, ExamError> {
        let comment = comment
            .map(|text| text.trim().to_string())
            .filter(|text| !text.is_empty());
        self.review(scope, paper_id, PaperAction::Approve, reviewer, comment)
    }

    /// Rejection always carries an explanation for the author.
    pub fn reject(
        &self,
        scope: &ExamScope,
        paper_id: &PaperId,
        reviewer: StaffId,
        comment: &str,
    ) -> Result<ExamPaper, ExamError> {
        let comment = comment.trim();
        if comment.is_empty() {
            return Err(ExamError::validation(
                "a comment is required when rejecting a paper",
            ));
        }
        self.review(
            scope,
            paper_id,
            PaperAction::Reject,
            reviewer,
            Some(comment.to_string()),
        )
    }

    pub fn lock(&self, scope: &ExamScope, paper_id: &PaperId) -> Result<ExamPaper, ExamError> {
        self.store.transact(scope, |record| {
            let paper = record.paper_mut(paper_id)?;
            paper.status = paper.status.transition(PaperAction::Lock)?;
            info!(exam = %scope, paper = %paper_id, "paper locked");
            Ok(paper.clone())
        })
    }

    fn review(
        &self,
        scope: &ExamScope,
        paper_id: &PaperId,
        action: PaperAction,
        reviewer: StaffId,
        comment: Option<String>,
    ) -> Result<ExamPaper, ExamError> {
        self.store.transact(scope, |record| {
            let paper = record.paper_mut(paper_id)?;
            paper.status = paper.status.transition(action)?;
            paper.reviewed_by = Some(reviewer);
            paper.review_comment = comment;
            info!(
                exam = %scope,
                paper = %paper_id,
                status = paper.status.label(),
                reviewer = ?paper.reviewed_by,
                "paper reviewed"
            );
            Ok(paper.clone())
        })
    }

    /// Question mutations: guard, apply, then recompute the paper total.
    fn edit<F>(
        &self,
        scope: &ExamScope,
        paper_id: &PaperId,
        mutate: F,
    ) -> Result<ExamPaper, ExamError>
    where
        F: FnOnce(&mut ExamPaper) -> Result<(), ExamError>,
    {
        self.store.transact(scope, |record| {
            let paper = record.paper_mut(paper_id)?;
            let next = paper.status.transition(PaperAction::Edit)?;
            mutate(paper)?;
            paper.status = next;
            paper.recompute_total();
            Ok(paper.clone())
        })
    }
}

fn validate_question(draft: &QuestionDraft) -> Result<(), ExamError> {
    if draft.prompt.trim().is_empty() {
        return Err(ExamError::validation("question prompt is required"));
    }
    if !(draft.marks.is_finite() && draft.marks > 0.0) {
        return Err(ExamError::validation("question marks must be positive"));
    }
    Ok(())
}
