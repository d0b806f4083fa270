use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::directory::{StudentDirectory, StudentRef};
use super::domain::{ClassId, ExamPaper, ExamScope, StudentId, SubjectId};
use super::error::ExamError;
use super::status::{DatesheetStatus, ExamStatus, MarkStatus, PaperStatus, StatusPolicy};
use super::store::{ExamRecord, ExamStore};

/// Gating conditions for result publishing, in checklist order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChecklistKey {
    DatesheetPublished,
    AllPapersApproved,
    AllMarksVerified,
    NoMissingStudents,
    NoInvalidMarks,
}

impl ChecklistKey {
    pub const fn ordered() -> [Self; 5] {
        [
            Self::DatesheetPublished,
            Self::AllPapersApproved,
            Self::AllMarksVerified,
            Self::NoMissingStudents,
            Self::NoInvalidMarks,
        ]
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::DatesheetPublished => "datesheet_published",
            Self::AllPapersApproved => "all_papers_approved",
            Self::AllMarksVerified => "all_marks_verified",
            Self::NoMissingStudents => "no_missing_students",
            Self::NoInvalidMarks => "no_invalid_marks",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChecklistItem {
    pub key: ChecklistKey,
    #[serde(rename = "status")]
    pub passed: bool,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checklist {
    pub items: Vec<ChecklistItem>,
    pub ready_to_publish: bool,
}

impl Checklist {
    fn from_items(items: Vec<ChecklistItem>) -> Self {
        let ready_to_publish = items.iter().all(|item| item.passed);
        Self {
            items,
            ready_to_publish,
        }
    }

    pub fn item(&self, key: ChecklistKey) -> Option<&ChecklistItem> {
        self.items.iter().find(|item| item.key == key)
    }

    pub fn failing(&self) -> impl Iterator<Item = &ChecklistItem> {
        self.items.iter().filter(|item| !item.passed)
    }

    /// Failing messages joined for logs and error text.
    pub fn summary(&self) -> String {
        let failing: Vec<&str> = self.failing().map(|item| item.message.as_str()).collect();
        if failing.is_empty() {
            "all checks passed".to_string()
        } else {
            failing.join("; ")
        }
    }
}

/// Build the publish checklist from one consistent snapshot of the exam.
///
/// `students` is the scoped roster: active students of the exam's classes for its session.
pub fn evaluate(record: &ExamRecord, students: &[StudentRef]) -> Checklist {
    Checklist::from_items(vec![
        datesheet_item(record),
        papers_item(record),
        marks_item(record),
        missing_students_item(record, students),
        invalid_marks_item(record),
    ])
}

fn item(key: ChecklistKey, passed: bool, message: impl Into<String>) -> ChecklistItem {
    ChecklistItem {
        key,
        passed,
        message: message.into(),
    }
}

fn plural(count: usize, one: &str, many: &str) -> String {
    if count == 1 {
        format!("1 {one}")
    } else {
        format!("{count} {many}")
    }
}

fn datesheet_item(record: &ExamRecord) -> ChecklistItem {
    let key = ChecklistKey::DatesheetPublished;
    match &record.datesheet {
        None => item(key, true, "no datesheet scheduled for this exam"),
        Some(datesheet) if datesheet.status == DatesheetStatus::Published => {
            item(key, true, "datesheet is published")
        }
        Some(datesheet) => item(
            key,
            false,
            format!("datesheet is still '{}'", datesheet.status.label()),
        ),
    }
}

fn papers_item(record: &ExamRecord) -> ChecklistItem {
    let pending = record
        .papers
        .values()
        .filter(|paper| !paper.status.is_approved())
        .count();
    if pending == 0 {
        item(
            ChecklistKey::AllPapersApproved,
            true,
            "all papers are approved",
        )
    } else {
        item(
            ChecklistKey::AllPapersApproved,
            false,
            format!("{} awaiting approval", plural(pending, "paper", "papers")),
        )
    }
}

fn marks_item(record: &ExamRecord) -> ChecklistItem {
    let pending = record
        .marks
        .values()
        .filter(|mark| !mark.status.is_verified())
        .count();
    if pending == 0 {
        item(ChecklistKey::AllMarksVerified, true, "all marks are verified")
    } else {
        item(
            ChecklistKey::AllMarksVerified,
            false,
            format!("{} awaiting verification", plural(pending, "mark", "marks")),
        )
    }
}

fn missing_students_item(record: &ExamRecord, students: &[StudentRef]) -> ChecklistItem {
    let missing = missing_students(record, students).len();
    if missing == 0 {
        item(
            ChecklistKey::NoMissingStudents,
            true,
            "every enrolled student has marks recorded",
        )
    } else {
        item(
            ChecklistKey::NoMissingStudents,
            false,
            format!(
                "{} without any recorded marks",
                plural(missing, "student", "students")
            ),
        )
    }
}

fn invalid_marks_item(record: &ExamRecord) -> ChecklistItem {
    let message = match invalid_marks(record) {
        0 => {
            return item(
                ChecklistKey::NoInvalidMarks,
                true,
                "no marks exceed their paper total",
            )
        }
        1 => "1 mark exceeds its paper total".to_string(),
        count => format!("{count} marks exceed their paper total"),
    };
    item(ChecklistKey::NoInvalidMarks, false, message)
}

/// Scoped students without a single mark row.
pub(crate) fn missing_students<'a>(
    record: &ExamRecord,
    students: &'a [StudentRef],
) -> Vec<&'a StudentRef> {
    let recorded: BTreeSet<&StudentId> =
        record.marks.values().map(|mark| &mark.student_id).collect();
    students
        .iter()
        .filter(|student| {
            record.exam.covers_class(&student.class_id) && !recorded.contains(&student.id)
        })
        .collect()
}

pub(crate) fn papers_by_subject(
    record: &ExamRecord,
) -> HashMap<(&ClassId, &SubjectId), &ExamPaper> {
    record
        .papers
        .values()
        .map(|paper| ((&paper.class_id, &paper.subject_id), paper))
        .collect()
}

fn invalid_marks(record: &ExamRecord) -> usize {
    let papers = papers_by_subject(record);
    record
        .marks
        .values()
        .filter(|mark| mark.status != MarkStatus::Draft)
        .filter(|mark| {
            papers
                .get(&(&mark.class_id, &mark.subject_id))
                .is_some_and(|paper| mark.marks_obtained > paper.total_marks)
        })
        .count()
}

/// Per-exam counters for the exam office overview.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExamDashboard {
    pub exam_status: ExamStatus,
    pub datesheet_status: Option<DatesheetStatus>,
    pub conflict_count: usize,
    pub papers_by_status: BTreeMap<PaperStatus, usize>,
    pub marks_by_status: BTreeMap<MarkStatus, usize>,
    pub marks_pending_entry: usize,
    pub marks_pending_verification: usize,
    pub missing_students: usize,
    pub provisional_results: usize,
    pub published_results: usize,
    pub ready_to_publish: bool,
}

/// Reads exam state and the roster to answer "can results go out?".
pub struct PublishReadinessEvaluator<S, D> {
    store: Arc<S>,
    directory: Arc<D>,
}

impl<S, D> PublishReadinessEvaluator<S, D>
where
    S: ExamStore + 'static,
    D: StudentDirectory + 'static,
{
    pub fn new(store: Arc<S>, directory: Arc<D>) -> Self {
        Self { store, directory }
    }

    pub fn evaluate(&self, scope: &ExamScope) -> Result<Checklist, ExamError> {
        let record = self.store.snapshot(scope)?;
        let students = roster(self.directory.as_ref(), &record)?;
        Ok(evaluate(&record, &students))
    }

    pub fn dashboard(&self, scope: &ExamScope) -> Result<ExamDashboard, ExamError> {
        let record = self.store.snapshot(scope)?;
        let students = roster(self.directory.as_ref(), &record)?;

        let mut papers_by_status = BTreeMap::new();
        for status in PaperStatus::ordered() {
            papers_by_status.insert(status, 0);
        }
        for paper in record.papers.values() {
            *papers_by_status.entry(paper.status).or_insert(0) += 1;
        }

        let mut marks_by_status = BTreeMap::new();
        for status in MarkStatus::ordered() {
            marks_by_status.insert(status, 0);
        }
        for mark in record.marks.values() {
            *marks_by_status.entry(mark.status).or_insert(0) += 1;
        }

        let provisional_results = record.provisional_results();
        Ok(ExamDashboard {
            exam_status: record.exam.status,
            datesheet_status: record.datesheet.as_ref().map(|datesheet| datesheet.status),
            conflict_count: record
                .datesheet
                .as_ref()
                .map_or(0, |datesheet| datesheet.conflict_count),
            marks_pending_entry: marks_by_status[&MarkStatus::Draft],
            marks_pending_verification: marks_by_status[&MarkStatus::Submitted],
            papers_by_status,
            marks_by_status,
            missing_students: missing_students(&record, &students).len(),
            provisional_results,
            published_results: record.results.len() - provisional_results,
            ready_to_publish: evaluate(&record, &students).ready_to_publish,
        })
    }
}

/// Active students the exam is scoped to.
pub(crate) fn roster<D>(directory: &D, record: &ExamRecord) -> Result<Vec<StudentRef>, ExamError>
where
    D: StudentDirectory + ?Sized,
{
    Ok(directory.active_students(
        &record.exam.school_id,
        &record.exam.class_ids,
        &record.exam.session,
    )?)
}
