use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

use super::status::{DatesheetStatus, ExamStatus, MarkStatus, PaperStatus};

macro_rules! identifier {
    ($($(#[$meta:meta])* $name:ident),+ $(,)?) => {
        $(
            $(#[$meta])*
            #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
            #[serde(transparent)]
            pub struct $name(pub String);

            impl $name {
                pub fn new(value: impl Into<String>) -> Self {
                    Self(value.into())
                }

                pub fn as_str(&self) -> &str {
                    &self.0
                }
            }

            impl fmt::Display for $name {
                fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                    f.write_str(&self.0)
                }
            }

            impl From<&str> for $name {
                fn from(value: &str) -> Self {
                    Self(value.to_string())
                }
            }
        )+
    };
}

identifier!(
    /// Tenant identifier; every query is scoped by it.
    SchoolId,
    ExamId,
    ClassId,
    SectionId,
    SubjectId,
    StudentId,
    /// Teachers, reviewers, supervisors and invigilators.
    StaffId,
    RoomId,
    EntryId,
    PaperId,
    QuestionId,
    MarkId,
    JobId,
);

/// Tenant + exam pair threaded explicitly through every operation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ExamScope {
    pub school_id: SchoolId,
    pub exam_id: ExamId,
}

impl ExamScope {
    pub fn new(school_id: impl Into<String>, exam_id: impl Into<String>) -> Self {
        Self {
            school_id: SchoolId(school_id.into()),
            exam_id: ExamId(exam_id.into()),
        }
    }
}

impl fmt::Display for ExamScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.school_id, self.exam_id)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Exam {
    pub id: ExamId,
    pub school_id: SchoolId,
    pub name: String,
    pub session: String,
    pub class_ids: Vec<ClassId>,
    pub status: ExamStatus,
    pub locked_at: Option<DateTime<Utc>>,
    pub results_published_at: Option<DateTime<Utc>>,
}

impl Exam {
    pub fn new(
        scope: &ExamScope,
        name: impl Into<String>,
        session: impl Into<String>,
        class_ids: Vec<ClassId>,
    ) -> Self {
        Self {
            id: scope.exam_id.clone(),
            school_id: scope.school_id.clone(),
            name: name.into(),
            session: session.into(),
            class_ids,
            status: ExamStatus::Open,
            locked_at: None,
            results_published_at: None,
        }
    }

    pub fn scope(&self) -> ExamScope {
        ExamScope {
            school_id: self.school_id.clone(),
            exam_id: self.id.clone(),
        }
    }

    pub fn covers_class(&self, class_id: &ClassId) -> bool {
        self.class_ids.contains(class_id)
    }
}

/// Caller-supplied fields of a datesheet entry, used for both create and update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntryDraft {
    pub class_id: ClassId,
    #[serde(default)]
    pub section_id: Option<SectionId>,
    pub subject_id: SubjectId,
    pub exam_date: NaiveDate,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    #[serde(default)]
    pub room_id: Option<RoomId>,
    #[serde(default)]
    pub supervisor_id: Option<StaffId>,
    #[serde(default)]
    pub invigilator_id: Option<StaffId>,
    pub total_marks: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictKind {
    Room,
    Supervisor,
    Invigilator,
    ClassSection,
}

impl ConflictKind {
    pub const fn ordered() -> [Self; 4] {
        [
            Self::Room,
            Self::Supervisor,
            Self::Invigilator,
            Self::ClassSection,
        ]
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::Room => "room",
            Self::Supervisor => "supervisor",
            Self::Invigilator => "invigilator",
            Self::ClassSection => "class_section",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConflictDetail {
    pub entry_id: EntryId,
    pub kinds: Vec<ConflictKind>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatesheetEntry {
    pub id: EntryId,
    pub class_id: ClassId,
    pub section_id: Option<SectionId>,
    pub subject_id: SubjectId,
    pub exam_date: NaiveDate,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub room_id: Option<RoomId>,
    pub supervisor_id: Option<StaffId>,
    pub invigilator_id: Option<StaffId>,
    pub total_marks: f64,
    pub has_conflict: bool,
    pub conflict_details: Vec<ConflictDetail>,
}

impl DatesheetEntry {
    pub fn from_draft(id: EntryId, draft: EntryDraft) -> Self {
        Self {
            id,
            class_id: draft.class_id,
            section_id: draft.section_id,
            subject_id: draft.subject_id,
            exam_date: draft.exam_date,
            start_time: draft.start_time,
            end_time: draft.end_time,
            room_id: draft.room_id,
            supervisor_id: draft.supervisor_id,
            invigilator_id: draft.invigilator_id,
            total_marks: draft.total_marks,
            has_conflict: false,
            conflict_details: Vec::new(),
        }
    }

    /// Overwrite the scheduled fields; conflict fields are left for the detector.
    pub fn apply(&mut self, draft: EntryDraft) {
        self.class_id = draft.class_id;
        self.section_id = draft.section_id;
        self.subject_id = draft.subject_id;
        self.exam_date = draft.exam_date;
        self.start_time = draft.start_time;
        self.end_time = draft.end_time;
        self.room_id = draft.room_id;
        self.supervisor_id = draft.supervisor_id;
        self.invigilator_id = draft.invigilator_id;
        self.total_marks = draft.total_marks;
    }

    /// Half-open `[start, end)` overlap.
    pub fn overlaps(&self, other: &DatesheetEntry) -> bool {
        self.start_time < other.end_time && other.start_time < self.end_time
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Datesheet {
    pub status: DatesheetStatus,
    pub entries: BTreeMap<EntryId, DatesheetEntry>,
    pub conflict_count: usize,
    pub published_at: Option<DateTime<Utc>>,
}

impl Default for Datesheet {
    fn default() -> Self {
        Self {
            status: DatesheetStatus::Draft,
            entries: BTreeMap::new(),
            conflict_count: 0,
            published_at: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestionDraft {
    pub prompt: String,
    pub marks: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExamQuestion {
    pub id: QuestionId,
    pub prompt: String,
    pub marks: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExamPaper {
    pub id: PaperId,
    pub class_id: ClassId,
    pub subject_id: SubjectId,
    pub status: PaperStatus,
    pub total_marks: f64,
    pub questions: Vec<ExamQuestion>,
    pub reviewed_by: Option<StaffId>,
    pub review_comment: Option<String>,
}

impl ExamPaper {
    pub fn new(id: PaperId, class_id: ClassId, subject_id: SubjectId) -> Self {
        Self {
            id,
            class_id,
            subject_id,
            status: PaperStatus::Draft,
            total_marks: 0.0,
            questions: Vec::new(),
            reviewed_by: None,
            review_comment: None,
        }
    }

    pub(crate) fn recompute_total(&mut self) {
        self.total_marks = self
            .questions
            .iter()
            .fold(0.0, |total, question| total + question.marks);
    }
}

/// Caller-supplied mark for one student in one subject.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarkInput {
    pub class_id: ClassId,
    #[serde(default)]
    pub section_id: Option<SectionId>,
    pub subject_id: SubjectId,
    pub student_id: StudentId,
    #[serde(default)]
    pub marks_obtained: f64,
    #[serde(default)]
    pub is_absent: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExamMark {
    pub id: MarkId,
    pub class_id: ClassId,
    pub section_id: Option<SectionId>,
    pub subject_id: SubjectId,
    pub student_id: StudentId,
    pub status: MarkStatus,
    pub marks_obtained: f64,
    pub is_absent: bool,
    pub verified_by: Option<StaffId>,
}

impl ExamMark {
    pub fn new(id: MarkId, input: MarkInput) -> Self {
        let mut mark = Self {
            id,
            class_id: input.class_id.clone(),
            section_id: None,
            subject_id: input.subject_id.clone(),
            student_id: input.student_id.clone(),
            status: MarkStatus::Draft,
            marks_obtained: 0.0,
            is_absent: false,
            verified_by: None,
        };
        mark.rewrite(&input);
        mark
    }

    pub(crate) fn rewrite(&mut self, input: &MarkInput) {
        self.section_id = input.section_id.clone();
        self.is_absent = input.is_absent;
        self.marks_obtained = if input.is_absent {
            0.0
        } else {
            input.marks_obtained
        };
    }

    /// Whether this row holds the mark for `input`'s student and subject.
    pub fn matches(&self, input: &MarkInput) -> bool {
        self.class_id == input.class_id
            && self.subject_id == input.subject_id
            && self.student_id == input.student_id
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultStatus {
    Provisional,
    Published,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExamResult {
    pub student_id: StudentId,
    pub class_id: ClassId,
    pub total_obtained: f64,
    pub total_marks: f64,
    pub percentage: f64,
    pub grade: String,
    pub rank_in_class: u32,
    pub result_snapshot_json: serde_json::Value,
    pub status: ResultStatus,
    pub generated_by_job: Option<JobId>,
    pub published_at: Option<DateTime<Utc>>,
}

impl ExamResult {
    pub fn is_provisional(&self) -> bool {
        self.status == ResultStatus::Provisional
    }

    /// Same student, totals, grade, rank and snapshot; job and publish stamps are ignored.
    pub fn same_figures(&self, other: &ExamResult) -> bool {
        self.student_id == other.student_id
            && self.class_id == other.class_id
            && self.total_obtained == other.total_obtained
            && self.total_marks == other.total_marks
            && self.percentage == other.percentage
            && self.grade == other.grade
            && self.rank_in_class == other.rank_in_class
            && self.result_snapshot_json == other.result_snapshot_json
    }
}
