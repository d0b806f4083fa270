//! Exam lifecycle: datesheet conflict detection, paper and mark approval workflows, and
//! result publishing gated by a readiness checklist.
//!
//! Every operation takes an explicit [`ExamScope`]; state is reached only through an
//! [`ExamStore`] unit of work, so a failed guard never leaves a partial write behind.

pub mod conflicts;
pub mod datesheet;
pub mod directory;
pub mod domain;
pub mod error;
pub mod jobs;
pub mod marks;
pub mod papers;
pub mod publish;
pub mod readiness;
pub mod results;
pub mod router;
pub mod service;
pub mod status;
pub mod store;

#[cfg(test)]
mod tests;

pub use conflicts::{ConflictAnalysis, ConflictReport, ConflictReportItem};
pub use datesheet::DatesheetWorkflow;
pub use directory::{DirectoryError, InMemoryStudentDirectory, StudentDirectory, StudentRef};
pub use domain::{
    ClassId, ConflictDetail, ConflictKind, Datesheet, DatesheetEntry, EntryDraft, EntryId, Exam,
    ExamId, ExamMark, ExamPaper, ExamQuestion, ExamResult, ExamScope, JobId, MarkId, MarkInput,
    PaperId, QuestionDraft, QuestionId, ResultStatus, RoomId, SchoolId, SectionId, StaffId,
    StudentId, SubjectId,
};
pub use error::ExamError;
pub use jobs::{
    DispatchError, InMemoryJobQueue, JobDispatcher, JobKind, JobReport, JobSpec, JobStatus,
    JobTicket, QueuedJob,
};
pub use marks::{BatchOutcome, MarkSelection, MarkWorkflow, SkippedMark};
pub use papers::PaperWorkflow;
pub use publish::{GenerateOutcome, LockSummary, PublishOutcome, ResultPublishOrchestrator};
pub use readiness::{
    Checklist, ChecklistItem, ChecklistKey, ExamDashboard, PublishReadinessEvaluator,
};
pub use results::{GradeBand, GradingScale, GradingScaleError};
pub use router::{error_response, exam_router};
pub use service::{ExamLifecycleService, NewExam};
pub use status::{
    DatesheetAction, DatesheetStatus, EntityKind, ExamAction, ExamStatus, MarkAction, MarkStatus,
    PaperAction, PaperStatus, StatusPolicy, TransitionRejected,
};
pub use store::{ExamRecord, ExamStore, InMemoryExamStore, StoreError};
