use std::sync::Arc;

use axum::body::to_bytes;
use axum::response::Response;
use chrono::{DateTime, NaiveDate, NaiveTime, TimeZone, Utc};
use serde_json::Value;

use crate::workflows::exam::directory::{InMemoryStudentDirectory, StudentRef};
use crate::workflows::exam::domain::{
    ClassId, EntryDraft, ExamMark, ExamPaper, ExamScope, MarkInput, QuestionDraft, RoomId,
    SchoolId, SectionId, StaffId, StudentId, SubjectId,
};
use crate::workflows::exam::jobs::InMemoryJobQueue;
use crate::workflows::exam::marks::MarkSelection;
use crate::workflows::exam::results::GradingScale;
use crate::workflows::exam::service::{ExamLifecycleService, NewExam};
use crate::workflows::exam::store::InMemoryExamStore;

pub(super) type TestService =
    ExamLifecycleService<InMemoryExamStore, InMemoryStudentDirectory, InMemoryJobQueue>;

/// One school, one exam over class 7, two enrolled students.
pub(super) struct Harness {
    pub(super) directory: Arc<InMemoryStudentDirectory>,
    pub(super) queue: Arc<InMemoryJobQueue>,
    pub(super) service: Arc<TestService>,
    pub(super) scope: ExamScope,
}

impl Harness {
    pub(super) fn new() -> Self {
        let store = Arc::new(InMemoryExamStore::default());
        let directory = Arc::new(InMemoryStudentDirectory::default());
        let queue = Arc::new(InMemoryJobQueue::default());
        let service = Arc::new(ExamLifecycleService::new(
            store,
            directory.clone(),
            queue.clone(),
            GradingScale::default(),
        ));

        let exam = service
            .create_exam(
                SchoolId::from("school-1"),
                NewExam {
                    exam_id: Some("exam-1".to_string()),
                    name: "Mid Term".to_string(),
                    session: "2024-25".to_string(),
                    class_ids: vec![ClassId::from("7")],
                },
            )
            .expect("exam created");

        let harness = Self {
            directory,
            queue,
            service,
            scope: exam.scope(),
        };
        harness.enroll("s-1");
        harness.enroll("s-2");
        harness
    }

    pub(super) fn enroll(&self, student_id: &str) {
        self.directory
            .enroll(
                &self.scope.school_id,
                StudentRef {
                    id: StudentId::from(student_id),
                    class_id: ClassId::from("7"),
                    section_id: Some(SectionId::from("A")),
                    session: "2024-25".to_string(),
                    active: true,
                },
            )
            .expect("student enrolled");
    }

    /// Approved maths paper worth 50 marks.
    pub(super) fn approved_paper(&self) -> ExamPaper {
        let papers = self.service.papers();
        let paper = papers
            .create(&self.scope, ClassId::from("7"), SubjectId::from("math"))
            .expect("paper created");
        papers
            .add_question(&self.scope, &paper.id, question("Algebra", 30.0))
            .expect("question added");
        papers
            .add_question(&self.scope, &paper.id, question("Geometry", 20.0))
            .expect("question added");
        papers.submit(&self.scope, &paper.id).expect("paper submitted");
        papers
            .approve(&self.scope, &paper.id, StaffId::from("hod-1"), None)
            .expect("paper approved")
    }

    pub(super) fn record_mark(&self, student_id: &str, obtained: f64) -> ExamMark {
        self.service
            .marks()
            .record(&self.scope, mark_input(student_id, "math", obtained))
            .expect("mark recorded")
    }

    /// Everything green: approved paper, verified marks for every enrolled student.
    pub(super) fn ready_exam(&self) {
        self.approved_paper();
        self.record_mark("s-1", 42.0);
        self.record_mark("s-2", 35.5);
        let marks = self.service.marks();
        marks
            .submit_marks(&self.scope, &math_selection())
            .expect("marks submitted");
        marks
            .verify_marks(&self.scope, &math_selection(), StaffId::from("hod-1"))
            .expect("marks verified");
    }

    pub(super) fn drain(&self) -> usize {
        self.service
            .results()
            .drain_queue(now())
            .expect("queue drained")
    }
}

pub(super) fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0)
        .single()
        .expect("valid timestamp")
}

pub(super) fn date(day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 1, day).expect("valid date")
}

pub(super) fn time(hour: u32, minute: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(hour, minute, 0).expect("valid time")
}

pub(super) fn entry(
    subject: &str,
    room: &str,
    start: (u32, u32),
    end: (u32, u32),
) -> EntryDraft {
    EntryDraft {
        class_id: ClassId::from("7"),
        section_id: Some(SectionId::from("A")),
        subject_id: SubjectId::from(subject),
        exam_date: date(10),
        start_time: time(start.0, start.1),
        end_time: time(end.0, end.1),
        room_id: Some(RoomId::from(room)),
        supervisor_id: None,
        invigilator_id: None,
        total_marks: 50.0,
    }
}

pub(super) fn question(prompt: &str, marks: f64) -> QuestionDraft {
    QuestionDraft {
        prompt: prompt.to_string(),
        marks,
    }
}

pub(super) fn mark_input(student_id: &str, subject: &str, obtained: f64) -> MarkInput {
    MarkInput {
        class_id: ClassId::from("7"),
        section_id: Some(SectionId::from("A")),
        subject_id: SubjectId::from(subject),
        student_id: StudentId::from(student_id),
        marks_obtained: obtained,
        is_absent: false,
    }
}

pub(super) fn math_selection() -> MarkSelection {
    MarkSelection {
        classes: vec![ClassId::from("7")],
        subjects: vec![SubjectId::from("math")],
        sections: Vec::new(),
    }
}

pub(super) async fn json_body(response: Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body readable");
    serde_json::from_slice(&bytes).expect("json body")
}
