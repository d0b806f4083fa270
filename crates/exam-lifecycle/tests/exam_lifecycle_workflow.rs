//! Integration scenarios for an exam term, from datesheet planning to published results.
//!
//! Everything goes through the public service facade and the HTTP router, the same surface the
//! exam office and teacher portals use.

mod common {
    use std::sync::Arc;

    use chrono::{DateTime, NaiveDate, NaiveTime, TimeZone, Utc};

    use exam_lifecycle::workflows::exam::{
        ClassId, EntryDraft, ExamLifecycleService, ExamScope, GradingScale, InMemoryExamStore,
        InMemoryJobQueue, InMemoryStudentDirectory, MarkInput, MarkSelection, NewExam,
        QuestionDraft, RoomId, SchoolId, SectionId, StaffId, StudentId, StudentRef, SubjectId,
    };

    pub(super) type Service =
        ExamLifecycleService<InMemoryExamStore, InMemoryStudentDirectory, InMemoryJobQueue>;

    pub(super) fn build_service() -> (Arc<Service>, Arc<InMemoryStudentDirectory>) {
        let directory = Arc::new(InMemoryStudentDirectory::default());
        let service = Arc::new(ExamLifecycleService::new(
            Arc::new(InMemoryExamStore::default()),
            directory.clone(),
            Arc::new(InMemoryJobQueue::default()),
            GradingScale::default(),
        ));
        (service, directory)
    }

    pub(super) fn open_exam(service: &Service, school: &str, exam: &str) -> ExamScope {
        service
            .create_exam(
                SchoolId::from(school),
                NewExam {
                    exam_id: Some(exam.to_string()),
                    name: "Annual".to_string(),
                    session: "2024-25".to_string(),
                    class_ids: vec![ClassId::from("9")],
                },
            )
            .expect("exam created")
            .scope()
    }

    pub(super) fn enroll(
        directory: &InMemoryStudentDirectory,
        school: &str,
        student: &str,
        section: &str,
    ) {
        directory
            .enroll(
                &SchoolId::from(school),
                StudentRef {
                    id: StudentId::from(student),
                    class_id: ClassId::from("9"),
                    section_id: Some(SectionId::from(section)),
                    session: "2024-25".to_string(),
                    active: true,
                },
            )
            .expect("student enrolled");
    }

    pub(super) fn entry(subject: &str, day: u32, room: &str, section: &str) -> EntryDraft {
        EntryDraft {
            class_id: ClassId::from("9"),
            section_id: Some(SectionId::from(section)),
            subject_id: SubjectId::from(subject),
            exam_date: NaiveDate::from_ymd_opt(2025, 3, day).expect("valid date"),
            start_time: NaiveTime::from_hms_opt(9, 0, 0).expect("valid time"),
            end_time: NaiveTime::from_hms_opt(12, 0, 0).expect("valid time"),
            room_id: Some(RoomId::from(room)),
            supervisor_id: Some(StaffId::from(format!("sup-{room}").as_str())),
            invigilator_id: None,
            total_marks: 100.0,
        }
    }

    pub(super) fn question(prompt: &str, marks: f64) -> QuestionDraft {
        QuestionDraft {
            prompt: prompt.to_string(),
            marks,
        }
    }

    pub(super) fn mark(student: &str, section: &str, subject: &str, obtained: f64) -> MarkInput {
        MarkInput {
            class_id: ClassId::from("9"),
            section_id: Some(SectionId::from(section)),
            subject_id: SubjectId::from(subject),
            student_id: StudentId::from(student),
            marks_obtained: obtained,
            is_absent: false,
        }
    }

    pub(super) fn selection(subjects: &[&str]) -> MarkSelection {
        MarkSelection {
            classes: vec![ClassId::from("9")],
            subjects: subjects.iter().map(|subject| SubjectId::from(*subject)).collect(),
            sections: Vec::new(),
        }
    }

    pub(super) fn at(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 4, 1, hour, 0, 0)
            .single()
            .expect("valid timestamp")
    }
}

use axum::body::{to_bytes, Body};
use axum::http::{header, Request, StatusCode};
use common::*;
use exam_lifecycle::workflows::exam::{
    exam_router, ChecklistKey, ClassId, DatesheetStatus, ExamError, ExamStatus, GenerateOutcome,
    PaperStatus, PublishOutcome, ResultStatus, StaffId, StudentId, SubjectId,
};
use serde_json::Value;
use tower::ServiceExt;

#[test]
fn full_term_reaches_published_results() {
    let (service, directory) = build_service();
    let scope = open_exam(&service, "school-9", "annual-2025");
    enroll(&directory, "school-9", "amal", "A");
    enroll(&directory, "school-9", "bina", "A");
    enroll(&directory, "school-9", "chen", "B");

    let datesheets = service.datesheets();
    datesheets.open(&scope).expect("datesheet opened");
    for draft in [
        entry("physics", 3, "R1", "A"),
        entry("physics", 3, "R2", "B"),
        entry("history", 4, "R1", "A"),
        entry("history", 4, "R2", "B"),
    ] {
        let added = datesheets.add_entry(&scope, draft).expect("entry added");
        assert!(!added.has_conflict);
    }
    let datesheet = datesheets.publish(&scope, at(8)).expect("datesheet published");
    assert_eq!(datesheet.status, DatesheetStatus::Published);

    let papers = service.papers();
    for (subject, first, second) in [("physics", 60.0, 40.0), ("history", 50.0, 50.0)] {
        let paper = papers
            .create(&scope, ClassId::from("9"), SubjectId::from(subject))
            .expect("paper created");
        papers
            .add_question(&scope, &paper.id, question("Part A", first))
            .expect("question added");
        papers
            .add_question(&scope, &paper.id, question("Part B", second))
            .expect("question added");
        papers.submit(&scope, &paper.id).expect("paper submitted");
        let approved = papers
            .approve(&scope, &paper.id, StaffId::from("principal"), None)
            .expect("paper approved");
        assert_eq!(approved.total_marks, 100.0);
    }

    let marks = service.marks();
    for (student, section, physics, history) in [
        ("amal", "A", 91.0, 88.0),
        ("bina", "A", 75.0, 70.0),
        ("chen", "B", 91.0, 88.0),
    ] {
        marks
            .record(&scope, mark(student, section, "physics", physics))
            .expect("mark recorded");
        marks
            .record(&scope, mark(student, section, "history", history))
            .expect("mark recorded");
    }

    let blocked = service.readiness().evaluate(&scope).expect("checklist");
    let failing: Vec<ChecklistKey> = blocked.failing().map(|item| item.key).collect();
    assert_eq!(failing, vec![ChecklistKey::AllMarksVerified]);

    let both = selection(&["physics", "history"]);
    assert_eq!(marks.submit_marks(&scope, &both).expect("submitted").count(), 6);
    assert_eq!(
        marks
            .verify_marks(&scope, &both, StaffId::from("hod"))
            .expect("verified")
            .count(),
        6
    );

    let results = service.results();
    let job = match results.generate(&scope).expect("generate") {
        GenerateOutcome::Generating { job_id } => job_id,
        other => panic!("expected generation to be queued, got {other:?}"),
    };
    assert_eq!(results.drain_queue(at(9)).expect("drained"), 1);
    assert!(results.job_status(&scope, &job).expect("job").status.finished);

    let record = service.exam(&scope).expect("exam");
    let amal = &record.results[&StudentId::from("amal")];
    let bina = &record.results[&StudentId::from("bina")];
    let chen = &record.results[&StudentId::from("chen")];
    assert_eq!(amal.percentage, 89.5);
    assert_eq!(amal.grade, "A");
    assert_eq!(amal.rank_in_class, 1);
    assert_eq!(chen.rank_in_class, 1);
    assert_eq!(bina.rank_in_class, 3);
    assert_eq!(bina.grade, "B");
    assert_eq!(amal.status, ResultStatus::Provisional);

    match results.publish(&scope).expect("publish") {
        PublishOutcome::Publishing { .. } => {}
        other => panic!("expected publishing, got {other:?}"),
    }
    results.drain_queue(at(10)).expect("drained");

    let record = service.exam(&scope).expect("exam");
    assert_eq!(record.exam.results_published_at, Some(at(10)));
    assert!(record
        .results
        .values()
        .all(|result| result.status == ResultStatus::Published));

    let summary = results.lock_exam(&scope, at(11)).expect("exam locked");
    assert_eq!(summary.papers_locked.len(), 2);
    let record = service.exam(&scope).expect("exam");
    assert_eq!(record.exam.status, ExamStatus::Locked);
    assert!(record
        .papers
        .values()
        .all(|paper| paper.status == PaperStatus::Locked));
}

#[test]
fn schools_sharing_an_exam_id_stay_isolated() {
    let (service, directory) = build_service();
    let north = open_exam(&service, "north", "term-1");
    let south = open_exam(&service, "south", "term-1");
    enroll(&directory, "north", "n-1", "A");

    let paper = service
        .papers()
        .create(&north, ClassId::from("9"), SubjectId::from("physics"))
        .expect("paper created");

    match service.papers().get(&south, &paper.id) {
        Err(ExamError::NotFound { .. }) => {}
        other => panic!("expected not found, got {other:?}"),
    }
    let south_dashboard = service.readiness().dashboard(&south).expect("dashboard");
    assert_eq!(south_dashboard.missing_students, 0);
    assert!(south_dashboard.papers_by_status.values().all(|count| *count == 0));
}

#[tokio::test]
async fn http_surface_reports_conflicts_and_readiness() {
    let (service, directory) = build_service();
    let scope = open_exam(&service, "school-9", "annual-2025");
    enroll(&directory, "school-9", "amal", "A");
    service
        .datesheets()
        .add_entry(&scope, entry("physics", 3, "R1", "A"))
        .expect("entry added");
    service
        .datesheets()
        .add_entry(&scope, entry("history", 3, "R1", "B"))
        .expect("entry added");

    let router = exam_router(service.clone());
    let base = format!("/api/v1/schools/{}/exams/{}", scope.school_id, scope.exam_id);

    let response = router
        .clone()
        .oneshot(
            Request::post(format!("{base}/datesheet/publish"))
                .body(Body::empty())
                .expect("request"),
        )
        .await
        .expect("route responds");
    assert_eq!(response.status(), StatusCode::CONFLICT);

    let response = router
        .clone()
        .oneshot(
            Request::get(format!("{base}/datesheet/conflicts"))
                .body(Body::empty())
                .expect("request"),
        )
        .await
        .expect("route responds");
    assert_eq!(response.status(), StatusCode::OK);
    let report = read_json(response).await;
    assert_eq!(report["conflict_count"], 2);
    let kinds: Vec<&str> = report["conflicts"]
        .as_array()
        .expect("conflicts")
        .iter()
        .filter_map(|item| item["kind"].as_str())
        .collect();
    assert!(kinds.iter().all(|kind| *kind == "room" || *kind == "supervisor"));

    let response = router
        .oneshot(
            Request::get(format!("{base}/readiness"))
                .header(header::ACCEPT, "application/json")
                .body(Body::empty())
                .expect("request"),
        )
        .await
        .expect("route responds");
    assert_eq!(response.status(), StatusCode::OK);
    let checklist = read_json(response).await;
    assert_eq!(checklist["ready_to_publish"], false);
    assert_eq!(checklist["items"][0]["key"], "datesheet_published");
    assert_eq!(checklist["items"][0]["status"], false);
}

async fn read_json(response: axum::response::Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body readable");
    serde_json::from_slice(&bytes).expect("json body")
}
