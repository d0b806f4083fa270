//! Racing callers against the same exam: guarded transitions must land exactly once.

mod common {
    use std::sync::Arc;

    use exam_lifecycle::workflows::exam::{
        ClassId, ExamLifecycleService, ExamScope, GradingScale, InMemoryExamStore,
        InMemoryJobQueue, InMemoryStudentDirectory, MarkInput, MarkSelection, NewExam,
        QuestionDraft, SchoolId, SectionId, StudentId, SubjectId,
    };

    pub(super) type Service =
        ExamLifecycleService<InMemoryExamStore, InMemoryStudentDirectory, InMemoryJobQueue>;

    pub(super) fn build() -> (Arc<Service>, ExamScope) {
        let service = Arc::new(ExamLifecycleService::new(
            Arc::new(InMemoryExamStore::default()),
            Arc::new(InMemoryStudentDirectory::default()),
            Arc::new(InMemoryJobQueue::default()),
            GradingScale::default(),
        ));
        let scope = service
            .create_exam(
                SchoolId::from("school-1"),
                NewExam {
                    exam_id: Some("exam-1".to_string()),
                    name: "Unit Test 2".to_string(),
                    session: "2024-25".to_string(),
                    class_ids: vec![ClassId::from("5")],
                },
            )
            .expect("exam created")
            .scope();
        (service, scope)
    }

    pub(super) fn question() -> QuestionDraft {
        QuestionDraft {
            prompt: "Fractions".to_string(),
            marks: 25.0,
        }
    }

    pub(super) fn mark(student: usize) -> MarkInput {
        MarkInput {
            class_id: ClassId::from("5"),
            section_id: Some(SectionId::from("A")),
            subject_id: SubjectId::from("math"),
            student_id: StudentId::from(format!("s-{student:03}").as_str()),
            marks_obtained: 20.0,
            is_absent: false,
        }
    }

    pub(super) fn math() -> MarkSelection {
        MarkSelection {
            classes: vec![ClassId::from("5")],
            subjects: vec![SubjectId::from("math")],
            sections: Vec::new(),
        }
    }
}

use std::collections::HashSet;
use std::sync::{Arc, Barrier};
use std::thread;

use common::*;
use exam_lifecycle::workflows::exam::{
    ClassId, ExamError, MarkId, MarkStatus, PaperStatus, StaffId, SubjectId,
};

#[test]
fn concurrent_approvals_succeed_exactly_once() {
    let (service, scope) = build();
    let papers = service.papers();
    let paper = papers
        .create(&scope, ClassId::from("5"), SubjectId::from("math"))
        .expect("paper created");
    papers
        .add_question(&scope, &paper.id, question())
        .expect("question added");
    papers.submit(&scope, &paper.id).expect("paper submitted");

    let reviewers = 8;
    let barrier = Arc::new(Barrier::new(reviewers));
    let handles: Vec<_> = (0..reviewers)
        .map(|reviewer| {
            let service = Arc::clone(&service);
            let scope = scope.clone();
            let paper_id = paper.id.clone();
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                service.papers().approve(
                    &scope,
                    &paper_id,
                    StaffId::from(format!("hod-{reviewer}").as_str()),
                    None,
                )
            })
        })
        .collect();

    let outcomes: Vec<_> = handles
        .into_iter()
        .map(|handle| handle.join().expect("reviewer thread"))
        .collect();
    let approved = outcomes.iter().filter(|outcome| outcome.is_ok()).count();
    assert_eq!(approved, 1);
    assert!(outcomes
        .iter()
        .filter_map(|outcome| outcome.as_ref().err())
        .all(|error| matches!(error, ExamError::InvalidTransition(_))));

    let stored = service.papers().get(&scope, &paper.id).expect("paper");
    assert_eq!(stored.status, PaperStatus::Approved);
}

#[test]
fn overlapping_batches_move_each_mark_once() {
    let (service, scope) = build();
    for student in 0..40 {
        service
            .marks()
            .record(&scope, mark(student))
            .expect("mark recorded");
    }

    let workers = 4;
    let barrier = Arc::new(Barrier::new(workers));
    let handles: Vec<_> = (0..workers)
        .map(|_| {
            let service = Arc::clone(&service);
            let scope = scope.clone();
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                service.marks().submit_marks(&scope, &math())
            })
        })
        .collect();

    let mut moved: Vec<MarkId> = Vec::new();
    for handle in handles {
        let outcome = handle
            .join()
            .expect("batch thread")
            .expect("batch applied");
        assert_eq!(outcome.count() + outcome.skipped.len(), 40);
        moved.extend(outcome.transitioned);
    }

    let unique: HashSet<&MarkId> = moved.iter().collect();
    assert_eq!(moved.len(), 40);
    assert_eq!(unique.len(), 40);

    let marks = service.marks().list(&scope, &math()).expect("marks listed");
    assert!(marks
        .iter()
        .all(|mark| mark.status == MarkStatus::Submitted));
}
