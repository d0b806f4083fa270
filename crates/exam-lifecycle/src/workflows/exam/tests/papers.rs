use super::common::*;
use crate::workflows::exam::domain::{ClassId, QuestionId, StaffId, SubjectId};
use crate::workflows::exam::error::ExamError;
use crate::workflows::exam::status::{EntityKind, PaperStatus};

#[test]
fn paper_moves_through_review_with_recomputed_total() {
    let harness = Harness::new();
    let papers = harness.service.papers();
    let paper = papers
        .create(&harness.scope, ClassId::from("7"), SubjectId::from("science"))
        .expect("paper created");
    assert_eq!(paper.status, PaperStatus::Draft);
    assert_eq!(paper.total_marks, 0.0);

    let paper = papers
        .add_question(&harness.scope, &paper.id, question("Cells", 10.0))
        .expect("question added");
    let paper = papers
        .add_question(&harness.scope, &paper.id, question("Forces", 15.5))
        .expect("question added");
    assert_eq!(paper.total_marks, 25.5);

    let forces = paper.questions[1].id.clone();
    let paper = papers
        .update_question(&harness.scope, &paper.id, &forces, question("Forces", 20.0))
        .expect("question updated");
    assert_eq!(paper.total_marks, 30.0);

    let submitted = papers.submit(&harness.scope, &paper.id).expect("submitted");
    assert_eq!(submitted.status, PaperStatus::Submitted);

    let approved = papers
        .approve(
            &harness.scope,
            &paper.id,
            StaffId::from("hod-1"),
            Some("  looks good ".to_string()),
        )
        .expect("approved");
    assert_eq!(approved.status, PaperStatus::Approved);
    assert_eq!(approved.reviewed_by, Some(StaffId::from("hod-1")));
    assert_eq!(approved.review_comment.as_deref(), Some("looks good"));

    let locked = papers.lock(&harness.scope, &paper.id).expect("locked");
    assert_eq!(locked.status, PaperStatus::Locked);
}

#[test]
fn submitted_paper_refuses_question_edits() {
    let harness = Harness::new();
    let papers = harness.service.papers();
    let paper = papers
        .create(&harness.scope, ClassId::from("7"), SubjectId::from("science"))
        .expect("paper created");
    papers
        .add_question(&harness.scope, &paper.id, question("Cells", 10.0))
        .expect("question added");
    papers.submit(&harness.scope, &paper.id).expect("submitted");

    match papers.add_question(&harness.scope, &paper.id, question("Extra", 5.0)) {
        Err(ExamError::InvalidTransition(rejected)) => {
            assert_eq!(rejected.entity, EntityKind::Paper);
            assert_eq!(rejected.current, "submitted");
            assert_eq!(rejected.action, "edit");
        }
        other => panic!("expected invalid transition, got {other:?}"),
    }

    let stored = papers.get(&harness.scope, &paper.id).expect("paper");
    assert_eq!(stored.questions.len(), 1);
    assert_eq!(stored.total_marks, 10.0);
}

#[test]
fn rejection_requires_comment_and_reopens_authoring() {
    let harness = Harness::new();
    let papers = harness.service.papers();
    let paper = papers
        .create(&harness.scope, ClassId::from("7"), SubjectId::from("science"))
        .expect("paper created");
    papers
        .add_question(&harness.scope, &paper.id, question("Cells", 10.0))
        .expect("question added");
    papers.submit(&harness.scope, &paper.id).expect("submitted");

    assert!(matches!(
        papers.reject(&harness.scope, &paper.id, StaffId::from("hod-1"), "   "),
        Err(ExamError::Validation(_))
    ));
    assert_eq!(
        papers.get(&harness.scope, &paper.id).expect("paper").status,
        PaperStatus::Submitted
    );

    let rejected = papers
        .reject(&harness.scope, &paper.id, StaffId::from("hod-1"), "too short")
        .expect("rejected");
    assert_eq!(rejected.status, PaperStatus::Rejected);
    assert_eq!(rejected.review_comment.as_deref(), Some("too short"));

    let edited = papers
        .add_question(&harness.scope, &paper.id, question("Energy", 10.0))
        .expect("rejected paper is editable");
    assert_eq!(edited.status, PaperStatus::Draft);
    assert_eq!(edited.total_marks, 20.0);

    let resubmitted = papers.submit(&harness.scope, &paper.id).expect("resubmitted");
    assert_eq!(resubmitted.status, PaperStatus::Submitted);
}

#[test]
fn empty_paper_cannot_be_submitted() {
    let harness = Harness::new();
    let papers = harness.service.papers();
    let paper = papers
        .create(&harness.scope, ClassId::from("7"), SubjectId::from("science"))
        .expect("paper created");

    assert!(matches!(
        papers.submit(&harness.scope, &paper.id),
        Err(ExamError::Validation(_))
    ));
}

#[test]
fn only_approved_papers_lock_and_only_once() {
    let harness = Harness::new();
    let papers = harness.service.papers();
    let draft = papers
        .create(&harness.scope, ClassId::from("7"), SubjectId::from("science"))
        .expect("paper created");
    assert!(matches!(
        papers.lock(&harness.scope, &draft.id),
        Err(ExamError::InvalidTransition(_))
    ));

    let approved = harness.approved_paper();
    papers.lock(&harness.scope, &approved.id).expect("locked");
    match papers.lock(&harness.scope, &approved.id) {
        Err(ExamError::InvalidTransition(rejected)) => assert_eq!(rejected.current, "locked"),
        other => panic!("expected invalid transition, got {other:?}"),
    }
}

#[test]
fn one_paper_per_class_and_subject() {
    let harness = Harness::new();
    let papers = harness.service.papers();
    papers
        .create(&harness.scope, ClassId::from("7"), SubjectId::from("science"))
        .expect("paper created");

    assert!(matches!(
        papers.create(&harness.scope, ClassId::from("7"), SubjectId::from("science")),
        Err(ExamError::Validation(_))
    ));
    assert!(matches!(
        papers.create(&harness.scope, ClassId::from("9"), SubjectId::from("science")),
        Err(ExamError::Validation(_))
    ));
}

#[test]
fn questions_need_prompt_and_positive_marks() {
    let harness = Harness::new();
    let papers = harness.service.papers();
    let paper = papers
        .create(&harness.scope, ClassId::from("7"), SubjectId::from("science"))
        .expect("paper created");

    assert!(matches!(
        papers.add_question(&harness.scope, &paper.id, question(" ", 5.0)),
        Err(ExamError::Validation(_))
    ));
    assert!(matches!(
        papers.add_question(&harness.scope, &paper.id, question("Cells", -1.0)),
        Err(ExamError::Validation(_))
    ));
    match papers.delete_question(&harness.scope, &paper.id, &QuestionId::from("question-x")) {
        Err(ExamError::NotFound { entity, .. }) => assert_eq!(entity, EntityKind::Question),
        other => panic!("expected not found, got {other:?}"),
    }
}

#[test]
fn rejected_paper_can_be_resubmitted_unchanged_then_locked_for_good() {
    let harness = Harness::new();
    let papers = harness.service.papers();
    let paper = papers
        .create(&harness.scope, ClassId::from("7"), SubjectId::from("english"))
        .expect("paper created");
    assert_eq!(paper.status, PaperStatus::Draft);
    papers
        .add_question(&harness.scope, &paper.id, question("Essay", 40.0))
        .expect("question added");

    let reviewer = StaffId::from("hod-1");
    let steps = [
        papers.submit(&harness.scope, &paper.id),
        papers.reject(&harness.scope, &paper.id, reviewer.clone(), "incomplete"),
        papers.submit(&harness.scope, &paper.id),
        papers.approve(&harness.scope, &paper.id, reviewer, None),
        papers.lock(&harness.scope, &paper.id),
    ];
    let statuses: Vec<PaperStatus> = steps
        .into_iter()
        .map(|step| step.expect("transition allowed").status)
        .collect();
    assert_eq!(
        statuses,
        vec![
            PaperStatus::Submitted,
            PaperStatus::Rejected,
            PaperStatus::Submitted,
            PaperStatus::Approved,
            PaperStatus::Locked,
        ]
    );

    match papers.submit(&harness.scope, &paper.id) {
        Err(ExamError::InvalidTransition(rejected)) => {
            assert_eq!(rejected.current, "locked");
            assert_eq!(rejected.target, "submitted");
        }
        other => panic!("expected invalid transition, got {other:?}"),
    }
}
