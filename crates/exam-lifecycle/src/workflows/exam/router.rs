use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::directory::StudentDirectory;
use super::domain::{
    ClassId, EntryDraft, EntryId, ExamScope, JobId, MarkId, MarkInput, PaperId, QuestionDraft,
    QuestionId, SchoolId, StaffId, SubjectId,
};
use super::error::ExamError;
use super::jobs::JobDispatcher;
use super::marks::MarkSelection;
use super::publish::{GenerateOutcome, PublishOutcome};
use super::service::{ExamLifecycleService, NewExam};
use super::store::ExamStore;

type Service<S, D, J> = State<Arc<ExamLifecycleService<S, D, J>>>;

/// `(school_id, exam_id, trailing id)`.
type ItemPath<T> = Path<(String, String, T)>;

const EXAM: &str = "/api/v1/schools/:school_id/exams/:exam_id";

/// Router exposing the exam workflows under `/api/v1/schools/:school_id/exams`.
pub fn exam_router<S, D, J>(service: Arc<ExamLifecycleService<S, D, J>>) -> Router
where
    S: ExamStore + 'static,
    D: StudentDirectory + 'static,
    J: JobDispatcher + 'static,
{
    let under = |suffix: &str| format!("{EXAM}{suffix}");

    Router::new()
        .route(
            "/api/v1/schools/:school_id/exams",
            post(create_exam_handler::<S, D, J>),
        )
        .route(EXAM, get(exam_handler::<S, D, J>))
        .route(
            &under("/datesheet"),
            post(open_datesheet_handler::<S, D, J>).get(datesheet_handler::<S, D, J>),
        )
        .route(&under("/datesheet/entries"), post(add_entry_handler::<S, D, J>))
        .route(
            &under("/datesheet/entries/:entry_id"),
            put(update_entry_handler::<S, D, J>).delete(delete_entry_handler::<S, D, J>),
        )
        .route(&under("/datesheet/conflicts"), get(conflicts_handler::<S, D, J>))
        .route(
            &under("/datesheet/publish"),
            post(publish_datesheet_handler::<S, D, J>),
        )
        .route(
            &under("/datesheet/archive"),
            post(archive_datesheet_handler::<S, D, J>),
        )
        .route(&under("/papers"), post(create_paper_handler::<S, D, J>))
        .route(&under("/papers/:paper_id"), get(paper_handler::<S, D, J>))
        .route(
            &under("/papers/:paper_id/questions"),
            post(add_question_handler::<S, D, J>),
        )
        .route(
            &under("/papers/:paper_id/questions/:question_id"),
            put(update_question_handler::<S, D, J>).delete(delete_question_handler::<S, D, J>),
        )
        .route(
            &under("/papers/:paper_id/submit"),
            post(submit_paper_handler::<S, D, J>),
        )
        .route(
            &under("/papers/:paper_id/approve"),
            post(approve_paper_handler::<S, D, J>),
        )
        .route(
            &under("/papers/:paper_id/reject"),
            post(reject_paper_handler::<S, D, J>),
        )
        .route(&under("/papers/:paper_id/lock"), post(lock_paper_handler::<S, D, J>))
        .route(&under("/marks"), post(record_mark_handler::<S, D, J>))
        .route(&under("/marks/submit"), post(submit_marks_handler::<S, D, J>))
        .route(&under("/marks/verify"), post(verify_marks_handler::<S, D, J>))
        .route(&under("/marks/lock"), post(lock_marks_handler::<S, D, J>))
        .route(
            &under("/marks/:mark_id/submit"),
            post(submit_mark_handler::<S, D, J>),
        )
        .route(
            &under("/marks/:mark_id/verify"),
            post(verify_mark_handler::<S, D, J>),
        )
        .route(&under("/marks/:mark_id/lock"), post(lock_mark_handler::<S, D, J>))
        .route(&under("/readiness"), get(readiness_handler::<S, D, J>))
        .route(&under("/dashboard"), get(dashboard_handler::<S, D, J>))
        .route(&under("/results/generate"), post(generate_handler::<S, D, J>))
        .route(
            &under("/results/regenerate"),
            post(regenerate_handler::<S, D, J>),
        )
        .route(&under("/results/publish"), post(publish_results_handler::<S, D, J>))
        .route(&under("/jobs/:job_id"), get(job_status_handler::<S, D, J>))
        .route(&under("/lock"), post(lock_exam_handler::<S, D, J>))
        .with_state(service)
}

#[derive(Debug, Deserialize)]
pub(crate) struct SchoolPath {
    school_id: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ExamPath {
    pub(crate) school_id: String,
    pub(crate) exam_id: String,
}

impl ExamPath {
    fn scope(&self) -> ExamScope {
        ExamScope::new(self.school_id.as_str(), self.exam_id.as_str())
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct QuestionPath {
    school_id: String,
    exam_id: String,
    paper_id: PaperId,
    question_id: QuestionId,
}

impl QuestionPath {
    fn scope(&self) -> ExamScope {
        ExamScope::new(self.school_id.as_str(), self.exam_id.as_str())
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct NewPaper {
    class_id: ClassId,
    subject_id: SubjectId,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ApproveRequest {
    reviewer_id: StaffId,
    #[serde(default)]
    comment: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RejectRequest {
    reviewer_id: StaffId,
    #[serde(default)]
    comment: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct VerifyRequest {
    verified_by: StaffId,
}

#[derive(Debug, Deserialize)]
pub(crate) struct VerifyBatchRequest {
    #[serde(flatten)]
    selection: MarkSelection,
    verified_by: StaffId,
}

/// Maps workflow failures onto status codes and a JSON body callers can act on.
pub fn error_response(error: ExamError) -> Response {
    let message = error.to_string();
    let code = error.code();
    match error {
        ExamError::Validation(_) => {
            let payload = json!({ "error": message, "code": code });
            (StatusCode::UNPROCESSABLE_ENTITY, Json(payload)).into_response()
        }
        ExamError::InvalidTransition(rejected) => {
            let payload = json!({ "error": message, "code": code, "transition": rejected });
            (StatusCode::CONFLICT, Json(payload)).into_response()
        }
        ExamError::ReadinessBlocked(checklist) => {
            let payload = json!({ "error": message, "code": code, "checklist": checklist });
            (StatusCode::CONFLICT, Json(payload)).into_response()
        }
        ExamError::NotFound { entity, id } => {
            let payload = json!({
                "error": message,
                "code": code,
                "entity": entity,
                "id": id,
            });
            (StatusCode::NOT_FOUND, Json(payload)).into_response()
        }
        ExamError::JobInFlight(ticket) => {
            let payload = json!({ "message": message, "code": code, "job": ticket });
            (StatusCode::ACCEPTED, Json(payload)).into_response()
        }
        other => {
            tracing::error!(error = %other, "exam operation failed");
            let payload = json!({ "error": message, "code": code });
            (StatusCode::INTERNAL_SERVER_ERROR, Json(payload)).into_response()
        }
    }
}

fn respond<T: Serialize>(status: StatusCode, outcome: Result<T, ExamError>) -> Response {
    match outcome {
        Ok(value) => (status, Json(value)).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn create_exam_handler<S, D, J>(
    State(service): Service<S, D, J>,
    Path(path): Path<SchoolPath>,
    Json(request): Json<NewExam>,
) -> Response
where
    S: ExamStore + 'static,
    D: StudentDirectory + 'static,
    J: JobDispatcher + 'static,
{
    let outcome = service.create_exam(SchoolId(path.school_id), request);
    respond(StatusCode::CREATED, outcome)
}

pub(crate) async fn exam_handler<S, D, J>(
    State(service): Service<S, D, J>,
    Path(path): Path<ExamPath>,
) -> Response
where
    S: ExamStore + 'static,
    D: StudentDirectory + 'static,
    J: JobDispatcher + 'static,
{
    respond(StatusCode::OK, service.exam(&path.scope()))
}

pub(crate) async fn open_datesheet_handler<S, D, J>(
    State(service): Service<S, D, J>,
    Path(path): Path<ExamPath>,
) -> Response
where
    S: ExamStore + 'static,
    D: StudentDirectory + 'static,
    J: JobDispatcher + 'static,
{
    respond(StatusCode::OK, service.datesheets().open(&path.scope()))
}

pub(crate) async fn datesheet_handler<S, D, J>(
    State(service): Service<S, D, J>,
    Path(path): Path<ExamPath>,
) -> Response
where
    S: ExamStore + 'static,
    D: StudentDirectory + 'static,
    J: JobDispatcher + 'static,
{
    respond(StatusCode::OK, service.datesheets().get(&path.scope()))
}

pub(crate) async fn add_entry_handler<S, D, J>(
    State(service): Service<S, D, J>,
    Path(path): Path<ExamPath>,
    Json(draft): Json<EntryDraft>,
) -> Response
where
    S: ExamStore + 'static,
    D: StudentDirectory + 'static,
    J: JobDispatcher + 'static,
{
    let outcome = service.datesheets().add_entry(&path.scope(), draft);
    respond(StatusCode::CREATED, outcome)
}

pub(crate) async fn update_entry_handler<S, D, J>(
    State(service): Service<S, D, J>,
    Path((school_id, exam_id, entry_id)): ItemPath<EntryId>,
    Json(draft): Json<EntryDraft>,
) -> Response
where
    S: ExamStore + 'static,
    D: StudentDirectory + 'static,
    J: JobDispatcher + 'static,
{
    let outcome = service
        .datesheets()
        .update_entry(&ExamScope::new(school_id, exam_id), &entry_id, draft);
    respond(StatusCode::OK, outcome)
}

pub(crate) async fn delete_entry_handler<S, D, J>(
    State(service): Service<S, D, J>,
    Path((school_id, exam_id, entry_id)): ItemPath<EntryId>,
) -> Response
where
    S: ExamStore + 'static,
    D: StudentDirectory + 'static,
    J: JobDispatcher + 'static,
{
    let outcome = service.datesheets().delete_entry(&ExamScope::new(school_id, exam_id), &entry_id);
    respond(StatusCode::OK, outcome)
}

pub(crate) async fn conflicts_handler<S, D, J>(
    State(service): Service<S, D, J>,
    Path(path): Path<ExamPath>,
) -> Response
where
    S: ExamStore + 'static,
    D: StudentDirectory + 'static,
    J: JobDispatcher + 'static,
{
    respond(
        StatusCode::OK,
        service.datesheets().conflict_report(&path.scope()),
    )
}

pub(crate) async fn publish_datesheet_handler<S, D, J>(
    State(service): Service<S, D, J>,
    Path(path): Path<ExamPath>,
) -> Response
where
    S: ExamStore + 'static,
    D: StudentDirectory + 'static,
    J: JobDispatcher + 'static,
{
    let outcome = service.datesheets().publish(&path.scope(), Utc::now());
    respond(StatusCode::OK, outcome)
}

pub(crate) async fn archive_datesheet_handler<S, D, J>(
    State(service): Service<S, D, J>,
    Path(path): Path<ExamPath>,
) -> Response
where
    S: ExamStore + 'static,
    D: StudentDirectory + 'static,
    J: JobDispatcher + 'static,
{
    respond(StatusCode::OK, service.datesheets().archive(&path.scope()))
}

pub(crate) async fn create_paper_handler<S, D, J>(
    State(service): Service<S, D, J>,
    Path(path): Path<ExamPath>,
    Json(request): Json<NewPaper>,
) -> Response
where
    S: ExamStore + 'static,
    D: StudentDirectory + 'static,
    J: JobDispatcher + 'static,
{
    let outcome = service
        .papers()
        .create(&path.scope(), request.class_id, request.subject_id);
    respond(StatusCode::CREATED, outcome)
}

pub(crate) async fn paper_handler<S, D, J>(
    State(service): Service<S, D, J>,
    Path((school_id, exam_id, paper_id)): ItemPath<PaperId>,
) -> Response
where
    S: ExamStore + 'static,
    D: StudentDirectory + 'static,
    J: JobDispatcher + 'static,
{
    respond(
        StatusCode::OK,
        service.papers().get(&ExamScope::new(school_id, exam_id), &paper_id),
    )
}

pub(crate) async fn add_question_handler<S, D, J>(
    State(service): Service<S, D, J>,
    Path((school_id, exam_id, paper_id)): ItemPath<PaperId>,
    Json(draft): Json<QuestionDraft>,
) -> Response
where
    S: ExamStore + 'static,
    D: StudentDirectory + 'static,
    J: JobDispatcher + 'static,
{
    let outcome = service
        .papers()
        .add_question(&ExamScope::new(school_id, exam_id), &paper_id, draft);
    respond(StatusCode::CREATED, outcome)
}

pub(crate) async fn update_question_handler<S, D, J>(
    State(service): Service<S, D, J>,
    Path(path): Path<QuestionPath>,
    Json(draft): Json<QuestionDraft>,
) -> Response
where
    S: ExamStore + 'static,
    D: StudentDirectory + 'static,
    J: JobDispatcher + 'static,
{
    let outcome = service.papers().update_question(
        &path.scope(),
        &path.paper_id,
        &path.question_id,
        draft,
    );
    respond(StatusCode::OK, outcome)
}

pub(crate) async fn delete_question_handler<S, D, J>(
    State(service): Service<S, D, J>,
    Path(path): Path<QuestionPath>,
) -> Response
where
    S: ExamStore + 'static,
    D: StudentDirectory + 'static,
    J: JobDispatcher + 'static,
{
    let outcome =
        service
            .papers()
            .delete_question(&path.scope(), &path.paper_id, &path.question_id);
    respond(StatusCode::OK, outcome)
}

pub(crate) async fn submit_paper_handler<S, D, J>(
    State(service): Service<S, D, J>,
    Path((school_id, exam_id, paper_id)): ItemPath<PaperId>,
) -> Response
where
    S: ExamStore + 'static,
    D: StudentDirectory + 'static,
    J: JobDispatcher + 'static,
{
    respond(
        StatusCode::OK,
        service.papers().submit(&ExamScope::new(school_id, exam_id), &paper_id),
    )
}

pub(crate) async fn approve_paper_handler<S, D, J>(
    State(service): Service<S, D, J>,
    Path((school_id, exam_id, paper_id)): ItemPath<PaperId>,
    Json(request): Json<ApproveRequest>,
) -> Response
where
    S: ExamStore + 'static,
    D: StudentDirectory + 'static,
    J: JobDispatcher + 'static,
{
    let outcome = service.papers().approve(
        &ExamScope::new(school_id, exam_id),
        &paper_id,
        request.reviewer_id,
        request.comment,
    );
    respond(StatusCode::OK, outcome)
}

pub(crate) async fn reject_paper_handler<S, D, J>(
    State(service): Service<S, D, J>,
    Path((school_id, exam_id, paper_id)): ItemPath<PaperId>,
    Json(request): Json<RejectRequest>,
) -> Response
where
    S: ExamStore + 'static,
    D: StudentDirectory + 'static,
    J: JobDispatcher + 'static,
{
    let outcome = service.papers().reject(
        &ExamScope::new(school_id, exam_id),
        &paper_id,
        request.reviewer_id,
        &request.comment,
    );
    respond(StatusCode::OK, outcome)
}

pub(crate) async fn lock_paper_handler<S, D, J>(
    State(service): Service<S, D, J>,
    Path((school_id, exam_id, paper_id)): ItemPath<PaperId>,
) -> Response
where
    S: ExamStore + 'static,
    D: StudentDirectory + 'static,
    J: JobDispatcher + 'static,
{
    respond(
        StatusCode::OK,
        service.papers().lock(&ExamScope::new(school_id, exam_id), &paper_id),
    )
}

pub(crate) async fn record_mark_handler<S, D, J>(
    State(service): Service<S, D, J>,
    Path(path): Path<ExamPath>,
    Json(input): Json<MarkInput>,
) -> Response
where
    S: ExamStore + 'static,
    D: StudentDirectory + 'static,
    J: JobDispatcher + 'static,
{
    respond(StatusCode::OK, service.marks().record(&path.scope(), input))
}

pub(crate) async fn submit_marks_handler<S, D, J>(
    State(service): Service<S, D, J>,
    Path(path): Path<ExamPath>,
    Json(selection): Json<MarkSelection>,
) -> Response
where
    S: ExamStore + 'static,
    D: StudentDirectory + 'static,
    J: JobDispatcher + 'static,
{
    let outcome = service.marks().submit_marks(&path.scope(), &selection);
    respond(StatusCode::OK, outcome)
}

pub(crate) async fn verify_marks_handler<S, D, J>(
    State(service): Service<S, D, J>,
    Path(path): Path<ExamPath>,
    Json(request): Json<VerifyBatchRequest>,
) -> Response
where
    S: ExamStore + 'static,
    D: StudentDirectory + 'static,
    J: JobDispatcher + 'static,
{
    let outcome =
        service
            .marks()
            .verify_marks(&path.scope(), &request.selection, request.verified_by);
    respond(StatusCode::OK, outcome)
}

pub(crate) async fn lock_marks_handler<S, D, J>(
    State(service): Service<S, D, J>,
    Path(path): Path<ExamPath>,
    Json(selection): Json<MarkSelection>,
) -> Response
where
    S: ExamStore + 'static,
    D: StudentDirectory + 'static,
    J: JobDispatcher + 'static,
{
    let outcome = service.marks().lock_marks(&path.scope(), &selection);
    respond(StatusCode::OK, outcome)
}

pub(crate) async fn submit_mark_handler<S, D, J>(
    State(service): Service<S, D, J>,
    Path((school_id, exam_id, mark_id)): ItemPath<MarkId>,
) -> Response
where
    S: ExamStore + 'static,
    D: StudentDirectory + 'static,
    J: JobDispatcher + 'static,
{
    respond(
        StatusCode::OK,
        service.marks().submit(&ExamScope::new(school_id, exam_id), &mark_id),
    )
}

pub(crate) async fn verify_mark_handler<S, D, J>(
    State(service): Service<S, D, J>,
    Path((school_id, exam_id, mark_id)): ItemPath<MarkId>,
    Json(request): Json<VerifyRequest>,
) -> Response
where
    S: ExamStore + 'static,
    D: StudentDirectory + 'static,
    J: JobDispatcher + 'static,
{
    let outcome = service
        .marks()
        .verify(&ExamScope::new(school_id, exam_id), &mark_id, request.verified_by);
    respond(StatusCode::OK, outcome)
}

pub(crate) async fn lock_mark_handler<S, D, J>(
    State(service): Service<S, D, J>,
    Path((school_id, exam_id, mark_id)): ItemPath<MarkId>,
) -> Response
where
    S: ExamStore + 'static,
    D: StudentDirectory + 'static,
    J: JobDispatcher + 'static,
{
    respond(
        StatusCode::OK,
        service.marks().lock(&ExamScope::new(school_id, exam_id), &mark_id),
    )
}

pub(crate) async fn readiness_handler<S, D, J>(
    State(service): Service<S, D, J>,
    Path(path): Path<ExamPath>,
) -> Response
where
    S: ExamStore + 'static,
    D: StudentDirectory + 'static,
    J: JobDispatcher + 'static,
{
    respond(StatusCode::OK, service.readiness().evaluate(&path.scope()))
}

pub(crate) async fn dashboard_handler<S, D, J>(
    State(service): Service<S, D, J>,
    Path(path): Path<ExamPath>,
) -> Response
where
    S: ExamStore + 'static,
    D: StudentDirectory + 'static,
    J: JobDispatcher + 'static,
{
    respond(StatusCode::OK, service.readiness().dashboard(&path.scope()))
}

pub(crate) async fn generate_handler<S, D, J>(
    State(service): Service<S, D, J>,
    Path(path): Path<ExamPath>,
) -> Response
where
    S: ExamStore + 'static,
    D: StudentDirectory + 'static,
    J: JobDispatcher + 'static,
{
    match service.results().generate(&path.scope()) {
        Ok(outcome @ GenerateOutcome::Ready { .. }) => {
            (StatusCode::OK, Json(outcome)).into_response()
        }
        Ok(outcome @ GenerateOutcome::Generating { .. }) => {
            (StatusCode::ACCEPTED, Json(outcome)).into_response()
        }
        Err(error) => error_response(error),
    }
}

pub(crate) async fn regenerate_handler<S, D, J>(
    State(service): Service<S, D, J>,
    Path(path): Path<ExamPath>,
) -> Response
where
    S: ExamStore + 'static,
    D: StudentDirectory + 'static,
    J: JobDispatcher + 'static,
{
    let outcome = service
        .results()
        .regenerate(&path.scope())
        .map(|job_id| GenerateOutcome::Generating { job_id });
    respond(StatusCode::ACCEPTED, outcome)
}

pub(crate) async fn publish_results_handler<S, D, J>(
    State(service): Service<S, D, J>,
    Path(path): Path<ExamPath>,
) -> Response
where
    S: ExamStore + 'static,
    D: StudentDirectory + 'static,
    J: JobDispatcher + 'static,
{
    match service.results().publish(&path.scope()) {
        Ok(outcome @ PublishOutcome::AlreadyPublished { .. }) => {
            (StatusCode::OK, Json(outcome)).into_response()
        }
        Ok(outcome) => (StatusCode::ACCEPTED, Json(outcome)).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn job_status_handler<S, D, J>(
    State(service): Service<S, D, J>,
    Path((school_id, exam_id, job_id)): ItemPath<JobId>,
) -> Response
where
    S: ExamStore + 'static,
    D: StudentDirectory + 'static,
    J: JobDispatcher + 'static,
{
    respond(
        StatusCode::OK,
        service.results().job_status(&ExamScope::new(school_id, exam_id), &job_id),
    )
}

pub(crate) async fn lock_exam_handler<S, D, J>(
    State(service): Service<S, D, J>,
    Path(path): Path<ExamPath>,
) -> Response
where
    S: ExamStore + 'static,
    D: StudentDirectory + 'static,
    J: JobDispatcher + 'static,
{
    respond(
        StatusCode::OK,
        service.results().lock_exam(&path.scope(), Utc::now()),
    )
}
