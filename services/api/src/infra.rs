use chrono::Utc;
use exam_lifecycle::config::ExamConfig;
use exam_lifecycle::workflows::exam::{
    DirectoryError, ExamLifecycleService, InMemoryExamStore, InMemoryJobQueue,
    InMemoryStudentDirectory, SchoolId, StudentRef,
};
use metrics_exporter_prometheus::PrometheusHandle;
use serde::Deserialize;
use std::path::Path;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

pub(crate) type ApiService =
    ExamLifecycleService<InMemoryExamStore, InMemoryStudentDirectory, InMemoryJobQueue>;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

/// One line of a roster file: a student and the school they are enrolled in.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct RosterEntry {
    pub(crate) school_id: SchoolId,
    #[serde(flatten)]
    pub(crate) student: StudentRef,
}

pub(crate) fn build_service(
    config: &ExamConfig,
) -> (Arc<ApiService>, Arc<InMemoryStudentDirectory>) {
    let directory = Arc::new(InMemoryStudentDirectory::default());
    let service = Arc::new(ExamLifecycleService::new(
        Arc::new(InMemoryExamStore::default()),
        Arc::clone(&directory),
        Arc::new(InMemoryJobQueue::default()),
        config.grading.clone(),
    ));
    (service, directory)
}

pub(crate) fn load_roster(path: &Path) -> std::io::Result<Vec<RosterEntry>> {
    let raw = std::fs::read(path)?;
    serde_json::from_slice(&raw)
        .map_err(|err| std::io::Error::new(std::io::ErrorKind::InvalidData, err))
}

pub(crate) fn enroll_all(
    directory: &InMemoryStudentDirectory,
    roster: Vec<RosterEntry>,
) -> Result<usize, DirectoryError> {
    let mut enrolled = 0;
    for entry in roster {
        directory.enroll(&entry.school_id, entry.student)?;
        enrolled += 1;
    }
    Ok(enrolled)
}

/// Background runner for result generation and publishing jobs.
pub(crate) fn spawn_job_worker(service: Arc<ApiService>, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        info!(interval_ms = every.as_millis() as u64, "exam job worker started");
        loop {
            ticker.tick().await;
            match service.results().drain_queue(Utc::now()) {
                Ok(0) => {}
                Ok(executed) => debug!(executed, "exam jobs executed"),
                Err(error) => warn!(%error, "exam job worker could not drain the queue"),
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use exam_lifecycle::workflows::exam::{ClassId, StudentDirectory};

    #[test]
    fn roster_entries_enroll_per_school() {
        let roster: Vec<RosterEntry> = serde_json::from_value(serde_json::json!([
            { "school_id": "north", "id": "n-1", "class_id": "7", "session": "2024-25" },
            { "school_id": "north", "id": "n-2", "class_id": "7", "session": "2024-25",
              "active": false },
            { "school_id": "south", "id": "s-1", "class_id": "7", "session": "2024-25" }
        ]))
        .expect("roster parses");

        let (_, directory) = build_service(&ExamConfig::default());
        assert_eq!(enroll_all(&directory, roster).expect("enrolled"), 3);

        let north = directory
            .active_students(&SchoolId::from("north"), &[ClassId::from("7")], "2024-25")
            .expect("students");
        assert_eq!(north.len(), 1);
        assert_eq!(north[0].id.as_str(), "n-1");
    }

    #[tokio::test]
    async fn worker_drains_queued_jobs() {
        use exam_lifecycle::workflows::exam::{GenerateOutcome, NewExam};

        let (service, directory) = build_service(&ExamConfig::default());
        let exam = service
            .create_exam(
                SchoolId::from("north"),
                NewExam {
                    exam_id: Some("term-1".to_string()),
                    name: "Term 1".to_string(),
                    session: "2024-25".to_string(),
                    class_ids: vec![ClassId::from("7")],
                },
            )
            .expect("exam created");
        enroll_all(
            &directory,
            serde_json::from_value(serde_json::json!([
                { "school_id": "north", "id": "n-1", "class_id": "7", "session": "2024-25" }
            ]))
            .expect("roster parses"),
        )
        .expect("enrolled");

        let scope = exam.scope();
        let job_id = match service.results().generate(&scope).expect("generate") {
            GenerateOutcome::Generating { job_id } => job_id,
            other => panic!("expected queued generation, got {other:?}"),
        };

        let worker = spawn_job_worker(Arc::clone(&service), Duration::from_millis(50));
        tokio::time::sleep(Duration::from_millis(120)).await;
        worker.abort();

        let ticket = service
            .results()
            .job_status(&scope, &job_id)
            .expect("job status");
        assert!(ticket.status.finished);
        assert_eq!(ticket.status.processed_jobs, 1);
    }
}
