use crate::cli::ServeArgs;
use crate::infra::{build_service, enroll_all, load_roster, spawn_job_worker, AppState};
use crate::routes::with_exam_routes;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use exam_lifecycle::config::AppConfig;
use exam_lifecycle::error::AppError;
use exam_lifecycle::telemetry;
use exam_lifecycle::workflows::exam::ExamError;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::info;

pub(crate) async fn run(mut args: ServeArgs) -> Result<(), AppError> {
    let mut config = AppConfig::load()?;

    if let Some(host) = args.host.take() {
        config.server.host = host;
    }
    if let Some(port) = args.port.take() {
        config.server.port = port;
    }

    telemetry::init(&config.telemetry)?;

    let (prometheus_layer, prometheus_handle) = PrometheusMetricLayer::pair();
    let readiness_flag = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let app_state = AppState {
        readiness: readiness_flag.clone(),
        metrics: Arc::new(prometheus_handle),
    };

    let (exam_service, directory) = build_service(&config.exam);
    if let Some(path) = args.roster.take() {
        let roster = load_roster(&path)?;
        let enrolled = enroll_all(&directory, roster).map_err(ExamError::from)?;
        info!(enrolled, roster = %path.display(), "student roster loaded");
    }
    let worker = spawn_job_worker(Arc::clone(&exam_service), config.exam.job_poll_interval);

    let app = with_exam_routes(exam_service)
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(?config.environment, %addr, "exam lifecycle service ready");

    let served = axum::serve(listener, app).await;
    worker.abort();
    served?;
    Ok(())
}
