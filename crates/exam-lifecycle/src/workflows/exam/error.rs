use super::directory::DirectoryError;
use super::jobs::{DispatchError, JobTicket};
use super::readiness::Checklist;
use super::status::{EntityKind, TransitionRejected};
use super::store::StoreError;

/// Failure taxonomy shared by every exam workflow.
#[derive(Debug, thiserror::Error)]
pub enum ExamError {
    #[error("invalid input: {0}")]
    Validation(String),
    #[error(transparent)]
    InvalidTransition(#[from] TransitionRejected),
    #[error("results cannot be published yet: {}", .0.summary())]
    ReadinessBlocked(Checklist),
    #[error("{entity} '{id}' not found")]
    NotFound { entity: EntityKind, id: String },
    #[error("{} job {} is still running", .0.kind.label(), .0.job_id)]
    JobInFlight(JobTicket),
    #[error(transparent)]
    Storage(#[from] StoreError),
    #[error(transparent)]
    Dispatch(#[from] DispatchError),
    #[error(transparent)]
    Directory(#[from] DirectoryError),
    #[error("unable to encode result snapshot: {0}")]
    Snapshot(#[from] serde_json::Error),
}

impl ExamError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn not_found(entity: EntityKind, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// Stable machine-readable code for API payloads.
    pub const fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation_error",
            Self::InvalidTransition(_) => "invalid_transition",
            Self::ReadinessBlocked(_) => "readiness_blocked",
            Self::NotFound { .. } => "not_found",
            Self::JobInFlight(_) => "job_in_flight",
            Self::Storage(_) | Self::Dispatch(_) | Self::Directory(_) | Self::Snapshot(_) => {
                "internal_error"
            }
        }
    }
}
