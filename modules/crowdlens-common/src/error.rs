use thiserror::Error;
use uuid::Uuid;

use crate::types::JobStatus;

#[derive(Error, Debug)]
pub enum CrowdLensError {
    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    #[error("Invalid transition: {from} -> {to}")]
    InvalidTransition { from: JobStatus, to: JobStatus },

    #[error("Job is already in a terminal state")]
    AlreadyTerminal,

    #[error("Job {0} not found")]
    NotFound(Uuid),

    #[error("All {failures} persona evaluations failed")]
    AllEvaluationsFailed { failures: usize },

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}
