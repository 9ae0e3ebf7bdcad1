use thiserror::Error;

/// Rejections of the step list; raised before any sub-pipeline is triggered
#[derive(Debug, Error, PartialEq, Eq)]
pub enum OrchestratorError {
    #[error("Run requires at least one step")]
    NoSteps,

    #[error("Duplicate step id: {0}")]
    DuplicateStep(String),

    #[error("Invalid step at position {position}: {reason}")]
    InvalidStep { position: usize, reason: String },
}

pub type Result<T> = std::result::Result<T, OrchestratorError>;
