use thiserror::Error;
use types::TriggerResult;

#[derive(Debug, Error)]
pub enum TriggerError {
    #[error("Step {step_id} failed: {message}")]
    StepFailed { step_id: String, message: String },

    #[error("Step {step_id} timed out: {message}")]
    StepTimedOut { step_id: String, message: String },

    #[error("Trigger faulted for step {step_id}: {message}")]
    TriggerFaulted { step_id: String, message: String },

    #[error("Kubernetes error: {0}")]
    KubernetesError(#[from] k8s_client::error::KubernetesError),

    #[error("Failed to spawn {program}: {source}")]
    SpawnError {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

pub type Result<T> = std::result::Result<T, TriggerError>;

impl TriggerError {
    pub fn step_failed(step_id: impl Into<String>, message: impl Into<String>) -> Self {
        TriggerError::StepFailed {
            step_id: step_id.into(),
            message: message.into(),
        }
    }

    pub fn faulted(step_id: impl Into<String>, message: impl Into<String>) -> Self {
        TriggerError::TriggerFaulted {
            step_id: step_id.into(),
            message: message.into(),
        }
    }

    /// Errors that will fail again no matter how often the step is re-triggered
    pub fn is_permanent(&self) -> bool {
        match self {
            TriggerError::ConfigError(_) => true,
            TriggerError::SpawnError { source, .. } => matches!(
                source.kind(),
                std::io::ErrorKind::NotFound | std::io::ErrorKind::PermissionDenied
            ),
            _ => false,
        }
    }

    /// Terminal result recorded for the step when the trigger errored
    pub fn into_result(self, step_id: &str) -> TriggerResult {
        match self {
            TriggerError::StepTimedOut { .. } => TriggerResult::timed_out(step_id, self.to_string()),
            other => TriggerResult::failed(step_id, other.to_string()),
        }
    }
}
