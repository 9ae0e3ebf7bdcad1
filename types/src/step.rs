use serde::{Deserialize, Serialize};

/// A named sub-pipeline and its position in the master sequence
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PipelineStep {
    pub id: String,
    pub position: usize,
}

impl PipelineStep {
    pub fn new(id: impl Into<String>, position: usize) -> Self {
        Self {
            id: id.into(),
            position,
        }
    }
}

/// Build an ordered step list, positions follow iteration order
pub fn steps_from_ids<I, S>(ids: I) -> Vec<PipelineStep>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    ids.into_iter()
        .enumerate()
        .map(|(position, id)| PipelineStep::new(id, position))
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerStatus {
    Succeeded,
    Failed,
    TimedOut,
    Cancelled,
}

impl TriggerStatus {
    pub fn is_success(self) -> bool {
        self == TriggerStatus::Succeeded
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TriggerStatus::Succeeded => "succeeded",
            TriggerStatus::Failed => "failed",
            TriggerStatus::TimedOut => "timed_out",
            TriggerStatus::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for TriggerStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Terminal report for one triggered step.
///
/// Fields are only readable once constructed; a recorded result never changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggerResult {
    step_id: String,
    status: TriggerStatus,
    error: Option<String>,
}

impl TriggerResult {
    pub fn new(step_id: impl Into<String>, status: TriggerStatus, error: Option<String>) -> Self {
        Self {
            step_id: step_id.into(),
            status,
            error,
        }
    }

    pub fn succeeded(step_id: impl Into<String>) -> Self {
        Self::new(step_id, TriggerStatus::Succeeded, None)
    }

    pub fn failed(step_id: impl Into<String>, error: impl Into<String>) -> Self {
        Self::new(step_id, TriggerStatus::Failed, Some(error.into()))
    }

    pub fn timed_out(step_id: impl Into<String>, error: impl Into<String>) -> Self {
        Self::new(step_id, TriggerStatus::TimedOut, Some(error.into()))
    }

    pub fn cancelled(step_id: impl Into<String>, error: impl Into<String>) -> Self {
        Self::new(step_id, TriggerStatus::Cancelled, Some(error.into()))
    }

    pub fn step_id(&self) -> &str {
        &self.step_id
    }

    pub fn status(&self) -> TriggerStatus {
        self.status
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }
}
