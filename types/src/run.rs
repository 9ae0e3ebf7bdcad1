use serde::{Deserialize, Serialize};

use crate::step::{PipelineStep, TriggerResult};

/// Lifecycle of a single orchestrator run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "lowercase")]
pub enum RunState {
    Pending,
    Running { index: usize },
    Succeeded,
    Failed,
}

impl RunState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunState::Succeeded | RunState::Failed)
    }
}

/// Progress notification published while a run is in flight
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunEvent {
    StateChanged {
        pipeline_id: String,
        state: RunState,
    },
    StepStarted {
        pipeline_id: String,
        step: PipelineStep,
    },
    StepFinished {
        pipeline_id: String,
        result: TriggerResult,
    },
}
