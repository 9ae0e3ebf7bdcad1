use serde::{Deserialize, Serialize};

use crate::step::TriggerResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Succeeded,
    Failed,
}

impl RunStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            RunStatus::Succeeded => "succeeded",
            RunStatus::Failed => "failed",
        }
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Finalized result of one master pipeline run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunOutcome {
    results: Vec<TriggerResult>,
    status: RunStatus,
    failed_step: Option<String>,
}

impl RunOutcome {
    /// Seal the recorded results. The run succeeded only if at least one step ran
    /// and every step succeeded; otherwise the first non-success names the failure.
    pub fn finalize(results: Vec<TriggerResult>) -> Self {
        let failed_step = results
            .iter()
            .find(|r| !r.is_success())
            .map(|r| r.step_id().to_string());

        let status = if failed_step.is_none() && !results.is_empty() {
            RunStatus::Succeeded
        } else {
            RunStatus::Failed
        };

        Self {
            results,
            status,
            failed_step,
        }
    }

    pub fn results(&self) -> &[TriggerResult] {
        &self.results
    }

    pub fn status(&self) -> RunStatus {
        self.status
    }

    pub fn failed_step(&self) -> Option<&str> {
        self.failed_step.as_deref()
    }

    pub fn is_success(&self) -> bool {
        self.status == RunStatus::Succeeded
    }

    /// The result that stopped the run, if any
    pub fn failure(&self) -> Option<&TriggerResult> {
        self.results.iter().find(|r| !r.is_success())
    }
}
