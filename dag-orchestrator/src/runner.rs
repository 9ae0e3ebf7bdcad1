use chrono::Utc;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

use crate::database::{PipelineRunRecord, RunHistoryRepository};
use crate::error::Result;
use crate::orchestrator::{validate_steps, TriggerOrchestrator};
use types::{PipelineStep, RunOutcome};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletedRun {
    pub run_id: Uuid,
    pub outcome: RunOutcome,
}

/// Runs the orchestrator and keeps a history record of every run.
///
/// History writes are best effort: a failing repository is logged and never
/// changes the outcome.
pub struct PipelineRunner {
    orchestrator: TriggerOrchestrator,
    history_repo: Option<Arc<dyn RunHistoryRepository>>,
    owner: String,
    triggered_by: String,
}

impl PipelineRunner {
    pub fn new(
        orchestrator: TriggerOrchestrator,
        owner: impl Into<String>,
        triggered_by: impl Into<String>,
    ) -> Self {
        Self {
            orchestrator,
            history_repo: None,
            owner: owner.into(),
            triggered_by: triggered_by.into(),
        }
    }

    pub fn with_history(mut self, history_repo: Arc<dyn RunHistoryRepository>) -> Self {
        self.history_repo = Some(history_repo);
        self
    }

    pub fn orchestrator(&self) -> &TriggerOrchestrator {
        &self.orchestrator
    }

    pub async fn run(
        &self,
        steps: &[PipelineStep],
        cancel: CancellationToken,
    ) -> Result<CompletedRun> {
        validate_steps(steps)?;

        let pipeline_id = self.orchestrator.config().pipeline_id.clone();
        let record = PipelineRunRecord::start(
            pipeline_id.as_str(),
            self.owner.as_str(),
            self.triggered_by.as_str(),
            steps.iter().map(|s| s.id.clone()).collect(),
        );
        let run_id = record.id;

        info!(
            pipeline_id = %pipeline_id,
            run_id = %run_id,
            owner = self.owner,
            triggered_by = self.triggered_by,
            "Pipeline run created"
        );

        if let Some(repo) = &self.history_repo {
            if let Err(e) = repo.create_run(&record).await {
                warn!(error = ?e, run_id = %run_id, "Failed to record pipeline run start");
            }
        }

        let outcome = self.orchestrator.run_until_cancelled(steps, cancel).await?;

        if let Some(repo) = &self.history_repo {
            if let Err(e) = repo.finish_run(&run_id, &outcome, Utc::now()).await {
                warn!(error = ?e, run_id = %run_id, "Failed to record pipeline run outcome");
            }
        }

        Ok(CompletedRun { run_id, outcome })
    }
}
