use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use types::{RunOutcome, RunStatus, TriggerResult};

/// Pipeline run history repository trait
#[async_trait]
pub trait RunHistoryRepository: Send + Sync {
    async fn create_run(&self, run: &PipelineRunRecord) -> Result<(), String>;
    async fn finish_run(
        &self,
        run_id: &Uuid,
        outcome: &RunOutcome,
        finished_at: DateTime<Utc>,
    ) -> Result<(), String>;
    async fn get_run(&self, run_id: &Uuid) -> Result<PipelineRunRecord, String>;
    /// Most recent runs of a pipeline first
    async fn list_runs(&self, pipeline_id: &str, limit: i64) -> Result<Vec<PipelineRunRecord>, String>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunRecordStatus {
    Running,
    Succeeded,
    Failed,
}

impl RunRecordStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunRecordStatus::Running => "running",
            RunRecordStatus::Succeeded => "succeeded",
            RunRecordStatus::Failed => "failed",
        }
    }

    pub fn parse(value: &str) -> Result<Self, String> {
        match value {
            "running" => Ok(RunRecordStatus::Running),
            "succeeded" => Ok(RunRecordStatus::Succeeded),
            "failed" => Ok(RunRecordStatus::Failed),
            other => Err(format!("Unknown run status: {}", other)),
        }
    }
}

impl From<RunStatus> for RunRecordStatus {
    fn from(status: RunStatus) -> Self {
        match status {
            RunStatus::Succeeded => RunRecordStatus::Succeeded,
            RunStatus::Failed => RunRecordStatus::Failed,
        }
    }
}

/// One persisted master pipeline run
#[derive(Debug, Clone)]
pub struct PipelineRunRecord {
    pub id: Uuid,
    pub pipeline_id: String,
    pub owner: String,
    pub triggered_by: String,
    pub steps: Vec<String>,
    pub status: RunRecordStatus,
    pub failed_step: Option<String>,
    pub results: Vec<TriggerResult>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl PipelineRunRecord {
    pub fn start(
        pipeline_id: impl Into<String>,
        owner: impl Into<String>,
        triggered_by: impl Into<String>,
        steps: Vec<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            pipeline_id: pipeline_id.into(),
            owner: owner.into(),
            triggered_by: triggered_by.into(),
            steps,
            status: RunRecordStatus::Running,
            failed_step: None,
            results: Vec::new(),
            started_at: Utc::now(),
            finished_at: None,
        }
    }

    /// Apply a finished outcome to this record
    pub fn finish(&mut self, outcome: &RunOutcome, finished_at: DateTime<Utc>) {
        self.status = outcome.status().into();
        self.failed_step = outcome.failed_step().map(str::to_string);
        self.results = outcome.results().to_vec();
        self.finished_at = Some(finished_at);
    }
}
