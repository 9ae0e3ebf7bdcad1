/// In-memory repository for tests that must not touch a database
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dag_orchestrator::database::{PipelineRunRecord, RunHistoryRepository};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use types::RunOutcome;
use uuid::Uuid;

#[derive(Clone, Default)]
pub struct MockRunHistoryRepository {
    runs: Arc<Mutex<HashMap<Uuid, PipelineRunRecord>>>,
    write_error: Arc<Mutex<Option<String>>>,
}

impl MockRunHistoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent write fail with `message`
    pub fn fail_writes_with(&self, message: impl Into<String>) {
        *self.write_error.lock().unwrap() = Some(message.into());
    }

    /// All stored runs, oldest first
    pub fn get_all_runs(&self) -> Vec<PipelineRunRecord> {
        let mut runs: Vec<_> = self.runs.lock().unwrap().values().cloned().collect();
        runs.sort_by_key(|r| r.started_at);
        runs
    }

    pub fn clear(&self) {
        self.runs.lock().unwrap().clear();
    }

    fn check_writable(&self) -> Result<(), String> {
        match self.write_error.lock().unwrap().as_ref() {
            Some(message) => Err(message.clone()),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl RunHistoryRepository for MockRunHistoryRepository {
    async fn create_run(&self, run: &PipelineRunRecord) -> Result<(), String> {
        self.check_writable()?;

        let mut runs = self.runs.lock().unwrap();
        if runs.contains_key(&run.id) {
            return Err(format!("Pipeline run already exists: {}", run.id));
        }
        runs.insert(run.id, run.clone());
        Ok(())
    }

    async fn finish_run(
        &self,
        run_id: &Uuid,
        outcome: &RunOutcome,
        finished_at: DateTime<Utc>,
    ) -> Result<(), String> {
        self.check_writable()?;

        let mut runs = self.runs.lock().unwrap();
        let run = runs
            .get_mut(run_id)
            .ok_or_else(|| format!("Pipeline run not found: {}", run_id))?;
        run.finish(outcome, finished_at);
        Ok(())
    }

    async fn get_run(&self, run_id: &Uuid) -> Result<PipelineRunRecord, String> {
        self.runs
            .lock()
            .unwrap()
            .get(run_id)
            .cloned()
            .ok_or_else(|| format!("Pipeline run not found: {}", run_id))
    }

    async fn list_runs(&self, pipeline_id: &str, limit: i64) -> Result<Vec<PipelineRunRecord>, String> {
        let mut runs: Vec<_> = self
            .runs
            .lock()
            .unwrap()
            .values()
            .filter(|r| r.pipeline_id == pipeline_id)
            .cloned()
            .collect();
        runs.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        runs.truncate(limit.max(0) as usize);
        Ok(runs)
    }
}
