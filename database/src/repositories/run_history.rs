use async_trait::async_trait;
use chrono::{DateTime, Utc};
use postgres_types::Json;
use std::sync::Arc;
use tokio_postgres::Row;
use uuid::Uuid;

use crate::connection::Database;
use dag_orchestrator::database::{PipelineRunRecord, RunHistoryRepository, RunRecordStatus};
use types::{RunOutcome, TriggerResult};

pub struct PostgresRunHistoryRepository {
    db: Arc<Database>,
}

impl PostgresRunHistoryRepository {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl RunHistoryRepository for PostgresRunHistoryRepository {
    async fn create_run(&self, run: &PipelineRunRecord) -> Result<(), String> {
        let query = r#"
            INSERT INTO pipeline_runs (
                id, pipeline_id, owner, triggered_by, steps, status, failed_step, results, started_at, finished_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
        "#;

        let client = self
            .db
            .pool
            .get()
            .await
            .map_err(|e| format!("Failed to get database client: {}", e))?;

        client
            .execute(
                query,
                &[
                    &run.id,
                    &run.pipeline_id,
                    &run.owner,
                    &run.triggered_by,
                    &Json(&run.steps),
                    &run.status.as_str(),
                    &run.failed_step,
                    &Json(&run.results),
                    &run.started_at,
                    &run.finished_at,
                ],
            )
            .await
            .map_err(|e| format!("Failed to create pipeline run: {}", e))?;

        Ok(())
    }

    async fn finish_run(
        &self,
        run_id: &Uuid,
        outcome: &RunOutcome,
        finished_at: DateTime<Utc>,
    ) -> Result<(), String> {
        let query = r#"
            UPDATE pipeline_runs
            SET status = $2, failed_step = $3, results = $4, finished_at = $5
            WHERE id = $1
        "#;

        let status = RunRecordStatus::from(outcome.status());
        let results: &[TriggerResult] = outcome.results();

        let client = self
            .db
            .pool
            .get()
            .await
            .map_err(|e| format!("Failed to get database client: {}", e))?;

        let updated = client
            .execute(
                query,
                &[
                    run_id,
                    &status.as_str(),
                    &outcome.failed_step(),
                    &Json(results),
                    &finished_at,
                ],
            )
            .await
            .map_err(|e| format!("Failed to finish pipeline run: {}", e))?;

        if updated == 0 {
            return Err(format!("Pipeline run not found: {}", run_id));
        }

        Ok(())
    }

    async fn get_run(&self, run_id: &Uuid) -> Result<PipelineRunRecord, String> {
        let client = self
            .db
            .pool
            .get()
            .await
            .map_err(|e| format!("Failed to get database client: {}", e))?;

        let row = client
            .query_opt("SELECT * FROM pipeline_runs WHERE id = $1", &[run_id])
            .await
            .map_err(|e| format!("Failed to query pipeline run: {}", e))?
            .ok_or_else(|| format!("Pipeline run not found: {}", run_id))?;

        map_run_row(&row)
    }

    async fn list_runs(&self, pipeline_id: &str, limit: i64) -> Result<Vec<PipelineRunRecord>, String> {
        let client = self
            .db
            .pool
            .get()
            .await
            .map_err(|e| format!("Failed to get database client: {}", e))?;

        let rows = client
            .query(
                "SELECT * FROM pipeline_runs WHERE pipeline_id = $1 ORDER BY started_at DESC LIMIT $2",
                &[&pipeline_id, &limit],
            )
            .await
            .map_err(|e| format!("Failed to list pipeline runs: {}", e))?;

        rows.iter().map(map_run_row).collect()
    }
}

fn map_run_row(row: &Row) -> Result<PipelineRunRecord, String> {
    let status: String = row
        .try_get("status")
        .map_err(|e| format!("Failed to read status: {}", e))?;
    let Json(steps): Json<Vec<String>> = row
        .try_get("steps")
        .map_err(|e| format!("Failed to read steps: {}", e))?;
    let Json(results): Json<Vec<TriggerResult>> = row
        .try_get("results")
        .map_err(|e| format!("Failed to read results: {}", e))?;

    Ok(PipelineRunRecord {
        id: row.try_get("id").map_err(|e| format!("Failed to read id: {}", e))?,
        pipeline_id: row
            .try_get("pipeline_id")
            .map_err(|e| format!("Failed to read pipeline_id: {}", e))?,
        owner: row
            .try_get("owner")
            .map_err(|e| format!("Failed to read owner: {}", e))?,
        triggered_by: row
            .try_get("triggered_by")
            .map_err(|e| format!("Failed to read triggered_by: {}", e))?,
        steps,
        status: RunRecordStatus::parse(&status)?,
        failed_step: row
            .try_get("failed_step")
            .map_err(|e| format!("Failed to read failed_step: {}", e))?,
        results,
        started_at: row
            .try_get("started_at")
            .map_err(|e| format!("Failed to read started_at: {}", e))?,
        finished_at: row
            .try_get("finished_at")
            .map_err(|e| format!("Failed to read finished_at: {}", e))?,
    })
}
