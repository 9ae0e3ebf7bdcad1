use dag_orchestrator::{PipelineRunner, RunHistoryRepository, TriggerOrchestrator};
use k8s_client::K8sClient;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use trigger_core::{CommandTrigger, DagTrigger, KubernetesJobTrigger, RetryingTrigger, TriggerError};
use types::{PipelineConfig, RunEvent, TriggerBackend};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = PipelineConfig::from_env()?;
    info!(?config, "Pipeline configuration loaded");

    let triggered_by = std::env::var("PIPELINE_TRIGGERED_BY").unwrap_or_else(|_| {
        hostname::get()
            .map(|h| format!("dag-trigger-{}", h.to_string_lossy()))
            .unwrap_or_else(|_| "dag-trigger-unknown".to_string())
    });

    let backend: Arc<dyn DagTrigger> = match &config.backend {
        TriggerBackend::Command(command) => {
            info!(program = %command.program, "Using command trigger backend");
            Arc::new(CommandTrigger::new(command.clone()))
        }
        TriggerBackend::Kubernetes(kubernetes) => {
            info!(
                image = %kubernetes.image,
                namespace = %kubernetes.namespace,
                "Using Kubernetes trigger backend"
            );
            let k8s_client = Arc::new(
                K8sClient::new()
                    .await
                    .map_err(TriggerError::KubernetesError)?,
            );
            Arc::new(KubernetesJobTrigger::new(
                k8s_client,
                config.pipeline_id.as_str(),
                kubernetes.clone(),
            ))
        }
    };
    let trigger: Arc<dyn DagTrigger> = Arc::new(RetryingTrigger::new(backend, config.retries));

    // Progress events are only logged here
    let (events_tx, mut events_rx) = tokio::sync::mpsc::unbounded_channel::<RunEvent>();
    let events_handle = tokio::spawn(async move {
        while let Some(event) = events_rx.recv().await {
            match event {
                RunEvent::StateChanged { pipeline_id, state } => {
                    info!(pipeline_id = %pipeline_id, ?state, "Pipeline state changed");
                }
                RunEvent::StepStarted { pipeline_id, step } => {
                    info!(pipeline_id = %pipeline_id, step = %step.id, position = step.position, "Sub-pipeline started");
                }
                RunEvent::StepFinished { pipeline_id, result } => {
                    info!(
                        pipeline_id = %pipeline_id,
                        step = result.step_id(),
                        status = %result.status(),
                        "Sub-pipeline finished"
                    );
                }
            }
        }
    });

    let orchestrator = TriggerOrchestrator::new_with_channel(
        config.orchestrator_config(),
        trigger,
        Some(events_tx),
    );
    let mut runner = PipelineRunner::new(orchestrator, config.owner.as_str(), triggered_by);

    let db = if config.record_history {
        let db = Arc::new(
            database::Database::new(database::DatabaseConfig::from_env())
                .map_err(|e| format!("Failed to create database: {}", e))?,
        );

        if !db.health_check().await {
            error!("Failed to connect to database");
            std::process::exit(1);
        }
        db.migrate()
            .await
            .map_err(|e| format!("Failed to apply migrations: {}", e))?;

        let history_repo: Arc<dyn RunHistoryRepository> =
            Arc::new(database::PostgresRunHistoryRepository::new(Arc::clone(&db)));
        runner = runner.with_history(history_repo);
        info!("Run history recording enabled");
        Some(db)
    } else {
        None
    };

    let cancel = CancellationToken::new();
    let cancel_on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Received SIGINT/SIGTERM, cancelling the pipeline run...");
            cancel_on_signal.cancel();
        }
    });

    let steps = config.pipeline_steps();
    let completed = runner.run(&steps, cancel).await;

    // Dropping the runner closes the event channel
    drop(runner);
    let _ = events_handle.await;

    if let Some(db) = db {
        db.close().await;
    }

    let completed = completed?;
    if completed.outcome.is_success() {
        info!(
            pipeline_id = %config.pipeline_id,
            run_id = %completed.run_id,
            steps = completed.outcome.results().len(),
            "Pipeline succeeded"
        );
        Ok(())
    } else {
        error!(
            pipeline_id = %config.pipeline_id,
            run_id = %completed.run_id,
            failed_step = completed.outcome.failed_step().unwrap_or("unknown"),
            error = completed.outcome.failure().and_then(|r| r.error()).unwrap_or(""),
            "Pipeline failed"
        );
        std::process::exit(1);
    }
}
