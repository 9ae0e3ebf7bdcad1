// Unit tests for CommandTrigger, run against the local shell

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use trigger_core::{CommandTrigger, DagTrigger, TriggerError};
use types::{CommandBackendConfig, PipelineStep, TriggerStatus};

fn shell_trigger(script: &str, step_commands: HashMap<String, String>) -> CommandTrigger {
    CommandTrigger::new(CommandBackendConfig {
        program: "sh".to_string(),
        args: vec!["-c".to_string(), script.to_string(), "{step}".to_string()],
        step_commands,
    })
}

#[tokio::test]
async fn test_zero_exit_succeeds() {
    let trigger = shell_trigger("test \"$0\" = etl_dag", HashMap::new());

    let result = trigger.trigger(&PipelineStep::new("etl_dag", 0)).await.unwrap();

    assert_eq!(result.step_id(), "etl_dag");
    assert_eq!(result.status(), TriggerStatus::Succeeded);
    assert_eq!(result.error(), None);
}

#[tokio::test]
async fn test_step_id_is_exported() {
    let trigger = shell_trigger("test \"$PIPELINE_STEP_ID\" = dw_dag", HashMap::new());

    let result = trigger.trigger(&PipelineStep::new("dw_dag", 1)).await.unwrap();

    assert!(result.is_success());
}

#[tokio::test]
async fn test_non_zero_exit_fails_with_stderr() {
    let mut overrides = HashMap::new();
    overrides.insert(
        "train_sentiment_model".to_string(),
        "echo 'model diverged' >&2; exit 3".to_string(),
    );
    let trigger = shell_trigger("exit 0", overrides);

    let result = trigger
        .trigger(&PipelineStep::new("train_sentiment_model", 1))
        .await
        .unwrap();

    assert_eq!(result.status(), TriggerStatus::Failed);
    let detail = result.error().unwrap();
    assert!(detail.contains("exit code 3"));
    assert!(detail.contains("model diverged"));
}

#[tokio::test]
async fn test_missing_program_is_permanent_error() {
    let trigger = CommandTrigger::new(CommandBackendConfig {
        program: "dag-trigger-no-such-program".to_string(),
        args: vec!["{step}".to_string()],
        step_commands: HashMap::new(),
    });

    let err = trigger
        .trigger(&PipelineStep::new("etl_dag", 0))
        .await
        .unwrap_err();

    assert!(matches!(err, TriggerError::SpawnError { .. }));
    assert!(err.is_permanent());
}

/// Step whose shell starts a background pipeline that writes `marker` after a second
fn marker_trigger(marker: &std::path::Path) -> Arc<CommandTrigger> {
    let mut overrides = HashMap::new();
    overrides.insert(
        "ml_training_dag".to_string(),
        format!("(sleep 1; touch '{}') | cat", marker.display()),
    );
    Arc::new(shell_trigger("exit 0", overrides))
}

fn marker_path() -> std::path::PathBuf {
    std::env::temp_dir().join(format!("dag-trigger-{}", uuid::Uuid::new_v4()))
}

#[tokio::test]
async fn test_aborted_step_kills_its_children() {
    let marker = marker_path();
    let trigger = marker_trigger(&marker);
    let step = PipelineStep::new("ml_training_dag", 2);

    let handle = tokio::spawn({
        let trigger = Arc::clone(&trigger);
        let step = step.clone();
        async move { trigger.trigger(&step).await }
    });
    tokio::time::sleep(Duration::from_millis(200)).await;
    handle.abort();
    assert!(handle.await.unwrap_err().is_cancelled());
    trigger.cancel(&step).await.unwrap();

    tokio::time::sleep(Duration::from_millis(1500)).await;
    assert!(!marker.exists(), "child of an aborted step kept running");
}

#[tokio::test]
async fn test_cancel_kills_in_flight_step() {
    let marker = marker_path();
    let trigger = marker_trigger(&marker);
    let step = PipelineStep::new("ml_training_dag", 2);

    let handle = tokio::spawn({
        let trigger = Arc::clone(&trigger);
        let step = step.clone();
        async move { trigger.trigger(&step).await }
    });
    tokio::time::sleep(Duration::from_millis(200)).await;
    trigger.cancel(&step).await.unwrap();

    let result = handle.await.unwrap().unwrap();
    assert_eq!(result.status(), TriggerStatus::Failed);
    assert!(result.error().unwrap().contains("terminated by signal"));

    tokio::time::sleep(Duration::from_millis(1500)).await;
    assert!(!marker.exists(), "child of a cancelled step kept running");
}

#[tokio::test]
async fn test_cancel_without_running_step_is_noop() {
    let trigger = shell_trigger("exit 0", HashMap::new());

    trigger.cancel(&PipelineStep::new("etl_dag", 0)).await.unwrap();
    let result = trigger.trigger(&PipelineStep::new("etl_dag", 0)).await.unwrap();

    assert!(result.is_success());
}
