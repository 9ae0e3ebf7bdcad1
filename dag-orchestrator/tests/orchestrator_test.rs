// Unit tests for the trigger orchestrator

use async_trait::async_trait;
use dag_orchestrator::{OrchestratorError, TriggerOrchestrator};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use trigger_core::{DagTrigger, TriggerError};
use types::{
    steps_from_ids, OrchestratorConfig, PipelineStep, RunEvent, RunState, RunStatus,
    TriggerResult, TriggerStatus,
};

#[derive(Clone, Copy)]
enum Behavior {
    Succeed,
    Fail(&'static str),
    Error(&'static str),
    Panic,
    Hang,
}

/// Deterministic trigger double that records every call
struct StubTrigger {
    behaviors: HashMap<String, Behavior>,
    calls: Mutex<Vec<String>>,
    cancels: Mutex<Vec<String>>,
}

impl StubTrigger {
    fn new(behaviors: &[(&str, Behavior)]) -> Arc<Self> {
        Arc::new(Self {
            behaviors: behaviors
                .iter()
                .map(|(id, b)| (id.to_string(), *b))
                .collect(),
            calls: Mutex::new(Vec::new()),
            cancels: Mutex::new(Vec::new()),
        })
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn cancels(&self) -> Vec<String> {
        self.cancels.lock().unwrap().clone()
    }
}

#[async_trait]
impl DagTrigger for StubTrigger {
    async fn trigger(&self, step: &PipelineStep) -> trigger_core::Result<TriggerResult> {
        self.calls.lock().unwrap().push(step.id.clone());

        match self.behaviors.get(&step.id).copied().unwrap_or(Behavior::Succeed) {
            Behavior::Succeed => Ok(TriggerResult::succeeded(&step.id)),
            Behavior::Fail(detail) => Ok(TriggerResult::failed(&step.id, detail)),
            Behavior::Error(detail) => Err(TriggerError::faulted(&step.id, detail)),
            Behavior::Panic => panic!("scheduler client blew up"),
            Behavior::Hang => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok(TriggerResult::succeeded(&step.id))
            }
        }
    }

    async fn cancel(&self, step: &PipelineStep) -> trigger_core::Result<()> {
        self.cancels.lock().unwrap().push(step.id.clone());
        Ok(())
    }
}

fn master_steps() -> Vec<PipelineStep> {
    steps_from_ids(["etl_dag", "dw_dag", "ml_training_dag"])
}

fn orchestrator(stub: &Arc<StubTrigger>) -> TriggerOrchestrator {
    TriggerOrchestrator::new(
        OrchestratorConfig::new("pipeline_dag"),
        Arc::clone(stub) as Arc<dyn DagTrigger>,
    )
}

#[tokio::test]
async fn test_all_steps_succeed_in_order() {
    let stub = StubTrigger::new(&[]);

    let outcome = orchestrator(&stub).run(&master_steps()).await.unwrap();

    assert_eq!(outcome.status(), RunStatus::Succeeded);
    assert_eq!(outcome.failed_step(), None);
    let ids: Vec<_> = outcome.results().iter().map(|r| r.step_id()).collect();
    assert_eq!(ids, vec!["etl_dag", "dw_dag", "ml_training_dag"]);
    assert!(outcome
        .results()
        .iter()
        .all(|r| r.status() == TriggerStatus::Succeeded));
    assert_eq!(stub.calls(), vec!["etl_dag", "dw_dag", "ml_training_dag"]);
}

#[tokio::test]
async fn test_failure_on_dw_dag_halts_before_ml_training() {
    let stub = StubTrigger::new(&[("dw_dag", Behavior::Fail("load into warehouse failed"))]);

    let outcome = orchestrator(&stub).run(&master_steps()).await.unwrap();

    assert_eq!(outcome.status(), RunStatus::Failed);
    assert_eq!(outcome.results().len(), 2);
    assert_eq!(outcome.failed_step(), Some("dw_dag"));
    assert_eq!(
        outcome.failure().and_then(|r| r.error()),
        Some("load into warehouse failed")
    );
    assert_eq!(stub.calls(), vec!["etl_dag", "dw_dag"]);
}

#[tokio::test]
async fn test_failure_at_each_position_records_exactly_k_results() {
    let ids = ["extract", "transform", "load", "publish", "notify"];
    let steps = steps_from_ids(ids);

    for k in 1..=ids.len() {
        let failing = ids[k - 1];
        let stub = StubTrigger::new(&[(failing, Behavior::Fail("boom"))]);

        let outcome = orchestrator(&stub).run(&steps).await.unwrap();

        assert_eq!(outcome.status(), RunStatus::Failed);
        assert_eq!(outcome.results().len(), k);
        assert_eq!(outcome.failed_step(), Some(failing));
        assert_eq!(stub.calls().len(), k, "steps after {} must not run", failing);
    }
}

#[tokio::test]
async fn test_identical_runs_produce_identical_outcomes() {
    let stub = StubTrigger::new(&[("ml_training_dag", Behavior::Fail("exit code 1"))]);
    let orchestrator = orchestrator(&stub);

    let first = orchestrator.run(&master_steps()).await.unwrap();
    let second = orchestrator.run(&master_steps()).await.unwrap();

    assert_eq!(first, second);
}

#[tokio::test]
async fn test_step_timeout_yields_timed_out_and_halts() {
    let stub = StubTrigger::new(&[("dw_dag", Behavior::Hang)]);
    let orchestrator = TriggerOrchestrator::new(
        OrchestratorConfig::new("pipeline_dag").with_step_timeout(Duration::from_millis(50)),
        Arc::clone(&stub) as Arc<dyn DagTrigger>,
    );

    let outcome = orchestrator.run(&master_steps()).await.unwrap();

    assert_eq!(outcome.status(), RunStatus::Failed);
    assert_eq!(outcome.results().len(), 2);
    let failure = outcome.failure().unwrap();
    assert_eq!(failure.step_id(), "dw_dag");
    assert_eq!(failure.status(), TriggerStatus::TimedOut);
    assert!(failure.error().unwrap().contains("50ms"));
    assert_eq!(stub.calls(), vec!["etl_dag", "dw_dag"]);
    assert_eq!(stub.cancels(), vec!["dw_dag"]);
}

#[tokio::test]
async fn test_trigger_error_becomes_failed_result() {
    let stub = StubTrigger::new(&[("etl_dag", Behavior::Error("scheduler unreachable"))]);

    let outcome = orchestrator(&stub).run(&master_steps()).await.unwrap();

    assert_eq!(outcome.status(), RunStatus::Failed);
    assert_eq!(outcome.results().len(), 1);
    let failure = outcome.failure().unwrap();
    assert_eq!(failure.status(), TriggerStatus::Failed);
    let detail = failure.error().unwrap();
    assert!(!detail.is_empty());
    assert!(detail.contains("scheduler unreachable"));
    assert_eq!(stub.calls(), vec!["etl_dag"]);
}

#[tokio::test]
async fn test_trigger_panic_becomes_failed_result() {
    let stub = StubTrigger::new(&[("dw_dag", Behavior::Panic)]);

    let outcome = orchestrator(&stub).run(&master_steps()).await.unwrap();

    assert_eq!(outcome.failed_step(), Some("dw_dag"));
    let failure = outcome.failure().unwrap();
    assert_eq!(failure.status(), TriggerStatus::Failed);
    assert!(failure.error().unwrap().contains("scheduler client blew up"));
    assert_eq!(stub.calls(), vec!["etl_dag", "dw_dag"]);
}

#[tokio::test]
async fn test_cancel_in_flight_step() {
    let stub = StubTrigger::new(&[("dw_dag", Behavior::Hang)]);
    let orchestrator = orchestrator(&stub);

    let token = CancellationToken::new();
    let canceller = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        canceller.cancel();
    });

    let outcome = orchestrator
        .run_until_cancelled(&master_steps(), token)
        .await
        .unwrap();

    assert_eq!(outcome.status(), RunStatus::Failed);
    assert_eq!(outcome.results().len(), 2);
    assert_eq!(outcome.failure().unwrap().status(), TriggerStatus::Cancelled);
    assert_eq!(stub.calls(), vec!["etl_dag", "dw_dag"]);
    assert_eq!(stub.cancels(), vec!["dw_dag"]);
}

#[tokio::test]
async fn test_cancelled_before_start_triggers_nothing() {
    let stub = StubTrigger::new(&[]);
    let token = CancellationToken::new();
    token.cancel();

    let outcome = orchestrator(&stub)
        .run_until_cancelled(&master_steps(), token)
        .await
        .unwrap();

    assert_eq!(outcome.status(), RunStatus::Failed);
    assert_eq!(outcome.results().len(), 1);
    assert_eq!(outcome.failed_step(), Some("etl_dag"));
    assert_eq!(outcome.results()[0].status(), TriggerStatus::Cancelled);
    assert!(stub.calls().is_empty());
}

#[tokio::test]
async fn test_invalid_input_triggers_nothing() {
    let stub = StubTrigger::new(&[]);
    let orchestrator = orchestrator(&stub);

    assert_eq!(orchestrator.run(&[]).await, Err(OrchestratorError::NoSteps));

    let duplicated = steps_from_ids(["etl_dag", "etl_dag"]);
    assert_eq!(
        orchestrator.run(&duplicated).await,
        Err(OrchestratorError::DuplicateStep("etl_dag".to_string()))
    );

    assert!(stub.calls().is_empty());
}

#[tokio::test]
async fn test_events_follow_state_machine() {
    let stub = StubTrigger::new(&[("dw_dag", Behavior::Fail("boom"))]);
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    let orchestrator = TriggerOrchestrator::new_with_channel(
        OrchestratorConfig::new("pipeline_dag"),
        Arc::clone(&stub) as Arc<dyn DagTrigger>,
        Some(tx),
    );

    orchestrator.run(&master_steps()).await.unwrap();
    drop(orchestrator);

    let mut states = Vec::new();
    let mut finished = Vec::new();
    while let Some(event) = rx.recv().await {
        match event {
            RunEvent::StateChanged { state, .. } => states.push(state),
            RunEvent::StepFinished { result, .. } => finished.push(result),
            RunEvent::StepStarted { .. } => {}
        }
    }

    assert_eq!(
        states,
        vec![
            RunState::Pending,
            RunState::Running { index: 0 },
            RunState::Running { index: 1 },
            RunState::Failed,
        ]
    );
    assert_eq!(
        finished,
        vec![
            TriggerResult::succeeded("etl_dag"),
            TriggerResult::failed("dw_dag", "boom"),
        ]
    );
}
