use std::any::Any;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinError;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::error::{OrchestratorError, Result};
use trigger_core::{DagTrigger, TriggerError};
use types::{OrchestratorConfig, PipelineStep, RunEvent, RunOutcome, RunState, TriggerResult};

/// Triggers sub-pipelines one after another and stops at the first step that
/// does not succeed
pub struct TriggerOrchestrator {
    config: OrchestratorConfig,
    trigger: Arc<dyn DagTrigger>,
    /// Optional progress channel; runs behave the same without it
    events_tx: Option<UnboundedSender<RunEvent>>,
}

impl TriggerOrchestrator {
    pub fn new(config: OrchestratorConfig, trigger: Arc<dyn DagTrigger>) -> Self {
        Self::new_with_channel(config, trigger, None)
    }

    /// Create an orchestrator that publishes state changes and step results
    pub fn new_with_channel(
        config: OrchestratorConfig,
        trigger: Arc<dyn DagTrigger>,
        events_tx: Option<UnboundedSender<RunEvent>>,
    ) -> Self {
        Self {
            config,
            trigger,
            events_tx,
        }
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Run every step in order with fail-fast semantics
    pub async fn run(&self, steps: &[PipelineStep]) -> Result<RunOutcome> {
        self.run_until_cancelled(steps, CancellationToken::new())
            .await
    }

    /// Same as [`run`](Self::run), but a fired `cancel` token aborts the in-flight
    /// step, records it as cancelled and starts nothing further
    pub async fn run_until_cancelled(
        &self,
        steps: &[PipelineStep],
        cancel: CancellationToken,
    ) -> Result<RunOutcome> {
        validate_steps(steps)?;

        let mut state = RunState::Pending;
        self.publish(RunEvent::StateChanged {
            pipeline_id: self.config.pipeline_id.clone(),
            state,
        });

        info!(
            pipeline_id = self.config.pipeline_id,
            step_count = steps.len(),
            step_timeout = ?self.config.step_timeout,
            "Starting pipeline run"
        );

        let mut results = Vec::with_capacity(steps.len());

        for (index, step) in steps.iter().enumerate() {
            self.transition(&mut state, RunState::Running { index });

            let result = if cancel.is_cancelled() {
                TriggerResult::cancelled(&step.id, "Run cancelled before step started")
            } else {
                self.execute_step(step, &cancel).await
            };

            if result.is_success() {
                info!(
                    pipeline_id = self.config.pipeline_id,
                    step_id = step.id,
                    position = step.position,
                    "Step succeeded"
                );
            } else {
                error!(
                    pipeline_id = self.config.pipeline_id,
                    step_id = step.id,
                    position = step.position,
                    status = %result.status(),
                    error = result.error().unwrap_or_default(),
                    "Step did not succeed"
                );
            }

            self.publish(RunEvent::StepFinished {
                pipeline_id: self.config.pipeline_id.clone(),
                result: result.clone(),
            });

            let halt = !result.is_success();
            results.push(result);

            if halt {
                let skipped: Vec<&str> = steps[index + 1..].iter().map(|s| s.id.as_str()).collect();
                if !skipped.is_empty() {
                    warn!(
                        pipeline_id = self.config.pipeline_id,
                        skipped = ?skipped,
                        "Halting run, remaining steps not triggered"
                    );
                }
                break;
            }
        }

        let outcome = RunOutcome::finalize(results);

        let terminal = if outcome.is_success() {
            RunState::Succeeded
        } else {
            RunState::Failed
        };
        self.transition(&mut state, terminal);

        info!(
            pipeline_id = self.config.pipeline_id,
            status = %outcome.status(),
            failed_step = outcome.failed_step(),
            completed = outcome.results().len(),
            "Pipeline run finished"
        );

        Ok(outcome)
    }

    async fn execute_step(&self, step: &PipelineStep, cancel: &CancellationToken) -> TriggerResult {
        self.publish(RunEvent::StepStarted {
            pipeline_id: self.config.pipeline_id.clone(),
            step: step.clone(),
        });

        info!(
            pipeline_id = self.config.pipeline_id,
            step_id = step.id,
            position = step.position,
            "Triggering sub-pipeline"
        );

        // The trigger runs on its own task so a panic, a timeout or a cancellation
        // can be contained without unwinding the run
        let trigger = Arc::clone(&self.trigger);
        let owned_step = step.clone();
        let mut handle = tokio::spawn(async move { trigger.trigger(&owned_step).await });

        let step_timeout = self.config.step_timeout;
        let deadline = async move {
            match step_timeout {
                Some(timeout) => tokio::time::sleep(timeout).await,
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            biased;

            joined = &mut handle => settle(step, joined),

            _ = cancel.cancelled() => {
                handle.abort();
                let _ = handle.await;
                self.cancel_remote(step).await;
                TriggerResult::cancelled(&step.id, "Run cancelled while step was in flight")
            }

            _ = deadline => {
                handle.abort();
                let _ = handle.await;
                self.cancel_remote(step).await;
                let timeout = step_timeout.unwrap_or_default();
                TriggerResult::timed_out(
                    &step.id,
                    format!(
                        "Step {} reached no terminal state within {}ms",
                        step.id,
                        timeout.as_millis()
                    ),
                )
            }
        }
    }

    async fn cancel_remote(&self, step: &PipelineStep) {
        if let Err(e) = self.trigger.cancel(step).await {
            warn!(
                error = %e,
                pipeline_id = self.config.pipeline_id,
                step_id = step.id,
                "Failed to tear down abandoned sub-pipeline"
            );
        }
    }

    fn transition(&self, state: &mut RunState, next: RunState) {
        info!(
            pipeline_id = self.config.pipeline_id,
            from = ?state,
            to = ?next,
            "Run state changed"
        );
        *state = next;
        self.publish(RunEvent::StateChanged {
            pipeline_id: self.config.pipeline_id.clone(),
            state: next,
        });
    }

    fn publish(&self, event: RunEvent) {
        if let Some(tx) = &self.events_tx {
            let _ = tx.send(event);
        }
    }
}

/// Check the run input: at least one step, no blank ids, ids unique
pub fn validate_steps(steps: &[PipelineStep]) -> Result<()> {
    if steps.is_empty() {
        return Err(OrchestratorError::NoSteps);
    }

    let mut seen = HashSet::new();
    for (position, step) in steps.iter().enumerate() {
        if step.id.trim().is_empty() {
            return Err(OrchestratorError::InvalidStep {
                position,
                reason: "step id is blank".to_string(),
            });
        }
        if !seen.insert(step.id.as_str()) {
            return Err(OrchestratorError::DuplicateStep(step.id.clone()));
        }
    }

    Ok(())
}

/// Turn whatever the trigger task produced into the step's terminal result
fn settle(
    step: &PipelineStep,
    joined: std::result::Result<trigger_core::Result<TriggerResult>, JoinError>,
) -> TriggerResult {
    match joined {
        Ok(Ok(result)) if result.step_id() == step.id => result,
        Ok(Ok(result)) => TriggerResult::failed(
            &step.id,
            format!(
                "Trigger reported a result for {} while {} was running",
                result.step_id(),
                step.id
            ),
        ),
        Ok(Err(e)) => {
            error!(error = %e, step_id = step.id, "Trigger returned an error");
            e.into_result(&step.id)
        }
        Err(join_error) if join_error.is_panic() => {
            let message = panic_message(join_error.into_panic());
            error!(step_id = step.id, panic = %message, "Trigger panicked");
            TriggerError::faulted(&step.id, format!("trigger panicked: {}", message))
                .into_result(&step.id)
        }
        Err(join_error) => TriggerError::faulted(&step.id, join_error.to_string())
            .into_result(&step.id),
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
