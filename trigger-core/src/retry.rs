use async_trait::async_trait;
use std::sync::Arc;
use tracing::warn;

use crate::error::{Result, TriggerError};
use crate::trigger::DagTrigger;
use types::{PipelineStep, TriggerResult, TriggerStatus};

/// Re-triggers a step that failed, up to `max_retries` extra attempts.
///
/// Timeouts and cancellations are final, as are permanent errors.
pub struct RetryingTrigger {
    inner: Arc<dyn DagTrigger>,
    max_retries: u32,
}

impl RetryingTrigger {
    pub fn new(inner: Arc<dyn DagTrigger>, max_retries: u32) -> Self {
        Self { inner, max_retries }
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }
}

pub fn should_retry_result(result: &TriggerResult, attempt: u32, max_retries: u32) -> bool {
    attempt < max_retries && result.status() == TriggerStatus::Failed
}

pub fn should_retry_error(error: &TriggerError, attempt: u32, max_retries: u32) -> bool {
    attempt < max_retries && !error.is_permanent()
}

#[async_trait]
impl DagTrigger for RetryingTrigger {
    async fn trigger(&self, step: &PipelineStep) -> Result<TriggerResult> {
        let mut attempt = 0;
        loop {
            match self.inner.trigger(step).await {
                Ok(result) if should_retry_result(&result, attempt, self.max_retries) => {
                    warn!(
                        step_id = step.id,
                        attempt = attempt + 1,
                        max_retries = self.max_retries,
                        error = result.error().unwrap_or_default(),
                        "Sub-pipeline failed, retrying"
                    );
                }
                Err(e) if should_retry_error(&e, attempt, self.max_retries) => {
                    warn!(
                        step_id = step.id,
                        attempt = attempt + 1,
                        max_retries = self.max_retries,
                        error = %e,
                        "Trigger errored, retrying"
                    );
                }
                other => return other,
            }
            attempt += 1;
        }
    }

    async fn cancel(&self, step: &PipelineStep) -> Result<()> {
        self.inner.cancel(step).await
    }
}
