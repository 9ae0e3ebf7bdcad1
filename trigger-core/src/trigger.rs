use async_trait::async_trait;
use types::{PipelineStep, TriggerResult};

use crate::error::Result;

/// Starts a named sub-pipeline and resolves once it reaches a terminal state
#[async_trait]
pub trait DagTrigger: Send + Sync {
    async fn trigger(&self, step: &PipelineStep) -> Result<TriggerResult>;

    /// Tear down remote work for a step whose trigger call was abandoned
    async fn cancel(&self, _step: &PipelineStep) -> Result<()> {
        Ok(())
    }
}
