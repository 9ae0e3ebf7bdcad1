// Common test utilities and fixtures

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;
use trigger_core::DagTrigger;
use types::{PipelineConfig, PipelineStep, TriggerResult, TriggerStatus};

pub mod fixtures;

/// Build a config the way `PipelineConfig::from_env` would from the given variables
pub fn config_from_vars(vars: &[(&str, &str)]) -> PipelineConfig {
    let vars: HashMap<String, String> = vars
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    PipelineConfig::from_lookup(|key| vars.get(key).cloned()).unwrap()
}

/// Trigger double that plays back a queue of statuses per step and records calls.
/// Steps without a script succeed.
pub struct ScriptedTrigger {
    scripts: Mutex<HashMap<String, Vec<TriggerStatus>>>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedTrigger {
    pub fn new(scripts: &[(&str, &[TriggerStatus])]) -> Self {
        Self {
            scripts: Mutex::new(
                scripts
                    .iter()
                    .map(|(id, statuses)| (id.to_string(), statuses.to_vec()))
                    .collect(),
            ),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl DagTrigger for ScriptedTrigger {
    async fn trigger(&self, step: &PipelineStep) -> trigger_core::Result<TriggerResult> {
        self.calls.lock().unwrap().push(step.id.clone());

        let status = {
            let mut scripts = self.scripts.lock().unwrap();
            match scripts.get_mut(&step.id) {
                Some(queue) if !queue.is_empty() => queue.remove(0),
                _ => TriggerStatus::Succeeded,
            }
        };

        Ok(match status {
            TriggerStatus::Succeeded => TriggerResult::succeeded(&step.id),
            other => TriggerResult::new(&step.id, other, Some(format!("{} is {}", step.id, other))),
        })
    }
}
