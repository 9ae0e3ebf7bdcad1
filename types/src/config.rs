use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::time::Duration;
use thiserror::Error;

use crate::step::{steps_from_ids, PipelineStep};

pub const DEFAULT_STEPS: &str = "etl_dag,dw_dag,ml_training_dag";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Pipeline has no steps")]
    NoSteps,

    #[error("Duplicate step id: {0}")]
    DuplicateStep(String),

    #[error("Invalid value for {key}: {value}")]
    InvalidValue { key: String, value: String },

    #[error("Missing required setting: {0}")]
    Missing(String),

    #[error("Steps {first} and {second} share the command override {key}")]
    CommandKeyCollision {
        first: String,
        second: String,
        key: String,
    },
}

/// Settings the orchestrator needs for a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    pub pipeline_id: String,
    /// Upper bound for a single step to reach a terminal state
    pub step_timeout: Option<Duration>,
}

impl OrchestratorConfig {
    pub fn new(pipeline_id: impl Into<String>) -> Self {
        Self {
            pipeline_id: pipeline_id.into(),
            step_timeout: None,
        }
    }

    pub fn with_step_timeout(mut self, timeout: Duration) -> Self {
        self.step_timeout = Some(timeout);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandBackendConfig {
    pub program: String,
    /// `{step}` is replaced with the step id
    pub args: Vec<String>,
    /// Shell commands that replace the default invocation for specific steps
    pub step_commands: HashMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KubernetesBackendConfig {
    pub image: String,
    pub namespace: String,
    pub poll_interval_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum TriggerBackend {
    Command(CommandBackendConfig),
    Kubernetes(KubernetesBackendConfig),
}

/// Master pipeline definition: identity, owner metadata and the ordered sub-pipelines
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub pipeline_id: String,
    pub description: String,
    pub owner: String,
    pub start_date: NaiveDate,
    pub retries: u32,
    pub steps: Vec<String>,
    pub step_timeout_secs: Option<u64>,
    pub backend: TriggerBackend,
    pub record_history: bool,
}

impl PipelineConfig {
    /// Load from the process environment
    pub fn from_env() -> Result<Self, ConfigError> {
        let vars: HashMap<String, String> = std::env::vars().collect();
        Self::from_lookup(|key| vars.get(key).cloned())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        let steps: Vec<String> = get("PIPELINE_STEPS", DEFAULT_STEPS)
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let start_date_raw = get("PIPELINE_START_DATE", "2025-04-01");
        let start_date = NaiveDate::parse_from_str(&start_date_raw, "%Y-%m-%d").map_err(|_| {
            ConfigError::InvalidValue {
                key: "PIPELINE_START_DATE".to_string(),
                value: start_date_raw.clone(),
            }
        })?;

        let retries = parse_number(&get("PIPELINE_RETRIES", "1"), "PIPELINE_RETRIES")?;

        let step_timeout_secs = match lookup("PIPELINE_STEP_TIMEOUT_SECS") {
            Some(raw) if !raw.trim().is_empty() => {
                match parse_number::<u64>(raw.trim(), "PIPELINE_STEP_TIMEOUT_SECS")? {
                    0 => {
                        return Err(ConfigError::InvalidValue {
                            key: "PIPELINE_STEP_TIMEOUT_SECS".to_string(),
                            value: raw,
                        })
                    }
                    secs => Some(secs),
                }
            }
            _ => None,
        };

        let backend = match get("PIPELINE_TRIGGER_BACKEND", "command").as_str() {
            "command" => {
                let step_commands = steps
                    .iter()
                    .filter_map(|id| {
                        lookup(&step_command_key(id)).map(|cmd| (id.clone(), cmd))
                    })
                    .collect();

                TriggerBackend::Command(CommandBackendConfig {
                    program: get("PIPELINE_TRIGGER_PROGRAM", "airflow"),
                    args: get("PIPELINE_TRIGGER_ARGS", "dags test {step}")
                        .split_whitespace()
                        .map(str::to_string)
                        .collect(),
                    step_commands,
                })
            }
            "kubernetes" => TriggerBackend::Kubernetes(KubernetesBackendConfig {
                image: lookup("PIPELINE_K8S_IMAGE")
                    .ok_or_else(|| ConfigError::Missing("PIPELINE_K8S_IMAGE".to_string()))?,
                namespace: get("K8S_NAMESPACE", "default"),
                poll_interval_ms: parse_number(
                    &get("PIPELINE_K8S_POLL_INTERVAL_MS", "5000"),
                    "PIPELINE_K8S_POLL_INTERVAL_MS",
                )?,
            }),
            other => {
                return Err(ConfigError::InvalidValue {
                    key: "PIPELINE_TRIGGER_BACKEND".to_string(),
                    value: other.to_string(),
                })
            }
        };

        let record_history = parse_flag(
            &get("PIPELINE_RECORD_HISTORY", "false"),
            "PIPELINE_RECORD_HISTORY",
        )?;

        let config = Self {
            pipeline_id: get("PIPELINE_ID", "pipeline_dag"),
            description: get(
                "PIPELINE_DESCRIPTION",
                "Master pipeline triggering ETL, DW and ML DAGs",
            ),
            owner: get("PIPELINE_OWNER", "harry"),
            start_date,
            retries,
            steps,
            step_timeout_secs,
            backend,
            record_history,
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.steps.is_empty() {
            return Err(ConfigError::NoSteps);
        }

        let mut seen = HashSet::new();
        for id in &self.steps {
            if !seen.insert(id.as_str()) {
                return Err(ConfigError::DuplicateStep(id.clone()));
            }
        }

        // Overrides are looked up by normalized key, so `dw-dag` and `dw_dag` would
        // read the same variable
        let mut keys: HashMap<String, &str> = HashMap::new();
        for id in &self.steps {
            let key = step_command_key(id);
            if let Some(first) = keys.insert(key.clone(), id.as_str()) {
                return Err(ConfigError::CommandKeyCollision {
                    first: first.to_string(),
                    second: id.clone(),
                    key,
                });
            }
        }

        Ok(())
    }

    pub fn pipeline_steps(&self) -> Vec<PipelineStep> {
        steps_from_ids(self.steps.iter().cloned())
    }

    pub fn orchestrator_config(&self) -> OrchestratorConfig {
        OrchestratorConfig {
            pipeline_id: self.pipeline_id.clone(),
            step_timeout: self.step_timeout_secs.map(Duration::from_secs),
        }
    }
}

/// `ml_training_dag` -> `PIPELINE_STEP_ML_TRAINING_DAG_COMMAND`
pub fn step_command_key(step_id: &str) -> String {
    let normalized: String = step_id
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_uppercase()
            } else {
                '_'
            }
        })
        .collect();
    format!("PIPELINE_STEP_{}_COMMAND", normalized)
}

fn parse_number<T: std::str::FromStr>(raw: &str, key: &str) -> Result<T, ConfigError> {
    raw.parse().map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        value: raw.to_string(),
    })
}

fn parse_flag(raw: &str, key: &str) -> Result<bool, ConfigError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            value: raw.to_string(),
        }),
    }
}
