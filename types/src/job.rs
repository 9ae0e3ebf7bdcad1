use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Everything needed to launch one sub-pipeline as a Kubernetes Job
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubPipelineJobSpec {
    pub step_id: String,
    pub pipeline_id: String,
    pub job_name: String,
    pub namespace: String,
    pub image_path: String,
    pub command: Option<Vec<String>>,
    pub args: Option<Vec<String>>,
    pub environment_variables: HashMap<String, String>,
    pub labels: HashMap<String, String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct K8sJobStatus {
    pub active: i32,
    pub succeeded: i32,
    pub failed: i32,
    pub start_time: Option<String>,
    pub completion_time: Option<String>,
    pub conditions: Option<Vec<K8sJobCondition>>,
}

impl K8sJobStatus {
    pub fn is_succeeded(&self) -> bool {
        self.succeeded > 0
    }

    pub fn is_failed(&self) -> bool {
        self.failed > 0
    }

    /// First condition message, used as failure detail when present
    pub fn condition_message(&self) -> Option<&str> {
        self.conditions
            .as_ref()?
            .iter()
            .find_map(|c| c.message.as_deref())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct K8sJobCondition {
    pub condition_type: String,
    pub status: String,
    pub last_probe_time: Option<String>,
    pub last_transition_time: Option<String>,
    pub reason: Option<String>,
    pub message: Option<String>,
}

/// Kubernetes object names are DNS-1123 labels: lowercase alphanumerics and '-',
/// at most 63 characters.
pub fn k8s_job_name(pipeline_id: &str, step_id: &str, suffix: &str) -> String {
    let raw = format!("{}-{}-{}", pipeline_id, step_id, suffix);
    let mut name: String = raw
        .to_lowercase()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '-' })
        .collect();

    if name.len() > 63 {
        // keep the suffix, it disambiguates repeated runs
        let keep = 63 - suffix.len() - 1;
        name = format!("{}-{}", &name[..keep], suffix.to_lowercase());
    }

    name.trim_matches('-').to_string()
}
