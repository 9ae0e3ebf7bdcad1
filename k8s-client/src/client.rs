use k8s_openapi::api::batch::v1::{Job, JobSpec};
use k8s_openapi::api::core::v1::{Container, EnvVar, Pod, PodSpec, PodTemplateSpec};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::{
    api::{Api, DeleteParams, ListParams, LogParams, PostParams},
    Client, Config,
};
use std::collections::BTreeMap;
use tracing::{error, info, warn};

use crate::error::{KubernetesError, Result};
use types::{K8sJobCondition, K8sJobStatus, SubPipelineJobSpec};

pub const MANAGED_BY: &str = "dag-trigger";
pub const PIPELINE_LABEL: &str = "dag-trigger.io/pipeline-id";
pub const STEP_LABEL: &str = "dag-trigger.io/step-id";

/// Kubernetes client that runs sub-pipelines as batch Jobs
pub struct K8sClient {
    client: Client,
}

impl K8sClient {
    /// Create a new Kubernetes client
    pub async fn new() -> Result<Self> {
        let config = if std::env::var("K8S_IN_CLUSTER")
            .unwrap_or_default()
            .eq_ignore_ascii_case("true")
        {
            Config::incluster().map_err(|e| {
                KubernetesError::ConfigError(format!("Failed to load in-cluster config: {}", e))
            })?
        } else {
            Config::from_kubeconfig(&Default::default())
                .await
                .map_err(|e| KubernetesError::ConfigError(format!("Failed to load kubeconfig: {}", e)))?
        };

        let client = Client::try_from(config)
            .map_err(|e| KubernetesError::ConfigError(format!("Failed to create client: {}", e)))?;

        Ok(Self { client })
    }

    /// Create the Job that runs one sub-pipeline
    pub async fn create_job(&self, spec: &SubPipelineJobSpec) -> Result<Job> {
        let job_manifest = build_job_manifest(spec);
        let jobs_api = Api::<Job>::namespaced(self.client.clone(), &spec.namespace);

        match jobs_api.create(&PostParams::default(), &job_manifest).await {
            Ok(job) => {
                info!(
                    job_name = spec.job_name,
                    namespace = spec.namespace,
                    step_id = spec.step_id,
                    "Created sub-pipeline job"
                );
                Ok(job)
            }
            Err(e) => {
                error!(error = ?e, job_name = spec.job_name, "Failed to create sub-pipeline job");
                Err(KubernetesError::CreateJobError(format!("{}", e)))
            }
        }
    }

    /// Get the status of a Kubernetes job
    pub async fn get_job_status(&self, job_name: &str, namespace: &str) -> Result<K8sJobStatus> {
        let jobs_api = Api::<Job>::namespaced(self.client.clone(), namespace);

        match jobs_api.get_status(job_name).await {
            Ok(job) => {
                let status = job.status.unwrap_or_default();
                Ok(K8sJobStatus {
                    active: status.active.unwrap_or(0),
                    succeeded: status.succeeded.unwrap_or(0),
                    failed: status.failed.unwrap_or(0),
                    start_time: status.start_time.map(|t| t.0.to_rfc3339()),
                    completion_time: status.completion_time.map(|t| t.0.to_rfc3339()),
                    conditions: status.conditions.map(|conds| {
                        conds
                            .into_iter()
                            .map(|c| K8sJobCondition {
                                condition_type: c.type_,
                                status: c.status,
                                last_probe_time: c.last_probe_time.map(|t| t.0.to_rfc3339()),
                                last_transition_time: c
                                    .last_transition_time
                                    .map(|t| t.0.to_rfc3339()),
                                reason: c.reason,
                                message: c.message,
                            })
                            .collect()
                    }),
                })
            }
            Err(e) => {
                error!(error = ?e, job_name, namespace, "Failed to get job status");
                Err(KubernetesError::GetJobStatusError(format!("{}", e)))
            }
        }
    }

    /// Delete a Kubernetes job and its pods
    pub async fn delete_job(&self, job_name: &str, namespace: &str) -> Result<()> {
        let jobs_api = Api::<Job>::namespaced(self.client.clone(), namespace);

        match jobs_api.delete(job_name, &DeleteParams::background()).await {
            Ok(_) => {
                info!(job_name, namespace, "Deleted sub-pipeline job");
                Ok(())
            }
            Err(kube::Error::Api(e)) if e.code == 404 => Ok(()),
            Err(e) => {
                error!(error = ?e, job_name, namespace, "Failed to delete job");
                Err(KubernetesError::DeleteJobError(format!("{}", e)))
            }
        }
    }

    /// Logs of the first pod of a job. Missing pods or logs yield an empty string.
    pub async fn get_pod_logs(&self, job_name: &str, namespace: &str) -> Result<String> {
        let pods_api = Api::<Pod>::namespaced(self.client.clone(), namespace);

        let label_selector = format!("job-name={}", job_name);
        let pod_list = match pods_api
            .list(&ListParams::default().labels(&label_selector))
            .await
        {
            Ok(list) => list,
            Err(e) => {
                warn!(error = ?e, job_name, namespace, "Failed to list pods");
                return Ok(String::new());
            }
        };

        let Some(pod_name) = pod_list
            .items
            .first()
            .and_then(|pod| pod.metadata.name.clone())
        else {
            return Ok(String::new());
        };

        let params = LogParams {
            container: Some(SUB_PIPELINE_CONTAINER.to_string()),
            ..Default::default()
        };

        match pods_api.logs(&pod_name, &params).await {
            Ok(logs) => Ok(logs),
            Err(e) => {
                warn!(error = ?e, job_name, namespace, "Failed to get pod logs");
                Ok(String::new())
            }
        }
    }
}

pub const SUB_PIPELINE_CONTAINER: &str = "sub-pipeline";

/// Render the Job manifest for a sub-pipeline. The Job never retries on its own;
/// retries are the trigger's decision.
pub fn build_job_manifest(spec: &SubPipelineJobSpec) -> Job {
    let ttl_seconds = std::env::var("K8S_JOB_TTL_SECONDS")
        .unwrap_or_else(|_| "3600".to_string())
        .parse::<i32>()
        .unwrap_or(3600);

    let mut labels = BTreeMap::new();
    labels.insert("app.kubernetes.io/managed-by".to_string(), MANAGED_BY.to_string());
    labels.insert(PIPELINE_LABEL.to_string(), label_value(&spec.pipeline_id));
    labels.insert(STEP_LABEL.to_string(), label_value(&spec.step_id));
    for (k, v) in &spec.labels {
        labels.insert(k.clone(), v.clone());
    }

    let mut env_vars: Vec<EnvVar> = spec
        .environment_variables
        .iter()
        .map(|(name, value)| EnvVar {
            name: name.clone(),
            value: Some(value.clone()),
            ..Default::default()
        })
        .collect();
    env_vars.push(EnvVar {
        name: "PIPELINE_ID".to_string(),
        value: Some(spec.pipeline_id.clone()),
        ..Default::default()
    });
    env_vars.push(EnvVar {
        name: "STEP_ID".to_string(),
        value: Some(spec.step_id.clone()),
        ..Default::default()
    });
    env_vars.sort_by(|a, b| a.name.cmp(&b.name));

    let container = Container {
        name: SUB_PIPELINE_CONTAINER.to_string(),
        image: Some(spec.image_path.clone()),
        command: spec.command.clone(),
        args: spec.args.clone(),
        env: Some(env_vars),
        ..Default::default()
    };

    Job {
        metadata: ObjectMeta {
            name: Some(spec.job_name.clone()),
            namespace: Some(spec.namespace.clone()),
            labels: Some(labels.clone()),
            ..Default::default()
        },
        spec: Some(JobSpec {
            ttl_seconds_after_finished: Some(ttl_seconds),
            backoff_limit: Some(0),
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta {
                    labels: Some(labels),
                    ..Default::default()
                }),
                spec: Some(PodSpec {
                    restart_policy: Some("Never".to_string()),
                    containers: vec![container],
                    ..Default::default()
                }),
            },
            ..Default::default()
        }),
        ..Default::default()
    }
}

// Label values allow at most 63 chars of [A-Za-z0-9-_.] and must start and end
// with an alphanumeric
fn label_value(raw: &str) -> String {
    let sanitized: String = raw
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.' {
                c
            } else {
                '_'
            }
        })
        .collect();

    let trimmed = sanitized.trim_matches(|c: char| !c.is_ascii_alphanumeric());
    let truncated: String = trimmed.chars().take(63).collect();
    truncated
        .trim_end_matches(|c: char| !c.is_ascii_alphanumeric())
        .to_string()
}
