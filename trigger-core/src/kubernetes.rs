use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::sleep;
use tracing::{error, info, warn};

use crate::command::tail;
use crate::error::{Result, TriggerError};
use crate::trigger::DagTrigger;
use k8s_client::{K8sClient, KubernetesError};
use types::{
    k8s_job_name, K8sJobStatus, KubernetesBackendConfig, PipelineStep, SubPipelineJobSpec,
    TriggerResult,
};

const MAX_LOG_BYTES: usize = 4000;
const MAX_CONSECUTIVE_STATUS_ERRORS: u32 = 5;

/// The Job operations the trigger needs, so it can run against a fake cluster in tests
#[async_trait]
pub trait JobLauncher: Send + Sync {
    async fn create_job(&self, spec: &SubPipelineJobSpec) -> std::result::Result<(), KubernetesError>;
    async fn get_job_status(
        &self,
        job_name: &str,
        namespace: &str,
    ) -> std::result::Result<K8sJobStatus, KubernetesError>;
    async fn delete_job(&self, job_name: &str, namespace: &str) -> std::result::Result<(), KubernetesError>;
    async fn get_pod_logs(&self, job_name: &str, namespace: &str) -> std::result::Result<String, KubernetesError>;
}

#[async_trait]
impl JobLauncher for K8sClient {
    async fn create_job(&self, spec: &SubPipelineJobSpec) -> std::result::Result<(), KubernetesError> {
        K8sClient::create_job(self, spec).await.map(|_| ())
    }

    async fn get_job_status(
        &self,
        job_name: &str,
        namespace: &str,
    ) -> std::result::Result<K8sJobStatus, KubernetesError> {
        K8sClient::get_job_status(self, job_name, namespace).await
    }

    async fn delete_job(&self, job_name: &str, namespace: &str) -> std::result::Result<(), KubernetesError> {
        K8sClient::delete_job(self, job_name, namespace).await
    }

    async fn get_pod_logs(&self, job_name: &str, namespace: &str) -> std::result::Result<String, KubernetesError> {
        K8sClient::get_pod_logs(self, job_name, namespace).await
    }
}

/// Runs each sub-pipeline as a Kubernetes Job and polls it to completion
pub struct KubernetesJobTrigger {
    launcher: Arc<dyn JobLauncher>,
    pipeline_id: String,
    config: KubernetesBackendConfig,
    /// step id -> Job name of the in-flight launch
    active_jobs: Mutex<HashMap<String, String>>,
}

impl KubernetesJobTrigger {
    pub fn new(
        launcher: Arc<dyn JobLauncher>,
        pipeline_id: impl Into<String>,
        config: KubernetesBackendConfig,
    ) -> Self {
        Self {
            launcher,
            pipeline_id: pipeline_id.into(),
            config,
            active_jobs: Mutex::new(HashMap::new()),
        }
    }

    fn job_spec(&self, step: &PipelineStep) -> SubPipelineJobSpec {
        let run_suffix = uuid::Uuid::new_v4().simple().to_string();
        SubPipelineJobSpec {
            step_id: step.id.clone(),
            pipeline_id: self.pipeline_id.clone(),
            job_name: k8s_job_name(&self.pipeline_id, &step.id, &run_suffix[..8]),
            namespace: self.config.namespace.clone(),
            image_path: self.config.image.clone(),
            command: None,
            args: None,
            environment_variables: HashMap::new(),
            labels: HashMap::new(),
        }
    }

    fn set_active(&self, step_id: &str, job_name: Option<&str>) {
        let mut active = self
            .active_jobs
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        match job_name {
            Some(name) => {
                active.insert(step_id.to_string(), name.to_string());
            }
            None => {
                active.remove(step_id);
            }
        }
    }

    fn take_active(&self, step_id: &str) -> Option<String> {
        self.active_jobs
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .remove(step_id)
    }

    async fn failure_detail(&self, job_name: &str, status: &K8sJobStatus) -> String {
        let logs = self
            .launcher
            .get_pod_logs(job_name, &self.config.namespace)
            .await
            .unwrap_or_default();

        let reason = status
            .condition_message()
            .unwrap_or("Kubernetes job failed")
            .to_string();

        let logs = tail(logs.trim(), MAX_LOG_BYTES);
        if logs.is_empty() {
            format!("{} ({})", reason, job_name)
        } else {
            format!("{} ({}): {}", reason, job_name, logs)
        }
    }
}

#[async_trait]
impl DagTrigger for KubernetesJobTrigger {
    async fn trigger(&self, step: &PipelineStep) -> Result<TriggerResult> {
        let spec = self.job_spec(step);
        let job_name = spec.job_name.clone();

        // Registered before the create call so a cancel that lands while the request
        // is in flight still deletes the Job
        self.set_active(&step.id, Some(&job_name));
        if let Err(e) = self.launcher.create_job(&spec).await {
            self.set_active(&step.id, None);
            return Err(e.into());
        }

        info!(
            step_id = step.id,
            job_name,
            namespace = self.config.namespace,
            "Sub-pipeline job launched, waiting for completion"
        );

        let poll_interval = Duration::from_millis(self.config.poll_interval_ms);
        let mut status_errors = 0;

        loop {
            match self
                .launcher
                .get_job_status(&job_name, &self.config.namespace)
                .await
            {
                Ok(status) if status.is_succeeded() => {
                    self.set_active(&step.id, None);
                    info!(step_id = step.id, job_name, "Sub-pipeline job succeeded");
                    return Ok(TriggerResult::succeeded(&step.id));
                }
                Ok(status) if status.is_failed() => {
                    self.set_active(&step.id, None);
                    let detail = self.failure_detail(&job_name, &status).await;
                    error!(step_id = step.id, job_name, "Sub-pipeline job failed");
                    return Ok(TriggerResult::failed(&step.id, detail));
                }
                Ok(_) => {
                    status_errors = 0;
                }
                Err(e) => {
                    status_errors += 1;
                    warn!(
                        error = ?e,
                        step_id = step.id,
                        job_name,
                        attempt = status_errors,
                        "Error polling sub-pipeline job"
                    );
                    if status_errors >= MAX_CONSECUTIVE_STATUS_ERRORS {
                        self.set_active(&step.id, None);
                        return Err(TriggerError::KubernetesError(e));
                    }
                }
            }

            sleep(poll_interval).await;
        }
    }

    async fn cancel(&self, step: &PipelineStep) -> Result<()> {
        if let Some(job_name) = self.take_active(&step.id) {
            warn!(step_id = step.id, job_name, "Deleting cancelled sub-pipeline job");
            self.launcher
                .delete_job(&job_name, &self.config.namespace)
                .await?;
        }
        Ok(())
    }
}
