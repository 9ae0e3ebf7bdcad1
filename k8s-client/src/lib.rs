pub mod client;
pub mod error;

pub use client::{build_job_manifest, K8sClient};
pub use error::{KubernetesError, Result};
