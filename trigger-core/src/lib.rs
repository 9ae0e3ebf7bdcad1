pub mod command;
pub mod error;
pub mod kubernetes;
pub mod retry;
pub mod trigger;

pub use command::CommandTrigger;
pub use error::{Result, TriggerError};
pub use kubernetes::{JobLauncher, KubernetesJobTrigger};
pub use retry::RetryingTrigger;
pub use trigger::DagTrigger;
