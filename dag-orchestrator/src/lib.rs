pub mod database;
pub mod error;
pub mod orchestrator;
pub mod runner;

pub use database::{PipelineRunRecord, RunHistoryRepository, RunRecordStatus};
pub use error::{OrchestratorError, Result};
pub use orchestrator::{validate_steps, TriggerOrchestrator};
pub use runner::{CompletedRun, PipelineRunner};
