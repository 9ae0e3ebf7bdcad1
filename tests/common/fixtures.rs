// Test data fixtures

use types::{steps_from_ids, PipelineStep};

pub const MASTER_STEPS: [&str; 3] = ["etl_dag", "dw_dag", "ml_training_dag"];

pub fn master_steps() -> Vec<PipelineStep> {
    steps_from_ids(MASTER_STEPS)
}

/// Command backend where every step runs a trivial shell command
pub fn command_vars<'a>(overrides: &[(&'a str, &'a str)]) -> Vec<(&'a str, &'a str)> {
    let mut vars = vec![
        ("PIPELINE_TRIGGER_BACKEND", "command"),
        ("PIPELINE_STEP_ETL_DAG_COMMAND", "true"),
        ("PIPELINE_STEP_DW_DAG_COMMAND", "true"),
        ("PIPELINE_STEP_ML_TRAINING_DAG_COMMAND", "true"),
    ];
    for (key, value) in overrides {
        vars.retain(|(k, _)| k != key);
        vars.push((*key, *value));
    }
    vars
}
