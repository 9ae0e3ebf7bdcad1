use async_trait::async_trait;
use std::collections::HashMap;
use std::process::Stdio;
use std::sync::{Arc, Mutex};
use tokio::process::Command;
use tracing::{debug, error, info, warn};

use crate::error::{Result, TriggerError};
use crate::trigger::DagTrigger;
use types::{CommandBackendConfig, PipelineStep, TriggerResult};

pub const STEP_PLACEHOLDER: &str = "{step}";
const MAX_DETAIL_BYTES: usize = 2000;

/// Runs each sub-pipeline as a local process, e.g. `airflow dags test <id>` or a
/// per-step shell command such as a training script
///
/// Each command runs in its own process group. Aborting the trigger call or calling
/// `cancel` kills the whole group, including anything the command started.
pub struct CommandTrigger {
    config: CommandBackendConfig,
    shell: String,
    /// step id -> process group of the in-flight command
    active_groups: Arc<Mutex<HashMap<String, u32>>>,
}

impl CommandTrigger {
    pub fn new(config: CommandBackendConfig) -> Self {
        Self {
            config,
            shell: "sh".to_string(),
            active_groups: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn with_shell(mut self, shell: impl Into<String>) -> Self {
        self.shell = shell.into();
        self
    }

    /// Program and arguments used for a step
    pub fn invocation(&self, step: &PipelineStep) -> (String, Vec<String>) {
        if let Some(command) = self.config.step_commands.get(&step.id) {
            return (self.shell.clone(), vec!["-c".to_string(), command.clone()]);
        }

        let args = self
            .config
            .args
            .iter()
            .map(|arg| arg.replace(STEP_PLACEHOLDER, &step.id))
            .collect();

        (self.config.program.clone(), args)
    }
}

#[async_trait]
impl DagTrigger for CommandTrigger {
    async fn trigger(&self, step: &PipelineStep) -> Result<TriggerResult> {
        let (program, args) = self.invocation(step);
        info!(step_id = step.id, program, args = ?args, "Launching sub-pipeline command");

        let mut command = Command::new(&program);
        command
            .args(&args)
            .env("PIPELINE_STEP_ID", &step.id)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        #[cfg(unix)]
        command.process_group(0);

        let child = command.spawn().map_err(|source| TriggerError::SpawnError {
            program: program.clone(),
            source,
        })?;

        let mut group = child
            .id()
            .map(|pid| GroupGuard::register(Arc::clone(&self.active_groups), &step.id, pid));

        let output = child.wait_with_output().await.map_err(|e| {
            TriggerError::faulted(&step.id, format!("Failed waiting for {}: {}", program, e))
        })?;

        if let Some(group) = group.as_mut() {
            group.disarm();
        }

        if output.status.success() {
            info!(step_id = step.id, "Sub-pipeline command succeeded");
            return Ok(TriggerResult::succeeded(&step.id));
        }

        let exit = match output.status.code() {
            Some(code) => format!("exit code {}", code),
            None => "terminated by signal".to_string(),
        };
        let stderr = String::from_utf8_lossy(&output.stderr);
        let stderr = tail(stderr.trim(), MAX_DETAIL_BYTES);

        error!(step_id = step.id, exit, "Sub-pipeline command failed");

        let detail = if stderr.is_empty() {
            format!("{} {}", program, exit)
        } else {
            format!("{} {}: {}", program, exit, stderr)
        };
        Ok(TriggerResult::failed(&step.id, detail))
    }

    async fn cancel(&self, step: &PipelineStep) -> Result<()> {
        let pgid = self
            .active_groups
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .remove(&step.id);

        if let Some(pgid) = pgid {
            warn!(step_id = step.id, pgid, "Killing cancelled sub-pipeline command");
            kill_process_group(pgid);
        }
        Ok(())
    }
}

/// Tracks the process group of one in-flight command. Dropped while still armed,
/// i.e. when the trigger future is aborted, it kills the group.
struct GroupGuard {
    groups: Arc<Mutex<HashMap<String, u32>>>,
    step_id: String,
    pgid: u32,
    armed: bool,
}

impl GroupGuard {
    fn register(groups: Arc<Mutex<HashMap<String, u32>>>, step_id: &str, pgid: u32) -> Self {
        groups
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(step_id.to_string(), pgid);
        Self {
            groups,
            step_id: step_id.to_string(),
            pgid,
            armed: true,
        }
    }

    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for GroupGuard {
    fn drop(&mut self) {
        {
            let mut groups = self
                .groups
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            if groups.get(&self.step_id) == Some(&self.pgid) {
                groups.remove(&self.step_id);
            }
        }

        if self.armed {
            debug!(step_id = self.step_id, pgid = self.pgid, "Killing abandoned sub-pipeline command");
            kill_process_group(self.pgid);
        }
    }
}

#[cfg(unix)]
fn kill_process_group(pgid: u32) {
    let Ok(pgid) = libc::pid_t::try_from(pgid) else {
        return;
    };
    // SAFETY: kill(2) only takes integers; a negative pid addresses the process group
    let rc = unsafe { libc::kill(-pgid, libc::SIGKILL) };
    if rc != 0 {
        debug!(
            pgid,
            error = %std::io::Error::last_os_error(),
            "Process group already gone"
        );
    }
}

#[cfg(not(unix))]
fn kill_process_group(_pgid: u32) {}

/// Last `max_bytes` of `s`, cut on a char boundary
pub(crate) fn tail(s: &str, max_bytes: usize) -> &str {
    if s.len() <= max_bytes {
        return s;
    }
    let mut start = s.len() - max_bytes;
    while !s.is_char_boundary(start) {
        start += 1;
    }
    &s[start..]
}
