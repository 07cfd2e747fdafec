//! Per-task outcomes of a cluster operation

use crate::OrchestrationError;
use hoist_config::Host;
use program_executor::Program;
use std::fmt;

/// What happened to one targeted task
#[derive(Debug)]
pub enum TaskOutcome {
    /// The operation succeeded; snapshot reported by the agent
    Done(Program),
    /// The operation failed on this task
    Failed(OrchestrationError),
    /// Skipped because an earlier task of a rolling update failed
    NotAttempted,
}

/// Outcome for the task running on `host`
#[derive(Debug)]
pub struct TaskResult {
    /// Host the task is bound to
    pub host: Host,
    /// Outcome
    pub outcome: TaskOutcome,
}

impl TaskResult {
    /// Result from a finished call
    pub fn new(host: Host, result: crate::Result<Program>) -> Self {
        let outcome = match result {
            Ok(program) => TaskOutcome::Done(program),
            Err(e) => TaskOutcome::Failed(e),
        };
        Self { host, outcome }
    }

    /// Result for a task that was never contacted
    pub fn not_attempted(host: Host) -> Self {
        Self {
            host,
            outcome: TaskOutcome::NotAttempted,
        }
    }

    /// Task id of the host
    pub fn task_id(&self) -> u32 {
        self.host.task_id
    }

    /// True when the operation succeeded
    pub fn is_done(&self) -> bool {
        matches!(self.outcome, TaskOutcome::Done(_))
    }

    /// Program snapshot of a successful operation
    pub fn program(&self) -> Option<&Program> {
        match &self.outcome {
            TaskOutcome::Done(program) => Some(program),
            _ => None,
        }
    }
}

impl fmt::Display for TaskOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskOutcome::Done(program) => match program.pid {
                Some(pid) => write!(f, "{} (pid {})", program.status, pid),
                None => write!(f, "{}", program.status),
            },
            TaskOutcome::Failed(e) => write!(f, "failed: {e}"),
            TaskOutcome::NotAttempted => write!(f, "not attempted"),
        }
    }
}
