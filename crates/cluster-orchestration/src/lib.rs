//! # Cluster Orchestration
//!
//! Cluster-wide operations for hoist deployments.
//!
//! An [`Orchestrator`] turns `(project, cluster, job, task)` into one request
//! per targeted task, renders every [`Program`](program_executor::Program)
//! before any host is contacted, fans the requests out to the supervisor
//! agents concurrently and reports one [`TaskResult`] per task.
//!
//! ## Example
//!
//! ```rust,no_run
//! use cluster_orchestration::{Orchestrator, OrchestratorConfig, Target};
//!
//! # async fn example() -> Result<(), cluster_orchestration::OrchestrationError> {
//! let orchestrator = Orchestrator::with_defaults(OrchestratorConfig::default());
//! let results = orchestrator
//!     .bootstrap(&Target::all("storage", "hdfs_test", "namenode"))
//!     .await?;
//! for result in &results {
//!     println!("{}: {}", result.host.to_key(), result.outcome);
//! }
//! # Ok(())
//! # }
//! ```

mod config;
mod orchestrator;
mod plan;
mod result;

pub use config::OrchestratorConfig;
pub use orchestrator::Orchestrator;
pub use plan::{ALL_TASKS, Target, build_program, select_hosts};
pub use result::{TaskOutcome, TaskResult};

/// Error types for orchestration operations
#[derive(thiserror::Error, Debug)]
pub enum OrchestrationError {
    /// Declarative input could not be loaded
    #[error("Configuration error: {0}")]
    Config(#[from] hoist_config::ConfigError),

    /// A placeholder could not be expanded
    #[error("Render error: {0}")]
    Render(#[from] hoist_config::RenderError),

    /// The cluster has no such job
    #[error("Job '{job}' not found in cluster '{cluster}'")]
    UnknownJob {
        /// Cluster name
        cluster: String,
        /// Requested job
        job: String,
    },

    /// An explicit task id has no host
    #[error("Task {task_id} not found in job '{job}'")]
    TaskNotFound {
        /// Job name
        job: String,
        /// Requested task id
        task_id: i64,
    },

    /// A supervisor call failed
    #[error("Supervisor error: {0}")]
    Supervisor(#[from] task_supervisor::Error),

    /// Local install or run failed
    #[error("Program error: {0}")]
    Program(#[from] program_executor::Error),

    /// A task did not report running after its restart
    #[error("Task {task} is {status} after start")]
    NotRunning {
        /// Task key
        task: String,
        /// Reported status
        status: program_executor::ProgramStatus,
    },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for orchestration operations
pub type Result<T> = std::result::Result<T, OrchestrationError>;
