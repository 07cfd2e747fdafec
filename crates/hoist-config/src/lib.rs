//! # Hoist Configuration
//!
//! Cluster topology for hoist deployments.
//!
//! This crate turns the per-cluster YAML files under a configuration directory
//! into a resolved [`Cluster`]: jobs merged with their super job, hosts parsed
//! and sorted by task id, dependency clusters loaded recursively. The
//! [`render`] module expands `%{...}` placeholders against that topology.

use std::path::PathBuf;
use thiserror::Error;

pub mod parser;
pub mod render;
pub mod schema;
pub mod topology;

pub use parser::{list_clusters, load_cluster};
pub use render::RenderError;
pub use topology::{Cluster, ConfigFile, Host, Job, MainEntry, PackageSpec};

/// Configuration error types
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read a configuration file
    #[error("Failed to read {path}: {source}")]
    ReadError {
        /// File that could not be read
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// Failed to parse YAML
    #[error("Failed to parse YAML in {path}: {source}")]
    YamlError {
        /// File that failed to parse
        path: PathBuf,
        /// Underlying parser error
        #[source]
        source: serde_yaml::Error,
    },

    /// Malformed host key
    #[error("Invalid host '{key}': segment '{segment}' {reason}")]
    InvalidHost {
        /// The full host key
        key: String,
        /// The offending segment
        segment: String,
        /// What is wrong with it
        reason: String,
    },

    /// Two hosts of one job share a task id
    #[error("Job '{job}' declares task id {task_id} more than once")]
    DuplicateTaskId {
        /// Job name
        job: String,
        /// Repeated task id
        task_id: u32,
    },

    /// Two jobs of one cluster share a name
    #[error("Job '{0}' is declared more than once")]
    DuplicateJob(String),

    /// A job names a super job that is not part of the cluster
    #[error("Job '{job}' inherits from unknown job '{super_job}'")]
    UnknownSuperJob {
        /// Child job
        job: String,
        /// Missing parent
        super_job: String,
    },

    /// Merge attempted with a job that is not the declared parent
    #[error("Job '{job}' does not inherit from '{parent}'")]
    NotInherited {
        /// Child job
        job: String,
        /// Job passed as parent
        parent: String,
    },

    /// No YAML file for the requested cluster
    #[error("Cluster '{project}/{cluster}' not found")]
    ClusterNotFound {
        /// Project directory
        project: String,
        /// Cluster file stem
        cluster: String,
    },

    /// Clusters depend on each other in a loop
    #[error("Dependency cycle: {0}")]
    DependencyCycle(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

/// Result type for configuration operations
pub type Result<T> = std::result::Result<T, ConfigError>;
