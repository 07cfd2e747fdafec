//! Error types for program installation and process lifecycle

use std::path::PathBuf;
use thiserror::Error;

/// Failures while laying out a task's directory or fetching its package
#[derive(Error, Debug)]
pub enum InstallError {
    /// Job root escapes the agent root dir
    #[error("permission denied: {path} is outside the agent root dir")]
    PermissionDenied {
        /// The rejected path
        path: PathBuf,
    },

    /// Job root already present on a fresh install
    #[error("{path} already exists, cleanup first")]
    AlreadyExists {
        /// The existing job root
        path: PathBuf,
    },

    /// Downloaded archive does not hash to the expected checksum
    #[error("checksum mismatch for {package}: expected {expected}, got {actual}")]
    ChecksumMismatch {
        /// Archive name
        package: String,
        /// Checksum from the descriptor
        expected: String,
        /// Checksum of the downloaded bytes
        actual: String,
    },

    /// Package could not be downloaded
    #[error("failed to download {url}: {reason}")]
    Download {
        /// Source of the archive
        url: String,
        /// Transport or status failure
        reason: String,
    },

    /// Archive could not be unpacked
    #[error("failed to extract {package}: {reason}")]
    Extract {
        /// Archive name
        package: String,
        /// Underlying failure
        reason: String,
    },

    /// Cache slot does not hold exactly one top-level directory
    #[error("bad package layout in {slot}: {reason}")]
    BadCacheLayout {
        /// Cache slot path
        slot: PathBuf,
        /// What was found instead
        reason: String,
    },

    /// Package descriptor cannot address a cache slot
    #[error("invalid package descriptor: {0}")]
    InvalidPackage(String),

    /// I/O error
    #[error("{context}: {source}")]
    Io {
        /// What was being done
        context: String,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },
}

impl InstallError {
    /// Wrap an I/O error with a short description of the failed step
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }
}

/// Failures while starting, stopping or hooking a task's process
#[derive(Error, Debug)]
pub enum ProcessError {
    /// Recorded pid is still alive
    #[error("process {pid} is already running")]
    AlreadyRunning {
        /// Live pid
        pid: i32,
    },

    /// Failed to spawn a process
    #[error("failed to spawn {binary}: {reason}")]
    SpawnFailed {
        /// Executable
        binary: String,
        /// The reason for the spawn failure
        reason: String,
    },

    /// Process exited inside the start confirmation window
    #[error("process {pid} exited during startup, see {log}")]
    StartFailed {
        /// Pid of the short-lived process
        pid: i32,
        /// Stderr log of the task
        log: PathBuf,
    },

    /// Process survived SIGTERM past the stop timeout
    #[error("process {pid} still alive after stop timeout")]
    StopFailed {
        /// Surviving pid
        pid: i32,
    },

    /// Failed to send signal to process
    #[error("failed to send signal {signal} to {pid}: {reason}")]
    SignalFailed {
        /// Target pid
        pid: i32,
        /// The signal that failed to send
        signal: String,
        /// The reason for the signal failure
        reason: String,
    },

    /// Hook script exited non-zero
    #[error("hook {hook} failed: {status}")]
    HookFailed {
        /// Hook name
        hook: String,
        /// Exit status description
        status: String,
    },

    /// Foreground run exited non-zero
    #[error("{binary} exited with {status}")]
    ExitFailure {
        /// Executable
        binary: String,
        /// Exit status description
        status: String,
    },

    /// Task has never been installed, so it has no directory to run in
    #[error("program {0} is not installed")]
    NotInstalled(String),

    /// I/O error
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Unified error type for the executor
#[derive(Error, Debug)]
pub enum Error {
    /// Installation failure
    #[error(transparent)]
    Install(#[from] InstallError),

    /// Process lifecycle failure
    #[error(transparent)]
    Process(#[from] ProcessError),
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;
