//! Error types for the task supervisor

use crate::protocol::ErrorInfo;
use program_executor::{InstallError, ProcessError};
use thiserror::Error;

/// Task supervisor error type
#[derive(Error, Debug)]
pub enum Error {
    /// Task already has a record
    #[error("Task {0} is already installed, cleanup first")]
    AlreadyInstalled(String),

    /// Task has no record
    #[error("Task {0} is not installed")]
    NotInstalled(String),

    /// Cleanup refused because the process is alive
    #[error("Task {key} is still running as pid {pid}, stop it first")]
    StillRunning {
        /// Task key
        key: String,
        /// Live pid
        pid: i32,
    },

    /// Program installation failed
    #[error("Install failed: {0}")]
    Install(#[from] InstallError),

    /// Process lifecycle failed
    #[error("Process error: {0}")]
    Process(#[from] ProcessError),

    /// Record store error
    #[error("Store error: {0}")]
    Store(#[from] sled::Error),

    /// JSON serialization error
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// WebSocket error
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] async_tungstenite::tungstenite::Error),

    /// Unexpected message on the wire
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Error reported by a remote agent
    #[error("{}", .0.message)]
    Remote(ErrorInfo),
}

impl From<program_executor::Error> for Error {
    fn from(error: program_executor::Error) -> Self {
        match error {
            program_executor::Error::Install(e) => Error::Install(e),
            program_executor::Error::Process(e) => Error::Process(e),
        }
    }
}

impl Error {
    /// Stable machine readable code for the wire
    pub fn code(&self) -> &str {
        match self {
            Error::AlreadyInstalled(_) => "already_installed",
            Error::NotInstalled(_) => "not_installed",
            Error::StillRunning { .. } => "still_running",
            Error::Install(InstallError::PermissionDenied { .. }) => "permission_denied",
            Error::Install(InstallError::AlreadyExists { .. }) => "already_exists",
            Error::Install(InstallError::ChecksumMismatch { .. }) => "checksum_mismatch",
            Error::Install(_) => "install_failed",
            Error::Process(ProcessError::AlreadyRunning { .. }) => "already_running",
            Error::Process(ProcessError::StartFailed { .. }) => "start_failed",
            Error::Process(ProcessError::StopFailed { .. }) => "stop_failed",
            Error::Process(ProcessError::HookFailed { .. }) => "hook_failed",
            Error::Process(_) => "process_failed",
            Error::Store(_) => "store_error",
            Error::Json(_) | Error::Protocol(_) | Error::WebSocket(_) => "protocol_error",
            Error::Io(_) => "io_error",
            Error::Remote(info) => &info.code,
        }
    }

    /// Wire form of this error
    pub fn to_info(&self) -> ErrorInfo {
        match self {
            Error::Remote(info) => info.clone(),
            other => ErrorInfo {
                code: other.code().to_string(),
                message: other.to_string(),
            },
        }
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;
