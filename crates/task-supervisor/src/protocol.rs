//! Wire protocol between orchestrator and agent
//!
//! One JSON [`Request`] per websocket text message, answered by exactly one
//! JSON [`Response`].

use crate::error::{Error, Result};
use program_executor::Program;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Address of one task on an agent
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TaskRef {
    /// Cluster name
    pub cluster: String,
    /// Job name
    pub job: String,
    /// Task id
    pub task_id: u32,
}

impl TaskRef {
    /// Create a task reference
    pub fn new(cluster: impl Into<String>, job: impl Into<String>, task_id: u32) -> Self {
        Self {
            cluster: cluster.into(),
            job: job.into(),
            task_id,
        }
    }

    /// Reference to the task a program describes
    pub fn of(program: &Program) -> Self {
        Self::new(&program.cluster, &program.job, program.task_id)
    }

    /// Record key, same as [`Program::key`]
    pub fn key(&self) -> String {
        format!("{}/{}/{}", self.cluster, self.job, self.task_id)
    }
}

impl fmt::Display for TaskRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key())
    }
}

/// Agent requests
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Request {
    /// Fresh install of a rendered program
    Install {
        /// Program to install
        program: Program,
    },
    /// Refresh package and configs of an installed task, keeping its process state
    Update {
        /// New rendering of the program
        program: Program,
    },
    /// Start the task's process
    Start {
        /// Target task
        task: TaskRef,
    },
    /// Stop the task's process
    Stop {
        /// Target task
        task: TaskRef,
    },
    /// Stop then start the task's process
    Restart {
        /// Target task
        task: TaskRef,
    },
    /// Remove the task's job root and record
    Cleanup {
        /// Target task
        task: TaskRef,
    },
    /// Report the task with its observed status
    Show {
        /// Target task
        task: TaskRef,
    },
    /// Report every recorded task
    List,
}

impl Request {
    /// Short operation name for logs
    pub fn name(&self) -> &'static str {
        match self {
            Request::Install { .. } => "install",
            Request::Update { .. } => "update",
            Request::Start { .. } => "start",
            Request::Stop { .. } => "stop",
            Request::Restart { .. } => "restart",
            Request::Cleanup { .. } => "cleanup",
            Request::Show { .. } => "show",
            Request::List => "list",
        }
    }
}

/// Structured error carried in a response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorInfo {
    /// Error code
    pub code: String,
    /// Human readable message
    pub message: String,
}

/// Agent responses
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Response {
    /// Snapshot of one program
    Program {
        /// The program after the operation
        program: Program,
    },
    /// Snapshots of every recorded program
    Programs {
        /// Programs ordered by key
        programs: Vec<Program>,
    },
    /// Operation failed
    Error {
        /// What went wrong
        error: ErrorInfo,
    },
}

impl Response {
    /// Response for a single-program operation
    pub fn from_result(result: Result<Program>) -> Self {
        match result {
            Ok(program) => Response::Program { program },
            Err(e) => Response::Error { error: e.to_info() },
        }
    }

    /// Program snapshot, or the remote error
    pub fn into_program(self) -> Result<Program> {
        match self {
            Response::Program { program } => Ok(program),
            Response::Error { error } => Err(Error::Remote(error)),
            Response::Programs { .. } => Err(Error::Protocol(
                "expected a single program, got a list".to_string(),
            )),
        }
    }

    /// Program list, or the remote error
    pub fn into_programs(self) -> Result<Vec<Program>> {
        match self {
            Response::Programs { programs } => Ok(programs),
            Response::Error { error } => Err(Error::Remote(error)),
            Response::Program { .. } => Err(Error::Protocol(
                "expected a program list, got a single program".to_string(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_wire_format() {
        let request = Request::Start {
            task: TaskRef::new("hdfs_test", "namenode", 2),
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["type"], "Start");
        assert_eq!(json["task"]["task_id"], 2);
        assert_eq!(request.name(), "start");

        let back: Request = serde_json::from_str(r#"{"type":"List"}"#).unwrap();
        assert!(matches!(back, Request::List));
    }

    #[test]
    fn test_error_response_becomes_remote_error() {
        let response = Response::from_result(Err(Error::NotInstalled("c/j/0".into())));
        let json = serde_json::to_string(&response).unwrap();
        let back: Response = serde_json::from_str(&json).unwrap();

        match back.into_program() {
            Err(Error::Remote(info)) => {
                assert_eq!(info.code, "not_installed");
                assert!(info.message.contains("c/j/0"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_task_ref_matches_program_key() {
        let program = Program::new("c", "j", 7, "java", vec![]);
        assert_eq!(TaskRef::of(&program).key(), program.key());
    }
}
