//! Host-local supervisor agent for hoist tasks
//!
//! The [`Agent`] owns the lifecycle of every task installed on its host and
//! keeps a durable record of each one in a [`RecordStore`]. It is reachable
//! over a WebSocket API ([`AgentServer`]) that speaks the JSON [`protocol`];
//! orchestrators talk to it through a [`Transport`].
//!
//! # Architecture
//!
//! - `async-tungstenite` over `async-net` for the WebSocket API
//! - `sled` for the record store
//! - `futures::lock::Mutex` per task to serialize same-task operations

pub mod agent;
pub mod backend;
pub mod client;
pub mod config;
pub mod error;
pub mod protocol;
pub mod server;

pub use agent::Agent;
pub use backend::{MemoryStore, RecordStore, SledStore, TaskRecord};
pub use client::{Transport, WsTransport};
pub use config::AgentConfig;
pub use error::{Error, Result};
pub use protocol::{ErrorInfo, Request, Response, TaskRef};
pub use server::AgentServer;
