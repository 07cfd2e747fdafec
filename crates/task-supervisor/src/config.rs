//! Agent configuration

use program_executor::LifecycleTimeouts;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Port the agent listens on unless told otherwise
pub const DEFAULT_AGENT_PORT: u16 = 9001;

/// Settings for one supervisor agent
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Root under which job roots and the package cache live
    pub root_dir: PathBuf,
    /// Listen address (e.g., "0.0.0.0")
    pub listen_host: String,
    /// Listen port
    pub port: u16,
    /// Path of the sled record store
    pub store_path: PathBuf,
    /// Liveness polling bounds for start and stop
    #[serde(default)]
    pub timeouts: LifecycleTimeouts,
}

impl AgentConfig {
    /// Agent rooted at `root_dir`, listening on all interfaces
    pub fn new(root_dir: impl Into<PathBuf>, port: u16, store_path: impl Into<PathBuf>) -> Self {
        Self {
            root_dir: root_dir.into(),
            listen_host: "0.0.0.0".to_string(),
            port,
            store_path: store_path.into(),
            timeouts: LifecycleTimeouts::default(),
        }
    }

    /// `host:port` to bind
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.listen_host, self.port)
    }
}
