//! Orchestrator settings

use std::path::PathBuf;

/// Where the orchestrator reads topology and fetches packages from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrchestratorConfig {
    /// Root of the `<project>/<cluster>.yaml` tree
    pub conf_dir: PathBuf,
    /// Base URL of the package repository
    pub pkg_server: String,
    /// Install root for `shell`
    pub local_dir: PathBuf,
}

impl OrchestratorConfig {
    /// Settings with the given config dir and package server
    pub fn new(conf_dir: impl Into<PathBuf>, pkg_server: impl Into<String>) -> Self {
        Self {
            conf_dir: conf_dir.into(),
            pkg_server: pkg_server.into(),
            ..Self::default()
        }
    }

    /// Replace the local install root
    pub fn with_local_dir(mut self, local_dir: impl Into<PathBuf>) -> Self {
        self.local_dir = local_dir.into();
        self
    }

    /// Package URL for an archive name
    pub fn package_url(&self, name: &str) -> String {
        format!("{}/{}", self.pkg_server.trim_end_matches('/'), name)
    }
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        let local_dir = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("hoist");
        Self {
            conf_dir: PathBuf::from("conf"),
            pkg_server: "http://127.0.0.1:8000".to_string(),
            local_dir,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_package_url_joins_without_double_slash() {
        let config = OrchestratorConfig::new("conf", "http://pkgs.local:8000/");
        assert_eq!(
            config.package_url("hadoop.tar.gz"),
            "http://pkgs.local:8000/hadoop.tar.gz"
        );
    }

    #[test]
    fn test_local_dir_override() {
        let config = OrchestratorConfig::new("conf", "http://pkgs").with_local_dir("/tmp/hoist");
        assert_eq!(config.local_dir, PathBuf::from("/tmp/hoist"));
        assert_eq!(config.conf_dir, PathBuf::from("conf"));
    }
}
