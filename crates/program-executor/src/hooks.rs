//! Lifecycle hook scripts

use crate::error::ProcessError;
use crate::package::is_plain_segment;
use crate::program::Program;
use std::fs;
use std::os::unix::fs::PermissionsExt;
use tracing::{debug, info};

/// Hook run once after a fresh install
pub const POST_INSTALL: &str = "post_install";
/// Hook run before start
pub const PRE_START: &str = "pre_start";
/// Hook run after a successful start
pub const POST_START: &str = "post_start";
/// Hook run before stop
pub const PRE_STOP: &str = "pre_stop";
/// Hook run after a successful stop
pub const POST_STOP: &str = "post_stop";
/// Hook run before restart
pub const PRE_RESTART: &str = "pre_restart";
/// Hook run after a successful restart
pub const POST_RESTART: &str = "post_restart";
/// Hook run before the job root is removed
pub const PRE_CLEANUP: &str = "pre_cleanup";

const SHELL: &str = "/bin/bash";

impl Program {
    /// Run the hook registered under `name`, if any.
    ///
    /// The script is written to `hooks/<name>` in the job root and run with
    /// bash. It sees the agent's environment plus `PROGRAM_BIN`,
    /// `PROGRAM_ARGS` and `PROGRAM_DIR`.
    pub async fn exec_hook(&self, name: &str) -> Result<(), ProcessError> {
        let Some(script) = self.hooks.get(name) else {
            return Ok(());
        };
        if !is_plain_segment(name) {
            return Err(ProcessError::HookFailed {
                hook: name.to_string(),
                status: "invalid hook name".to_string(),
            });
        }
        if self.root_dir.as_os_str().is_empty() {
            return Err(ProcessError::NotInstalled(self.key()));
        }

        let dir = self.root_dir.join("hooks");
        fs::create_dir_all(&dir)?;
        let path = dir.join(name);
        fs::write(&path, script)?;
        fs::set_permissions(&path, fs::Permissions::from_mode(0o744))?;

        info!("Running hook {} for {}", name, self.key());
        let output = async_process::Command::new(SHELL)
            .arg(&path)
            .current_dir(&self.root_dir)
            .env("PROGRAM_BIN", &self.binary)
            .env("PROGRAM_ARGS", self.args.join(" "))
            .env("PROGRAM_DIR", &self.root_dir)
            .output()
            .await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ProcessError::HookFailed {
                hook: name.to_string(),
                status: format!("{}: {}", output.status, stderr.trim()),
            });
        }
        debug!(
            "Hook {} output: {}",
            name,
            String::from_utf8_lossy(&output.stdout).trim()
        );
        Ok(())
    }
}
