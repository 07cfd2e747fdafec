//! Process lifecycle for installed programs

use crate::error::ProcessError;
use crate::program::{Program, ProgramStatus};
use async_process::Stdio;
use nix::errno::Errno;
use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use serde::{Deserialize, Serialize};
use smol::Timer;
use std::fs::OpenOptions;
use std::os::unix::process::CommandExt;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Bounds for the liveness polling done by start and stop
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LifecycleTimeouts {
    /// How long a new process must stay alive to count as started
    pub start_confirm: Duration,
    /// How long to wait for a process to exit after SIGTERM
    pub stop_timeout: Duration,
    /// Delay between liveness checks
    pub poll_interval: Duration,
}

impl Default for LifecycleTimeouts {
    fn default() -> Self {
        Self {
            start_confirm: Duration::from_secs(1),
            stop_timeout: Duration::from_secs(5),
            poll_interval: Duration::from_millis(50),
        }
    }
}

/// Whether a process with this pid exists
pub fn is_alive(pid: i32) -> bool {
    if pid <= 0 {
        return false;
    }
    matches!(
        signal::kill(Pid::from_raw(pid), None),
        Ok(()) | Err(Errno::EPERM)
    )
}

impl Program {
    /// Recorded pid, if that process is still alive
    pub fn live_pid(&self) -> Option<i32> {
        self.pid.filter(|pid| is_alive(*pid))
    }

    /// Copy of this program with its status replaced by observed liveness
    pub fn observed(&self) -> Program {
        let mut snapshot = self.clone();
        snapshot.status = if self.live_pid().is_some() {
            ProgramStatus::Running
        } else {
            ProgramStatus::Stopped
        };
        snapshot
    }

    /// Launch the program detached in its own process group.
    ///
    /// Output goes to `stdout/stdout.log` and `stdout/stderr.log` in the job
    /// root. The process must survive `start_confirm` to be recorded as
    /// running.
    pub async fn start(&mut self, timeouts: &LifecycleTimeouts) -> Result<(), ProcessError> {
        if let Some(pid) = self.live_pid() {
            return Err(ProcessError::AlreadyRunning { pid });
        }
        if self.root_dir.as_os_str().is_empty() {
            return Err(ProcessError::NotInstalled(self.key()));
        }

        let (stdout_path, stderr_path) = self.log_paths();
        let open_log = |path: &PathBuf| OpenOptions::new().create(true).append(true).open(path);
        let stdout = open_log(&stdout_path)?;
        let stderr = open_log(&stderr_path)?;

        let mut command = std::process::Command::new(&self.binary);
        command
            .args(&self.args)
            .current_dir(&self.root_dir)
            .stdin(std::process::Stdio::null())
            .stdout(stdout)
            .stderr(stderr)
            .process_group(0);

        let mut child = async_process::Command::from(command)
            .spawn()
            .map_err(|e| ProcessError::SpawnFailed {
                binary: self.binary.clone(),
                reason: e.to_string(),
            })?;
        let pid = i32::try_from(child.id()).map_err(|_| ProcessError::SpawnFailed {
            binary: self.binary.clone(),
            reason: format!("pid {} out of range", child.id()),
        })?;
        info!("Started {} as pid {}", self.key(), pid);

        // Reap in the background so an exited child does not linger as a zombie
        let key = self.key();
        smol::spawn(async move {
            match child.status().await {
                Ok(status) => debug!("{} (pid {}) exited: {}", key, pid, status),
                Err(e) => warn!("Failed to wait for {} (pid {}): {}", key, pid, e),
            }
        })
        .detach();

        self.pid = Some(pid);
        let deadline = Instant::now() + timeouts.start_confirm;
        while Instant::now() < deadline {
            Timer::after(timeouts.poll_interval).await;
            if !is_alive(pid) {
                self.status = ProgramStatus::Stopped;
                return Err(ProcessError::StartFailed {
                    pid,
                    log: stderr_path,
                });
            }
        }

        self.status = ProgramStatus::Running;
        Ok(())
    }

    /// Send SIGTERM and wait for the process to exit.
    ///
    /// A program whose process is already gone is simply marked stopped.
    pub async fn stop(&mut self, timeouts: &LifecycleTimeouts) -> Result<(), ProcessError> {
        let Some(pid) = self.live_pid() else {
            debug!("{} has no live process", self.key());
            self.status = ProgramStatus::Stopped;
            return Ok(());
        };

        match signal::kill(Pid::from_raw(pid), Signal::SIGTERM) {
            Ok(()) | Err(Errno::ESRCH) => {}
            Err(e) => {
                return Err(ProcessError::SignalFailed {
                    pid,
                    signal: Signal::SIGTERM.to_string(),
                    reason: e.to_string(),
                });
            }
        }

        let deadline = Instant::now() + timeouts.stop_timeout;
        loop {
            if !is_alive(pid) {
                info!("Stopped {} (pid {})", self.key(), pid);
                self.status = ProgramStatus::Stopped;
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(ProcessError::StopFailed { pid });
            }
            Timer::after(timeouts.poll_interval).await;
        }
    }

    /// Stop, then start only if the stop succeeded
    pub async fn restart(&mut self, timeouts: &LifecycleTimeouts) -> Result<(), ProcessError> {
        self.stop(timeouts).await?;
        self.start(timeouts).await
    }

    /// Run the program in the foreground with inherited stdio
    pub async fn run_foreground(&self, extra_args: &[String]) -> Result<(), ProcessError> {
        let mut command = async_process::Command::new(&self.binary);
        command
            .args(&self.args)
            .args(extra_args)
            .stdin(Stdio::inherit())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit());
        if !self.root_dir.as_os_str().is_empty() {
            command.current_dir(&self.root_dir);
        }

        let status = command
            .status()
            .await
            .map_err(|e| ProcessError::SpawnFailed {
                binary: self.binary.clone(),
                reason: e.to_string(),
            })?;
        if !status.success() {
            return Err(ProcessError::ExitFailure {
                binary: self.binary.clone(),
                status: status.to_string(),
            });
        }
        Ok(())
    }
}
