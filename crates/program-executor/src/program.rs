//! Host-bound execution descriptor for one task

use crate::error::InstallError;
use crate::package::{PackageCache, PackageFetcher, PackageRef, is_plain_segment, package_dir};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Replaced with the agent root dir in config names, config bodies and args
pub const AGENT_ROOT_DIR_VAR: &str = "$AGENT_ROOT_DIR";

/// Replaced with the task id in config names, config bodies and args
pub const TASK_ID_VAR: &str = "$TASK_ID";

/// Subdirectories created in every job root
pub const JOB_SUBDIRS: [&str; 4] = ["data", "log", "conf", "stdout"];

/// Last known state of a program's process
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProgramStatus {
    /// Started and confirmed alive
    Running,
    /// Never started, or stopped
    #[default]
    Stopped,
}

impl fmt::Display for ProgramStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProgramStatus::Running => write!(f, "Running"),
            ProgramStatus::Stopped => write!(f, "Stopped"),
        }
    }
}

/// How [`Program::install`] treats an existing job root
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InstallMode {
    /// The job root must not exist yet
    Fresh,
    /// Reuse the job root, refreshing the package link and configs
    Refresh,
}

/// Fully rendered program for one task of a job
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Program {
    /// Cluster name
    pub cluster: String,
    /// Job name
    pub job: String,
    /// Task id within the job
    pub task_id: u32,
    /// Executable to launch
    pub binary: String,
    /// Rendered arguments
    pub args: Vec<String>,
    /// Rendered config bodies keyed by file path
    #[serde(default)]
    pub configs: BTreeMap<String, String>,
    /// Package the program runs from
    #[serde(default)]
    pub package: Option<PackageRef>,
    /// Hook scripts keyed by hook name
    #[serde(default)]
    pub hooks: BTreeMap<String, String>,
    /// Pid of the last started process
    #[serde(default)]
    pub pid: Option<i32>,
    /// Last known status
    #[serde(default)]
    pub status: ProgramStatus,
    /// Job root, set by install
    #[serde(default)]
    pub root_dir: PathBuf,
}

impl Program {
    /// Create a program with no package, configs or hooks
    pub fn new(
        cluster: impl Into<String>,
        job: impl Into<String>,
        task_id: u32,
        binary: impl Into<String>,
        args: Vec<String>,
    ) -> Self {
        Self {
            cluster: cluster.into(),
            job: job.into(),
            task_id,
            binary: binary.into(),
            args,
            configs: BTreeMap::new(),
            package: None,
            hooks: BTreeMap::new(),
            pid: None,
            status: ProgramStatus::Stopped,
            root_dir: PathBuf::new(),
        }
    }

    /// `cluster/job/task_id`
    pub fn key(&self) -> String {
        format!("{}/{}/{}", self.cluster, self.job, self.task_id)
    }

    /// `<root_dir>/<cluster>/<job>.<task_id>`, refusing anything that escapes `root_dir`
    pub fn job_root(&self, root_dir: &Path) -> Result<PathBuf, InstallError> {
        let leaf = format!("{}.{}", self.job, self.task_id);
        let path = root_dir.join(&self.cluster).join(&leaf);
        if !is_plain_segment(&self.cluster) || !is_plain_segment(&leaf) {
            return Err(InstallError::PermissionDenied { path });
        }
        Ok(path)
    }

    /// Stdout and stderr log paths inside the job root
    pub fn log_paths(&self) -> (PathBuf, PathBuf) {
        let dir = self.root_dir.join("stdout");
        (dir.join("stdout.log"), dir.join("stderr.log"))
    }

    /// Substitute agent-side variables in config names, bodies and args
    pub fn apply_agent_vars(&mut self, agent_root: &Path) {
        let root = agent_root.display().to_string();
        let task_id = self.task_id.to_string();
        let substitute = |value: &str| {
            value
                .replace(AGENT_ROOT_DIR_VAR, &root)
                .replace(TASK_ID_VAR, &task_id)
        };

        self.configs = self
            .configs
            .iter()
            .map(|(name, body)| (substitute(name), substitute(body)))
            .collect();
        self.args = self.args.iter().map(|arg| substitute(arg)).collect();
    }

    /// Lay out the job root under `root_dir`.
    ///
    /// Creates the standard subdirs, links `pkg` to the cached package
    /// content and writes every config. On success `root_dir` of the program
    /// points at the job root. A failed fresh install removes the job root
    /// it created.
    pub async fn install(
        &mut self,
        root_dir: &Path,
        fetcher: Arc<dyn PackageFetcher>,
        mode: InstallMode,
    ) -> Result<(), InstallError> {
        let job_root = self.job_root(root_dir)?;
        if mode == InstallMode::Fresh && job_root.exists() {
            return Err(InstallError::AlreadyExists { path: job_root });
        }
        info!("Installing {} into {}", self.key(), job_root.display());

        self.apply_agent_vars(root_dir);

        let result = self.lay_out(root_dir, &job_root, fetcher).await;
        if result.is_err() && mode == InstallMode::Fresh {
            if let Err(e) = fs::remove_dir_all(&job_root) {
                warn!("Failed to remove {}: {}", job_root.display(), e);
            }
        }
        result
    }

    async fn lay_out(
        &mut self,
        root_dir: &Path,
        job_root: &Path,
        fetcher: Arc<dyn PackageFetcher>,
    ) -> Result<(), InstallError> {
        for dir in JOB_SUBDIRS {
            let path = job_root.join(dir);
            fs::create_dir_all(&path)
                .map_err(|e| InstallError::io(format!("creating {}", path.display()), e))?;
        }

        if let Some(package) = self.package.clone() {
            let cache = PackageCache::new(root_dir);
            let slot = smol::unblock(move || cache.ensure(&package, fetcher.as_ref())).await?;
            let content = package_dir(&slot)?;
            link_package(&job_root.join("pkg"), &content)?;
        }

        for (name, body) in &self.configs {
            let path = config_path(job_root, name);
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)
                    .map_err(|e| InstallError::io(format!("creating {}", parent.display()), e))?;
            }
            debug!("Writing config {}", path.display());
            fs::write(&path, body)
                .map_err(|e| InstallError::io(format!("writing {}", path.display()), e))?;
        }

        self.root_dir = job_root.to_path_buf();
        Ok(())
    }
}

/// Absolute names are used verbatim, anything else lands in `conf/`
pub fn config_path(job_root: &Path, name: &str) -> PathBuf {
    let path = Path::new(name);
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        job_root.join("conf").join(path)
    }
}

fn link_package(link: &Path, target: &Path) -> Result<(), InstallError> {
    if fs::symlink_metadata(link).is_ok() {
        fs::remove_file(link)
            .map_err(|e| InstallError::io(format!("replacing {}", link.display()), e))?;
    }
    std::os::unix::fs::symlink(target, link)
        .map_err(|e| InstallError::io(format!("linking {}", link.display()), e))
}
