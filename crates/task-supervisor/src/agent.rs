//! Host-local supervisor of installed tasks
//!
//! Every task owns a slot guarded by an async mutex, so operations on one
//! task run one at a time while different tasks proceed independently. Each
//! state change is written to the [`RecordStore`] before the operation
//! returns.

use crate::backend::{RecordStore, SledStore, TaskRecord};
use crate::config::AgentConfig;
use crate::error::{Error, Result};
use crate::protocol::{Request, Response, TaskRef};
use futures::lock::Mutex;
use program_executor::hooks::{
    POST_INSTALL, POST_RESTART, POST_START, POST_STOP, PRE_CLEANUP, PRE_RESTART, PRE_START,
    PRE_STOP,
};
use program_executor::{InstallMode, LifecycleTimeouts, PackageFetcher, Program, ProgramStatus};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

type Slot = Arc<Mutex<Option<Program>>>;

/// Supervisor for the tasks installed on this host
pub struct Agent {
    root_dir: PathBuf,
    timeouts: LifecycleTimeouts,
    store: Arc<dyn RecordStore>,
    fetcher: Arc<dyn PackageFetcher>,
    slots: Mutex<HashMap<String, Slot>>,
}

impl Agent {
    /// Create an agent, loading existing records from `store`
    pub async fn new(
        root_dir: impl Into<PathBuf>,
        timeouts: LifecycleTimeouts,
        store: Arc<dyn RecordStore>,
        fetcher: Arc<dyn PackageFetcher>,
    ) -> Result<Self> {
        let root_dir = root_dir.into();
        std::fs::create_dir_all(&root_dir)?;

        let mut slots = HashMap::new();
        for record in store.list().await? {
            debug!("Loaded task {}", record.key());
            slots.insert(record.key(), Arc::new(Mutex::new(Some(record.program))));
        }
        info!(
            "Agent rooted at {} with {} recorded tasks",
            root_dir.display(),
            slots.len()
        );

        Ok(Self {
            root_dir,
            timeouts,
            store,
            fetcher,
            slots: Mutex::new(slots),
        })
    }

    /// Create an agent from its config, opening the sled store
    pub async fn open(config: &AgentConfig, fetcher: Arc<dyn PackageFetcher>) -> Result<Self> {
        let store = Arc::new(SledStore::open(&config.store_path)?);
        Self::new(&config.root_dir, config.timeouts, store, fetcher).await
    }

    /// Agent root dir
    pub fn root_dir(&self) -> &Path {
        &self.root_dir
    }

    /// Dispatch a wire request
    pub async fn handle(&self, request: Request) -> Response {
        debug!("Handling {} request", request.name());
        let result = match request {
            Request::Install { program } => self.install(program).await,
            Request::Update { program } => self.update(program).await,
            Request::Start { task } => self.start(&task).await,
            Request::Stop { task } => self.stop(&task).await,
            Request::Restart { task } => self.restart(&task).await,
            Request::Cleanup { task } => self.cleanup(&task).await,
            Request::Show { task } => self.show(&task).await,
            Request::List => {
                return match self.list().await {
                    Ok(programs) => Response::Programs { programs },
                    Err(e) => Response::Error { error: e.to_info() },
                };
            }
        };
        if let Err(e) = &result {
            warn!("Request failed: {}", e);
        }
        Response::from_result(result)
    }

    /// Fresh install of a program that has no record yet.
    ///
    /// A failed install leaves neither a record nor a job root behind.
    pub async fn install(&self, program: Program) -> Result<Program> {
        let key = program.key();
        loop {
            let slot = self.slot(&key).await;
            let mut guard = slot.lock().await;
            // cleanup or a failed install may have dropped this slot while we waited
            if !self.is_current(&key, &slot).await {
                continue;
            }
            if guard.is_some() {
                return Err(Error::AlreadyInstalled(key));
            }

            let result = self.install_into(&mut guard, program).await;
            if guard.is_none() {
                self.release(&key, &slot).await;
            }
            return result;
        }
    }

    async fn install_into(
        &self,
        guard: &mut Option<Program>,
        mut program: Program,
    ) -> Result<Program> {
        program.pid = None;
        program.status = ProgramStatus::Stopped;
        program
            .install(&self.root_dir, self.fetcher.clone(), InstallMode::Fresh)
            .await?;

        self.persist(&program).await?;
        *guard = Some(program.clone());
        program.exec_hook(POST_INSTALL).await?;
        info!("Installed {}", program.key());
        Ok(program)
    }

    /// Re-render an installed task's package link and configs.
    ///
    /// The recorded pid and status carry over to the new program.
    pub async fn update(&self, program: Program) -> Result<Program> {
        let key = program.key();
        let slot = self.existing_slot(&key).await?;
        let mut guard = slot.lock().await;
        let existing = guard.as_ref().ok_or_else(|| Error::NotInstalled(key.clone()))?;

        let mut program = program;
        program.pid = existing.pid;
        program.status = existing.status;
        program
            .install(&self.root_dir, self.fetcher.clone(), InstallMode::Refresh)
            .await?;

        self.persist(&program).await?;
        *guard = Some(program.clone());
        info!("Updated {}", key);
        Ok(program)
    }

    /// Start an installed task
    pub async fn start(&self, task: &TaskRef) -> Result<Program> {
        let slot = self.existing_slot(&task.key()).await?;
        let mut guard = slot.lock().await;
        let program = installed(&mut guard, task)?;

        program.exec_hook(PRE_START).await?;
        let started = program.start(&self.timeouts).await;
        self.persist(program).await?;
        started?;
        program.exec_hook(POST_START).await?;
        Ok(program.clone())
    }

    /// Stop a task's process
    pub async fn stop(&self, task: &TaskRef) -> Result<Program> {
        let slot = self.existing_slot(&task.key()).await?;
        let mut guard = slot.lock().await;
        let program = installed(&mut guard, task)?;

        program.exec_hook(PRE_STOP).await?;
        let stopped = program.stop(&self.timeouts).await;
        self.persist(program).await?;
        stopped?;
        program.exec_hook(POST_STOP).await?;
        Ok(program.clone())
    }

    /// Stop then start a task's process
    pub async fn restart(&self, task: &TaskRef) -> Result<Program> {
        let slot = self.existing_slot(&task.key()).await?;
        let mut guard = slot.lock().await;
        let program = installed(&mut guard, task)?;

        program.exec_hook(PRE_RESTART).await?;
        let restarted = program.restart(&self.timeouts).await;
        self.persist(program).await?;
        restarted?;
        program.exec_hook(POST_RESTART).await?;
        Ok(program.clone())
    }

    /// Remove a stopped task's job root and record
    pub async fn cleanup(&self, task: &TaskRef) -> Result<Program> {
        let key = task.key();
        let slot = self.existing_slot(&key).await?;
        let mut guard = slot.lock().await;
        let program = installed(&mut guard, task)?;
        if let Some(pid) = program.live_pid() {
            return Err(Error::StillRunning { key, pid });
        }

        program.exec_hook(PRE_CLEANUP).await?;
        let job_root = program.root_dir.clone();
        if job_root.starts_with(&self.root_dir) && job_root != self.root_dir && job_root.exists() {
            smol::unblock(move || std::fs::remove_dir_all(job_root)).await?;
        }
        self.store.remove(&key).await?;

        let mut removed = guard.take().ok_or_else(|| Error::NotInstalled(key.clone()))?;
        self.release(&key, &slot).await;
        removed.status = ProgramStatus::Stopped;
        info!("Cleaned up {}", key);
        Ok(removed)
    }

    /// A task with its status replaced by observed liveness
    pub async fn show(&self, task: &TaskRef) -> Result<Program> {
        let slot = self.existing_slot(&task.key()).await?;
        let guard = slot.lock().await;
        guard
            .as_ref()
            .map(Program::observed)
            .ok_or_else(|| Error::NotInstalled(task.key()))
    }

    /// Every recorded task, ordered by key, with observed status
    pub async fn list(&self) -> Result<Vec<Program>> {
        let mut slots: Vec<(String, Slot)> = self
            .slots
            .lock()
            .await
            .iter()
            .map(|(key, slot)| (key.clone(), slot.clone()))
            .collect();
        slots.sort_by(|a, b| a.0.cmp(&b.0));

        let mut programs = Vec::new();
        for (_, slot) in slots {
            if let Some(program) = slot.lock().await.as_ref() {
                programs.push(program.observed());
            }
        }
        Ok(programs)
    }

    /// Slot for `key`, created if missing. Only install creates slots.
    async fn slot(&self, key: &str) -> Slot {
        self.slots
            .lock()
            .await
            .entry(key.to_string())
            .or_default()
            .clone()
    }

    async fn existing_slot(&self, key: &str) -> Result<Slot> {
        self.slots
            .lock()
            .await
            .get(key)
            .cloned()
            .ok_or_else(|| Error::NotInstalled(key.to_string()))
    }

    async fn is_current(&self, key: &str, slot: &Slot) -> bool {
        self.slots
            .lock()
            .await
            .get(key)
            .is_some_and(|current| Arc::ptr_eq(current, slot))
    }

    /// Forget an emptied slot, unless it was already replaced
    async fn release(&self, key: &str, slot: &Slot) {
        let mut slots = self.slots.lock().await;
        if slots.get(key).is_some_and(|current| Arc::ptr_eq(current, slot)) {
            slots.remove(key);
        }
    }

    /// Number of tracked task slots
    pub async fn slot_count(&self) -> usize {
        self.slots.lock().await.len()
    }

    async fn persist(&self, program: &Program) -> Result<()> {
        self.store.put(&TaskRecord::new(program.clone())).await
    }
}

fn installed<'a>(slot: &'a mut Option<Program>, task: &TaskRef) -> Result<&'a mut Program> {
    slot.as_mut().ok_or_else(|| Error::NotInstalled(task.key()))
}
