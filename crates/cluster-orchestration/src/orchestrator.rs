//! Cluster-wide lifecycle operations
//!
//! Every operation loads the cluster fresh from the config dir, resolves the
//! targeted hosts and renders what it needs before the first agent call.
//! Requests then fan out, one future per task, and come back in ascending
//! task order. Rolling update is the one sequential operation.

use crate::config::OrchestratorConfig;
use crate::plan::{Target, build_program, select_hosts};
use crate::result::TaskResult;
use crate::{OrchestrationError, Result};
use futures::future::join_all;
use hoist_config::{Cluster, Host, Job, list_clusters, load_cluster};
use program_executor::{HttpFetcher, InstallMode, PackageFetcher, Program, ProgramStatus};
use std::future::Future;
use std::sync::Arc;
use task_supervisor::{Request, TaskRef, Transport, WsTransport};
use tracing::{debug, info, warn};

/// Drives supervisor agents across a cluster
pub struct Orchestrator {
    config: OrchestratorConfig,
    transport: Arc<dyn Transport>,
    fetcher: Arc<dyn PackageFetcher>,
}

impl Orchestrator {
    /// Create an orchestrator with explicit transport and package fetcher
    pub fn new(
        config: OrchestratorConfig,
        transport: Arc<dyn Transport>,
        fetcher: Arc<dyn PackageFetcher>,
    ) -> Self {
        Self {
            config,
            transport,
            fetcher,
        }
    }

    /// Websocket transport and HTTP package fetches
    pub fn with_defaults(config: OrchestratorConfig) -> Self {
        Self::new(config, Arc::new(WsTransport::new()), Arc::new(HttpFetcher::new()))
    }

    /// Current settings
    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Render, install and start every targeted task
    pub async fn bootstrap(&self, target: &Target) -> Result<Vec<TaskResult>> {
        info!("Bootstrapping {}", target);
        let planned = self.render(target).await?;
        Ok(self
            .fan_out(planned, |host, program| async move {
                let addr = host.supervisor_addr();
                let task = TaskRef::of(&program);
                self.call(&addr, Request::Install { program }).await?;
                self.call(&addr, Request::Start { task }).await
            })
            .await)
    }

    /// Current state of every targeted task
    pub async fn show(&self, target: &Target) -> Result<Vec<TaskResult>> {
        self.simple(target, |task| Request::Show { task }).await
    }

    /// Start every targeted task
    pub async fn start(&self, target: &Target) -> Result<Vec<TaskResult>> {
        info!("Starting {}", target);
        self.simple(target, |task| Request::Start { task }).await
    }

    /// Stop every targeted task
    pub async fn stop(&self, target: &Target) -> Result<Vec<TaskResult>> {
        info!("Stopping {}", target);
        self.simple(target, |task| Request::Stop { task }).await
    }

    /// Restart every targeted task
    pub async fn restart(&self, target: &Target) -> Result<Vec<TaskResult>> {
        info!("Restarting {}", target);
        self.simple(target, |task| Request::Restart { task }).await
    }

    /// Remove every targeted task from its host
    pub async fn cleanup(&self, target: &Target) -> Result<Vec<TaskResult>> {
        info!("Cleaning up {}", target);
        self.simple(target, |task| Request::Cleanup { task }).await
    }

    /// Update tasks one at a time in ascending order.
    ///
    /// Each task is stopped, refreshed with its newly rendered program,
    /// started and must then show as running. The first failure halts the
    /// update; the remaining tasks are reported as not attempted. Tasks
    /// already updated stay updated.
    pub async fn rolling_update(&self, target: &Target) -> Result<Vec<TaskResult>> {
        info!("Rolling update of {}", target);
        let planned = self.render(target).await?;

        let mut results = Vec::with_capacity(planned.len());
        let mut halted = false;
        for (host, program) in planned {
            if halted {
                results.push(TaskResult::not_attempted(host));
                continue;
            }
            let key = program.key();
            let result = self.update_one(&host, program).await;
            if let Err(e) = &result {
                warn!("Rolling update halted at {}: {}", key, e);
                halted = true;
            } else {
                info!("Updated {}", key);
            }
            results.push(TaskResult::new(host, result));
        }
        Ok(results)
    }

    /// Install task 0 of a job into the local dir and run it in the
    /// foreground with `extra_args` appended.
    ///
    /// Installs refresh in place, so repeated runs reuse the cached package.
    pub async fn shell(
        &self,
        project: &str,
        cluster: &str,
        job: &str,
        extra_args: &[String],
    ) -> Result<()> {
        let cluster = self.load(project, cluster).await?;
        let job = find_job(&cluster, job)?;
        let mut program = build_program(&cluster, job, 0, |name| self.config.package_url(name))?;

        info!(
            "Running {} from {}",
            program.key(),
            self.config.local_dir.display()
        );
        program
            .install(&self.config.local_dir, self.fetcher.clone(), InstallMode::Refresh)
            .await
            .map_err(program_executor::Error::from)?;
        program
            .run_foreground(extra_args)
            .await
            .map_err(program_executor::Error::from)?;
        Ok(())
    }

    /// Every cluster found in the config dir
    pub async fn list(&self) -> Result<Vec<Cluster>> {
        let conf_dir = self.config.conf_dir.clone();
        Ok(smol::unblock(move || list_clusters(&conf_dir)).await?)
    }

    async fn load(&self, project: &str, cluster: &str) -> Result<Cluster> {
        let conf_dir = self.config.conf_dir.clone();
        let (project, cluster) = (project.to_string(), cluster.to_string());
        Ok(smol::unblock(move || load_cluster(&conf_dir, &project, &cluster)).await?)
    }

    /// Targeted hosts with their rendered programs
    async fn render(&self, target: &Target) -> Result<Vec<(Host, Program)>> {
        let cluster = self.load(&target.project, &target.cluster).await?;
        let job = find_job(&cluster, &target.job)?;
        select_hosts(job, target.task_id)?
            .into_iter()
            .map(|host| -> Result<(Host, Program)> {
                let program = build_program(&cluster, job, host.task_id, |name| {
                    self.config.package_url(name)
                })?;
                Ok((host, program))
            })
            .collect()
    }

    /// Fan a request that only needs the task identity out to every target
    async fn simple<F>(&self, target: &Target, request: F) -> Result<Vec<TaskResult>>
    where
        F: Fn(TaskRef) -> Request,
    {
        let cluster = self.load(&target.project, &target.cluster).await?;
        let job = find_job(&cluster, &target.job)?;
        let planned: Vec<(Host, TaskRef)> = select_hosts(job, target.task_id)?
            .into_iter()
            .map(|host| {
                let task = TaskRef::new(&cluster.name, &job.name, host.task_id);
                (host, task)
            })
            .collect();

        let request = &request;
        Ok(self
            .fan_out(planned, |host, task| async move {
                self.call(&host.supervisor_addr(), request(task)).await
            })
            .await)
    }

    /// One future per task, results in input order
    async fn fan_out<T, F, Fut>(&self, planned: Vec<(Host, T)>, op: F) -> Vec<TaskResult>
    where
        F: Fn(Host, T) -> Fut,
        Fut: Future<Output = Result<Program>>,
    {
        debug!("Fanning out to {} tasks", planned.len());
        join_all(planned.into_iter().map(|(host, item)| {
            let call = op(host.clone(), item);
            async move { TaskResult::new(host, call.await) }
        }))
        .await
    }

    async fn update_one(&self, host: &Host, program: Program) -> Result<Program> {
        let addr = host.supervisor_addr();
        let task = TaskRef::of(&program);

        self.call(&addr, Request::Stop { task: task.clone() }).await?;
        self.call(&addr, Request::Update { program }).await?;
        self.call(&addr, Request::Start { task: task.clone() }).await?;

        let shown = self.call(&addr, Request::Show { task: task.clone() }).await?;
        if shown.status != ProgramStatus::Running {
            return Err(OrchestrationError::NotRunning {
                task: task.key(),
                status: shown.status,
            });
        }
        Ok(shown)
    }

    async fn call(&self, addr: &str, request: Request) -> Result<Program> {
        let response = self.transport.send(addr, request).await?;
        Ok(response.into_program()?)
    }
}

fn find_job<'a>(cluster: &'a Cluster, name: &str) -> Result<&'a Job> {
    cluster
        .job(name)
        .ok_or_else(|| OrchestrationError::UnknownJob {
            cluster: cluster.name.clone(),
            job: name.to_string(),
        })
}
