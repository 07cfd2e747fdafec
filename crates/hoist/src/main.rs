//! `hoist` command line

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use cluster_orchestration::{ALL_TASKS, Orchestrator, OrchestratorConfig, Target};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser, Debug)]
#[command(name = "hoist")]
#[command(about = "Deploy and operate multi-host service clusters")]
#[command(version)]
struct Cli {
    /// Root of the `<project>/<cluster>.yaml` tree
    #[arg(long, global = true, env = "HOIST_CONF_DIR", default_value = "conf")]
    conf_dir: PathBuf,

    /// Base URL of the package repository
    #[arg(
        long,
        global = true,
        env = "HOIST_PKG_SERVER",
        default_value = "http://127.0.0.1:8000"
    )]
    pkg_server: String,

    /// Install root for `shell`
    #[arg(long, global = true, env = "HOIST_LOCAL_DIR")]
    local_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// Job selection shared by the lifecycle commands
#[derive(Args, Debug, Clone)]
struct JobArgs {
    /// Project directory under the config root
    #[arg(long)]
    project: String,

    /// Cluster name
    #[arg(long)]
    cluster: String,

    /// Job name
    #[arg(long)]
    job: String,

    /// Task id, all tasks when omitted
    #[arg(long, default_value_t = ALL_TASKS, allow_negative_numbers = true)]
    task: i64,
}

impl JobArgs {
    fn target(&self) -> Target {
        Target::task(&self.project, &self.cluster, &self.job, self.task)
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Render, install and start tasks
    Bootstrap(JobArgs),

    /// Show task state
    Show(JobArgs),

    /// Start installed tasks
    Start(JobArgs),

    /// Stop tasks
    Stop(JobArgs),

    /// Restart tasks
    Restart(JobArgs),

    /// Update tasks one at a time, halting at the first failure
    RollingUpdate(JobArgs),

    /// Remove stopped tasks from their hosts
    Cleanup(JobArgs),

    /// Run task 0 of a job locally in the foreground
    Shell {
        /// Project directory under the config root
        #[arg(long)]
        project: String,

        /// Cluster name
        #[arg(long)]
        cluster: String,

        /// Job name
        #[arg(long)]
        job: String,

        /// Arguments appended to the program's own
        #[arg(last = true)]
        args: Vec<String>,
    },

    /// List clusters in the config dir
    List,

    /// Run the supervisor agent on this host
    StartAgent {
        /// Root dir for installed tasks and the package cache
        #[arg(long)]
        dir: PathBuf,

        /// Port to listen on
        #[arg(long, default_value_t = task_supervisor::config::DEFAULT_AGENT_PORT)]
        port: u16,

        /// Record store file
        #[arg(long)]
        file: PathBuf,
    },
}

impl Cli {
    fn orchestrator_config(&self) -> OrchestratorConfig {
        let config = OrchestratorConfig::new(&self.conf_dir, &self.pkg_server);
        match &self.local_dir {
            Some(local_dir) => config.with_local_dir(local_dir),
            None => config,
        }
    }
}

fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    let cli = Cli::parse();
    let orchestrator = Orchestrator::with_defaults(cli.orchestrator_config());

    smol::block_on(async {
        match cli.command {
            Commands::Bootstrap(args) => {
                commands::report(orchestrator.bootstrap(&args.target()).await?)
            }
            Commands::Show(args) => commands::report(orchestrator.show(&args.target()).await?),
            Commands::Start(args) => commands::report(orchestrator.start(&args.target()).await?),
            Commands::Stop(args) => commands::report(orchestrator.stop(&args.target()).await?),
            Commands::Restart(args) => {
                commands::report(orchestrator.restart(&args.target()).await?)
            }
            Commands::RollingUpdate(args) => {
                commands::report(orchestrator.rolling_update(&args.target()).await?)
            }
            Commands::Cleanup(args) => {
                commands::report(orchestrator.cleanup(&args.target()).await?)
            }
            Commands::Shell {
                project,
                cluster,
                job,
                args,
            } => Ok(orchestrator.shell(&project, &cluster, &job, &args).await?),
            Commands::List => commands::list::run(&orchestrator).await,
            Commands::StartAgent { dir, port, file } => {
                commands::agent::run(dir, port, file).await
            }
        }
    })
}
