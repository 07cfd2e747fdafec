//! Targets and rendering of jobs into host-bound programs

use crate::{OrchestrationError, Result};
use hoist_config::render::render;
use hoist_config::{Cluster, Host, Job, RenderError};
use program_executor::{PackageRef, Program};
use std::fmt;

/// Task id selecting every host of a job
pub const ALL_TASKS: i64 = -1;

/// The tasks an operation applies to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    /// Project directory under the config root
    pub project: String,
    /// Cluster file stem
    pub cluster: String,
    /// Job name
    pub job: String,
    /// Task id, or [`ALL_TASKS`]
    pub task_id: i64,
}

impl Target {
    /// Every task of a job
    pub fn all(
        project: impl Into<String>,
        cluster: impl Into<String>,
        job: impl Into<String>,
    ) -> Self {
        Self::task(project, cluster, job, ALL_TASKS)
    }

    /// One task of a job
    pub fn task(
        project: impl Into<String>,
        cluster: impl Into<String>,
        job: impl Into<String>,
        task_id: i64,
    ) -> Self {
        Self {
            project: project.into(),
            cluster: cluster.into(),
            job: job.into(),
            task_id,
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.project, self.cluster, self.job)?;
        if self.task_id != ALL_TASKS {
            write!(f, "/{}", self.task_id)?;
        }
        Ok(())
    }
}

/// Hosts addressed by `task_id`, in ascending task order
pub fn select_hosts(job: &Job, task_id: i64) -> Result<Vec<Host>> {
    if task_id == ALL_TASKS {
        return Ok(job.hosts.clone());
    }
    u32::try_from(task_id)
        .ok()
        .and_then(|id| job.host(id))
        .map(|host| vec![host.clone()])
        .ok_or_else(|| OrchestrationError::TaskNotFound {
            job: job.name.clone(),
            task_id,
        })
}

/// Render `job` into the program that runs as `task_id`.
///
/// Every placeholder must resolve: a `%{<job>.x.*}` form naming a job with
/// no host for `task_id` fails with [`RenderError::TaskNotFound`].
pub fn build_program(
    cluster: &Cluster,
    job: &Job,
    task_id: u32,
    package_url: impl Fn(&str) -> String,
) -> std::result::Result<Program, RenderError> {
    let render = |input: &str| render(cluster, task_id, input);

    let args = job
        .to_args()
        .iter()
        .map(|arg| render(arg))
        .collect::<std::result::Result<Vec<_>, _>>()?;
    let mut program = Program::new(&cluster.name, &job.name, task_id, render(job.binary())?, args);

    for (name, body) in job.config_map() {
        program.configs.insert(render(&name)?, render(&body)?);
    }
    program.package = cluster.package_for(job).map(|spec| PackageRef {
        url: package_url(&spec.name),
        name: spec.name.clone(),
        checksum: spec.checksum.clone(),
    });
    program.hooks = job.hooks.clone();

    Ok(program)
}

#[cfg(test)]
mod tests {
    use super::*;
    use hoist_config::{ConfigFile, MainEntry, PackageSpec};

    fn hosts(keys: &[&str]) -> Vec<Host> {
        keys.iter().map(|key| Host::parse(key).unwrap()).collect()
    }

    fn fixture() -> Cluster {
        let mut server = Job::new(
            "server",
            hosts(&["s2:9001/id=2/base_port=12000", "s0:9001/id=0", "s1:9001/id=1"]),
        )
        .unwrap();
        server.system_properties = vec!["cluster=%{cluster.name}".into()];
        server.main_entry = Some(MainEntry {
            command: "org.example.Server".into(),
            extra_args: "--port %{server.x.base_port+1} --peers %{server.server_list}".into(),
        });
        server.config_files.insert(
            "server.properties".into(),
            ConfigFile::new("server.properties", vec!["myid=%{server.x.id}".into()]),
        );
        server.hooks.insert("pre_start".into(), "echo starting".into());

        let client = Job::new("client", vec![]).unwrap();
        let package = PackageSpec {
            name: "server-1.0.tar.gz".into(),
            checksum: "abc123".into(),
        };
        Cluster::new("demo", "demo_test", Some(package), vec![server, client], vec![]).unwrap()
    }

    fn url(name: &str) -> String {
        format!("http://pkgs/{name}")
    }

    #[test]
    fn test_select_hosts() {
        let cluster = fixture();
        let job = cluster.job("server").unwrap();

        let all: Vec<u32> = select_hosts(job, ALL_TASKS)
            .unwrap()
            .iter()
            .map(|host| host.task_id)
            .collect();
        assert_eq!(all, vec![0, 1, 2]);

        assert_eq!(select_hosts(job, 2).unwrap()[0].hostname, "s2");

        for missing in [3, -7] {
            match select_hosts(job, missing) {
                Err(OrchestrationError::TaskNotFound { job, task_id }) => {
                    assert_eq!(job, "server");
                    assert_eq!(task_id, missing);
                }
                other => panic!("unexpected {other:?}"),
            }
        }
    }

    #[test]
    fn test_build_program_renders_per_task() {
        let cluster = fixture();
        let job = cluster.job("server").unwrap();
        let program = build_program(&cluster, job, 2, url).unwrap();

        assert_eq!(program.key(), "demo_test/server/2");
        assert_eq!(program.binary, "java");
        assert_eq!(
            program.args,
            vec![
                "-Dcluster=demo_test",
                "org.example.Server",
                "--port",
                "12001",
                "--peers",
                "s0:10000,s1:10000,s2:12000",
            ]
        );
        assert_eq!(program.configs["server.properties"], "myid=2\n");
        assert_eq!(program.hooks["pre_start"], "echo starting");

        let package = program.package.unwrap();
        assert_eq!(package.url, "http://pkgs/server-1.0.tar.gz");
        assert_eq!(package.checksum, "abc123");
    }

    #[test]
    fn test_build_program_without_host() {
        let cluster = fixture();
        let mut job = cluster.job("client").unwrap().clone();
        job.main_entry = Some(MainEntry {
            command: "org.example.Client".into(),
            extra_args: "%{server.0.host} %{cluster.name}".into(),
        });
        let program = build_program(&cluster, &job, 0, url).unwrap();
        assert_eq!(
            program.args,
            vec!["org.example.Client", "s0", "demo_test"]
        );

        job.config_files.insert(
            "client.properties".into(),
            ConfigFile::new("client.properties", vec!["bind=%{client.x.host}".into()]),
        );
        match build_program(&cluster, &job, 0, url) {
            Err(RenderError::TaskNotFound { task_id, placeholder }) => {
                assert_eq!(task_id, 0);
                assert_eq!(placeholder, "%{client.x.host}");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_build_program_render_error() {
        let cluster = fixture();
        let mut job = cluster.job("server").unwrap().clone();
        job.vm_opts = vec!["-Xmx%{server.9.heap}".into()];

        assert!(matches!(
            build_program(&cluster, &job, 0, url),
            Err(RenderError::TaskNotFound { task_id: 9, .. })
        ));
    }
}
