//! Orchestrator against in-process agents routed by supervisor address

use async_trait::async_trait;
use cluster_orchestration::{
    OrchestrationError, Orchestrator, OrchestratorConfig, Target, TaskOutcome, TaskResult,
};
use flate2::Compression;
use flate2::write::GzEncoder;
use program_executor::package::file_checksum;
use program_executor::{
    InstallError, LifecycleTimeouts, LocalDirFetcher, PackageFetcher, PackageRef, ProgramStatus,
};
use std::collections::HashMap;
use std::fs::{self, File};
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use task_supervisor::{Agent, Error, MemoryStore, Request, Response, Transport};
use tempfile::TempDir;

const PROJECT: &str = "demo";
const CLUSTER: &str = "demo_test";

struct CountingFetcher {
    inner: LocalDirFetcher,
    calls: AtomicUsize,
}

impl PackageFetcher for CountingFetcher {
    fn fetch(&self, package: &PackageRef, dest: &Path) -> Result<(), InstallError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.fetch(package, dest)
    }
}

/// Delivers each request to the agent registered for its address
#[derive(Default)]
struct Router {
    agents: HashMap<String, Arc<Agent>>,
    sent: AtomicUsize,
}

#[async_trait]
impl Transport for Router {
    async fn send(&self, addr: &str, request: Request) -> task_supervisor::Result<Response> {
        self.sent.fetch_add(1, Ordering::SeqCst);
        match self.agents.get(addr) {
            Some(agent) => Ok(agent.handle(request).await),
            None => Err(Error::Protocol(format!("no agent listening on {addr}"))),
        }
    }
}

struct Fixture {
    dir: TempDir,
    fetcher: Arc<CountingFetcher>,
    router: Arc<Router>,
    orchestrator: Orchestrator,
}

impl Fixture {
    /// Agents for `addrs`, a package repo with `worker-1.0.tar.gz` and an
    /// empty config dir
    async fn new(addrs: &[&str]) -> Self {
        let dir = TempDir::new().unwrap();
        let repo = dir.path().join("repo");
        fs::create_dir_all(&repo).unwrap();
        fs::create_dir_all(dir.path().join("conf").join(PROJECT)).unwrap();
        write_package(&repo);

        let fetcher = Arc::new(CountingFetcher {
            inner: LocalDirFetcher::new(&repo),
            calls: AtomicUsize::new(0),
        });

        let mut router = Router::default();
        for (index, addr) in addrs.iter().enumerate() {
            let agent = Agent::new(
                dir.path().join(format!("agent{index}")),
                timeouts(),
                Arc::new(MemoryStore::new()),
                fetcher.clone(),
            )
            .await
            .unwrap();
            router.agents.insert(addr.to_string(), Arc::new(agent));
        }
        let router = Arc::new(router);

        let config = OrchestratorConfig::new(dir.path().join("conf"), "http://pkgs.local")
            .with_local_dir(dir.path().join("local"));
        let orchestrator = Orchestrator::new(config, router.clone(), fetcher.clone());

        Self {
            dir,
            fetcher,
            router,
            orchestrator,
        }
    }

    fn write_cluster(&self, yaml: &str) {
        let path = self.dir.path().join("conf").join(PROJECT).join(format!("{CLUSTER}.yaml"));
        fs::write(path, yaml).unwrap();
    }

    fn checksum(&self) -> String {
        file_checksum(&self.dir.path().join("repo").join("worker-1.0.tar.gz")).unwrap()
    }

    fn fetches(&self) -> usize {
        self.fetcher.calls.load(Ordering::SeqCst)
    }

    fn sent(&self) -> usize {
        self.router.sent.load(Ordering::SeqCst)
    }
}

fn write_package(repo: &Path) {
    let encoder = GzEncoder::new(
        File::create(repo.join("worker-1.0.tar.gz")).unwrap(),
        Compression::default(),
    );
    let mut builder = tar::Builder::new(encoder);
    let scripts: [(&str, &[u8]); 2] = [
        ("worker-1.0/bin/worker.sh", b"#!/bin/sh\nexec sleep 30\n"),
        ("worker-1.0/bin/hello.sh", b"#!/bin/sh\necho \"$@\" >> data/shell.out\n"),
    ];
    for (path, body) in scripts {
        let mut header = tar::Header::new_gnu();
        header.set_size(body.len() as u64);
        header.set_mode(0o755);
        header.set_cksum();
        builder.append_data(&mut header, path, body).unwrap();
    }
    builder.into_inner().unwrap().finish().unwrap();
}

fn timeouts() -> LifecycleTimeouts {
    LifecycleTimeouts {
        start_confirm: Duration::from_millis(300),
        stop_timeout: Duration::from_secs(3),
        poll_interval: Duration::from_millis(20),
    }
}

/// `sleep <duration>` per task, duration taken from the host key
fn sleepers(durations: [u32; 3]) -> String {
    format!(
        r#"
jobs:
  worker:
    binary: sleep
    hosts:
      - "h2:9002/id=2/duration={}"
      - "h0:9000/id=0/duration={}"
      - "h1:9001/id=1/duration={}"
    main_entry:
      command: "%{{worker.x.duration}}"
"#,
        durations[2], durations[0], durations[1]
    )
}

fn task_ids(results: &[TaskResult]) -> Vec<u32> {
    results.iter().map(TaskResult::task_id).collect()
}

fn pid(result: &TaskResult) -> i32 {
    result.program().and_then(|program| program.pid).unwrap()
}

#[smol_potat::test]
async fn test_bootstrap_show_stop_cleanup() {
    let fixture = Fixture::new(&["h0:9000", "h1:9001", "h2:9002"]).await;
    fixture.write_cluster(&sleepers([30, 30, 30]));
    let all = Target::all(PROJECT, CLUSTER, "worker");

    let results = fixture.orchestrator.bootstrap(&all).await.unwrap();
    assert_eq!(task_ids(&results), vec![0, 1, 2]);
    for result in &results {
        let program = result.program().unwrap();
        assert_eq!(program.status, ProgramStatus::Running);
        assert_eq!(program.args, vec!["30"]);
    }

    let shown = fixture
        .orchestrator
        .show(&Target::task(PROJECT, CLUSTER, "worker", 1))
        .await
        .unwrap();
    assert_eq!(shown.len(), 1);
    assert_eq!(shown[0].host.hostname, "h1");
    assert_eq!(pid(&shown[0]), pid(&results[1]));

    let stopped = fixture.orchestrator.stop(&all).await.unwrap();
    assert!(stopped.iter().all(|result| {
        result.program().map(|program| program.status) == Some(ProgramStatus::Stopped)
    }));

    let cleaned = fixture.orchestrator.cleanup(&all).await.unwrap();
    assert!(cleaned.iter().all(TaskResult::is_done));
    let shown = fixture.orchestrator.show(&all).await.unwrap();
    assert!(
        shown
            .iter()
            .all(|result| matches!(result.outcome, TaskOutcome::Failed(_)))
    );
}

#[smol_potat::test]
async fn test_one_result_per_task_when_every_host_fails() {
    let fixture = Fixture::new(&[]).await;
    fixture.write_cluster(&sleepers([30, 30, 30]));

    let results = fixture
        .orchestrator
        .bootstrap(&Target::all(PROJECT, CLUSTER, "worker"))
        .await
        .unwrap();
    assert_eq!(task_ids(&results), vec![0, 1, 2]);
    for result in &results {
        match &result.outcome {
            TaskOutcome::Failed(OrchestrationError::Supervisor(Error::Protocol(message))) => {
                assert!(message.contains(&result.host.supervisor_addr()));
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}

#[smol_potat::test]
async fn test_unknown_task_rejected_before_contact() {
    let fixture = Fixture::new(&["h0:9000", "h1:9001", "h2:9002"]).await;
    fixture.write_cluster(&sleepers([30, 30, 30]));

    let result = fixture
        .orchestrator
        .start(&Target::task(PROJECT, CLUSTER, "worker", 7))
        .await;
    assert!(matches!(
        result,
        Err(OrchestrationError::TaskNotFound { task_id: 7, .. })
    ));

    let result = fixture
        .orchestrator
        .start(&Target::all(PROJECT, CLUSTER, "nope"))
        .await;
    assert!(matches!(result, Err(OrchestrationError::UnknownJob { .. })));
    assert_eq!(fixture.sent(), 0);
}

#[smol_potat::test]
async fn test_render_error_aborts_before_contact() {
    let fixture = Fixture::new(&["h0:9000"]).await;
    fixture.write_cluster(
        r#"
jobs:
  worker:
    binary: sleep
    hosts: ["h0:9000/id=0"]
    main_entry:
      command: "%{worker.3.host}"
"#,
    );

    let result = fixture
        .orchestrator
        .bootstrap(&Target::all(PROJECT, CLUSTER, "worker"))
        .await;
    assert!(matches!(result, Err(OrchestrationError::Render(_))));
    assert_eq!(fixture.sent(), 0);
}

#[smol_potat::test]
async fn test_rolling_update_halts_at_first_failure() {
    let fixture = Fixture::new(&["h0:9000", "h1:9001", "h2:9002"]).await;
    fixture.write_cluster(&sleepers([30, 30, 30]));
    let all = Target::all(PROJECT, CLUSTER, "worker");

    let before = fixture.orchestrator.bootstrap(&all).await.unwrap();
    assert!(before.iter().all(TaskResult::is_done));

    // task 1 now exits right away and cannot be confirmed as started
    fixture.write_cluster(&sleepers([20, 0, 20]));
    let results = fixture.orchestrator.rolling_update(&all).await.unwrap();
    assert_eq!(task_ids(&results), vec![0, 1, 2]);

    let updated = results[0].program().unwrap();
    assert_eq!(updated.status, ProgramStatus::Running);
    assert_eq!(updated.args, vec!["20"]);
    assert_ne!(pid(&results[0]), pid(&before[0]));

    assert!(matches!(results[1].outcome, TaskOutcome::Failed(_)));
    assert!(matches!(results[2].outcome, TaskOutcome::NotAttempted));

    let untouched = fixture
        .orchestrator
        .show(&Target::task(PROJECT, CLUSTER, "worker", 2))
        .await
        .unwrap();
    assert_eq!(pid(&untouched[0]), pid(&before[2]));
    assert_eq!(untouched[0].program().unwrap().args, vec!["30"]);

    fixture.orchestrator.stop(&all).await.unwrap();
}

#[smol_potat::test]
async fn test_shared_package_fetched_once() {
    let fixture = Fixture::new(&["h0:9000"]).await;
    fixture.write_cluster(&format!(
        r#"
cluster:
  package: {{ name: worker-1.0.tar.gz, checksum: "{}" }}
jobs:
  worker:
    binary: sh
    hosts: ["h0:9000/id=0", "h0:9000/id=1"]
    main_entry:
      command: pkg/bin/worker.sh
"#,
        fixture.checksum()
    ));
    let all = Target::all(PROJECT, CLUSTER, "worker");

    let results = fixture.orchestrator.bootstrap(&all).await.unwrap();
    assert!(results.iter().all(TaskResult::is_done), "{results:?}");
    assert_eq!(fixture.fetches(), 1);

    let package = results[0].program().unwrap().package.clone().unwrap();
    assert_eq!(package.url, "http://pkgs.local/worker-1.0.tar.gz");

    fixture.orchestrator.stop(&all).await.unwrap();
}

#[smol_potat::test]
async fn test_shell_reuses_cached_package() {
    let fixture = Fixture::new(&[]).await;
    fixture.write_cluster(&format!(
        r#"
cluster:
  package: {{ name: worker-1.0.tar.gz, checksum: "{}" }}
jobs:
  tool:
    binary: sh
    main_entry:
      command: pkg/bin/hello.sh
      extra_args: "--cluster %{{cluster.name}}"
"#,
        fixture.checksum()
    ));

    for arg in ["first", "second"] {
        fixture
            .orchestrator
            .shell(PROJECT, CLUSTER, "tool", &[arg.to_string()])
            .await
            .unwrap();
    }
    assert_eq!(fixture.fetches(), 1);

    let output = fs::read_to_string(
        fixture
            .dir
            .path()
            .join("local")
            .join(CLUSTER)
            .join("tool.0")
            .join("data")
            .join("shell.out"),
    )
    .unwrap();
    assert_eq!(output, "--cluster demo_test first\n--cluster demo_test second\n");
}

#[smol_potat::test]
async fn test_list_reads_local_input_only() {
    let fixture = Fixture::new(&[]).await;
    fixture.write_cluster(&sleepers([30, 30, 30]));

    let clusters = fixture.orchestrator.list().await.unwrap();
    assert_eq!(clusters.len(), 1);
    assert_eq!(clusters[0].project, PROJECT);
    assert_eq!(clusters[0].name, CLUSTER);
    assert_eq!(fixture.sent(), 0);
}
