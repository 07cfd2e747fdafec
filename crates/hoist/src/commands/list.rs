//! `list`: clusters found under the config dir

use anyhow::Result;
use cluster_orchestration::Orchestrator;
use comfy_table::Table;

pub async fn run(orchestrator: &Orchestrator) -> Result<()> {
    let clusters = orchestrator.list().await?;
    if clusters.is_empty() {
        println!(
            "No clusters under {}",
            orchestrator.config().conf_dir.display()
        );
        return Ok(());
    }

    let mut table = Table::new();
    table.set_header(vec!["PROJECT", "CLUSTER", "JOBS", "TASKS"]);
    for cluster in &clusters {
        let jobs: Vec<&str> = cluster.jobs.keys().map(String::as_str).collect();
        let tasks: usize = cluster.jobs.values().map(|job| job.hosts.len()).sum();
        table.add_row(vec![
            cluster.project.clone(),
            cluster.name.clone(),
            jobs.join(","),
            tasks.to_string(),
        ]);
    }

    println!("{}", table);
    Ok(())
}
