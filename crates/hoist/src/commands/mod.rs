//! Subcommand implementations

pub mod agent;
pub mod list;

use anyhow::{Result, bail};
use cluster_orchestration::{TaskOutcome, TaskResult};
use comfy_table::{Cell, Color, Table};

/// Print one row per task and fail if any task did not succeed
pub fn report(results: Vec<TaskResult>) -> Result<()> {
    let mut table = Table::new();
    table.set_header(vec!["TASK", "HOST", "STATUS", "PID", "DETAIL"]);

    let mut failed = 0;
    for result in &results {
        let (status, color, pid, detail) = match &result.outcome {
            TaskOutcome::Done(program) => (
                program.status.to_string(),
                Color::Green,
                program.pid.map(|pid| pid.to_string()).unwrap_or_else(|| "-".into()),
                program.root_dir.display().to_string(),
            ),
            TaskOutcome::Failed(e) => {
                failed += 1;
                ("failed".to_string(), Color::Red, "-".into(), e.to_string())
            }
            TaskOutcome::NotAttempted => (
                "not attempted".to_string(),
                Color::DarkGrey,
                "-".into(),
                String::new(),
            ),
        };

        table.add_row(vec![
            Cell::new(result.task_id()),
            Cell::new(result.host.supervisor_addr()),
            Cell::new(status).fg(color),
            Cell::new(pid),
            Cell::new(detail),
        ]);
    }

    println!("{}", table);
    if failed > 0 {
        bail!("{} of {} tasks failed", failed, results.len());
    }
    Ok(())
}
