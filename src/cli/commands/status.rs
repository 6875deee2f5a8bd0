//! Status command.

use anyhow::Result;
use comfy_table::{presets::UTF8_BORDERS_ONLY, Table};
use console::style;

use crate::agent::CoordinatorClient;
use crate::domain::models::Config;

pub async fn handle_status(config: Config) -> Result<()> {
    let client = CoordinatorClient::new(config.coordinator.base_url());
    let report = client.status().await?;

    let phase = report
        .active_phase
        .map_or_else(|| "-".to_string(), |p| format!("{p}/{}", report.phase_count));
    println!(
        "{} phase {} | queue depth {} | backlog {}",
        style("drover").bold().cyan(),
        phase,
        report.queue_depth,
        if report.backlog_complete { style("complete").green() } else { style("running").yellow() }
    );

    let mut counts = Table::new();
    counts.load_preset(UTF8_BORDERS_ONLY);
    counts.set_header(vec!["Status", "Tasks"]);
    let mut rows: Vec<_> = report.task_counts.iter().collect();
    rows.sort();
    for (status, count) in rows {
        counts.add_row(vec![status.clone(), count.to_string()]);
    }
    println!("{counts}");

    let mut agents = Table::new();
    agents.load_preset(UTF8_BORDERS_ONLY);
    agents.set_header(vec!["Agent", "State", "Current task", "Last heartbeat"]);
    for agent in &report.agents {
        agents.add_row(vec![
            agent.id.clone(),
            agent.state.as_str().to_string(),
            agent.current_task.clone().unwrap_or_else(|| "-".to_string()),
            agent.last_heartbeat.to_rfc3339(),
        ]);
    }
    println!("{agents}");
    Ok(())
}
