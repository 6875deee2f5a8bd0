//! Backlog load command.

use anyhow::{Context, Result};
use comfy_table::{presets::UTF8_BORDERS_ONLY, Table};
use console::style;
use std::path::Path;

use crate::adapters::sqlite::{create_pool, Migrator};
use crate::domain::models::{Backlog, Config};
use crate::services::{backlog_loader, BacklogLoader, CoordinatorContext};

pub async fn handle_load(config: Config, file: &Path, dry_run: bool) -> Result<()> {
    let input = std::fs::read_to_string(file)
        .with_context(|| format!("failed to read backlog file {}", file.display()))?;
    let backlog = Backlog::from_yaml(&input).context("failed to parse backlog YAML")?;

    let tasks = backlog_loader::validate(&backlog)?;
    let layers = backlog_loader::compute_phases(&tasks)?;

    let mut table = Table::new();
    table.load_preset(UTF8_BORDERS_ONLY);
    table.set_header(vec!["Phase", "Tasks"]);
    for (i, layer) in layers.iter().enumerate() {
        table.add_row(vec![(i + 1).to_string(), layer.join(", ")]);
    }
    println!("{table}");

    if dry_run {
        println!(
            "{} {} tasks in {} phases (dry run, nothing written)",
            style("ok").green().bold(),
            tasks.len(),
            layers.len()
        );
        return Ok(());
    }

    let pool = create_pool(&config.database).await?;
    Migrator::new(pool.clone()).run_embedded_migrations().await?;
    let ctx = CoordinatorContext::sqlite(pool, config);

    let phases = BacklogLoader::new(ctx).load(&backlog).await?;
    println!(
        "{} loaded {} tasks in {} phases; phase 1 active",
        style("ok").green().bold(),
        tasks.len(),
        phases.len()
    );
    Ok(())
}
