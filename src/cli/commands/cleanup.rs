//! Cleanup command: one remote reaper sweep.

use anyhow::Result;
use console::style;

use crate::agent::CoordinatorClient;
use crate::domain::models::Config;

pub async fn handle_cleanup(config: Config) -> Result<()> {
    let client = CoordinatorClient::new(config.coordinator.base_url());
    let reset = client.cleanup().await?;
    println!("{} {reset} task(s) reset to pending", style("ok").green().bold());
    Ok(())
}
