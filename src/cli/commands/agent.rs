//! Agent runtime command.

use anyhow::{Context, Result};
use std::path::PathBuf;
use tracing::info;

use crate::agent::AgentRuntime;
use crate::domain::models::Config;

pub async fn handle_agent(
    config: Config,
    preferred_id: Option<String>,
    workdir: Option<PathBuf>,
) -> Result<()> {
    let workdir = match workdir {
        Some(dir) => dir,
        None => std::env::current_dir().context("failed to resolve working directory")?,
    };

    let runtime = AgentRuntime::register(config, workdir, preferred_id)
        .await
        .context("registration with the coordinator failed")?;

    tokio::select! {
        result = runtime.run() => result,
        _ = tokio::signal::ctrl_c() => {
            info!(agent_id = runtime.agent_id(), "agent interrupted");
            Ok(())
        }
    }
}
