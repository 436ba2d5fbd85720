//! Per-target benchmark driver

use anyhow::{Context, Result};
use pipebench::LoadRunner;
use pipebench_client::ClientBuilder;
use std::sync::Arc;
use tracing::info;

use crate::config::{Config, TargetConfig};
use crate::report::TargetResult;

/// Run the load test against one target
///
/// Fails only if the address cannot be resolved. An unreachable store still
/// produces a result, with every batch counted as a rejection.
pub async fn run_target(config: &Config, target: &TargetConfig) -> Result<TargetResult> {
    info!("Testing {}...", target.label);

    let client = ClientBuilder::new()
        .pool_config(config.pool.clone())
        .build(target.addr.as_str())
        .await
        .with_context(|| format!("Failed to set up client for {} ({})", target.label, target.addr))?;

    let mut runner = LoadRunner::new(config.workers, config.duration);
    if let Some(interval) = config.progress {
        runner = runner.progress_interval(interval);
    }

    let client = Arc::new(client);
    let summary = runner.run(Arc::clone(&client)).await;
    client.close();

    info!(
        "{}: {} operations, {} errors, {} successful",
        target.label,
        summary.attempted,
        summary.failed,
        summary.successful()
    );

    Ok(TargetResult::new(target.label.clone(), summary))
}

/// Run every configured target in order
pub async fn run_all(config: &Config) -> Result<Vec<TargetResult>> {
    let mut results = Vec::with_capacity(config.targets.len());
    for target in &config.targets {
        results.push(run_target(config, target).await?);
    }
    Ok(results)
}
