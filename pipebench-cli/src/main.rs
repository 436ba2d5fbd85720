use anyhow::Result;
use pipebench_cli::bench;
use pipebench_cli::config::Config;
use pipebench_cli::report;

#[tokio::main]
async fn main() -> Result<()> {
    // Settings file, environment and CLI arguments
    let config = Config::from_env_and_args()?;

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(format!("pipebench={}", config.log_level).parse()?)
                .add_directive(format!("pipebench_client={}", config.log_level).parse()?)
                .add_directive(format!("pipebench_cli={}", config.log_level).parse()?),
        )
        .init();

    if config.created_env_file {
        tracing::info!(
            "Created {} with default store addresses",
            config.env_file.display()
        );
    }
    tracing::info!(
        "Running {} workers for {:?} against {} target(s)",
        config.workers,
        config.duration,
        config.targets.len()
    );

    let results = bench::run_all(&config).await?;

    report::write_text(&config.output, &results)?;
    tracing::info!("Results written to {}", config.output.display());

    if let Some(path) = &config.json_output {
        report::write_json(path, &results)?;
        tracing::info!("JSON results written to {}", path.display());
    }

    Ok(())
}
