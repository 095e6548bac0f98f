use anyhow::{Context, Result};
use cardinality_config::RuntimeConfig;
use clap::Parser;

/// Cardinality-aware OTLP metadata catalog and HTTP server.
#[derive(Parser)]
#[command(name = "cardinality-analyzer")]
#[command(version)]
#[command(about = "Tracks per-key attribute cardinality and log templates across OTLP metrics/traces/logs", long_about = None)]
struct Cli {
    /// Path to a TOML configuration file.
    #[arg(short, long, value_name = "FILE")]
    config: Option<std::path::PathBuf>,

    /// HTTP listen address (overrides config file), e.g. 0.0.0.0:4319.
    #[arg(short, long, value_name = "ADDR")]
    listen_addr: Option<String>,

    /// Log level: trace, debug, info, warn, error.
    #[arg(short = 'v', long, value_name = "LEVEL")]
    log_level: Option<String>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to build tokio runtime")?
        .block_on(async_main(cli))
}

async fn async_main(cli: Cli) -> Result<()> {
    let mut config = if let Some(path) = &cli.config {
        RuntimeConfig::load_from_path(path).with_context(|| format!("failed to load config from {}", path.display()))?
    } else {
        RuntimeConfig::load().context("failed to load configuration")?
    };

    if let Some(addr) = &cli.listen_addr {
        config.server.listen_addr = addr.clone();
    }
    if let Some(level) = &cli.log_level {
        config.server.log_level = level.clone();
    }
    config.validate().context("invalid configuration")?;

    cardinality_analyzer::run_with_config(config).await
}
