use anyhow::Result;
use clap::Parser;
use tracing_subscriber::filter::{EnvFilter, LevelFilter};

use skein_cli::cli::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // stdout carries command output, so logs go to stderr
    let level: LevelFilter = cli.effective_log_level().into();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(level.into())
                .from_env_lossy(),
        )
        .with_writer(std::io::stderr)
        .init();

    skein_cli::run(cli).await
}
