//! Building a client from command-line flags

use std::process::Stdio;

use anyhow::{anyhow, Context, Result};
use skein_client::{Client, ClientConfig, StreamConfig};
use tokio::process::{Child, Command};
use tracing::{debug, info, warn};

use crate::cli::Cli;

pub struct Connection {
    pub client: Client,
    /// Backend spawned for `--stdio`, killed on shutdown.
    child: Option<Child>,
}

impl Connection {
    pub async fn shutdown(mut self) {
        if let Err(e) = self.client.close().await {
            warn!(error = %e, "Closing client failed");
        }
        if let Some(mut child) = self.child.take() {
            debug!("Stopping backend process");
            let _ = child.kill().await;
        }
    }
}

/// Merge the config file with the flags. Flags win.
///
/// The event loop is never started here. Commands that want events start it
/// once their listeners are registered.
pub async fn resolve_config(cli: &Cli) -> Result<ClientConfig> {
    let mut config = match &cli.config {
        Some(path) => ClientConfig::load(path).await?,
        None => ClientConfig::default(),
    };
    if let Some(url) = &cli.url {
        config.url = url.clone();
    }
    if let Some(lines) = cli.malformed_lines {
        config.malformed_frames = lines.into();
    }
    config.start_event_loop = false;
    Ok(config)
}

pub async fn open(cli: &Cli) -> Result<Connection> {
    let config = resolve_config(cli).await?;

    match &cli.stdio {
        Some(command_line) => spawn_stdio(command_line, &config),
        None => {
            let client = Client::connect(config.clone())
                .await
                .with_context(|| format!("Failed to connect to {}", config.url))?;
            Ok(Connection {
                client,
                child: None,
            })
        }
    }
}

fn spawn_stdio(command_line: &str, config: &ClientConfig) -> Result<Connection> {
    let mut parts = command_line.split_whitespace();
    let program = parts
        .next()
        .ok_or_else(|| anyhow!("--stdio needs a command"))?;

    info!(program, "Starting backend over stdio");
    let mut child = Command::new(program)
        .args(parts)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::inherit())
        .kill_on_drop(true)
        .spawn()
        .with_context(|| format!("Failed to spawn {}", program))?;

    let input = child
        .stdin
        .take()
        .ok_or_else(|| anyhow!("Backend stdin unavailable"))?;
    let output = child
        .stdout
        .take()
        .ok_or_else(|| anyhow!("Backend stdout unavailable"))?;

    let client = Client::from_stream(
        StreamConfig::new(input, output, config.start_event_loop)
            .with_malformed_frames(config.malformed_frames),
    );
    Ok(Connection {
        client,
        child: Some(child),
    })
}
