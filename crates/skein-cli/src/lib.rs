//! Command-line front end for the skein client

pub mod cli;
pub mod commands;
mod connect;

use anyhow::Result;

use cli::{Cli, Commands};

/// Connect as the flags describe and run the chosen command.
pub async fn run(cli: Cli) -> Result<()> {
    let connection = connect::open(&cli).await?;

    let result = match cli.command {
        Commands::Accounts { json } => commands::accounts::execute(&connection.client, json).await,
        Commands::Tail {
            account,
            kind,
            count,
        } => commands::tail::execute(&connection.client, account, kind, count).await,
        Commands::Call { method, params } => {
            commands::call::execute(&connection.client, &method, &params).await
        }
    };

    connection.shutdown().await;
    result
}
