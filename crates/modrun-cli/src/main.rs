mod cli;
mod commands;
mod output;

use anyhow::Result;
use clap::Parser;
use cli::{Cli, Command};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .init();

    let cli = Cli::parse();
    let config = modrun_config::load(cli.config.as_deref())?;

    match cli.command {
        Command::Serve => commands::serve(config).await,
        Command::Scan => commands::scan(config).await,
        Command::Modules => commands::modules(config).await,
        Command::Assets => commands::assets(config).await,
        Command::Ingest { path, label, media_type } => {
            commands::ingest(config, path, label, media_type).await
        }
        Command::Value { label, value, media_type } => {
            commands::value(config, label, value, media_type).await
        }
        Command::Submit { module_id, inputs, config: task_config } => {
            commands::submit(config, module_id, inputs, task_config).await
        }
        Command::Task { id } => commands::task(config, id).await,
    }
}
