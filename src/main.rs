use anyhow::anyhow;
use clap::Parser;

use autoreload::cli::commands;
use autoreload::cli::{Cli, Commands};
use autoreload::{Settings, logging};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let settings = match &cli.config {
        Some(path) => Settings::load_from(path),
        None => Settings::load(),
    }
    .map_err(|e| anyhow!("Configuration error: {e}"))?;

    logging::init_with_config(&settings.logging);

    match cli.command {
        Commands::Watch(args) => commands::watch::run(settings, args).await,
        Commands::Config { init: true, force } => commands::config::run_init(force),
        Commands::Config { init: false, .. } => commands::config::run_show(&settings),
    }
}
