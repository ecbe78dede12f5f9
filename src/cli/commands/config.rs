//! Config command: show active settings or write a default file.

use anyhow::{Result, anyhow};

use crate::config::Settings;

/// Create `.autoreload/settings.toml` with default values.
pub fn run_init(force: bool) -> Result<()> {
    let path = Settings::init_config_file(force).map_err(|e| anyhow!("{e}"))?;
    println!("Created configuration file at: {}", path.display());
    println!("Edit this file to customize your settings.");
    Ok(())
}

/// Print the merged configuration as TOML.
pub fn run_show(settings: &Settings) -> Result<()> {
    // Validate so mistakes show up here rather than at watch time
    settings.watch_config()?;

    println!("Current Configuration:");
    println!("{}", "=".repeat(50));
    println!("{}", toml::to_string_pretty(settings)?);
    Ok(())
}
