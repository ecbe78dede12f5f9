//! CLI argument parsing using clap.

use clap::{
    Args, Parser, Subcommand,
    builder::styling::{AnsiColor, Effects, Styles},
};
use std::path::PathBuf;

fn clap_cargo_style() -> Styles {
    Styles::styled()
        .header(AnsiColor::Cyan.on_default() | Effects::BOLD)
        .usage(AnsiColor::Cyan.on_default() | Effects::BOLD)
        .literal(AnsiColor::Green.on_default())
        .placeholder(AnsiColor::Green.on_default())
}

const AFTER_HELP: &str = "\
Quick Start:
  $ autoreload watch notes.md todo.md        # Watch two files
  $ autoreload watch --ignore '*.log' *.txt  # Skip log files
  $ autoreload config --init                 # Write .autoreload/settings.toml

While watching, type a command and press enter:
  enable | disable | toggle | status | list
  open <PATH> | close <ID> | rename <ID> <PATH> | quit";

/// Reload files automatically when they change on disk
#[derive(Parser, Debug)]
#[command(
    name = "autoreload",
    version = env!("CARGO_PKG_VERSION"),
    about = "Reload files automatically when they change on disk",
    next_line_help = true,
    styles = clap_cargo_style(),
    after_help = AFTER_HELP
)]
pub struct Cli {
    /// Path to custom settings.toml file
    #[arg(short, long, global = true, env = "AR_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Watch files and reload them when they change
    Watch(WatchArgs),

    /// Display active settings or create a settings file
    Config {
        /// Write a default settings file to .autoreload/settings.toml
        #[arg(long)]
        init: bool,

        /// Overwrite an existing settings file
        #[arg(short, long, requires = "init")]
        force: bool,
    },
}

#[derive(Args, Debug, Clone)]
pub struct WatchArgs {
    /// Files to open and watch
    #[arg(required = true)]
    pub files: Vec<PathBuf>,

    /// Quiet period in milliseconds (overrides config)
    #[arg(long)]
    pub debounce_ms: Option<u64>,

    /// Extra ignore pattern, may be repeated
    #[arg(long = "ignore", value_name = "PATTERN")]
    pub ignore: Vec<String>,

    /// Print watch events and status as JSON lines
    #[arg(long)]
    pub json: bool,

    /// Start disabled; use `enable` to begin watching
    #[arg(long)]
    pub paused: bool,
}
