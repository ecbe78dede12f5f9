//! Watch command: open files as buffers and keep them in sync with disk.
//!
//! Reads line commands from stdin while the watcher runs on its own task.

use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

use anyhow::Result;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::{self, error::RecvError};

use crate::cli::args::WatchArgs;
use crate::cli::host::{BufferHost, BufferInfo};
use crate::config::Settings;
use crate::watcher::{
    Host, ReloadControl, ReloadWatcher, ResourceId, WatchError, WatchEvent, WatchStatus,
};

const HELP: &str = "\
commands:
  enable | disable | toggle   switch autoreload
  status                      show watched files
  list                        show open buffers
  open <PATH>                 open a buffer
  close <ID>                  close a buffer
  rename <ID> <PATH>          point a buffer at another file
  quit                        stop watching";

/// One line typed at the prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplCommand {
    Enable,
    Disable,
    Toggle,
    Status,
    List,
    Open(PathBuf),
    Close(ResourceId),
    Rename(ResourceId, PathBuf),
    Help,
    Quit,
}

fn parse_id(word: Option<&str>) -> Result<ResourceId, String> {
    let word = word.ok_or("missing buffer id")?;
    word.trim_start_matches('#')
        .parse()
        .map(ResourceId)
        .map_err(|_| format!("invalid buffer id: {word}"))
}

impl FromStr for ReplCommand {
    type Err = String;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let line = line.trim();
        let (verb, rest) = line.split_once(char::is_whitespace).unwrap_or((line, ""));
        let rest = rest.trim();

        match verb.to_ascii_lowercase().as_str() {
            "enable" | "on" => Ok(Self::Enable),
            "disable" | "off" => Ok(Self::Disable),
            "toggle" => Ok(Self::Toggle),
            "status" => Ok(Self::Status),
            "list" | "ls" => Ok(Self::List),
            "help" | "?" => Ok(Self::Help),
            "quit" | "exit" | "q" => Ok(Self::Quit),
            "open" if !rest.is_empty() => Ok(Self::Open(PathBuf::from(rest))),
            "open" => Err("usage: open <PATH>".to_string()),
            "close" => parse_id(rest.split_whitespace().next()).map(Self::Close),
            "rename" => {
                let (id, path) = rest
                    .split_once(char::is_whitespace)
                    .ok_or("usage: rename <ID> <PATH>")?;
                Ok(Self::Rename(parse_id(Some(id))?, PathBuf::from(path.trim())))
            }
            other => Err(format!("unknown command: {other} (try `help`)")),
        }
    }
}

/// Human-readable status block.
pub fn render_status(status: &WatchStatus) -> String {
    let state = if status.enabled { "enabled" } else { "disabled" };
    let mut out = format!("autoreload {state}, watching {} file(s)", status.watched_count);
    for file in &status.watched_files {
        out.push_str(&format!("\n  {} {}", file.id, file.path.display()));
    }
    out
}

fn render_buffers(buffers: &[BufferInfo]) -> String {
    if buffers.is_empty() {
        return "no open buffers".to_string();
    }
    buffers
        .iter()
        .map(|b| format!("{} {} ({} bytes, rev {})", b.id, b.path.display(), b.bytes, b.tick))
        .collect::<Vec<_>>()
        .join("\n")
}

fn print_json<T: serde::Serialize>(value: &T) {
    match serde_json::to_string(value) {
        Ok(line) => println!("{line}"),
        Err(e) => tracing::warn!("[cli] failed to serialize: {e}"),
    }
}

async fn print_events(mut events: broadcast::Receiver<WatchEvent>) {
    loop {
        match events.recv().await {
            Ok(event) => print_json(&event),
            Err(RecvError::Lagged(missed)) => tracing::warn!("[cli] dropped {missed} events"),
            Err(RecvError::Closed) => break,
        }
    }
}

async fn execute(
    command: ReplCommand,
    host: &BufferHost,
    control: &ReloadControl,
    json: bool,
) -> Result<(), WatchError> {
    match command {
        ReplCommand::Enable => control.enable()?,
        ReplCommand::Disable => control.disable()?,
        ReplCommand::Toggle => control.toggle()?,
        ReplCommand::Status => {
            let status = control.status().await?;
            if json {
                print_json(&status);
            } else {
                println!("{}", render_status(&status));
            }
        }
        ReplCommand::List => {
            let buffers = host.list();
            if json {
                print_json(&buffers);
            } else {
                println!("{}", render_buffers(&buffers));
            }
        }
        ReplCommand::Open(path) => {
            let id = host.open(&path);
            eprintln!("opened {id} {}", path.display());
            control.opened(id)?;
        }
        ReplCommand::Close(id) => {
            if host.close(id) {
                control.closed(id)?;
            } else {
                eprintln!("no buffer {id}");
            }
        }
        ReplCommand::Rename(id, path) => match host.rename(id, &path) {
            Some(old_path) => control.renamed(id, Some(old_path), host.resolve_path(id))?,
            None => eprintln!("no buffer {id}"),
        },
        ReplCommand::Help => eprintln!("{HELP}"),
        ReplCommand::Quit => {}
    }
    Ok(())
}

/// Run the watch command until `quit`, Ctrl-C, or end of input followed by Ctrl-C.
pub async fn run(mut settings: Settings, args: WatchArgs) -> Result<()> {
    if let Some(debounce_ms) = args.debounce_ms {
        settings.debounce_ms = debounce_ms;
    }
    settings.ignore_patterns.extend(args.ignore.iter().cloned());
    if args.paused {
        settings.auto_enable = false;
    }
    let config = settings.watch_config()?;

    let colors = !args.json
        && is_terminal::is_terminal(std::io::stderr())
        && std::env::var_os("NO_COLOR").is_none();
    let host = Arc::new(BufferHost::new(colors));
    for file in &args.files {
        host.open(file);
    }

    let watcher = ReloadWatcher::builder()
        .host(host.clone())
        .config(config)
        .build()?;
    let control = watcher.control();
    let printer = args.json.then(|| tokio::spawn(print_events(watcher.subscribe())));
    let task = tokio::spawn(watcher.run());

    if !args.json {
        eprintln!("watching {} file(s), type `help` for commands", args.files.len());
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = tokio::signal::ctrl_c() => break,
        };
        let Some(line) = line else {
            // Input closed; keep watching until interrupted
            tokio::signal::ctrl_c().await?;
            break;
        };
        if line.trim().is_empty() {
            continue;
        }

        match line.parse::<ReplCommand>() {
            Ok(ReplCommand::Quit) => break,
            Ok(command) => execute(command, &host, &control, args.json).await?,
            Err(message) => eprintln!("{message}"),
        }
    }

    control.shutdown()?;
    task.await?;
    if let Some(printer) = printer {
        printer.await?;
    }
    Ok(())
}
