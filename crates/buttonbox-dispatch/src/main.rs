//! ButtonBox dispatch binary.
//!
//! Reads control commands from stdin, one per line, and fires them at the
//! configured machine as UDP datagrams.  Run `help` inside the prompt for
//! the line grammar.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use buttonbox_core::protocol::messages::{Command, ModifierFlags, PressKind};

use buttonbox_dispatch::application::dispatch_command::Dispatcher;
use buttonbox_dispatch::infrastructure::discovery::{self, DiscoveredPeer};
use buttonbox_dispatch::infrastructure::monitor::{ConnectionMonitor, MonitorTuning};
use buttonbox_dispatch::infrastructure::sender::DatagramSender;
use buttonbox_dispatch::infrastructure::settings::{
    config_file_path, load_config, load_config_from, SettingsStore,
};

// ── CLI ───────────────────────────────────────────────────────────────────────

#[derive(Debug, Parser)]
#[command(name = "buttonbox", about = "Send button-box commands to a paired machine over UDP")]
struct Args {
    /// Target host, overriding the saved configuration.
    #[arg(long, env = "BUTTONBOX_HOST")]
    host: Option<String>,

    /// Target port, overriding the saved configuration.
    #[arg(long, env = "BUTTONBOX_PORT")]
    port: Option<u16>,

    /// Explicit configuration file path.
    #[arg(long)]
    config: Option<PathBuf>,
}

// ── Line grammar ──────────────────────────────────────────────────────────────

/// One parsed prompt line.
#[derive(Debug, PartialEq)]
enum CliCommand {
    Dispatch(Command),
    Target { host: String, port: u16 },
    Discover,
    Pair,
    Status,
    Help,
    Quit,
}

const HELP_TEXT: &str = "\
commands:
  key <name> [+mod ...] [hold <ms>]   tap a key, or hold it for a duration
  hold-start <name> [+mod ...]        begin an open-ended press
  hold-stop <name>                    end an open-ended press
  axis <index> <value>                analog axis, value in -1.0..=1.0
  macro <id>                          invoke a macro by identifier
  target <host> <port>                set and persist the send target
  discover                            list receivers announcing on the LAN
  pair                                discover, then target the single answering receiver
  status                              show link status and latency
  help                                show this text
  quit                                exit
modifiers: +lctrl +rctrl +lshift +rshift +lalt +ralt +lmeta +rmeta";

fn parse_modifier(token: &str) -> Result<u8, String> {
    match token {
        "+lctrl" => Ok(ModifierFlags::LEFT_CTRL),
        "+rctrl" => Ok(ModifierFlags::RIGHT_CTRL),
        "+lshift" => Ok(ModifierFlags::LEFT_SHIFT),
        "+rshift" => Ok(ModifierFlags::RIGHT_SHIFT),
        "+lalt" => Ok(ModifierFlags::LEFT_ALT),
        "+ralt" => Ok(ModifierFlags::RIGHT_ALT),
        "+lmeta" => Ok(ModifierFlags::LEFT_META),
        "+rmeta" => Ok(ModifierFlags::RIGHT_META),
        _ => Err(format!("unknown modifier {token:?}")),
    }
}

/// Parses key-line extras: modifier tokens and an optional `hold <ms>` tail.
fn parse_key_extras(tokens: &[&str]) -> Result<(ModifierFlags, PressKind), String> {
    let mut modifiers = ModifierFlags::default();
    let mut press = PressKind::Tap;
    let mut iter = tokens.iter();
    while let Some(token) = iter.next() {
        if token.starts_with('+') {
            modifiers.0 |= parse_modifier(token)?;
        } else if *token == "hold" {
            let ms = iter
                .next()
                .ok_or("hold requires a duration in ms")?
                .parse::<u32>()
                .map_err(|_| "hold duration must be a whole number of ms".to_string())?;
            press = PressKind::Hold { duration_ms: ms };
        } else {
            return Err(format!("unexpected token {token:?}"));
        }
    }
    Ok((modifiers, press))
}

fn parse_line(line: &str) -> Result<CliCommand, String> {
    let tokens: Vec<&str> = line.split_whitespace().collect();
    match tokens.as_slice() {
        [] => Err(String::new()),
        ["key", key, rest @ ..] => {
            let (modifiers, press) = parse_key_extras(rest)?;
            Ok(CliCommand::Dispatch(Command::KeyEvent {
                key: key.to_lowercase(),
                modifiers,
                press,
            }))
        }
        ["hold-start", key, rest @ ..] => {
            let (modifiers, press) = parse_key_extras(rest)?;
            if press != PressKind::Tap {
                return Err("hold-start takes no duration; use `key <name> hold <ms>`".into());
            }
            Ok(CliCommand::Dispatch(Command::HoldStart {
                key: key.to_lowercase(),
                modifiers,
            }))
        }
        ["hold-stop", key] => Ok(CliCommand::Dispatch(Command::HoldStop {
            key: key.to_lowercase(),
        })),
        ["axis", index, value] => {
            let axis = index
                .parse::<u8>()
                .map_err(|_| "axis index must be 0-255".to_string())?;
            let value = value
                .parse::<f32>()
                .map_err(|_| "axis value must be a number".to_string())?;
            if !(-1.0..=1.0).contains(&value) {
                return Err("axis value must be in -1.0..=1.0".into());
            }
            Ok(CliCommand::Dispatch(Command::Axis {
                axis,
                value: (value * f32::from(i16::MAX)) as i16,
            }))
        }
        ["macro", macro_id] => Ok(CliCommand::Dispatch(Command::MacroInvoke {
            macro_id: (*macro_id).to_string(),
        })),
        ["target", host, port] => {
            let port = port
                .parse::<u16>()
                .map_err(|_| "port must be 1-65535".to_string())?;
            Ok(CliCommand::Target {
                host: (*host).to_string(),
                port,
            })
        }
        ["discover"] => Ok(CliCommand::Discover),
        ["pair"] => Ok(CliCommand::Pair),
        ["status"] => Ok(CliCommand::Status),
        ["help"] => Ok(CliCommand::Help),
        ["quit"] | ["exit"] => Ok(CliCommand::Quit),
        // Known verbs with the wrong shape get a usage hint, not
        // "unknown command".
        ["key"] => Err("key requires a key name; try `key w`".into()),
        ["hold-start"] => Err("hold-start requires a key name".into()),
        ["hold-stop", ..] => Err("hold-stop takes exactly one key name".into()),
        ["axis", ..] => Err("axis requires an index and a value in -1.0..=1.0".into()),
        ["macro", ..] => Err("macro requires exactly one macro identifier".into()),
        ["target", ..] => Err("target requires a host and a port".into()),
        [verb, ..] => Err(format!("unknown command {verb:?}; try `help`")),
    }
}

/// One discovery sweep with the configured port and window.
async fn run_sweep(
    store: &SettingsStore,
) -> Result<Vec<DiscoveredPeer>, discovery::DiscoveryError> {
    let config = &store.config().discovery;
    discovery::sweep(
        discovery::BROADCAST_HOST,
        config.port,
        Duration::from_millis(config.window_ms),
    )
    .await
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let (config, config_path) = match &args.config {
        Some(path) => (load_config_from(path)?, path.clone()),
        None => (load_config()?, config_file_path()?),
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config.log_level.clone())),
        )
        .init();
    info!(config = %config_path.display(), "buttonbox starting");

    let mut store = SettingsStore::new(config, config_path);
    if let (Some(host), Some(port)) = (&args.host, args.port) {
        store
            .set_target(host.clone(), port)
            .context("applying --host/--port override")?;
    } else if args.host.is_some() || args.port.is_some() {
        anyhow::bail!("--host and --port must be given together");
    }

    let sender = Arc::new(DatagramSender::new());
    let (dispatcher, mut outcomes) = Dispatcher::new(store.resolver(), sender);
    let monitor = ConnectionMonitor::spawn(
        store.resolver(),
        MonitorTuning::from(&store.config().monitor),
    );

    // Outcomes are advisory; log failures so the user sees why nothing
    // happened on the other machine.
    tokio::spawn(async move {
        while let Some(outcome) = outcomes.recv().await {
            if let Err(err) = outcome.result {
                warn!(kind = outcome.command_kind, error = %err, "command not delivered");
            }
        }
    });

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = tokio::select! {
            line = lines.next_line() => line.context("reading stdin")?,
            _ = tokio::signal::ctrl_c() => None,
        };
        let Some(line) = line else {
            break;
        };

        match parse_line(&line) {
            Ok(CliCommand::Dispatch(command)) => dispatcher.dispatch(command),
            Ok(CliCommand::Target { host, port }) => match store.set_target(host, port) {
                Ok(()) => println!("target set"),
                Err(err) => println!("error: {err}"),
            },
            Ok(CliCommand::Discover) => match run_sweep(&store).await {
                Ok(peers) if peers.is_empty() => println!("no receivers answered"),
                Ok(peers) => {
                    for peer in peers {
                        println!("{}  {}", peer.name, peer.endpoint);
                    }
                }
                Err(err) => println!("error: {err}"),
            },
            Ok(CliCommand::Pair) => match run_sweep(&store).await {
                Ok(peers) => match peers.as_slice() {
                    [] => println!("no receivers answered"),
                    [peer] => {
                        let (host, port) = (peer.endpoint.host().to_string(), peer.endpoint.port());
                        match store.set_target(host, port) {
                            Ok(()) => println!("paired with {} at {}", peer.name, peer.endpoint),
                            Err(err) => println!("error: {err}"),
                        }
                    }
                    many => {
                        println!("multiple receivers answered; pick one with `target <host> <port>`:");
                        for peer in many {
                            println!("  {}  {}", peer.name, peer.endpoint);
                        }
                    }
                },
                Err(err) => println!("error: {err}"),
            },
            Ok(CliCommand::Status) => match monitor.latency_ms() {
                Some(latency) => println!("{:?}, ~{latency} ms", monitor.status()),
                None => println!("{:?}", monitor.status()),
            },
            Ok(CliCommand::Help) => println!("{HELP_TEXT}"),
            Ok(CliCommand::Quit) => break,
            Err(msg) if msg.is_empty() => {}
            Err(msg) => println!("error: {msg}"),
        }
    }

    info!("shutting down");
    monitor.shutdown();
    if let Some(worker) = dispatcher.shutdown() {
        let _ = worker.await;
    }
    monitor.stopped().await;
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────
