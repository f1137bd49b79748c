use std::path::{Path, PathBuf};
use std::process;

use anyhow::Context;
use clap::{Parser, Subcommand};
use serde::Serialize;
use stratum_wm::common::config::Config;
use stratum_wm::common::log;
use stratum_wm::model::store::WindowStore;
use stratum_wm::model::window::{ScreenId, StackId};
use stratum_wm::replay;
use stratum_wm::stacking::{RestackOp, Stack};
use stratum_wm::sys::server::SimulatedServer;

/// Sentinel id for the guard window that caps the bottom of the stack.
const GUARD_WINDOW: StackId = StackId(u64::MAX);

/// Drive recorded stacking traces through the engine.
#[derive(Parser)]
#[command(name = "stratum", version, about)]
struct Cli {
    /// Path to a configuration file (defaults to the user config dir).
    #[arg(long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Replay a trace and print the operations sent to the server.
    Replay {
        trace: PathBuf,
        /// Emit the operation log and final order as JSON.
        #[arg(long)]
        json: bool,
    },
    /// Replay a trace and verify that the engine invariants held.
    Validate { trace: PathBuf },
    /// Replay a trace and print the final stack as a tree of layers.
    Dump { trace: PathBuf },
}

#[derive(Serialize)]
struct ReplayReport {
    events: usize,
    operations: Vec<RestackOp>,
    final_order: Vec<StackId>,
    client_list: Vec<StackId>,
    client_list_stacking: Vec<StackId>,
}

fn main() {
    let cli = Cli::parse();
    let config = Config::load_or_default(cli.config.as_deref());
    log::init(&config.log.filter);

    if let Err(err) = run(cli.command, &config) {
        eprintln!("stratum: {err:#}");
        process::exit(1);
    }
}

fn run(command: Command, config: &Config) -> anyhow::Result<()> {
    match command {
        Command::Replay { trace, json } => {
            let (_store, stack, server, events) = run_trace(&trace)?;
            let report = ReplayReport {
                events,
                operations: server.ops().to_vec(),
                final_order: server.order().to_vec(),
                client_list: stack.client_list().to_vec(),
                client_list_stacking: stack.client_list_stacking().to_vec(),
            };
            if json {
                let rendered = if config.replay.pretty_json {
                    serde_json::to_string_pretty(&report)?
                } else {
                    serde_json::to_string(&report)?
                };
                println!("{rendered}");
            } else {
                println!("{} events applied", report.events);
                for op in &report.operations {
                    println!("  {op}");
                }
                println!("final order (bottom to top):");
                for id in &report.final_order {
                    println!("  {id}");
                }
            }
            Ok(())
        }
        Command::Validate { trace } => {
            let (mut store, mut stack, _server, events) = run_trace(&trace)?;
            let findings = stack.audit(&mut store);
            if findings.is_empty() {
                println!("ok: {events} events, {} windows, invariants hold", stack.len());
                Ok(())
            } else {
                for finding in &findings {
                    eprintln!("violation: {finding}");
                }
                anyhow::bail!("{} invariant violation(s)", findings.len());
            }
        }
        Command::Dump { trace } => {
            let (mut store, mut stack, _server, _) = run_trace(&trace)?;
            print!("{}", stack.describe(&mut store));
            Ok(())
        }
    }
}

fn run_trace(trace: &Path) -> anyhow::Result<(WindowStore, Stack, SimulatedServer, usize)> {
    let mut store = WindowStore::new();
    let mut stack = Stack::new(ScreenId::default(), GUARD_WINDOW);
    let mut server = SimulatedServer::new(GUARD_WINDOW);
    let events = replay::replay(trace, &mut store, &mut stack, &mut server)
        .with_context(|| format!("replaying {}", trace.display()))?;
    Ok((store, stack, server, events))
}
