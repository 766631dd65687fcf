//! # spasy
//!
//! Command-line front end for Spatial Sync on an in-memory named-content
//! network.
//!
//! ```text
//! spasy demo --nodes 4 --operations 60 --strategy concurrent
//! spasy run node.json --actions node.actions
//! ```

mod actions;
mod population;
mod simulation;

use actions::{parse_script, ActionError, ScriptRunner};
use clap::{Parser, Subcommand};
use simulation::{run_demo, DemoOptions};
use spasy_sync::SyncConfig;
use spasy_transport::{FetchStrategy, MemoryNetwork};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "spasy")]
#[command(about = "Spatial Sync: geocoded Merkle quadtree synchronization")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Several in-memory nodes apply random inserts and deletes, then report convergence
    Demo {
        #[arg(short, long, default_value_t = 3)]
        nodes: usize,
        #[arg(short, long, default_value_t = 40)]
        operations: usize,
        #[arg(long, default_value_t = 7)]
        seed: u64,
        /// sequential, concurrent or batched
        #[arg(long, default_value_t = FetchStrategy::Batched)]
        strategy: FetchStrategy,
        #[arg(long, default_value = "dpwhwt")]
        zone: String,
        #[arg(long, default_value_t = 4)]
        max_depth: usize,
        /// Update log capacity per tree
        #[arg(long, default_value_t = 32)]
        log_capacity: usize,
        /// One-way network latency in milliseconds
        #[arg(long, default_value_t = 1)]
        latency_ms: u64,
    },
    /// Execute an action script against one node
    Run {
        /// JSON node configuration
        config: PathBuf,
        /// Script with one INIT/PEER/JOIN/ADD/DELETE/POPULATE/WAIT/DUMP per line
        #[arg(short, long)]
        actions: PathBuf,
    },
}

fn init_tracing(default_level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("failed to start runtime: {}", e);
            return ExitCode::FAILURE;
        }
    };

    match cli.command {
        Commands::Demo {
            nodes,
            operations,
            seed,
            strategy,
            zone,
            max_depth,
            log_capacity,
            latency_ms,
        } => {
            init_tracing("warn");
            let options = DemoOptions {
                nodes,
                operations,
                seed,
                strategy,
                zone,
                max_depth,
                log_capacity,
                latency: Duration::from_millis(latency_ms),
                ..DemoOptions::default()
            };
            match runtime.block_on(run_demo(options)) {
                Ok(report) => {
                    report.print();
                    if report.converged {
                        ExitCode::SUCCESS
                    } else {
                        ExitCode::FAILURE
                    }
                }
                Err(e) => {
                    error!("demo failed: {}", e);
                    ExitCode::FAILURE
                }
            }
        }
        Commands::Run { config, actions } => {
            let config = match SyncConfig::from_json_file(&config) {
                Ok(config) => config,
                Err(e) => {
                    eprintln!("failed to load {}: {}", config.display(), e);
                    return ExitCode::FAILURE;
                }
            };
            init_tracing(&config.log_level);

            match runtime.block_on(run_script(config, actions)) {
                Ok(()) => ExitCode::SUCCESS,
                Err(e) => {
                    error!("{}", e);
                    ExitCode::FAILURE
                }
            }
        }
    }
}

async fn run_script(config: SyncConfig, path: PathBuf) -> Result<(), ActionError> {
    let commands = parse_script(&std::fs::read_to_string(&path)?)?;
    info!(
        "{} running {} actions from {}",
        config.node_name,
        commands.len(),
        path.display()
    );

    let network = Arc::new(MemoryNetwork::new());
    let mut runner = ScriptRunner::new(config, network)?;
    let result = runner.run(&commands).await;

    for zone in runner.node().zones() {
        let root = runner.node().root_hash(&zone);
        let behind = runner
            .peers()
            .iter()
            .filter(|peer| peer.root_hash(&zone) != root)
            .count();
        info!("zone {}: {} of {} peers behind", zone, behind, runner.peers().len());
    }
    runner.shutdown().await;
    result
}
