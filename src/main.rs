//! DriveWatch: live storage-device discovery with a console view.
//!
//! Thin binary entry point. All logic lives in the `drivewatch-core`
//! and `drivewatch-console` crates.

use clap::Parser;
use drivewatch_console::simulate::{simulated_backend, spawn_simulator};
use drivewatch_console::{ConsoleApp, OutputFormat};
use drivewatch_core::platform::{self, StorageBackend};
use drivewatch_core::providers::ConfiguredProviders;
use drivewatch_core::watch::spawn_bridge_reader;
use drivewatch_core::{DriveManager, DriveWatchConfig};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Parser, Debug)]
#[command(name = "drivewatch", version, about = "Watch storage devices come and go")]
struct Args {
    /// JSON configuration file.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Use scripted in-memory hardware instead of the real OS.
    #[arg(long)]
    simulate: bool,

    /// Read helper bridge events (JSON lines) from stdin.
    #[arg(long)]
    bridge_stdin: bool,

    /// Print snapshots as JSON instead of a table.
    #[arg(long)]
    json: bool,

    /// Exit after this many seconds.
    #[arg(long, value_name = "SECS")]
    exit_after: Option<u64>,

    /// Debug-level logging.
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Logs go to stderr so `--json` output on stdout stays parseable.
    tracing_subscriber::fmt()
        .with_max_level(if args.verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        })
        .with_writer(std::io::stderr)
        .init();

    tracing::info!("DriveWatch starting");

    let config = match &args.config {
        Some(path) => DriveWatchConfig::load(path)?,
        None => DriveWatchConfig::default(),
    };
    let providers = Arc::new(ConfiguredProviders::new(config.cloud_providers.clone()));

    let simulated = args.simulate.then(|| Arc::new(simulated_backend()));
    let backend: Arc<dyn StorageBackend> = match &simulated {
        Some(memory) => memory.clone(),
        None => platform::default_backend(),
    };

    let manager = Arc::new(DriveManager::new(config, backend, providers));
    let format = if args.json {
        OutputFormat::Json
    } else {
        OutputFormat::Table
    };
    let mut app = ConsoleApp::new(Arc::clone(&manager), format);
    manager.start()?;

    let _bridge_reader = if args.bridge_stdin {
        let stdin = std::io::BufReader::new(std::io::stdin());
        Some(spawn_bridge_reader(stdin, manager.bridge())?)
    } else {
        None
    };
    let simulator = match simulated {
        Some(memory) => Some(spawn_simulator(
            memory,
            manager.bridge(),
            Duration::from_secs(3),
        )?),
        None => None,
    };

    let report = manager.wait_for_enumeration();
    if let Some(report) = &report {
        tracing::info!(
            "Initial enumeration: {} drives, {} virtual",
            report.added,
            report.virtual_drives
        );
    }

    let deadline = args
        .exit_after
        .map(|secs| Instant::now() + Duration::from_secs(secs));
    let mut stdout = std::io::stdout().lock();
    let result = app.run(&mut stdout, deadline);

    if let Some(simulator) = simulator {
        simulator.stop();
    }
    manager.dispose();
    tracing::info!("DriveWatch stopped");
    result
}
