//! Headless runner for the visual experiment engine.
//!
//! # Usage
//!
//! ```bash
//! # Parallel port pin signal with the default configuration
//! visual-experiment run
//!
//! # Display calibration against the simulated spectroradiometer
//! visual-experiment run --config calib.json --experiment display-calibration --yes
//! ```

mod app;
mod sim;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use app::{App, ExperimentKind, RunOptions};

#[derive(Parser, Debug)]
#[command(name = "visual-experiment")]
#[command(author, version, about = "Visual stimulus experiment engine", long_about = None)]
struct Cli {
    /// Logging verbosity level
    #[arg(short, long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run an experiment against simulated hardware
    Run {
        /// Experiment configuration (JSON); defaults apply when omitted
        #[arg(short, long)]
        config: Option<PathBuf>,

        #[arg(short, long, value_enum, default_value = "pin-signal")]
        experiment: ExperimentKind,

        /// Stop after this many seconds
        #[arg(long, default_value = "10")]
        duration_s: f64,

        /// Tick rate of the experiment loop
        #[arg(long, default_value = "60")]
        refresh_hz: f64,

        /// Answer yes to every operator question
        #[arg(short, long)]
        yes: bool,

        /// Display calibration store
        #[arg(long, default_value = "displays.json")]
        store: PathBuf,

        /// Write trial records to this file on stop
        #[arg(long)]
        records: Option<PathBuf>,

        /// Drive a physical parallel port at this I/O address (hex, Linux only)
        #[arg(long)]
        port_address: Option<String>,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let log_level = match cli.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    info!("visual-experiment v{}", env!("CARGO_PKG_VERSION"));
    info!("Platform: {} {}", std::env::consts::OS, std::env::consts::ARCH);

    match cli.command {
        Commands::Run {
            config,
            experiment,
            duration_s,
            refresh_hz,
            yes,
            store,
            records,
            port_address,
        } => {
            let options = RunOptions {
                config,
                experiment,
                duration_s,
                refresh_hz,
                assume_yes: yes,
                store,
                records,
                port_address,
            };
            App::new(options)?.run()?;
        }
    }

    Ok(())
}
