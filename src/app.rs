use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::ValueEnum;
use tracing::{info, warn};
use visex_experiment::{
    CalibrationSequencer, ExperimentConfig, ExperimentError, ExternallyTriggeredSequencer,
    Sequencer, Session, StopOutcome, TimerDrivenSequencer,
};
use visex_signal::{DigitalOutput, MemoryPort, ScriptedInput};
use visex_timing::{HighPrecisionTimer, Timer};

use crate::sim::{ConsoleOperator, LogView, SimulatedImager, SimulatedMeter, SimulatedScreen};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ExperimentKind {
    /// Timer-paced trials with power-of-two waveforms on the output port
    PinSignal,
    /// Trials slaved to an optical imaging system
    OiMaster,
    /// Photometric calibration of the display
    DisplayCalibration,
}

#[derive(Debug)]
pub struct RunOptions {
    pub config: Option<PathBuf>,
    pub experiment: ExperimentKind,
    pub duration_s: f64,
    pub refresh_hz: f64,
    pub assume_yes: bool,
    pub store: PathBuf,
    pub records: Option<PathBuf>,
    pub port_address: Option<String>,
}

pub struct App {
    session: Session<HighPrecisionTimer>,
    imager: Option<SimulatedImager>,
    tick: Duration,
    duration_ms: f64,
    records: Option<PathBuf>,
}

impl App {
    pub fn new(options: RunOptions) -> Result<Self> {
        if !(options.refresh_hz.is_finite() && options.refresh_hz > 0.0) {
            anyhow::bail!("refresh rate must be positive, got {}", options.refresh_hz);
        }
        let config = match &options.config {
            Some(path) => ExperimentConfig::load(path)
                .with_context(|| format!("loading {}", path.display()))?,
            None => ExperimentConfig::default(),
        };
        info!(
            "{:?}: {} conditions, {:.1} Hz tick",
            options.experiment,
            config.n_conditions(),
            options.refresh_hz
        );

        let screen = SimulatedScreen::new();
        let mut imager = None;
        let sequencer: Box<dyn Sequencer> = match options.experiment {
            ExperimentKind::PinSignal => {
                let port = open_port(options.port_address.as_deref())?;
                Box::new(TimerDrivenSequencer::new().with_output(port))
            }
            ExperimentKind::OiMaster => {
                let input = ScriptedInput::new();
                imager = Some(SimulatedImager::new(
                    input.clone(),
                    config.oi_channel,
                    config.n_conditions(),
                    config.cond_dur_ms,
                    config.suf_ici_ms + config.pre_ici_ms,
                    config.seed,
                ));
                Box::new(ExternallyTriggeredSequencer::new(
                    Box::new(input),
                    config.oi_channel,
                ))
            }
            ExperimentKind::DisplayCalibration => {
                let port = config.meter_port.clone().unwrap_or_default();
                let meter = SimulatedMeter::new(port, screen.clone(), config.seed);
                let data_dir = options
                    .store
                    .parent()
                    .map(PathBuf::from)
                    .unwrap_or_default();
                let operator = ConsoleOperator::new(options.assume_yes, data_dir);
                let seq = CalibrationSequencer::new(
                    Box::new(meter),
                    Box::new(operator),
                    options.store.clone(),
                );
                if config.plot_measure {
                    Box::new(seq.with_view(Box::new(LogView)))
                } else {
                    Box::new(seq)
                }
            }
        };

        let session = Session::new(config, HighPrecisionTimer::new(), sequencer, Box::new(screen))?;
        Ok(Self {
            session,
            imager,
            tick: Duration::from_secs_f64(1.0 / options.refresh_hz),
            duration_ms: options.duration_s.max(0.0) * 1000.0,
            records: options.records,
        })
    }

    pub fn run(mut self) -> Result<()> {
        self.session.start()?;
        let tick_ms = self.tick.as_secs_f64() * 1000.0;
        let mut next_ms = 0.0;

        while self.session.timer().now_ms() < self.duration_ms {
            let now = self.session.timer().now_ms();
            if let Some(imager) = self.imager.as_mut() {
                imager.update(now);
            }
            match self.session.tick() {
                Ok(_) => {}
                Err(ExperimentError::DeviceUnavailable) => {
                    warn!("Spectroradiometer lost, trials continue without measurements");
                }
                Err(e) => return Err(e.into()),
            }

            next_ms += tick_ms;
            let wait_ms = next_ms - self.session.timer().now_ms();
            if wait_ms > 0.0 {
                self.session.timer().sleep(Duration::from_secs_f64(wait_ms / 1000.0));
            } else {
                // overran: resync instead of bursting to catch up
                next_ms = self.session.timer().now_ms();
            }
        }

        let stats = self.session.tick_stats();
        let outcome = self.session.stop()?;
        match &outcome {
            StopOutcome::Stopped => {}
            StopOutcome::Saved { to_store, data_file } => {
                info!("Saved to store: {}, data file: {:?}", to_store, data_file);
            }
            StopOutcome::NotSaved(reason) => warn!("Nothing saved: {}", reason),
        }

        println!("\n=== TICK STATISTICS ===");
        println!("  Ticks: {}", stats.ticks);
        println!("  Average interval: {:.3} ms", stats.average_tick_ns / 1e6);
        println!("  Jitter: {:.3} ms", stats.jitter_ns / 1e6);
        println!(
            "  Range: {:.3} - {:.3} ms",
            stats.min_tick_ns / 1e6,
            stats.max_tick_ns / 1e6
        );
        println!("  Effective rate: {:.1} Hz", stats.effective_hz);
        println!("  Trials completed: {}", self.session.records().len());

        if let Some(path) = &self.records {
            let json = serde_json::to_string_pretty(self.session.records())?;
            fs::write(path, json).with_context(|| format!("writing {}", path.display()))?;
            info!("Trial records written to {}", path.display());
        }
        Ok(())
    }
}

fn open_port(address: Option<&str>) -> Result<Box<dyn DigitalOutput>> {
    let Some(address) = address else {
        return Ok(Box::new(MemoryPort::new()));
    };
    let address = u64::from_str_radix(address.trim_start_matches("0x"), 16)
        .with_context(|| format!("invalid port address {address}"))?;
    #[cfg(target_os = "linux")]
    {
        Ok(Box::new(visex_signal::io::IoPort::open(address)?))
    }
    #[cfg(not(target_os = "linux"))]
    {
        anyhow::bail!("no parallel port access on this platform (address {address:#x})")
    }
}
