//! Simulated hardware for running experiments without a lab attached.

use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, info, warn};
use visex_calibration::{
    fields, DeviceError, DisplayFit, FitModel, MeasureValue, Measurement, MeasurementSeries,
    Spectroradiometer,
};
use visex_core::{Channel, Color, DigitalSample};
use visex_experiment::{CalibrationView, EnvParam, Operator, StimulusEnvironment};
use visex_signal::{ImagingMessage, ScriptedInput};

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

/// Screen state shared with the simulated meter.
#[derive(Debug, Clone, Default)]
pub struct SimulatedScreen {
    color: Arc<Mutex<Color>>,
    visible: Arc<Mutex<bool>>,
}

impl SimulatedScreen {
    pub fn new() -> Self {
        Self::default()
    }

    /// Color the meter sees: the stimulus color while visible, black otherwise.
    pub fn emitted(&self) -> Color {
        if *lock(&self.visible) {
            *lock(&self.color)
        } else {
            Color::BLACK
        }
    }
}

impl StimulusEnvironment for SimulatedScreen {
    fn set(&mut self, param: EnvParam) {
        debug!("Screen {:?}", param);
        match param {
            EnvParam::Visible(v) => *lock(&self.visible) = v,
            EnvParam::Color(c) => *lock(&self.color) = c,
            EnvParam::Drifting(_) | EnvParam::ReverseTime(_) => {}
        }
    }
}

const PRIMARY_GAMMA: [f64; 3] = [2.2, 2.35, 2.05];
const PRIMARY_MAX_CD: [f64; 3] = [28.0, 85.0, 11.0];
const PRIMARY_XY: [(f64, f64); 3] = [(0.64, 0.33), (0.30, 0.60), (0.15, 0.06)];
const PRIMARY_PEAK_NM: [f64; 3] = [612.0, 546.0, 464.0];
const PRIMARY_WIDTH_NM: f64 = 22.0;
const BLACK_LEVEL_CD: f64 = 0.15;
const PLANCK_C: f64 = 1.986_445_857e-25;

/// Spectroradiometer measuring a display with fixed per-primary gamma.
pub struct SimulatedMeter {
    port: String,
    screen: SimulatedScreen,
    rng: StdRng,
    noise: f64,
    delay: Duration,
    connected: bool,
}

impl SimulatedMeter {
    pub fn new(port: impl Into<String>, screen: SimulatedScreen, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        Self {
            port: port.into(),
            screen,
            rng,
            noise: 0.005,
            delay: Duration::from_millis(40),
            connected: false,
        }
    }

    fn luminances(&mut self, color: Color) -> [f64; 3] {
        let mut y = [0.0; 3];
        for (i, ch) in Channel::ALL.into_iter().enumerate() {
            let v = color.component(ch).clamp(0.0, 1.0);
            let jitter = 1.0 + self.rng.random_range(-self.noise..=self.noise);
            y[i] = PRIMARY_MAX_CD[i] * v.powf(PRIMARY_GAMMA[i]) * jitter + BLACK_LEVEL_CD / 3.0;
        }
        y
    }

    fn intensity(&mut self, color: Color) -> Measurement {
        let y = self.luminances(color);
        let (mut sx, mut sy, mut sz) = (0.0, 0.0, 0.0);
        for (i, (px, py)) in PRIMARY_XY.into_iter().enumerate() {
            sx += px / py * y[i];
            sy += y[i];
            sz += (1.0 - px - py) / py * y[i];
        }
        let total = sx + sy + sz;
        Measurement::from([
            (fields::INTENSITY.to_string(), MeasureValue::Scalar(sy)),
            (fields::CIE_X.to_string(), MeasureValue::Scalar(sx / total)),
            (fields::CIE_Y.to_string(), MeasureValue::Scalar(sy / total)),
        ])
    }

    fn spectral(&mut self, color: Color) -> Measurement {
        let y = self.luminances(color);
        let wl: Vec<f64> = (0..=100).map(|i| 380.0 + 4.0 * i as f64).collect();
        let power: Vec<f64> = wl
            .iter()
            .map(|l| {
                (0..3)
                    .map(|i| {
                        let d = (l - PRIMARY_PEAK_NM[i]) / PRIMARY_WIDTH_NM;
                        y[i] * 1e-3 * (-0.5 * d * d).exp()
                    })
                    .sum::<f64>()
            })
            .collect();
        let peak = wl
            .iter()
            .zip(&power)
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map_or(0.0, |(l, _)| *l);
        let energy: f64 = power.iter().sum::<f64>() * 4.0;
        let photons: f64 = wl
            .iter()
            .zip(&power)
            .map(|(l, p)| p * l * 1e-9 / PLANCK_C)
            .sum::<f64>()
            * 4.0;
        Measurement::from([
            (fields::PEAK_WAVELENGTH.to_string(), MeasureValue::Scalar(peak)),
            (fields::INTEGRATED_SPECTRAL.to_string(), MeasureValue::Scalar(energy)),
            (fields::INTEGRATED_PHOTON.to_string(), MeasureValue::Scalar(photons)),
            (fields::WAVELENGTHS.to_string(), MeasureValue::Vector(wl)),
            (fields::SPECTRAL.to_string(), MeasureValue::Vector(power)),
        ])
    }
}

impl Spectroradiometer for SimulatedMeter {
    fn connect(&mut self, timeout_ms: u64) -> Result<(), DeviceError> {
        if self.port.is_empty() {
            return Err(DeviceError::NoPort);
        }
        debug!("Connecting to simulated meter on {} ({} ms)", self.port, timeout_ms);
        self.connected = true;
        Ok(())
    }

    fn setup(&mut self, config: &str, _timeout_ms: u64) -> Result<(), DeviceError> {
        if !config.starts_with('S') {
            return Err(DeviceError::Setup(format!("unknown setup command {config:?}")));
        }
        Ok(())
    }

    fn measure(&mut self, mode_code: &str, timeout_ms: u64) -> Result<Measurement, DeviceError> {
        if !self.connected {
            return Err(DeviceError::Unavailable);
        }
        if self.delay > Duration::from_millis(timeout_ms) {
            return Err(DeviceError::Timeout(timeout_ms));
        }
        std::thread::sleep(self.delay);
        let color = self.screen.emitted();
        match mode_code {
            "1" => Ok(self.intensity(color)),
            "5" => Ok(self.spectral(color)),
            other => Err(DeviceError::Measure(format!("unsupported mode {other}"))),
        }
    }

    fn close(&mut self) {
        self.connected = false;
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum ImagerPhase {
    Idle,
    Announced,
    Acquiring,
    Resting,
}

/// Optical imaging acquisition system cycling through random stimuli.
pub struct SimulatedImager {
    input: ScriptedInput,
    channel: usize,
    n_conditions: usize,
    lead_ms: f64,
    acquire_ms: f64,
    rest_ms: f64,
    rng: StdRng,
    phase: ImagerPhase,
    next_ms: f64,
    current: Option<usize>,
}

impl SimulatedImager {
    pub fn new(
        input: ScriptedInput,
        channel: usize,
        n_conditions: usize,
        acquire_ms: f64,
        rest_ms: f64,
        seed: Option<u64>,
    ) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        Self {
            input,
            channel,
            n_conditions,
            lead_ms: 300.0,
            acquire_ms,
            rest_ms,
            rng,
            phase: ImagerPhase::Idle,
            next_ms: 0.0,
            current: None,
        }
    }

    fn send(&self, now_ms: f64, go: bool) {
        let msg = match self.current {
            Some(c) => ImagingMessage::for_condition(go, c),
            None => ImagingMessage::new(go, 0),
        };
        if let Some(msg) = msg {
            self.input.push(self.channel, DigitalSample::new(now_ms, msg.byte()));
        }
    }

    /// Emits whatever the imager would have sent by `now_ms`.
    pub fn update(&mut self, now_ms: f64) {
        while now_ms >= self.next_ms {
            let at = self.next_ms;
            self.phase = match self.phase {
                ImagerPhase::Idle | ImagerPhase::Resting => {
                    self.current = (self.n_conditions > 0)
                        .then(|| self.rng.random_range(0..self.n_conditions.min(127)));
                    self.send(at, false);
                    self.next_ms = at + self.lead_ms;
                    ImagerPhase::Announced
                }
                ImagerPhase::Announced => {
                    self.send(at, true);
                    self.next_ms = at + self.acquire_ms;
                    ImagerPhase::Acquiring
                }
                ImagerPhase::Acquiring => {
                    self.current = None;
                    self.send(at, false);
                    self.next_ms = at + self.rest_ms;
                    ImagerPhase::Resting
                }
            };
            debug!("Imager {:?} at {:.1} ms", self.phase, at);
        }
    }
}

/// Operator at the terminal. With `assume_yes` every question is answered
/// without blocking.
pub struct ConsoleOperator {
    assume_yes: bool,
    data_dir: PathBuf,
}

impl ConsoleOperator {
    pub fn new(assume_yes: bool, data_dir: PathBuf) -> Self {
        Self {
            assume_yes,
            data_dir,
        }
    }

    fn ask(&self, prompt: &str) -> Option<String> {
        print!("{prompt} ");
        io::stdout().flush().ok()?;
        let mut line = String::new();
        io::stdin().lock().read_line(&mut line).ok()?;
        Some(line.trim().to_string())
    }
}

impl Operator for ConsoleOperator {
    fn warn(&mut self, message: &str) {
        warn!("{}", message);
    }

    fn confirm(&mut self, question: &str) -> bool {
        if self.assume_yes {
            info!("{} yes", question);
            return true;
        }
        self.ask(&format!("{question} [y/N]"))
            .is_some_and(|a| a.eq_ignore_ascii_case("y") || a.eq_ignore_ascii_case("yes"))
    }

    fn save_path(&mut self, suggested: &str) -> Option<PathBuf> {
        let default = self.data_dir.join(suggested);
        if self.assume_yes {
            return Some(default);
        }
        let answer = self.ask(&format!("Save to [{}]:", default.display()))?;
        if answer.is_empty() {
            Some(default)
        } else {
            Some(PathBuf::from(answer))
        }
    }
}

/// Logs each calibration update instead of plotting it.
#[derive(Debug, Default)]
pub struct LogView;

fn describe(model: &FitModel) -> String {
    match model {
        FitModel::Identity => "identity".to_string(),
        FitModel::Gamma(p) => format!("gamma {:.3} a {:.4} c {:.4}", p.gamma, p.a, p.c),
        FitModel::LinearSpline(s) | FitModel::CubicSpline(s) => {
            format!("{:?} spline, {} knots", s.kind, s.knots().0.len())
        }
    }
}

impl CalibrationView for LogView {
    fn show_intensity(&mut self, series: &MeasurementSeries, fit: &DisplayFit) {
        info!("{} intensity measurements, {:?} fit", series.len(), fit.fit_type);
        for ch in Channel::ALL {
            let c = fit.channel(ch);
            info!(
                "  {}: forward {}, inverse {}",
                ch.name(),
                describe(&c.forward),
                describe(&c.inverse)
            );
        }
    }

    fn show_spectral(&mut self, series: &MeasurementSeries) {
        let peaks: Vec<f64> = series
            .field(fields::PEAK_WAVELENGTH)
            .unwrap_or_default()
            .iter()
            .filter_map(MeasureValue::as_scalar)
            .collect();
        info!(
            "{} spectral measurements, last peak {:?} nm",
            series.len(),
            peaks.last()
        );
    }
}
