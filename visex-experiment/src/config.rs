use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use visex_calibration::{FitType, MeasureMode};
use visex_core::Color;
use visex_signal::{WaveformSpec, PORT_BITS};

use crate::condition::Sampling;
use crate::error::ExperimentError;

/// What moves a trial from PREICI to COND
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PreIciTrigger {
    /// PreICI hold time elapsed
    Timer,
    /// External GO bit raised
    Go,
    /// Whichever happens first
    Either,
}

impl PreIciTrigger {
    pub fn fires(&self, hold_ms: f64, pre_ici_ms: f64, go: bool) -> bool {
        let elapsed = hold_ms >= pre_ici_ms;
        match self {
            PreIciTrigger::Timer => elapsed,
            PreIciTrigger::Go => go,
            PreIciTrigger::Either => elapsed || go,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExperimentConfig {
    #[serde(rename = "PreICI")]
    pub pre_ici_ms: f64,
    #[serde(rename = "CondDur")]
    pub cond_dur_ms: f64,
    #[serde(rename = "SufICI")]
    pub suf_ici_ms: f64,
    #[serde(rename = "Measure")]
    pub measure: MeasureMode,
    #[serde(rename = "FitType")]
    pub fit_type: FitType,
    #[serde(rename = "PlotMeasure")]
    pub plot_measure: bool,
    /// Overrides the sequencer's own PREICI exit rule
    #[serde(rename = "PreICITrigger")]
    pub pre_ici_trigger: Option<PreIciTrigger>,
    /// Period of stimulus time reversal while GO is held
    #[serde(rename = "ReverseDur")]
    pub reverse_dur_ms: Option<f64>,
    #[serde(rename = "Conditions")]
    pub conditions: Vec<Color>,
    #[serde(rename = "Sampling")]
    pub sampling: Sampling,
    #[serde(rename = "Seed")]
    pub seed: Option<u64>,
    #[serde(rename = "OIChannel")]
    pub oi_channel: usize,
    #[serde(rename = "DisplayID")]
    pub display_id: Option<String>,
    #[serde(rename = "MeterPort")]
    pub meter_port: Option<String>,
    #[serde(rename = "Waveform")]
    pub waveform: Vec<WaveformSpec>,
}

impl Default for ExperimentConfig {
    fn default() -> Self {
        Self {
            pre_ici_ms: 500.0,
            cond_dur_ms: 1000.0,
            suf_ici_ms: 500.0,
            measure: MeasureMode::Intensity,
            fit_type: FitType::Gamma,
            plot_measure: true,
            pre_ici_trigger: None,
            reverse_dur_ms: None,
            conditions: rgb_ramps(9),
            sampling: Sampling::Ascending,
            seed: None,
            oi_channel: 0,
            display_id: None,
            meter_port: None,
            waveform: (0..PORT_BITS).map(WaveformSpec::power_of_two).collect(),
        }
    }
}

impl ExperimentConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ExperimentError> {
        let json = fs::read_to_string(path)?;
        let config: ExperimentConfig = serde_json::from_str(&json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ExperimentError> {
        for (name, v) in [
            ("PreICI", self.pre_ici_ms),
            ("CondDur", self.cond_dur_ms),
            ("SufICI", self.suf_ici_ms),
        ] {
            if !(v.is_finite() && v >= 0.0) {
                return Err(ExperimentError::Config(format!("{name} must be >= 0, got {v}")));
            }
        }
        if let Some(r) = self.reverse_dur_ms {
            if !(r.is_finite() && r > 0.0) {
                return Err(ExperimentError::Config(format!("ReverseDur must be > 0, got {r}")));
            }
        }
        if self.waveform.len() > PORT_BITS {
            return Err(ExperimentError::Config(format!(
                "Waveform has {} entries, port has {PORT_BITS} bits",
                self.waveform.len()
            )));
        }
        if let Some((bit, _)) = self.waveform.iter().enumerate().find(|(_, w)| !w.is_valid()) {
            return Err(ExperimentError::Config(format!(
                "Waveform bit {bit} needs frequency and latency >= 0"
            )));
        }
        Ok(())
    }

    pub fn n_conditions(&self) -> usize {
        self.conditions.len()
    }

    /// Non-empty display id, if set
    pub fn display_id(&self) -> Option<&str> {
        self.display_id.as_deref().filter(|id| !id.is_empty())
    }
}

/// `steps` evenly spaced levels in `[0, 1]` on each primary in turn.
pub fn rgb_ramps(steps: usize) -> Vec<Color> {
    let levels: Vec<f64> = (0..steps)
        .map(|i| if steps > 1 { i as f64 / (steps - 1) as f64 } else { 1.0 })
        .collect();
    let mut colors = Vec::with_capacity(3 * steps);
    colors.extend(levels.iter().map(|v| Color::rgb(*v, 0.0, 0.0)));
    colors.extend(levels.iter().map(|v| Color::rgb(0.0, *v, 0.0)));
    colors.extend(levels.iter().map(|v| Color::rgb(0.0, 0.0, *v)));
    colors
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trigger_rules() {
        assert!(PreIciTrigger::Timer.fires(500.0, 500.0, false));
        assert!(!PreIciTrigger::Timer.fires(499.0, 500.0, true));
        assert!(PreIciTrigger::Go.fires(0.0, 500.0, true));
        assert!(!PreIciTrigger::Go.fires(10_000.0, 500.0, false));
        assert!(PreIciTrigger::Either.fires(0.0, 500.0, true));
        assert!(PreIciTrigger::Either.fires(600.0, 500.0, false));
    }

    #[test]
    fn parses_parameter_names() {
        let json = r#"{
            "PreICI": 200, "CondDur": 1500, "SufICI": 0,
            "Measure": "Spectral", "FitType": "CubicSpline", "PlotMeasure": false,
            "PreICITrigger": "Either", "DisplayID": "ROG",
            "Conditions": [{"r": 1, "g": 0, "b": 0}],
            "Waveform": [{"frequency_hz": 4, "latency_ms": 10}]
        }"#;
        let c: ExperimentConfig = serde_json::from_str(json).unwrap();
        assert_eq!(c.pre_ici_ms, 200.0);
        assert_eq!(c.suf_ici_ms, 0.0);
        assert_eq!(c.measure, MeasureMode::Spectral);
        assert_eq!(c.fit_type, FitType::CubicSpline);
        assert_eq!(c.pre_ici_trigger, Some(PreIciTrigger::Either));
        assert_eq!(c.display_id(), Some("ROG"));
        assert_eq!(c.conditions, vec![Color::rgb(1.0, 0.0, 0.0)]);
        assert!(c.waveform[0].enabled);
        // untouched keys keep defaults
        assert_eq!(c.sampling, Sampling::Ascending);
        c.validate().unwrap();
    }

    #[test]
    fn default_waveform_is_power_of_two_per_bit() {
        let c = ExperimentConfig::default();
        let f: Vec<f64> = c.waveform.iter().map(|w| w.frequency_hz).collect();
        assert_eq!(f, vec![1.0, 2.0, 4.0, 8.0, 16.0, 32.0, 64.0, 128.0]);
        assert_eq!(c.n_conditions(), 27);
    }

    #[test]
    fn rejects_negative_values() {
        let mut c = ExperimentConfig::default();
        c.cond_dur_ms = -1.0;
        assert!(matches!(c.validate(), Err(ExperimentError::Config(_))));

        let mut c = ExperimentConfig::default();
        c.waveform[3].latency_ms = -5.0;
        assert!(matches!(c.validate(), Err(ExperimentError::Config(_))));
    }

    #[test]
    fn empty_display_id_counts_as_missing() {
        let c = ExperimentConfig {
            display_id: Some(String::new()),
            ..ExperimentConfig::default()
        };
        assert_eq!(c.display_id(), None);
    }
}
