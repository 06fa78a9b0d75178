//! Seams between the sequencers and the outside world: the renderer, the
//! operator at the console and whatever shows calibration results.

use std::path::PathBuf;

use visex_calibration::{DisplayFit, MeasurementSeries};
use visex_core::Color;

/// Parameters pushed to the stimulus renderer
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EnvParam {
    Visible(bool),
    Drifting(bool),
    ReverseTime(bool),
    Color(Color),
}

pub trait StimulusEnvironment {
    fn set(&mut self, param: EnvParam);
}

impl<T: StimulusEnvironment + ?Sized> StimulusEnvironment for Box<T> {
    fn set(&mut self, param: EnvParam) {
        (**self).set(param)
    }
}

/// Blocking operator interaction.
pub trait Operator {
    fn warn(&mut self, message: &str);
    fn confirm(&mut self, question: &str) -> bool;
    /// Destination for a standalone data file, `None` if declined.
    fn save_path(&mut self, suggested: &str) -> Option<PathBuf>;
}

/// Receives each new calibration result when plotting is enabled.
pub trait CalibrationView {
    fn show_intensity(&mut self, series: &MeasurementSeries, fit: &DisplayFit);
    fn show_spectral(&mut self, series: &MeasurementSeries);
}

/// Renderer stand-in that forgets everything.
#[derive(Debug, Default)]
pub struct NullEnvironment;

impl StimulusEnvironment for NullEnvironment {
    fn set(&mut self, _param: EnvParam) {}
}
