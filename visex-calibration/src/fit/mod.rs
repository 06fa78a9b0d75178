//! Display response fitting.
//!
//! For each primary the forward map (drive level -> normalized intensity) and the
//! inverse map (normalized intensity -> drive level) are fit independently; the
//! inverse is fit on the swapped samples rather than inverted algebraically. A
//! channel without enough usable data keeps identity maps.

mod gamma;
mod spline;

pub use gamma::{fit_gamma, gamma_func, GammaParams};
pub use spline::{fit_spline, Interpolant, SplineKind};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use visex_core::Channel;

use crate::error::FitError;
use crate::measurement::{fields, ChannelData, MeasurementSeries};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum FitType {
    #[default]
    Gamma,
    LinearSpline,
    CubicSpline,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "type", content = "params")]
pub enum FitModel {
    #[default]
    Identity,
    Gamma(GammaParams),
    LinearSpline(Interpolant),
    CubicSpline(Interpolant),
}

impl FitModel {
    /// Fits `fit_type` to samples already sorted ascending in `x`.
    pub fn fit(data: &ChannelData, fit_type: FitType) -> Result<FitModel, FitError> {
        match fit_type {
            FitType::Gamma => fit_gamma(&data.x, &data.y).map(FitModel::Gamma),
            FitType::LinearSpline => {
                fit_spline(&data.x, &data.y, SplineKind::Linear).map(FitModel::LinearSpline)
            }
            FitType::CubicSpline => {
                fit_spline(&data.x, &data.y, SplineKind::Cubic).map(FitModel::CubicSpline)
            }
        }
    }

    pub fn eval(&self, x: f64) -> f64 {
        match self {
            FitModel::Identity => x,
            FitModel::Gamma(p) => p.eval(x),
            FitModel::LinearSpline(s) | FitModel::CubicSpline(s) => s.eval(x),
        }
    }

    pub fn is_identity(&self) -> bool {
        matches!(self, FitModel::Identity)
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ChannelFit {
    pub forward: FitModel,
    pub inverse: FitModel,
}

impl ChannelFit {
    pub fn identity() -> Self {
        Self::default()
    }

    /// Fits one channel. Never fails: unusable data leaves the affected map as identity.
    pub fn fit(channel: Channel, data: &ChannelData, fit_type: FitType) -> Self {
        let prepared = data.prepared();
        if prepared.len() < 2 {
            debug!("{}: {} distinct points, keeping identity", channel.name(), prepared.len());
            return Self::identity();
        }
        let Some(norm) = prepared.normalized() else {
            warn!("{}: flat response, keeping identity", channel.name());
            return Self::identity();
        };
        let forward = fit_or_identity(channel, "forward", &norm, fit_type);
        let inverse = fit_or_identity(channel, "inverse", &norm.swapped().prepared(), fit_type);
        Self { forward, inverse }
    }
}

fn fit_or_identity(channel: Channel, direction: &str, data: &ChannelData, fit_type: FitType) -> FitModel {
    FitModel::fit(data, fit_type).unwrap_or_else(|e| {
        warn!("{} {} {:?} fit failed: {}", channel.name(), direction, fit_type, e);
        FitModel::Identity
    })
}

/// Per-channel fits of one display
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DisplayFit {
    pub fit_type: FitType,
    pub r: ChannelFit,
    pub g: ChannelFit,
    pub b: ChannelFit,
}

impl DisplayFit {
    pub fn channel(&self, channel: Channel) -> &ChannelFit {
        match channel {
            Channel::R => &self.r,
            Channel::G => &self.g,
            Channel::B => &self.b,
        }
    }

    fn channel_mut(&mut self, channel: Channel) -> &mut ChannelFit {
        match channel {
            Channel::R => &mut self.r,
            Channel::G => &mut self.g,
            Channel::B => &mut self.b,
        }
    }

    /// `n`-entry linearizing table per channel: entry `i` is the drive level
    /// producing normalized intensity `i / (n - 1)`.
    pub fn inverse_lut(&self, n: usize) -> [Vec<f64>; 3] {
        Channel::ALL.map(|ch| {
            let inverse = &self.channel(ch).inverse;
            (0..n)
                .map(|i| {
                    let t = if n > 1 { i as f64 / (n - 1) as f64 } else { 0.0 };
                    inverse.eval(t).clamp(0.0, 1.0)
                })
                .collect()
        })
    }
}

/// Fits all three primaries from the intensity field of `series`.
pub fn fit_display(series: &MeasurementSeries, fit_type: FitType) -> DisplayFit {
    let mut fit = DisplayFit {
        fit_type,
        ..DisplayFit::default()
    };
    for ch in Channel::ALL {
        let data = series.channel_data(fields::INTENSITY, ch);
        *fit.channel_mut(ch) = ChannelFit::fit(ch, &data, fit_type);
    }
    fit
}
