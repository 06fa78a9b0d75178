use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use visex_core::{Channel, Color};

/// Field names reported by the spectroradiometer
pub mod fields {
    /// Luminance, the intensity used for fitting
    pub const INTENSITY: &str = "Y";
    pub const CIE_X: &str = "x";
    pub const CIE_Y: &str = "y";

    pub const PEAK_WAVELENGTH: &str = "PeakWavelength";
    pub const INTEGRATED_SPECTRAL: &str = "IntegratedSpectral";
    pub const INTEGRATED_PHOTON: &str = "IntegratedPhoton";
    pub const WAVELENGTHS: &str = "WL";
    pub const SPECTRAL: &str = "Spectral";

    /// Series key for the stimulus color of each sample
    pub const COLOR: &str = "Color";
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MeasureValue {
    Scalar(f64),
    Vector(Vec<f64>),
}

impl MeasureValue {
    pub fn as_scalar(&self) -> Option<f64> {
        match self {
            MeasureValue::Scalar(v) => Some(*v),
            MeasureValue::Vector(_) => None,
        }
    }

    pub fn as_vector(&self) -> Option<&[f64]> {
        match self {
            MeasureValue::Scalar(_) => None,
            MeasureValue::Vector(v) => Some(v),
        }
    }
}

impl From<f64> for MeasureValue {
    fn from(v: f64) -> Self {
        MeasureValue::Scalar(v)
    }
}

impl From<Vec<f64>> for MeasureValue {
    fn from(v: Vec<f64>) -> Self {
        MeasureValue::Vector(v)
    }
}

/// Named results of one device measurement
pub type Measurement = BTreeMap<String, MeasureValue>;

/// Append-only measurement series, one entry per completed measurement, with a
/// parallel `Color` series recording which stimulus produced each sample.
///
/// Series stay aligned only if every [`record`](Self::record) call supplies the
/// same field set.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MeasurementSeries {
    #[serde(rename = "Color", default)]
    colors: Vec<Color>,
    #[serde(flatten)]
    fields: BTreeMap<String, Vec<MeasureValue>>,
}

impl MeasurementSeries {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, measurement: Measurement, color: Color) {
        for (name, value) in measurement {
            self.fields.entry(name).or_default().push(value);
        }
        self.colors.push(color);
    }

    /// Number of recorded measurements
    pub fn len(&self) -> usize {
        self.colors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.colors.is_empty()
    }

    pub fn colors(&self) -> &[Color] {
        &self.colors
    }

    pub fn field(&self, name: &str) -> Option<&[MeasureValue]> {
        self.fields.get(name).map(Vec::as_slice)
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    /// `(drive level, value)` pairs of scalar field `name` for samples whose color
    /// isolates `channel`, in recording order.
    pub fn channel_data(&self, name: &str, channel: Channel) -> ChannelData {
        let mut data = ChannelData::default();
        let Some(values) = self.fields.get(name) else {
            return data;
        };
        for (color, value) in self.colors.iter().zip(values) {
            if let (Some(level), Some(v)) = (color.isolated(channel), value.as_scalar()) {
                data.x.push(level);
                data.y.push(v);
            }
        }
        data
    }

    /// Spectra `(drive level, wavelengths, intensities)` of samples isolating `channel`.
    pub fn channel_spectra(&self, channel: Channel) -> Vec<(f64, Vec<f64>, Vec<f64>)> {
        let (Some(wl), Some(spd)) = (
            self.fields.get(fields::WAVELENGTHS),
            self.fields.get(fields::SPECTRAL),
        ) else {
            return Vec::new();
        };
        self.colors
            .iter()
            .zip(wl.iter().zip(spd))
            .filter_map(|(color, (w, s))| {
                let level = color.isolated(channel)?;
                Some((level, w.as_vector()?.to_vec(), s.as_vector()?.to_vec()))
            })
            .collect()
    }
}

/// Paired samples for one channel
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChannelData {
    pub x: Vec<f64>,
    pub y: Vec<f64>,
}

impl ChannelData {
    pub fn new(x: Vec<f64>, y: Vec<f64>) -> Self {
        Self { x, y }
    }

    pub fn len(&self) -> usize {
        self.x.len().min(self.y.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Sorted by `x` with repeated `x` values replaced by their mean `y`, so the
    /// result is strictly ascending in `x`. Non-finite pairs are dropped.
    pub fn prepared(&self) -> ChannelData {
        let mut pairs: Vec<(f64, f64)> = self
            .x
            .iter()
            .zip(&self.y)
            .map(|(x, y)| (*x, *y))
            .filter(|(x, y)| x.is_finite() && y.is_finite())
            .collect();
        pairs.sort_by(|a, b| a.0.total_cmp(&b.0));

        let mut out = ChannelData::default();
        let mut i = 0;
        while i < pairs.len() {
            let x = pairs[i].0;
            let run: Vec<f64> = pairs[i..]
                .iter()
                .take_while(|(px, _)| *px == x)
                .map(|(_, y)| *y)
                .collect();
            i += run.len();
            out.x.push(x);
            out.y.push(run.iter().sum::<f64>() / run.len() as f64);
        }
        out
    }

    /// `y` rescaled to `[0, 1]`; `None` when all `y` are equal.
    pub fn normalized(&self) -> Option<ChannelData> {
        let min = self.y.iter().copied().fold(f64::INFINITY, f64::min);
        let max = self.y.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let range = max - min;
        if !(range.is_finite() && range > 0.0) {
            return None;
        }
        Some(ChannelData {
            x: self.x.clone(),
            y: self.y.iter().map(|v| (v - min) / range).collect(),
        })
    }

    /// Same samples with the axes swapped
    pub fn swapped(&self) -> ChannelData {
        ChannelData {
            x: self.y.clone(),
            y: self.x.clone(),
        }
    }
}
