use serde::{Deserialize, Serialize};

use crate::error::FitError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SplineKind {
    Linear,
    /// Natural cubic spline (zero second derivative at both ends)
    Cubic,
}

/// Piecewise interpolant through every knot. Outside the knot range it holds
/// the nearest boundary value instead of extrapolating.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Interpolant {
    pub kind: SplineKind,
    xs: Vec<f64>,
    ys: Vec<f64>,
    /// Second derivatives at the knots, empty for linear
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    m: Vec<f64>,
}

pub fn fit_spline(x: &[f64], y: &[f64], kind: SplineKind) -> Result<Interpolant, FitError> {
    if x.len() != y.len() {
        return Err(FitError::LengthMismatch {
            x: x.len(),
            y: y.len(),
        });
    }
    if x.len() < 2 {
        return Err(FitError::InsufficientData {
            got: x.len(),
            need: 2,
        });
    }
    if x.iter().chain(y).any(|v| !v.is_finite()) {
        return Err(FitError::InvalidData);
    }
    if x.windows(2).any(|w| w[1] <= w[0]) {
        return Err(FitError::Unsorted);
    }
    let m = match kind {
        SplineKind::Linear => Vec::new(),
        SplineKind::Cubic => natural_second_derivatives(x, y),
    };
    Ok(Interpolant {
        kind,
        xs: x.to_vec(),
        ys: y.to_vec(),
        m,
    })
}

impl Interpolant {
    pub fn domain(&self) -> (f64, f64) {
        (self.xs[0], self.xs[self.xs.len() - 1])
    }

    pub fn knots(&self) -> (&[f64], &[f64]) {
        (&self.xs, &self.ys)
    }

    pub fn eval(&self, x: f64) -> f64 {
        let (lo, hi) = self.domain();
        let x = x.clamp(lo, hi);
        let n = self.xs.len();
        let i = self
            .xs
            .partition_point(|&k| k <= x)
            .saturating_sub(1)
            .min(n - 2);
        let (x0, x1) = (self.xs[i], self.xs[i + 1]);
        let (y0, y1) = (self.ys[i], self.ys[i + 1]);
        let h = x1 - x0;
        match self.kind {
            SplineKind::Linear => y0 + (y1 - y0) * (x - x0) / h,
            SplineKind::Cubic => {
                let (m0, m1) = (self.m[i], self.m[i + 1]);
                let a = x1 - x;
                let b = x - x0;
                m0 * a.powi(3) / (6.0 * h)
                    + m1 * b.powi(3) / (6.0 * h)
                    + (y0 / h - m0 * h / 6.0) * a
                    + (y1 / h - m1 * h / 6.0) * b
            }
        }
    }
}

/// Solves the tridiagonal system for a natural cubic spline (Thomas algorithm).
fn natural_second_derivatives(x: &[f64], y: &[f64]) -> Vec<f64> {
    let n = x.len();
    let mut m = vec![0.0; n];
    if n < 3 {
        return m;
    }
    let h: Vec<f64> = x.windows(2).map(|w| w[1] - w[0]).collect();
    let inner = n - 2;
    let mut diag = vec![0.0; inner];
    let mut upper = vec![0.0; inner];
    let mut rhs = vec![0.0; inner];
    for k in 0..inner {
        let i = k + 1;
        diag[k] = 2.0 * (h[i - 1] + h[i]);
        upper[k] = h[i];
        rhs[k] = 6.0 * ((y[i + 1] - y[i]) / h[i] - (y[i] - y[i - 1]) / h[i - 1]);
    }
    for k in 1..inner {
        let lower = h[k];
        let w = lower / diag[k - 1];
        diag[k] -= w * upper[k - 1];
        rhs[k] -= w * rhs[k - 1];
    }
    for k in (0..inner).rev() {
        let next = if k + 1 < inner { m[k + 2] } else { 0.0 };
        m[k + 1] = (rhs[k] - upper[k] * next) / diag[k];
    }
    m
}
