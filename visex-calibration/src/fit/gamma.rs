use nalgebra::{Matrix3, Vector3};
use serde::{Deserialize, Serialize};

use crate::error::FitError;

const MAX_ITERATIONS: usize = 500;
const LAMBDA_MIN: f64 = 1e-15;
const LAMBDA_MAX: f64 = 1e16;
const DEFAULT_GAMMA: f64 = 2.2;

/// `y = a * x^gamma + c`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GammaParams {
    pub gamma: f64,
    pub a: f64,
    pub c: f64,
}

impl GammaParams {
    pub fn eval(&self, x: f64) -> f64 {
        gamma_func(x, self.gamma, self.a, self.c)
    }

    fn as_array(&self) -> [f64; 3] {
        [self.gamma, self.a, self.c]
    }

    fn from_array(p: [f64; 3]) -> Self {
        Self {
            gamma: p[0],
            a: p[1],
            c: p[2],
        }
    }
}

pub fn gamma_func(x: f64, gamma: f64, a: f64, c: f64) -> f64 {
    a * x.max(0.0).powf(gamma) + c
}

/// Least-squares fit of `y = a * x^gamma + c` by Levenberg-Marquardt.
///
/// Requires at least three distinct non-negative `x`. Deterministic for a given
/// input; reports [`FitError::NoConvergence`] rather than returning a partial fit.
pub fn fit_gamma(x: &[f64], y: &[f64]) -> Result<GammaParams, FitError> {
    if x.len() != y.len() {
        return Err(FitError::LengthMismatch {
            x: x.len(),
            y: y.len(),
        });
    }
    if x.iter().chain(y).any(|v| !v.is_finite()) || x.iter().any(|v| *v < 0.0) {
        return Err(FitError::InvalidData);
    }
    let mut distinct: Vec<f64> = x.to_vec();
    distinct.sort_by(f64::total_cmp);
    distinct.dedup();
    if distinct.len() < 3 {
        return Err(FitError::InsufficientData {
            got: distinct.len(),
            need: 3,
        });
    }

    let mut p = initial_guess(x, y).as_array();
    let mut cost = sum_squares(x, y, &p);
    let exact = 1e-24 * y.iter().map(|v| v * v).sum::<f64>().max(f64::MIN_POSITIVE);
    let mut lambda = 1e-3;

    for _ in 0..MAX_ITERATIONS {
        if cost <= exact {
            return Ok(GammaParams::from_array(p));
        }
        let (jtj, jtr) = normal_equations(x, y, &p);
        if jtr.iter().all(|g| g.abs() < f64::MIN_POSITIVE) {
            return Ok(GammaParams::from_array(p));
        }

        let mut improved = false;
        while lambda <= LAMBDA_MAX {
            let mut m = jtj;
            for i in 0..3 {
                m[(i, i)] += lambda * jtj[(i, i)].max(1e-12);
            }
            let Some(delta) = solve3(m, -jtr) else {
                lambda *= 10.0;
                continue;
            };
            let candidate = [p[0] + delta[0], p[1] + delta[1], p[2] + delta[2]];
            if candidate[0] <= 0.0 || candidate.iter().any(|v| !v.is_finite()) {
                lambda *= 10.0;
                continue;
            }
            let c1 = sum_squares(x, y, &candidate);
            if c1 < cost {
                let small = delta
                    .iter()
                    .zip(&p)
                    .all(|(d, v)| d.abs() <= 1e-12 * (v.abs() + 1e-12));
                p = candidate;
                cost = c1;
                lambda = (lambda * 0.1).max(LAMBDA_MIN);
                improved = true;
                if small {
                    return Ok(GammaParams::from_array(p));
                }
                break;
            }
            lambda *= 10.0;
        }
        if !improved {
            // No descent direction left: at a minimum
            return if cost.is_finite() {
                Ok(GammaParams::from_array(p))
            } else {
                Err(FitError::Singular)
            };
        }
    }
    Err(FitError::NoConvergence(MAX_ITERATIONS))
}

fn initial_guess(x: &[f64], y: &[f64]) -> GammaParams {
    let c = y.iter().copied().fold(f64::INFINITY, f64::min);
    let y_max = y.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let x_max = x.iter().copied().fold(f64::NEG_INFINITY, f64::max);

    // log(y - c) = log(a) + gamma * log(x)
    let pts: Vec<(f64, f64)> = x
        .iter()
        .zip(y)
        .filter(|(xi, yi)| **xi > 0.0 && **yi - c > 0.0)
        .map(|(xi, yi)| (xi.ln(), (yi - c).ln()))
        .collect();
    let mut gamma = DEFAULT_GAMMA;
    if pts.len() >= 2 {
        let n = pts.len() as f64;
        let mx = pts.iter().map(|p| p.0).sum::<f64>() / n;
        let my = pts.iter().map(|p| p.1).sum::<f64>() / n;
        let sxx = pts.iter().map(|p| (p.0 - mx).powi(2)).sum::<f64>();
        let sxy = pts.iter().map(|p| (p.0 - mx) * (p.1 - my)).sum::<f64>();
        if sxx > 0.0 && sxy / sxx > 0.0 {
            gamma = sxy / sxx;
        }
    }
    let a = if x_max > 0.0 {
        (y_max - c) / x_max.powf(gamma)
    } else {
        y_max - c
    };
    GammaParams {
        gamma,
        a: if a.is_finite() && a != 0.0 { a } else { 1.0 },
        c,
    }
}

fn sum_squares(x: &[f64], y: &[f64], p: &[f64; 3]) -> f64 {
    x.iter()
        .zip(y)
        .map(|(xi, yi)| (gamma_func(*xi, p[0], p[1], p[2]) - yi).powi(2))
        .sum()
}

fn normal_equations(x: &[f64], y: &[f64], p: &[f64; 3]) -> (Matrix3<f64>, Vector3<f64>) {
    let [g, a, c] = *p;
    let mut jtj = Matrix3::zeros();
    let mut jtr = Vector3::zeros();
    for (xi, yi) in x.iter().zip(y) {
        let xg = xi.powf(g);
        // d/dgamma of x^g vanishes at x = 0 for g > 0
        let dg = if *xi > 0.0 { a * xg * xi.ln() } else { 0.0 };
        let j = Vector3::new(dg, xg, 1.0);
        let r = a * xg + c - yi;
        jtj += j * j.transpose();
        jtr += j * r;
    }
    (jtj, jtr)
}

fn solve3(m: Matrix3<f64>, b: Vector3<f64>) -> Option<Vector3<f64>> {
    m.lu()
        .solve(&b)
        .filter(|v| v.iter().all(|x| x.is_finite()))
}
