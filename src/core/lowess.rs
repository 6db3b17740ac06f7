//! LOWESS: locally weighted linear regression with tricube weights.
//!
//! Each fitted value comes from a weighted linear regression over the
//! `k = floor(fraction * n)` nearest neighbours of the point. Points that lie
//! within `delta` of the last fitted point are not refit but linearly
//! interpolated.
//!
//! No guard is placed on the local fit: a neighbourhood whose weighted
//! x-variance is zero (for instance `k = 2`, where the farthest neighbour gets
//! zero weight) produces `NaN`. Callers detect narrow spans that way.

use crate::core::robust::{bisquare, median};
use crate::types::{MaskError, MaskResult};
use ndarray::{Array1, Array2, ArrayView1};
use serde::{Deserialize, Serialize};

/// Default delta as a fraction of the x range
pub const DEFAULT_DELTA_FRACTION: f64 = 0.01;

/// Residual multiple of the median beyond which robustifying weights are zero
const ROBUST_RESIDUAL_MULTIPLE: f64 = 6.0;

/// LOWESS configuration
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LowessParams {
    /// Share of the data used in each local fit
    pub fraction: f64,
    /// Distance within which points are interpolated instead of fit
    pub delta: f64,
    /// Robustifying passes after the first fit (0 = plain LOWESS)
    pub iterations: usize,
}

impl LowessParams {
    pub fn new(fraction: f64, delta: f64) -> Self {
        Self {
            fraction,
            delta,
            iterations: 0,
        }
    }

    fn validate(&self) -> MaskResult<()> {
        if !(self.fraction.is_finite() && self.fraction > 0.0) {
            return Err(MaskError::InvalidParameter(format!(
                "LOWESS fraction must be positive, got {}",
                self.fraction
            )));
        }
        if !(self.delta.is_finite() && self.delta >= 0.0) {
            return Err(MaskError::InvalidParameter(format!(
                "LOWESS delta must be non-negative, got {}",
                self.delta
            )));
        }
        Ok(())
    }
}

/// Default delta: 1% of the x range
pub fn default_delta(x: ArrayView1<f64>) -> f64 {
    let (lo, hi) = x
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)));
    if lo.is_finite() && hi.is_finite() {
        DEFAULT_DELTA_FRACTION * (hi - lo)
    } else {
        0.0
    }
}

/// Local regression smoother
#[derive(Debug, Clone)]
pub struct Lowess {
    params: LowessParams,
}

impl Lowess {
    pub fn new(fraction: f64, delta: f64) -> Self {
        Self::with_params(LowessParams::new(fraction, delta))
    }

    pub fn with_params(params: LowessParams) -> Self {
        Self { params }
    }

    pub fn params(&self) -> &LowessParams {
        &self.params
    }

    /// Neighbourhood size for `n` points
    pub fn neighbours(&self, n: usize) -> usize {
        let k = (self.params.fraction * n as f64 + 1e-10).floor() as usize;
        k.clamp(1, n.max(1))
    }

    /// Smooth `y` against `x`
    pub fn fit(&self, x: ArrayView1<f64>, y: ArrayView1<f64>) -> MaskResult<LowessFit> {
        self.params.validate()?;
        if x.len() != y.len() {
            return Err(MaskError::ShapeMismatch(format!(
                "LOWESS got {} x values and {} y values",
                x.len(),
                y.len()
            )));
        }

        let n = x.len();
        let mut order: Vec<usize> = (0..n).collect();
        order.sort_by(|&a, &b| x[a].total_cmp(&x[b]));
        let xs: Vec<f64> = order.iter().map(|&i| x[i]).collect();
        let ys: Vec<f64> = order.iter().map(|&i| y[i]).collect();

        let mut fitted = vec![0.0; n];
        if n > 0 {
            let k = self.neighbours(n);
            let mut robust_weights = vec![1.0; n];

            for pass in 0..=self.params.iterations {
                smooth_pass(&xs, &ys, k, self.params.delta, &robust_weights, &mut fitted);
                if pass == self.params.iterations {
                    break;
                }
                if !update_robust_weights(&ys, &fitted, &mut robust_weights) {
                    log::debug!("LOWESS residuals vanished after pass {}, stopping", pass + 1);
                    break;
                }
            }
        }

        Ok(LowessFit {
            x: Array1::from(xs),
            fitted: Array1::from(fitted),
            order,
        })
    }
}

/// Convenience wrapper: `Lowess::new(fraction, delta).fit(x, y)`
pub fn lowess(x: ArrayView1<f64>, y: ArrayView1<f64>, fraction: f64, delta: f64) -> MaskResult<LowessFit> {
    Lowess::new(fraction, delta).fit(x, y)
}

/// Smoothed curve, stored in ascending x order
#[derive(Debug, Clone)]
pub struct LowessFit {
    x: Array1<f64>,
    fitted: Array1<f64>,
    order: Vec<usize>,
}

impl LowessFit {
    /// Sorted abscissae
    pub fn x(&self) -> ArrayView1<'_, f64> {
        self.x.view()
    }

    /// Fitted values aligned with `x()`
    pub fn fitted(&self) -> ArrayView1<'_, f64> {
        self.fitted.view()
    }

    /// `(x_i, fitted_i)` pairs as an n x 2 matrix
    pub fn pairs(&self) -> Array2<f64> {
        Array2::from_shape_fn((self.x.len(), 2), |(i, j)| if j == 0 { self.x[i] } else { self.fitted[i] })
    }

    /// Fitted values in the order the observations were supplied
    pub fn fitted_in_input_order(&self) -> Array1<f64> {
        let mut out = Array1::from_elem(self.fitted.len(), f64::NAN);
        for (sorted_pos, &input_pos) in self.order.iter().enumerate() {
            out[input_pos] = self.fitted[sorted_pos];
        }
        out
    }

    pub fn nan_count(&self) -> usize {
        self.fitted.iter().filter(|v| v.is_nan()).count()
    }

    pub fn has_nan(&self) -> bool {
        self.fitted.iter().any(|v| v.is_nan())
    }

    pub fn len(&self) -> usize {
        self.fitted.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fitted.is_empty()
    }
}

/// One smoothing pass over sorted data
fn smooth_pass(xs: &[f64], ys: &[f64], k: usize, delta: f64, robust_weights: &[f64], fitted: &mut [f64]) {
    let n = xs.len();
    let mut left = 0;
    let mut right = k; // exclusive
    let mut i = 0;
    let mut last_fit: Option<usize> = None;

    loop {
        // Slide the window right while i sits past its midpoint
        while right < n && xs[i] > (xs[left] + xs[right]) / 2.0 {
            left += 1;
            right += 1;
        }
        let radius = (xs[i] - xs[left]).max(xs[right - 1] - xs[i]);

        fitted[i] = local_fit(xs, ys, robust_weights, i, left, right, radius);

        if let Some(last) = last_fit {
            interpolate_gap(xs, fitted, last, i);
        }

        let mut last = i;
        let cutoff = xs[i] + delta;
        let mut next = i + 1;
        while next < n && xs[next] <= cutoff {
            if xs[next] == xs[i] {
                fitted[next] = fitted[i];
                last = next;
            }
            next += 1;
        }
        last_fit = Some(last);

        if last >= n - 1 {
            break;
        }
        // Refit one before the first point past delta, always moving forward.
        // When delta reaches the end, next == n and n - 2 is refit first.
        i = (next.min(n - 1) - 1).max(last + 1);
    }
}

/// Weighted linear fit at `xs[i]` over `[left, right)`
fn local_fit(
    xs: &[f64],
    ys: &[f64],
    robust_weights: &[f64],
    i: usize,
    left: usize,
    right: usize,
    radius: f64,
) -> f64 {
    let weights: Vec<f64> = (left..right)
        .map(|j| tricube((xs[j] - xs[i]).abs() / radius) * robust_weights[j])
        .collect();

    let sum_weights: f64 = weights.iter().sum();
    if sum_weights <= 0.0 {
        return ys[i];
    }

    let window = left..right;
    let x_mean: f64 = window
        .clone()
        .zip(&weights)
        .map(|(j, w)| w * xs[j])
        .sum::<f64>()
        / sum_weights;
    let x_var: f64 = window
        .clone()
        .zip(&weights)
        .map(|(j, w)| w * (xs[j] - x_mean).powi(2))
        .sum::<f64>()
        / sum_weights;

    window
        .zip(&weights)
        .map(|(j, w)| {
            let leverage = 1.0 + (xs[i] - x_mean) * (xs[j] - x_mean) / x_var;
            w / sum_weights * leverage * ys[j]
        })
        .sum()
}

/// Tricube kernel; NaN distances propagate
#[inline]
fn tricube(d: f64) -> f64 {
    if d >= 1.0 {
        0.0
    } else {
        let t = 1.0 - d.abs().powi(3);
        t * t * t
    }
}

/// Linear interpolation between two fitted anchors
fn interpolate_gap(xs: &[f64], fitted: &mut [f64], last: usize, current: usize) {
    if current <= last + 1 {
        return;
    }

    let (x0, x1) = (xs[last], xs[current]);
    let (y0, y1) = (fitted[last], fitted[current]);
    let denom = x1 - x0;

    if denom <= 0.0 {
        let avg = (y0 + y1) / 2.0;
        fitted[(last + 1)..current].fill(avg);
        return;
    }

    let slope = (y1 - y0) / denom;
    for j in (last + 1)..current {
        fitted[j] = y0 + (xs[j] - x0) * slope;
    }
}

/// Bisquare weights from the residuals of the previous pass.
/// Returns false when the residual scale is zero.
fn update_robust_weights(ys: &[f64], fitted: &[f64], robust_weights: &mut [f64]) -> bool {
    let resid: Vec<f64> = ys.iter().zip(fitted).map(|(y, f)| y - f).collect();
    let mut abs: Vec<f64> = resid.iter().map(|r| r.abs()).collect();
    let cutoff = ROBUST_RESIDUAL_MULTIPLE * median(&mut abs);

    if !(cutoff > 0.0) {
        return false;
    }
    for (w, r) in robust_weights.iter_mut().zip(&resid) {
        *w = bisquare(r / cutoff, 1.0);
    }
    true
}
