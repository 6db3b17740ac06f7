//! Robust linear regression by iteratively reweighted least squares (IRLS)
//!
//! Observations with large residuals are down-weighted with Tukey's bisquare
//! function, so a handful of cloudy or shadowed observations cannot drag the
//! fitted seasonal curve towards them.

use crate::types::{MaskError, MaskResult};
use nalgebra::{DMatrix, DVector};
use ndarray::{Array1, ArrayView1, ArrayView2};
use serde::{Deserialize, Serialize};

/// Tuning constant for Tukey's biweight (95% efficiency under normal errors)
pub const BISQUARE_TUNE: f64 = 4.685;

/// Normalizes the MAD to a standard deviation under normal errors
pub const MAD_SCALE_CONSTANT: f64 = 0.6745;

/// Response spread or residual scale at or below this fraction of max |y|
/// counts as zero
const SCALE_COLLAPSE_TOLERANCE: f64 = 1e-10;

/// SVD sweep limit before the solver gives up
const SVD_MAX_ITERATIONS: usize = 1000;

/// Bisquare weight of one standardized residual
#[inline]
pub fn bisquare(u: f64, c: f64) -> f64 {
    if u.abs() < c {
        let t = 1.0 - (u / c).powi(2);
        t * t
    } else {
        0.0
    }
}

/// Median absolute deviation of residuals, scaled by `c`
pub fn mad(resid: ArrayView1<f64>, c: f64) -> f64 {
    let mut abs: Vec<f64> = resid.iter().map(|r| r.abs()).collect();
    median(&mut abs) / c
}

pub(crate) fn median(values: &mut [f64]) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    values.sort_by(|a, b| a.total_cmp(b));
    let mid = values.len() / 2;
    if values.len() % 2 == 0 {
        (values[mid - 1] + values[mid]) / 2.0
    } else {
        values[mid]
    }
}

/// Weighted least squares via SVD of the row-scaled design.
///
/// Returns the coefficients and the unweighted residual vector. Fails with
/// `DegenerateFit` when the weighted design is rank deficient.
pub fn weighted_least_squares(
    x: ArrayView2<f64>,
    y: ArrayView1<f64>,
    weights: ArrayView1<f64>,
) -> MaskResult<(Array1<f64>, Array1<f64>)> {
    least_squares(x, y, weights, x.ncols())
}

/// Numerical rank of a design matrix, with numpy's `lstsq` tolerance
pub fn matrix_rank(x: ArrayView2<f64>) -> MaskResult<usize> {
    let (n, p) = x.dim();
    let m = DMatrix::from_fn(n, p, |i, j| x[[i, j]]);
    let svd = m
        .try_svd(false, false, f64::EPSILON, SVD_MAX_ITERATIONS)
        .ok_or_else(|| MaskError::DegenerateFit("SVD of the design did not converge".to_string()))?;
    let (rank, _) = numerical_rank(svd.singular_values.as_slice(), n, p);
    Ok(rank)
}

fn numerical_rank(singular_values: &[f64], n: usize, p: usize) -> (usize, f64) {
    let sigma_max = singular_values.iter().cloned().fold(0.0, f64::max);
    let tol = sigma_max * n.max(p) as f64 * f64::EPSILON;
    let rank = singular_values.iter().filter(|&&s| s > tol).count();
    (rank, tol)
}

/// Minimum-norm weighted least squares.
///
/// Singular values under the rank tolerance are dropped, so linearly
/// dependent columns share their coefficient. Fails when the weighted design
/// has lower rank than `required_rank`.
fn least_squares(
    x: ArrayView2<f64>,
    y: ArrayView1<f64>,
    weights: ArrayView1<f64>,
    required_rank: usize,
) -> MaskResult<(Array1<f64>, Array1<f64>)> {
    let (n, p) = x.dim();
    if y.len() != n || weights.len() != n {
        return Err(MaskError::ShapeMismatch(format!(
            "Design has {} rows but got {} responses and {} weights",
            n,
            y.len(),
            weights.len()
        )));
    }

    let sw: Vec<f64> = weights.iter().map(|w| w.max(0.0).sqrt()).collect();
    let xw = DMatrix::from_fn(n, p, |i, j| x[[i, j]] * sw[i]);
    let yw = DVector::from_fn(n, |i, _| y[i] * sw[i]);

    let svd = xw
        .try_svd(true, true, f64::EPSILON, SVD_MAX_ITERATIONS)
        .ok_or_else(|| MaskError::DegenerateFit("SVD of the weighted design did not converge".to_string()))?;

    let (rank, rank_tol) = numerical_rank(svd.singular_values.as_slice(), n, p);
    if rank == 0 || rank < required_rank {
        return Err(MaskError::DegenerateFit(format!(
            "Weighted design is rank deficient (rank {} of {} columns)",
            rank, p
        )));
    }

    let beta = svd
        .solve(&yw, rank_tol)
        .map_err(|e| MaskError::DegenerateFit(e.to_string()))?;

    let coef = Array1::from_iter(beta.iter().copied());
    let resid = &y - &x.dot(&coef);
    Ok((coef, resid))
}

/// Robust fit configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RobustFitParams {
    /// Bisquare tuning constant
    pub tune: f64,
    /// Divisor turning the MAD into a scale estimate
    pub scale_constant: f64,
    /// Re-estimate the scale after every refit
    pub update_scale: bool,
    /// Upper bound on fits, counting the initial OLS fit
    pub max_iterations: usize,
    /// Largest coefficient change still considered converged
    pub tol: f64,
}

impl Default for RobustFitParams {
    fn default() -> Self {
        Self {
            tune: BISQUARE_TUNE,
            scale_constant: MAD_SCALE_CONSTANT,
            update_scale: true,
            max_iterations: 50,
            tol: 1e-8,
        }
    }
}

/// Bisquare M-estimator
#[derive(Debug, Clone)]
pub struct RobustLinearModel {
    params: RobustFitParams,
}

impl Default for RobustLinearModel {
    fn default() -> Self {
        Self::new()
    }
}

impl RobustLinearModel {
    /// Create an estimator with default parameters
    pub fn new() -> Self {
        Self {
            params: RobustFitParams::default(),
        }
    }

    /// Create an estimator with custom parameters
    pub fn with_params(params: RobustFitParams) -> Self {
        Self { params }
    }

    /// Default estimator bounded to `max_iterations` fits
    pub fn with_max_iterations(max_iterations: usize) -> Self {
        Self::with_params(RobustFitParams {
            max_iterations,
            ..RobustFitParams::default()
        })
    }

    pub fn params(&self) -> &RobustFitParams {
        &self.params
    }

    /// Fit `y` against the design matrix `x`
    pub fn fit(&self, x: ArrayView2<f64>, y: ArrayView1<f64>) -> MaskResult<RobustFit> {
        let n = x.nrows();
        if n == 0 {
            return Err(MaskError::InvalidInput("Cannot fit an empty series".to_string()));
        }

        let y_magnitude = y.iter().fold(0.0_f64, |m, v| m.max(v.abs())).max(1.0);
        let scale_floor = SCALE_COLLAPSE_TOLERANCE * y_magnitude;
        let y_mean = y.sum() / n as f64;
        let spread = y.iter().fold(0.0_f64, |m, v| m.max((v - y_mean).abs()));
        if !(spread > scale_floor) {
            return Err(MaskError::DegenerateFit(format!(
                "Response spread {:e} is negligible; the series has no variation to model",
                spread
            )));
        }

        // Columns that are dependent before any weighting stay dependent;
        // only rank lost to the weights is degenerate
        let design_rank = matrix_rank(x)?;
        if design_rank < x.ncols() {
            log::debug!(
                "Design has rank {} of {} columns, using the minimum-norm solution",
                design_rank,
                x.ncols()
            );
        }

        let mut weights = Array1::<f64>::ones(n);
        let (mut coef, mut resid) = least_squares(x, y, weights.view(), design_rank)?;
        let mut scale = mad(resid.view(), self.params.scale_constant);

        let mut iteration = 1;
        let mut converged = false;
        while !converged && iteration < self.params.max_iterations {
            if !(scale > scale_floor) {
                // Exact fit, from the start or through the majority of observations
                log::debug!("Residual scale collapsed at iteration {}, stopping", iteration);
                converged = true;
                break;
            }

            let previous = coef.clone();
            weights = resid.mapv(|r| bisquare(r / scale, self.params.tune));

            let (next_coef, next_resid) = least_squares(x, y, weights.view(), design_rank)?;
            coef = next_coef;
            resid = next_resid;
            if self.params.update_scale {
                scale = mad(resid.view(), self.params.scale_constant);
            }

            iteration += 1;
            converged = coef
                .iter()
                .zip(previous.iter())
                .all(|(a, b)| (a - b).abs() <= self.params.tol);
        }

        log::debug!(
            "Robust fit finished after {} iterations (converged: {}, scale: {:.3})",
            iteration,
            converged,
            scale
        );

        Ok(RobustFit {
            coefficients: coef,
            weights,
            scale,
            iterations: iteration,
            converged,
        })
    }
}

/// Result of a robust fit
#[derive(Debug, Clone)]
pub struct RobustFit {
    coefficients: Array1<f64>,
    weights: Array1<f64>,
    scale: f64,
    iterations: usize,
    converged: bool,
}

impl RobustFit {
    /// Apply the fitted coefficients to a design matrix
    pub fn predict(&self, x: ArrayView2<f64>) -> MaskResult<Array1<f64>> {
        if x.ncols() != self.coefficients.len() {
            return Err(MaskError::ShapeMismatch(format!(
                "Design has {} columns but the model has {} coefficients",
                x.ncols(),
                self.coefficients.len()
            )));
        }
        Ok(x.dot(&self.coefficients))
    }

    pub fn coefficients(&self) -> ArrayView1<'_, f64> {
        self.coefficients.view()
    }

    /// Observation weights used by the final fit
    pub fn weights(&self) -> ArrayView1<'_, f64> {
        self.weights.view()
    }

    pub fn scale(&self) -> f64 {
        self.scale
    }

    /// Number of fits performed, including the initial OLS fit
    pub fn iterations(&self) -> usize {
        self.iterations
    }

    pub fn converged(&self) -> bool {
        self.converged
    }
}
