//! Multi-temporal cloud and cloud-shadow masking
//!
//! Both policies fit a temporal baseline to the green and SWIR1 bands and
//! flag observations that deviate from it: clouds are too bright in green,
//! shadows are too dark in SWIR1. The robust policy uses a bisquare harmonic
//! regression (CCDC "Tmask"), the smoothing policy a LOWESS curve whose span
//! is widened until the fit is numerically clean.

use crate::core::diagnostics::{DiagnosticsSink, MaskDiagnostics};
use crate::core::harmonic::{design_matrix_with, HarmonicParams};
use crate::core::lowess::{default_delta, Lowess, LowessParams};
use crate::core::robust::RobustLinearModel;
use crate::types::{check_shape, BandIndices, MaskError, MaskResult, Mask};
use ndarray::{Array1, ArrayView1, ArrayView2, Zip};
use serde::{Deserialize, Serialize};

/// Default residual threshold in raw reflectance units
pub const DEFAULT_CRIT: f64 = 400.0;

/// Robust (harmonic regression) masking parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RobustMaskParams {
    /// Years treated as one slow cycle; rounded up
    pub n_year: f64,
    /// Residual threshold
    #[serde(default = "default_crit")]
    pub crit: f64,
    #[serde(default)]
    pub bands: BandIndices,
    /// Fits allowed per band, including the initial OLS fit
    #[serde(default = "default_robust_maxiter")]
    pub maxiter: usize,
    #[serde(default)]
    pub harmonic: HarmonicParams,
}

impl RobustMaskParams {
    pub fn new(n_year: f64) -> Self {
        Self {
            n_year,
            crit: DEFAULT_CRIT,
            bands: BandIndices::default(),
            maxiter: default_robust_maxiter(),
            harmonic: HarmonicParams::default(),
        }
    }
}

/// Smoothing (LOWESS) masking parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SmoothMaskParams {
    /// Initial LOWESS span as a point count
    pub span: usize,
    /// Residual threshold
    #[serde(default = "default_crit")]
    pub crit: f64,
    #[serde(default)]
    pub bands: BandIndices,
    /// LOWESS attempts, widening the span by one after each NaN result
    #[serde(default = "default_smooth_maxiter")]
    pub maxiter: usize,
}

impl SmoothMaskParams {
    pub fn new(span: usize) -> Self {
        Self {
            span,
            crit: DEFAULT_CRIT,
            bands: BandIndices::default(),
            maxiter: default_smooth_maxiter(),
        }
    }
}

fn default_crit() -> f64 {
    DEFAULT_CRIT
}

fn default_robust_maxiter() -> usize {
    10
}

fn default_smooth_maxiter() -> usize {
    5
}

/// Outcome of the smoothing policy, including how the retries went
#[derive(Debug, Clone)]
pub struct SmoothMaskOutcome {
    pub mask: Mask,
    /// Span of the curves the mask was computed from
    pub final_span: usize,
    /// LOWESS attempts made
    pub attempts: usize,
    /// False when the attempts ran out with NaN still in a curve
    pub converged: bool,
}

/// Two-sided residual test.
///
/// An observation is clear when its green residual is below `crit` and its
/// SWIR1 residual is above `-crit`. Any NaN makes the observation masked.
pub fn threshold_mask(
    green: ArrayView1<f64>,
    green_fit: ArrayView1<f64>,
    swir1: ArrayView1<f64>,
    swir1_fit: ArrayView1<f64>,
    crit: f64,
) -> Mask {
    let mut mask = Mask::from_elem(green.len(), false);
    Zip::from(&mut mask)
        .and(&green)
        .and(&green_fit)
        .and(&swir1)
        .and(&swir1_fit)
        .for_each(|m, &g, &gf, &s, &sf| {
            *m = (g - gf) < crit && (s - sf) > -crit;
        });
    mask
}

/// Robust multi-temporal mask of one pixel
pub fn multitemp_mask(x: ArrayView1<f64>, y: ArrayView2<f64>, params: &RobustMaskParams) -> MaskResult<Mask> {
    let (mask, _) = robust_mask_and_fits(x, y, params)?;
    Ok(mask)
}

/// Robust multi-temporal mask, handing the fitted curves to a sink
pub fn multitemp_mask_with_diagnostics(
    x: ArrayView1<f64>,
    y: ArrayView2<f64>,
    params: &RobustMaskParams,
    sink: &mut dyn DiagnosticsSink,
) -> MaskResult<Mask> {
    let (mask, (green_fit, swir1_fit)) = robust_mask_and_fits(x, y, params)?;
    report(sink, x, y, &mask, params.bands, &green_fit, &swir1_fit);
    Ok(mask)
}

fn robust_mask_and_fits(
    x: ArrayView1<f64>,
    y: ArrayView2<f64>,
    params: &RobustMaskParams,
) -> MaskResult<(Mask, (Array1<f64>, Array1<f64>))> {
    validate_inputs(x, y, params.bands, params.crit)?;
    if !(params.n_year.is_finite() && params.n_year > 0.0) {
        return Err(MaskError::InvalidParameter(format!(
            "n_year must be positive, got {}",
            params.n_year
        )));
    }
    if !(params.harmonic.days_per_year.is_finite() && params.harmonic.days_per_year > 0.0) {
        return Err(MaskError::InvalidParameter(format!(
            "days_per_year must be positive, got {}",
            params.harmonic.days_per_year
        )));
    }

    log::debug!(
        "Robust temporal mask: {} observations, n_year={}, crit={}",
        x.len(),
        params.n_year,
        params.crit
    );

    let green = y.row(params.bands.green);
    let swir1 = y.row(params.bands.swir1);
    let design = design_matrix_with(x, params.n_year, &params.harmonic);
    let estimator = RobustLinearModel::with_max_iterations(params.maxiter);

    let green_fit = estimator
        .fit(design.view(), green)
        .map_err(|e| band_context(e, "green"))?
        .predict(design.view())?;
    let swir1_fit = estimator
        .fit(design.view(), swir1)
        .map_err(|e| band_context(e, "swir1"))?
        .predict(design.view())?;

    let mask = threshold_mask(green, green_fit.view(), swir1, swir1_fit.view(), params.crit);
    log_mask_summary("Robust", &mask);
    Ok((mask, (green_fit, swir1_fit)))
}

/// Smoothing multi-temporal mask of one pixel
pub fn smooth_mask(x: ArrayView1<f64>, y: ArrayView2<f64>, params: &SmoothMaskParams) -> MaskResult<Mask> {
    Ok(smooth_mask_outcome(x, y, params)?.mask)
}

/// Smoothing multi-temporal mask with retry details
pub fn smooth_mask_outcome(
    x: ArrayView1<f64>,
    y: ArrayView2<f64>,
    params: &SmoothMaskParams,
) -> MaskResult<SmoothMaskOutcome> {
    let (outcome, _) = smooth_mask_and_fits(x, y, params)?;
    Ok(outcome)
}

/// Smoothing multi-temporal mask, handing the final curves to a sink
pub fn smooth_mask_with_diagnostics(
    x: ArrayView1<f64>,
    y: ArrayView2<f64>,
    params: &SmoothMaskParams,
    sink: &mut dyn DiagnosticsSink,
) -> MaskResult<SmoothMaskOutcome> {
    let (outcome, (green_fit, swir1_fit)) = smooth_mask_and_fits(x, y, params)?;
    report(sink, x, y, &outcome.mask, params.bands, &green_fit, &swir1_fit);
    Ok(outcome)
}

fn smooth_mask_and_fits(
    x: ArrayView1<f64>,
    y: ArrayView2<f64>,
    params: &SmoothMaskParams,
) -> MaskResult<(SmoothMaskOutcome, (Array1<f64>, Array1<f64>))> {
    validate_inputs(x, y, params.bands, params.crit)?;
    if params.span == 0 {
        return Err(MaskError::InvalidParameter("LOWESS span must be at least 1".to_string()));
    }
    if params.maxiter == 0 {
        return Err(MaskError::InvalidParameter(
            "Smoothing mask needs at least one LOWESS attempt".to_string(),
        ));
    }

    let n = x.len() as f64;
    let delta = default_delta(x);
    let green = y.row(params.bands.green);
    let swir1 = y.row(params.bands.swir1);

    let mut span = params.span;
    let mut attempts = 0;
    let (green_fit, swir1_fit, converged) = loop {
        let estimator = Lowess::with_params(LowessParams::new(span as f64 / n, delta));
        let green_fit = estimator.fit(x, green)?;
        let swir1_fit = estimator.fit(x, swir1)?;
        attempts += 1;

        let clean = !green_fit.has_nan() && !swir1_fit.has_nan();
        if clean || attempts >= params.maxiter {
            break (green_fit, swir1_fit, clean);
        }

        log::debug!(
            "LOWESS span {} left {} green and {} swir1 NaN values, widening",
            span,
            green_fit.nan_count(),
            swir1_fit.nan_count()
        );
        span += 1;
    };

    if !converged {
        log::warn!(
            "LOWESS still produced NaN after {} attempts (span {}); affected observations are masked",
            attempts,
            span
        );
    }

    let green_fit = green_fit.fitted_in_input_order();
    let swir1_fit = swir1_fit.fitted_in_input_order();
    let mask = threshold_mask(green, green_fit.view(), swir1, swir1_fit.view(), params.crit);
    log_mask_summary("Smoothing", &mask);

    let outcome = SmoothMaskOutcome {
        mask,
        final_span: span,
        attempts,
        converged,
    };
    Ok((outcome, (green_fit, swir1_fit)))
}

fn validate_inputs(x: ArrayView1<f64>, y: ArrayView2<f64>, bands: BandIndices, crit: f64) -> MaskResult<()> {
    check_shape(x, y)?;
    bands.validate(y.nrows())?;

    if x.is_empty() {
        return Err(MaskError::InvalidInput("Series has no observations".to_string()));
    }
    if !crit.is_finite() {
        return Err(MaskError::InvalidParameter(format!("crit must be finite, got {}", crit)));
    }
    if x.iter().any(|v| !v.is_finite()) {
        return Err(MaskError::InvalidInput("Dates contain non-finite values".to_string()));
    }
    for (name, idx) in [("green", bands.green), ("swir1", bands.swir1)] {
        if y.row(idx).iter().any(|v| !v.is_finite()) {
            return Err(MaskError::InvalidInput(format!("{} band contains non-finite values", name)));
        }
    }
    Ok(())
}

fn band_context(err: MaskError, band: &str) -> MaskError {
    match err {
        MaskError::DegenerateFit(msg) => MaskError::DegenerateFit(format!("{} band: {}", band, msg)),
        other => other,
    }
}

fn log_mask_summary(policy: &str, mask: &Mask) {
    let clear = mask.iter().filter(|&&m| m).count();
    log::debug!(
        "{} temporal mask: {} of {} observations clear",
        policy,
        clear,
        mask.len()
    );
}

fn report(
    sink: &mut dyn DiagnosticsSink,
    x: ArrayView1<f64>,
    y: ArrayView2<f64>,
    mask: &Mask,
    bands: BandIndices,
    green_fit: &Array1<f64>,
    swir1_fit: &Array1<f64>,
) {
    for (band, fitted) in [(bands.green, green_fit), (bands.swir1, swir1_fit)] {
        sink.record(MaskDiagnostics {
            band,
            dates: x.to_vec(),
            values: y.row(band).to_vec(),
            mask: mask.to_vec(),
            fitted: fitted.to_vec(),
        });
    }
}
