use crate::types::{MaskError, MaskResult, Mask, ObservationSeries};
use ndarray::ArrayView2;
use serde::{Deserialize, Serialize};

/// Per-band value limits and QA band codes marking unusable observations
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidRangeParams {
    /// Inclusive lower limit for each spectral band
    pub min_values: Vec<f64>,
    /// Inclusive upper limit for each spectral band
    pub max_values: Vec<f64>,
    /// Row of the QA / mask band, if the matrix carries one
    #[serde(default)]
    pub mask_band: Option<usize>,
    /// QA codes that invalidate an observation (fill, cloud, shadow, ...)
    #[serde(default)]
    pub mask_values: Vec<f64>,
}

impl ValidRangeParams {
    /// Same limits for every spectral band, no QA band
    pub fn uniform(n_bands: usize, min: f64, max: f64) -> Self {
        Self {
            min_values: vec![min; n_bands],
            max_values: vec![max; n_bands],
            mask_band: None,
            mask_values: Vec::new(),
        }
    }
}

/// Mask observations with out-of-range spectral values or flagged QA codes.
///
/// Spectral bands are all rows except `mask_band`, in their original order;
/// the limit vectors must have one entry per spectral band.
pub fn valid_range_mask(bands: ArrayView2<f64>, params: &ValidRangeParams) -> MaskResult<Mask> {
    let n_rows = bands.nrows();
    if let Some(qa) = params.mask_band {
        if qa >= n_rows {
            return Err(MaskError::InvalidParameter(format!(
                "Mask band {} is out of range for {} bands",
                qa, n_rows
            )));
        }
    }

    let spectral: Vec<usize> = (0..n_rows).filter(|&b| Some(b) != params.mask_band).collect();
    if params.min_values.len() != spectral.len() || params.max_values.len() != spectral.len() {
        return Err(MaskError::InvalidParameter(format!(
            "Expected {} min/max limits, got {} and {}",
            spectral.len(),
            params.min_values.len(),
            params.max_values.len()
        )));
    }

    let mut mask = Mask::from_elem(bands.ncols(), true);
    for (limit, &b) in spectral.iter().enumerate() {
        let (lo, hi) = (params.min_values[limit], params.max_values[limit]);
        for (m, &v) in mask.iter_mut().zip(bands.row(b)) {
            *m &= v >= lo && v <= hi;
        }
    }

    if let Some(qa) = params.mask_band {
        for (m, v) in mask.iter_mut().zip(bands.row(qa)) {
            *m &= !params.mask_values.contains(v);
        }
    }

    let invalid = mask.iter().filter(|&&m| !m).count();
    if invalid > 0 {
        log::debug!("Valid-range mask removed {} of {} observations", invalid, mask.len());
    }
    Ok(mask)
}

/// Drop invalid observations and the QA band, ready for temporal masking
pub fn prepare_series(series: &ObservationSeries, params: &ValidRangeParams) -> MaskResult<ObservationSeries> {
    let mask = valid_range_mask(series.bands(), params)?;
    let selected = series.select(&mask)?;
    match params.mask_band {
        Some(qa) => selected.without_band(qa),
        None => Ok(selected),
    }
}
