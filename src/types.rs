//! Core types for pixel time series masking
//!
//! Observation series, band roles, ordinal dates and the crate error type.

use chrono::{Datelike, NaiveDate};
use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};
use num_traits::ToPrimitive;
use serde::{Deserialize, Serialize};

/// Acquisition dates as ordinal day numbers (0001-01-01 is day 1)
pub type Dates = Array1<f64>;

/// Band values (bands x observations), raw instrument units
pub type BandMatrix = Array2<f64>;

/// Per-observation validity, `true` = clear
pub type Mask = Array1<bool>;

/// Zero-indexed rows of the two diagnostic bands in the band matrix
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BandIndices {
    /// Green band (clouds are bright here)
    pub green: usize,
    /// SWIR1 band, ~1.55-1.75um (cloud shadows are dark here)
    pub swir1: usize,
}

impl Default for BandIndices {
    fn default() -> Self {
        // Landsat TM/ETM+ band order without the thermal band
        Self { green: 1, swir1: 4 }
    }
}

impl BandIndices {
    /// Check both indices against the number of rows in a band matrix
    pub fn validate(&self, n_bands: usize) -> MaskResult<()> {
        for (name, idx) in [("green", self.green), ("swir1", self.swir1)] {
            if idx >= n_bands {
                return Err(MaskError::InvalidParameter(format!(
                    "{} band index {} is out of range for {} bands",
                    name, idx, n_bands
                )));
            }
        }
        Ok(())
    }
}

/// Convert a calendar date to its ordinal day number
pub fn ordinal_from_date(date: NaiveDate) -> i64 {
    date.num_days_from_ce() as i64
}

/// Convert an ordinal day number back to a calendar date
pub fn date_from_ordinal(ordinal: i64) -> MaskResult<NaiveDate> {
    i32::try_from(ordinal)
        .ok()
        .and_then(NaiveDate::from_num_days_from_ce_opt)
        .ok_or_else(|| MaskError::InvalidInput(format!("Ordinal day {} is out of range", ordinal)))
}

/// One pixel's time series: dates paired with band values
#[derive(Debug, Clone, PartialEq)]
pub struct ObservationSeries {
    dates: Dates,
    bands: BandMatrix,
}

impl ObservationSeries {
    /// Pair dates with a band matrix, one column per date
    pub fn new(dates: Dates, bands: BandMatrix) -> MaskResult<Self> {
        check_shape(dates.view(), bands.view())?;
        Ok(Self { dates, bands })
    }

    /// Build a series from integer ordinals and raw band values of any numeric type
    pub fn from_raw<T>(ordinals: &[i64], bands: &Array2<T>) -> MaskResult<Self>
    where
        T: ToPrimitive + Copy,
    {
        let dates = Dates::from_iter(ordinals.iter().map(|&d| d as f64));

        let mut converted = BandMatrix::zeros(bands.dim());
        for ((idx, value), out) in bands.indexed_iter().zip(converted.iter_mut()) {
            *out = value.to_f64().ok_or_else(|| {
                MaskError::InvalidInput(format!(
                    "Band value at (band {}, observation {}) is not representable as f64",
                    idx.0, idx.1
                ))
            })?;
        }

        Self::new(dates, converted)
    }

    /// Build a series from calendar dates
    pub fn from_dates<T>(dates: &[NaiveDate], bands: &Array2<T>) -> MaskResult<Self>
    where
        T: ToPrimitive + Copy,
    {
        let ordinals: Vec<i64> = dates.iter().map(|&d| ordinal_from_date(d)).collect();
        Self::from_raw(&ordinals, bands)
    }

    pub fn dates(&self) -> ArrayView1<'_, f64> {
        self.dates.view()
    }

    pub fn bands(&self) -> ArrayView2<'_, f64> {
        self.bands.view()
    }

    /// Number of observations
    pub fn len(&self) -> usize {
        self.dates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dates.is_empty()
    }

    pub fn n_bands(&self) -> usize {
        self.bands.nrows()
    }

    /// Values of one band across all observations
    pub fn band(&self, idx: usize) -> MaskResult<ArrayView1<'_, f64>> {
        if idx >= self.n_bands() {
            return Err(MaskError::InvalidParameter(format!(
                "Band index {} is out of range for {} bands",
                idx,
                self.n_bands()
            )));
        }
        Ok(self.bands.row(idx))
    }

    /// Keep only the observations where `mask` is true
    pub fn select(&self, mask: &Mask) -> MaskResult<Self> {
        if mask.len() != self.len() {
            return Err(MaskError::ShapeMismatch(format!(
                "Mask has {} entries but the series has {} observations",
                mask.len(),
                self.len()
            )));
        }

        let keep: Vec<usize> = mask
            .iter()
            .enumerate()
            .filter_map(|(i, &clear)| if clear { Some(i) } else { None })
            .collect();

        Ok(Self {
            dates: self.dates.select(Axis(0), &keep),
            bands: self.bands.select(Axis(1), &keep),
        })
    }

    /// Drop one band row, e.g. the QA band once it has been turned into a mask
    pub fn without_band(&self, idx: usize) -> MaskResult<Self> {
        self.band(idx)?;
        let keep: Vec<usize> = (0..self.n_bands()).filter(|&b| b != idx).collect();
        Ok(Self {
            dates: self.dates.clone(),
            bands: self.bands.select(Axis(0), &keep),
        })
    }
}

/// Date count must equal the number of band matrix columns
pub(crate) fn check_shape(dates: ArrayView1<f64>, bands: ArrayView2<f64>) -> MaskResult<()> {
    if dates.len() != bands.ncols() {
        return Err(MaskError::ShapeMismatch(format!(
            "{} dates but band matrix has {} observations",
            dates.len(),
            bands.ncols()
        )));
    }
    Ok(())
}

/// Error types for masking operations
#[derive(Debug, thiserror::Error)]
pub enum MaskError {
    #[error("Shape mismatch: {0}")]
    ShapeMismatch(String),

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Degenerate fit: {0}")]
    DegenerateFit(String),
}

impl MaskError {
    /// True for the error kind callers may map to an all-invalid pixel
    pub fn is_degenerate(&self) -> bool {
        matches!(self, MaskError::DegenerateFit(_))
    }
}

/// Result type for masking operations
pub type MaskResult<T> = Result<T, MaskError>;
