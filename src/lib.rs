//! tsmask: multi-temporal cloud and cloud-shadow masking
//!
//! Screens per-pixel surface reflectance time series for clouds and cloud
//! shadows before change detection. A baseline is fit to the green and SWIR1
//! bands, either with a bisquare-weighted harmonic regression or with LOWESS,
//! and observations deviating too far from it are masked.

pub mod types;
pub mod core;

// Re-export main types and functions for easier access
pub use types::{
    date_from_ordinal, ordinal_from_date, BandIndices, BandMatrix, Dates, Mask, MaskError, MaskResult,
    ObservationSeries,
};

pub use crate::core::{
    multitemp_mask, smooth_mask, BlockMasker, MaskingStrategy, RobustMaskParams, SmoothMaskParams,
};

#[cfg(feature = "python")]
mod python {
    use crate::core::multitemporal;
    use crate::types::{BandIndices, MaskError};
    use numpy::{IntoPyArray, PyArray1, PyReadonlyArray1, PyReadonlyArray2};
    use pyo3::exceptions::{PyRuntimeError, PyValueError};
    use pyo3::prelude::*;

    fn to_py_err(err: MaskError) -> PyErr {
        match err {
            MaskError::DegenerateFit(_) => PyRuntimeError::new_err(err.to_string()),
            _ => PyValueError::new_err(err.to_string()),
        }
    }

    /// Multi-temporal mask using a robust harmonic regression
    #[pyfunction]
    #[pyo3(signature = (x, y, n_year, crit=400.0, green=1, swir1=4, maxiter=10))]
    #[allow(clippy::too_many_arguments)]
    fn multitemp_mask<'py>(
        py: Python<'py>,
        x: PyReadonlyArray1<f64>,
        y: PyReadonlyArray2<f64>,
        n_year: f64,
        crit: f64,
        green: usize,
        swir1: usize,
        maxiter: usize,
    ) -> PyResult<&'py PyArray1<bool>> {
        let mut params = multitemporal::RobustMaskParams::new(n_year);
        params.crit = crit;
        params.bands = BandIndices { green, swir1 };
        params.maxiter = maxiter;

        let mask = multitemporal::multitemp_mask(x.as_array(), y.as_array(), &params).map_err(to_py_err)?;
        Ok(mask.into_pyarray(py))
    }

    /// Multi-temporal mask using LOWESS with span retry
    #[pyfunction]
    #[pyo3(signature = (x, y, span, crit=400.0, green=1, swir1=4, maxiter=5))]
    #[allow(clippy::too_many_arguments)]
    fn smooth_mask<'py>(
        py: Python<'py>,
        x: PyReadonlyArray1<f64>,
        y: PyReadonlyArray2<f64>,
        span: usize,
        crit: f64,
        green: usize,
        swir1: usize,
        maxiter: usize,
    ) -> PyResult<&'py PyArray1<bool>> {
        let mut params = multitemporal::SmoothMaskParams::new(span);
        params.crit = crit;
        params.bands = BandIndices { green, swir1 };
        params.maxiter = maxiter;

        let mask = multitemporal::smooth_mask(x.as_array(), y.as_array(), &params).map_err(to_py_err)?;
        Ok(mask.into_pyarray(py))
    }

    /// Python module definition
    #[pymodule]
    fn _core(_py: Python, m: &PyModule) -> PyResult<()> {
        m.add_function(wrap_pyfunction!(multitemp_mask, m)?)?;
        m.add_function(wrap_pyfunction!(smooth_mask, m)?)?;
        Ok(())
    }
}
