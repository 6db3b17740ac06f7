use ndarray::{Array2, ArrayView1};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

/// Mean length of a year in days
pub const DAYS_PER_YEAR: f64 = 365.25;

/// Columns in the harmonic design matrix
pub const N_HARMONIC_TERMS: usize = 5;

/// Harmonic basis configuration
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HarmonicParams {
    /// Period of the annual harmonic in days
    pub days_per_year: f64,
}

impl Default for HarmonicParams {
    fn default() -> Self {
        Self {
            days_per_year: DAYS_PER_YEAR,
        }
    }
}

/// Build the harmonic design matrix with the default year length.
///
/// Columns are `[1, cos(wx), sin(wx), cos(wx/n), sin(wx/n)]` where
/// `w = 2pi / 365.25` and `n = ceil(n_year)`.
pub fn design_matrix(x: ArrayView1<f64>, n_year: f64) -> Array2<f64> {
    design_matrix_with(x, n_year, &HarmonicParams::default())
}

/// Build the harmonic design matrix with an explicit year length
pub fn design_matrix_with(x: ArrayView1<f64>, n_year: f64, params: &HarmonicParams) -> Array2<f64> {
    let n_year = n_year.ceil();
    let w = 2.0 * PI / params.days_per_year;
    let w_slow = w / n_year;

    Array2::from_shape_fn((x.len(), N_HARMONIC_TERMS), |(i, j)| match j {
        0 => 1.0,
        1 => (w * x[i]).cos(),
        2 => (w * x[i]).sin(),
        3 => (w_slow * x[i]).cos(),
        _ => (w_slow * x[i]).sin(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::{array, Array1};

    #[test]
    fn test_design_matrix_shape_and_intercept() {
        let x = Array1::linspace(730000.0, 730730.0, 17);
        let design = design_matrix(x.view(), 2.0);

        assert_eq!(design.dim(), (17, N_HARMONIC_TERMS));
        assert!(design.column(0).iter().all(|&v| v == 1.0));
    }

    #[test]
    fn test_annual_terms_repeat_each_year() {
        let x = array![730000.0, 730000.0 + DAYS_PER_YEAR];
        let design = design_matrix(x.view(), 3.0);

        for j in 1..3 {
            assert_abs_diff_eq!(design[[0, j]], design[[1, j]], epsilon = 1e-9);
        }
        // The slow harmonic has not completed a cycle after one year
        assert!((design[[0, 3]] - design[[1, 3]]).abs() > 1e-3);
    }

    #[test]
    fn test_n_year_is_rounded_up() {
        let x = array![730001.0, 730123.0, 730400.0];
        let rounded = design_matrix(x.view(), 2.2);
        let explicit = design_matrix(x.view(), 3.0);
        assert_eq!(rounded, explicit);
    }

    #[test]
    fn test_custom_year_length() {
        let x = array![0.0, 182.5];
        let params = HarmonicParams { days_per_year: 365.0 };
        let design = design_matrix_with(x.view(), 1.0, &params);
        assert_abs_diff_eq!(design[[1, 1]], -1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(design[[1, 2]], 0.0, epsilon = 1e-12);
    }
}
