//! # Feature Scaling Round Trip
//!
//! Regression models in this crate are fitted on a standardized design so that
//! priors and coefficient magnitudes are comparable across columns. This module
//! owns the two directions of that contract:
//!
//! - `ScalingSpec::fit` records per-column means and sample standard
//!   deviations (ddof = 1) of the design and of the response.
//! - `ScalingSpec::standardize` maps `(X, y)` to `((X - mean) / sd, (y - mean) / sd)`.
//! - `ScalingSpec::rescale_coefficients` maps a standardized-scale weight back
//!   with `beta_orig[k] = beta_std[k] * sd(y) / sd(x_k)`.
//!
//! The multiplier is a property of the fitted spec, not of an individual
//! posterior draw, so the same spec rescales every draw of a coefficient matrix.
//! No intercept is recovered: the models fitted on standardized data pass
//! through the origin.

use crate::types::{Coefficients, StandardizedCoefficients};
use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A standard deviation at or below this many ulps of the column mean is
/// rounding noise from a constant column, not real spread.
const DEGENERATE_SD_ULPS: f64 = 4.0;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ScalingError {
    #[error(
        "Design column {column} has zero variance (sd = {sd:e}, at rounding level of its mean); its scaling factor is undefined."
    )]
    DegenerateColumn { column: usize, sd: f64 },

    #[error("The response has zero variance (sd = {sd:e}); coefficients cannot be rescaled.")]
    DegenerateResponse { sd: f64 },

    #[error("Scaling requires at least 2 rows to estimate a standard deviation, found {found}.")]
    InsufficientRows { found: usize },

    #[error("Design has {rows} rows but the response has {response_len} entries.")]
    LengthMismatch { rows: usize, response_len: usize },

    #[error("Expected {expected} design columns or coefficients, found {found}.")]
    ColumnCountMismatch { expected: usize, found: usize },

    #[error("Non-finite value encountered in {0}.")]
    NonFiniteInput(&'static str),
}

/// Column-wise location and scale captured from an original design and response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScalingSpec {
    x_mean: Array1<f64>,
    x_sd: Array1<f64>,
    y_mean: f64,
    y_sd: f64,
}

impl ScalingSpec {
    /// Computes the spec from an original-unit design `x` (n × K) and response `y` (n).
    pub fn fit(x: ArrayView2<f64>, y: ArrayView1<f64>) -> Result<Self, ScalingError> {
        let rows = x.nrows();
        if rows != y.len() {
            return Err(ScalingError::LengthMismatch {
                rows,
                response_len: y.len(),
            });
        }
        if rows < 2 {
            return Err(ScalingError::InsufficientRows { found: rows });
        }
        if x.iter().any(|v| !v.is_finite()) {
            return Err(ScalingError::NonFiniteInput("design matrix"));
        }
        if y.iter().any(|v| !v.is_finite()) {
            return Err(ScalingError::NonFiniteInput("response"));
        }

        let x_mean = x
            .mean_axis(Axis(0))
            .ok_or(ScalingError::InsufficientRows { found: rows })?;
        let x_sd = x.std_axis(Axis(0), 1.0);

        for (column, (&sd, &mean)) in x_sd.iter().zip(x_mean.iter()).enumerate() {
            if is_degenerate(sd, mean) {
                return Err(ScalingError::DegenerateColumn { column, sd });
            }
        }

        let y_mean = y.mean().ok_or(ScalingError::InsufficientRows { found: rows })?;
        let y_sd = y.std(1.0);
        if is_degenerate(y_sd, y_mean) {
            return Err(ScalingError::DegenerateResponse { sd: y_sd });
        }

        log::debug!(
            "Fitted scaling spec over {} rows and {} columns (response sd {:.6})",
            rows,
            x.ncols(),
            y_sd
        );

        Ok(Self {
            x_mean,
            x_sd,
            y_mean,
            y_sd,
        })
    }

    pub fn num_columns(&self) -> usize {
        self.x_mean.len()
    }

    pub fn column_means(&self) -> ArrayView1<'_, f64> {
        self.x_mean.view()
    }

    pub fn column_sds(&self) -> ArrayView1<'_, f64> {
        self.x_sd.view()
    }

    pub fn response_mean(&self) -> f64 {
        self.y_mean
    }

    pub fn response_sd(&self) -> f64 {
        self.y_sd
    }

    /// Per-coefficient factor `sd(y) / sd(x_k)` taking standardized weights to original units.
    pub fn multipliers(&self) -> Array1<f64> {
        self.x_sd.mapv(|sd| self.y_sd / sd)
    }

    /// Applies `(v - mean) / sd` to every design column and to the response.
    pub fn standardize(
        &self,
        x: ArrayView2<f64>,
        y: ArrayView1<f64>,
    ) -> Result<(Array2<f64>, Array1<f64>), ScalingError> {
        if x.nrows() != y.len() {
            return Err(ScalingError::LengthMismatch {
                rows: x.nrows(),
                response_len: y.len(),
            });
        }
        let x_std = self.standardize_design(x)?;
        let y_std = y.mapv(|v| (v - self.y_mean) / self.y_sd);
        Ok((x_std, y_std))
    }

    /// Standardizes a design on its own, e.g. new rows scored against a fitted spec.
    pub fn standardize_design(&self, x: ArrayView2<f64>) -> Result<Array2<f64>, ScalingError> {
        self.check_columns(x.ncols())?;
        let centered = &x - &self.x_mean.view().insert_axis(Axis(0));
        Ok(centered / &self.x_sd.view().insert_axis(Axis(0)))
    }

    /// Maps standardized-scale weights back to original units.
    pub fn rescale_coefficients(
        &self,
        beta_std: &StandardizedCoefficients,
    ) -> Result<Coefficients, ScalingError> {
        self.check_columns(beta_std.len())?;
        Ok(Coefficients::new(beta_std.as_view().to_owned() * &self.multipliers()))
    }

    /// Rescales an `M × K` matrix of coefficient draws row by row.
    ///
    /// Every draw shares the same multiplier vector.
    pub fn rescale_draws(&self, draws: ArrayView2<f64>) -> Result<Array2<f64>, ScalingError> {
        self.check_columns(draws.ncols())?;
        let multipliers = self.multipliers();
        Ok(&draws * &multipliers.view().insert_axis(Axis(0)))
    }

    fn check_columns(&self, found: usize) -> Result<(), ScalingError> {
        if found != self.num_columns() {
            return Err(ScalingError::ColumnCountMismatch {
                expected: self.num_columns(),
                found,
            });
        }
        Ok(())
    }
}

fn is_degenerate(sd: f64, mean: f64) -> bool {
    !sd.is_finite() || sd <= DEGENERATE_SD_ULPS * f64::EPSILON * mean.abs().max(f64::MIN_POSITIVE)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    #[test]
    fn concrete_multiplier_matches_sd_ratio() {
        let x = array![[1.0], [2.0], [3.0]];
        let y = array![2.0, 4.0, 6.0];
        let spec = ScalingSpec::fit(x.view(), y.view()).unwrap();

        assert_abs_diff_eq!(spec.column_means()[0], 2.0, epsilon = 1e-12);
        assert_abs_diff_eq!(spec.column_sds()[0], 1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(spec.response_mean(), 4.0, epsilon = 1e-12);
        assert_abs_diff_eq!(spec.response_sd(), 2.0, epsilon = 1e-12);
        assert_abs_diff_eq!(spec.multipliers()[0], 2.0, epsilon = 1e-12);

        let rescaled = spec
            .rescale_coefficients(&StandardizedCoefficients::new(array![1.5]))
            .unwrap();
        assert_abs_diff_eq!(rescaled[0], 3.0, epsilon = 1e-12);
    }

    #[test]
    fn constant_column_is_rejected() {
        let x = array![[1.0, 5.0], [2.0, 5.0], [3.0, 5.0]];
        let y = array![0.0, 1.0, 3.0];
        let err = ScalingSpec::fit(x.view(), y.view()).unwrap_err();
        assert!(matches!(err, ScalingError::DegenerateColumn { column: 1, .. }));
    }

    #[test]
    fn constant_response_is_rejected() {
        let x = array![[1.0], [2.0], [4.0]];
        let y = array![7.0, 7.0, 7.0];
        let err = ScalingSpec::fit(x.view(), y.view()).unwrap_err();
        assert!(matches!(err, ScalingError::DegenerateResponse { .. }));
    }

    #[test]
    fn small_spread_on_a_large_offset_is_not_degenerate() {
        let x = array![[1e8], [1e8 + 1e-5], [1e8 + 2e-5], [1e8 + 3e-5]];
        let y = array![0.0, 1.0, 2.0, 3.0];
        let spec = ScalingSpec::fit(x.view(), y.view()).unwrap();
        assert!(spec.column_sds()[0] > 1e-5);
        assert!(spec.multipliers()[0].is_finite());
    }

    #[test]
    fn tiny_constant_values_are_still_degenerate() {
        let x = array![[0.1, 1.0], [0.1, 2.0], [0.1, 3.0]];
        let y = array![1.0, 2.0, 4.0];
        assert!(matches!(
            ScalingSpec::fit(x.view(), y.view()),
            Err(ScalingError::DegenerateColumn { column: 0, .. })
        ));
    }

    #[test]
    fn single_row_cannot_be_scaled() {
        let x = array![[1.0, 2.0]];
        let y = array![3.0];
        assert_eq!(
            ScalingSpec::fit(x.view(), y.view()).unwrap_err(),
            ScalingError::InsufficientRows { found: 1 }
        );
    }

    #[test]
    fn standardized_columns_have_zero_mean_and_unit_sd() {
        let x = array![[1.0, 10.0], [4.0, 30.0], [2.0, 20.0], [9.0, 0.0]];
        let y = array![3.0, -1.0, 8.0, 2.0];
        let spec = ScalingSpec::fit(x.view(), y.view()).unwrap();
        let (xs, ys) = spec.standardize(x.view(), y.view()).unwrap();

        for column in xs.columns() {
            assert_abs_diff_eq!(column.mean().unwrap(), 0.0, epsilon = 1e-12);
            assert_abs_diff_eq!(column.std(1.0), 1.0, epsilon = 1e-12);
        }
        assert_abs_diff_eq!(ys.mean().unwrap(), 0.0, epsilon = 1e-12);
        assert_abs_diff_eq!(ys.std(1.0), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn draw_matrix_is_rescaled_per_column() {
        let x = array![[1.0, 0.0], [2.0, 4.0], [3.0, 8.0]];
        let y = array![2.0, 4.0, 6.0];
        let spec = ScalingSpec::fit(x.view(), y.view()).unwrap();
        let draws = array![[1.0, 1.0], [0.5, -2.0]];
        let rescaled = spec.rescale_draws(draws.view()).unwrap();

        // sd(x1) = 1, sd(x2) = 4, sd(y) = 2
        assert_abs_diff_eq!(rescaled[[0, 0]], 2.0, epsilon = 1e-12);
        assert_abs_diff_eq!(rescaled[[0, 1]], 0.5, epsilon = 1e-12);
        assert_abs_diff_eq!(rescaled[[1, 0]], 1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(rescaled[[1, 1]], -1.0, epsilon = 1e-12);
    }

    #[test]
    fn coefficient_length_must_match_spec() {
        let x = array![[1.0], [2.0], [3.0]];
        let y = array![2.0, 4.0, 6.0];
        let spec = ScalingSpec::fit(x.view(), y.view()).unwrap();
        let err = spec
            .rescale_coefficients(&StandardizedCoefficients::new(array![1.0, 2.0]))
            .unwrap_err();
        assert_eq!(
            err,
            ScalingError::ColumnCountMismatch {
                expected: 1,
                found: 2
            }
        );
    }
}
