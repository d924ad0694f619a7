//! Named design matrices for the interaction regression, plus the
//! deterministic least-squares fit used as a reference solution.
//!
//! Interaction columns are elementwise products of two existing columns and are
//! named `a:b`. They are built from the original-unit columns and standardized
//! afterwards like any other column.

use crate::types::Coefficients;
use itertools::Itertools;
use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};
use ndarray_linalg::Solve;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DesignError {
    #[error("Design has {values} columns but {names} column names were supplied.")]
    NameCountMismatch { names: usize, values: usize },

    #[error("Column '{0}' appears more than once in the design.")]
    DuplicateColumn(String),

    #[error("Column '{0}' was not found in the design.")]
    ColumnNotFound(String),

    #[error("Design has {rows} rows but the response has {response_len} entries.")]
    LengthMismatch { rows: usize, response_len: usize },

    #[error(
        "Least squares needs at least as many rows as columns: {rows} rows for {columns} columns."
    )]
    Underdetermined { rows: usize, columns: usize },

    #[error("The normal equations could not be solved; the design may be rank deficient: {0}")]
    LinearSystemSolveFailed(#[from] ndarray_linalg::error::LinalgError),
}

/// A design matrix whose columns carry stable names.
#[derive(Debug, Clone, PartialEq)]
pub struct DesignMatrix {
    names: Vec<String>,
    values: Array2<f64>,
}

impl DesignMatrix {
    pub fn new(names: Vec<String>, values: Array2<f64>) -> Result<Self, DesignError> {
        if names.len() != values.ncols() {
            return Err(DesignError::NameCountMismatch {
                names: names.len(),
                values: values.ncols(),
            });
        }
        if let Some(duplicate) = names.iter().duplicates().next() {
            return Err(DesignError::DuplicateColumn(duplicate.clone()));
        }
        Ok(Self { names, values })
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn values(&self) -> ArrayView2<'_, f64> {
        self.values.view()
    }

    pub fn nrows(&self) -> usize {
        self.values.nrows()
    }

    pub fn ncols(&self) -> usize {
        self.values.ncols()
    }

    pub fn column(&self, name: &str) -> Result<ArrayView1<'_, f64>, DesignError> {
        let index = self.index_of(name)?;
        Ok(self.values.column(index))
    }

    fn index_of(&self, name: &str) -> Result<usize, DesignError> {
        self.names
            .iter()
            .position(|n| n == name)
            .ok_or_else(|| DesignError::ColumnNotFound(name.to_string()))
    }

    /// Returns a new design with the product column `left:right` appended.
    pub fn with_interaction(&self, left: &str, right: &str) -> Result<Self, DesignError> {
        let product = &self.column(left)? * &self.column(right)?;
        let name = format!("{left}:{right}");
        if self.names.contains(&name) {
            return Err(DesignError::DuplicateColumn(name));
        }

        let mut names = self.names.clone();
        names.push(name);
        let mut values = self.values.clone();
        values
            .push_column(product.view())
            .map_err(|_| DesignError::LengthMismatch {
                rows: self.nrows(),
                response_len: product.len(),
            })?;
        Ok(Self { names, values })
    }

    /// Appends every pairwise product of the current columns, in column order.
    pub fn with_pairwise_interactions(&self) -> Result<Self, DesignError> {
        self.names
            .iter()
            .tuple_combinations()
            .try_fold(self.clone(), |design, (left, right)| {
                design.with_interaction(left, right)
            })
    }
}

/// Ordinary least squares through the origin via the normal equations.
///
/// This is a fixed, deterministic stand-in for a fitted posterior mean and is
/// what the scaling round trip is checked against.
pub fn least_squares(
    x: ArrayView2<f64>,
    y: ArrayView1<f64>,
) -> Result<Coefficients, DesignError> {
    if x.nrows() != y.len() {
        return Err(DesignError::LengthMismatch {
            rows: x.nrows(),
            response_len: y.len(),
        });
    }
    if x.nrows() < x.ncols() {
        return Err(DesignError::Underdetermined {
            rows: x.nrows(),
            columns: x.ncols(),
        });
    }

    let xtx = x.t().dot(&x);
    let xty: Array1<f64> = x.t().dot(&y);
    let beta = xtx.solve_into(xty)?;
    Ok(Coefficients::new(beta))
}

/// Subtracts each column's mean, leaving a design suited to a no-intercept fit.
pub fn center_columns(x: ArrayView2<f64>) -> Array2<f64> {
    match x.mean_axis(Axis(0)) {
        Some(means) => &x - &means.insert_axis(Axis(0)),
        None => x.to_owned(),
    }
}
