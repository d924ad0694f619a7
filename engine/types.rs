use ndarray::{Array1, Array2, ArrayView1, ArrayView2};
use serde::{Deserialize, Serialize};
use std::ops::Deref;

/// A balanced panel: one row per individual, one column per time step.
///
/// Column 0 holds the initial condition carried into every simulation and is
/// never produced by the recursion. Panels are values; transformations build
/// new panels instead of editing existing ones, so there is no `DerefMut`.
#[repr(transparent)]
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Panel(Array2<f64>);

impl Panel {
    pub fn new(values: Array2<f64>) -> Self {
        Self(values)
    }

    pub fn individuals(&self) -> usize {
        self.0.nrows()
    }

    pub fn periods(&self) -> usize {
        self.0.ncols()
    }

    /// The carried-over initial state, `y[:, 1]` in one-based notation.
    pub fn initial(&self) -> ArrayView1<'_, f64> {
        self.0.column(0)
    }

    pub fn trajectory(&self, individual: usize) -> ArrayView1<'_, f64> {
        self.0.row(individual)
    }

    /// Mean over every cell, initial column included.
    pub fn grand_mean(&self) -> f64 {
        self.0.mean().unwrap_or(f64::NAN)
    }

    pub fn as_view(&self) -> ArrayView2<'_, f64> {
        self.0.view()
    }

    pub fn into_inner(self) -> Array2<f64> {
        self.0
    }
}

impl Deref for Panel {
    type Target = Array2<f64>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl From<Array2<f64>> for Panel {
    fn from(values: Array2<f64>) -> Self {
        Self(values)
    }
}

impl From<Panel> for Array2<f64> {
    fn from(panel: Panel) -> Self {
        panel.0
    }
}

/// Regression weights fitted on a standardized design.
#[repr(transparent)]
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StandardizedCoefficients(pub Array1<f64>);

impl StandardizedCoefficients {
    pub fn new(values: Array1<f64>) -> Self {
        Self(values)
    }

    pub fn as_view(&self) -> ArrayView1<'_, f64> {
        self.0.view()
    }

    pub fn into_inner(self) -> Array1<f64> {
        self.0
    }
}

impl Deref for StandardizedCoefficients {
    type Target = Array1<f64>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl From<Array1<f64>> for StandardizedCoefficients {
    fn from(values: Array1<f64>) -> Self {
        Self(values)
    }
}

/// Regression weights in the units of the original design and response.
#[repr(transparent)]
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Coefficients(pub Array1<f64>);

impl Coefficients {
    pub fn new(values: Array1<f64>) -> Self {
        Self(values)
    }

    pub fn as_view(&self) -> ArrayView1<'_, f64> {
        self.0.view()
    }

    pub fn into_inner(self) -> Array1<f64> {
        self.0
    }
}

impl Deref for Coefficients {
    type Target = Array1<f64>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl From<Array1<f64>> for Coefficients {
    fn from(values: Array1<f64>) -> Self {
        Self(values)
    }
}

impl From<Coefficients> for Array1<f64> {
    fn from(values: Coefficients) -> Self {
        values.0
    }
}
