//! Parameter sets for the panel AR(1) model and the posterior draw sets an
//! external sampler returns for it.

use ndarray::{Array1, ArrayView1};
use rand::Rng;
use rand_distr::StandardNormal;
use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParamError {
    #[error("Observation noise scale must be finite and non-negative, got {0}.")]
    InvalidNoiseScale(f64),

    #[error("Slope scale sigma_beta must be finite and non-negative, got {0}.")]
    InvalidSlopeScale(f64),

    #[error("Autoregressive coefficient must be finite, got {0}.")]
    NonFiniteGamma(f64),

    #[error("Individual slope {index} is not finite ({value}).")]
    NonFiniteSlope { index: usize, value: f64 },

    #[error("A parameter set needs at least one individual slope.")]
    NoIndividuals,
}

/// One draw of `(gamma, sigma_y, beta)`.
///
/// `gamma` is the autoregressive coefficient, `sigma_y` the observation noise
/// scale and `beta[j]` the slope of individual `j`'s linear time trend.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParameterSet {
    gamma: f64,
    sigma_y: f64,
    beta: Array1<f64>,
}

impl ParameterSet {
    /// `sigma_y = 0` is accepted as the noiseless limit.
    pub fn new(gamma: f64, sigma_y: f64, beta: Array1<f64>) -> Result<Self, ParamError> {
        if !gamma.is_finite() {
            return Err(ParamError::NonFiniteGamma(gamma));
        }
        if !sigma_y.is_finite() || sigma_y < 0.0 {
            return Err(ParamError::InvalidNoiseScale(sigma_y));
        }
        if beta.is_empty() {
            return Err(ParamError::NoIndividuals);
        }
        if let Some((index, &value)) = beta.iter().enumerate().find(|(_, v)| !v.is_finite()) {
            return Err(ParamError::NonFiniteSlope { index, value });
        }
        Ok(Self {
            gamma,
            sigma_y,
            beta,
        })
    }

    /// Draws `beta_j ~ Normal(0, sigma_beta^2)` i.i.d. for `individuals` slopes.
    pub fn with_hierarchical_slopes<R: Rng + ?Sized>(
        gamma: f64,
        sigma_y: f64,
        sigma_beta: f64,
        individuals: usize,
        rng: &mut R,
    ) -> Result<Self, ParamError> {
        if !sigma_beta.is_finite() || sigma_beta < 0.0 {
            return Err(ParamError::InvalidSlopeScale(sigma_beta));
        }
        let beta = Array1::from_shape_fn(individuals, |_| {
            sigma_beta * rng.sample::<f64, _>(StandardNormal)
        });
        Self::new(gamma, sigma_y, beta)
    }

    pub fn gamma(&self) -> f64 {
        self.gamma
    }

    pub fn sigma_y(&self) -> f64 {
        self.sigma_y
    }

    pub fn beta(&self) -> ArrayView1<'_, f64> {
        self.beta.view()
    }

    pub fn individuals(&self) -> usize {
        self.beta.len()
    }

    /// True when `gamma` lies in the open interval `(-1, 1)`.
    pub fn is_stationary(&self) -> bool {
        self.gamma.abs() < 1.0
    }
}

/// An ordered sequence of posterior draws sharing one panel shape.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PosteriorDrawSet {
    draws: Vec<ParameterSet>,
}

impl PosteriorDrawSet {
    pub fn new(draws: Vec<ParameterSet>) -> Self {
        Self { draws }
    }

    pub fn len(&self) -> usize {
        self.draws.len()
    }

    pub fn is_empty(&self) -> bool {
        self.draws.is_empty()
    }

    pub fn draws(&self) -> &[ParameterSet] {
        &self.draws
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ParameterSet> {
        self.draws.iter()
    }

    /// Keeps every `step`-th draw starting from the first. A step of 0 or 1
    /// keeps the full set.
    pub fn thin(&self, step: usize) -> Self {
        let step = step.max(1);
        Self::new(self.draws.iter().step_by(step).cloned().collect())
    }

    /// Keeps at most the first `count` draws.
    pub fn truncate(&self, count: usize) -> Self {
        Self::new(self.draws.iter().take(count).cloned().collect())
    }

    /// The `gamma` value of every draw, in draw order.
    pub fn gammas(&self) -> Array1<f64> {
        self.draws.iter().map(ParameterSet::gamma).collect()
    }
}

impl FromIterator<ParameterSet> for PosteriorDrawSet {
    fn from_iter<I: IntoIterator<Item = ParameterSet>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

impl<'a> IntoIterator for &'a PosteriorDrawSet {
    type Item = &'a ParameterSet;
    type IntoIter = std::slice::Iter<'a, ParameterSet>;

    fn into_iter(self) -> Self::IntoIter {
        self.draws.iter()
    }
}
