//! The boundary to an external Bayesian sampler.
//!
//! The engine never runs HMC/NUTS itself. Anything that can turn a model
//! specification and an observed panel into a flat sequence of parameter draws
//! implements `InferenceEngine`; chains, divergences and other sampler
//! diagnostics stay on the other side of this trait.

use crate::params::PosteriorDrawSet;
use crate::types::Panel;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Priors of the hierarchical panel AR(1) model, handed to the sampler as-is.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelSpec {
    /// Scale of the half-normal prior on `sigma_y`.
    pub sigma_y_scale: f64,
    /// Scale of the half-normal prior on `sigma_beta`.
    pub sigma_beta_scale: f64,
    /// `gamma ~ Uniform(-1, 1)` when true, otherwise an unconstrained normal prior.
    pub stationary_gamma_prior: bool,
}

impl Default for ModelSpec {
    fn default() -> Self {
        Self {
            sigma_y_scale: 1.0,
            sigma_beta_scale: 1.0,
            stationary_gamma_prior: true,
        }
    }
}

pub trait InferenceEngine {
    type Error: std::error::Error + Send + Sync + 'static;

    fn sample(&self, spec: &ModelSpec, observed: &Panel) -> Result<PosteriorDrawSet, Self::Error>;
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum FixedDrawsError {
    #[error(
        "Stored draws have {found} slopes per draw but the observed panel has {expected} individuals."
    )]
    IndividualsMismatch { expected: usize, found: usize },
}

/// Returns a draw set computed elsewhere, e.g. exported from a sampler run.
#[derive(Debug, Clone, PartialEq)]
pub struct FixedDraws {
    draws: PosteriorDrawSet,
}

impl FixedDraws {
    pub fn new(draws: PosteriorDrawSet) -> Self {
        Self { draws }
    }
}

impl InferenceEngine for FixedDraws {
    type Error = FixedDrawsError;

    fn sample(&self, spec: &ModelSpec, observed: &Panel) -> Result<PosteriorDrawSet, Self::Error> {
        let expected = observed.individuals();
        if let Some(mismatch) = self.draws.iter().find(|d| d.individuals() != expected) {
            return Err(FixedDrawsError::IndividualsMismatch {
                expected,
                found: mismatch.individuals(),
            });
        }
        log::debug!(
            "Returning {} stored draws (stationary gamma prior: {})",
            self.draws.len(),
            spec.stationary_gamma_prior
        );
        Ok(self.draws.clone())
    }
}
