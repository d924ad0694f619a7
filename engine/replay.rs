//! # Posterior-Predictive Reconstructor
//!
//! Replays the panel AR(1) recursion once per posterior draw. Two modes:
//!
//! - `ReplayMode::MeanPath`: `eps = 0`, the conditional expectation of each
//!   draw. Repeated calls are identical.
//! - `ReplayMode::PosteriorPredictive`: fresh `Normal(0, sigma_y^2)` noise at
//!   every `(individual, time)` cell, using that draw's own `sigma_y`.
//!
//! Draws are independent start to finish and are replayed in parallel with
//! rayon. Draw `m` gets its own ChaCha8 substream (`stream = m`) under the
//! run seed, so the replicates do not depend on thread count or scheduling.
//!
//! All shape validation happens before any draw is replayed; a malformed draw
//! set produces an error and no partial output.

use crate::generator::{
    DomainWarning, GeneratorError, PanelGenerator, PanelShape, draw_innovations, first_non_finite,
};
use crate::params::{ParameterSet, PosteriorDrawSet};
use crate::types::Panel;
use ndarray::ArrayView1;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ReplayError {
    #[error("The posterior draw set is empty; there is nothing to replay.")]
    EmptyDrawSet,

    #[error("Shape mismatch in {what}: expected length {expected}, found {found}.")]
    ShapeMismatch {
        what: String,
        expected: usize,
        found: usize,
    },

    #[error(
        "Draw {} has gamma = {gamma}, outside (-1, 1), and the stationarity policy is 'reject'.",
        .draw + 1
    )]
    NonStationaryDraw { draw: usize, gamma: f64 },

    #[error(transparent)]
    Generator(#[from] GeneratorError),
}

/// How the recursion is driven for each draw.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplayMode {
    MeanPath,
    PosteriorPredictive { seed: u64 },
}

/// What to do with a draw whose `gamma` lies outside `(-1, 1)`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StationarityPolicy {
    /// Replay it and report a `DomainWarning`.
    #[default]
    Warn,
    /// Refuse the whole draw set.
    Reject,
}

/// The replicated panels, one per draw in draw order, plus any warnings.
#[derive(Debug, Clone, PartialEq)]
pub struct Replicates {
    pub panels: Vec<Panel>,
    pub warnings: Vec<DomainWarning>,
}

impl Replicates {
    pub fn len(&self) -> usize {
        self.panels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.panels.is_empty()
    }

    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }
}

/// Replays posterior draws against a fixed panel shape and initial condition.
#[derive(Debug, Clone)]
pub struct Reconstructor {
    generator: PanelGenerator,
    mode: ReplayMode,
    policy: StationarityPolicy,
}

impl Reconstructor {
    /// `initial` must have one entry per individual of `shape`.
    pub fn new(
        shape: PanelShape,
        initial: ArrayView1<f64>,
        mode: ReplayMode,
    ) -> Result<Self, ReplayError> {
        if initial.len() != shape.individuals() {
            return Err(ReplayError::ShapeMismatch {
                what: "initial condition".to_string(),
                expected: shape.individuals(),
                found: initial.len(),
            });
        }
        let generator = PanelGenerator::new(shape, initial.to_owned())?;
        Ok(Self {
            generator,
            mode,
            policy: StationarityPolicy::default(),
        })
    }

    /// Uses the observed panel's shape and its first column as the initial condition.
    pub fn for_observed(observed: &Panel, mode: ReplayMode) -> Result<Self, ReplayError> {
        Self::new(PanelShape::of(observed)?, observed.initial(), mode)
    }

    pub fn with_policy(mut self, policy: StationarityPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn mode(&self) -> ReplayMode {
        self.mode
    }

    pub fn shape(&self) -> PanelShape {
        self.generator.shape()
    }

    pub fn reconstruct(&self, draws: &PosteriorDrawSet) -> Result<Replicates, ReplayError> {
        let mut warnings = self.validate(draws)?;
        let shape = self.generator.shape();

        log::info!(
            "Replaying {} draws over {} individuals x {} periods ({:?})",
            draws.len(),
            shape.individuals(),
            shape.periods(),
            self.mode
        );

        let panels: Vec<Panel> = draws
            .draws()
            .par_iter()
            .enumerate()
            .map(|(index, params)| self.replay_draw(index, params))
            .collect();

        warnings.extend(
            panels
                .iter()
                .enumerate()
                .filter_map(|(draw, panel)| first_non_finite(draw, panel)),
        );

        for warning in &warnings {
            log::warn!("{warning}");
        }

        Ok(Replicates { panels, warnings })
    }

    /// Checks every draw up front. Returns the advisory warnings on success.
    fn validate(&self, draws: &PosteriorDrawSet) -> Result<Vec<DomainWarning>, ReplayError> {
        if draws.is_empty() {
            return Err(ReplayError::EmptyDrawSet);
        }

        let expected = self.generator.shape().individuals();
        let mut warnings = Vec::new();
        for (draw, params) in draws.iter().enumerate() {
            if params.individuals() != expected {
                return Err(ReplayError::ShapeMismatch {
                    what: format!("beta of draw {}", draw + 1),
                    expected,
                    found: params.individuals(),
                });
            }
            if !params.is_stationary() {
                match self.policy {
                    StationarityPolicy::Warn => warnings.push(DomainWarning::NonStationaryGamma {
                        draw,
                        gamma: params.gamma(),
                    }),
                    StationarityPolicy::Reject => {
                        return Err(ReplayError::NonStationaryDraw {
                            draw,
                            gamma: params.gamma(),
                        });
                    }
                }
            }
        }
        Ok(warnings)
    }

    fn replay_draw(&self, index: usize, params: &ParameterSet) -> Panel {
        match self.mode {
            ReplayMode::MeanPath => self.generator.propagate(params, None),
            ReplayMode::PosteriorPredictive { seed } => {
                let mut rng = ChaCha8Rng::seed_from_u64(seed);
                rng.set_stream(index as u64);
                let eps = draw_innovations(self.generator.shape(), params.sigma_y(), &mut rng);
                self.generator.propagate(params, Some(eps.view()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{Array1, array};

    fn draws_for(j: usize, gammas: &[f64]) -> PosteriorDrawSet {
        gammas
            .iter()
            .map(|&gamma| {
                let beta = Array1::from_shape_fn(j, |i| 0.1 * (i as f64 + 1.0));
                ParameterSet::new(gamma, 0.5, beta).unwrap()
            })
            .collect()
    }

    fn reconstructor(j: usize, t: usize, mode: ReplayMode) -> Reconstructor {
        let shape = PanelShape::new(j, t).unwrap();
        Reconstructor::new(shape, Array1::<f64>::zeros(j).view(), mode).unwrap()
    }

    #[test]
    fn empty_draw_set_is_an_error() {
        let replay = reconstructor(2, 3, ReplayMode::MeanPath);
        assert_eq!(
            replay.reconstruct(&PosteriorDrawSet::default()).unwrap_err(),
            ReplayError::EmptyDrawSet
        );
    }

    #[test]
    fn short_beta_is_a_shape_mismatch() {
        let replay = reconstructor(8, 5, ReplayMode::MeanPath);
        let mut draws = draws_for(8, &[0.2, 0.3]).draws().to_vec();
        draws.push(ParameterSet::new(0.4, 1.0, Array1::zeros(7)).unwrap());
        let err = replay
            .reconstruct(&PosteriorDrawSet::new(draws))
            .unwrap_err();
        assert!(matches!(
            err,
            ReplayError::ShapeMismatch {
                expected: 8,
                found: 7,
                ..
            }
        ));
    }

    #[test]
    fn initial_condition_length_is_checked() {
        let shape = PanelShape::new(3, 4).unwrap();
        let err = Reconstructor::new(shape, array![0.0, 1.0].view(), ReplayMode::MeanPath)
            .unwrap_err();
        assert!(matches!(
            err,
            ReplayError::ShapeMismatch {
                expected: 3,
                found: 2,
                ..
            }
        ));
    }

    #[test]
    fn mean_path_is_repeatable_and_matches_generator() {
        let replay = reconstructor(3, 6, ReplayMode::MeanPath);
        let draws = draws_for(3, &[0.1, 0.5, -0.4]);
        let first = replay.reconstruct(&draws).unwrap();
        let second = replay.reconstruct(&draws).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.len(), 3);

        let generator = PanelGenerator::centered(PanelShape::new(3, 6).unwrap());
        for (panel, params) in first.panels.iter().zip(draws.iter()) {
            assert_eq!(panel, &generator.mean_path(params).unwrap());
        }
    }

    #[test]
    fn posterior_predictive_depends_only_on_seed() {
        let draws = draws_for(4, &[0.2, 0.4, 0.6, 0.8, 0.1]);
        let a = reconstructor(4, 9, ReplayMode::PosteriorPredictive { seed: 17 })
            .reconstruct(&draws)
            .unwrap();
        let b = reconstructor(4, 9, ReplayMode::PosteriorPredictive { seed: 17 })
            .reconstruct(&draws)
            .unwrap();
        let c = reconstructor(4, 9, ReplayMode::PosteriorPredictive { seed: 18 })
            .reconstruct(&draws)
            .unwrap();
        assert_eq!(a, b);
        assert_ne!(a.panels, c.panels);
    }

    #[test]
    fn each_draw_uses_its_own_parameters() {
        let replay = reconstructor(2, 3, ReplayMode::MeanPath);
        let draws = PosteriorDrawSet::new(vec![
            ParameterSet::new(0.5, 1.0, array![1.0, 2.0]).unwrap(),
            ParameterSet::new(0.0, 1.0, array![-1.0, 0.0]).unwrap(),
        ]);
        let out = replay.reconstruct(&draws).unwrap();
        assert_eq!(
            out.panels[0].as_view(),
            array![[0.0, 1.0, 2.5], [0.0, 2.0, 5.0]]
        );
        assert_eq!(
            out.panels[1].as_view(),
            array![[0.0, -1.0, -2.0], [0.0, 0.0, 0.0]]
        );
    }

    #[test]
    fn each_draw_uses_its_own_noise_scale() {
        let replay = reconstructor(3, 6, ReplayMode::PosteriorPredictive { seed: 21 });
        let beta = array![0.5, -1.0, 2.0];
        let noisy = ParameterSet::new(0.4, 3.0, beta.clone()).unwrap();
        let quiet = ParameterSet::new(0.4, 0.0, beta).unwrap();
        let out = replay
            .reconstruct(&PosteriorDrawSet::new(vec![noisy, quiet.clone()]))
            .unwrap();

        let generator = PanelGenerator::centered(PanelShape::new(3, 6).unwrap());
        let mean_path = generator.mean_path(&quiet).unwrap();
        assert_eq!(out.panels[1], mean_path);
        assert_ne!(out.panels[0], mean_path);
    }

    #[test]
    fn draw_replicate_is_unaffected_by_its_neighbours() {
        let mode = ReplayMode::PosteriorPredictive { seed: 3 };
        let full = draws_for(3, &[0.2, 0.9, -0.3]);
        let alone = full.truncate(1);
        let a = reconstructor(3, 7, mode).reconstruct(&full).unwrap();
        let b = reconstructor(3, 7, mode).reconstruct(&alone).unwrap();
        assert_eq!(a.panels[0], b.panels[0]);
    }

    #[test]
    fn non_stationary_draws_warn_by_default_and_can_be_rejected() {
        let draws = draws_for(2, &[0.5, 1.3]);
        let out = reconstructor(2, 4, ReplayMode::MeanPath)
            .reconstruct(&draws)
            .unwrap();
        assert_eq!(
            out.warnings,
            vec![DomainWarning::NonStationaryGamma {
                draw: 1,
                gamma: 1.3
            }]
        );
        // replayed anyway, not clamped
        let generator = PanelGenerator::centered(PanelShape::new(2, 4).unwrap());
        assert_eq!(out.panels[1], generator.mean_path(&draws.draws()[1]).unwrap());

        let err = reconstructor(2, 4, ReplayMode::MeanPath)
            .with_policy(StationarityPolicy::Reject)
            .reconstruct(&draws)
            .unwrap_err();
        assert_eq!(
            err,
            ReplayError::NonStationaryDraw {
                draw: 1,
                gamma: 1.3
            }
        );
    }

    #[test]
    fn overflowing_trajectories_are_reported() {
        let draws = PosteriorDrawSet::new(vec![
            ParameterSet::new(1e200, 0.0, array![1.0]).unwrap(),
        ]);
        let shape = PanelShape::new(1, 5).unwrap();
        let out = Reconstructor::new(shape, array![1.0].view(), ReplayMode::MeanPath)
            .unwrap()
            .reconstruct(&draws)
            .unwrap();
        assert!(out.warnings.iter().any(|w| matches!(
            w,
            DomainWarning::NonFiniteValue {
                draw: 0,
                individual: 0,
                ..
            }
        )));
    }

    #[test]
    fn warnings_render_readably() {
        let warning = DomainWarning::NonStationaryGamma {
            draw: 4,
            gamma: -1.5,
        };
        assert!(warning.to_string().starts_with("draw 5:"));
    }
}
