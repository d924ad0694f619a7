//! # Panel AR(1) Generator
//!
//! Simulates `J` trajectories of length `T` under
//!
//! ```text
//! y[j, t] = gamma * y[j, t-1] + beta[j] * (t - 1) + eps,   eps ~ Normal(0, sigma_y^2)
//! ```
//!
//! for `t = 2..T` (one-based). Column 1 is the caller-supplied initial
//! condition and is copied through untouched.
//!
//! The recursion runs column by column, since each step needs the previous one,
//! but every column update is a vector operation over all individuals: no
//! individual ever reads another individual's state.
//!
//! Noise for the whole panel is drawn up front in individual-major order
//! (`j` outer, `t` inner) from the injected generator. The stream position of
//! a cell therefore depends only on `(j, t)`, never on `beta` or `gamma`, which
//! keeps individuals independent under a shared stream.

use crate::params::ParameterSet;
use crate::types::Panel;
use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Zip};
use rand::Rng;
use rand_distr::StandardNormal;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum GeneratorError {
    #[error("The recursion needs at least 2 time steps, got {found}.")]
    TooFewPeriods { found: usize },

    #[error("A panel needs at least one individual.")]
    NoIndividuals,

    #[error("Shape mismatch in {what}: expected length {expected}, found {found}.")]
    ShapeMismatch {
        what: &'static str,
        expected: usize,
        found: usize,
    },
}

/// Advisory, non-fatal findings about one parameter set and the panel it produced.
///
/// Indices are stored zero-based. `Display` counts draws, individuals and
/// periods from 1, matching the long-format TSV output.
#[derive(Debug, Clone, PartialEq)]
pub enum DomainWarning {
    NonStationaryGamma {
        draw: usize,
        gamma: f64,
    },
    /// First cell, in row-major order, whose value overflowed or became NaN.
    NonFiniteValue {
        draw: usize,
        individual: usize,
        period: usize,
    },
}

impl fmt::Display for DomainWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DomainWarning::NonStationaryGamma { draw, gamma } => write!(
                f,
                "draw {}: gamma = {gamma} lies outside (-1, 1); the trajectory is non-stationary",
                draw + 1
            ),
            DomainWarning::NonFiniteValue {
                draw,
                individual,
                period,
            } => write!(
                f,
                "draw {}: trajectory of individual {} is non-finite from period {}",
                draw + 1,
                individual + 1,
                period + 1
            ),
        }
    }
}

/// A simulated panel together with the domain warnings it raised.
#[derive(Debug, Clone, PartialEq)]
pub struct Simulation {
    pub panel: Panel,
    pub warnings: Vec<DomainWarning>,
}

/// The declared `(J, T)` of a panel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PanelShape {
    individuals: usize,
    periods: usize,
}

impl PanelShape {
    pub fn new(individuals: usize, periods: usize) -> Result<Self, GeneratorError> {
        if individuals == 0 {
            return Err(GeneratorError::NoIndividuals);
        }
        if periods < 2 {
            return Err(GeneratorError::TooFewPeriods { found: periods });
        }
        Ok(Self {
            individuals,
            periods,
        })
    }

    /// Reads the shape off an observed panel.
    pub fn of(panel: &Panel) -> Result<Self, GeneratorError> {
        Self::new(panel.individuals(), panel.periods())
    }

    pub fn individuals(&self) -> usize {
        self.individuals
    }

    pub fn periods(&self) -> usize {
        self.periods
    }
}

/// Simulator bound to one panel shape and one initial condition.
#[derive(Debug, Clone, PartialEq)]
pub struct PanelGenerator {
    shape: PanelShape,
    initial: Array1<f64>,
}

impl PanelGenerator {
    pub fn new(shape: PanelShape, initial: Array1<f64>) -> Result<Self, GeneratorError> {
        if initial.len() != shape.individuals() {
            return Err(GeneratorError::ShapeMismatch {
                what: "initial condition",
                expected: shape.individuals(),
                found: initial.len(),
            });
        }
        Ok(Self { shape, initial })
    }

    /// All-zero start, i.e. trajectories centered within individual.
    pub fn centered(shape: PanelShape) -> Self {
        Self {
            shape,
            initial: Array1::zeros(shape.individuals()),
        }
    }

    pub fn shape(&self) -> PanelShape {
        self.shape
    }

    pub fn initial(&self) -> ArrayView1<'_, f64> {
        self.initial.view()
    }

    /// One stochastic panel, with `eps` drawn from `rng` at `params.sigma_y()`.
    ///
    /// Domain warnings are logged; use `simulate_with_warnings` to receive them.
    pub fn simulate<R: Rng + ?Sized>(
        &self,
        params: &ParameterSet,
        rng: &mut R,
    ) -> Result<Panel, GeneratorError> {
        Ok(self.simulate_with_warnings(params, rng)?.panel)
    }

    /// Like `simulate`, but also hands back the domain warnings. The single
    /// parameter set is reported as draw 0.
    pub fn simulate_with_warnings<R: Rng + ?Sized>(
        &self,
        params: &ParameterSet,
        rng: &mut R,
    ) -> Result<Simulation, GeneratorError> {
        self.check_params(params)?;
        let innovations = draw_innovations(self.shape, params.sigma_y(), rng);
        let panel = self.propagate(params, Some(innovations.view()));

        let mut warnings = Vec::new();
        if !params.is_stationary() {
            warnings.push(DomainWarning::NonStationaryGamma {
                draw: 0,
                gamma: params.gamma(),
            });
        }
        warnings.extend(first_non_finite(0, &panel));
        for warning in &warnings {
            log::warn!("{warning}");
        }
        Ok(Simulation { panel, warnings })
    }

    /// The conditional-expectation trajectory: the same recursion with `eps = 0`.
    pub fn mean_path(&self, params: &ParameterSet) -> Result<Panel, GeneratorError> {
        self.check_params(params)?;
        Ok(self.propagate(params, None))
    }

    pub(crate) fn check_params(&self, params: &ParameterSet) -> Result<(), GeneratorError> {
        if params.individuals() != self.shape.individuals() {
            return Err(GeneratorError::ShapeMismatch {
                what: "beta",
                expected: self.shape.individuals(),
                found: params.individuals(),
            });
        }
        Ok(())
    }

    /// Runs the recursion. `innovations` has shape `(J, T - 1)`; column `t - 1`
    /// feeds time step `t`.
    pub(crate) fn propagate(
        &self,
        params: &ParameterSet,
        innovations: Option<ArrayView2<f64>>,
    ) -> Panel {
        let gamma = params.gamma();
        let beta = params.beta();
        let mut y = Array2::<f64>::zeros((self.shape.individuals(), self.shape.periods()));
        y.column_mut(0).assign(&self.initial);

        for t in 1..self.shape.periods() {
            // zero-based t equals the one-based (t - 1) trend index
            let trend = t as f64;
            let mut next = y.column(t - 1).mapv(|prev| gamma * prev);
            next.scaled_add(trend, &beta);
            if let Some(eps) = innovations {
                next += &eps.column(t - 1);
            }
            y.column_mut(t).assign(&next);
        }

        Panel::new(y)
    }
}

/// Draws a `(J, T - 1)` block of `Normal(0, sigma^2)` innovations in row-major order.
pub(crate) fn draw_innovations<R: Rng + ?Sized>(
    shape: PanelShape,
    sigma: f64,
    rng: &mut R,
) -> Array2<f64> {
    Array2::from_shape_fn((shape.individuals(), shape.periods() - 1), |_| {
        sigma * rng.sample::<f64, _>(StandardNormal)
    })
}

/// Locates the first non-finite cell of `panel`, if any.
pub(crate) fn first_non_finite(draw: usize, panel: &Panel) -> Option<DomainWarning> {
    let mut found: Option<(usize, usize)> = None;
    Zip::indexed(panel.as_view()).for_each(|(individual, period), value| {
        if found.is_none() && !value.is_finite() {
            found = Some((individual, period));
        }
    });
    found.map(|(individual, period)| DomainWarning::NonFiniteValue {
        draw,
        individual,
        period,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn two_by_three() -> PanelGenerator {
        PanelGenerator::centered(PanelShape::new(2, 3).unwrap())
    }

    #[test]
    fn concrete_noiseless_scenario() {
        let params = ParameterSet::new(0.5, 0.0, array![1.0, 2.0]).unwrap();
        let mut rng = StdRng::seed_from_u64(1);
        let panel = two_by_three().simulate(&params, &mut rng).unwrap();
        assert_eq!(panel.as_view(), array![[0.0, 1.0, 2.5], [0.0, 2.0, 5.0]]);
    }

    #[test]
    fn mean_path_matches_noiseless_simulation() {
        let params = ParameterSet::new(0.5, 0.0, array![1.0, 2.0]).unwrap();
        let mut rng = StdRng::seed_from_u64(99);
        let generator = two_by_three();
        assert_eq!(
            generator.mean_path(&params).unwrap(),
            generator.simulate(&params, &mut rng).unwrap()
        );
    }

    #[test]
    fn initial_column_is_carried_through_exactly() {
        let shape = PanelShape::new(3, 6).unwrap();
        let initial = array![0.1, -7.25, 1e-300];
        let generator = PanelGenerator::new(shape, initial.clone()).unwrap();
        let mut rng = StdRng::seed_from_u64(2024);
        for gamma in [-0.9, 0.0, 0.7, 1.5] {
            let params = ParameterSet::new(gamma, 3.0, array![4.0, -2.0, 0.5]).unwrap();
            let panel = generator.simulate(&params, &mut rng).unwrap();
            for (got, want) in panel.initial().iter().zip(initial.iter()) {
                assert_eq!(got.to_bits(), want.to_bits());
            }
        }
    }

    #[test]
    fn same_seed_gives_identical_panels() {
        let generator = PanelGenerator::centered(PanelShape::new(4, 10).unwrap());
        let params = ParameterSet::new(0.3, 1.2, array![0.5, -0.5, 1.0, 0.0]).unwrap();
        let a = generator
            .simulate(&params, &mut StdRng::seed_from_u64(11))
            .unwrap();
        let b = generator
            .simulate(&params, &mut StdRng::seed_from_u64(11))
            .unwrap();
        let c = generator
            .simulate(&params, &mut StdRng::seed_from_u64(12))
            .unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn zeroing_one_slope_leaves_other_individuals_unchanged() {
        let generator = PanelGenerator::centered(PanelShape::new(4, 12).unwrap());
        let full = ParameterSet::new(0.6, 0.8, array![1.0, 2.0, -1.5, 0.25]).unwrap();
        let zeroed = ParameterSet::new(0.6, 0.8, array![1.0, 0.0, -1.5, 0.25]).unwrap();

        let a = generator
            .simulate(&full, &mut StdRng::seed_from_u64(5))
            .unwrap();
        let b = generator
            .simulate(&zeroed, &mut StdRng::seed_from_u64(5))
            .unwrap();

        for j in [0, 2, 3] {
            assert_eq!(a.trajectory(j), b.trajectory(j));
        }
        assert_ne!(a.trajectory(1), b.trajectory(1));
    }

    #[test]
    fn shape_errors_surface_before_simulation() {
        assert_eq!(
            PanelShape::new(2, 1).unwrap_err(),
            GeneratorError::TooFewPeriods { found: 1 }
        );
        assert_eq!(
            PanelShape::new(0, 5).unwrap_err(),
            GeneratorError::NoIndividuals
        );

        let shape = PanelShape::new(3, 4).unwrap();
        assert!(matches!(
            PanelGenerator::new(shape, array![0.0, 0.0]),
            Err(GeneratorError::ShapeMismatch {
                what: "initial condition",
                expected: 3,
                found: 2
            })
        ));

        let params = ParameterSet::new(0.5, 1.0, array![1.0, 2.0]).unwrap();
        assert!(matches!(
            PanelGenerator::centered(shape).mean_path(&params),
            Err(GeneratorError::ShapeMismatch { what: "beta", .. })
        ));
    }

    #[test]
    fn innovations_scale_with_sigma() {
        let shape = PanelShape::new(50, 41).unwrap();
        let eps = draw_innovations(shape, 2.0, &mut StdRng::seed_from_u64(3));
        assert_eq!(eps.dim(), (50, 40));
        let sd = eps.std(1.0);
        assert!((sd - 2.0).abs() < 0.15, "sample sd {sd} too far from 2");
    }

    #[test]
    fn simulation_reports_explosive_gamma_and_overflow() {
        let generator = PanelGenerator::new(PanelShape::new(1, 5).unwrap(), array![1.0]).unwrap();
        let params = ParameterSet::new(1e200, 0.0, array![1.0]).unwrap();
        let out = generator
            .simulate_with_warnings(&params, &mut StdRng::seed_from_u64(0))
            .unwrap();
        assert_eq!(
            out.warnings,
            vec![
                DomainWarning::NonStationaryGamma {
                    draw: 0,
                    gamma: 1e200
                },
                DomainWarning::NonFiniteValue {
                    draw: 0,
                    individual: 0,
                    period: 2
                },
            ]
        );

        let calm = ParameterSet::new(0.5, 1.0, array![0.2]).unwrap();
        let out = generator
            .simulate_with_warnings(&calm, &mut StdRng::seed_from_u64(0))
            .unwrap();
        assert!(out.warnings.is_empty());
    }

    #[test]
    fn warning_text_counts_from_one() {
        let warning = DomainWarning::NonFiniteValue {
            draw: 0,
            individual: 2,
            period: 3,
        };
        assert_eq!(
            warning.to_string(),
            "draw 1: trajectory of individual 3 is non-finite from period 4"
        );
    }
}
