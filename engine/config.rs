//! # Run Configuration
//!
//! A run is described by one human-readable TOML document:
//!
//! ```toml
//! [panel]
//! individuals = 2
//! periods = 3
//! initial = [0.0, 0.0]      # optional, all-zero when omitted
//!
//! [parameters]              # for `simulate`
//! gamma = 0.5
//! sigma_y = 1.0
//! beta = [1.0, 2.0]         # or: sigma_beta = 0.5
//!
//! [replay]                  # for `replay`
//! mode = "posterior_predictive"
//! seed = 42
//! stationarity = "warn"
//!
//! [[draws]]                 # exported by the external sampler
//! gamma = 0.48
//! sigma_y = 0.9
//! beta = [1.1, 1.9]
//! ```
//!
//! Values are validated when they are turned into engine types, not when the
//! document is parsed, so a config can be loaded, edited and saved back even
//! while it is incomplete.

use crate::generator::{GeneratorError, PanelGenerator, PanelShape};
use crate::params::{ParamError, ParameterSet, PosteriorDrawSet};
use crate::replay::{ReplayMode, StationarityPolicy};
use crate::types::StandardizedCoefficients;
use ndarray::{Array1, Array2};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{BufWriter, Write};
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read or write config file: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Failed to parse TOML config: {0}")]
    TomlParseError(#[from] toml::de::Error),
    #[error("Failed to serialize config to TOML: {0}")]
    TomlSerializeError(#[from] toml::ser::Error),
    #[error("Invalid parameter in config: {0}")]
    Param(#[from] ParamError),
    #[error("Invalid panel in config: {0}")]
    Generator(#[from] GeneratorError),
    #[error("The config has no [{0}] section, which this command requires.")]
    MissingSection(&'static str),
    #[error("[parameters] must set exactly one of 'beta' or 'sigma_beta'.")]
    SlopeSpecification,
    #[error("Row {row} of the rescale design has {found} values, expected {expected}.")]
    RaggedDesign {
        row: usize,
        expected: usize,
        found: usize,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PanelConfig {
    pub individuals: usize,
    pub periods: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub initial: Option<Vec<f64>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParametersConfig {
    pub gamma: f64,
    pub sigma_y: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub beta: Option<Vec<f64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sigma_beta: Option<f64>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplayModeConfig {
    #[default]
    MeanPath,
    PosteriorPredictive,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReplayConfig {
    #[serde(default)]
    pub mode: ReplayModeConfig,
    #[serde(default)]
    pub seed: u64,
    #[serde(default)]
    pub stationarity: StationarityPolicy,
    /// Keep every n-th draw.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thin: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_draws: Option<usize>,
}

impl ReplayConfig {
    pub fn replay_mode(&self) -> ReplayMode {
        match self.mode {
            ReplayModeConfig::MeanPath => ReplayMode::MeanPath,
            ReplayModeConfig::PosteriorPredictive => {
                ReplayMode::PosteriorPredictive { seed: self.seed }
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DrawConfig {
    pub gamma: f64,
    pub sigma_y: f64,
    pub beta: Vec<f64>,
}

/// Original-unit design rows, response, and standardized-scale weights to map back.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RescaleConfig {
    pub x: Vec<Vec<f64>>,
    pub y: Vec<f64>,
    pub coefficients: Vec<f64>,
}

impl RescaleConfig {
    pub fn design(&self) -> Result<Array2<f64>, ConfigError> {
        let expected = self.x.first().map_or(0, Vec::len);
        if let Some((row, values)) = self
            .x
            .iter()
            .enumerate()
            .find(|(_, r)| r.len() != expected)
        {
            return Err(ConfigError::RaggedDesign {
                row,
                expected,
                found: values.len(),
            });
        }
        let flat: Vec<f64> = self.x.iter().flatten().copied().collect();
        Array2::from_shape_vec((self.x.len(), expected), flat).map_err(|_| {
            ConfigError::RaggedDesign {
                row: 0,
                expected,
                found: 0,
            }
        })
    }

    pub fn response(&self) -> Array1<f64> {
        Array1::from_vec(self.y.clone())
    }

    pub fn standardized_coefficients(&self) -> StandardizedCoefficients {
        StandardizedCoefficients::new(Array1::from_vec(self.coefficients.clone()))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunConfig {
    pub panel: PanelConfig,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameters: Option<ParametersConfig>,
    #[serde(default)]
    pub replay: ReplayConfig,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub draws: Vec<DrawConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rescale: Option<RescaleConfig>,
}

impl RunConfig {
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let toml_string = toml::to_string_pretty(self)?;
        let mut file = BufWriter::new(fs::File::create(path)?);
        file.write_all(toml_string.as_bytes())?;
        Ok(())
    }

    pub fn shape(&self) -> Result<PanelShape, ConfigError> {
        Ok(PanelShape::new(self.panel.individuals, self.panel.periods)?)
    }

    pub fn initial(&self) -> Array1<f64> {
        match &self.panel.initial {
            Some(values) => Array1::from_vec(values.clone()),
            None => Array1::zeros(self.panel.individuals),
        }
    }

    pub fn generator(&self) -> Result<PanelGenerator, ConfigError> {
        Ok(PanelGenerator::new(self.shape()?, self.initial())?)
    }

    /// Builds the single parameter set used by `simulate`.
    ///
    /// With `sigma_beta` the slopes are drawn from `rng`; with `beta` they are
    /// taken verbatim and `rng` is not touched.
    pub fn parameter_set<R: Rng + ?Sized>(&self, rng: &mut R) -> Result<ParameterSet, ConfigError> {
        let params = self
            .parameters
            .as_ref()
            .ok_or(ConfigError::MissingSection("parameters"))?;
        match (&params.beta, params.sigma_beta) {
            (Some(beta), None) => Ok(ParameterSet::new(
                params.gamma,
                params.sigma_y,
                Array1::from_vec(beta.clone()),
            )?),
            (None, Some(sigma_beta)) => Ok(ParameterSet::with_hierarchical_slopes(
                params.gamma,
                params.sigma_y,
                sigma_beta,
                self.panel.individuals,
                rng,
            )?),
            _ => Err(ConfigError::SlopeSpecification),
        }
    }

    /// The `[[draws]]` tables as a draw set, after thinning and truncation.
    pub fn draw_set(&self) -> Result<PosteriorDrawSet, ConfigError> {
        let draws = self
            .draws
            .iter()
            .map(|d| ParameterSet::new(d.gamma, d.sigma_y, Array1::from_vec(d.beta.clone())))
            .collect::<Result<PosteriorDrawSet, ParamError>>()?;
        let thinned = draws.thin(self.replay.thin.unwrap_or(1));
        Ok(match self.replay.max_draws {
            Some(count) => thinned.truncate(count),
            None => thinned,
        })
    }

    pub fn rescale(&self) -> Result<&RescaleConfig, ConfigError> {
        self.rescale
            .as_ref()
            .ok_or(ConfigError::MissingSection("rescale"))
    }
}
