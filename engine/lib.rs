#![deny(dead_code)]
#![deny(unused_imports)]
#![deny(clippy::no_effect_underscore_binding)]

pub mod checks;
pub mod config;
pub mod design;
pub mod generator;
pub mod params;
pub mod replay;
pub mod sampler;
pub mod scaling;
pub mod types;

pub use generator::{DomainWarning, PanelGenerator, PanelShape, Simulation};
pub use params::{ParameterSet, PosteriorDrawSet};
pub use replay::{Reconstructor, Replicates, ReplayMode, StationarityPolicy};
pub use scaling::ScalingSpec;
pub use types::{Coefficients, Panel, StandardizedCoefficients};
