//! Summary statistics for posterior-predictive checks.
//!
//! Every replicated panel is treated as one posterior draw of the full dataset.
//! A statistic is evaluated once per replicate and the resulting distribution is
//! compared with the same statistic on the observed panel.

use crate::types::Panel;
use ndarray::{Array1, Array2, ArrayView1, Axis};
use ndarray::parallel::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum CheckError {
    #[error("No replicated panels were supplied.")]
    NoReplicates,

    #[error("Group labels cover {found} individuals but the panels have {expected}.")]
    GroupLengthMismatch { expected: usize, found: usize },

    #[error("Group label {label} is out of range for {num_groups} groups.")]
    GroupOutOfRange { label: usize, num_groups: usize },

    #[error("Group {0} has no individuals; its mean is undefined.")]
    EmptyGroup(usize),

    #[error("Replicated panels disagree in shape: {expected:?} vs {found:?}.")]
    InconsistentReplicates {
        expected: (usize, usize),
        found: (usize, usize),
    },

    #[error("A histogram needs at least one bin and a finite range with lower < upper.")]
    InvalidHistogramRange,
}

/// Grand mean of every replicate, in replicate order.
pub fn replicate_means(replicates: &[Panel]) -> Result<Array1<f64>, CheckError> {
    check_consistent(replicates)?;
    Ok(replicates.iter().map(Panel::grand_mean).collect())
}

/// Mean per replicate and group, shape `(M, num_groups)`.
///
/// `groups[j]` is the categorical label of individual `j`; a group mean pools
/// every cell of every individual carrying that label.
pub fn grouped_means(
    replicates: &[Panel],
    groups: &[usize],
    num_groups: usize,
) -> Result<Array2<f64>, CheckError> {
    let (individuals, _) = check_consistent(replicates)?;
    let counts = group_counts(groups, num_groups, individuals)?;

    let mut out = Array2::<f64>::zeros((replicates.len(), num_groups));
    out.axis_iter_mut(Axis(0))
        .into_par_iter()
        .zip(replicates.par_iter())
        .for_each(|(mut row, panel)| row.assign(&group_means_of(panel, groups, &counts)));
    Ok(out)
}

/// The same grouped mean on a single (typically observed) panel.
pub fn observed_group_means(
    observed: &Panel,
    groups: &[usize],
    num_groups: usize,
) -> Result<Array1<f64>, CheckError> {
    let counts = group_counts(groups, num_groups, observed.individuals())?;
    Ok(group_means_of(observed, groups, &counts))
}

/// `P(T(y_rep) >= T(y_obs))` estimated over the replicate statistics.
///
/// Values near 0 or 1 indicate the observed statistic sits in a tail of the
/// posterior-predictive distribution.
pub fn tail_probability(replicated: ArrayView1<f64>, observed: f64) -> Result<f64, CheckError> {
    if replicated.is_empty() {
        return Err(CheckError::NoReplicates);
    }
    let above = replicated.iter().filter(|&&v| v >= observed).count();
    Ok(above as f64 / replicated.len() as f64)
}

/// Density histogram over fixed, shared bin edges.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Histogram {
    pub edges: Array1<f64>,
    pub density: Array1<f64>,
}

/// Equal-width bins over `[lower, upper]`.
///
/// Values outside the range are dropped and the density is normalized over the
/// values that remain, so it only integrates to the in-range share of the data.
pub fn histogram(
    values: ArrayView1<f64>,
    bins: usize,
    lower: f64,
    upper: f64,
) -> Result<Histogram, CheckError> {
    let edges = bin_edges(bins, lower, upper)?;
    let width = (upper - lower) / bins as f64;

    let mut counts = Array1::<f64>::zeros(bins);
    let mut total = 0usize;
    for &v in values.iter() {
        if !(lower..=upper).contains(&v) {
            continue;
        }
        // the upper edge belongs to the last bin
        let bin = (((v - lower) / width) as usize).min(bins - 1);
        counts[bin] += 1.0;
        total += 1;
    }

    let density = if total == 0 {
        counts
    } else {
        counts / (total as f64 * width)
    };
    Ok(Histogram { edges, density })
}

/// Replicate histograms, plus the observed panel's when one was supplied.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplicateHistograms {
    pub edges: Array1<f64>,
    /// Shape `(M, bins)`.
    pub replicates: Array2<f64>,
    pub observed: Option<Array1<f64>>,
}

/// One histogram per replicate on common edges.
///
/// The range spans every finite value of every replicate and of `observed`, so
/// no panel loses mass to the edges and all rows are directly comparable.
pub fn replicate_histograms(
    replicates: &[Panel],
    observed: Option<&Panel>,
    bins: usize,
) -> Result<ReplicateHistograms, CheckError> {
    check_consistent(replicates)?;
    let (lower, upper) = replicates
        .iter()
        .chain(observed)
        .flat_map(|panel| panel.iter().copied())
        .filter(|v| v.is_finite())
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
            (lo.min(v), hi.max(v))
        });
    let (lower, upper) = if lower < upper {
        (lower, upper)
    } else if lower == upper {
        (lower - 0.5, upper + 0.5)
    } else {
        // nothing finite at all
        (-0.5, 0.5)
    };
    let edges = bin_edges(bins, lower, upper)?;

    let mut densities = Array2::<f64>::zeros((replicates.len(), bins));
    densities
        .axis_iter_mut(Axis(0))
        .into_par_iter()
        .zip(replicates.par_iter())
        .try_for_each(|(mut row, panel)| -> Result<(), CheckError> {
            row.assign(&panel_histogram(panel, bins, lower, upper)?.density);
            Ok(())
        })?;

    let observed = observed
        .map(|panel| panel_histogram(panel, bins, lower, upper).map(|h| h.density))
        .transpose()?;

    Ok(ReplicateHistograms {
        edges,
        replicates: densities,
        observed,
    })
}

fn panel_histogram(
    panel: &Panel,
    bins: usize,
    lower: f64,
    upper: f64,
) -> Result<Histogram, CheckError> {
    let flat: Array1<f64> = panel.iter().copied().collect();
    histogram(flat.view(), bins, lower, upper)
}

fn bin_edges(bins: usize, lower: f64, upper: f64) -> Result<Array1<f64>, CheckError> {
    if bins == 0 || !lower.is_finite() || !upper.is_finite() || lower >= upper {
        return Err(CheckError::InvalidHistogramRange);
    }
    let width = (upper - lower) / bins as f64;
    Ok(Array1::from_shape_fn(bins + 1, |i| lower + width * i as f64))
}

fn check_consistent(replicates: &[Panel]) -> Result<(usize, usize), CheckError> {
    let first = replicates.first().ok_or(CheckError::NoReplicates)?;
    let expected = first.dim();
    if let Some(other) = replicates.iter().find(|p| p.dim() != expected) {
        return Err(CheckError::InconsistentReplicates {
            expected,
            found: other.dim(),
        });
    }
    Ok(expected)
}

fn group_counts(
    groups: &[usize],
    num_groups: usize,
    individuals: usize,
) -> Result<Vec<usize>, CheckError> {
    if groups.len() != individuals {
        return Err(CheckError::GroupLengthMismatch {
            expected: individuals,
            found: groups.len(),
        });
    }
    let mut counts = vec![0usize; num_groups];
    for &label in groups {
        let slot = counts.get_mut(label).ok_or(CheckError::GroupOutOfRange {
            label,
            num_groups,
        })?;
        *slot += 1;
    }
    if let Some(empty) = counts.iter().position(|&c| c == 0) {
        return Err(CheckError::EmptyGroup(empty));
    }
    Ok(counts)
}

fn group_means_of(panel: &Panel, groups: &[usize], counts: &[usize]) -> Array1<f64> {
    let periods = panel.periods() as f64;
    let mut sums = Array1::<f64>::zeros(counts.len());
    for (row, &label) in panel.axis_iter(Axis(0)).zip(groups) {
        sums[label] += row.sum();
    }
    for (sum, &count) in sums.iter_mut().zip(counts) {
        *sum /= count as f64 * periods;
    }
    sums
}
