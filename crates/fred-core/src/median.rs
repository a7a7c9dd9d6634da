//! Approximate weighted median curve by radius grid search.
//!
//! Every distinct coreset curve gets a grid of candidate radii in
//! `[0, cost]`, finer for curves of larger weight. The Cartesian product
//! of the grids is enumerated; radius vectors whose sum falls outside
//! `[cost / 6, cost]` cannot belong to an optimal solution and are
//! skipped. Each remaining vector is handed to the cell boundary solver,
//! and every curve it produces is scored against the coreset with the
//! distance oracle.

use serde::{Deserialize, Serialize};
use web_time::Instant;

use crate::cell::search_cells;
use crate::conic::{ClarabelSolver, ConicSolver};
use crate::diagnostics::SearchDiagnostics;
use crate::types::{Coreset, Curve, FredError};

/// Default approximation parameter.
pub const DEFAULT_EPSILON: f64 = 0.5;

/// Default number of radius vectors between progress log lines.
pub const DEFAULT_PROGRESS_INTERVAL: u64 = 10_000;

/// Radius vectors summing below `cost / LOWER_BOUND_DIVISOR` are pruned.
const LOWER_BOUND_DIVISOR: f64 = 6.0;

/// Grid resolution factor: curve `i` gets `ceil(24 Λ / (ε λ_i))` radii.
const GRID_FACTOR: f64 = 24.0;

/// A distance between two curves, such as the continuous Fréchet
/// distance. Only used to score candidates.
pub trait CurveDistance {
    /// Distance between `a` and `b`.
    fn distance(&self, a: &Curve, b: &Curve) -> f64;
}

impl<F: Fn(&Curve, &Curve) -> f64> CurveDistance for F {
    fn distance(&self, a: &Curve, b: &Curve) -> f64 {
        self(a, b)
    }
}

/// Configuration for [`compute_median`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MedianConfig {
    /// Approximation parameter; smaller values give finer radius grids.
    pub epsilon: f64,
    /// Radius vectors between progress log lines.
    pub progress_interval: u64,
}

impl Default for MedianConfig {
    fn default() -> Self {
        Self {
            epsilon: DEFAULT_EPSILON,
            progress_interval: DEFAULT_PROGRESS_INTERVAL,
        }
    }
}

impl MedianConfig {
    /// Check every parameter.
    ///
    /// # Errors
    ///
    /// Returns [`FredError::InvalidConfig`] for a non-positive `epsilon`
    /// or a zero progress interval.
    pub fn validate(&self) -> Result<(), FredError> {
        if !(self.epsilon.is_finite() && self.epsilon > 0.0) {
            return Err(FredError::InvalidConfig(format!(
                "epsilon must be positive, got {}",
                self.epsilon
            )));
        }
        if self.progress_interval == 0 {
            return Err(FredError::InvalidConfig(
                "progress interval must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// Output of [`compute_median`].
#[derive(Debug, Clone)]
pub struct MedianResult {
    /// The selected candidate.
    pub curve: Curve,
    /// Its weighted cost against the coreset.
    pub score: f64,
    /// Counts and timing for the search.
    pub diagnostics: SearchDiagnostics,
}

/// Per-curve radius candidates and their Cartesian product.
#[derive(Debug, Clone, PartialEq)]
pub struct RadiusGrid {
    axes: Vec<Vec<f64>>,
}

impl RadiusGrid {
    /// Build the grid for the distinct coreset curves `weights`
    /// (`λ_i` each), total weight `total` (`Λ`), and `cost`.
    ///
    /// # Errors
    ///
    /// Returns [`FredError::InvalidCoreset`] for a non-positive weight and
    /// [`FredError::InvalidConfig`] when the product is too large to
    /// enumerate.
    pub fn new(weights: &[f64], total: f64, cost: f64, epsilon: f64) -> Result<Self, FredError> {
        let mut counts = Vec::with_capacity(weights.len());
        for &lambda in weights {
            if !(lambda.is_finite() && lambda > 0.0) {
                return Err(FredError::InvalidCoreset(format!(
                    "weight must be positive, got {lambda}"
                )));
            }
            counts.push(grid_samples(GRID_FACTOR * total / (epsilon * lambda))?);
        }
        let enumerable = counts
            .iter()
            .try_fold(1u64, |acc, &n| acc.checked_mul(u64::try_from(n).ok()?));
        if enumerable.is_none() {
            return Err(FredError::InvalidConfig(
                "radius grid has more vectors than can be enumerated".to_string(),
            ));
        }
        Ok(Self {
            axes: counts.into_iter().map(|n| linspace(cost, n)).collect(),
        })
    }

    /// Candidate radii of curve `i`.
    #[must_use]
    pub fn axis(&self, i: usize) -> &[f64] {
        &self.axes[i]
    }

    /// Number of curves.
    #[must_use]
    pub fn dimensions(&self) -> usize {
        self.axes.len()
    }

    /// Number of radius vectors, if it fits in a `u64`.
    #[must_use]
    pub fn size(&self) -> Option<u64> {
        self.axes
            .iter()
            .try_fold(1u64, |acc, axis| acc.checked_mul(u64::try_from(axis.len()).ok()?))
    }

    /// Every radius vector, last curve varying fastest.
    #[must_use]
    pub fn vectors(&self) -> RadiusVectors<'_> {
        RadiusVectors {
            grid: self,
            indices: vec![0; self.axes.len()],
            done: self.axes.iter().any(Vec::is_empty),
        }
    }
}

/// Iterator over the radius vectors of a [`RadiusGrid`].
#[derive(Debug, Clone)]
pub struct RadiusVectors<'a> {
    grid: &'a RadiusGrid,
    indices: Vec<usize>,
    done: bool,
}

impl Iterator for RadiusVectors<'_> {
    type Item = Vec<f64>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let current = self
            .indices
            .iter()
            .zip(&self.grid.axes)
            .map(|(&i, axis)| axis[i])
            .collect();

        // Odometer step.
        self.done = true;
        for k in (0..self.indices.len()).rev() {
            self.indices[k] += 1;
            if self.indices[k] < self.grid.axes[k].len() {
                self.done = false;
                break;
            }
            self.indices[k] = 0;
        }
        Some(current)
    }
}

#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]
fn grid_samples(raw: f64) -> Result<usize, FredError> {
    let samples = raw.ceil();
    if !samples.is_finite() || samples > usize::MAX as f64 {
        return Err(FredError::InvalidConfig(format!(
            "radius grid resolution {raw} is not representable"
        )));
    }
    Ok((samples as usize).max(1))
}

/// `n` evenly spaced values from `0` to `stop` inclusive.
#[allow(clippy::cast_precision_loss)]
fn linspace(stop: f64, n: usize) -> Vec<f64> {
    if n == 1 {
        return vec![0.0];
    }
    let last = (n - 1) as f64;
    (0..n).map(|k| stop * (k as f64 / last)).collect()
}

/// Approximate median of the coreset's curves, using the Clarabel
/// backend with default settings.
///
/// # Errors
///
/// See [`compute_median_with`].
pub fn compute_median<D: CurveDistance + ?Sized>(
    curves: &[Curve],
    coreset: &Coreset,
    distance: &D,
    config: &MedianConfig,
) -> Result<MedianResult, FredError> {
    compute_median_with(curves, coreset, distance, config, &ClarabelSolver::default())
}

/// [`compute_median`] with an explicit conic backend.
///
/// # Errors
///
/// Returns [`FredError::EmptyInput`] for no curves,
/// [`FredError::InvalidCoreset`] if the coreset references a curve that
/// does not exist, [`FredError::InvalidConfig`] for a bad `config` or an
/// unenumerable grid, and [`FredError::NoFeasibleRadii`] when no radius
/// vector yields a candidate.
pub fn compute_median_with<D, S>(
    curves: &[Curve],
    coreset: &Coreset,
    distance: &D,
    config: &MedianConfig,
    solver: &S,
) -> Result<MedianResult, FredError>
where
    D: CurveDistance + ?Sized,
    S: ConicSolver + ?Sized,
{
    let started = Instant::now();
    config.validate()?;
    if curves.is_empty() {
        return Err(FredError::EmptyInput);
    }
    if let Some(&bad) = coreset.curves().iter().find(|&&i| i >= curves.len()) {
        return Err(FredError::InvalidCoreset(format!(
            "coreset references curve {bad}, but only {} curves were given",
            curves.len()
        )));
    }

    let distinct = coreset.distinct();
    let members: Vec<&Curve> = distinct.iter().map(|&(i, _)| &curves[i]).collect();
    let Some(&first) = members.first() else {
        return Err(FredError::EmptyInput);
    };
    let mut diagnostics = SearchDiagnostics::default();

    let cost = coreset.cost();
    if cost == 0.0 {
        log::info!("coreset cost is zero, selecting its first curve");
        diagnostics.best_score = Some(0.0);
        diagnostics.duration = started.elapsed();
        return Ok(MedianResult {
            curve: first.clone(),
            score: 0.0,
            diagnostics,
        });
    }

    let weights: Vec<f64> = distinct.iter().map(|&(i, _)| coreset.lambda(i)).collect();
    let grid = RadiusGrid::new(&weights, coreset.total_weight(), cost, config.epsilon)?;
    let total = grid.size().unwrap_or(u64::MAX);
    let lower = cost / LOWER_BOUND_DIVISOR;
    log::info!(
        "median search: {} distinct curves, {total} radius vectors, sums in [{lower}, {cost}]",
        members.len()
    );

    let score = |candidate: &Curve| -> f64 {
        #[allow(clippy::cast_precision_loss)]
        let size = coreset.len() as f64;
        distinct
            .iter()
            .zip(&members)
            .map(|(&(i, multiplicity), member)| {
                #[allow(clippy::cast_precision_loss)]
                let multiplicity = multiplicity as f64;
                multiplicity * coreset.total_weight() / coreset.lambda(i) / size
                    * distance.distance(candidate, member)
            })
            .sum()
    };

    let mut best: Option<(Curve, f64)> = None;
    for radii in grid.vectors() {
        diagnostics.radius_vectors += 1;
        if diagnostics.radius_vectors % config.progress_interval == 0 {
            log::debug!(
                "{}/{total} radius vectors, {} candidates",
                diagnostics.radius_vectors,
                diagnostics.feasible
            );
        }

        let sum: f64 = radii.iter().sum();
        if sum < lower || sum > cost {
            diagnostics.pruned += 1;
            continue;
        }

        diagnostics.solver_invocations += 1;
        let search = search_cells(&members, &radii, solver)?;
        diagnostics.conic_solves += search.conic_solves;
        let Some(candidate) = search.curve else {
            continue;
        };
        diagnostics.feasible += 1;

        let value = score(&candidate);
        diagnostics.candidates_scored += 1;
        if best.as_ref().is_none_or(|(_, b)| value < *b) {
            best = Some((candidate, value));
        }
    }

    diagnostics.duration = started.elapsed();
    let Some((curve, score)) = best else {
        log::info!(
            "median search found no feasible radius vector ({} enumerated, {} pruned)",
            diagnostics.radius_vectors,
            diagnostics.pruned
        );
        return Err(FredError::NoFeasibleRadii {
            radius_vectors: diagnostics.radius_vectors,
            pruned: diagnostics.pruned,
        });
    };
    diagnostics.best_score = Some(score);
    log::info!(
        "median search: {} candidates from {} solver calls, best score {score}",
        diagnostics.feasible,
        diagnostics.solver_invocations
    );

    Ok(MedianResult {
        curve,
        score,
        diagnostics,
    })
}
