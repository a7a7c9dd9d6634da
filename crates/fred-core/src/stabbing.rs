//! Polygonal paths through an ordered sequence of balls.
//!
//! Each ball is approximated by a finite sample set. A window of
//! consecutive balls grows while every interior ball keeps at least one
//! sample inside the region spanned by each earlier window ball and the
//! newly added one. When an extension fails, the window before it is
//! closed: one sample per ball is chosen by global optimization of the
//! path's smoothness, and the first and last choices become a path
//! segment. The next window starts at the ball that failed.

use std::ops::Range;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use web_time::Instant;

use crate::anneal::{AnnealConfig, GlobalOptimizer, SimulatedAnnealing};
use crate::diagnostics::StabbingDiagnostics;
use crate::geometry::{angle_between, check_containment};
use crate::sampling::{SampleSet, default_sample_count, rejection_sampling};
use crate::types::{Ball, Curve, FredError, Point};

/// Default approximation parameter.
pub const DEFAULT_EPSILON: f64 = 0.5;

/// Default weight of the normalized path length in the window objective.
pub const DEFAULT_LENGTH_TIEBREAK: f64 = 0.01;

/// Objective value of a window too short to turn.
const STRAIGHT_SENTINEL: f64 = 0.0;

/// Upper bound on coordinate-descent sweeps after annealing.
const MAX_POLISH_SWEEPS: usize = 64;

/// Width trimmed from the top of each index bound so that flooring
/// never leaves the sample set.
const INDEX_MARGIN: f64 = 0.001;

/// Configuration for [`stabbing_path`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StabbingConfig {
    /// Approximation parameter; smaller values draw more samples.
    pub epsilon: f64,
    /// Samples per ball. `None` derives the count from `epsilon` and
    /// the number of balls (see [`default_sample_count`]).
    pub n_samples: Option<usize>,
    /// Weight of the normalized path length added to the turning angle,
    /// so that equally smooth candidates prefer shorter connections.
    pub length_tiebreak: f64,
    /// Seed for rejection sampling. Also seeds the optimizer when
    /// `anneal.seed` is unset.
    pub seed: Option<u64>,
    /// Schedule of the default optimizer.
    pub anneal: AnnealConfig,
}

impl Default for StabbingConfig {
    fn default() -> Self {
        Self {
            epsilon: DEFAULT_EPSILON,
            n_samples: None,
            length_tiebreak: DEFAULT_LENGTH_TIEBREAK,
            seed: None,
            anneal: AnnealConfig::default(),
        }
    }
}

impl StabbingConfig {
    /// Check every parameter.
    ///
    /// # Errors
    ///
    /// Returns [`FredError::InvalidConfig`] for a non-positive `epsilon`,
    /// a zero sample count, a negative tie-break weight, or an invalid
    /// annealing schedule.
    pub fn validate(&self) -> Result<(), FredError> {
        if !(self.epsilon.is_finite() && self.epsilon > 0.0) {
            return Err(FredError::InvalidConfig(format!(
                "epsilon must be positive, got {}",
                self.epsilon
            )));
        }
        if self.n_samples == Some(0) {
            return Err(FredError::InvalidConfig(
                "sample count must be positive".to_string(),
            ));
        }
        if !(self.length_tiebreak.is_finite() && self.length_tiebreak >= 0.0) {
            return Err(FredError::InvalidConfig(format!(
                "length tie-break must be non-negative, got {}",
                self.length_tiebreak
            )));
        }
        self.anneal.validate()
    }

    /// Samples per ball for a sequence of `balls` balls.
    #[must_use]
    pub fn sample_count(&self, balls: usize) -> usize {
        self.n_samples
            .unwrap_or_else(|| default_sample_count(self.epsilon, balls))
    }
}

/// Output of [`stabbing_path`].
#[derive(Debug, Clone)]
pub struct StabbingResult {
    /// Path vertices, in ball order.
    pub path: Vec<Point>,
    /// Final sample set of every ball.
    pub samples: Vec<SampleSet>,
    /// Counts and timing for the call.
    pub diagnostics: StabbingDiagnostics,
}

/// Build a path through `balls` in order, using simulated annealing.
///
/// Sampling and annealing are seeded from `config`; with a seed set the
/// result is reproducible.
///
/// # Errors
///
/// Returns [`FredError::EmptyInput`] for no balls,
/// [`FredError::DimensionMismatch`] if the balls disagree on
/// dimensionality, and [`FredError::InvalidConfig`] for a bad `config`.
pub fn stabbing_path(balls: &[Ball], config: &StabbingConfig) -> Result<StabbingResult, FredError> {
    config.validate()?;

    let mut rng = config
        .seed
        .map_or_else(ChaCha8Rng::from_entropy, ChaCha8Rng::seed_from_u64);
    let mut anneal = config.anneal.clone();
    if anneal.seed.is_none() {
        anneal.seed = config.seed.map(|s| s.wrapping_add(1));
    }
    let mut optimizer = SimulatedAnnealing::new(anneal);

    stabbing_path_with(balls, config, &mut optimizer, &mut rng)
}

/// Build a path through `balls` with an explicit optimizer and RNG.
///
/// # Errors
///
/// See [`stabbing_path`].
pub fn stabbing_path_with<O, R>(
    balls: &[Ball],
    config: &StabbingConfig,
    optimizer: &mut O,
    rng: &mut R,
) -> Result<StabbingResult, FredError>
where
    O: GlobalOptimizer + ?Sized,
    R: Rng + ?Sized,
{
    let started = Instant::now();
    config.validate()?;
    let Some(first) = balls.first() else {
        return Err(FredError::EmptyInput);
    };
    let dims = first.dimensions();
    if let Some(bad) = balls.iter().find(|b| b.dimensions() != dims) {
        return Err(FredError::DimensionMismatch {
            expected: dims,
            found: bad.dimensions(),
        });
    }

    let m = balls.len();
    let mut diagnostics = StabbingDiagnostics {
        balls: m,
        ..StabbingDiagnostics::default()
    };

    if balls.iter().all(|b| b.radius() == 0.0) {
        log::debug!("all {m} balls have radius zero, returning their centers");
        diagnostics.samples_per_ball = 1;
        diagnostics.duration = started.elapsed();
        return Ok(StabbingResult {
            path: balls.iter().map(|b| b.center().clone()).collect(),
            samples: balls
                .iter()
                .map(|b| SampleSet::new(vec![b.center().clone()]))
                .collect(),
            diagnostics,
        });
    }

    let n = config.sample_count(m);
    diagnostics.samples_per_ball = n;
    let mut current: Vec<SampleSet> = balls
        .iter()
        .map(|b| rejection_sampling(b, n, rng))
        .collect();
    let mut committed = current.clone();

    let mut window = Window {
        balls,
        tiebreak: config.length_tiebreak,
        optimizer,
        diagnostics: &mut diagnostics,
    };

    let mut path = Vec::new();
    let mut start = 0;
    let mut end = 0;
    let mut stabbable = true;

    while end < m {
        if stabbable {
            committed.clone_from(&current);
            stabbable = is_stabbable(balls, &committed, &mut current, start, end);
            end += 1;
        } else {
            end -= 1;
            log::debug!("ball {end} cannot extend window starting at {start}");
            window.diagnostics.failed_extensions += 1;
            window.close(&committed, start..end, &mut path);
            current.clone_from(&committed);
            start = end;
            stabbable = true;
        }
    }

    let samples = if stabbable {
        window.close(&current, start..m, &mut path);
        current
    } else {
        log::debug!("last ball {} cannot extend window starting at {start}", m - 1);
        window.diagnostics.failed_extensions += 1;
        window.close(&committed, start..m - 1, &mut path);
        let last = m - 1;
        path.push(
            committed[last]
                .get(0)
                .unwrap_or_else(|| balls[last].center())
                .clone(),
        );
        committed
    };

    diagnostics.duration = started.elapsed();
    log::info!(
        "stabbing path: {} vertices through {m} balls ({} windows, {} failed extensions)",
        path.len(),
        diagnostics.windows,
        diagnostics.failed_extensions,
    );

    Ok(StabbingResult {
        path,
        samples,
        diagnostics,
    })
}

/// Replace a curve by a stabbing path through `balls`, typically the
/// enclosing balls of a cluster center's vertices. The new curve is named
/// `"{name} (optimized)"`.
///
/// # Errors
///
/// See [`stabbing_path`].
pub fn optimized_curve(
    name: &str,
    balls: &[Ball],
    config: &StabbingConfig,
) -> Result<Curve, FredError> {
    let result = stabbing_path(balls, config)?;
    Curve::named(format!("{name} (optimized)"), result.path)
}

/// Filter the interior of window `[start, end)` against ball `end`.
///
/// For every `j` in `(start, end)` and every `i` in `[start, j)`, the
/// samples of `old[j]` are filtered to the region spanned by ball `i`
/// and ball `end`. Each region is tested against the full `old[j]`;
/// `new[j]` receives the filter of the last `i`. Returns `false` as soon
/// as any filter comes back empty.
///
/// # Panics
///
/// Panics if `end` is out of bounds for `balls`, or if `old` or `new`
/// is shorter than `end`.
pub fn is_stabbable(
    balls: &[Ball],
    old: &[SampleSet],
    new: &mut [SampleSet],
    start: usize,
    end: usize,
) -> bool {
    let target = &balls[end];
    for j in start + 1..end {
        for ball in &balls[start..j] {
            let kept = old[j].filtered(|p| {
                check_containment(
                    ball.center(),
                    ball.radius(),
                    target.center(),
                    target.radius(),
                    p,
                )
            });
            let empty = kept.is_empty();
            new[j] = kept;
            if empty {
                return false;
            }
        }
    }
    true
}

/// Closes windows into path segments.
struct Window<'a, O: ?Sized> {
    balls: &'a [Ball],
    tiebreak: f64,
    optimizer: &'a mut O,
    diagnostics: &'a mut StabbingDiagnostics,
}

impl<O: GlobalOptimizer + ?Sized> Window<'_, O> {
    /// Choose one sample per ball in `range` and append the first and
    /// last choice to `path` (one point for a single-ball window).
    fn close(&mut self, samples: &[SampleSet], range: Range<usize>, path: &mut Vec<Point>) {
        if range.is_empty() {
            return;
        }
        let chosen = compute_stabber(
            self.balls,
            samples,
            range,
            self.tiebreak,
            self.optimizer,
            self.diagnostics,
        );
        self.diagnostics.windows += 1;
        match chosen.as_slice() {
            [] => {}
            [only] => path.push(only.clone()),
            [first, .., last] => {
                path.push(first.clone());
                path.push(last.clone());
            }
        }
    }
}

/// Choose one sample from each ball in `range` minimizing the window
/// objective: annealing over continuous indices, then discrete
/// coordinate descent from the rounded result.
pub fn compute_stabber<O: GlobalOptimizer + ?Sized>(
    balls: &[Ball],
    samples: &[SampleSet],
    range: Range<usize>,
    tiebreak: f64,
    optimizer: &mut O,
    diagnostics: &mut StabbingDiagnostics,
) -> Vec<Point> {
    let sets = &samples[range.clone()];
    let window_balls = &balls[range];
    if sets.iter().any(SampleSet::is_empty) {
        log::warn!("window has a ball without samples, falling back to centers");
        return window_balls.iter().map(|b| b.center().clone()).collect();
    }

    let scale = window_scale(window_balls);
    let objective = |indices: &[usize]| {
        let points: Vec<&Point> = sets
            .iter()
            .zip(indices)
            .filter_map(|(set, &i)| set.get(i))
            .collect();
        window_objective(&points, tiebreak, scale)
    };

    #[allow(clippy::cast_precision_loss)]
    let bounds: Vec<(f64, f64)> = sets
        .iter()
        .map(|s| (0.0, (s.len() as f64 - INDEX_MARGIN).max(0.0)))
        .collect();
    let minimum = optimizer.minimize(
        &|x: &[f64]| {
            let indices: Vec<usize> = x
                .iter()
                .zip(sets)
                .map(|(&v, s)| floor_index(v, s.len()))
                .collect();
            objective(&indices)
        },
        &bounds,
    );
    diagnostics.optimizer_evaluations += minimum.evaluations;

    let mut indices: Vec<usize> = minimum
        .x
        .iter()
        .zip(sets)
        .map(|(&v, s)| floor_index(v, s.len()))
        .collect();
    diagnostics.optimizer_evaluations += polish(&mut indices, sets, &objective);

    sets.iter()
        .zip(&indices)
        .zip(window_balls)
        .map(|((set, &i), ball)| set.get(i).unwrap_or_else(|| ball.center()).clone())
        .collect()
}

/// Improve `indices` one coordinate at a time until no single change
/// lowers the objective. Returns the number of evaluations spent.
fn polish(indices: &mut [usize], sets: &[SampleSet], objective: &dyn Fn(&[usize]) -> f64) -> usize {
    let mut best = objective(indices);
    let mut evaluations = 1;

    for _ in 0..MAX_POLISH_SWEEPS {
        let mut improved = false;
        for k in 0..indices.len() {
            let keep = indices[k];
            let mut best_choice = keep;
            for candidate in 0..sets[k].len() {
                if candidate == keep {
                    continue;
                }
                indices[k] = candidate;
                let value = objective(indices);
                evaluations += 1;
                if value < best {
                    best = value;
                    best_choice = candidate;
                    improved = true;
                }
            }
            indices[k] = best_choice;
        }
        if !improved {
            break;
        }
    }
    evaluations
}

/// Largest exterior turning angle along `points`, plus the weighted,
/// normalized path length.
fn window_objective(points: &[&Point], tiebreak: f64, scale: f64) -> f64 {
    let turning = if points.len() < 3 {
        STRAIGHT_SENTINEL
    } else {
        points
            .windows(3)
            .map(|w| angle_between(&(w[1] - w[0]), &(w[2] - w[1])))
            .fold(0.0, f64::max)
    };
    let length: f64 = points.windows(2).map(|w| (w[1] - w[0]).norm()).sum();
    tiebreak.mul_add(length / scale, turning)
}

/// Length of the center chain plus the widest diameter; the unit that
/// makes path lengths comparable across windows.
fn window_scale(balls: &[Ball]) -> f64 {
    let chain: f64 = balls
        .windows(2)
        .map(|w| (w[1].center() - w[0].center()).norm())
        .sum();
    let widest = balls.iter().map(Ball::radius).fold(0.0, f64::max);
    let scale = 2.0f64.mul_add(widest, chain);
    if scale > 0.0 { scale } else { 1.0 }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn floor_index(v: f64, len: usize) -> usize {
    (v.max(0.0).floor() as usize).min(len.saturating_sub(1))
}
