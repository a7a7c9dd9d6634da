//! Derivative-free global minimization over a box.
//!
//! [`GlobalOptimizer`] is the seam the stabbing path builder optimizes
//! through. [`SimulatedAnnealing`] is the production implementation:
//! Cauchy-distributed visiting steps on one coordinate at a time,
//! Metropolis acceptance and geometric cooling, driven by a seedable
//! [`ChaCha8Rng`].

use std::f64::consts::PI;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use crate::types::FredError;

/// Default number of annealing steps.
pub const DEFAULT_MAX_ITERATIONS: usize = 2000;

/// Default starting temperature.
pub const DEFAULT_INITIAL_TEMPERATURE: f64 = 1.0;

/// Default temperature floor.
pub const DEFAULT_FINAL_TEMPERATURE: f64 = 1e-3;

/// Default geometric cooling factor applied after every step.
pub const DEFAULT_COOLING_RATE: f64 = 0.995;

/// Visiting step size at the initial temperature, as a fraction of the
/// bound width.
const STEP_FRACTION: f64 = 0.1;

/// Smallest step scale relative to [`STEP_FRACTION`], reached as the
/// temperature approaches its floor.
const MIN_STEP_SCALE: f64 = 0.01;

/// Configuration for [`SimulatedAnnealing`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnnealConfig {
    /// Number of proposals after the initial point.
    pub max_iterations: usize,
    /// Temperature of the first proposal.
    pub initial_temperature: f64,
    /// Temperature floor; cooling never goes below it.
    pub final_temperature: f64,
    /// Multiplier applied to the temperature after every proposal (0-1).
    pub cooling_rate: f64,
    /// Random seed for reproducibility (None = from entropy).
    pub seed: Option<u64>,
}

impl Default for AnnealConfig {
    fn default() -> Self {
        Self {
            max_iterations: DEFAULT_MAX_ITERATIONS,
            initial_temperature: DEFAULT_INITIAL_TEMPERATURE,
            final_temperature: DEFAULT_FINAL_TEMPERATURE,
            cooling_rate: DEFAULT_COOLING_RATE,
            seed: None,
        }
    }
}

impl AnnealConfig {
    /// Set the number of proposals.
    #[must_use]
    pub const fn with_max_iterations(mut self, iterations: usize) -> Self {
        self.max_iterations = iterations;
        self
    }

    /// Set the temperature schedule.
    #[must_use]
    pub const fn with_temperature(
        mut self,
        initial: f64,
        cooling_rate: f64,
        final_temp: f64,
    ) -> Self {
        self.initial_temperature = initial;
        self.cooling_rate = cooling_rate;
        self.final_temperature = final_temp;
        self
    }

    /// Set the random seed.
    #[must_use]
    pub const fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Check that the schedule is usable.
    ///
    /// # Errors
    ///
    /// Returns [`FredError::InvalidConfig`] if a temperature is not
    /// positive, the floor exceeds the starting temperature, or the
    /// cooling rate is outside `(0, 1]`.
    pub fn validate(&self) -> Result<(), FredError> {
        if !(self.initial_temperature.is_finite() && self.initial_temperature > 0.0) {
            return Err(FredError::InvalidConfig(format!(
                "initial temperature must be positive, got {}",
                self.initial_temperature
            )));
        }
        if !(self.final_temperature.is_finite() && self.final_temperature > 0.0) {
            return Err(FredError::InvalidConfig(format!(
                "final temperature must be positive, got {}",
                self.final_temperature
            )));
        }
        if self.final_temperature > self.initial_temperature {
            return Err(FredError::InvalidConfig(format!(
                "final temperature {} exceeds initial temperature {}",
                self.final_temperature, self.initial_temperature
            )));
        }
        if !(self.cooling_rate > 0.0 && self.cooling_rate <= 1.0) {
            return Err(FredError::InvalidConfig(format!(
                "cooling rate must be in (0, 1], got {}",
                self.cooling_rate
            )));
        }
        Ok(())
    }
}

/// Best point found by a [`GlobalOptimizer`].
#[derive(Debug, Clone, PartialEq)]
pub struct Minimum {
    /// Location of the minimum, within the bounds.
    pub x: Vec<f64>,
    /// Objective value at `x`.
    pub value: f64,
    /// Number of objective evaluations spent.
    pub evaluations: usize,
}

/// A derivative-free minimizer over a box-constrained domain.
pub trait GlobalOptimizer {
    /// Approximately minimize `objective` over the box `bounds`, given
    /// as one inclusive `(low, high)` pair per coordinate.
    fn minimize(&mut self, objective: &dyn Fn(&[f64]) -> f64, bounds: &[(f64, f64)]) -> Minimum;
}

/// Simulated annealing with Cauchy visiting steps.
#[derive(Debug, Clone)]
pub struct SimulatedAnnealing {
    config: AnnealConfig,
    rng: ChaCha8Rng,
}

impl SimulatedAnnealing {
    /// Create an optimizer; the RNG is seeded from `config.seed` when
    /// present.
    #[must_use]
    pub fn new(config: AnnealConfig) -> Self {
        let rng = config
            .seed
            .map_or_else(ChaCha8Rng::from_entropy, ChaCha8Rng::seed_from_u64);
        Self { config, rng }
    }

    /// The configuration this optimizer runs with.
    #[must_use]
    pub const fn config(&self) -> &AnnealConfig {
        &self.config
    }

    /// Standard Cauchy variate by inversion.
    fn cauchy(&mut self) -> f64 {
        let u: f64 = self.rng.gen_range(0.0..1.0);
        (PI * (u - 0.5)).tan()
    }
}

impl GlobalOptimizer for SimulatedAnnealing {
    fn minimize(&mut self, objective: &dyn Fn(&[f64]) -> f64, bounds: &[(f64, f64)]) -> Minimum {
        let mut current: Vec<f64> = bounds
            .iter()
            .map(|&(lo, hi)| {
                if hi > lo {
                    self.rng.gen_range(lo..=hi)
                } else {
                    lo
                }
            })
            .collect();
        let mut current_value = objective(&current);
        let mut evaluations = 1;

        let mut best = current.clone();
        let mut best_value = current_value;

        if bounds.is_empty() {
            return Minimum {
                x: best,
                value: best_value,
                evaluations,
            };
        }

        let mut temperature = self.config.initial_temperature;
        for _ in 0..self.config.max_iterations {
            let k = self.rng.gen_range(0..bounds.len());
            let (lo, hi) = bounds[k];
            let scale = (temperature / self.config.initial_temperature).max(MIN_STEP_SCALE)
                * STEP_FRACTION
                * (hi - lo);

            let mut candidate = current.clone();
            candidate[k] = self.cauchy().mul_add(scale, candidate[k]).clamp(lo, hi);

            let candidate_value = objective(&candidate);
            evaluations += 1;

            let delta = candidate_value - current_value;
            let accepted = delta <= 0.0 || self.rng.r#gen::<f64>() < (-delta / temperature).exp();
            if accepted {
                current = candidate;
                current_value = candidate_value;
                if current_value < best_value {
                    best.clone_from(&current);
                    best_value = current_value;
                }
            }

            temperature =
                (temperature * self.config.cooling_rate).max(self.config.final_temperature);
        }

        Minimum {
            x: best,
            value: best_value,
            evaluations,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn seeded(seed: u64) -> SimulatedAnnealing {
        SimulatedAnnealing::new(AnnealConfig::default().with_seed(seed))
    }

    fn bowl(x: &[f64]) -> f64 {
        (x[0] - 3.0).powi(2) + (x[1] + 1.0).powi(2)
    }

    // --- Config ---

    #[test]
    fn default_config_is_valid() {
        AnnealConfig::default().validate().unwrap();
    }

    #[test]
    fn config_builder_sets_fields() {
        let config = AnnealConfig::default()
            .with_max_iterations(50)
            .with_temperature(2.0, 0.9, 0.01)
            .with_seed(42);
        assert_eq!(config.max_iterations, 50);
        assert!((config.initial_temperature - 2.0).abs() < 1e-12);
        assert!((config.cooling_rate - 0.9).abs() < 1e-12);
        assert!((config.final_temperature - 0.01).abs() < 1e-12);
        assert_eq!(config.seed, Some(42));
    }

    #[test]
    fn config_rejects_bad_schedules() {
        let base = AnnealConfig::default();
        assert!(base.clone().with_temperature(0.0, 0.9, 0.0).validate().is_err());
        assert!(base.clone().with_temperature(1.0, 1.5, 0.1).validate().is_err());
        assert!(base.clone().with_temperature(1.0, 0.0, 0.1).validate().is_err());
        assert!(base.with_temperature(0.1, 0.9, 1.0).validate().is_err());
    }

    // --- Minimization ---

    #[test]
    fn finds_bowl_minimum() {
        let min = seeded(5).minimize(&bowl, &[(-10.0, 10.0), (-10.0, 10.0)]);
        assert!((min.x[0] - 3.0).abs() < 0.5, "x = {:?}", min.x);
        assert!((min.x[1] + 1.0).abs() < 0.5, "x = {:?}", min.x);
        assert!(min.value < 0.5);
    }

    #[test]
    fn result_stays_within_bounds() {
        // Unconstrained minimum at (3, -1) lies outside this box.
        let bounds = [(4.0, 6.0), (0.0, 1.0)];
        let min = seeded(9).minimize(&bowl, &bounds);
        for (x, (lo, hi)) in min.x.iter().zip(bounds) {
            assert!((lo..=hi).contains(x));
        }
    }

    #[test]
    fn counts_every_evaluation() {
        let mut opt = SimulatedAnnealing::new(
            AnnealConfig::default().with_max_iterations(25).with_seed(1),
        );
        let min = opt.minimize(&bowl, &[(0.0, 1.0), (0.0, 1.0)]);
        assert_eq!(min.evaluations, 26);
    }

    #[test]
    fn empty_bounds_evaluate_once() {
        let min = seeded(1).minimize(&|_| 7.0, &[]);
        assert!(min.x.is_empty());
        assert!((min.value - 7.0).abs() < f64::EPSILON);
        assert_eq!(min.evaluations, 1);
    }

    #[test]
    fn degenerate_bounds_pin_coordinate() {
        let min = seeded(2).minimize(&bowl, &[(2.0, 2.0), (-5.0, 5.0)]);
        assert!((min.x[0] - 2.0).abs() < f64::EPSILON);
    }

    #[test]
    fn same_seed_same_minimum() {
        let bounds = [(-10.0, 10.0), (-10.0, 10.0)];
        let a = seeded(77).minimize(&bowl, &bounds);
        let b = seeded(77).minimize(&bowl, &bounds);
        assert_eq!(a, b);
    }
}
