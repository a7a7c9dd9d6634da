//! Rejection sampling of points inside balls.

use nalgebra::DVector;
use rand::Rng;

use crate::types::{Ball, Point};

/// A finite set of points approximating the interior of one ball.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SampleSet(Vec<Point>);

impl SampleSet {
    /// Create a sample set from points.
    #[must_use]
    pub const fn new(points: Vec<Point>) -> Self {
        Self(points)
    }

    /// Returns `true` if no candidates remain.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Number of candidates.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.0.len()
    }

    /// All candidates.
    #[must_use]
    pub fn points(&self) -> &[Point] {
        &self.0
    }

    /// Candidate `i`, if present.
    #[must_use]
    pub fn get(&self, i: usize) -> Option<&Point> {
        self.0.get(i)
    }

    /// Keep only the candidates satisfying `keep`.
    #[must_use = "returns the filtered sample set"]
    pub fn filtered(&self, mut keep: impl FnMut(&Point) -> bool) -> Self {
        Self(self.0.iter().filter(|p| keep(p)).cloned().collect())
    }

    /// Consumes the set and returns its points.
    #[must_use]
    pub fn into_points(self) -> Vec<Point> {
        self.0
    }
}

/// Draw `n` points approximately uniformly from the interior of `ball`.
///
/// Candidates are drawn from the cube `[-1, 1]^d`, rejected unless they
/// fall in the unit ball, then scaled by the radius and translated to
/// the center. A ball of radius zero yields the singleton `{center}`
/// regardless of `n`.
pub fn rejection_sampling<R: Rng + ?Sized>(ball: &Ball, n: usize, rng: &mut R) -> SampleSet {
    if ball.radius() == 0.0 {
        return SampleSet::new(vec![ball.center().clone()]);
    }

    let dims = ball.dimensions();
    let points = (0..n)
        .map(|_| {
            let unit = loop {
                let candidate = DVector::from_fn(dims, |_, _| rng.gen_range(-1.0..=1.0));
                if candidate.norm() <= 1.0 {
                    break candidate;
                }
            };
            unit * ball.radius() + ball.center()
        })
        .collect();
    SampleSet::new(points)
}

/// Default number of samples per ball: `max(1, ceil(100 · ln(balls) / epsilon))`.
///
/// Grows logarithmically with the number of balls. A single ball needs
/// no filtering and gets one sample.
#[must_use]
#[allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]
pub fn default_sample_count(epsilon: f64, balls: usize) -> usize {
    let n = (100.0 / epsilon * (balls as f64).ln()).ceil();
    if n.is_finite() && n >= 1.0 { n as usize } else { 1 }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    use super::*;

    fn ball(coords: &[f64], radius: f64) -> Ball {
        Ball::new(DVector::from_column_slice(coords), radius).unwrap()
    }

    #[test]
    fn zero_radius_yields_center_only() {
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let b = ball(&[3.0, -2.0], 0.0);
        let samples = rejection_sampling(&b, 50, &mut rng);
        assert_eq!(samples.len(), 1);
        assert_eq!(samples.points()[0], *b.center());
    }

    #[test]
    fn samples_lie_inside_ball() {
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        let b = ball(&[1.0, 2.0, 3.0], 0.75);
        let samples = rejection_sampling(&b, 200, &mut rng);
        assert_eq!(samples.len(), 200);
        assert!(samples.points().iter().all(|p| b.contains(p)));
    }

    #[test]
    fn samples_cover_both_halves() {
        let mut rng = ChaCha8Rng::seed_from_u64(11);
        let b = ball(&[0.0, 0.0], 1.0);
        let samples = rejection_sampling(&b, 400, &mut rng);
        let left = samples.points().iter().filter(|p| p[0] < 0.0).count();
        assert!((100..300).contains(&left), "left half got {left} of 400");
    }

    #[test]
    fn same_seed_same_samples() {
        let b = ball(&[0.0, 0.0], 2.0);
        let a = rejection_sampling(&b, 20, &mut ChaCha8Rng::seed_from_u64(3));
        let c = rejection_sampling(&b, 20, &mut ChaCha8Rng::seed_from_u64(3));
        assert_eq!(a, c);
    }

    #[test]
    fn default_sample_count_grows_with_ball_count() {
        assert_eq!(default_sample_count(0.5, 1), 1);
        assert_eq!(default_sample_count(0.5, 2), 139);
        assert!(default_sample_count(0.5, 100) > default_sample_count(0.5, 10));
        assert!(default_sample_count(0.1, 10) > default_sample_count(0.5, 10));
    }

    #[test]
    fn filtered_keeps_matching_points() {
        let set = SampleSet::new(vec![
            DVector::from_column_slice(&[0.0]),
            DVector::from_column_slice(&[1.0]),
            DVector::from_column_slice(&[2.0]),
        ]);
        let kept = set.filtered(|p| p[0] >= 1.0);
        assert_eq!(kept.len(), 2);
        assert!(set.filtered(|_| false).is_empty());
    }
}
