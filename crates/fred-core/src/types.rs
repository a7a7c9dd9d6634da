//! Shared types for median search and ball stabbing.

use nalgebra::DVector;
use serde::{Deserialize, Serialize};

/// A point in R^d.
///
/// Dimensionality is not part of the type; every public entry point
/// checks that all of its inputs agree.
pub type Point = DVector<f64>;

/// Serde support for a [`Point`] as a plain coordinate list.
pub(crate) mod point_serde {
    use nalgebra::DVector;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    /// Serialize a point as `[x0, x1, ...]`.
    pub fn serialize<S: Serializer>(
        point: &DVector<f64>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        point.as_slice().serialize(serializer)
    }

    /// Deserialize a point from `[x0, x1, ...]`.
    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<DVector<f64>, D::Error> {
        Vec::<f64>::deserialize(deserializer).map(DVector::from_vec)
    }
}

/// Serde support for a list of [`Point`]s as nested coordinate lists.
pub(crate) mod points_serde {
    use nalgebra::DVector;
    use serde::{Deserialize, Deserializer, Serializer};

    /// Serialize points as `[[x0, x1, ...], ...]`.
    pub fn serialize<S: Serializer>(
        points: &[DVector<f64>],
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(points.iter().map(DVector::as_slice))
    }

    /// Deserialize points from `[[x0, x1, ...], ...]`.
    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Vec<DVector<f64>>, D::Error> {
        let rows = Vec::<Vec<f64>>::deserialize(deserializer)?;
        Ok(rows.into_iter().map(DVector::from_vec).collect())
    }
}

/// A closed Euclidean ball.
///
/// Immutable once constructed. Deserialization goes through the same
/// validation as [`Ball::new`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawBall")]
pub struct Ball {
    #[serde(with = "point_serde")]
    center: Point,
    radius: f64,
}

/// Unvalidated serde mirror of [`Ball`].
#[derive(Deserialize)]
struct RawBall {
    #[serde(with = "point_serde")]
    center: Point,
    radius: f64,
}

impl TryFrom<RawBall> for Ball {
    type Error = FredError;

    fn try_from(raw: RawBall) -> Result<Self, Self::Error> {
        Self::new(raw.center, raw.radius)
    }
}

impl Ball {
    /// Create a ball.
    ///
    /// # Errors
    ///
    /// Returns [`FredError::InvalidBall`] if the radius is negative or
    /// not finite, or if the center is empty or has non-finite
    /// coordinates.
    pub fn new(center: Point, radius: f64) -> Result<Self, FredError> {
        if !radius.is_finite() || radius < 0.0 {
            return Err(FredError::InvalidBall(format!(
                "radius must be finite and non-negative, got {radius}"
            )));
        }
        if center.is_empty() {
            return Err(FredError::InvalidBall("center has no coordinates".to_string()));
        }
        if center.iter().any(|c| !c.is_finite()) {
            return Err(FredError::InvalidBall(
                "center has non-finite coordinates".to_string(),
            ));
        }
        Ok(Self { center, radius })
    }

    /// The center of the ball.
    #[must_use]
    pub const fn center(&self) -> &Point {
        &self.center
    }

    /// The radius of the ball.
    #[must_use]
    pub const fn radius(&self) -> f64 {
        self.radius
    }

    /// Dimensionality of the ambient space.
    #[must_use]
    pub fn dimensions(&self) -> usize {
        self.center.len()
    }

    /// Whether `p` lies in the closed ball.
    #[must_use]
    pub fn contains(&self, p: &Point) -> bool {
        (p - &self.center).norm() <= self.radius
    }
}

/// A polygonal curve: an ordered, non-empty sequence of points in R^d.
///
/// Segments are addressed with 1-based indices: segment `alpha` runs
/// from vertex `alpha - 1` to vertex `alpha`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawCurve")]
pub struct Curve {
    name: String,
    #[serde(with = "points_serde")]
    points: Vec<Point>,
}

/// Unvalidated serde mirror of [`Curve`].
#[derive(Deserialize)]
struct RawCurve {
    #[serde(default)]
    name: String,
    #[serde(with = "points_serde")]
    points: Vec<Point>,
}

impl TryFrom<RawCurve> for Curve {
    type Error = FredError;

    fn try_from(raw: RawCurve) -> Result<Self, Self::Error> {
        Self::named(raw.name, raw.points)
    }
}

impl Curve {
    /// Create an unnamed curve.
    ///
    /// # Errors
    ///
    /// See [`Curve::named`].
    pub fn new(points: Vec<Point>) -> Result<Self, FredError> {
        Self::named(String::new(), points)
    }

    /// Create a named curve.
    ///
    /// # Errors
    ///
    /// Returns [`FredError::InvalidCurve`] if `points` is empty, has
    /// zero-dimensional or non-finite points, or mixes dimensions.
    pub fn named(name: impl Into<String>, points: Vec<Point>) -> Result<Self, FredError> {
        let name = name.into();
        let Some(first) = points.first() else {
            return Err(FredError::InvalidCurve(format!("curve '{name}' has no points")));
        };
        let dims = first.len();
        if dims == 0 {
            return Err(FredError::InvalidCurve(format!(
                "curve '{name}' has zero-dimensional points"
            )));
        }
        if let Some(bad) = points.iter().position(|p| p.len() != dims) {
            return Err(FredError::InvalidCurve(format!(
                "curve '{name}' vertex {bad} has {} coordinates, expected {dims}",
                points[bad].len()
            )));
        }
        if points.iter().any(|p| p.iter().any(|c| !c.is_finite())) {
            return Err(FredError::InvalidCurve(format!(
                "curve '{name}' has non-finite coordinates"
            )));
        }
        Ok(Self { name, points })
    }

    /// Build a curve from coordinate rows, one row per vertex.
    ///
    /// # Errors
    ///
    /// See [`Curve::named`].
    pub fn from_rows<R: AsRef<[f64]>>(rows: &[R]) -> Result<Self, FredError> {
        Self::new(
            rows.iter()
                .map(|r| DVector::from_column_slice(r.as_ref()))
                .collect(),
        )
    }

    /// The curve's name (may be empty).
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of vertices.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.points.len()
    }

    /// Always `false`: curves have at least one vertex.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Dimensionality of the vertices.
    #[must_use]
    pub fn dimensions(&self) -> usize {
        self.points.first().map_or(0, DVector::len)
    }

    /// All vertices in order.
    #[must_use]
    pub fn points(&self) -> &[Point] {
        &self.points
    }

    /// Vertex `i` (0-based), if present.
    #[must_use]
    pub fn vertex(&self, i: usize) -> Option<&Point> {
        self.points.get(i)
    }

    /// The two endpoints of 1-based segment `alpha`.
    #[must_use]
    pub fn segment(&self, alpha: usize) -> Option<(&Point, &Point)> {
        if alpha == 0 {
            return None;
        }
        Some((self.points.get(alpha - 1)?, self.points.get(alpha)?))
    }

    /// The point at parameter `t` in `[0, 1]` along segment `alpha`.
    #[must_use]
    pub fn interpolate(&self, alpha: usize, t: f64) -> Option<Point> {
        let (a, b) = self.segment(alpha)?;
        Some(a * (1.0 - t) + b * t)
    }

    /// Consumes the curve and returns its vertices.
    #[must_use]
    pub fn into_points(self) -> Vec<Point> {
        self.points
    }
}

impl AsRef<Self> for Curve {
    fn as_ref(&self) -> &Self {
        self
    }
}

/// A weighted coreset over a corpus of curves.
///
/// Produced by an external coreset construction and consumed
/// read-only. `lambda` is indexed by corpus curve index; `curves` lists
/// the referenced corpus indices with repetition (multiplicity).
/// Deserialization goes through the same validation as [`Coreset::new`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawCoreset")]
pub struct Coreset {
    cost: f64,
    lambda: Vec<f64>,
    total_weight: f64,
    curves: Vec<usize>,
}

/// Unvalidated serde mirror of [`Coreset`].
#[derive(Deserialize)]
struct RawCoreset {
    cost: f64,
    lambda: Vec<f64>,
    total_weight: f64,
    curves: Vec<usize>,
}

impl TryFrom<RawCoreset> for Coreset {
    type Error = FredError;

    fn try_from(raw: RawCoreset) -> Result<Self, Self::Error> {
        Self::new(raw.cost, raw.lambda, raw.total_weight, raw.curves)
    }
}

impl Coreset {
    /// Create a coreset.
    ///
    /// # Errors
    ///
    /// Returns [`FredError::InvalidCoreset`] if `cost` is negative or not
    /// finite, `total_weight` is not positive, `curves` is empty, or a
    /// referenced curve has no positive weight in `lambda`.
    pub fn new(
        cost: f64,
        lambda: Vec<f64>,
        total_weight: f64,
        curves: Vec<usize>,
    ) -> Result<Self, FredError> {
        if !cost.is_finite() || cost < 0.0 {
            return Err(FredError::InvalidCoreset(format!(
                "cost must be finite and non-negative, got {cost}"
            )));
        }
        if !total_weight.is_finite() || total_weight <= 0.0 {
            return Err(FredError::InvalidCoreset(format!(
                "total weight must be positive, got {total_weight}"
            )));
        }
        if curves.is_empty() {
            return Err(FredError::InvalidCoreset(
                "coreset references no curves".to_string(),
            ));
        }
        for &idx in &curves {
            match lambda.get(idx) {
                Some(&w) if w.is_finite() && w > 0.0 => {}
                Some(&w) => {
                    return Err(FredError::InvalidCoreset(format!(
                        "curve {idx} has non-positive weight {w}"
                    )));
                }
                None => {
                    return Err(FredError::InvalidCoreset(format!(
                        "curve {idx} has no weight (only {} weights given)",
                        lambda.len()
                    )));
                }
            }
        }
        Ok(Self {
            cost,
            lambda,
            total_weight,
            curves,
        })
    }

    /// Objective value of the approximate median the coreset was built from.
    #[must_use]
    pub const fn cost(&self) -> f64 {
        self.cost
    }

    /// Weight of corpus curve `idx` (zero if unknown).
    #[must_use]
    pub fn lambda(&self, idx: usize) -> f64 {
        self.lambda.get(idx).copied().unwrap_or(0.0)
    }

    /// Sum of all weights.
    #[must_use]
    pub const fn total_weight(&self) -> f64 {
        self.total_weight
    }

    /// Referenced corpus indices, with repetition.
    #[must_use]
    pub fn curves(&self) -> &[usize] {
        &self.curves
    }

    /// Number of references, counting repetitions.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.curves.len()
    }

    /// Always `false` for a validated coreset.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.curves.is_empty()
    }

    /// Distinct referenced indices in order of first appearance, each
    /// with its multiplicity.
    #[must_use]
    pub fn distinct(&self) -> Vec<(usize, usize)> {
        let mut out: Vec<(usize, usize)> = Vec::new();
        for &idx in &self.curves {
            match out.iter_mut().find(|(i, _)| *i == idx) {
                Some((_, count)) => *count += 1,
                None => out.push((idx, 1)),
            }
        }
        out
    }
}

/// Errors surfaced to callers.
///
/// Infeasible conic programs and empty sample sets are ordinary control
/// flow and never appear here.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum FredError {
    /// No balls or curves were given.
    #[error("input is empty")]
    EmptyInput,

    /// Inputs disagree on dimensionality.
    #[error("dimension mismatch: expected {expected}, found {found}")]
    DimensionMismatch {
        /// Dimensionality of the first input.
        expected: usize,
        /// Dimensionality of the offending input.
        found: usize,
    },

    /// A ball failed validation.
    #[error("invalid ball: {0}")]
    InvalidBall(String),

    /// A curve failed validation.
    #[error("invalid curve: {0}")]
    InvalidCurve(String),

    /// A coreset failed validation.
    #[error("invalid coreset: {0}")]
    InvalidCoreset(String),

    /// A configuration value is out of range.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// One radius per curve is required.
    #[error("got {radii} radii for {curves} curves")]
    RadiusCountMismatch {
        /// Number of curves.
        curves: usize,
        /// Number of radii.
        radii: usize,
    },

    /// The radius grid was exhausted without a feasible candidate.
    #[error(
        "no feasible radius vector among {radius_vectors} candidates ({pruned} pruned by cost bounds)"
    )]
    NoFeasibleRadii {
        /// Radius vectors enumerated.
        radius_vectors: u64,
        /// Radius vectors skipped by the cost bounds.
        pruned: u64,
    },
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn pt(coords: &[f64]) -> Point {
        DVector::from_column_slice(coords)
    }

    // --- Ball ---

    #[test]
    fn ball_rejects_negative_radius() {
        let err = Ball::new(pt(&[0.0, 0.0]), -1.0).unwrap_err();
        assert!(matches!(err, FredError::InvalidBall(_)));
    }

    #[test]
    fn ball_rejects_nan_center() {
        assert!(Ball::new(pt(&[f64::NAN, 0.0]), 1.0).is_err());
    }

    #[test]
    fn ball_contains_boundary_point() {
        let ball = Ball::new(pt(&[1.0, 1.0]), 2.0).unwrap();
        assert!(ball.contains(&pt(&[3.0, 1.0])));
        assert!(!ball.contains(&pt(&[3.1, 1.0])));
        assert_eq!(ball.dimensions(), 2);
    }

    #[test]
    fn ball_deserialization_is_validated() {
        let ok: Ball = serde_json::from_str(r#"{"center":[1.0,2.0],"radius":0.5}"#).unwrap();
        assert!((ok.radius() - 0.5).abs() < f64::EPSILON);

        let bad = serde_json::from_str::<Ball>(r#"{"center":[1.0,2.0],"radius":-0.5}"#);
        assert!(bad.is_err());
    }

    // --- Curve ---

    #[test]
    fn curve_serializes_points_as_rows() {
        let c = Curve::named("a", vec![pt(&[0.0, 1.0]), pt(&[2.0, 3.0])]).unwrap();
        let json = serde_json::to_string(&c).unwrap();
        assert_eq!(json, r#"{"name":"a","points":[[0.0,1.0],[2.0,3.0]]}"#);
        let back: Curve = serde_json::from_str(&json).unwrap();
        assert_eq!(back, c);
    }

    #[test]
    fn curve_rejects_empty() {
        assert!(matches!(
            Curve::new(vec![]),
            Err(FredError::InvalidCurve(_))
        ));
    }

    #[test]
    fn curve_rejects_mixed_dimensions() {
        let err = Curve::named("mixed", vec![pt(&[0.0, 0.0]), pt(&[1.0])]).unwrap_err();
        assert!(err.to_string().contains("mixed"));
    }

    #[test]
    fn curve_segments_are_one_based() {
        let c = Curve::from_rows(&[[0.0, 0.0], [2.0, 0.0], [2.0, 4.0]]).unwrap();
        assert_eq!(c.len(), 3);
        assert!(c.segment(0).is_none());
        assert!(c.segment(3).is_none());
        let (a, b) = c.segment(2).unwrap();
        assert_eq!(a, &pt(&[2.0, 0.0]));
        assert_eq!(b, &pt(&[2.0, 4.0]));
    }

    #[test]
    fn curve_interpolates_within_segment() {
        let c = Curve::from_rows(&[[0.0, 0.0], [2.0, 0.0], [2.0, 4.0]]).unwrap();
        let mid = c.interpolate(2, 0.25).unwrap();
        assert!((mid - pt(&[2.0, 1.0])).norm() < 1e-12);
        assert_eq!(c.interpolate(1, 0.0).unwrap(), pt(&[0.0, 0.0]));
    }

    // --- Coreset ---

    #[test]
    fn coreset_distinct_keeps_first_appearance_order() {
        let coreset = Coreset::new(1.0, vec![1.0, 2.0, 3.0], 6.0, vec![2, 0, 2, 2, 0]).unwrap();
        assert_eq!(coreset.distinct(), vec![(2, 3), (0, 2)]);
        assert_eq!(coreset.len(), 5);
    }

    #[test]
    fn coreset_rejects_unweighted_reference() {
        let err = Coreset::new(1.0, vec![1.0, 0.0], 1.0, vec![0, 1]).unwrap_err();
        assert!(matches!(err, FredError::InvalidCoreset(_)));
        assert!(Coreset::new(1.0, vec![1.0], 1.0, vec![3]).is_err());
    }

    #[test]
    fn coreset_rejects_negative_cost() {
        assert!(Coreset::new(-1.0, vec![1.0], 1.0, vec![0]).is_err());
    }

    #[test]
    fn coreset_deserialization_validates() {
        let ok: Coreset = serde_json::from_str(
            r#"{"cost":1.0,"lambda":[1.0,2.0],"total_weight":3.0,"curves":[1,0]}"#,
        )
        .unwrap();
        assert_eq!(ok.curves(), &[1, 0]);

        let empty = serde_json::from_str::<Coreset>(
            r#"{"cost":0.0,"lambda":[],"total_weight":0.0,"curves":[]}"#,
        );
        assert!(empty.is_err());
        let unweighted = serde_json::from_str::<Coreset>(
            r#"{"cost":1.0,"lambda":[1.0],"total_weight":1.0,"curves":[2]}"#,
        );
        assert!(unweighted.is_err());
    }

    // --- FredError ---

    #[test]
    fn error_no_feasible_radii_display() {
        let err = FredError::NoFeasibleRadii {
            radius_vectors: 9,
            pruned: 4,
        };
        assert_eq!(
            err.to_string(),
            "no feasible radius vector among 9 candidates (4 pruned by cost bounds)",
        );
    }

    #[test]
    fn error_radius_count_display() {
        let err = FredError::RadiusCountMismatch {
            curves: 3,
            radii: 2,
        };
        assert_eq!(err.to_string(), "got 2 radii for 3 curves");
    }
}
