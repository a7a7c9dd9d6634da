//! Vector and circle primitives used by the stabbing path builder.
//!
//! The containment test reduces three points in R^d to a canonical 2D
//! frame (first center at the origin, second center on the positive
//! x-axis) and works with `geo` coordinates and the robust orientation
//! predicate from there.

use std::f64::consts::FRAC_PI_2;

use geo::algorithm::kernels::{Kernel, Orientation, RobustKernel};
use geo::line_measures::Distance;
use geo::{Coord, Euclidean, Line};

use crate::types::Point;

/// Relative tolerance for treating a point triple as collinear.
const COLLINEAR_TOLERANCE: f64 = 1e-12;

/// Normalize `v`; the zero vector is returned unchanged.
#[must_use]
pub fn unit_vector(v: &Point) -> Point {
    let norm = v.norm();
    if norm == 0.0 { v.clone() } else { v / norm }
}

/// Exterior angle between two direction vectors, in `[0, pi]`.
///
/// Zero for parallel vectors, `pi` for a full reversal. A zero vector
/// has no direction and yields `pi / 2`.
#[must_use]
pub fn angle_between(v1: &Point, v2: &Point) -> f64 {
    unit_vector(v1)
        .dot(&unit_vector(v2))
        .clamp(-1.0, 1.0)
        .acos()
}

/// The two outer tangent segments of circles `(c1, r1)` and `(c2, r2)`.
///
/// Each segment runs from its touch point on the first circle to its
/// touch point on the second. The first segment lies counter-clockwise
/// of the center line, the second clockwise. Coincident centers have no
/// center line; the tangent angle is then `pi / 2`.
#[must_use]
pub fn outer_tangents(
    c1: Coord<f64>,
    r1: f64,
    c2: Coord<f64>,
    r2: f64,
) -> (Line<f64>, Line<f64>) {
    let direction = (c2.y - c1.y).atan2(c2.x - c1.x);
    let offset = if c1 == c2 {
        FRAC_PI_2
    } else {
        let distance = Euclidean.distance(&geo::Point::from(c1), &geo::Point::from(c2));
        ((r1 - r2) / distance).clamp(-1.0, 1.0).acos()
    };

    let touch = |c: Coord<f64>, r: f64, angle: f64| Coord {
        x: angle.cos().mul_add(r, c.x),
        y: angle.sin().mul_add(r, c.y),
    };

    let upper = direction + offset;
    let lower = direction - offset;
    (
        Line::new(touch(c1, r1, upper), touch(c2, r2, upper)),
        Line::new(touch(c1, r1, lower), touch(c2, r2, lower)),
    )
}

/// Three points expressed in a shared 2D frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CanonicalFrame {
    /// Image of the first point: always the origin.
    pub first: Coord<f64>,
    /// Image of the second point: on the non-negative x-axis.
    pub second: Coord<f64>,
    /// Image of the third point: `x` is its signed position along the
    /// first-to-second axis, `y >= 0` its distance from that axis.
    pub point: Coord<f64>,
}

/// Express `p3` relative to the line through `p1` and `p2` in 2D.
///
/// Distances between all three points are preserved. If `p1 == p2` the
/// axis is undefined and the third point is placed on the y-axis.
#[must_use]
pub fn canonical_frame(p1: &Point, p2: &Point, p3: &Point) -> CanonicalFrame {
    let axis = p2 - p1;
    let length = axis.norm();
    let offset = p3 - p1;

    let (along, across) = if length == 0.0 {
        (0.0, offset.norm())
    } else {
        let along = offset.dot(&axis) / length;
        let across = (&offset - &axis * (along / length)).norm();
        (along, across)
    };

    CanonicalFrame {
        first: Coord { x: 0.0, y: 0.0 },
        second: Coord { x: length, y: 0.0 },
        point: Coord {
            x: along,
            y: across,
        },
    }
}

/// Whether three points lie on one line (up to floating-point noise).
#[must_use]
pub fn are_collinear(a: &Point, b: &Point, c: &Point) -> bool {
    let mut d = [(a - b).norm(), (b - c).norm(), (c - a).norm()];
    d.sort_by(f64::total_cmp);
    let [short, mid, long] = d;
    (long - (short + mid)).abs() <= COLLINEAR_TOLERANCE * long.max(1.0)
}

/// Whether `p` lies in the region spanned by balls `(c1, r1)` and
/// `(c2, r2)`.
///
/// The region is the union of both balls with the band between their
/// outer tangent lines, cut off where the projection of `p` onto the
/// center line leaves the span between the two centers.
#[must_use]
pub fn check_containment(c1: &Point, r1: f64, c2: &Point, r2: f64, p: &Point) -> bool {
    let d1 = (p - c1).norm();
    let d2 = (p - c2).norm();
    if d1 <= r1 || d2 <= r2 {
        return true;
    }

    let span = (c2 - c1).norm();
    if are_collinear(c1, c2, p) {
        return d1 <= span && d2 <= span;
    }

    let frame = canonical_frame(c1, c2, p);
    let (upper, lower) = outer_tangents(frame.first, r1, frame.second, r2);

    let below_upper = RobustKernel::orient2d(upper.start, upper.end, frame.point)
        != Orientation::CounterClockwise;
    let above_lower =
        RobustKernel::orient2d(lower.start, lower.end, frame.point) != Orientation::Clockwise;

    let projection = geo::Point::new(frame.point.x, 0.0);
    let within_span = Euclidean.distance(&projection, &geo::Point::from(frame.first)) <= span
        && Euclidean.distance(&projection, &geo::Point::from(frame.second)) <= span;

    below_upper && above_lower && within_span
}
