//! Integration tests: end-to-end stabbing and median search through the
//! public API, with the default Clarabel backend and annealing optimizer.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use fred_core::geometry::check_containment;
use fred_core::{
    Ball, Coreset, Curve, MedianConfig, StabbingConfig, compute_median, curve_within_radii,
    stabbing_path,
};
use nalgebra::DVector;

fn ball(center: &[f64], radius: f64) -> Ball {
    Ball::new(DVector::from_column_slice(center), radius).unwrap()
}

fn seeded(n_samples: usize, seed: u64) -> StabbingConfig {
    StabbingConfig {
        n_samples: Some(n_samples),
        seed: Some(seed),
        ..StabbingConfig::default()
    }
}

/// Hausdorff distance between the vertex sets; stands in for a Frechet
/// oracle when scoring candidates.
fn vertex_distance(a: &Curve, b: &Curve) -> f64 {
    let directed = |from: &Curve, to: &Curve| {
        from.points()
            .iter()
            .map(|p| {
                to.points()
                    .iter()
                    .map(|q| (p - q).norm())
                    .fold(f64::INFINITY, f64::min)
            })
            .fold(0.0, f64::max)
    };
    directed(a, b).max(directed(b, a))
}

// --- Stabbing ---

#[test]
fn two_distant_balls_get_a_short_straight_connection() {
    let balls = [ball(&[0.0, 0.0], 1.0), ball(&[10.0, 0.0], 1.0)];
    let result = stabbing_path(&balls, &seeded(400, 7)).expect("stabbing should succeed");

    eprintln!("{}", result.diagnostics.report());
    assert_eq!(result.path.len(), 2);
    let (first, second) = (&result.path[0], &result.path[1]);
    assert!(balls[0].contains(first));
    assert!(balls[1].contains(second));
    assert!(first[0] > 0.5, "first = {first:?}");
    assert!(second[0] < 9.5, "second = {second:?}");
    assert!(first[1].abs() < 0.5 && second[1].abs() < 0.5);
}

#[test]
fn zero_radius_balls_return_their_centers() {
    let balls = [
        ball(&[0.0, 0.0], 0.0),
        ball(&[1.0, 1.0], 0.0),
        ball(&[2.0, 2.0], 0.0),
    ];
    let result = stabbing_path(&balls, &StabbingConfig::default()).unwrap();
    let centers: Vec<_> = balls.iter().map(|b| b.center().clone()).collect();
    assert_eq!(result.path, centers);
}

#[test]
fn single_ball_yields_a_point_inside_it() {
    let balls = [ball(&[3.0, -2.0], 0.5)];
    let result = stabbing_path(&balls, &seeded(50, 1)).unwrap();
    assert!(!result.path.is_empty());
    assert!(result.path.iter().all(|p| balls[0].contains(p)));
}

#[test]
fn every_path_vertex_lies_in_some_ball() {
    let balls = [
        ball(&[0.0, 0.0], 1.0),
        ball(&[4.0, 0.5], 1.0),
        ball(&[8.0, 0.0], 1.0),
        ball(&[8.0, 6.0], 1.0),
    ];
    let result = stabbing_path(&balls, &seeded(120, 11)).unwrap();
    assert!(result.path.len() >= 2);
    for p in &result.path {
        assert!(balls.iter().any(|b| b.contains(p)), "stray vertex {p:?}");
    }
}

#[test]
fn seeded_stabbing_is_reproducible() {
    let balls = [
        ball(&[0.0, 0.0], 1.0),
        ball(&[5.0, 1.0], 1.5),
        ball(&[9.0, -1.0], 1.0),
    ];
    let a = stabbing_path(&balls, &seeded(100, 42)).unwrap();
    let b = stabbing_path(&balls, &seeded(100, 42)).unwrap();
    assert_eq!(a.path, b.path);
    assert_eq!(a.samples, b.samples);
}

// --- Containment ---

#[test]
fn containment_is_symmetric_in_the_ball_order() {
    let c1 = DVector::from_column_slice(&[0.0, 0.0]);
    let c2 = DVector::from_column_slice(&[6.0, 0.0]);
    let probes = [
        [3.0, 0.0],
        [3.0, 0.9],
        [3.0, 5.0],
        [-4.0, 0.0],
        [0.5, 0.5],
        [9.0, 0.2],
    ];
    for probe in probes {
        let p = DVector::from_column_slice(&probe);
        assert_eq!(
            check_containment(&c1, 1.0, &c2, 1.5, &p),
            check_containment(&c2, 1.5, &c1, 1.0, &p),
            "asymmetric at {probe:?}"
        );
    }
}

// --- Cell boundary solver ---

#[test]
fn nearby_curves_admit_a_common_curve() {
    let curves = vec![
        Curve::from_rows(&[[0.0, 0.0], [4.0, 0.0], [8.0, 0.0]]).unwrap(),
        Curve::from_rows(&[[0.0, 1.0], [4.0, 1.0], [8.0, 1.0]]).unwrap(),
    ];
    let found = curve_within_radii(&curves, &[0.6, 0.6]).unwrap();
    let found = found.expect("parallel curves one apart fit radius 0.6");
    assert!(found.len() >= 2);
    let start = &found.points()[0];
    assert!((start - &curves[0].points()[0]).norm() <= 0.6 + 1e-6);
    assert!((start - &curves[1].points()[0]).norm() <= 0.6 + 1e-6);
}

#[test]
fn distant_curves_have_no_common_curve() {
    let curves = vec![
        Curve::from_rows(&[[0.0, 0.0], [4.0, 0.0]]).unwrap(),
        Curve::from_rows(&[[0.0, 5.0], [4.0, 5.0]]).unwrap(),
    ];
    assert!(curve_within_radii(&curves, &[1.0, 1.0]).unwrap().is_none());
}

// --- Median search ---

#[test]
fn identical_curves_with_zero_cost_select_that_curve() {
    let curve = Curve::from_rows(&[[0.0, 0.0], [1.0, 0.0], [2.0, 1.0]]).unwrap();
    let curves = vec![curve.clone(), curve.clone()];
    let coreset = Coreset::new(0.0, vec![1.0, 1.0], 2.0, vec![0, 1]).unwrap();
    let result =
        compute_median(&curves, &coreset, &vertex_distance, &MedianConfig::default()).unwrap();
    assert_eq!(result.curve, curve);
    assert!(result.score.abs() < f64::EPSILON);
}

#[test]
fn median_search_is_idempotent() {
    let curves = vec![
        Curve::from_rows(&[[0.0, 0.0], [5.0, 0.0], [10.0, 0.0]]).unwrap(),
        Curve::from_rows(&[[0.0, 1.0], [5.0, 1.0], [10.0, 1.0]]).unwrap(),
    ];
    let coreset = Coreset::new(2.0, vec![1.0, 1.0], 2.0, vec![0, 1]).unwrap();
    let config = MedianConfig {
        epsilon: 16.0,
        ..MedianConfig::default()
    };
    let first = compute_median(&curves, &coreset, &vertex_distance, &config).unwrap();
    let second = compute_median(&curves, &coreset, &vertex_distance, &config).unwrap();
    eprintln!("{}", first.diagnostics.report());
    assert_eq!(first.curve, second.curve);
    assert!((first.score - second.score).abs() < 1e-12);
    assert!(first.score.is_finite());
}
