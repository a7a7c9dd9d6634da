//! fred-core: Frechet median search and ball-stabbing paths (sans-IO).
//!
//! Two entry points:
//!
//! - [`compute_median`] searches a grid of per-curve radius vectors for a
//!   curve that stays within each input curve's radius, and returns the
//!   candidate with the lowest weighted distance to a coreset.
//! - [`stabbing_path`] builds a short polyline that passes through a
//!   sequence of balls in order.
//!
//! [`compute_median`] obtains its candidates from [`curve_within_radii`],
//! which explores the cells of the free-space lattice with
//! second-order-cone feasibility programs. [`stabbing_path`] works on
//! sampled points alone.
//!
//! The distance oracle, the conic backend, and the global optimizer are
//! traits, so callers can swap any of them. This crate performs no I/O
//! and does not compute Frechet distances itself.

pub mod anneal;
pub mod cell;
pub mod conic;
pub mod diagnostics;
pub mod geometry;
pub mod median;
pub mod sampling;
pub mod stabbing;
pub mod types;

pub use anneal::{AnnealConfig, GlobalOptimizer, Minimum, SimulatedAnnealing};
pub use cell::{CellSearch, curve_within_radii, curve_within_radii_with, search_cells};
pub use conic::{ClarabelSolver, ConicOutcome, ConicProgram, ConicSolver, SolverConfig};
pub use diagnostics::{SearchDiagnostics, StabbingDiagnostics};
pub use median::{
    CurveDistance, MedianConfig, MedianResult, RadiusGrid, compute_median, compute_median_with,
};
pub use sampling::{SampleSet, rejection_sampling};
pub use stabbing::{
    StabbingConfig, StabbingResult, optimized_curve, stabbing_path, stabbing_path_with,
};
pub use types::{Ball, Coreset, Curve, FredError, Point};
