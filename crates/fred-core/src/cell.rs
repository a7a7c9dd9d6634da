//! Curves threading the ball covers of several curves at once.
//!
//! For a radius vector with one entry per curve, the free space of each
//! curve is the union of radius-`r_i` neighbourhoods of its segments. A
//! lattice configuration picks one segment per curve; its cell is the
//! set of points within every picked segment's neighbourhood. Starting
//! from the cell of all first segments, cells are explored by advancing
//! one curve at a time, each step decided by a conic feasibility
//! program on the shared boundary. A chain of boundary points from the
//! first cell to the last is the resulting curve.

use std::cmp::Ordering;
use std::collections::{HashSet, VecDeque};

use crate::conic::{ClarabelSolver, ConicOutcome, ConicProgram, ConicSolver};
use crate::types::{Curve, FredError, Point};

/// One 1-based segment index per curve.
///
/// Ordered lexicographically.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LatticeConfig(Vec<usize>);

impl LatticeConfig {
    /// Wrap per-curve segment indices.
    #[must_use]
    pub const fn new(indices: Vec<usize>) -> Self {
        Self(indices)
    }

    /// The first segment of each of `n` curves.
    #[must_use]
    pub fn ones(n: usize) -> Self {
        Self(vec![1; n])
    }

    /// The last segment of every curve.
    #[must_use]
    pub fn last_segments<C: AsRef<Curve>>(curves: &[C]) -> Self {
        Self(curves.iter().map(|c| c.as_ref().len() - 1).collect())
    }

    /// Copy with curve `j` advanced by one segment.
    #[must_use]
    pub fn advanced(&self, j: usize) -> Self {
        let mut next = self.0.clone();
        next[j] += 1;
        Self(next)
    }

    /// Whether `self` is component-wise `<= other` and the two differ by
    /// exactly one step in total.
    #[must_use]
    pub fn is_single_step_below(&self, other: &Self) -> bool {
        self.0.len() == other.0.len()
            && self.0.iter().zip(&other.0).all(|(a, b)| a <= b)
            && self.0.iter().zip(&other.0).map(|(a, b)| b - a).sum::<usize>() == 1
    }

    /// Segment indices.
    #[must_use]
    pub fn as_slice(&self) -> &[usize] {
        &self.0
    }

    /// Number of curves.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the configuration covers no curves.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// A point on the boundary between two adjacent cells.
#[derive(Debug, Clone, PartialEq)]
pub struct Border {
    /// The cell the border leads into.
    pub config: LatticeConfig,
    /// The cell the border was reached from.
    pub source: LatticeConfig,
    /// Position of the point along every curve's segment, in `[0, 1]`.
    pub params: Vec<f64>,
    /// The boundary point.
    pub point: Point,
}

impl Border {
    /// Continuous lattice coordinates of the border: for every curve, the
    /// index of its segment's start vertex plus the parameter along it.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn position(&self) -> Vec<f64> {
        self.source
            .as_slice()
            .iter()
            .zip(&self.params)
            .map(|(&a, &t)| (a - 1) as f64 + t)
            .collect()
    }

    /// Order by entered cell, then by continuous position.
    fn lattice_cmp(&self, other: &Self) -> Ordering {
        self.config.cmp(&other.config).then_with(|| {
            self.position()
                .iter()
                .zip(&other.position())
                .map(|(a, b)| a.total_cmp(b))
                .find(|o| o.is_ne())
                .unwrap_or(Ordering::Equal)
        })
    }
}

/// Outcome of one cell exploration, with its work counts.
#[derive(Debug, Clone, PartialEq)]
pub struct CellSearch {
    /// The threading curve, if one exists.
    pub curve: Option<Curve>,
    /// Conic programs solved.
    pub conic_solves: u64,
    /// Feasible borders recorded.
    pub borders: usize,
}

/// Find a curve that stays within `radii[i]` of curve `i` throughout,
/// using the Clarabel backend with default settings.
///
/// Returns `Ok(None)` when no such curve is found.
///
/// # Errors
///
/// See [`search_cells`].
pub fn curve_within_radii<C: AsRef<Curve>>(
    curves: &[C],
    radii: &[f64],
) -> Result<Option<Curve>, FredError> {
    curve_within_radii_with(curves, radii, &ClarabelSolver::default())
}

/// [`curve_within_radii`] with an explicit conic backend.
///
/// # Errors
///
/// See [`search_cells`].
pub fn curve_within_radii_with<C, S>(
    curves: &[C],
    radii: &[f64],
    solver: &S,
) -> Result<Option<Curve>, FredError>
where
    C: AsRef<Curve>,
    S: ConicSolver + ?Sized,
{
    search_cells(curves, radii, solver).map(|search| search.curve)
}

/// Explore the cell lattice of `curves` for `radii` and chain the
/// borders found into a curve.
///
/// # Errors
///
/// Returns [`FredError::EmptyInput`] for no curves,
/// [`FredError::RadiusCountMismatch`] unless there is one radius per
/// curve, [`FredError::InvalidConfig`] for a negative or non-finite
/// radius, [`FredError::InvalidCurve`] for a curve with fewer than two
/// vertices, and [`FredError::DimensionMismatch`] if the curves
/// disagree on dimensionality.
pub fn search_cells<C, S>(curves: &[C], radii: &[f64], solver: &S) -> Result<CellSearch, FredError>
where
    C: AsRef<Curve>,
    S: ConicSolver + ?Sized,
{
    let curves: Vec<&Curve> = curves.iter().map(AsRef::as_ref).collect();
    validate(&curves, radii)?;
    let dims = curves[0].dimensions();

    let mut search = CellSearch {
        curve: None,
        conic_solves: 0,
        borders: 0,
    };

    let firsts: Vec<&Point> = curves.iter().map(|c| &c.points()[0]).collect();
    search.conic_solves += 1;
    let Some(start) = solve_point(solver, &endpoint_program(&firsts, radii), dims, "start") else {
        return Ok(search);
    };

    let lasts: Vec<&Point> = curves.iter().map(|c| &c.points()[c.len() - 1]).collect();
    search.conic_solves += 1;
    let Some(end) = solve_point(solver, &endpoint_program(&lasts, radii), dims, "end") else {
        return Ok(search);
    };

    let origin = LatticeConfig::ones(curves.len());
    let terminal = LatticeConfig::last_segments(&curves);
    let (borders, solves) = explore(&curves, radii, solver, &origin);
    search.conic_solves += solves;
    search.borders = borders.len();

    let Some(points) = chain(borders, start, end, &origin, &terminal) else {
        log::debug!(
            "no border chain reaches {:?} ({} borders)",
            terminal.as_slice(),
            search.borders
        );
        return Ok(search);
    };
    search.curve = Some(Curve::new(points)?);
    Ok(search)
}

fn validate(curves: &[&Curve], radii: &[f64]) -> Result<(), FredError> {
    let Some(first) = curves.first() else {
        return Err(FredError::EmptyInput);
    };
    if radii.len() != curves.len() {
        return Err(FredError::RadiusCountMismatch {
            curves: curves.len(),
            radii: radii.len(),
        });
    }
    if let Some(r) = radii.iter().find(|r| !(r.is_finite() && **r >= 0.0)) {
        return Err(FredError::InvalidConfig(format!(
            "radii must be finite and non-negative, got {r}"
        )));
    }
    if let Some(short) = curves.iter().find(|c| c.len() < 2) {
        return Err(FredError::InvalidCurve(format!(
            "curve '{}' has {} vertices, at least 2 are required",
            short.name(),
            short.len()
        )));
    }
    let dims = first.dimensions();
    if let Some(bad) = curves.iter().find(|c| c.dimensions() != dims) {
        return Err(FredError::DimensionMismatch {
            expected: dims,
            found: bad.dimensions(),
        });
    }
    Ok(())
}

/// Solve a program whose last `dims` variables are the point.
fn solve_point<S: ConicSolver + ?Sized>(
    solver: &S,
    program: &ConicProgram,
    dims: usize,
    what: &str,
) -> Option<Point> {
    let x = solve(solver, program, what)?;
    let offset = x.len().checked_sub(dims)?;
    Some(Point::from_column_slice(&x[offset..]))
}

/// Run `program`, folding solver failures into infeasibility.
fn solve<S: ConicSolver + ?Sized>(
    solver: &S,
    program: &ConicProgram,
    what: &str,
) -> Option<Vec<f64>> {
    match solver.solve(program) {
        ConicOutcome::Feasible(x) if x.len() == program.variables() => Some(x),
        ConicOutcome::Feasible(x) => {
            log::warn!(
                "{what}: solver returned {} values for {} variables",
                x.len(),
                program.variables()
            );
            None
        }
        ConicOutcome::Infeasible => {
            log::debug!("{what}: infeasible");
            None
        }
        ConicOutcome::SolverError(message) => {
            log::warn!("{what}: solver error, treating as infeasible: {message}");
            None
        }
    }
}

/// Second-order rows for `||x - q|| <= r`, with the point occupying
/// variables `offset..offset + q.len()`.
fn ball_rows(q: &Point, radius: f64, variables: usize, offset: usize) -> Vec<(Vec<f64>, f64)> {
    let mut rows = Vec::with_capacity(q.len() + 1);
    rows.push((vec![0.0; variables], radius));
    for (k, &qk) in q.iter().enumerate() {
        let mut row = vec![0.0; variables];
        row[offset + k] = -1.0;
        rows.push((row, -qk));
    }
    rows
}

/// A point within `radii[i]` of `points[i]` for every `i`.
#[must_use]
pub fn endpoint_program(points: &[&Point], radii: &[f64]) -> ConicProgram {
    let dims = points.first().map_or(0, |p| p.len());
    let mut program = ConicProgram::new(dims);
    for (p, &r) in points.iter().zip(radii) {
        program.push_second_order(ball_rows(p, r, dims, 0));
    }
    program
}

/// A point on the exit boundary of cell `alpha` along curve `j`.
///
/// Curve `j` sits at the end of its segment. Every other curve `i` gets
/// a free parameter `t_i` in `[0, 1]` along its segment. Variables are
/// the `n - 1` parameters in curve order, then the point.
#[must_use]
pub fn border_program(
    curves: &[&Curve],
    radii: &[f64],
    alpha: &LatticeConfig,
    j: usize,
) -> ConicProgram {
    let n = curves.len();
    let dims = curves[0].dimensions();
    let variables = n - 1 + dims;
    let offset = n - 1;
    let param = |i: usize| if i < j { i } else { i - 1 };

    let mut program = ConicProgram::new(variables);

    let mut upper = Vec::with_capacity(n - 1);
    let mut lower = Vec::with_capacity(n - 1);
    for i in (0..n).filter(|&i| i != j) {
        let mut row = vec![0.0; variables];
        row[param(i)] = 1.0;
        upper.push((row, 1.0));
        let mut row = vec![0.0; variables];
        row[param(i)] = -1.0;
        lower.push((row, 0.0));
    }
    upper.extend(lower);
    program.push_nonnegative(upper);

    for (i, (curve, &r)) in curves.iter().zip(radii).enumerate() {
        let a = alpha.as_slice()[i];
        let from = &curve.points()[a - 1];
        let to = &curve.points()[a];
        if i == j {
            program.push_second_order(ball_rows(to, r, variables, offset));
            continue;
        }
        // x - (from + t (to - from)) with t a variable.
        let mut rows = Vec::with_capacity(dims + 1);
        rows.push((vec![0.0; variables], r));
        for k in 0..dims {
            let mut row = vec![0.0; variables];
            row[param(i)] = to[k] - from[k];
            row[offset + k] = -1.0;
            rows.push((row, -from[k]));
        }
        program.push_second_order(rows);
    }
    program
}

/// Breadth-first exploration from `origin`; each `(cell, curve)` pair is
/// solved at most once. Returns the borders found and the number of
/// programs solved.
fn explore<S: ConicSolver + ?Sized>(
    curves: &[&Curve],
    radii: &[f64],
    solver: &S,
    origin: &LatticeConfig,
) -> (Vec<Border>, u64) {
    let n = curves.len();
    let dims = curves[0].dimensions();
    let mut borders = Vec::new();
    let mut solves = 0;
    let mut visited = HashSet::from([origin.clone()]);
    let mut queue = VecDeque::from([origin.clone()]);

    while let Some(alpha) = queue.pop_front() {
        for j in 0..n {
            if alpha.as_slice()[j] + 1 >= curves[j].len() {
                continue;
            }
            solves += 1;
            let program = border_program(curves, radii, &alpha, j);
            let Some(x) = solve(solver, &program, "cell border") else {
                continue;
            };

            let params = (0..n)
                .map(|i| match i.cmp(&j) {
                    Ordering::Less => x[i].clamp(0.0, 1.0),
                    Ordering::Equal => 1.0,
                    Ordering::Greater => x[i - 1].clamp(0.0, 1.0),
                })
                .collect();
            let next = alpha.advanced(j);
            borders.push(Border {
                config: next.clone(),
                source: alpha.clone(),
                params,
                point: Point::from_column_slice(&x[n - 1..n - 1 + dims]),
            });
            if visited.insert(next.clone()) {
                queue.push_back(next);
            }
        }
    }

    log::debug!(
        "explored {} cells, {} borders from {solves} programs",
        visited.len(),
        borders.len()
    );
    (borders, solves)
}

/// Chain borders backwards from `terminal` to `origin`.
///
/// Borders are sorted by the cell they enter, then by position; from
/// each cell the furthest border entering it is taken, and the walk
/// continues from that border's source.
fn chain(
    mut borders: Vec<Border>,
    start: Point,
    end: Point,
    origin: &LatticeConfig,
    terminal: &LatticeConfig,
) -> Option<Vec<Point>> {
    borders.sort_by(Border::lattice_cmp);

    let mut points = vec![end];
    let mut cell = terminal.clone();
    let mut upper = borders.len();
    while cell != *origin {
        let idx = borders[..upper]
            .iter()
            .rposition(|b| b.config == cell && b.source.is_single_step_below(&b.config))?;
        let border = &borders[idx];
        points.push(border.point.clone());
        cell = border.source.clone();
        upper = idx;
    }
    points.push(start);
    points.reverse();
    Some(points)
}
