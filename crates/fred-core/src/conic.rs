//! Second-order-cone feasibility programs.
//!
//! Programs are built in the standard conic form `A x + s = b`, `s ∈ K`,
//! where `K` is an ordered product of nonnegative orthants and
//! second-order cones, with a zero objective. [`ConicSolver`] is the seam
//! to the numerical backend; [`ClarabelSolver`] is the production
//! implementation.

use clarabel::algebra::CscMatrix;
use clarabel::solver::{
    DefaultSettingsBuilder, DefaultSolver, IPSolver, SolverStatus, SupportedConeT,
};
use serde::{Deserialize, Serialize};

use crate::types::FredError;

/// Default iteration cap for the interior-point solver.
pub const DEFAULT_MAX_ITERATIONS: u32 = 200;

/// Default feasibility and duality-gap tolerance.
pub const DEFAULT_TOLERANCE: f64 = 1e-8;

/// One block of the cone `K`, sized in constraint rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConeBlock {
    /// `s_i >= 0` for every row of the block.
    Nonnegative(usize),
    /// `s_0 >= ||(s_1, ..., s_{n-1})||`.
    SecondOrder(usize),
}

impl ConeBlock {
    /// Number of rows in the block.
    #[must_use]
    pub const fn rows(self) -> usize {
        match self {
            Self::Nonnegative(n) | Self::SecondOrder(n) => n,
        }
    }
}

/// A solver-agnostic feasibility program with dense constraint rows.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ConicProgram {
    variables: usize,
    rows: Vec<Vec<f64>>,
    rhs: Vec<f64>,
    cones: Vec<ConeBlock>,
}

impl ConicProgram {
    /// An empty program over `variables` unknowns.
    #[must_use]
    pub const fn new(variables: usize) -> Self {
        Self {
            variables,
            rows: Vec::new(),
            rhs: Vec::new(),
            cones: Vec::new(),
        }
    }

    /// Append a nonnegative block: `b_i - a_i · x >= 0` for each `(a_i, b_i)`.
    pub fn push_nonnegative(&mut self, rows: Vec<(Vec<f64>, f64)>) {
        self.push_block(rows, ConeBlock::Nonnegative);
    }

    /// Append a second-order block over the slacks `b_i - a_i · x`.
    ///
    /// The first row is the cone's scalar bound.
    pub fn push_second_order(&mut self, rows: Vec<(Vec<f64>, f64)>) {
        self.push_block(rows, ConeBlock::SecondOrder);
    }

    fn push_block(&mut self, rows: Vec<(Vec<f64>, f64)>, cone: fn(usize) -> ConeBlock) {
        if rows.is_empty() {
            return;
        }
        self.cones.push(cone(rows.len()));
        for (mut row, b) in rows {
            row.resize(self.variables, 0.0);
            self.rows.push(row);
            self.rhs.push(b);
        }
    }

    /// Number of unknowns.
    #[must_use]
    pub const fn variables(&self) -> usize {
        self.variables
    }

    /// Dense constraint matrix rows.
    #[must_use]
    pub fn rows(&self) -> &[Vec<f64>] {
        &self.rows
    }

    /// Right-hand side `b`.
    #[must_use]
    pub fn rhs(&self) -> &[f64] {
        &self.rhs
    }

    /// Cone blocks in row order.
    #[must_use]
    pub fn cones(&self) -> &[ConeBlock] {
        &self.cones
    }

    /// Total number of constraint rows.
    #[must_use]
    pub fn constraint_count(&self) -> usize {
        self.rows.len()
    }

    /// Whether `x` satisfies every block within `tolerance`.
    #[must_use]
    pub fn is_satisfied_by(&self, x: &[f64], tolerance: f64) -> bool {
        let slacks: Vec<f64> = self
            .rows
            .iter()
            .zip(&self.rhs)
            .map(|(row, b)| b - row.iter().zip(x).map(|(a, v)| a * v).sum::<f64>())
            .collect();

        let mut offset = 0;
        self.cones.iter().all(|&cone| {
            let block = &slacks[offset..offset + cone.rows()];
            offset += cone.rows();
            match cone {
                ConeBlock::Nonnegative(_) => block.iter().all(|&s| s >= -tolerance),
                ConeBlock::SecondOrder(_) => {
                    let tail = block[1..].iter().map(|s| s * s).sum::<f64>().sqrt();
                    tail <= block[0] + tolerance
                }
            }
        })
    }
}

/// Outcome of one feasibility program.
///
/// Callers must match all three variants; only `Feasible` carries a
/// solution vector.
#[derive(Debug, Clone, PartialEq)]
pub enum ConicOutcome {
    /// A point satisfying every constraint.
    Feasible(Vec<f64>),
    /// The solver certified that no such point exists.
    Infeasible,
    /// The solver failed numerically or could not be configured.
    SolverError(String),
}

/// A backend that decides conic feasibility programs.
pub trait ConicSolver {
    /// Decide `program`, returning a witness point when feasible.
    fn solve(&self, program: &ConicProgram) -> ConicOutcome;
}

/// Settings passed to the interior-point backend on every call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SolverConfig {
    /// Print the solver's iteration log to stdout.
    pub verbose: bool,
    /// Iteration cap.
    pub max_iterations: u32,
    /// Feasibility and duality-gap tolerance.
    pub tolerance: f64,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            verbose: false,
            max_iterations: DEFAULT_MAX_ITERATIONS,
            tolerance: DEFAULT_TOLERANCE,
        }
    }
}

impl SolverConfig {
    /// Check that the settings are usable.
    ///
    /// # Errors
    ///
    /// Returns [`FredError::InvalidConfig`] for a zero iteration cap or a
    /// tolerance that is not positive.
    pub fn validate(&self) -> Result<(), FredError> {
        if self.max_iterations == 0 {
            return Err(FredError::InvalidConfig(
                "solver iteration cap must be positive".to_string(),
            ));
        }
        if !(self.tolerance.is_finite() && self.tolerance > 0.0) {
            return Err(FredError::InvalidConfig(format!(
                "solver tolerance must be positive, got {}",
                self.tolerance
            )));
        }
        Ok(())
    }
}

/// [`ConicSolver`] backed by the Clarabel interior-point solver.
#[derive(Debug, Clone, Default)]
pub struct ClarabelSolver {
    config: SolverConfig,
}

impl ClarabelSolver {
    /// Create a solver with explicit settings.
    #[must_use]
    pub const fn new(config: SolverConfig) -> Self {
        Self { config }
    }

    /// The settings used on every call.
    #[must_use]
    pub const fn config(&self) -> &SolverConfig {
        &self.config
    }
}

impl ConicSolver for ClarabelSolver {
    fn solve(&self, program: &ConicProgram) -> ConicOutcome {
        let n = program.variables();
        let p = CscMatrix::new(n, n, vec![0; n + 1], Vec::new(), Vec::new());
        let q = vec![0.0; n];
        let a = dense_to_csc(program.rows(), n);
        let cones: Vec<SupportedConeT<f64>> = program
            .cones()
            .iter()
            .map(|&cone| match cone {
                ConeBlock::Nonnegative(rows) => SupportedConeT::NonnegativeConeT(rows),
                ConeBlock::SecondOrder(rows) => SupportedConeT::SecondOrderConeT(rows),
            })
            .collect();

        let settings = match DefaultSettingsBuilder::default()
            .verbose(self.config.verbose)
            .max_iter(self.config.max_iterations)
            .tol_feas(self.config.tolerance)
            .tol_gap_abs(self.config.tolerance)
            .tol_gap_rel(self.config.tolerance)
            .build()
        {
            Ok(settings) => settings,
            Err(e) => return ConicOutcome::SolverError(format!("invalid solver settings: {e}")),
        };

        let mut solver = DefaultSolver::new(&p, &q, &a, program.rhs(), &cones, settings);
        solver.solve();

        let status = solver.solution.status;
        log::debug!(
            "clarabel: {status:?} after {} iterations ({} rows, {n} variables)",
            solver.solution.iterations,
            program.constraint_count(),
        );

        match status {
            SolverStatus::Solved | SolverStatus::AlmostSolved => {
                ConicOutcome::Feasible(solver.solution.x.clone())
            }
            SolverStatus::PrimalInfeasible | SolverStatus::AlmostPrimalInfeasible => {
                ConicOutcome::Infeasible
            }
            other => ConicOutcome::SolverError(format!("solver stopped with status {other:?}")),
        }
    }
}

/// Convert dense rows over `columns` unknowns to compressed sparse
/// column form, dropping explicit zeros.
fn dense_to_csc(rows: &[Vec<f64>], columns: usize) -> CscMatrix<f64> {
    let mut colptr = Vec::with_capacity(columns + 1);
    let mut rowval = Vec::new();
    let mut nzval = Vec::new();

    colptr.push(0);
    for col in 0..columns {
        for (r, row) in rows.iter().enumerate() {
            let v = row.get(col).copied().unwrap_or(0.0);
            if v != 0.0 {
                rowval.push(r);
                nzval.push(v);
            }
        }
        colptr.push(nzval.len());
    }

    CscMatrix::new(rows.len(), columns, colptr, rowval, nzval)
}
