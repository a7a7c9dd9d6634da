//! Run diagnostics: timing and counts for stabbing and median search.
//!
//! Collected on every call and returned alongside the results. Timing
//! uses the `web-time` crate, so the same code measures wall-clock time
//! natively and on WASM.
//!
//! Durations are serialized as fractional seconds (`f64`), since
//! `std::time::Duration` does not implement serde traits.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Serde support for `std::time::Duration` as fractional seconds.
mod duration_serde {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    /// Serialize a `Duration` as fractional seconds (`f64`).
    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        duration.as_secs_f64().serialize(serializer)
    }

    /// Deserialize a `Duration` from fractional seconds (`f64`).
    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(|_| {
            serde::de::Error::custom(
                "duration seconds must be finite, non-negative, and representable as a Duration",
            )
        })
    }
}

/// Diagnostics from one [`stabbing_path`](crate::stabbing_path) call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StabbingDiagnostics {
    /// Number of input balls.
    pub balls: usize,
    /// Samples drawn per ball of positive radius.
    pub samples_per_ball: usize,
    /// Windows closed by the optimizer (one path segment each).
    pub windows: usize,
    /// Extensions rejected because a sample set emptied.
    pub failed_extensions: usize,
    /// Objective evaluations across annealing and polishing.
    pub optimizer_evaluations: usize,
    /// Wall-clock duration of the call (seconds).
    #[serde(with = "duration_serde")]
    pub duration: Duration,
}

impl StabbingDiagnostics {
    /// Human-readable multi-line summary.
    #[must_use]
    pub fn report(&self) -> String {
        let mut lines = Vec::new();

        lines.push(format!("Stabbing Diagnostics Report\n{}", "=".repeat(40)));
        lines.push(format!(
            "Balls: {}  |  Samples per ball: {}",
            self.balls, self.samples_per_ball,
        ));
        lines.push(format!(
            "Windows: {}  |  Failed extensions: {}",
            self.windows, self.failed_extensions,
        ));
        lines.push(format!("Optimizer evaluations: {}", self.optimizer_evaluations));
        lines.push(format!("Total duration: {:.3}ms", duration_ms(self.duration)));

        lines.join("\n")
    }
}

/// Diagnostics from one [`compute_median`](crate::compute_median) call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchDiagnostics {
    /// Radius vectors enumerated from the grid.
    pub radius_vectors: u64,
    /// Radius vectors skipped by the cost bounds.
    pub pruned: u64,
    /// Calls into the cell boundary solver.
    pub solver_invocations: u64,
    /// Calls that produced a candidate curve.
    pub feasible: u64,
    /// Conic programs solved across all calls.
    pub conic_solves: u64,
    /// Candidates scored with the distance oracle.
    pub candidates_scored: u64,
    /// Weighted cost of the selected candidate.
    pub best_score: Option<f64>,
    /// Wall-clock duration of the search (seconds).
    #[serde(with = "duration_serde")]
    pub duration: Duration,
}

impl SearchDiagnostics {
    /// Human-readable multi-line summary.
    #[must_use]
    pub fn report(&self) -> String {
        let mut lines = Vec::new();

        lines.push(format!("Median Search Diagnostics Report\n{}", "=".repeat(40)));
        lines.push(format!(
            "Radius vectors: {}  |  Pruned: {}",
            self.radius_vectors, self.pruned,
        ));
        lines.push(format!(
            "Solver invocations: {}  |  Feasible: {}  |  Conic solves: {}",
            self.solver_invocations, self.feasible, self.conic_solves,
        ));
        lines.push(format!("Candidates scored: {}", self.candidates_scored));
        if let Some(score) = self.best_score {
            lines.push(format!("Best score: {score:.6}"));
        }
        lines.push(format!("Total duration: {:.3}ms", duration_ms(self.duration)));

        lines.join("\n")
    }
}

/// Convert a `Duration` to milliseconds as `f64`.
fn duration_ms(d: Duration) -> f64 {
    d.as_secs_f64() * 1000.0
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn duration_serializes_as_seconds() {
        let diag = StabbingDiagnostics {
            duration: Duration::from_millis(1500),
            ..StabbingDiagnostics::default()
        };
        let json = serde_json::to_value(&diag).unwrap();
        assert!((json["duration"].as_f64().unwrap() - 1.5).abs() < 1e-12);

        let back: StabbingDiagnostics = serde_json::from_value(json).unwrap();
        assert_eq!(back, diag);
    }

    #[test]
    fn negative_duration_is_rejected() {
        let json = r#"{"balls":1,"samples_per_ball":1,"windows":1,"failed_extensions":0,
            "optimizer_evaluations":1,"duration":-1.0}"#;
        assert!(serde_json::from_str::<StabbingDiagnostics>(json).is_err());
    }

    #[test]
    fn stabbing_report_mentions_counts() {
        let diag = StabbingDiagnostics {
            balls: 4,
            samples_per_ball: 139,
            windows: 2,
            failed_extensions: 1,
            optimizer_evaluations: 5000,
            duration: Duration::from_millis(20),
        };
        let report = diag.report();
        assert!(report.starts_with("Stabbing Diagnostics Report"));
        assert!(report.contains("Balls: 4  |  Samples per ball: 139"));
        assert!(report.contains("Failed extensions: 1"));
        assert!(report.ends_with("Total duration: 20.000ms"));
    }

    #[test]
    fn search_report_includes_best_score_when_present() {
        let mut diag = SearchDiagnostics {
            radius_vectors: 12,
            pruned: 5,
            ..SearchDiagnostics::default()
        };
        assert!(!diag.report().contains("Best score"));
        diag.best_score = Some(0.25);
        assert!(diag.report().contains("Best score: 0.250000"));
        assert!(diag.report().contains("Radius vectors: 12  |  Pruned: 5"));
    }
}
