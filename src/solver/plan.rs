//! Solver input/output shapes
//!
//! The solver is a pure function: it receives a snapshot and returns a
//! plan. It never touches the store; the assignment engine applies plans
//! transactionally.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{Employee, Rule, Shift};

/// Everything the solver reads, captured before the solve starts
#[derive(Debug, Clone)]
pub struct SolverSnapshot {
    pub employees: Vec<Employee>,
    pub shifts: Vec<Shift>,
    pub rules: Vec<Rule>,
    /// Prior published plan as (employee, shift) pairs, for stability scoring
    pub prior_plan: Vec<(Uuid, Uuid)>,
}

/// Weighted soft objectives; the default ordering is
/// cost ≥ fairness ≥ preference ≥ stability ≥ spread
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ObjectiveWeights {
    pub cost: f64,
    pub fairness: f64,
    pub preference: f64,
    pub stability: f64,
    pub spread: f64,
}

impl Default for ObjectiveWeights {
    fn default() -> Self {
        Self {
            cost: 1.0,
            fairness: 0.8,
            preference: 0.6,
            stability: 0.4,
            spread: 0.2,
        }
    }
}

/// Per-solve options
#[derive(Debug, Clone)]
pub struct SolverOptions {
    pub time_budget: Duration,
    /// Seed for deterministic tie-breaking; echoed in the result
    pub seed: u64,
    pub weights: ObjectiveWeights,
    /// Rest floor applied when a restriction rule demands minimum rest
    pub default_min_rest_hours: f64,
}

impl Default for SolverOptions {
    fn default() -> Self {
        Self {
            time_budget: Duration::from_secs(10),
            seed: 0,
            weights: ObjectiveWeights::default(),
            default_min_rest_hours: 8.0,
        }
    }
}

/// Result state of a solve
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanStatus {
    /// All hard constraints hold and local search converged
    Optimal,
    /// All hard constraints hold but the time budget cut improvement short
    Feasible,
    /// Some hard constraint cannot be satisfied
    Infeasible,
    /// The budget expired before any solution was constructed
    TimeoutNoSolution,
}

/// One planned assignment with the reasons it was chosen
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlannedAssignment {
    pub employee_id: Uuid,
    pub shift_id: Uuid,
    pub rationale_tags: Vec<String>,
}

/// A shift the plan could not cover, and why
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnassignedShift {
    pub shift_id: Uuid,
    pub reason: String,
}

/// Aggregate quality metrics for a plan
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanMetrics {
    pub total_cost: f64,
    pub fairness_stddev: f64,
    pub preferences_honored: u32,
    pub preferences_total: u32,
}

/// The solver's output
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Plan {
    pub status: PlanStatus,
    pub objective: f64,
    /// Relative gap to the cost lower bound, present for feasible plans
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gap: Option<f64>,
    pub assignments: Vec<PlannedAssignment>,
    pub unassigned_shifts: Vec<UnassignedShift>,
    pub metrics: PlanMetrics,
    /// Echoed seed for reproducibility
    pub seed: u64,
}

impl Plan {
    /// Assigned headcount for one shift
    pub fn headcount(&self, shift_id: Uuid) -> usize {
        self.assignments
            .iter()
            .filter(|a| a.shift_id == shift_id)
            .count()
    }

    /// Property: every shift is either fully covered or explained
    pub fn covers_or_explains(&self, shifts: &[Shift]) -> bool {
        shifts.iter().all(|s| {
            self.headcount(s.id) == s.required_staff as usize
                || self.unassigned_shifts.iter().any(|u| u.shift_id == s.id)
        })
    }
}
