//! Constraint-based schedule generator and optimizer
//!
//! Builds an assignment plan from a snapshot of employees, shifts, and
//! rules. Decision model: a Boolean per (employee, shift) pair.
//!
//! # Hard constraints
//!
//! 1. Coverage: every shift gets exactly `required_staff` employees
//! 2. No overlapping shifts per employee
//! 3. Shift requirements ⊆ employee qualifications
//! 4. Availability map and availability rules
//! 5. Weekly hour caps and minimum rest from restriction rules
//! 6. Global requirement rules as synthesized coverage windows
//!
//! # Soft objectives (weighted sum, minimized)
//!
//! Labor cost, fairness (hour spread), preference violations, stability
//! against the prior plan, and per-employee over-assignment shaping.
//!
//! The solver is pure: no store access, deterministic for a fixed seed,
//! cancellable between slots (well under the 100 ms bound), and bounded by
//! a caller-supplied time budget.

pub mod model;
pub mod plan;
pub mod pool;
mod search;

use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use crate::error::Result;

pub use model::{Ineligibility, Model};
pub use plan::{
    ObjectiveWeights, Plan, PlanMetrics, PlanStatus, PlannedAssignment, SolverOptions,
    SolverSnapshot, UnassignedShift,
};
pub use pool::SolverPool;

/// Solve a snapshot into a plan
///
/// `cancel` is polled throughout; a cancelled solve returns
/// [`crate::error::Error::Cancelled`].
pub fn solve(
    snapshot: &SolverSnapshot,
    options: &SolverOptions,
    cancel: &AtomicBool,
) -> Result<Plan> {
    let model = Model::lower(snapshot, options);
    search::Search::new(snapshot, &model, options, cancel).run()
}

/// Convenience wrapper owning its cancellation flag
pub fn solve_uncancellable(snapshot: &SolverSnapshot, options: &SolverOptions) -> Result<Plan> {
    solve(snapshot, options, &AtomicBool::new(false))
}

/// Validate an existing assignment set against the hard constraints
///
/// Returns human-readable violations; an empty list means the assignments
/// satisfy every hard constraint the solver would enforce.
pub fn validate_assignments(
    snapshot: &SolverSnapshot,
    assignments: &[(uuid::Uuid, uuid::Uuid)],
    options: &SolverOptions,
) -> Vec<String> {
    let model = Model::lower(snapshot, options);
    let mut violations = Vec::new();

    let employee_index: std::collections::HashMap<uuid::Uuid, usize> = snapshot
        .employees
        .iter()
        .enumerate()
        .map(|(i, e)| (e.id, i))
        .collect();
    let shift_index: std::collections::HashMap<uuid::Uuid, usize> = snapshot
        .shifts
        .iter()
        .enumerate()
        .map(|(i, s)| (s.id, i))
        .collect();

    let mut emp_hours = vec![0.0f64; snapshot.employees.len()];
    let mut emp_spans: Vec<Vec<crate::models::time::DateTimeSpan>> =
        vec![Vec::new(); snapshot.employees.len()];
    let mut headcounts = vec![0u32; snapshot.shifts.len()];

    for (employee_id, shift_id) in assignments {
        let (Some(&ei), Some(&si)) = (employee_index.get(employee_id), shift_index.get(shift_id))
        else {
            violations.push(format!(
                "assignment references unknown employee {employee_id} or shift {shift_id}"
            ));
            continue;
        };
        let employee = &snapshot.employees[ei];
        let shift = &snapshot.shifts[si];

        if let Some(reason) = model.eligibility[si][ei] {
            violations.push(format!(
                "{} on shift {}: {}",
                employee.full_name(),
                shift.id,
                reason.as_str()
            ));
        }

        let span = shift.span();
        if emp_spans[ei].iter().any(|s| s.overlaps(&span)) {
            violations.push(format!(
                "{} has overlapping shifts on {}",
                employee.full_name(),
                shift.date
            ));
        }
        emp_spans[ei].push(span);
        emp_hours[ei] += shift.duration_hours();
        headcounts[si] += 1;

        if emp_hours[ei] > model.hour_caps[ei] + 1e-9 {
            violations.push(format!(
                "{} exceeds weekly hour cap of {}",
                employee.full_name(),
                model.hour_caps[ei]
            ));
        }
    }

    for (si, shift) in snapshot.shifts.iter().enumerate() {
        if headcounts[si] != shift.required_staff {
            violations.push(format!(
                "shift {} on {} has {} of {} required staff",
                shift.id, shift.date, headcounts[si], shift.required_staff
            ));
        }
    }

    violations
}

/// Shared cancellation flag type used by callers
pub type CancelFlag = Arc<AtomicBool>;
