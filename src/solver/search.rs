//! Seeded greedy construction with local-search improvement
//!
//! Construction fills shifts in (priority, date, time) order, picking the
//! employee with the lowest weighted marginal score for each slot. A swap
//! pass then improves the plan until no improving move exists (optimal) or
//! the time budget runs out (feasible with gap).
//!
//! Determinism: ties break by a seeded permutation, so identical inputs and
//! seed produce identical plans. Cancellation is polled on every slot, well
//! inside the 100 ms requirement.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use statrs::statistics::Statistics;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::models::time::DateTimeSpan;

use super::model::{Ineligibility, Model};
use super::plan::{
    Plan, PlanMetrics, PlanStatus, PlannedAssignment, SolverOptions, SolverSnapshot,
    UnassignedShift,
};

/// Mutable assignment state during search
struct State {
    /// Employee indexes assigned per shift
    assigned: Vec<Vec<usize>>,
    /// Accumulated hours per employee
    emp_hours: Vec<f64>,
    /// Calendar spans per employee, with the owning shift index
    emp_spans: Vec<Vec<(DateTimeSpan, usize)>>,
}

impl State {
    fn new(n_shifts: usize, n_employees: usize) -> Self {
        Self {
            assigned: vec![Vec::new(); n_shifts],
            emp_hours: vec![0.0; n_employees],
            emp_spans: vec![Vec::new(); n_employees],
        }
    }

    fn assign(&mut self, ei: usize, si: usize, span: DateTimeSpan, hours: f64) {
        self.assigned[si].push(ei);
        self.emp_hours[ei] += hours;
        self.emp_spans[ei].push((span, si));
    }

    fn unassign(&mut self, ei: usize, si: usize, hours: f64) {
        self.assigned[si].retain(|e| *e != ei);
        self.emp_hours[ei] -= hours;
        self.emp_spans[ei].retain(|(_, s)| *s != si);
    }
}

pub struct Search<'a> {
    snapshot: &'a SolverSnapshot,
    model: &'a Model,
    options: &'a SolverOptions,
    cancel: &'a AtomicBool,
    deadline: Instant,
    /// Seeded tie-break permutation over employee indexes
    tiebreak: Vec<usize>,
}

impl<'a> Search<'a> {
    pub fn new(
        snapshot: &'a SolverSnapshot,
        model: &'a Model,
        options: &'a SolverOptions,
        cancel: &'a AtomicBool,
    ) -> Self {
        let mut rng = ChaCha8Rng::seed_from_u64(options.seed);
        let mut tiebreak: Vec<usize> = (0..snapshot.employees.len()).collect();
        tiebreak.shuffle(&mut rng);

        Self {
            snapshot,
            model,
            options,
            cancel,
            deadline: Instant::now() + options.time_budget,
            tiebreak,
        }
    }

    fn check_cancelled(&self) -> Result<()> {
        if self.cancel.load(Ordering::Relaxed) {
            return Err(Error::Cancelled);
        }
        Ok(())
    }

    fn out_of_time(&self) -> bool {
        Instant::now() >= self.deadline
    }

    /// Dynamic feasibility: overlap, rest floor, weekly cap, not already on shift
    fn can_take(&self, state: &State, ei: usize, si: usize) -> bool {
        if state.assigned[si].contains(&ei) {
            return false;
        }
        let shift = &self.snapshot.shifts[si];
        let span = shift.span();
        let hours = shift.duration_hours();

        if state.emp_hours[ei] + hours > self.model.hour_caps[ei] + 1e-9 {
            return false;
        }

        let rest_mins = (self.model.rest_floors[ei] * 60.0) as i64;
        for (existing, _) in &state.emp_spans[ei] {
            if existing.overlaps(&span) {
                return false;
            }
            if rest_mins > 0 {
                let gap = if existing.end <= span.start {
                    (span.start - existing.end).num_minutes()
                } else {
                    (existing.start - span.end).num_minutes()
                };
                if gap < rest_mins {
                    return false;
                }
            }
        }
        true
    }

    /// Weighted marginal score of putting employee `ei` on shift `si`
    fn score(&self, state: &State, ei: usize, si: usize) -> f64 {
        let w = &self.options.weights;
        let shift = &self.snapshot.shifts[si];
        let employee = &self.snapshot.employees[ei];
        let hours = shift.duration_hours();

        let cost = w.cost * employee.hourly_rate * hours;
        let fairness = w.fairness * state.emp_hours[ei];
        let spread = w.spread
            * ((state.emp_hours[ei] + hours).powi(2) - state.emp_hours[ei].powi(2));

        let mut preference = 0.0;
        for pref in self.model.preferences_for(ei) {
            if !pref.matches(shift) {
                preference += w.preference;
            }
        }

        let stability = if self.model.prior.contains(&(ei, si)) {
            -w.stability
        } else {
            0.0
        };

        cost + fairness + spread + preference + stability
    }

    /// Candidates for a slot, best score first, ties broken by seed
    fn ranked_candidates(&self, state: &State, si: usize) -> Vec<usize> {
        let mut candidates: Vec<usize> = (0..self.snapshot.employees.len())
            .filter(|&ei| self.model.eligibility[si][ei].is_none() && self.can_take(state, ei, si))
            .collect();

        candidates.sort_by(|&a, &b| {
            self.score(state, a, si)
                .partial_cmp(&self.score(state, b, si))
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| self.tiebreak[a].cmp(&self.tiebreak[b]))
        });
        candidates
    }

    /// Shift processing order: priority, then calendar position, then id
    fn shift_order(&self) -> Vec<usize> {
        let mut order: Vec<usize> = (0..self.snapshot.shifts.len()).collect();
        order.sort_by(|&a, &b| {
            let sa = &self.snapshot.shifts[a];
            let sb = &self.snapshot.shifts[b];
            sb.priority
                .cmp(&sa.priority)
                .then(sa.date.cmp(&sb.date))
                .then(sa.window.start.cmp(&sb.window.start))
                .then(sa.id.cmp(&sb.id))
        });
        order
    }

    /// Explain why a shift could not be fully staffed
    fn explain_shortfall(&self, state: &State, si: usize) -> String {
        let shift = &self.snapshot.shifts[si];
        let mut reasons: HashMap<&'static str, Vec<&str>> = HashMap::new();

        for (ei, employee) in self.snapshot.employees.iter().enumerate() {
            if state.assigned[si].contains(&ei) {
                continue;
            }
            let key = match self.model.eligibility[si][ei] {
                Some(Ineligibility::QualificationMissing) => "qualification_missing",
                Some(Ineligibility::Unavailable) => "unavailable",
                Some(Ineligibility::BlockedByRule) => "blocked_by_rule",
                None => {
                    if self.can_take(state, ei, si) {
                        continue;
                    }
                    "overlap_or_hour_cap"
                }
            };
            reasons.entry(key).or_default().push(&employee.first_name);
        }

        let mut parts: Vec<String> = reasons
            .into_iter()
            .map(|(kind, names)| format!("{kind}: {}", names.join(", ")))
            .collect();
        parts.sort();
        format!(
            "needs {} more of {} staff ({})",
            shift.required_staff as usize - state.assigned[si].len(),
            shift.required_staff,
            parts.join("; ")
        )
    }

    /// Pre-check the synthesized coverage windows from requirement rules
    ///
    /// Coverage per shift is exact, so the achievable headcount inside a
    /// window is fixed by the shift set itself.
    fn unmet_coverage_windows(&self) -> Vec<String> {
        let mut unmet = Vec::new();
        for cw in &self.model.coverage_windows {
            let dates: Vec<chrono::NaiveDate> = {
                let mut dates: Vec<_> = self
                    .snapshot
                    .shifts
                    .iter()
                    .map(|s| s.date)
                    .filter(|d| {
                        cw.days.is_empty()
                            || cw.days.contains(&chrono::Datelike::weekday(d))
                    })
                    .collect();
                dates.sort();
                dates.dedup();
                dates
            };

            for date in dates {
                let available: u32 = self
                    .snapshot
                    .shifts
                    .iter()
                    .filter(|s| s.date == date && s.window.overlaps(&cw.window))
                    .filter(|s| {
                        cw.qualification
                            .as_ref()
                            .map(|q| s.requirements.contains(q))
                            .unwrap_or(true)
                    })
                    .map(|s| s.required_staff)
                    .sum();
                if available < cw.min_headcount {
                    unmet.push(format!(
                        "requirement of {} staff during {} on {} exceeds scheduled capacity {}",
                        cw.min_headcount, cw.window, date, available
                    ));
                }
            }
        }
        unmet
    }

    /// Run construction and improvement, producing the final plan
    pub fn run(mut self) -> Result<Plan> {
        let n_shifts = self.snapshot.shifts.len();
        let n_employees = self.snapshot.employees.len();
        let mut state = State::new(n_shifts, n_employees);

        if self.out_of_time() {
            return Ok(self.finish(state, PlanStatus::TimeoutNoSolution, Vec::new()));
        }

        let coverage_failures = self.unmet_coverage_windows();

        // Construction
        let mut shortfalls: Vec<(usize, String)> = Vec::new();
        let mut constructed_all = true;
        for si in self.shift_order() {
            self.check_cancelled()?;
            if self.out_of_time() {
                constructed_all = false;
                break;
            }

            let shift = &self.snapshot.shifts[si];
            for _slot in 0..shift.required_staff {
                match self.ranked_candidates(&state, si).first().copied() {
                    Some(ei) => {
                        state.assign(ei, si, shift.span(), shift.duration_hours());
                    }
                    None => break,
                }
            }
            if state.assigned[si].len() < shift.required_staff as usize {
                let reason = self.explain_shortfall(&state, si);
                shortfalls.push((si, reason));
            }
        }

        if !constructed_all && state.assigned.iter().all(|a| a.is_empty()) {
            return Ok(self.finish(state, PlanStatus::TimeoutNoSolution, Vec::new()));
        }

        // Improvement: first-improvement swap passes until converged
        let mut converged = false;
        if constructed_all && shortfalls.is_empty() && coverage_failures.is_empty() {
            converged = self.improve(&mut state)?;
        }

        let status = if !coverage_failures.is_empty() || !shortfalls.is_empty() {
            PlanStatus::Infeasible
        } else if converged {
            PlanStatus::Optimal
        } else {
            PlanStatus::Feasible
        };

        let mut unassigned: Vec<UnassignedShift> = shortfalls
            .into_iter()
            .map(|(si, reason)| UnassignedShift {
                shift_id: self.snapshot.shifts[si].id,
                reason,
            })
            .collect();
        for failure in coverage_failures {
            unassigned.push(UnassignedShift {
                shift_id: Uuid::nil(),
                reason: failure,
            });
        }

        Ok(self.finish(state, status, unassigned))
    }

    /// Swap-based improvement; returns true when no improving move remains
    fn improve(&mut self, state: &mut State) -> Result<bool> {
        loop {
            self.check_cancelled()?;
            if self.out_of_time() {
                return Ok(false);
            }

            let mut improved = false;
            for si in 0..self.snapshot.shifts.len() {
                self.check_cancelled()?;
                if self.out_of_time() {
                    return Ok(false);
                }

                let shift = &self.snapshot.shifts[si];
                let hours = shift.duration_hours();
                let current: Vec<usize> = state.assigned[si].clone();

                for ei in current {
                    state.unassign(ei, si, hours);
                    let current_score = self.score(state, ei, si);

                    let replacement = self
                        .ranked_candidates(state, si)
                        .first()
                        .copied()
                        .filter(|&alt| {
                            alt != ei && self.score(state, alt, si) + 1e-9 < current_score
                        });

                    match replacement {
                        Some(alt) => {
                            state.assign(alt, si, shift.span(), hours);
                            improved = true;
                        }
                        None => {
                            state.assign(ei, si, shift.span(), hours);
                        }
                    }
                }
            }

            if !improved {
                return Ok(true);
            }
        }
    }

    /// Assemble the plan, objective, gap, and metrics
    fn finish(
        &self,
        state: State,
        status: PlanStatus,
        unassigned_shifts: Vec<UnassignedShift>,
    ) -> Plan {
        let w = &self.options.weights;

        let mut assignments = Vec::new();
        let mut total_cost = 0.0;
        let mut preferences_total = 0u32;
        let mut preferences_honored = 0u32;
        let mut stability_matches = 0u32;

        for (si, employees) in state.assigned.iter().enumerate() {
            let shift = &self.snapshot.shifts[si];
            let hours = shift.duration_hours();

            for &ei in employees {
                let employee = &self.snapshot.employees[ei];
                total_cost += employee.hourly_rate * hours;

                let mut tags = vec!["qualified".to_string()];
                let mut honored_here = false;
                for pref in self.model.preferences_for(ei) {
                    preferences_total += 1;
                    if pref.matches(shift) {
                        preferences_honored += 1;
                        honored_here = true;
                    }
                }
                if honored_here {
                    tags.push("preferred".to_string());
                }
                if self.model.prior.contains(&(ei, si)) {
                    stability_matches += 1;
                    tags.push("stable".to_string());
                }

                assignments.push(PlannedAssignment {
                    employee_id: employee.id,
                    shift_id: shift.id,
                    rationale_tags: tags,
                });
            }
        }

        let hours: Vec<f64> = state.emp_hours.clone();
        let fairness_stddev = if hours.len() > 1 {
            let sd = hours.as_slice().std_dev();
            if sd.is_nan() {
                0.0
            } else {
                sd
            }
        } else {
            0.0
        };

        let pref_violations = (preferences_total - preferences_honored) as f64;
        let spread: f64 = state.emp_hours.iter().map(|h| h * h).sum();
        let objective = w.cost * total_cost
            + w.fairness * fairness_stddev
            + w.preference * pref_violations
            + w.spread * spread
            - w.stability * stability_matches as f64;

        // Cost lower bound: cheapest eligible employee per slot
        let mut lower_bound = 0.0;
        for (si, shift) in self.snapshot.shifts.iter().enumerate() {
            let min_rate = (0..self.snapshot.employees.len())
                .filter(|&ei| self.model.eligibility[si][ei].is_none())
                .map(|ei| self.snapshot.employees[ei].hourly_rate)
                .fold(f64::INFINITY, f64::min);
            if min_rate.is_finite() {
                lower_bound +=
                    w.cost * min_rate * shift.duration_hours() * shift.required_staff as f64;
            }
        }
        let gap = match status {
            PlanStatus::Feasible if objective > 0.0 => {
                Some(((objective - lower_bound) / objective).max(0.0))
            }
            _ => None,
        };

        Plan {
            status,
            objective,
            gap,
            assignments,
            unassigned_shifts,
            metrics: PlanMetrics {
                total_cost,
                fairness_stddev,
                preferences_honored,
                preferences_total,
            },
            seed: self.options.seed,
        }
    }
}
