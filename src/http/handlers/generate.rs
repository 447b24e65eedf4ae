//! Schedule generation, optimization, and validation endpoints
//!
//! Handlers snapshot the store, hand the pure solver to the worker pool,
//! and return the plan. Client disconnects propagate: dropping the request
//! future flips the cancellation flag the solver polls.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::State;
use axum::{Extension, Json};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth::{Action, Actor};
use crate::engine::BulkResponse;
use crate::error::{Error, Result};
use crate::http::AppState;
use crate::metrics;
use crate::solver::{self, ObjectiveWeights, Plan, SolverOptions, SolverSnapshot};

// ============================================================================
// Payloads
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GenerateRequest {
    pub week_start: NaiveDate,
    #[serde(default)]
    pub week_end: Option<NaiveDate>,
    #[serde(default)]
    pub department_id: Option<Uuid>,
    /// Apply the plan to this schedule when set
    #[serde(default)]
    pub schedule_id: Option<Uuid>,
    #[serde(default)]
    pub expected_version: Option<i32>,
    #[serde(default)]
    pub seed: Option<u64>,
    #[serde(default)]
    pub weights: Option<ObjectiveWeights>,
    #[serde(default)]
    pub time_budget_secs: Option<u64>,
    /// Push coarse progress events to the caller's user topic
    #[serde(default)]
    pub progress: bool,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OptimizeRequest {
    pub schedule_id: Uuid,
    #[serde(default)]
    pub department_id: Option<Uuid>,
    #[serde(default)]
    pub seed: Option<u64>,
    #[serde(default)]
    pub weights: Option<ObjectiveWeights>,
    #[serde(default)]
    pub time_budget_secs: Option<u64>,
    /// Push coarse progress events to the caller's user topic
    #[serde(default)]
    pub progress: bool,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ValidateRequest {
    pub schedule_id: Uuid,
}

#[derive(Debug, Serialize)]
pub struct GenerateResponse {
    #[serde(flatten)]
    pub plan: Plan,
    /// Present when the plan was applied to a schedule
    #[serde(skip_serializing_if = "Option::is_none")]
    pub applied: Option<BulkResponse>,
}

#[derive(Debug, Serialize)]
pub struct ValidateResponse {
    pub valid: bool,
    pub violations: Vec<String>,
}

// ============================================================================
// Handlers
// ============================================================================

/// `POST /api/schedule/generate`
pub async fn generate(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Json(request): Json<GenerateRequest>,
) -> Result<Json<GenerateResponse>> {
    actor.allows(Action::SolverRun)?;

    let week_end = request
        .week_end
        .unwrap_or(request.week_start + chrono::Duration::days(6));
    if week_end < request.week_start || (week_end - request.week_start).num_days() > 7 {
        return Err(Error::validation("week_end", "must be within 7 days of week_start"));
    }

    let snapshot = build_snapshot(
        &state,
        request.week_start,
        week_end,
        request.department_id,
        None,
    )
    .await?;
    let options = build_options(&state, request.seed, request.weights, request.time_budget_secs);

    if request.progress {
        publish_progress(&state, &actor, "started", None);
    }
    let plan = run_solver(&state, snapshot, options).await?;
    if request.progress {
        publish_progress(&state, &actor, "solved", Some(status_label(plan.status)));
    }

    let applied = match (request.schedule_id, &plan.status) {
        (Some(schedule_id), solver::PlanStatus::Optimal | solver::PlanStatus::Feasible) => Some(
            state
                .engine
                .apply_solver_plan(&actor, schedule_id, &plan, request.expected_version)
                .await?,
        ),
        _ => None,
    };

    Ok(Json(GenerateResponse { plan, applied }))
}

/// `POST /api/schedule/optimize`: re-solve seeded by the current assignments
pub async fn optimize(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Json(request): Json<OptimizeRequest>,
) -> Result<Json<GenerateResponse>> {
    actor.allows(Action::SolverRun)?;

    let schedule = state
        .store
        .schedules
        .get(request.schedule_id)
        .await?
        .ok_or_else(|| Error::not_found("schedule", request.schedule_id))?;

    let snapshot = build_snapshot(
        &state,
        schedule.week_start,
        schedule.week_end,
        request.department_id,
        Some(request.schedule_id),
    )
    .await?;
    let options = build_options(&state, request.seed, request.weights, request.time_budget_secs);

    if request.progress {
        publish_progress(&state, &actor, "started", None);
    }
    let plan = run_solver(&state, snapshot, options).await?;
    if request.progress {
        publish_progress(&state, &actor, "solved", Some(status_label(plan.status)));
    }
    Ok(Json(GenerateResponse {
        plan,
        applied: None,
    }))
}

/// Coarse progress fanout for long-running generation requests
fn publish_progress(state: &AppState, actor: &Actor, phase: &str, status: Option<&str>) {
    state.broadcaster.publish(
        &crate::broadcast::topics::user(actor.id),
        crate::broadcast::EventKind::NotificationCreated,
        serde_json::json!({
            "category": "schedule_generation",
            "phase": phase,
            "status": status,
        }),
    );
}

/// `POST /api/schedule/validate`: check stored assignments against the rules
pub async fn validate(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Json(request): Json<ValidateRequest>,
) -> Result<Json<ValidateResponse>> {
    actor.allows(Action::SolverRun)?;

    let schedule = state
        .store
        .schedules
        .get(request.schedule_id)
        .await?
        .ok_or_else(|| Error::not_found("schedule", request.schedule_id))?;

    let snapshot = build_snapshot(
        &state,
        schedule.week_start,
        schedule.week_end,
        None,
        None,
    )
    .await?;

    let assignments: Vec<(Uuid, Uuid)> = state
        .store
        .assignments
        .list_for_schedule(request.schedule_id)
        .await?
        .into_iter()
        .filter(|a| !a.status.is_terminal())
        .map(|a| (a.employee_id, a.shift_id))
        .collect();

    let options = build_options(&state, None, None, None);
    let violations = solver::validate_assignments(&snapshot, &assignments, &options);

    Ok(Json(ValidateResponse {
        valid: violations.is_empty(),
        violations,
    }))
}

// ============================================================================
// Helpers
// ============================================================================

/// Snapshot the store for the solver: active employees, shifts in range,
/// active rules, and optionally the prior plan for stability scoring
async fn build_snapshot(
    state: &AppState,
    week_start: NaiveDate,
    week_end: NaiveDate,
    department_id: Option<Uuid>,
    prior_schedule: Option<Uuid>,
) -> Result<SolverSnapshot> {
    let employees = state.store.employees.list_active().await?;
    let shifts = state
        .store
        .shifts
        .list_in_range(week_start, week_end, department_id)
        .await?;
    if shifts.is_empty() {
        return Err(Error::validation(
            "week_start",
            "no shifts scheduled in the requested window",
        ));
    }
    let rules = state.store.rules.list_active().await?;

    let prior_plan = match prior_schedule {
        Some(schedule_id) => state
            .store
            .assignments
            .list_for_schedule(schedule_id)
            .await?
            .into_iter()
            .filter(|a| !a.status.is_terminal())
            .map(|a| (a.employee_id, a.shift_id))
            .collect(),
        None => Vec::new(),
    };

    Ok(SolverSnapshot {
        employees,
        shifts,
        rules,
        prior_plan,
    })
}

fn build_options(
    state: &AppState,
    seed: Option<u64>,
    weights: Option<ObjectiveWeights>,
    time_budget_secs: Option<u64>,
) -> SolverOptions {
    let configured = state.config.solver.time_budget_secs;
    SolverOptions {
        time_budget: Duration::from_secs(
            time_budget_secs.unwrap_or(configured).min(configured.max(60)),
        ),
        seed: seed.unwrap_or_else(rand::random),
        weights: weights.unwrap_or_default(),
        default_min_rest_hours: 8.0,
    }
}

/// Sets the solver's cancel flag when the request future is dropped
struct CancelOnDrop(Arc<AtomicBool>);

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        self.0.store(true, Ordering::Relaxed);
    }
}

async fn run_solver(
    state: &AppState,
    snapshot: SolverSnapshot,
    options: SolverOptions,
) -> Result<Plan> {
    let cancel = Arc::new(AtomicBool::new(false));
    // If this future is dropped (client disconnect), the flag flips and the
    // running solve aborts at its next poll
    let _guard = CancelOnDrop(cancel.clone());

    let started = Instant::now();
    let result = state
        .solver_pool
        .run(move || solver::solve(&snapshot, &options, &cancel))
        .await;

    let elapsed = started.elapsed().as_secs_f64();
    match &result {
        Ok(plan) => {
            metrics::record_solver_run(status_label(plan.status), elapsed);
            tracing::info!(
                status = status_label(plan.status),
                objective = plan.objective,
                assignments = plan.assignments.len(),
                unassigned = plan.unassigned_shifts.len(),
                seed = plan.seed,
                elapsed_secs = elapsed,
                "Solver finished"
            );
        }
        Err(e) => metrics::record_solver_run(e.kind(), elapsed),
    }

    result
}

fn status_label(status: solver::PlanStatus) -> &'static str {
    match status {
        solver::PlanStatus::Optimal => "optimal",
        solver::PlanStatus::Feasible => "feasible",
        solver::PlanStatus::Infeasible => "infeasible",
        solver::PlanStatus::TimeoutNoSolution => "timeout_no_solution",
    }
}
