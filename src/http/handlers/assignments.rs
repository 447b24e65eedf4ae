//! Assignment endpoints
//!
//! List responses attach employee and shift summaries via the two-step
//! "collect ids, bulk fetch, attach" pattern so response size never drives
//! query count.

use std::collections::HashMap;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::{Extension, Json};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth::Actor;
use crate::engine::NewAssignment;
use crate::error::{Error, Result};
use crate::http::AppState;
use crate::models::{AssignmentStatus, Employee, ScheduleAssignment, Shift};
use crate::store::{AssignmentFilter, PageRequest};

// ============================================================================
// Payloads
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BulkCreateRequest {
    pub schedule_id: Uuid,
    pub assignments: Vec<NewAssignment>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdateRequest {
    #[serde(default)]
    pub priority: Option<u8>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub status: Option<AssignmentStatus>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfirmRequest {
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DeclineRequest {
    pub reason: String,
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    #[serde(default)]
    pub schedule_id: Option<Uuid>,
    #[serde(default)]
    pub employee_id: Option<Uuid>,
    #[serde(default)]
    pub shift_id: Option<Uuid>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub date_from: Option<NaiveDate>,
    #[serde(default)]
    pub date_to: Option<NaiveDate>,
    #[serde(default)]
    pub cursor: Option<String>,
    #[serde(default)]
    pub limit: Option<i64>,
}

/// Assignment with its related entities attached
#[derive(Debug, Serialize)]
pub struct AssignmentDetail {
    #[serde(flatten)]
    pub assignment: ScheduleAssignment,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub employee: Option<EmployeeSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shift: Option<ShiftSummary>,
}

#[derive(Debug, Serialize)]
pub struct EmployeeSummary {
    pub id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
}

impl From<&Employee> for EmployeeSummary {
    fn from(e: &Employee) -> Self {
        Self {
            id: e.id,
            first_name: e.first_name.clone(),
            last_name: e.last_name.clone(),
            email: e.email.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ShiftSummary {
    pub id: Uuid,
    pub date: NaiveDate,
    pub start_time: chrono::NaiveTime,
    pub end_time: chrono::NaiveTime,
    pub shift_type: String,
}

impl From<&Shift> for ShiftSummary {
    fn from(s: &Shift) -> Self {
        Self {
            id: s.id,
            date: s.date,
            start_time: s.window.start,
            end_time: s.window.end,
            shift_type: s.shift_type.as_str().to_string(),
        }
    }
}

// ============================================================================
// Handlers
// ============================================================================

/// `POST /api/schedules/{schedule_id}/assignments`
pub async fn create(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(schedule_id): Path<Uuid>,
    Json(request): Json<NewAssignment>,
) -> Result<impl IntoResponse> {
    let assignment = state
        .engine
        .create_single(&actor, schedule_id, request)
        .await?;
    Ok((StatusCode::CREATED, Json(assignment)))
}

/// `POST /api/assignments/bulk`: partial success is a 200 with per-row errors
pub async fn create_bulk(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Json(request): Json<BulkCreateRequest>,
) -> Result<impl IntoResponse> {
    if request.assignments.is_empty() {
        return Err(Error::validation("assignments", "must not be empty"));
    }
    let response = state
        .engine
        .create_bulk(&actor, request.schedule_id, request.assignments)
        .await?;
    Ok(Json(response))
}

/// `GET /api/assignments`
pub async fn list(
    State(state): State<AppState>,
    Extension(_actor): Extension<Actor>,
    Query(query): Query<ListQuery>,
) -> Result<impl IntoResponse> {
    let status = match &query.status {
        Some(raw) => Some(AssignmentStatus::parse(raw).ok_or_else(|| {
            Error::validation("status", format!("unknown status {raw}"))
        })?),
        None => None,
    };
    let filter = AssignmentFilter {
        schedule_id: query.schedule_id,
        employee_id: query.employee_id,
        shift_id: query.shift_id,
        status,
        date_from: query.date_from,
        date_to: query.date_to,
    };
    let page = PageRequest {
        limit: query.limit,
        offset: None,
        cursor: query.cursor,
    };

    let result = state.engine.list(&filter, &page).await?;
    let details = attach_related(&state, result.items).await?;
    Ok(Json(serde_json::json!({
        "items": details,
        "next_cursor": result.next_cursor,
    })))
}

/// `GET /api/schedules/{schedule_id}/assignments`
pub async fn list_for_schedule(
    State(state): State<AppState>,
    Extension(_actor): Extension<Actor>,
    Path(schedule_id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    state
        .store
        .schedules
        .get(schedule_id)
        .await?
        .ok_or_else(|| Error::not_found("schedule", schedule_id))?;

    let assignments = state.store.assignments.list_for_schedule(schedule_id).await?;
    let details = attach_related(&state, assignments).await?;
    Ok(Json(serde_json::json!({ "items": details })))
}

/// `GET /api/assignments/{id}`
pub async fn get_one(
    State(state): State<AppState>,
    Extension(_actor): Extension<Actor>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    let assignment = state.engine.get(id).await?;
    let mut details = attach_related(&state, vec![assignment]).await?;
    Ok(Json(details.remove(0)))
}

/// `PUT /api/assignments/{id}`
pub async fn update(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<Uuid>,
    Json(request): Json<UpdateRequest>,
) -> Result<Json<ScheduleAssignment>> {
    let assignment = state
        .engine
        .update(&actor, id, request.priority, request.notes, request.status)
        .await?;
    Ok(Json(assignment))
}

/// `DELETE /api/assignments/{id}`
pub async fn delete(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode> {
    state.engine.delete(&actor, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// `POST /api/assignments/{id}/confirm`
pub async fn confirm(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<Uuid>,
    Json(request): Json<ConfirmRequest>,
) -> Result<Json<ScheduleAssignment>> {
    let assignment = state.engine.confirm(&actor, id, request.notes).await?;
    Ok(Json(assignment))
}

/// `POST /api/assignments/{id}/decline`
pub async fn decline(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<Uuid>,
    Json(request): Json<DeclineRequest>,
) -> Result<Json<ScheduleAssignment>> {
    let assignment = state.engine.decline(&actor, id, request.reason).await?;
    Ok(Json(assignment))
}

/// `GET /api/assignments/{id}/conflicts`
pub async fn conflicts(
    State(state): State<AppState>,
    Extension(_actor): Extension<Actor>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    let conflicts = state.engine.check_conflicts(id).await?;
    Ok(Json(serde_json::json!({ "conflicts": conflicts })))
}

// ============================================================================
// Helpers
// ============================================================================

/// Collect ids, bulk fetch, attach: O(1) queries per response
async fn attach_related(
    state: &AppState,
    assignments: Vec<ScheduleAssignment>,
) -> Result<Vec<AssignmentDetail>> {
    let mut employee_ids: Vec<Uuid> = assignments.iter().map(|a| a.employee_id).collect();
    employee_ids.sort();
    employee_ids.dedup();
    let mut shift_ids: Vec<Uuid> = assignments.iter().map(|a| a.shift_id).collect();
    shift_ids.sort();
    shift_ids.dedup();

    let employees: HashMap<Uuid, Employee> = state
        .store
        .employees
        .get_many(&employee_ids)
        .await?
        .into_iter()
        .map(|e| (e.id, e))
        .collect();
    let shifts: HashMap<Uuid, Shift> = state
        .store
        .shifts
        .get_many(&shift_ids)
        .await?
        .into_iter()
        .map(|s| (s.id, s))
        .collect();

    Ok(assignments
        .into_iter()
        .map(|assignment| {
            let employee = employees.get(&assignment.employee_id).map(EmployeeSummary::from);
            let shift = shifts.get(&assignment.shift_id).map(ShiftSummary::from);
            AssignmentDetail {
                assignment,
                employee,
                shift,
            }
        })
        .collect())
}
