//! Shift endpoints

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::{Extension, Json};
use chrono::{NaiveDate, Utc};
use serde::Deserialize;
use uuid::Uuid;

use crate::auth::{Action, Actor};
use crate::cache::CacheFamily;
use crate::error::{Error, Result};
use crate::http::AppState;
use crate::models::{Shift, ShiftType, TimeWindow};
use crate::store::{PageRequest, ShiftFilter};

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    #[serde(default)]
    pub date_from: Option<NaiveDate>,
    #[serde(default)]
    pub date_to: Option<NaiveDate>,
    #[serde(default)]
    pub department_id: Option<Uuid>,
    #[serde(default)]
    pub shift_type: Option<String>,
    #[serde(default)]
    pub limit: Option<i64>,
    #[serde(default)]
    pub offset: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ShiftRequest {
    pub date: NaiveDate,
    pub start_time: String,
    pub end_time: String,
    pub shift_type: ShiftType,
    #[serde(default)]
    pub department_id: Option<Uuid>,
    #[serde(default = "default_required_staff")]
    pub required_staff: u32,
    #[serde(default = "default_priority")]
    pub priority: u8,
    #[serde(default)]
    pub requirements: Vec<String>,
    #[serde(default)]
    pub overnight: bool,
    #[serde(default)]
    pub notes: Option<String>,
}

fn default_required_staff() -> u32 {
    1
}

fn default_priority() -> u8 {
    5
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BulkShiftRequest {
    pub shifts: Vec<ShiftRequest>,
}

#[derive(Debug, Deserialize)]
pub struct DeleteQuery {
    #[serde(default)]
    pub force: bool,
}

fn build_shift(request: ShiftRequest) -> Result<Shift> {
    let start = crate::models::time::parse_hhmm(&request.start_time)
        .ok_or_else(|| Error::validation("start_time", "expected HH:MM"))?;
    let end = crate::models::time::parse_hhmm(&request.end_time)
        .ok_or_else(|| Error::validation("end_time", "expected HH:MM"))?;
    if !request.overnight && start >= end {
        return Err(Error::validation(
            "end_time",
            "must be after start_time unless overnight",
        ));
    }

    let now = Utc::now();
    let shift = Shift {
        id: Uuid::new_v4(),
        date: request.date,
        window: TimeWindow { start, end },
        shift_type: request.shift_type,
        department_id: request.department_id,
        required_staff: request.required_staff,
        priority: request.priority,
        requirements: request.requirements.into_iter().collect(),
        overnight: request.overnight,
        notes: request.notes,
        created_at: now,
        updated_at: now,
    };

    let field_errors = shift.validate();
    if !field_errors.is_empty() {
        return Err(Error::validation_all(field_errors));
    }
    Ok(shift)
}

/// `GET /api/shifts`
pub async fn list(
    State(state): State<AppState>,
    Extension(_actor): Extension<Actor>,
    Query(query): Query<ListQuery>,
) -> Result<impl IntoResponse> {
    let shift_type = match &query.shift_type {
        Some(raw) => Some(ShiftType::parse(raw).ok_or_else(|| {
            Error::validation("shift_type", format!("unknown shift type {raw}"))
        })?),
        None => None,
    };
    let filter = ShiftFilter {
        date_from: query.date_from,
        date_to: query.date_to,
        department_id: query.department_id,
        shift_type,
    };
    let page = PageRequest {
        limit: query.limit,
        offset: query.offset,
        cursor: None,
    };

    let result = state.store.shifts.list(&filter, &page).await?;
    Ok(Json(serde_json::json!({
        "items": result.items,
        "total": result.total,
    })))
}

/// `GET /api/shifts/{id}`
pub async fn get_one(
    State(state): State<AppState>,
    Extension(_actor): Extension<Actor>,
    Path(id): Path<Uuid>,
) -> Result<Json<Shift>> {
    let shift = state
        .store
        .shifts
        .get(id)
        .await?
        .ok_or_else(|| Error::not_found("shift", id))?;
    Ok(Json(shift))
}

/// `POST /api/shifts`
pub async fn create(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Json(request): Json<ShiftRequest>,
) -> Result<impl IntoResponse> {
    actor.allows(Action::ShiftWrite)?;
    let shift = build_shift(request)?;
    state.store.shifts.create(&shift).await?;
    invalidate_shifts(&state).await;
    Ok((StatusCode::CREATED, Json(shift)))
}

/// `POST /api/shifts/bulk`: all-or-nothing batch
pub async fn create_bulk(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Json(request): Json<BulkShiftRequest>,
) -> Result<impl IntoResponse> {
    actor.allows(Action::ShiftWrite)?;
    if request.shifts.is_empty() {
        return Err(Error::validation("shifts", "must not be empty"));
    }

    let shifts: Vec<Shift> = request
        .shifts
        .into_iter()
        .map(build_shift)
        .collect::<Result<Vec<_>>>()?;

    state.store.shifts.create_bulk(&shifts).await?;
    invalidate_shifts(&state).await;
    Ok((
        StatusCode::CREATED,
        Json(serde_json::json!({ "created": shifts.len(), "shifts": shifts })),
    ))
}

/// `PATCH /api/shifts/{id}`: blocked once assignments reference the shift
pub async fn update(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<Uuid>,
    Json(request): Json<ShiftRequest>,
) -> Result<Json<Shift>> {
    actor.allows(Action::ShiftWrite)?;
    state
        .store
        .shifts
        .get(id)
        .await?
        .ok_or_else(|| Error::not_found("shift", id))?;

    if state.store.shifts.assignment_count(id).await? > 0 {
        return Err(Error::conflict(
            crate::error::ConflictKind::ScheduleNotEditable,
            "shift already has assignments and cannot change",
        ));
    }

    let mut shift = build_shift(request)?;
    shift.id = id;
    state.store.shifts.update(&shift).await?;
    invalidate_shifts(&state).await;
    Ok(Json(shift))
}

/// `DELETE /api/shifts/{id}?force=`
pub async fn delete(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<Uuid>,
    Query(query): Query<DeleteQuery>,
) -> Result<StatusCode> {
    actor.allows(Action::ShiftWrite)?;

    let references = state.store.shifts.assignment_count(id).await?;
    if references > 0 && !query.force {
        return Err(Error::conflict(
            crate::error::ConflictKind::ScheduleNotEditable,
            format!("{references} assignments reference this shift; pass force=true"),
        ));
    }

    let deleted = state.store.shifts.delete(id, query.force).await?;
    if !deleted {
        return Err(Error::not_found("shift", id));
    }
    invalidate_shifts(&state).await;
    Ok(StatusCode::NO_CONTENT)
}

async fn invalidate_shifts(state: &AppState) {
    if let Some(cache) = &state.cache {
        cache.invalidate_family(CacheFamily::ShiftByName).await;
    }
}
