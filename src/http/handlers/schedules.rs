//! Schedule endpoints

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::{Extension, Json};
use chrono::{NaiveDate, Utc};
use serde::Deserialize;
use uuid::Uuid;

use crate::auth::{Action, Actor};
use crate::broadcast::{topics, EventKind};
use crate::cache::CacheFamily;
use crate::error::{Error, Result};
use crate::http::AppState;
use crate::models::{Schedule, ScheduleStatus};
use crate::store::PageRequest;

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    #[serde(default)]
    pub week_start: Option<NaiveDate>,
    #[serde(default)]
    pub limit: Option<i64>,
    #[serde(default)]
    pub offset: Option<i64>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateScheduleRequest {
    pub week_start: NaiveDate,
    pub week_end: NaiveDate,
    pub title: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdateScheduleRequest {
    #[serde(default)]
    pub week_start: Option<NaiveDate>,
    #[serde(default)]
    pub week_end: Option<NaiveDate>,
    #[serde(default)]
    pub title: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TransitionRequest {
    /// Optimistic concurrency check against the current version
    #[serde(default)]
    pub expected_version: Option<i32>,
}

/// `GET /api/schedules`
pub async fn list(
    State(state): State<AppState>,
    Extension(_actor): Extension<Actor>,
    Query(query): Query<ListQuery>,
) -> Result<impl IntoResponse> {
    let page = PageRequest {
        limit: query.limit,
        offset: query.offset,
        cursor: None,
    };
    let result = state.store.schedules.list(query.week_start, &page).await?;
    Ok(Json(serde_json::json!({ "items": result.items })))
}

/// `GET /api/schedules/{id}`
pub async fn get_one(
    State(state): State<AppState>,
    Extension(_actor): Extension<Actor>,
    Path(id): Path<Uuid>,
) -> Result<Json<Schedule>> {
    let schedule = state
        .store
        .schedules
        .get(id)
        .await?
        .ok_or_else(|| Error::not_found("schedule", id))?;
    Ok(Json(schedule))
}

/// `POST /api/schedules`
pub async fn create(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Json(request): Json<CreateScheduleRequest>,
) -> Result<impl IntoResponse> {
    actor.allows(Action::ScheduleWrite)?;

    let now = Utc::now();
    let schedule = Schedule {
        id: Uuid::new_v4(),
        week_start: request.week_start,
        week_end: request.week_end,
        title: request.title,
        status: ScheduleStatus::Draft,
        created_by: actor.id,
        approved_by: None,
        version: 1,
        parent_id: None,
        created_at: now,
        updated_at: now,
    };

    let field_errors = schedule.validate();
    if !field_errors.is_empty() {
        return Err(Error::validation_all(field_errors));
    }

    state.store.schedules.create(&schedule).await?;
    Ok((StatusCode::CREATED, Json(schedule)))
}

/// `PATCH /api/schedules/{id}`
pub async fn update(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<Uuid>,
    Json(request): Json<UpdateScheduleRequest>,
) -> Result<Json<Schedule>> {
    actor.allows(Action::ScheduleWrite)?;
    let mut schedule = state
        .store
        .schedules
        .get(id)
        .await?
        .ok_or_else(|| Error::not_found("schedule", id))?;

    if let Some(v) = request.week_start {
        schedule.week_start = v;
    }
    if let Some(v) = request.week_end {
        schedule.week_end = v;
    }
    if let Some(v) = request.title {
        schedule.title = v;
    }

    let field_errors = schedule.validate();
    if !field_errors.is_empty() {
        return Err(Error::validation_all(field_errors));
    }

    state.store.schedules.update(&schedule).await?;
    invalidate_schedule(&state, id).await;
    Ok(Json(state.store.schedules.get(id).await?.unwrap_or(schedule)))
}

/// `POST /api/schedules/{id}/approve`
pub async fn approve(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<Uuid>,
    Json(request): Json<TransitionRequest>,
) -> Result<Json<Schedule>> {
    actor.allows(Action::SchedulePublish)?;
    let schedule = state
        .store
        .schedules
        .transition(
            id,
            ScheduleStatus::Approved,
            Some(actor.id),
            request.expected_version,
        )
        .await?;
    invalidate_schedule(&state, id).await;
    Ok(Json(schedule))
}

/// `POST /api/schedules/{id}/publish`
pub async fn publish(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<Uuid>,
    Json(request): Json<TransitionRequest>,
) -> Result<Json<Schedule>> {
    actor.allows(Action::SchedulePublish)?;
    let schedule = state
        .store
        .schedules
        .transition(id, ScheduleStatus::Published, None, request.expected_version)
        .await?;

    // Invalidate before fanout so subscribers never read stale data
    invalidate_schedule(&state, id).await;
    state.broadcaster.publish(
        &topics::schedule(id),
        EventKind::SchedulePublished,
        serde_json::json!({
            "schedule_id": id,
            "week_start": schedule.week_start,
            "week_end": schedule.week_end,
            "version": schedule.version,
            "committed_at": schedule.updated_at,
        }),
    );
    Ok(Json(schedule))
}

/// `DELETE /api/schedules/{id}`: assignments go with the schedule
pub async fn delete(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode> {
    actor.allows(Action::ScheduleWrite)?;
    let schedule = state
        .store
        .schedules
        .get(id)
        .await?
        .ok_or_else(|| Error::not_found("schedule", id))?;

    if matches!(schedule.status, ScheduleStatus::Published) {
        return Err(Error::conflict(
            crate::error::ConflictKind::ScheduleNotEditable,
            "archive a published schedule instead of deleting it",
        ));
    }

    state.store.schedules.delete(id).await?;
    invalidate_schedule(&state, id).await;
    Ok(StatusCode::NO_CONTENT)
}

async fn invalidate_schedule(state: &AppState, id: Uuid) {
    if let Some(cache) = &state.cache {
        cache
            .invalidate(CacheFamily::ScheduleAssignments, &id.to_string())
            .await;
    }
}
