//! Department endpoints

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::{Extension, Json};
use chrono::Utc;
use serde::Deserialize;
use uuid::Uuid;

use crate::auth::{Action, Actor};
use crate::cache::CacheFamily;
use crate::error::{Error, Result};
use crate::http::AppState;
use crate::models::department::would_cycle;
use crate::models::{Department, DepartmentNode};

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateDepartmentRequest {
    pub name: String,
    #[serde(default)]
    pub parent_id: Option<Uuid>,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdateDepartmentRequest {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub parent_id: Option<Option<Uuid>>,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct DeleteQuery {
    #[serde(default)]
    pub force: bool,
}

/// `GET /api/departments`
pub async fn list(
    State(state): State<AppState>,
    Extension(_actor): Extension<Actor>,
) -> Result<Json<Vec<Department>>> {
    Ok(Json(state.store.departments.list().await?))
}

/// `GET /api/departments/{id}`
pub async fn get_one(
    State(state): State<AppState>,
    Extension(_actor): Extension<Actor>,
    Path(id): Path<Uuid>,
) -> Result<Json<Department>> {
    let department = state
        .store
        .departments
        .get(id)
        .await?
        .ok_or_else(|| Error::not_found("department", id))?;
    Ok(Json(department))
}

/// `GET /api/departments/{id}/hierarchy`: subtree with children resolved
pub async fn hierarchy(
    State(state): State<AppState>,
    Extension(_actor): Extension<Actor>,
    Path(id): Path<Uuid>,
) -> Result<Json<DepartmentNode>> {
    if let Some(cache) = &state.cache {
        if let Some(node) = cache
            .get::<DepartmentNode>(CacheFamily::DepartmentHierarchy, &id.to_string())
            .await
        {
            return Ok(Json(node));
        }
    }

    let all = state.store.departments.list().await?;
    let node = DepartmentNode::build(id, &all)
        .ok_or_else(|| Error::not_found("department", id))?;

    if let Some(cache) = &state.cache {
        cache
            .put(CacheFamily::DepartmentHierarchy, &id.to_string(), &node)
            .await;
    }
    Ok(Json(node))
}

/// `POST /api/departments`
pub async fn create(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Json(request): Json<CreateDepartmentRequest>,
) -> Result<impl IntoResponse> {
    actor.allows(Action::DepartmentWrite)?;
    if request.name.trim().is_empty() {
        return Err(Error::validation("name", "must not be empty"));
    }
    if let Some(parent) = request.parent_id {
        state
            .store
            .departments
            .get(parent)
            .await?
            .ok_or_else(|| Error::not_found("department", parent))?;
    }

    let now = Utc::now();
    let department = Department {
        id: Uuid::new_v4(),
        name: request.name,
        parent_id: request.parent_id,
        description: request.description,
        created_at: now,
        updated_at: now,
    };
    state.store.departments.create(&department).await?;
    invalidate_hierarchy(&state).await;

    Ok((StatusCode::CREATED, Json(department)))
}

/// `PATCH /api/departments/{id}`
pub async fn update(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<Uuid>,
    Json(request): Json<UpdateDepartmentRequest>,
) -> Result<Json<Department>> {
    actor.allows(Action::DepartmentWrite)?;
    let mut department = state
        .store
        .departments
        .get(id)
        .await?
        .ok_or_else(|| Error::not_found("department", id))?;

    if let Some(name) = request.name {
        if name.trim().is_empty() {
            return Err(Error::validation("name", "must not be empty"));
        }
        department.name = name;
    }
    if let Some(parent_id) = request.parent_id {
        let all = state.store.departments.list().await?;
        if would_cycle(id, parent_id, &all) {
            return Err(Error::validation(
                "parent_id",
                "re-parenting would create a cycle",
            ));
        }
        department.parent_id = parent_id;
    }
    if request.description.is_some() {
        department.description = request.description;
    }
    department.updated_at = Utc::now();

    state.store.departments.update(&department).await?;
    invalidate_hierarchy(&state).await;
    Ok(Json(department))
}

/// `DELETE /api/departments/{id}?force=`
pub async fn delete(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<Uuid>,
    Query(query): Query<DeleteQuery>,
) -> Result<StatusCode> {
    actor.allows(Action::DepartmentWrite)?;

    if !query.force {
        let members = state.store.departments.member_count(id).await?;
        let children = state.store.departments.child_count(id).await?;
        if members > 0 || children > 0 {
            return Err(Error::conflict(
                crate::error::ConflictKind::ScheduleNotEditable,
                format!(
                    "department has {members} active members and {children} children; \
                     pass force=true to detach them"
                ),
            ));
        }
    }

    let deleted = state.store.departments.delete(id, query.force).await?;
    if !deleted {
        return Err(Error::not_found("department", id));
    }
    invalidate_hierarchy(&state).await;
    Ok(StatusCode::NO_CONTENT)
}

async fn invalidate_hierarchy(state: &AppState) {
    if let Some(cache) = &state.cache {
        cache
            .invalidate_family(CacheFamily::DepartmentHierarchy)
            .await;
    }
}
