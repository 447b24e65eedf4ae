//! Employee endpoints

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::{Extension, Json};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth::password::generate_reset_password;
use crate::auth::{Action, Actor};
use crate::cache::CacheFamily;
use crate::error::{Error, Result};
use crate::http::AppState;
use crate::models::employee::is_valid_email;
use crate::models::{Availability, Employee, HistoryKind, Role};
use crate::store::{EmployeeFilter, PageRequest};

use super::auth::EmployeeView;

// ============================================================================
// Payloads
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    #[serde(default)]
    pub search: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub department_id: Option<Uuid>,
    #[serde(default)]
    pub is_active: Option<bool>,
    #[serde(default)]
    pub limit: Option<i64>,
    #[serde(default)]
    pub offset: Option<i64>,
    #[serde(default)]
    pub cursor: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateEmployeeRequest {
    pub email: String,
    pub password: String,
    pub first_name: String,
    pub last_name: String,
    pub role: Role,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub hire_date: Option<chrono::NaiveDate>,
    #[serde(default)]
    pub hourly_rate: Option<f64>,
    #[serde(default)]
    pub max_hours_per_week: Option<f64>,
    #[serde(default)]
    pub department_id: Option<Uuid>,
    #[serde(default)]
    pub qualifications: Vec<String>,
    #[serde(default)]
    pub availability: Option<Availability>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdateEmployeeRequest {
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub hire_date: Option<chrono::NaiveDate>,
    #[serde(default)]
    pub hourly_rate: Option<f64>,
    #[serde(default)]
    pub max_hours_per_week: Option<f64>,
    #[serde(default)]
    pub qualifications: Option<Vec<String>>,
    #[serde(default)]
    pub availability: Option<Availability>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ChangePasswordRequest {
    pub current_password: String,
    pub new_password: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ChangeStatusRequest {
    pub is_active: bool,
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ChangeRoleRequest {
    pub role: Role,
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ChangeDepartmentRequest {
    pub department_id: Option<Uuid>,
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ResetPasswordResponse {
    /// One-time password the admin hands to the user
    pub temporary_password: String,
    pub password_must_change: bool,
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    #[serde(default)]
    pub limit: Option<i64>,
    #[serde(default)]
    pub cursor: Option<String>,
}

// ============================================================================
// Handlers
// ============================================================================

/// `GET /api/employees`
pub async fn list(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Query(query): Query<ListQuery>,
) -> Result<impl IntoResponse> {
    actor.allows(Action::EmployeeRead)?;

    let role = match &query.role {
        Some(raw) => Some(
            Role::parse(raw).ok_or_else(|| Error::validation("role", format!("unknown role {raw}")))?,
        ),
        None => None,
    };
    let filter = EmployeeFilter {
        search: query.search,
        role,
        department_id: query.department_id,
        is_active: query.is_active,
    };
    let page = PageRequest {
        limit: query.limit,
        offset: query.offset,
        cursor: query.cursor,
    };

    let result = state.store.employees.list(&filter, &page).await?;
    let items: Vec<EmployeeView> = result.items.iter().map(EmployeeView::from).collect();
    Ok(Json(serde_json::json!({
        "items": items,
        "total": result.total,
        "next_cursor": result.next_cursor,
    })))
}

/// `GET /api/employees/{id}`
pub async fn get_one(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<Uuid>,
) -> Result<Json<EmployeeView>> {
    actor.allows(Action::EmployeeRead)?;
    let employee = load(&state, id).await?;
    Ok(Json(EmployeeView::from(&employee)))
}

/// `POST /api/employees`
pub async fn create(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Json(request): Json<CreateEmployeeRequest>,
) -> Result<impl IntoResponse> {
    actor.allows(Action::EmployeeCreate)?;
    // Managers may not mint admins
    if request.role == Role::Admin && actor.role != Role::Admin {
        return Err(Error::forbidden("only admins may create admin accounts"));
    }
    if !is_valid_email(&request.email) {
        return Err(Error::validation("email", "invalid email address"));
    }

    let password_hash = state.hasher.hash_new(&request.password)?;
    let now = Utc::now();
    let employee = Employee {
        id: Uuid::new_v4(),
        email: request.email,
        password_hash,
        role: request.role,
        is_active: true,
        email_verified: false,
        account_locked: false,
        failed_login_attempts: 0,
        password_must_change: false,
        department_id: request.department_id,
        first_name: request.first_name,
        last_name: request.last_name,
        phone: request.phone,
        hire_date: request.hire_date,
        hourly_rate: request.hourly_rate.unwrap_or(0.0),
        max_hours_per_week: request.max_hours_per_week.unwrap_or(40.0),
        qualifications: request.qualifications.into_iter().collect(),
        availability: request.availability.unwrap_or_default(),
        password_history: Vec::new(),
        created_at: now,
        updated_at: now,
    };

    let field_errors: Vec<_> = employee
        .validate()
        .into_iter()
        .filter(|(f, _)| *f != "max_hours_per_week" || employee.availability.weekly_hours() > 0.0)
        .collect();
    if !field_errors.is_empty() {
        return Err(Error::validation_all(field_errors));
    }

    state.store.employees.create(&employee).await?;
    Ok((StatusCode::CREATED, Json(EmployeeView::from(&employee))))
}

/// `PATCH /api/employees/{id}`: profile subset, self-edit allowed
pub async fn update(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<Uuid>,
    Json(request): Json<UpdateEmployeeRequest>,
) -> Result<Json<EmployeeView>> {
    let mut employee = load(&state, id).await?;
    actor.allows(Action::EmployeeUpdate {
        target: id,
        target_role: employee.role,
    })?;

    // Plain employees edit a narrower subset of their own profile
    let self_edit = actor.id == id
        && matches!(
            actor.role,
            Role::Employee | Role::Scheduler | Role::Supervisor
        );
    if self_edit && (request.hourly_rate.is_some() || request.qualifications.is_some()) {
        return Err(Error::forbidden(
            "rate and qualifications are managed by your manager",
        ));
    }

    if let Some(email) = request.email {
        if !is_valid_email(&email) {
            return Err(Error::validation("email", "invalid email address"));
        }
        employee.email = email;
    }
    if let Some(v) = request.first_name {
        employee.first_name = v;
    }
    if let Some(v) = request.last_name {
        employee.last_name = v;
    }
    if request.phone.is_some() {
        employee.phone = request.phone;
    }
    if request.hire_date.is_some() {
        employee.hire_date = request.hire_date;
    }
    if let Some(v) = request.hourly_rate {
        employee.hourly_rate = v;
    }
    if let Some(v) = request.max_hours_per_week {
        employee.max_hours_per_week = v;
    }
    if let Some(v) = request.qualifications {
        employee.qualifications = v.into_iter().collect();
    }
    if let Some(v) = request.availability {
        employee.availability = v;
    }

    let field_errors = employee.validate();
    if !field_errors.is_empty() {
        return Err(Error::validation_all(field_errors));
    }

    state.store.employees.update(&employee).await?;
    invalidate_employee(&state, &employee).await;
    Ok(Json(EmployeeView::from(&employee)))
}

/// `DELETE /api/employees/{id}`: admin-only, blocked by future assignments
pub async fn delete(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode> {
    actor.allows(Action::EmployeeDelete)?;
    let employee = load(&state, id).await?;

    let today = Utc::now().date_naive();
    if state
        .store
        .assignments
        .has_future_assignments(id, today)
        .await?
    {
        return Err(Error::conflict(
            crate::error::ConflictKind::ScheduleNotEditable,
            "employee has future assignments; reassign or cancel them first",
        ));
    }

    state.store.employees.delete(id).await?;
    invalidate_employee(&state, &employee).await;
    tracing::info!(employee_id = %id, deleted_by = %actor.id, "Employee deleted");
    Ok(StatusCode::NO_CONTENT)
}

/// `POST /api/employees/{id}/reset-password`: admin/manager issues a one-time password
pub async fn reset_password(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<Uuid>,
) -> Result<Json<ResetPasswordResponse>> {
    let employee = load(&state, id).await?;
    actor.allows(Action::PasswordReset {
        target_role: employee.role,
    })?;

    let temporary = generate_reset_password();
    let hash = state.hasher.hash_new(&temporary)?;

    let mut history = employee.password_history.clone();
    history.insert(0, employee.password_hash.clone());
    history.truncate(crate::models::employee::PASSWORD_HISTORY_DEPTH);

    state
        .store
        .employees
        .set_password(id, &hash, &history, true)
        .await?;
    invalidate_employee(&state, &employee).await;

    Ok(Json(ResetPasswordResponse {
        temporary_password: temporary,
        password_must_change: true,
    }))
}

/// `PATCH /api/employees/{id}/change-password`: self-service
pub async fn change_password(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<Uuid>,
    Json(request): Json<ChangePasswordRequest>,
) -> Result<StatusCode> {
    if actor.id != id {
        return Err(Error::forbidden("use reset-password for other accounts"));
    }
    let employee = load(&state, id).await?;

    if !state
        .hasher
        .verify(&request.current_password, &employee.password_hash)?
    {
        return Err(Error::unauthenticated("current password is incorrect"));
    }
    state.hasher.check_reuse(
        &request.new_password,
        &employee.password_hash,
        &employee.password_history,
    )?;

    let hash = state.hasher.hash_new(&request.new_password)?;
    let mut history = employee.password_history.clone();
    history.insert(0, employee.password_hash.clone());
    history.truncate(crate::models::employee::PASSWORD_HISTORY_DEPTH);

    state
        .store
        .employees
        .set_password(id, &hash, &history, false)
        .await?;
    invalidate_employee(&state, &employee).await;
    Ok(StatusCode::NO_CONTENT)
}

/// `PATCH /api/employees/{id}/status`
pub async fn change_status(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<Uuid>,
    Json(request): Json<ChangeStatusRequest>,
) -> Result<Json<EmployeeView>> {
    actor.allows(Action::StatusChange { target: id })?;
    let employee = load(&state, id).await?;

    state
        .store
        .employees
        .change_status(id, request.is_active, actor.id, request.reason)
        .await?;
    invalidate_employee(&state, &employee).await;

    let updated = load(&state, id).await?;
    Ok(Json(EmployeeView::from(&updated)))
}

/// `PATCH /api/employees/{id}/role`
pub async fn change_role(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<Uuid>,
    Json(request): Json<ChangeRoleRequest>,
) -> Result<Json<EmployeeView>> {
    actor.allows(Action::RoleChange { target: id })?;
    let employee = load(&state, id).await?;

    state
        .store
        .employees
        .change_role(id, request.role, actor.id, request.reason)
        .await?;
    invalidate_employee(&state, &employee).await;

    let updated = load(&state, id).await?;
    Ok(Json(EmployeeView::from(&updated)))
}

/// `PATCH /api/employees/{id}/department`
pub async fn change_department(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<Uuid>,
    Json(request): Json<ChangeDepartmentRequest>,
) -> Result<Json<EmployeeView>> {
    let employee = load(&state, id).await?;
    actor.allows(Action::EmployeeUpdate {
        target: id,
        target_role: employee.role,
    })?;
    if matches!(actor.role, Role::Employee | Role::Scheduler | Role::Supervisor) {
        return Err(Error::forbidden("department moves require a manager"));
    }

    if let Some(dept) = request.department_id {
        state
            .store
            .departments
            .get(dept)
            .await?
            .ok_or_else(|| Error::not_found("department", dept))?;
    }

    state
        .store
        .employees
        .change_department(id, request.department_id, actor.id, request.reason)
        .await?;
    invalidate_employee(&state, &employee).await;

    let updated = load(&state, id).await?;
    Ok(Json(EmployeeView::from(&updated)))
}

/// `GET /api/employees/{id}/status-history`
pub async fn status_history(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<Uuid>,
    Query(query): Query<HistoryQuery>,
) -> Result<impl IntoResponse> {
    history(&state, &actor, id, HistoryKind::Status, query).await
}

/// `GET /api/employees/{id}/role-history`
pub async fn role_history(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<Uuid>,
    Query(query): Query<HistoryQuery>,
) -> Result<impl IntoResponse> {
    history(&state, &actor, id, HistoryKind::Role, query).await
}

/// `GET /api/employees/{id}/department-history`
pub async fn department_history(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<Uuid>,
    Query(query): Query<HistoryQuery>,
) -> Result<impl IntoResponse> {
    history(&state, &actor, id, HistoryKind::Department, query).await
}

// ============================================================================
// Helpers
// ============================================================================

async fn load(state: &AppState, id: Uuid) -> Result<Employee> {
    state
        .store
        .employees
        .get(id)
        .await?
        .ok_or_else(|| Error::not_found("employee", id))
}

async fn invalidate_employee(state: &AppState, employee: &Employee) {
    if let Some(cache) = &state.cache {
        cache
            .invalidate(CacheFamily::EmployeeByEmail, &employee.email.to_lowercase())
            .await;
    }
}

async fn history(
    state: &AppState,
    actor: &Actor,
    id: Uuid,
    kind: HistoryKind,
    query: HistoryQuery,
) -> Result<impl IntoResponse> {
    actor.allows(Action::EmployeeRead)?;
    let page = PageRequest {
        limit: query.limit,
        offset: None,
        cursor: query.cursor,
    };
    let result = state.store.history.list_for_user(id, kind, &page).await?;
    Ok(Json(serde_json::json!({
        "items": result.items,
        "next_cursor": result.next_cursor,
    })))
}
