//! Authentication endpoints

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::{Extension, Json};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth::{Actor, Claims, TokenPair};
use crate::error::{Error, Result};
use crate::http::AppState;
use crate::models::employee::is_valid_email;
use crate::models::{Availability, Employee, Role};

// ============================================================================
// Payloads
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    pub first_name: String,
    pub last_name: String,
    #[serde(default)]
    pub phone: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

/// Public projection of an employee account
#[derive(Debug, Serialize)]
pub struct EmployeeView {
    pub id: Uuid,
    pub email: String,
    pub role: Role,
    pub first_name: String,
    pub last_name: String,
    pub is_active: bool,
    pub department_id: Option<Uuid>,
    pub qualifications: Vec<String>,
    pub max_hours_per_week: f64,
    pub password_must_change: bool,
}

impl From<&Employee> for EmployeeView {
    fn from(e: &Employee) -> Self {
        let mut qualifications: Vec<String> = e.qualifications.iter().cloned().collect();
        qualifications.sort();
        Self {
            id: e.id,
            email: e.email.clone(),
            role: e.role,
            first_name: e.first_name.clone(),
            last_name: e.last_name.clone(),
            is_active: e.is_active,
            department_id: e.department_id,
            qualifications,
            max_hours_per_week: e.max_hours_per_week,
            password_must_change: e.password_must_change,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    #[serde(flatten)]
    pub tokens: TokenPair,
    pub employee: EmployeeView,
}

// ============================================================================
// Handlers
// ============================================================================

/// `POST /api/auth/register`: self-service account creation
pub async fn register(
    State(state): State<AppState>,
    Json(request): Json<RegisterRequest>,
) -> Result<impl IntoResponse> {
    if !is_valid_email(&request.email) {
        return Err(Error::validation("email", "invalid email address"));
    }
    let password_hash = state.hasher.hash_new(&request.password)?;

    let now = Utc::now();
    let employee = Employee {
        id: Uuid::new_v4(),
        email: request.email,
        password_hash,
        role: Role::Employee,
        is_active: true,
        email_verified: false,
        account_locked: false,
        failed_login_attempts: 0,
        password_must_change: false,
        department_id: None,
        first_name: request.first_name,
        last_name: request.last_name,
        phone: request.phone,
        hire_date: None,
        hourly_rate: 0.0,
        max_hours_per_week: 40.0,
        qualifications: Default::default(),
        availability: Availability::default(),
        password_history: Vec::new(),
        created_at: now,
        updated_at: now,
    };

    let field_errors = employee.validate();
    // Registration supplies no availability yet, so the hours cap check is
    // skipped here; profile completion enforces it later.
    let field_errors: Vec<_> = field_errors
        .into_iter()
        .filter(|(f, _)| *f != "max_hours_per_week")
        .collect();
    if !field_errors.is_empty() {
        return Err(Error::validation_all(field_errors));
    }

    state.store.employees.create(&employee).await?;
    tracing::info!(employee_id = %employee.id, "Account registered");

    Ok((StatusCode::CREATED, Json(EmployeeView::from(&employee))))
}

/// `POST /api/auth/login`
pub async fn login(
    State(state): State<AppState>,
    Json(request): Json<LoginRequest>,
) -> Result<Json<LoginResponse>> {
    let employee = state
        .store
        .employees
        .get_by_email(&request.email)
        .await?
        .ok_or_else(|| Error::unauthenticated("invalid credentials"))?;

    if employee.account_locked {
        return Err(Error::Locked(
            "account locked after repeated failed logins".to_string(),
        ));
    }
    if !employee.is_active {
        return Err(Error::unauthenticated("account is inactive"));
    }

    if !state.hasher.verify(&request.password, &employee.password_hash)? {
        let locked = state
            .store
            .employees
            .record_login_failure(employee.id, state.config.auth.lockout_threshold)
            .await?;
        if locked {
            tracing::warn!(employee_id = %employee.id, "Account locked");
            return Err(Error::Locked(
                "account locked after repeated failed logins".to_string(),
            ));
        }
        return Err(Error::unauthenticated("invalid credentials"));
    }

    state.store.employees.clear_login_failures(employee.id).await?;
    let tokens = state
        .tokens
        .issue_pair(employee.id, &employee.email, employee.role)?;

    Ok(Json(LoginResponse {
        tokens,
        employee: EmployeeView::from(&employee),
    }))
}

/// `POST /api/auth/refresh`: rotate the refresh token
pub async fn refresh(
    State(state): State<AppState>,
    Json(request): Json<RefreshRequest>,
) -> Result<Json<TokenPair>> {
    let (_, pair) = state.tokens.rotate(&request.refresh_token)?;
    Ok(Json(pair))
}

/// `POST /api/auth/logout`: revoke the presented access token
pub async fn logout(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<StatusCode> {
    state.tokens.revoke(&claims);
    Ok(StatusCode::NO_CONTENT)
}

/// `GET /api/auth/me`
pub async fn me(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
) -> Result<Json<EmployeeView>> {
    let employee = state
        .store
        .employees
        .get(actor.id)
        .await?
        .ok_or_else(|| Error::not_found("employee", actor.id))?;
    Ok(Json(EmployeeView::from(&employee)))
}
