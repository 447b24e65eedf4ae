//! Rule endpoints
//!
//! `POST /api/rules/parse` classifies without persisting; `POST /api/rules`
//! parses and stores. Ambiguous parses return 422 with the candidate
//! interpretations; callers may store a low-confidence candidate by
//! re-submitting with `confirm: true`.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::{Extension, Json};
use serde::Deserialize;
use uuid::Uuid;

use crate::auth::{Action, Actor};
use crate::error::{Error, Result};
use crate::http::AppState;
use crate::models::{Rule, RuleType};
use crate::parser::{parse_rule, EmployeeRef, ParseResult};

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ParseRequest {
    pub text: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateRuleRequest {
    pub text: String,
    #[serde(default)]
    pub priority: Option<u8>,
    /// Accept the best candidate even when confidence is low
    #[serde(default)]
    pub confirm: bool,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdateRuleRequest {
    #[serde(default)]
    pub priority: Option<u8>,
    #[serde(default)]
    pub active: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    #[serde(default)]
    pub rule_type: Option<String>,
    #[serde(default)]
    pub active: Option<bool>,
}

async fn directory(state: &AppState) -> Result<Vec<EmployeeRef>> {
    Ok(state
        .store
        .employees
        .list_active()
        .await?
        .into_iter()
        .map(|e| EmployeeRef {
            id: e.id,
            first_name: e.first_name,
            last_name: e.last_name,
        })
        .collect())
}

/// `POST /api/rules/parse`: classification only, nothing persisted
pub async fn parse(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Json(request): Json<ParseRequest>,
) -> Result<impl IntoResponse> {
    actor.allows(Action::RuleWrite)?;
    let employees = directory(&state).await?;
    let result = parse_rule(&request.text, &state.synonyms, &employees);

    let status = if result.is_ambiguous() {
        StatusCode::UNPROCESSABLE_ENTITY
    } else {
        StatusCode::OK
    };
    Ok((status, Json(result)))
}

/// `POST /api/rules`: parse and persist
pub async fn create(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Json(request): Json<CreateRuleRequest>,
) -> Result<impl IntoResponse> {
    actor.allows(Action::RuleWrite)?;
    let employees = directory(&state).await?;

    let parsed = match parse_rule(&request.text, &state.synonyms, &employees) {
        ParseResult::Parsed(parsed) => parsed,
        ParseResult::Ambiguous { reason, candidates } => {
            // A confirmed caller takes the best candidate anyway
            match candidates.into_iter().next() {
                Some(best) if request.confirm => best,
                _ => {
                    return Err(Error::validation(
                        "text",
                        format!("ambiguous rule: {reason}"),
                    ))
                }
            }
        }
    };

    let mut rule = Rule::new(request.text, parsed.payload);
    if let Some(priority) = request.priority {
        rule.priority = priority.clamp(1, 10);
    }

    state.store.rules.create(&rule).await?;
    tracing::info!(rule_id = %rule.id, rule_type = %rule.rule_type, "Rule created");
    Ok((StatusCode::CREATED, Json(rule)))
}

/// `GET /api/rules`
pub async fn list(
    State(state): State<AppState>,
    Extension(_actor): Extension<Actor>,
    Query(query): Query<ListQuery>,
) -> Result<impl IntoResponse> {
    let rule_type = match &query.rule_type {
        Some(raw) => Some(RuleType::parse(raw).ok_or_else(|| {
            Error::validation("rule_type", format!("unknown rule type {raw}"))
        })?),
        None => None,
    };
    let rules = state
        .store
        .rules
        .list(rule_type, query.active.unwrap_or(false))
        .await?;
    Ok(Json(serde_json::json!({ "items": rules })))
}

/// `PATCH /api/rules/{id}`
pub async fn update(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<Uuid>,
    Json(request): Json<UpdateRuleRequest>,
) -> Result<Json<Rule>> {
    actor.allows(Action::RuleWrite)?;
    let mut rule = state
        .store
        .rules
        .get(id)
        .await?
        .ok_or_else(|| Error::not_found("rule", id))?;

    if let Some(priority) = request.priority {
        rule.priority = priority.clamp(1, 10);
    }
    if let Some(active) = request.active {
        rule.active = active;
    }

    state.store.rules.update(&rule).await?;
    Ok(Json(rule))
}

/// `DELETE /api/rules/{id}`
pub async fn delete(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode> {
    actor.allows(Action::RuleWrite)?;
    let deleted = state.store.rules.delete(id).await?;
    if !deleted {
        return Err(Error::not_found("rule", id));
    }
    Ok(StatusCode::NO_CONTENT)
}
