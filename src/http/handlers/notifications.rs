//! Notification endpoints

use axum::extract::{Path, Query, State};
use axum::response::IntoResponse;
use axum::{Extension, Json};
use serde::Deserialize;
use uuid::Uuid;

use crate::auth::Actor;
use crate::error::{Error, Result};
use crate::http::AppState;
use crate::store::PageRequest;

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    #[serde(default)]
    pub unread_only: bool,
    #[serde(default)]
    pub limit: Option<i64>,
    #[serde(default)]
    pub offset: Option<i64>,
}

/// `GET /api/notifications`: the caller's own notifications
pub async fn list(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Query(query): Query<ListQuery>,
) -> Result<impl IntoResponse> {
    let page = PageRequest {
        limit: query.limit,
        offset: query.offset,
        cursor: None,
    };
    let result = state
        .store
        .notifications
        .list_for_recipient(actor.id, query.unread_only, &page)
        .await?;
    Ok(Json(serde_json::json!({ "items": result.items })))
}

/// `POST /api/notifications/{id}/read`
pub async fn mark_read(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    let marked = state.store.notifications.mark_read(id, actor.id).await?;
    if !marked {
        return Err(Error::not_found("notification", id));
    }
    Ok(Json(serde_json::json!({ "is_read": true })))
}
