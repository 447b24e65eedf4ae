//! Health, metrics, CSRF, and cache statistics

use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::Json;
use serde::Serialize;

use crate::error::Result;
use crate::http::middleware::issue_csrf_token;
use crate::http::AppState;
use crate::metrics;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub uptime_secs: u64,
    pub database: &'static str,
    pub cache: &'static str,
}

/// `GET /api/health`
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let database = match &state.db {
        Some(db) => {
            if db.client().await.is_ok() {
                "up"
            } else {
                "down"
            }
        }
        None => "not configured",
    };
    let cache = match &state.cache {
        Some(c) if c.is_distributed() => "redis",
        Some(_) => "in-process",
        None => "disabled",
    };

    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        uptime_secs: state.start_time.elapsed().as_secs(),
        database,
        cache,
    })
}

/// `GET /api/metrics` in Prometheus text format
pub async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    // Refresh scrape-time gauges
    if let Some(db) = &state.db {
        let status = db.status();
        metrics::set_pool_status(status.size, status.size - status.available, status.waiting);
    }
    if let Some(cache) = &state.cache {
        for family in cache.stats() {
            metrics::set_cache_family(&family.family, family.size, family.hit_rate);
        }
    }

    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        metrics::gather(),
    )
}

#[derive(Debug, Serialize)]
pub struct CsrfResponse {
    pub csrf_token: String,
}

/// `GET /api/csrf-token`: same-site cookie plus body echo
pub async fn csrf_token() -> impl IntoResponse {
    let (token, cookie) = issue_csrf_token();
    (
        [(header::SET_COOKIE, cookie)],
        Json(CsrfResponse { csrf_token: token }),
    )
}

/// `GET /api/cache/stats`
pub async fn cache_stats(State(state): State<AppState>) -> Result<impl IntoResponse> {
    let stats = state
        .cache
        .as_ref()
        .map(|c| c.stats())
        .unwrap_or_default();
    Ok(Json(stats))
}
