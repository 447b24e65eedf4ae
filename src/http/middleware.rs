//! Request pipeline middleware
//!
//! Applied in order: security headers, CORS, body limit, rate limiting,
//! authentication, CSRF for mutating methods, then the handler, with
//! slow-request logging and a per-request deadline wrapped around the
//! whole chain.

use std::time::{Duration, Instant};

use axum::extract::{ConnectInfo, Request, State};
use axum::http::{header, HeaderValue, Method, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use dashmap::DashSet;
use lazy_static::lazy_static;
use std::net::SocketAddr;
use uuid::Uuid;

use crate::auth::{Actor, EndpointClass, TokenKind};
use crate::error::Error;
use crate::metrics;

use super::AppState;

// ============================================================================
// Security headers
// ============================================================================

/// Fixed security headers on every response; HSTS only in production
pub async fn security_headers(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let mut response = next.run(request).await;
    let headers = response.headers_mut();

    headers.insert(
        "X-Content-Type-Options",
        HeaderValue::from_static("nosniff"),
    );
    headers.insert("X-Frame-Options", HeaderValue::from_static("DENY"));
    headers.insert(
        "X-XSS-Protection",
        HeaderValue::from_static("1; mode=block"),
    );
    headers.insert(
        "Content-Security-Policy",
        HeaderValue::from_static("default-src 'self'"),
    );
    headers.insert(
        "Referrer-Policy",
        HeaderValue::from_static("strict-origin-when-cross-origin"),
    );
    headers.insert(
        "Permissions-Policy",
        HeaderValue::from_static("geolocation=(), microphone=(), camera=()"),
    );
    if state.config.server.environment.is_production() {
        headers.insert(
            "Strict-Transport-Security",
            HeaderValue::from_static("max-age=31536000; includeSubDomains"),
        );
    }

    response
}

// ============================================================================
// Rate limiting
// ============================================================================

fn classify(path: &str, method: &Method) -> EndpointClass {
    if path.starts_with("/api/auth") || path.ends_with("/reset-password") {
        EndpointClass::Auth
    } else if path.starts_with("/api/schedule/") {
        EndpointClass::Solver
    } else if method == Method::GET {
        EndpointClass::Read
    } else {
        EndpointClass::Write
    }
}

/// Token-bucket check keyed by user id when authenticated, client IP before
pub async fn rate_limit(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let class = classify(request.uri().path(), request.method());

    let principal = request
        .extensions()
        .get::<Actor>()
        .map(|a| a.id.to_string())
        .or_else(|| {
            request
                .extensions()
                .get::<ConnectInfo<SocketAddr>>()
                .map(|c| c.0.ip().to_string())
        })
        .unwrap_or_else(|| "unknown".to_string());

    if let Err(e) = state.limiters.check(class, &principal) {
        metrics::record_rate_limited(class.as_str());
        return e.into_response();
    }

    next.run(request).await
}

// ============================================================================
// Authentication
// ============================================================================

/// Validate the bearer token and attach the [`Actor`] to the request
pub async fn authenticate(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    let token = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));

    let Some(token) = token else {
        return Error::unauthenticated("missing bearer token").into_response();
    };

    match state.tokens.verify(token, TokenKind::Access) {
        Ok(claims) => {
            // Per-user bucket on top of the per-IP one checked earlier
            let class = classify(request.uri().path(), request.method());
            if let Err(e) = state.limiters.check(class, &claims.sub.to_string()) {
                metrics::record_rate_limited(class.as_str());
                return e.into_response();
            }

            request
                .extensions_mut()
                .insert(Actor::new(claims.sub, claims.role));
            request.extensions_mut().insert(claims);
            next.run(request).await
        }
        Err(e) => e.into_response(),
    }
}

// ============================================================================
// CSRF
// ============================================================================

lazy_static! {
    /// Tokens issued by `GET /api/csrf-token` and not yet expired-swept
    static ref CSRF_TOKENS: DashSet<String> = DashSet::new();
}

/// Issue a CSRF token: same-site cookie plus body echo
pub fn issue_csrf_token() -> (String, HeaderValue) {
    let token = Uuid::new_v4().to_string();
    CSRF_TOKENS.insert(token.clone());
    let cookie = HeaderValue::from_str(&format!(
        "csrf_token={token}; Path=/; HttpOnly; SameSite=Strict"
    ))
    .expect("cookie header");
    (token, cookie)
}

fn cookie_value(request: &Request, name: &str) -> Option<String> {
    let cookies = request.headers().get(header::COOKIE)?.to_str().ok()?;
    cookies.split(';').find_map(|pair| {
        let (key, value) = pair.trim().split_once('=')?;
        (key == name).then(|| value.to_string())
    })
}

/// Double-submit check for state-changing methods
pub async fn csrf_guard(request: Request, next: Next) -> Response {
    let mutating = matches!(
        *request.method(),
        Method::POST | Method::PUT | Method::PATCH | Method::DELETE
    );
    if !mutating {
        return next.run(request).await;
    }

    let header_token = request
        .headers()
        .get("X-CSRF-Token")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let cookie_token = cookie_value(&request, "csrf_token");

    match (header_token, cookie_token) {
        (Some(from_header), Some(from_cookie))
            if from_header == from_cookie && CSRF_TOKENS.contains(&from_header) =>
        {
            next.run(request).await
        }
        _ => Error::forbidden("missing or mismatched CSRF token").into_response(),
    }
}

// ============================================================================
// Deadline + slow-request logging
// ============================================================================

/// Per-request deadline; clients may tighten it via `X-Request-Deadline`
pub async fn deadline(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let deadline_secs = request
        .headers()
        .get("X-Request-Deadline")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok())
        .map(|secs| secs.min(state.config.server.request_deadline_secs))
        .unwrap_or(state.config.server.request_deadline_secs);

    match tokio::time::timeout(Duration::from_secs(deadline_secs), next.run(request)).await {
        Ok(response) => response,
        Err(_) => Error::DeadlineExceeded.into_response(),
    }
}

/// Request metrics and slow-request logging
pub async fn observe(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let start = Instant::now();
    let method = request.method().clone();
    let route = normalize_route(request.uri().path());

    let response = next.run(request).await;

    let elapsed = start.elapsed();
    metrics::record_http_request(&route, response.status().as_u16(), elapsed.as_secs_f64());

    let threshold = Duration::from_millis(state.config.server.slow_request_ms);
    if elapsed > threshold {
        tracing::warn!(
            method = %method,
            route = %route,
            elapsed_ms = elapsed.as_millis() as u64,
            status = response.status().as_u16(),
            "Slow request"
        );
    }

    response
}

/// Collapse ids so metrics cardinality stays bounded
fn normalize_route(path: &str) -> String {
    path.split('/')
        .map(|segment| {
            if Uuid::parse_str(segment).is_ok() {
                "{id}"
            } else {
                segment
            }
        })
        .collect::<Vec<_>>()
        .join("/")
}

/// 404 fallback in the standard error shape
pub async fn not_found() -> Response {
    (
        StatusCode::NOT_FOUND,
        axum::Json(serde_json::json!({
            "error": { "kind": "not_found", "message": "no such endpoint", "retryable": false }
        })),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_endpoint_classes() {
        assert_eq!(
            classify("/api/auth/login", &Method::POST),
            EndpointClass::Auth
        );
        assert_eq!(
            classify("/api/employees/xyz/reset-password", &Method::POST),
            EndpointClass::Auth
        );
        assert_eq!(
            classify("/api/schedule/generate", &Method::POST),
            EndpointClass::Solver
        );
        assert_eq!(classify("/api/employees", &Method::GET), EndpointClass::Read);
        assert_eq!(
            classify("/api/employees", &Method::POST),
            EndpointClass::Write
        );
    }

    #[test]
    fn test_normalize_route() {
        let id = Uuid::new_v4();
        assert_eq!(
            normalize_route(&format!("/api/employees/{id}/role")),
            "/api/employees/{id}/role"
        );
        assert_eq!(normalize_route("/api/health"), "/api/health");
    }

    #[test]
    fn test_csrf_issue_registers_token() {
        let (token, cookie) = issue_csrf_token();
        assert!(CSRF_TOKENS.contains(&token));
        assert!(cookie.to_str().unwrap().contains("SameSite=Strict"));
        assert!(cookie.to_str().unwrap().contains("HttpOnly"));
    }
}
