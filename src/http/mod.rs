//! HTTP surface
//!
//! Routing, the shared application state, and server assembly. The request
//! pipeline (middleware order, §-by-§):
//!
//! 1. Security headers
//! 2. CORS (origin whitelist)
//! 3. Request body limit (default 1 MB)
//! 4. Rate limiter
//! 5. Bearer authentication (protected routes)
//! 6. CSRF for mutating methods
//! 7. Typed payload validation in handlers (`deny_unknown_fields`)
//! 8. Handler dispatch
//! 9. snake_case JSON responses
//! 10. Slow-request logging + metrics, with a per-request deadline
//!     wrapped around the chain

pub mod error;
pub mod handlers;
pub mod middleware;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::extract::DefaultBodyLimit;
use axum::http::{HeaderValue, Method};
use axum::middleware::from_fn_with_state;
use axum::routing::{get, patch, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::auth::{PasswordHasher, RateLimiters, TokenService};
use crate::broadcast::Broadcaster;
use crate::cache::CacheService;
use crate::config::Config;
use crate::engine::AssignmentEngine;
use crate::error::Result;
use crate::parser::SynonymTable;
use crate::solver::SolverPool;
use crate::store::{Database, Store};

// ============================================================================
// App State
// ============================================================================

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub store: Store,
    pub db: Option<Arc<Database>>,
    pub cache: Option<Arc<CacheService>>,
    pub tokens: Arc<TokenService>,
    pub hasher: PasswordHasher,
    pub limiters: Arc<RateLimiters>,
    pub engine: Arc<AssignmentEngine>,
    pub broadcaster: Arc<Broadcaster>,
    pub solver_pool: Arc<SolverPool>,
    pub synonyms: Arc<SynonymTable>,
    pub start_time: Instant,
}

impl AppState {
    /// Assemble state over an already-connected store
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: Arc<Config>,
        store: Store,
        db: Option<Arc<Database>>,
        cache: Option<Arc<CacheService>>,
        broadcaster: Arc<Broadcaster>,
        solver_pool: Arc<SolverPool>,
    ) -> Self {
        let tokens = Arc::new(TokenService::new(&config.auth));
        let limiters = Arc::new(RateLimiters::new(&config.rate_limits));
        let engine = Arc::new(AssignmentEngine::new(
            store.clone(),
            cache.clone(),
            broadcaster.clone(),
            config.engine.clone(),
        ));

        Self {
            config,
            store,
            db,
            cache,
            tokens,
            hasher: PasswordHasher::new(),
            limiters,
            engine,
            broadcaster,
            solver_pool,
            synonyms: Arc::new(SynonymTable::default()),
            start_time: Instant::now(),
        }
    }
}

// ============================================================================
// Router
// ============================================================================

/// Build the complete router with the middleware pipeline
pub fn build_router(state: AppState) -> Router {
    // Routes reachable without a bearer token
    let public = Router::new()
        .route("/api/health", get(handlers::system::health))
        .route("/api/metrics", get(handlers::system::metrics))
        .route("/api/csrf-token", get(handlers::system::csrf_token))
        .route("/api/auth/register", post(handlers::auth::register))
        .route("/api/auth/login", post(handlers::auth::login))
        .route("/api/auth/refresh", post(handlers::auth::refresh))
        .route("/api/ws", get(crate::broadcast::ws::ws_handler));

    let protected = Router::new()
        .route("/api/auth/logout", post(handlers::auth::logout))
        .route("/api/auth/me", get(handlers::auth::me))
        // Employees
        .route(
            "/api/employees",
            get(handlers::employees::list).post(handlers::employees::create),
        )
        .route(
            "/api/employees/{id}",
            get(handlers::employees::get_one)
                .patch(handlers::employees::update)
                .delete(handlers::employees::delete),
        )
        .route(
            "/api/employees/{id}/reset-password",
            post(handlers::employees::reset_password),
        )
        .route(
            "/api/employees/{id}/change-password",
            patch(handlers::employees::change_password),
        )
        .route(
            "/api/employees/{id}/status",
            patch(handlers::employees::change_status),
        )
        .route(
            "/api/employees/{id}/role",
            patch(handlers::employees::change_role),
        )
        .route(
            "/api/employees/{id}/department",
            patch(handlers::employees::change_department),
        )
        .route(
            "/api/employees/{id}/status-history",
            get(handlers::employees::status_history),
        )
        .route(
            "/api/employees/{id}/role-history",
            get(handlers::employees::role_history),
        )
        .route(
            "/api/employees/{id}/department-history",
            get(handlers::employees::department_history),
        )
        // Departments
        .route(
            "/api/departments",
            get(handlers::departments::list).post(handlers::departments::create),
        )
        .route(
            "/api/departments/{id}",
            get(handlers::departments::get_one)
                .patch(handlers::departments::update)
                .delete(handlers::departments::delete),
        )
        .route(
            "/api/departments/{id}/hierarchy",
            get(handlers::departments::hierarchy),
        )
        // Shifts
        .route(
            "/api/shifts",
            get(handlers::shifts::list).post(handlers::shifts::create),
        )
        .route("/api/shifts/bulk", post(handlers::shifts::create_bulk))
        .route(
            "/api/shifts/{id}",
            get(handlers::shifts::get_one)
                .patch(handlers::shifts::update)
                .delete(handlers::shifts::delete),
        )
        // Schedules
        .route(
            "/api/schedules",
            get(handlers::schedules::list).post(handlers::schedules::create),
        )
        .route(
            "/api/schedules/{id}",
            get(handlers::schedules::get_one)
                .patch(handlers::schedules::update)
                .delete(handlers::schedules::delete),
        )
        .route(
            "/api/schedules/{id}/publish",
            post(handlers::schedules::publish),
        )
        .route(
            "/api/schedules/{id}/approve",
            post(handlers::schedules::approve),
        )
        // Assignments
        .route(
            "/api/schedules/{schedule_id}/assignments",
            post(handlers::assignments::create).get(handlers::assignments::list_for_schedule),
        )
        .route(
            "/api/assignments/bulk",
            post(handlers::assignments::create_bulk),
        )
        .route("/api/assignments", get(handlers::assignments::list))
        .route(
            "/api/assignments/{id}",
            get(handlers::assignments::get_one)
                .put(handlers::assignments::update)
                .delete(handlers::assignments::delete),
        )
        .route(
            "/api/assignments/{id}/confirm",
            post(handlers::assignments::confirm),
        )
        .route(
            "/api/assignments/{id}/decline",
            post(handlers::assignments::decline),
        )
        .route(
            "/api/assignments/{id}/conflicts",
            get(handlers::assignments::conflicts),
        )
        // Rules
        .route("/api/rules/parse", post(handlers::rules::parse))
        .route(
            "/api/rules",
            get(handlers::rules::list).post(handlers::rules::create),
        )
        .route(
            "/api/rules/{id}",
            patch(handlers::rules::update).delete(handlers::rules::delete),
        )
        // Scheduling
        .route("/api/schedule/generate", post(handlers::generate::generate))
        .route("/api/schedule/optimize", post(handlers::generate::optimize))
        .route("/api/schedule/validate", post(handlers::generate::validate))
        // Notifications
        .route("/api/notifications", get(handlers::notifications::list))
        .route(
            "/api/notifications/{id}/read",
            post(handlers::notifications::mark_read),
        )
        // Cache stats
        .route("/api/cache/stats", get(handlers::system::cache_stats))
        .layer(axum::middleware::from_fn(middleware::csrf_guard))
        .layer(from_fn_with_state(state.clone(), middleware::authenticate));

    public
        .merge(protected)
        .fallback(middleware::not_found)
        .layer(from_fn_with_state(state.clone(), middleware::rate_limit))
        .layer(DefaultBodyLimit::max(state.config.server.max_body_bytes))
        .layer(cors_layer(&state))
        .layer(from_fn_with_state(state.clone(), middleware::security_headers))
        .layer(from_fn_with_state(state.clone(), middleware::observe))
        .layer(from_fn_with_state(state.clone(), middleware::deadline))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn cors_layer(state: &AppState) -> CorsLayer {
    let origins: Vec<HeaderValue> = state
        .config
        .server
        .cors_origins
        .iter()
        .filter_map(|o| o.parse().ok())
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
        ])
        .allow_headers([
            axum::http::header::AUTHORIZATION,
            axum::http::header::CONTENT_TYPE,
            "X-CSRF-Token".parse().unwrap(),
            "X-Request-Deadline".parse().unwrap(),
        ])
        .allow_credentials(true)
}

// ============================================================================
// Server
// ============================================================================

/// Serve the API with graceful shutdown
pub async fn serve(
    state: AppState,
    shutdown: impl std::future::Future<Output = ()> + Send + 'static,
) -> Result<()> {
    let addr: SocketAddr = state
        .config
        .server
        .bind_address
        .parse()
        .map_err(|e| crate::error::Error::Internal(anyhow::anyhow!("bad bind address: {e}")))?;

    error::set_sanitize(state.config.server.environment.is_production());
    start_background_tasks(&state);

    let router = build_router(state);
    tracing::info!(%addr, "Starting scheduling service");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| crate::error::Error::Internal(anyhow::anyhow!("bind failed: {e}")))?;

    axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown)
    .await
    .map_err(|e| crate::error::Error::Internal(anyhow::anyhow!("server error: {e}")))?;

    tracing::info!("Server shutdown complete");
    Ok(())
}

/// Periodic maintenance: auto-confirm sweep, token purges, metric gauges
fn start_background_tasks(state: &AppState) {
    let engine = state.engine.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(300));
        loop {
            interval.tick().await;
            if let Err(e) = engine.auto_confirm_sweep().await {
                tracing::warn!(error = %e, "Auto-confirm sweep failed");
            }
        }
    });

    let tokens = state.tokens.clone();
    let limiters = state.limiters.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(600));
        loop {
            interval.tick().await;
            let purged = tokens.revocations().purge_expired();
            if purged > 0 {
                tracing::debug!(count = purged, "Purged expired token revocations");
            }
            limiters.sweep();
        }
    });

    let db = state.db.clone();
    let cache = state.cache.clone();
    let broadcaster = state.broadcaster.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(15));
        loop {
            interval.tick().await;
            if let Some(db) = &db {
                let status = db.status();
                crate::metrics::set_pool_status(
                    status.size,
                    status.size - status.available,
                    status.waiting,
                );
            }
            if let Some(cache) = &cache {
                for family in cache.stats() {
                    crate::metrics::set_cache_family(
                        &family.family,
                        family.size,
                        family.hit_rate,
                    );
                }
            }
            crate::metrics::set_ws_stats(
                broadcaster.subscription_count(),
                broadcaster.dropped_count(),
            );
        }
    });

    tracing::info!("Background tasks started");
}
