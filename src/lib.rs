//! rota - Employee shift-scheduling service
//!
//! A scheduling backend with natural-language rule ingestion, a
//! constraint-based assignment solver, an authenticated HTTP API with audit
//! history, and real-time change push.
//!
//! # Architecture
//!
//! The library is organized into several modules:
//!
//! - [`config`] - Configuration management and settings
//! - [`models`] - Core domain entities and invariants
//! - [`store`] - PostgreSQL persistence with repository traits
//! - [`cache`] - Typed TTL/LRU caches with optional Redis backend
//! - [`auth`] - Passwords, tokens, permissions, rate limiting
//! - [`parser`] - Natural-language rule classification
//! - [`solver`] - Constraint-based schedule generation
//! - [`engine`] - Assignment validation pipeline and workflow
//! - [`broadcast`] - Real-time event fanout over WebSockets
//! - [`http`] - Routing and the middleware pipeline
//! - [`metrics`] - Prometheus instrumentation
//!
//! # Example
//!
//! ```no_run
//! use rota::config::Config;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::from_env()?;
//!     config.validate()?;
//!     // see src/main.rs for full server assembly
//!     Ok(())
//! }
//! ```

pub mod auth;
pub mod broadcast;
pub mod cache;
pub mod config;
pub mod engine;
pub mod error;
pub mod http;
pub mod metrics;
pub mod models;
pub mod parser;
pub mod solver;
pub mod store;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::auth::{Action, Actor};
    pub use crate::config::Config;
    pub use crate::error::{ConflictKind, Error, Result};
    pub use crate::models::{
        AssignmentStatus, Employee, Role, Rule, RulePayload, Schedule, ScheduleAssignment,
        ScheduleStatus, Shift, ShiftType,
    };
    pub use crate::solver::{Plan, PlanStatus, SolverOptions, SolverSnapshot};
    pub use crate::store::Store;
}
