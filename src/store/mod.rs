//! Domain store
//!
//! Trait-based repositories decouple handlers and the assignment engine
//! from PostgreSQL, enabling in-memory doubles for tests.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                 Handlers / Assignment Engine                │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     Repository Traits                       │
//! │  EmployeeStore, ShiftStore, AssignmentStore, ...            │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                  ┌───────────┴───────────┐
//!                  ▼                       ▼
//!         ┌─────────────────┐     ┌─────────────────┐
//!         │   PostgreSQL    │     │    In-memory    │
//!         │ Implementation  │     │ Implementation  │
//!         └─────────────────┘     └─────────────────┘
//! ```
//!
//! # Transactional discipline
//!
//! Single writes use one transaction. Composite writes (field change plus
//! its history row, schedule plus assignments) commit all-or-nothing. Bulk
//! assignment creation nests a savepoint per row so one bad row never takes
//! down the batch.

pub mod assignments;
pub mod departments;
pub mod employees;
pub mod history;
pub mod memory;
pub mod notifications;
pub mod page;
pub mod rules;
pub mod schedules;
pub mod schema;
pub mod shifts;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use deadpool_postgres::{Config as PoolConfig, ManagerConfig, Pool, RecyclingMethod, Runtime};
use tokio_postgres::NoTls;

use crate::config::DatabaseConfig;
use crate::error::{Error, Result};

pub use assignments::{AssignmentFilter, AssignmentStore, RowOutcome};
pub use departments::DepartmentStore;
pub use employees::{EmployeeFilter, EmployeeStore};
pub use history::HistoryStore;
pub use notifications::NotificationStore;
pub use page::{decode_cursor, encode_cursor, Page, PageRequest};
pub use rules::RuleStore;
pub use schedules::ScheduleStore;
pub use shifts::{ShiftFilter, ShiftStore};

/// Snapshot of pool utilization for metrics
#[derive(Debug, Clone, Copy)]
pub struct PoolStatus {
    pub size: usize,
    pub available: usize,
    pub waiting: usize,
}

impl PoolStatus {
    /// Fraction of connections currently checked out
    pub fn utilization(&self) -> f64 {
        if self.size == 0 {
            return 0.0;
        }
        (self.size - self.available) as f64 / self.size as f64
    }
}

/// PostgreSQL connection pool wrapper
pub struct Database {
    pool: Pool,
    acquire_timeout: Duration,
}

impl Database {
    /// Create the connection pool
    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        let mut cfg = PoolConfig::new();
        cfg.url = Some(config.url.clone());
        cfg.manager = Some(ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        });
        cfg.pool = Some(deadpool_postgres::PoolConfig::new(
            config.pool_size + config.pool_overflow,
        ));

        let pool = cfg
            .create_pool(Some(Runtime::Tokio1), NoTls)
            .context("Failed to create PostgreSQL connection pool")?;

        let db = Self {
            pool,
            acquire_timeout: Duration::from_secs(config.acquire_timeout_secs),
        };

        // Fail fast on an unreachable database
        db.client().await?;
        tracing::info!(pool_size = config.pool_size, "Connected to PostgreSQL");

        Ok(db)
    }

    /// Acquire a pooled client, bounded by the acquisition timeout
    pub async fn client(&self) -> Result<deadpool_postgres::Client> {
        match tokio::time::timeout(self.acquire_timeout, self.pool.get()).await {
            Ok(Ok(client)) => Ok(client),
            Ok(Err(e)) => Err(Error::dependency(format!("database pool: {e}"))),
            Err(_) => Err(Error::dependency("database pool acquisition timed out")),
        }
    }

    /// Create all tables and indexes
    pub async fn migrate(&self) -> Result<()> {
        let client = self.client().await?;
        client
            .batch_execute(schema::DDL)
            .await
            .context("Failed to create schema")?;
        tracing::info!("Database schema up to date");
        Ok(())
    }

    pub fn status(&self) -> PoolStatus {
        let status = self.pool.status();
        PoolStatus {
            size: status.size,
            available: status.available.max(0) as usize,
            waiting: status.waiting,
        }
    }

    pub fn pool(&self) -> &Pool {
        &self.pool
    }
}

/// Aggregate of all repositories behind trait objects
///
/// Constructed once at startup and shared via `Arc`.
#[derive(Clone)]
pub struct Store {
    pub employees: Arc<dyn EmployeeStore>,
    pub departments: Arc<dyn DepartmentStore>,
    pub shifts: Arc<dyn ShiftStore>,
    pub schedules: Arc<dyn ScheduleStore>,
    pub assignments: Arc<dyn AssignmentStore>,
    pub rules: Arc<dyn RuleStore>,
    pub notifications: Arc<dyn NotificationStore>,
    pub history: Arc<dyn HistoryStore>,
}

impl Store {
    /// PostgreSQL-backed store
    pub fn postgres(db: Arc<Database>) -> Self {
        Self {
            employees: Arc::new(employees::PgEmployeeStore::new(db.clone())),
            departments: Arc::new(departments::PgDepartmentStore::new(db.clone())),
            shifts: Arc::new(shifts::PgShiftStore::new(db.clone())),
            schedules: Arc::new(schedules::PgScheduleStore::new(db.clone())),
            assignments: Arc::new(assignments::PgAssignmentStore::new(db.clone())),
            rules: Arc::new(rules::PgRuleStore::new(db.clone())),
            notifications: Arc::new(notifications::PgNotificationStore::new(db.clone())),
            history: Arc::new(history::PgHistoryStore::new(db)),
        }
    }

    /// In-memory store for tests
    pub fn in_memory() -> Self {
        let shared = Arc::new(memory::MemoryBackend::default());
        Self {
            employees: shared.clone(),
            departments: shared.clone(),
            shifts: shared.clone(),
            schedules: shared.clone(),
            assignments: shared.clone(),
            rules: shared.clone(),
            notifications: shared.clone(),
            history: shared,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_status_utilization() {
        let status = PoolStatus {
            size: 20,
            available: 5,
            waiting: 2,
        };
        assert!((status.utilization() - 0.75).abs() < f64::EPSILON);

        let empty = PoolStatus {
            size: 0,
            available: 0,
            waiting: 0,
        };
        assert_eq!(empty.utilization(), 0.0);
    }
}
