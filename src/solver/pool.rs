//! Solver worker pool
//!
//! Gates concurrent solves behind a small semaphore so CPU-bound search
//! never starves the request tasks. Waiters are bounded by the queue wait
//! budget and overflow returns a retryable "busy" error.
//!
//! The pool is a process-wide singleton with explicit [`init`] and
//! [`shutdown`] lifecycle calls.

use std::sync::Arc;
use std::time::Duration;

use lazy_static::lazy_static;
use parking_lot::RwLock;
use tokio::sync::Semaphore;

use crate::config::SolverConfig;
use crate::error::{Error, Result};

/// Bounded worker pool for solver invocations
pub struct SolverPool {
    semaphore: Arc<Semaphore>,
    queue_wait: Duration,
    workers: usize,
}

impl SolverPool {
    pub fn new(config: &SolverConfig) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(config.workers)),
            queue_wait: Duration::from_secs(config.queue_wait_secs),
            workers: config.workers,
        }
    }

    /// Run a blocking solve on a worker, waiting at most the queue budget
    pub async fn run<T, F>(&self, solve: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce() -> Result<T> + Send + 'static,
    {
        let permit = tokio::time::timeout(self.queue_wait, self.semaphore.clone().acquire_owned())
            .await
            .map_err(|_| Error::dependency("solver workers busy, try again"))?
            .map_err(|_| Error::dependency("solver pool shut down"))?;

        let result = tokio::task::spawn_blocking(move || {
            let _permit = permit;
            solve()
        })
        .await
        .map_err(|e| Error::Internal(anyhow::anyhow!("solver task panicked: {e}")))?;

        result
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }
}

// ============================================================================
// Lifecycle
// ============================================================================

lazy_static! {
    static ref POOL: RwLock<Option<Arc<SolverPool>>> = RwLock::new(None);
}

/// Initialize the process-wide solver pool
pub fn init(config: &SolverConfig) -> Arc<SolverPool> {
    let pool = Arc::new(SolverPool::new(config));
    *POOL.write() = Some(pool.clone());
    pool
}

/// Handle to the process-wide pool, if initialized
pub fn get() -> Option<Arc<SolverPool>> {
    POOL.read().clone()
}

/// Tear down the process-wide pool
pub fn shutdown() {
    if POOL.write().take().is_some() {
        tracing::info!("Solver pool shut down");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(workers: usize, queue_wait_secs: u64) -> SolverConfig {
        SolverConfig {
            time_budget_secs: 10,
            workers,
            queue_wait_secs,
        }
    }

    #[tokio::test]
    async fn test_run_returns_result() {
        let pool = SolverPool::new(&config(2, 5));
        let result = pool.run(|| Ok(42)).await.unwrap();
        assert_eq!(result, 42);
    }

    #[tokio::test]
    async fn test_errors_propagate() {
        let pool = SolverPool::new(&config(1, 5));
        let err = pool
            .run::<(), _>(|| Err(Error::SolverTimeout))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "solver_timeout");
    }

    #[tokio::test]
    async fn test_busy_overflow() {
        let pool = Arc::new(SolverPool::new(&config(1, 0)));

        // Occupy the single worker
        let blocker = pool.clone();
        let handle = tokio::spawn(async move {
            blocker
                .run(|| {
                    std::thread::sleep(Duration::from_millis(300));
                    Ok(())
                })
                .await
        });

        // Give the blocker time to take the permit
        tokio::time::sleep(Duration::from_millis(50)).await;

        let err = pool.run(|| Ok(())).await.unwrap_err();
        assert_eq!(err.kind(), "dependency_unavailable");
        assert!(err.is_retryable());

        handle.await.unwrap().unwrap();
    }
}
