//! Per-principal token-bucket rate limiting
//!
//! Keyed limiters with one bucket per principal (client IP before
//! authentication, user id after). Endpoint classes carry separate caps so
//! the login path can be throttled far below the read path.

use std::num::NonZeroU32;

use governor::{
    clock::{Clock, DefaultClock},
    state::keyed::DefaultKeyedStateStore,
    Quota, RateLimiter,
};

use crate::config::RateLimitConfig;
use crate::error::{Error, Result};

type KeyedLimiter = RateLimiter<String, DefaultKeyedStateStore<String>, DefaultClock>;

/// Endpoint classes with independent caps
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EndpointClass {
    /// Login, refresh, password reset — strictest cap
    Auth,
    /// Read-only endpoints
    Read,
    /// Mutating endpoints
    Write,
    /// Schedule generation/optimization
    Solver,
}

impl EndpointClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Auth => "auth",
            Self::Read => "read",
            Self::Write => "write",
            Self::Solver => "solver",
        }
    }
}

/// Token-bucket limiters for all endpoint classes
pub struct RateLimiters {
    auth: KeyedLimiter,
    read: KeyedLimiter,
    write: KeyedLimiter,
    solver: KeyedLimiter,
}

fn per_minute(cap: u32) -> Quota {
    Quota::per_minute(NonZeroU32::new(cap.max(1)).unwrap())
}

impl RateLimiters {
    pub fn new(config: &RateLimitConfig) -> Self {
        Self {
            auth: RateLimiter::keyed(per_minute(config.auth_per_min)),
            read: RateLimiter::keyed(per_minute(config.read_per_min)),
            write: RateLimiter::keyed(per_minute(config.write_per_min)),
            solver: RateLimiter::keyed(per_minute(config.solver_per_min)),
        }
    }

    /// Check the principal's bucket for the endpoint class
    pub fn check(&self, class: EndpointClass, principal: &str) -> Result<()> {
        let limiter = match class {
            EndpointClass::Auth => &self.auth,
            EndpointClass::Read => &self.read,
            EndpointClass::Write => &self.write,
            EndpointClass::Solver => &self.solver,
        };

        limiter
            .check_key(&principal.to_string())
            .map_err(|not_until| {
                let wait = not_until.wait_time_from(DefaultClock::default().now());
                Error::RateLimited {
                    retry_after_secs: wait.as_secs().max(1),
                }
            })
    }

    /// Drop idle per-key state to bound memory
    pub fn sweep(&self) {
        self.auth.retain_recent();
        self.read.retain_recent();
        self.write.retain_recent();
        self.solver.retain_recent();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limiters(auth_cap: u32) -> RateLimiters {
        RateLimiters::new(&RateLimitConfig {
            auth_per_min: auth_cap,
            read_per_min: 300,
            write_per_min: 120,
            solver_per_min: 6,
        })
    }

    #[test]
    fn test_cap_enforced_per_principal() {
        let limiters = limiters(3);

        for _ in 0..3 {
            assert!(limiters.check(EndpointClass::Auth, "10.0.0.1").is_ok());
        }
        let err = limiters.check(EndpointClass::Auth, "10.0.0.1").unwrap_err();
        assert_eq!(err.kind(), "rate_limited");
        assert!(err.is_retryable());

        // A different principal has its own bucket
        assert!(limiters.check(EndpointClass::Auth, "10.0.0.2").is_ok());
    }

    #[test]
    fn test_classes_are_independent() {
        let limiters = limiters(1);

        assert!(limiters.check(EndpointClass::Auth, "k").is_ok());
        assert!(limiters.check(EndpointClass::Auth, "k").is_err());
        // Exhausting auth does not touch the read bucket
        assert!(limiters.check(EndpointClass::Read, "k").is_ok());
    }

    #[test]
    fn test_retry_after_is_positive() {
        let limiters = limiters(1);
        let _ = limiters.check(EndpointClass::Solver, "k");
        // Solver cap is 6/min; drain it
        for _ in 0..10 {
            let _ = limiters.check(EndpointClass::Solver, "k");
        }
        if let Err(Error::RateLimited { retry_after_secs }) =
            limiters.check(EndpointClass::Solver, "k")
        {
            assert!(retry_after_secs >= 1);
        } else {
            panic!("expected rate_limited");
        }
    }
}
