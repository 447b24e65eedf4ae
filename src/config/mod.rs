//! Configuration management for the scheduling service
//!
//! This module handles loading and validating configuration from environment
//! variables and TOML files.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Deployment environment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Environment {
    Development,
    Production,
}

impl Environment {
    pub fn is_production(&self) -> bool {
        matches!(self, Self::Production)
    }

    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "production" | "prod" => Self::Production,
            _ => Self::Development,
        }
    }
}

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub cache: CacheConfig,
    pub auth: AuthConfig,
    pub solver: SolverConfig,
    pub engine: EngineConfig,
    pub broadcast: BroadcastConfig,
    pub rate_limits: RateLimitConfig,
    pub logging: LoggingConfig,
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Bind address, e.g. `0.0.0.0:8080`
    pub bind_address: String,

    /// Deployment environment; production enables HSTS and error sanitization
    pub environment: Environment,

    /// Allowed CORS origins
    pub cors_origins: Vec<String>,

    /// Maximum request body size in bytes
    pub max_body_bytes: usize,

    /// Requests slower than this are logged at WARN
    pub slow_request_ms: u64,

    /// Default per-request deadline in seconds
    pub request_deadline_secs: u64,
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// PostgreSQL connection string
    pub url: String,

    /// Base pool size
    pub pool_size: usize,

    /// Extra connections allowed beyond the base pool
    pub pool_overflow: usize,

    /// Timeout for acquiring a connection, in seconds
    pub acquire_timeout_secs: u64,
}

/// Cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Whether the distributed backend is enabled at all
    pub enabled: bool,

    /// Redis URL for the distributed backend; in-process caching is used
    /// when unset or unreachable
    pub redis_url: Option<String>,

    /// Key prefix for namespacing
    pub key_prefix: String,
}

/// Token and password configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Secret for signing tokens
    pub token_secret: String,

    /// Access token lifetime in minutes
    pub access_ttl_mins: u64,

    /// Refresh token lifetime in days
    pub refresh_ttl_days: u64,

    /// Consecutive failed logins before lockout
    pub lockout_threshold: u32,
}

/// Solver configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SolverConfig {
    /// Time budget per solve in seconds
    pub time_budget_secs: u64,

    /// Concurrent solver workers
    pub workers: usize,

    /// How long a request may wait for a free worker before "busy"
    pub queue_wait_secs: u64,
}

/// Assignment engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Employee confirm/decline window in hours
    pub confirm_window_hours: i64,

    /// Auto-transition to confirmed once the window elapses
    pub auto_confirm_after_window: bool,
}

/// Broadcaster configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BroadcastConfig {
    /// Events retained per topic for reconnect replay
    pub replay_buffer: usize,

    /// Heartbeat interval in seconds
    pub heartbeat_secs: u64,

    /// Per-client outbound queue capacity
    pub client_queue: usize,
}

/// Token-bucket caps per endpoint class, in requests per minute
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Login and password-reset endpoints
    pub auth_per_min: u32,

    /// Read endpoints
    pub read_per_min: u32,

    /// Mutating endpoints
    pub write_per_min: u32,

    /// Schedule generation endpoints
    pub solver_per_min: u32,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Log format (text, json)
    pub format: String,
}

fn env_parsed<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<T>().ok())
        .unwrap_or(default)
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let bind_address =
            std::env::var("ROTA_BIND_ADDRESS").unwrap_or_else(|_| String::from("0.0.0.0:8080"));

        let environment = Environment::parse(
            &std::env::var("ROTA_ENVIRONMENT").unwrap_or_else(|_| String::from("development")),
        );

        let cors_origins = std::env::var("ROTA_CORS_ORIGINS")
            .map(|v| v.split(',').map(|s| s.trim().to_string()).collect())
            .unwrap_or_else(|_| vec![String::from("http://localhost:3000")]);

        let database_url = std::env::var("ROTA_DATABASE_URL")
            .or_else(|_| std::env::var("DATABASE_URL"))
            .unwrap_or_else(|_| String::from("postgresql://localhost/rota"));

        let redis_url = std::env::var("ROTA_REDIS_URL")
            .or_else(|_| std::env::var("REDIS_URL"))
            .ok();

        let token_secret = std::env::var("ROTA_TOKEN_SECRET")
            .unwrap_or_else(|_| String::from("insecure-dev-secret-change-me"));

        Ok(Self {
            server: ServerConfig {
                bind_address,
                environment,
                cors_origins,
                max_body_bytes: env_parsed("ROTA_MAX_BODY_BYTES", 1024 * 1024),
                slow_request_ms: env_parsed("ROTA_SLOW_REQUEST_MS", 1000),
                request_deadline_secs: env_parsed("ROTA_REQUEST_DEADLINE_SECS", 30),
            },
            database: DatabaseConfig {
                url: database_url,
                pool_size: env_parsed("ROTA_DB_POOL_SIZE", 20),
                pool_overflow: env_parsed("ROTA_DB_POOL_OVERFLOW", 10),
                acquire_timeout_secs: env_parsed("ROTA_DB_ACQUIRE_TIMEOUT_SECS", 5),
            },
            cache: CacheConfig {
                enabled: env_parsed("ROTA_CACHE_ENABLED", true),
                redis_url,
                key_prefix: std::env::var("ROTA_CACHE_PREFIX")
                    .unwrap_or_else(|_| String::from("rota")),
            },
            auth: AuthConfig {
                token_secret,
                access_ttl_mins: env_parsed("ROTA_ACCESS_TTL_MINS", 15),
                refresh_ttl_days: env_parsed("ROTA_REFRESH_TTL_DAYS", 30),
                lockout_threshold: env_parsed("ROTA_LOCKOUT_THRESHOLD", 5),
            },
            solver: SolverConfig {
                time_budget_secs: env_parsed("ROTA_SOLVER_BUDGET_SECS", 10),
                workers: env_parsed("ROTA_SOLVER_WORKERS", 2),
                queue_wait_secs: env_parsed("ROTA_SOLVER_QUEUE_WAIT_SECS", 5),
            },
            engine: EngineConfig {
                confirm_window_hours: env_parsed("ROTA_CONFIRM_WINDOW_HOURS", 48),
                auto_confirm_after_window: env_parsed("ROTA_AUTO_CONFIRM", true),
            },
            broadcast: BroadcastConfig {
                replay_buffer: env_parsed("ROTA_REPLAY_BUFFER", 1000),
                heartbeat_secs: env_parsed("ROTA_HEARTBEAT_SECS", 30),
                client_queue: env_parsed("ROTA_CLIENT_QUEUE", 256),
            },
            rate_limits: RateLimitConfig {
                auth_per_min: env_parsed("ROTA_RATE_AUTH_PER_MIN", 10),
                read_per_min: env_parsed("ROTA_RATE_READ_PER_MIN", 300),
                write_per_min: env_parsed("ROTA_RATE_WRITE_PER_MIN", 120),
                solver_per_min: env_parsed("ROTA_RATE_SOLVER_PER_MIN", 6),
            },
            logging: LoggingConfig {
                level: std::env::var("ROTA_LOG_LEVEL").unwrap_or_else(|_| String::from("info")),
                format: std::env::var("ROTA_LOG_FORMAT").unwrap_or_else(|_| String::from("text")),
            },
        })
    }

    /// Load configuration from a file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse TOML config file: {}", path.display()))?;

        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.database.pool_size == 0 {
            anyhow::bail!("database.pool_size must be greater than 0");
        }
        if self.solver.workers == 0 {
            anyhow::bail!("solver.workers must be greater than 0");
        }
        if self.solver.time_budget_secs == 0 {
            anyhow::bail!("solver.time_budget_secs must be greater than 0");
        }
        if self.auth.token_secret.len() < 16 {
            anyhow::bail!("auth.token_secret must be at least 16 bytes");
        }
        if self.server.environment.is_production()
            && self.auth.token_secret == "insecure-dev-secret-change-me"
        {
            anyhow::bail!("auth.token_secret must be set in production");
        }
        if self.engine.confirm_window_hours <= 0 {
            anyhow::bail!("engine.confirm_window_hours must be positive");
        }
        if self.broadcast.replay_buffer == 0 {
            anyhow::bail!("broadcast.replay_buffer must be greater than 0");
        }
        Ok(())
    }

    /// Default request deadline as a Duration
    #[must_use]
    pub fn request_deadline(&self) -> Duration {
        Duration::from_secs(self.server.request_deadline_secs)
    }

    /// Solver time budget as a Duration
    #[must_use]
    pub fn solver_budget(&self) -> Duration {
        Duration::from_secs(self.solver.time_budget_secs)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                bind_address: String::from("0.0.0.0:8080"),
                environment: Environment::Development,
                cors_origins: vec![String::from("http://localhost:3000")],
                max_body_bytes: 1024 * 1024,
                slow_request_ms: 1000,
                request_deadline_secs: 30,
            },
            database: DatabaseConfig {
                url: String::from("postgresql://localhost/rota"),
                pool_size: 20,
                pool_overflow: 10,
                acquire_timeout_secs: 5,
            },
            cache: CacheConfig {
                enabled: true,
                redis_url: None,
                key_prefix: String::from("rota"),
            },
            auth: AuthConfig {
                token_secret: String::from("insecure-dev-secret-change-me"),
                access_ttl_mins: 15,
                refresh_ttl_days: 30,
                lockout_threshold: 5,
            },
            solver: SolverConfig {
                time_budget_secs: 10,
                workers: 2,
                queue_wait_secs: 5,
            },
            engine: EngineConfig {
                confirm_window_hours: 48,
                auto_confirm_after_window: true,
            },
            broadcast: BroadcastConfig {
                replay_buffer: 1000,
                heartbeat_secs: 30,
                client_queue: 256,
            },
            rate_limits: RateLimitConfig {
                auth_per_min: 10,
                read_per_min: 300,
                write_per_min: 120,
                solver_per_min: 6,
            },
            logging: LoggingConfig {
                level: String::from("info"),
                format: String::from("text"),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_workers_rejected() {
        let mut config = Config::default();
        config.solver.workers = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_production_requires_real_secret() {
        let mut config = Config::default();
        config.server.environment = Environment::Production;
        assert!(config.validate().is_err());

        config.auth.token_secret = String::from("a-real-32-byte-production-secret");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_environment_parse() {
        assert!(Environment::parse("production").is_production());
        assert!(Environment::parse("prod").is_production());
        assert!(!Environment::parse("development").is_production());
        assert!(!Environment::parse("anything-else").is_production());
    }

    #[test]
    fn test_durations() {
        let config = Config::default();
        assert_eq!(config.solver_budget(), Duration::from_secs(10));
        assert_eq!(config.request_deadline(), Duration::from_secs(30));
    }
}
