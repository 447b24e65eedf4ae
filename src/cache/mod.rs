//! Typed caching layer
//!
//! Read-through caches for the hot lookups (employee-by-email, department
//! hierarchy, shift, schedule assignments, role permissions, notifications),
//! each with its own TTL and LRU cap:
//!
//! | Family               | TTL    | Cap  |
//! |----------------------|--------|------|
//! | employee-by-email    | 10 min | 1000 |
//! | department-hierarchy | 30 min | 200  |
//! | shift-by-name        | 10 min | 500  |
//! | schedule-assignments | 3 min  | 500  |
//! | role-permissions     | 15 min | 20   |
//! | notification         | 1 min  | 500  |
//!
//! A Redis backend can replace the in-process maps; on backend failure every
//! operation degrades to a miss so correctness never depends on cache
//! availability. Writers invalidate affected keys before change events are
//! published.
//!
//! The cache is a process-wide singleton with explicit [`init`] and
//! [`shutdown`] lifecycle calls.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use deadpool_redis::{Config as RedisPoolConfig, Pool as RedisPool, Runtime};
use lazy_static::lazy_static;
use parking_lot::{Mutex, RwLock};
use redis::AsyncCommands;
use serde::{de::DeserializeOwned, Serialize};

use crate::config::CacheConfig;

// ============================================================================
// Cache Families
// ============================================================================

/// The typed cache families and their TTL/cap policies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheFamily {
    EmployeeByEmail,
    DepartmentHierarchy,
    ShiftByName,
    ScheduleAssignments,
    RolePermissions,
    Notification,
}

impl CacheFamily {
    pub fn all() -> [CacheFamily; 6] {
        [
            Self::EmployeeByEmail,
            Self::DepartmentHierarchy,
            Self::ShiftByName,
            Self::ScheduleAssignments,
            Self::RolePermissions,
            Self::Notification,
        ]
    }

    pub fn prefix(&self) -> &'static str {
        match self {
            Self::EmployeeByEmail => "employee",
            Self::DepartmentHierarchy => "hierarchy",
            Self::ShiftByName => "shift",
            Self::ScheduleAssignments => "schedule",
            Self::RolePermissions => "perm",
            Self::Notification => "notif",
        }
    }

    pub fn ttl(&self) -> Duration {
        match self {
            Self::EmployeeByEmail => Duration::from_secs(600),
            Self::DepartmentHierarchy => Duration::from_secs(1800),
            Self::ShiftByName => Duration::from_secs(600),
            Self::ScheduleAssignments => Duration::from_secs(180),
            Self::RolePermissions => Duration::from_secs(900),
            Self::Notification => Duration::from_secs(60),
        }
    }

    pub fn cap(&self) -> usize {
        match self {
            Self::EmployeeByEmail => 1000,
            Self::DepartmentHierarchy => 200,
            Self::ShiftByName => 500,
            Self::ScheduleAssignments => 500,
            Self::RolePermissions => 20,
            Self::Notification => 500,
        }
    }
}

// ============================================================================
// Statistics
// ============================================================================

/// Counters for one cache family
#[derive(Debug, Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
}

/// Point-in-time statistics for one family
#[derive(Debug, Clone, serde::Serialize)]
pub struct FamilyStats {
    pub family: String,
    pub hits: u64,
    pub misses: u64,
    pub hit_rate: f64,
    pub size: usize,
}

// ============================================================================
// In-process LRU+TTL map
// ============================================================================

struct Entry {
    value: serde_json::Value,
    expires_at: Instant,
    last_access: u64,
}

/// One in-process cache family: TTL per entry, LRU eviction at the cap
struct MemCache {
    entries: Mutex<HashMap<String, Entry>>,
    ttl: Duration,
    cap: usize,
    tick: AtomicU64,
}

impl MemCache {
    fn new(family: CacheFamily) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            ttl: family.ttl(),
            cap: family.cap(),
            tick: AtomicU64::new(0),
        }
    }

    fn get(&self, key: &str) -> Option<serde_json::Value> {
        let tick = self.tick.fetch_add(1, Ordering::Relaxed);
        let mut entries = self.entries.lock();
        match entries.get_mut(key) {
            Some(entry) if entry.expires_at > Instant::now() => {
                entry.last_access = tick;
                Some(entry.value.clone())
            }
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }

    fn put(&self, key: String, value: serde_json::Value) {
        let tick = self.tick.fetch_add(1, Ordering::Relaxed);
        let mut entries = self.entries.lock();

        if entries.len() >= self.cap && !entries.contains_key(&key) {
            // Evict the least recently used entry
            if let Some(lru_key) = entries
                .iter()
                .min_by_key(|(_, e)| e.last_access)
                .map(|(k, _)| k.clone())
            {
                entries.remove(&lru_key);
            }
        }

        entries.insert(
            key,
            Entry {
                value,
                expires_at: Instant::now() + self.ttl,
                last_access: tick,
            },
        );
    }

    fn remove(&self, key: &str) -> bool {
        self.entries.lock().remove(key).is_some()
    }

    fn remove_prefix(&self, prefix: &str) -> usize {
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|k, _| !k.starts_with(prefix));
        before - entries.len()
    }

    fn clear(&self) {
        self.entries.lock().clear();
    }

    fn len(&self) -> usize {
        self.entries.lock().len()
    }
}

// ============================================================================
// Cache Service
// ============================================================================

/// The cache service: in-process families plus an optional Redis backend
pub struct CacheService {
    families: HashMap<CacheFamily, MemCache>,
    counters: HashMap<CacheFamily, Counters>,
    redis: Option<RedisPool>,
    key_prefix: String,
    enabled: bool,
}

impl CacheService {
    /// Build the service, probing Redis when configured
    pub async fn connect(config: &CacheConfig) -> Self {
        let redis = if config.enabled {
            match &config.redis_url {
                Some(url) => match Self::try_redis(url).await {
                    Some(pool) => {
                        tracing::info!(url = %url, "Cache using Redis backend");
                        Some(pool)
                    }
                    None => {
                        tracing::warn!("Redis unavailable, using in-process cache");
                        None
                    }
                },
                None => None,
            }
        } else {
            None
        };

        let mut families = HashMap::new();
        let mut counters = HashMap::new();
        for family in CacheFamily::all() {
            families.insert(family, MemCache::new(family));
            counters.insert(family, Counters::default());
        }

        Self {
            families,
            counters,
            redis,
            key_prefix: config.key_prefix.clone(),
            enabled: config.enabled,
        }
    }

    async fn try_redis(url: &str) -> Option<RedisPool> {
        let pool = RedisPoolConfig::from_url(url)
            .builder()
            .ok()?
            .max_size(8)
            .runtime(Runtime::Tokio1)
            .build()
            .ok()?;

        let mut conn = pool.get().await.ok()?;
        let pong: String = redis::cmd("PING").query_async(&mut *conn).await.ok()?;
        (pong == "PONG").then_some(pool)
    }

    fn full_key(&self, family: CacheFamily, key: &str) -> String {
        format!("{}:{}:{}", self.key_prefix, family.prefix(), key)
    }

    /// Get a cached value, counting the hit or miss
    pub async fn get<T: DeserializeOwned>(&self, family: CacheFamily, key: &str) -> Option<T> {
        if !self.enabled {
            return None;
        }
        let full = self.full_key(family, key);

        let raw = match &self.redis {
            Some(pool) => self.redis_get(pool, &full).await,
            None => self.families.get(&family).and_then(|c| c.get(&full)),
        };

        let counters = self.counters.get(&family)?;
        match raw {
            Some(value) => {
                counters.hits.fetch_add(1, Ordering::Relaxed);
                serde_json::from_value(value).ok()
            }
            None => {
                counters.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    async fn redis_get(&self, pool: &RedisPool, full: &str) -> Option<serde_json::Value> {
        // Backend failures degrade to a miss
        let mut conn = match pool.get().await {
            Ok(conn) => conn,
            Err(e) => {
                tracing::warn!(error = %e, "Redis get degraded to miss");
                return None;
            }
        };
        let bytes: Option<Vec<u8>> = conn.get(full).await.ok()?;
        bytes.and_then(|b| serde_json::from_slice(&b).ok())
    }

    /// Store a value under the family's TTL
    pub async fn put<T: Serialize>(&self, family: CacheFamily, key: &str, value: &T) {
        if !self.enabled {
            return;
        }
        let full = self.full_key(family, key);
        let Ok(json) = serde_json::to_value(value) else {
            return;
        };

        match &self.redis {
            Some(pool) => {
                if let Ok(mut conn) = pool.get().await {
                    let bytes = json.to_string();
                    let _: Result<(), _> = conn
                        .set_ex(&full, bytes, family.ttl().as_secs())
                        .await;
                }
            }
            None => {
                if let Some(cache) = self.families.get(&family) {
                    cache.put(full, json);
                }
            }
        }
    }

    /// Drop one key
    pub async fn invalidate(&self, family: CacheFamily, key: &str) {
        let full = self.full_key(family, key);
        if let Some(cache) = self.families.get(&family) {
            cache.remove(&full);
        }
        if let Some(pool) = &self.redis {
            if let Ok(mut conn) = pool.get().await {
                let _: Result<u64, _> = conn.del(&full).await;
            }
        }
    }

    /// Drop every key in the family matching the prefix (`employee:*` style)
    pub async fn invalidate_pattern(&self, family: CacheFamily, key_prefix: &str) -> u64 {
        let full_prefix = self.full_key(family, key_prefix);
        let mut removed = 0u64;

        if let Some(cache) = self.families.get(&family) {
            removed += cache.remove_prefix(&full_prefix) as u64;
        }
        if let Some(pool) = &self.redis {
            if let Ok(mut conn) = pool.get().await {
                let pattern = format!("{full_prefix}*");
                let keys: Result<Vec<String>, _> = redis::cmd("KEYS")
                    .arg(&pattern)
                    .query_async(&mut *conn)
                    .await;
                if let Ok(keys) = keys {
                    if !keys.is_empty() {
                        removed += keys.len() as u64;
                        let _: Result<u64, _> = conn.del(keys).await;
                    }
                }
            }
        }

        if removed > 0 {
            tracing::debug!(prefix = %full_prefix, count = removed, "Invalidated cache entries");
        }
        removed
    }

    /// Drop an entire family
    pub async fn invalidate_family(&self, family: CacheFamily) -> u64 {
        self.invalidate_pattern(family, "").await
    }

    /// Per-family statistics
    pub fn stats(&self) -> Vec<FamilyStats> {
        CacheFamily::all()
            .iter()
            .map(|family| {
                let counters = &self.counters[family];
                let hits = counters.hits.load(Ordering::Relaxed);
                let misses = counters.misses.load(Ordering::Relaxed);
                let total = hits + misses;
                FamilyStats {
                    family: family.prefix().to_string(),
                    hits,
                    misses,
                    hit_rate: if total == 0 {
                        0.0
                    } else {
                        hits as f64 / total as f64
                    },
                    size: self.families[family].len(),
                }
            })
            .collect()
    }

    pub fn is_distributed(&self) -> bool {
        self.redis.is_some()
    }

    fn clear_all(&self) {
        for cache in self.families.values() {
            cache.clear();
        }
    }
}

// ============================================================================
// Lifecycle
// ============================================================================

lazy_static! {
    static ref CACHE: RwLock<Option<Arc<CacheService>>> = RwLock::new(None);
}

/// Initialize the process-wide cache
pub async fn init(config: &CacheConfig) -> Arc<CacheService> {
    let service = Arc::new(CacheService::connect(config).await);
    *CACHE.write() = Some(service.clone());
    service
}

/// Handle to the process-wide cache, if initialized
pub fn get() -> Option<Arc<CacheService>> {
    CACHE.read().clone()
}

/// Tear down the process-wide cache
pub fn shutdown() {
    if let Some(service) = CACHE.write().take() {
        service.clear_all();
        tracing::info!("Cache shut down");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> CacheConfig {
        CacheConfig {
            enabled: true,
            redis_url: None,
            key_prefix: "test".to_string(),
        }
    }

    #[tokio::test]
    async fn test_put_get_round_trip() {
        let cache = CacheService::connect(&config()).await;
        cache
            .put(CacheFamily::EmployeeByEmail, "a@example.com", &"value-1")
            .await;

        let got: Option<String> = cache.get(CacheFamily::EmployeeByEmail, "a@example.com").await;
        assert_eq!(got.as_deref(), Some("value-1"));
    }

    #[tokio::test]
    async fn test_writer_sees_own_write() {
        let cache = CacheService::connect(&config()).await;
        cache.put(CacheFamily::ShiftByName, "opening", &1u32).await;
        cache.put(CacheFamily::ShiftByName, "opening", &2u32).await;

        let got: Option<u32> = cache.get(CacheFamily::ShiftByName, "opening").await;
        assert_eq!(got, Some(2));
    }

    #[tokio::test]
    async fn test_families_are_namespaced() {
        let cache = CacheService::connect(&config()).await;
        cache.put(CacheFamily::EmployeeByEmail, "k", &"employee").await;
        cache.put(CacheFamily::ShiftByName, "k", &"shift").await;

        let a: Option<String> = cache.get(CacheFamily::EmployeeByEmail, "k").await;
        let b: Option<String> = cache.get(CacheFamily::ShiftByName, "k").await;
        assert_eq!(a.as_deref(), Some("employee"));
        assert_eq!(b.as_deref(), Some("shift"));
    }

    #[tokio::test]
    async fn test_invalidate_single_key() {
        let cache = CacheService::connect(&config()).await;
        cache.put(CacheFamily::Notification, "n1", &"x").await;
        cache.invalidate(CacheFamily::Notification, "n1").await;

        let got: Option<String> = cache.get(CacheFamily::Notification, "n1").await;
        assert!(got.is_none());
    }

    #[tokio::test]
    async fn test_pattern_invalidation() {
        let cache = CacheService::connect(&config()).await;
        cache.put(CacheFamily::ScheduleAssignments, "s1", &1u32).await;
        cache.put(CacheFamily::ScheduleAssignments, "s2", &2u32).await;
        cache.put(CacheFamily::EmployeeByEmail, "s1", &3u32).await;

        let removed = cache
            .invalidate_pattern(CacheFamily::ScheduleAssignments, "s")
            .await;
        assert_eq!(removed, 2);

        // Other families untouched
        let other: Option<u32> = cache.get(CacheFamily::EmployeeByEmail, "s1").await;
        assert_eq!(other, Some(3));
    }

    #[tokio::test]
    async fn test_lru_eviction_at_cap() {
        let cache = CacheService::connect(&config()).await;
        // RolePermissions cap is 20
        for i in 0..20 {
            cache
                .put(CacheFamily::RolePermissions, &format!("role-{i}"), &i)
                .await;
        }
        // Touch role-0 so it is not the LRU entry
        let _: Option<i32> = cache.get(CacheFamily::RolePermissions, "role-0").await;

        cache.put(CacheFamily::RolePermissions, "role-20", &20).await;

        let kept: Option<i32> = cache.get(CacheFamily::RolePermissions, "role-0").await;
        let evicted: Option<i32> = cache.get(CacheFamily::RolePermissions, "role-1").await;
        assert_eq!(kept, Some(0));
        assert!(evicted.is_none());
    }

    #[tokio::test]
    async fn test_stats_track_hits_and_misses() {
        let cache = CacheService::connect(&config()).await;
        cache.put(CacheFamily::EmployeeByEmail, "a", &"v").await;

        let _: Option<String> = cache.get(CacheFamily::EmployeeByEmail, "a").await;
        let _: Option<String> = cache.get(CacheFamily::EmployeeByEmail, "missing").await;

        let stats = cache.stats();
        let employee = stats.iter().find(|s| s.family == "employee").unwrap();
        assert_eq!(employee.hits, 1);
        assert_eq!(employee.misses, 1);
        assert!((employee.hit_rate - 0.5).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn test_disabled_cache_is_passthrough() {
        let cache = CacheService::connect(&CacheConfig {
            enabled: false,
            redis_url: None,
            key_prefix: "test".to_string(),
        })
        .await;

        cache.put(CacheFamily::EmployeeByEmail, "a", &"v").await;
        let got: Option<String> = cache.get(CacheFamily::EmployeeByEmail, "a").await;
        assert!(got.is_none());
    }

    // Integration tests require running Redis
    #[tokio::test]
    #[ignore = "Requires running Redis"]
    async fn test_redis_backend_round_trip() {
        let cache = CacheService::connect(&CacheConfig {
            enabled: true,
            redis_url: Some("redis://localhost:6379".to_string()),
            key_prefix: "rota-test".to_string(),
        })
        .await;
        assert!(cache.is_distributed());

        cache.put(CacheFamily::EmployeeByEmail, "r", &"redis-v").await;
        let got: Option<String> = cache.get(CacheFamily::EmployeeByEmail, "r").await;
        assert_eq!(got.as_deref(), Some("redis-v"));
    }
}
