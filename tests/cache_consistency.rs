//! Cache consistency: writers observe their own writes, invalidation is
//! immediate, statistics stay truthful

use rota::cache::{CacheFamily, CacheService};
use rota::config::CacheConfig;

fn config() -> CacheConfig {
    CacheConfig {
        enabled: true,
        redis_url: None,
        key_prefix: "itest".to_string(),
    }
}

// Invariant 7: a write followed by a read of the same key observes the write
#[tokio::test]
async fn write_then_read_observes_write() {
    let cache = CacheService::connect(&config()).await;

    for round in 0..10u32 {
        cache
            .put(CacheFamily::EmployeeByEmail, "ann@example.com", &round)
            .await;
        let got: Option<u32> = cache.get(CacheFamily::EmployeeByEmail, "ann@example.com").await;
        assert_eq!(got, Some(round), "stale read after write {round}");
    }
}

#[tokio::test]
async fn invalidation_is_immediate() {
    let cache = CacheService::connect(&config()).await;

    cache.put(CacheFamily::ScheduleAssignments, "sched-1", &"v1").await;
    cache.invalidate(CacheFamily::ScheduleAssignments, "sched-1").await;
    let got: Option<String> = cache.get(CacheFamily::ScheduleAssignments, "sched-1").await;
    assert!(got.is_none());
}

#[tokio::test]
async fn pattern_invalidation_spares_other_families() {
    let cache = CacheService::connect(&config()).await;

    cache.put(CacheFamily::EmployeeByEmail, "ann@example.com", &1u32).await;
    cache.put(CacheFamily::EmployeeByEmail, "ben@example.com", &2u32).await;
    cache.put(CacheFamily::ShiftByName, "opening", &3u32).await;

    let removed = cache.invalidate_pattern(CacheFamily::EmployeeByEmail, "").await;
    assert_eq!(removed, 2);

    let kept: Option<u32> = cache.get(CacheFamily::ShiftByName, "opening").await;
    assert_eq!(kept, Some(3));
}

#[tokio::test]
async fn stats_reflect_traffic() {
    let cache = CacheService::connect(&config()).await;

    cache.put(CacheFamily::Notification, "n1", &"x").await;
    let _: Option<String> = cache.get(CacheFamily::Notification, "n1").await;
    let _: Option<String> = cache.get(CacheFamily::Notification, "n2").await;
    let _: Option<String> = cache.get(CacheFamily::Notification, "n3").await;

    let stats = cache.stats();
    let notif = stats.iter().find(|s| s.family == "notif").unwrap();
    assert_eq!(notif.hits, 1);
    assert_eq!(notif.misses, 2);
    assert_eq!(notif.size, 1);
}
