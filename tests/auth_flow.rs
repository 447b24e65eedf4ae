//! Credential lifecycle: password change, lockout, token rotation,
//! rate-limit windows

mod common;

use uuid::Uuid;

use common::employee;
use rota::auth::{EndpointClass, PasswordHasher, RateLimiters, TokenKind, TokenService};
use rota::config::{AuthConfig, RateLimitConfig};
use rota::models::employee::PASSWORD_HISTORY_DEPTH;
use rota::models::Role;
use rota::store::Store;

fn auth_config() -> AuthConfig {
    AuthConfig {
        token_secret: "integration-test-secret-32-bytes".to_string(),
        access_ttl_mins: 15,
        refresh_ttl_days: 30,
        lockout_threshold: 5,
    }
}

// Invariant 4: after a change, the old password fails, the new one works,
// and the new hash differs from the prior five
#[test]
fn password_change_invalidates_old_and_blocks_reuse() {
    let hasher = PasswordHasher::new();
    let mut e = employee("Ann", &[]);
    e.password_hash = hasher.hash_new("Original!1pw").unwrap();

    // Rotate through six new passwords so the original ages out of the
    // five-deep history
    let passwords = [
        "Rotated!1pw",
        "Rotated!2pw",
        "Rotated!3pw",
        "Rotated!4pw",
        "Rotated!5pw",
        "Rotated!6pw",
    ];
    for p in passwords {
        hasher
            .check_reuse(p, &e.password_hash, &e.password_history)
            .unwrap();
        let new_hash = hasher.hash_new(p).unwrap();
        e.rotate_password_hash(new_hash);
    }

    // Old password no longer verifies; the latest does
    assert!(!hasher.verify("Original!1pw", &e.password_hash).unwrap());
    assert!(hasher.verify("Rotated!6pw", &e.password_hash).unwrap());
    assert_eq!(e.password_history.len(), PASSWORD_HISTORY_DEPTH);

    // Reusing any of the last five is rejected
    for p in ["Rotated!2pw", "Rotated!4pw", "Rotated!6pw"] {
        assert!(hasher
            .check_reuse(p, &e.password_hash, &e.password_history)
            .is_err());
    }
    // The original has aged out of the five-deep history
    assert!(hasher
        .check_reuse("Original!1pw", &e.password_hash, &e.password_history)
        .is_ok());
}

// Lockout after K consecutive failures, reset on unlock
#[tokio::test]
async fn account_lockout_and_reset() {
    let store = Store::in_memory();
    let e = employee("Ann", &[]);
    store.employees.create(&e).await.unwrap();

    for attempt in 1..=4 {
        let locked = store.employees.record_login_failure(e.id, 5).await.unwrap();
        assert!(!locked, "locked too early at attempt {attempt}");
    }
    assert!(store.employees.record_login_failure(e.id, 5).await.unwrap());

    store.employees.clear_login_failures(e.id).await.unwrap();
    let fresh = store.employees.get(e.id).await.unwrap().unwrap();
    assert!(!fresh.account_locked);
    assert_eq!(fresh.failed_login_attempts, 0);
}

// Refresh rotation: predecessor dies, logout revokes access
#[test]
fn token_rotation_and_revocation() {
    let tokens = TokenService::new(&auth_config());
    let user = Uuid::new_v4();

    let pair = tokens.issue_pair(user, "ann@example.com", Role::Employee).unwrap();
    let claims = tokens.verify(&pair.access_token, TokenKind::Access).unwrap();
    assert_eq!(claims.sub, user);

    let (_, rotated) = tokens.rotate(&pair.refresh_token).unwrap();
    assert!(tokens.rotate(&pair.refresh_token).is_err());
    assert!(tokens
        .verify(&rotated.refresh_token, TokenKind::Refresh)
        .is_ok());

    tokens.revoke(&claims);
    assert!(tokens.verify(&pair.access_token, TokenKind::Access).is_err());
}

// Invariant 8: the (N+1)-th request in a window fails; a fresh window admits
#[test]
fn rate_limit_window() {
    let limiters = RateLimiters::new(&RateLimitConfig {
        auth_per_min: 3,
        read_per_min: 300,
        write_per_min: 120,
        solver_per_min: 6,
    });

    for _ in 0..3 {
        limiters.check(EndpointClass::Auth, "203.0.113.7").unwrap();
    }
    let err = limiters.check(EndpointClass::Auth, "203.0.113.7").unwrap_err();
    assert_eq!(err.kind(), "rate_limited");
    assert!(err.is_retryable());

    // Another principal is unaffected
    limiters.check(EndpointClass::Auth, "203.0.113.8").unwrap();
}
