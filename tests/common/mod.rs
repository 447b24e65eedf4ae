//! Common test fixtures
#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{NaiveDate, NaiveTime, Utc};
use uuid::Uuid;

use rota::auth::Actor;
use rota::broadcast::Broadcaster;
use rota::config::{BroadcastConfig, EngineConfig};
use rota::engine::AssignmentEngine;
use rota::models::{
    Availability, Employee, Role, Schedule, ScheduleStatus, Shift, ShiftType, TimeWindow,
};
use rota::store::Store;

pub fn t(h: u32, m: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(h, m, 0).unwrap()
}

pub fn window(start: u32, end: u32) -> TimeWindow {
    TimeWindow::new(t(start, 0), t(end, 0)).unwrap()
}

/// 2024-03-04 is a Monday
pub fn monday() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 3, 4).unwrap()
}

pub fn employee(name: &str, quals: &[&str]) -> Employee {
    let now = Utc::now();
    Employee {
        id: Uuid::new_v4(),
        email: format!("{}@example.com", name.to_lowercase()),
        password_hash: String::new(),
        role: Role::Employee,
        is_active: true,
        email_verified: true,
        account_locked: false,
        failed_login_attempts: 0,
        password_must_change: false,
        department_id: None,
        first_name: name.to_string(),
        last_name: "Example".to_string(),
        phone: None,
        hire_date: None,
        hourly_rate: 16.0,
        max_hours_per_week: 40.0,
        qualifications: quals.iter().map(|s| s.to_string()).collect(),
        availability: Availability::all_week(window(9, 17)),
        password_history: Vec::new(),
        created_at: now,
        updated_at: now,
    }
}

pub fn shift_with(
    date: NaiveDate,
    start: u32,
    end: u32,
    required_staff: u32,
    requirements: &[&str],
) -> Shift {
    let now = Utc::now();
    Shift {
        id: Uuid::new_v4(),
        date,
        window: window(start, end),
        shift_type: ShiftType::Morning,
        department_id: None,
        required_staff,
        priority: 5,
        requirements: requirements
            .iter()
            .map(|s| s.to_string())
            .collect::<HashSet<_>>(),
        overnight: false,
        notes: None,
        created_at: now,
        updated_at: now,
    }
}

pub fn draft_schedule(created_by: Uuid) -> Schedule {
    let now = Utc::now();
    Schedule {
        id: Uuid::new_v4(),
        week_start: monday(),
        week_end: monday() + chrono::Duration::days(6),
        title: "Test week".to_string(),
        status: ScheduleStatus::Draft,
        created_by,
        approved_by: None,
        version: 1,
        parent_id: None,
        created_at: now,
        updated_at: now,
    }
}

/// An in-memory store, engine, and manager actor wired together
pub struct TestHarness {
    pub store: Store,
    pub engine: AssignmentEngine,
    pub broadcaster: Arc<Broadcaster>,
    pub manager: Actor,
    pub schedule: Schedule,
}

pub async fn harness() -> TestHarness {
    let store = Store::in_memory();
    let broadcaster = Arc::new(Broadcaster::new(&BroadcastConfig {
        replay_buffer: 100,
        heartbeat_secs: 30,
        client_queue: 64,
    }));
    let engine = AssignmentEngine::new(
        store.clone(),
        None,
        broadcaster.clone(),
        EngineConfig {
            confirm_window_hours: 48,
            auto_confirm_after_window: true,
        },
    );

    let manager = Actor::new(Uuid::new_v4(), Role::Manager);
    let schedule = draft_schedule(manager.id);
    store.schedules.create(&schedule).await.unwrap();

    TestHarness {
        store,
        engine,
        broadcaster,
        manager,
        schedule,
    }
}
