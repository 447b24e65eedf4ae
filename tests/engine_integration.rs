//! End-to-end assignment engine scenarios over the in-memory store

mod common;

use chrono::Utc;
use uuid::Uuid;

use common::{employee, harness, monday, shift_with};
use rota::auth::Actor;
use rota::engine::NewAssignment;
use rota::models::{AssignmentStatus, Role};
use rota::store::{AssignmentFilter, PageRequest};

fn request(employee_id: Uuid, shift_id: Uuid) -> NewAssignment {
    NewAssignment {
        employee_id,
        shift_id,
        priority: None,
        notes: None,
    }
}

// S2: creating an assignment for an unqualified employee fails with the
// qualification conflict kind
#[tokio::test]
async fn qualification_gate_via_engine() {
    let h = harness().await;
    let cashier = employee("Ann", &["cashier"]);
    let cook = employee("Ben", &["cook"]);
    h.store.employees.create(&cashier).await.unwrap();
    h.store.employees.create(&cook).await.unwrap();

    let s = shift_with(monday(), 9, 13, 1, &["cook"]);
    h.store.shifts.create(&s).await.unwrap();

    let err = h
        .engine
        .create_single(&h.manager, h.schedule.id, request(cashier.id, s.id))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "conflict");
    assert!(err.to_string().contains("qualification"));

    // The qualified employee goes through
    h.engine
        .create_single(&h.manager, h.schedule.id, request(cook.id, s.id))
        .await
        .unwrap();
}

// S3: bulk create of two overlapping shifts yields one created, one
// overlap_conflict, total_created=1, total_errors=1
#[tokio::test]
async fn bulk_overlap_rejection() {
    let h = harness().await;
    let a = employee("Ann", &[]);
    h.store.employees.create(&a).await.unwrap();

    let s1 = shift_with(monday(), 9, 13, 1, &[]);
    let s2 = shift_with(monday(), 12, 16, 1, &[]);
    h.store.shifts.create(&s1).await.unwrap();
    h.store.shifts.create(&s2).await.unwrap();

    let response = h
        .engine
        .create_bulk(
            &h.manager,
            h.schedule.id,
            vec![request(a.id, s1.id), request(a.id, s2.id)],
        )
        .await
        .unwrap();

    assert_eq!(response.total_processed, 2);
    assert_eq!(response.total_created, 1);
    assert_eq!(response.total_errors, 1);
    assert_eq!(response.errors[0].error_kind, "overlap_conflict");
    assert_eq!(response.created[0].shift_id, s1.id);
}

// Invariant 6: duplicate tuples in one batch and across resubmission
#[tokio::test]
async fn bulk_duplicate_idempotence() {
    let h = harness().await;
    let a = employee("Ann", &[]);
    h.store.employees.create(&a).await.unwrap();
    let s = shift_with(monday(), 9, 13, 1, &[]);
    h.store.shifts.create(&s).await.unwrap();

    let batch = vec![request(a.id, s.id), request(a.id, s.id)];

    let first = h
        .engine
        .create_bulk(&h.manager, h.schedule.id, batch.clone())
        .await
        .unwrap();
    assert_eq!(first.total_created, 1);
    assert_eq!(first.total_errors, 1);
    assert_eq!(first.errors[0].error_kind, "duplicate_assignment");

    let second = h
        .engine
        .create_bulk(&h.manager, h.schedule.id, batch)
        .await
        .unwrap();
    assert_eq!(second.total_created, 0);
    assert_eq!(second.total_errors, 2);
    assert!(second
        .errors
        .iter()
        .all(|e| e.error_kind == "duplicate_assignment"));
}

// S5: confirmation works inside the 48h window and is rejected after it
#[tokio::test]
async fn confirm_window_behavior() {
    let h = harness().await;
    let a = employee("Ann", &[]);
    h.store.employees.create(&a).await.unwrap();
    let s = shift_with(monday(), 9, 13, 1, &[]);
    h.store.shifts.create(&s).await.unwrap();

    let assignment = h
        .engine
        .create_single(&h.manager, h.schedule.id, request(a.id, s.id))
        .await
        .unwrap();
    let assignee = Actor::new(a.id, Role::Employee);

    // Fresh assignment: confirm succeeds
    let confirmed = h.engine.confirm(&assignee, assignment.id, None).await.unwrap();
    assert_eq!(confirmed.status, AssignmentStatus::Confirmed);

    // A second assignment aged past the window can no longer be declined
    let s2 = shift_with(monday(), 14, 17, 1, &[]);
    h.store.shifts.create(&s2).await.unwrap();
    let mut late = h
        .engine
        .create_single(&h.manager, h.schedule.id, request(a.id, s2.id))
        .await
        .unwrap();
    late.assigned_at = Utc::now() - chrono::Duration::hours(49);
    h.store.assignments.update(&late).await.unwrap();

    let err = h
        .engine
        .decline(&assignee, late.id, "too late".to_string())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "validation");

    // The sweep auto-confirms it instead
    let swept = h.engine.auto_confirm_sweep().await.unwrap();
    assert_eq!(swept, 1);
    let stored = h.store.assignments.get(late.id).await.unwrap().unwrap();
    assert_eq!(stored.status, AssignmentStatus::Confirmed);
}

// Assignment events publish to the schedule topic after the write
#[tokio::test]
async fn events_follow_writes() {
    let h = harness().await;
    let a = employee("Ann", &[]);
    h.store.employees.create(&a).await.unwrap();
    let s = shift_with(monday(), 9, 13, 1, &[]);
    h.store.shifts.create(&s).await.unwrap();

    let topic = format!("schedule:{}", h.schedule.id);
    let (client, mut rx) = h.broadcaster.connect(Uuid::new_v4());
    h.broadcaster.subscribe(&client, &topic, None);

    h.engine
        .create_single(&h.manager, h.schedule.id, request(a.id, s.id))
        .await
        .unwrap();

    let rota::broadcast::Outbound::Event(event) = rx.recv().await.unwrap() else {
        panic!("expected event");
    };
    assert_eq!(event.kind, "assignment.created");
    assert_eq!(event.seq, 1);
}

// Cursor pagination walks the full assignment set without duplicates
#[tokio::test]
async fn cursor_pagination_is_complete() {
    let h = harness().await;
    let mut all_ids = Vec::new();
    for i in 0..7 {
        let e = employee(&format!("E{i}"), &[]);
        h.store.employees.create(&e).await.unwrap();
        let s = shift_with(monday(), 9, 13, 1, &[]);
        h.store.shifts.create(&s).await.unwrap();
        let created = h
            .engine
            .create_single(&h.manager, h.schedule.id, request(e.id, s.id))
            .await
            .unwrap();
        all_ids.push(created.id);
    }

    let filter = AssignmentFilter {
        schedule_id: Some(h.schedule.id),
        ..Default::default()
    };
    let mut seen = Vec::new();
    let mut cursor = None;
    loop {
        let page = h
            .engine
            .list(
                &filter,
                &PageRequest {
                    limit: Some(3),
                    offset: None,
                    cursor: cursor.clone(),
                },
            )
            .await
            .unwrap();
        seen.extend(page.items.iter().map(|a| a.id));
        match page.next_cursor {
            Some(next) => cursor = Some(next),
            None => break,
        }
    }

    seen.sort();
    all_ids.sort();
    assert_eq!(seen, all_ids);
}

// Deleting a schedule removes its assignments (ownership), never the
// employees or shifts they reference
#[tokio::test]
async fn schedule_delete_cascades_to_assignments_only() {
    let h = harness().await;
    let a = employee("Ann", &[]);
    h.store.employees.create(&a).await.unwrap();
    let s = shift_with(monday(), 9, 13, 1, &[]);
    h.store.shifts.create(&s).await.unwrap();

    let assignment = h
        .engine
        .create_single(&h.manager, h.schedule.id, request(a.id, s.id))
        .await
        .unwrap();

    h.store.schedules.delete(h.schedule.id).await.unwrap();

    assert!(h.store.assignments.get(assignment.id).await.unwrap().is_none());
    assert!(h.store.employees.get(a.id).await.unwrap().is_some());
    assert!(h.store.shifts.get(s.id).await.unwrap().is_some());
}
