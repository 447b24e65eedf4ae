//! Schedule repository

use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use tokio_postgres::Row;
use uuid::Uuid;

use crate::error::{ConflictKind, Error, Result};
use crate::models::{Schedule, ScheduleStatus};

use super::page::{Page, PageRequest};
use super::Database;

/// Repository for schedule containers
#[async_trait]
pub trait ScheduleStore: Send + Sync {
    async fn create(&self, schedule: &Schedule) -> Result<()>;

    async fn get(&self, id: Uuid) -> Result<Option<Schedule>>;

    async fn list(&self, week_start: Option<NaiveDate>, page: &PageRequest)
        -> Result<Page<Schedule>>;

    /// Update title and week bounds; only draft/pending schedules accept this
    async fn update(&self, schedule: &Schedule) -> Result<()>;

    /// Transition status with an optimistic version check
    ///
    /// The version bumps on every successful transition. A stale `expected_version`
    /// yields a duplicate-style conflict so the client re-reads.
    async fn transition(
        &self,
        id: Uuid,
        next: ScheduleStatus,
        approved_by: Option<Uuid>,
        expected_version: Option<i32>,
    ) -> Result<Schedule>;

    /// Delete a schedule and, by ownership, its assignments
    async fn delete(&self, id: Uuid) -> Result<bool>;
}

// ============================================================================
// PostgreSQL Implementation
// ============================================================================

pub struct PgScheduleStore {
    db: Arc<Database>,
}

impl PgScheduleStore {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }
}

pub(crate) fn row_to_schedule(row: &Row) -> Result<Schedule> {
    let status: String = row.get("status");
    Ok(Schedule {
        id: row.get("id"),
        week_start: row.get("week_start"),
        week_end: row.get("week_end"),
        title: row.get("title"),
        status: ScheduleStatus::parse(&status).ok_or_else(|| {
            Error::Internal(anyhow::anyhow!("unknown schedule status in row: {status}"))
        })?,
        created_by: row.get("created_by"),
        approved_by: row.get("approved_by"),
        version: row.get("version"),
        parent_id: row.get("parent_id"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

#[async_trait]
impl ScheduleStore for PgScheduleStore {
    async fn create(&self, schedule: &Schedule) -> Result<()> {
        let client = self.db.client().await?;
        client
            .execute(
                "INSERT INTO schedules (id, week_start, week_end, title, status, created_by, \
                 approved_by, version, parent_id, created_at, updated_at) \
                 VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11)",
                &[
                    &schedule.id,
                    &schedule.week_start,
                    &schedule.week_end,
                    &schedule.title,
                    &schedule.status.as_str(),
                    &schedule.created_by,
                    &schedule.approved_by,
                    &schedule.version,
                    &schedule.parent_id,
                    &schedule.created_at,
                    &schedule.updated_at,
                ],
            )
            .await
            .context("schedule insert failed")?;
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<Schedule>> {
        let client = self.db.client().await?;
        let row = client
            .query_opt("SELECT * FROM schedules WHERE id = $1", &[&id])
            .await
            .context("schedule lookup failed")?;
        row.map(|r| row_to_schedule(&r)).transpose()
    }

    async fn list(
        &self,
        week_start: Option<NaiveDate>,
        page: &PageRequest,
    ) -> Result<Page<Schedule>> {
        let client = self.db.client().await?;
        let rows = match week_start {
            Some(start) => {
                client
                    .query(
                        &format!(
                            "SELECT * FROM schedules WHERE week_start = $1 \
                             ORDER BY week_start DESC, version DESC LIMIT {} OFFSET {}",
                            page.limit(),
                            page.offset()
                        ),
                        &[&start],
                    )
                    .await
            }
            None => {
                client
                    .query(
                        &format!(
                            "SELECT * FROM schedules \
                             ORDER BY week_start DESC, version DESC LIMIT {} OFFSET {}",
                            page.limit(),
                            page.offset()
                        ),
                        &[],
                    )
                    .await
            }
        }
        .context("schedule list failed")?;

        let items: Result<Vec<Schedule>> = rows.iter().map(row_to_schedule).collect();
        Ok(Page::of(items?))
    }

    async fn update(&self, schedule: &Schedule) -> Result<()> {
        let client = self.db.client().await?;
        let updated = client
            .execute(
                "UPDATE schedules SET week_start=$2, week_end=$3, title=$4, updated_at=$5 \
                 WHERE id=$1 AND status IN ('draft', 'pending')",
                &[
                    &schedule.id,
                    &schedule.week_start,
                    &schedule.week_end,
                    &schedule.title,
                    &Utc::now(),
                ],
            )
            .await
            .context("schedule update failed")?;

        if updated == 0 {
            // Either missing or frozen; disambiguate for the caller
            return match self.get(schedule.id).await? {
                Some(_) => Err(Error::conflict(
                    ConflictKind::ScheduleNotEditable,
                    "schedule is not in an editable status",
                )),
                None => Err(Error::not_found("schedule", schedule.id)),
            };
        }
        Ok(())
    }

    async fn transition(
        &self,
        id: Uuid,
        next: ScheduleStatus,
        approved_by: Option<Uuid>,
        expected_version: Option<i32>,
    ) -> Result<Schedule> {
        let mut conn = self.db.client().await?;
        let client: &mut tokio_postgres::Client = &mut conn;
        let tx = client.transaction().await.context("begin transaction")?;

        let row = tx
            .query_opt("SELECT * FROM schedules WHERE id = $1 FOR UPDATE", &[&id])
            .await
            .context("schedule lookup failed")?
            .ok_or_else(|| Error::not_found("schedule", id))?;
        let current = row_to_schedule(&row)?;

        if let Some(expected) = expected_version {
            if current.version != expected {
                return Err(Error::conflict(
                    ConflictKind::Duplicate,
                    format!(
                        "version mismatch: expected {expected}, found {}",
                        current.version
                    ),
                ));
            }
        }
        if !current.status.can_transition_to(next) {
            return Err(Error::conflict(
                ConflictKind::ScheduleNotEditable,
                format!("cannot transition {} -> {}", current.status, next),
            ));
        }
        if next == ScheduleStatus::Approved && approved_by.is_none() {
            return Err(Error::validation("approved_by", "required for approval"));
        }

        let row = tx
            .query_one(
                "UPDATE schedules SET status=$2, approved_by=COALESCE($3, approved_by), \
                 version=version+1, updated_at=$4 WHERE id=$1 RETURNING *",
                &[&id, &next.as_str(), &approved_by, &Utc::now()],
            )
            .await
            .context("schedule transition failed")?;
        let updated = row_to_schedule(&row)?;

        tx.commit().await.context("commit schedule transition")?;
        Ok(updated)
    }

    async fn delete(&self, id: Uuid) -> Result<bool> {
        let client = self.db.client().await?;
        // Assignments cascade with the schedule (ownership edge)
        let deleted = client
            .execute("DELETE FROM schedules WHERE id = $1", &[&id])
            .await
            .context("schedule delete failed")?;
        Ok(deleted > 0)
    }
}
