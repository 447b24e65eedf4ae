//! Assignment repository
//!
//! The bulk insert path nests a savepoint per row: a unique violation or
//! other per-row failure rolls back only that savepoint, and the outer
//! transaction commits the successful subset.

use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use tokio_postgres::error::SqlState;
use tokio_postgres::Row;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::models::{AssignmentStatus, ScheduleAssignment};

use super::page::{decode_cursor, encode_cursor, Page, PageRequest};
use super::Database;

/// Multi-field filter for assignment listings
#[derive(Debug, Clone, Default)]
pub struct AssignmentFilter {
    pub schedule_id: Option<Uuid>,
    pub employee_id: Option<Uuid>,
    pub shift_id: Option<Uuid>,
    pub status: Option<AssignmentStatus>,
    pub date_from: Option<NaiveDate>,
    pub date_to: Option<NaiveDate>,
}

/// Per-row outcome of a bulk insert
#[derive(Debug)]
pub enum RowOutcome {
    Created(ScheduleAssignment),
    /// The (schedule, employee, shift) tuple already exists
    Duplicate,
    /// Any other per-row failure, with the database's message
    Failed(String),
}

/// Repository for schedule assignments
#[async_trait]
pub trait AssignmentStore: Send + Sync {
    async fn create(&self, assignment: &ScheduleAssignment) -> Result<()>;

    /// Insert many rows with per-item savepoints
    ///
    /// Outcomes are returned in input order; the successful subset commits
    /// even when other rows fail.
    async fn create_bulk(&self, rows: &[ScheduleAssignment]) -> Result<Vec<RowOutcome>>;

    async fn get(&self, id: Uuid) -> Result<Option<ScheduleAssignment>>;

    /// Cursor-paginated listing ordered by (assigned_at, id)
    async fn list(
        &self,
        filter: &AssignmentFilter,
        page: &PageRequest,
    ) -> Result<Page<ScheduleAssignment>>;

    /// All assignments in one schedule (bounded by the weekly shift count)
    async fn list_for_schedule(&self, schedule_id: Uuid) -> Result<Vec<ScheduleAssignment>>;

    /// Non-terminal assignments of one employee across schedules in a date range
    async fn list_for_employee_in_range(
        &self,
        employee_id: Uuid,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<ScheduleAssignment>>;

    async fn update(&self, assignment: &ScheduleAssignment) -> Result<()>;

    async fn delete(&self, id: Uuid) -> Result<bool>;

    /// Whether the employee has assignments for shifts on or after `date`
    async fn has_future_assignments(&self, employee_id: Uuid, date: NaiveDate) -> Result<bool>;

    /// Assignments awaiting a response whose window opened before `cutoff`
    async fn list_expired_pending(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<ScheduleAssignment>>;
}

// ============================================================================
// PostgreSQL Implementation
// ============================================================================

pub struct PgAssignmentStore {
    db: Arc<Database>,
}

impl PgAssignmentStore {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }
}

const ASSIGNMENT_COLS: &str = "id, schedule_id, employee_id, shift_id, status, priority, notes, \
     decline_reason, assigned_by, assigned_at, conflicts_resolved, auto_assigned, updated_at";

pub(crate) fn row_to_assignment(row: &Row) -> Result<ScheduleAssignment> {
    let status: String = row.get("status");
    let priority: i16 = row.get("priority");

    Ok(ScheduleAssignment {
        id: row.get("id"),
        schedule_id: row.get("schedule_id"),
        employee_id: row.get("employee_id"),
        shift_id: row.get("shift_id"),
        status: AssignmentStatus::parse(&status).ok_or_else(|| {
            Error::Internal(anyhow::anyhow!("unknown assignment status in row: {status}"))
        })?,
        priority: priority as u8,
        notes: row.get("notes"),
        decline_reason: row.get("decline_reason"),
        assigned_by: row.get("assigned_by"),
        assigned_at: row.get("assigned_at"),
        conflicts_resolved: row.get("conflicts_resolved"),
        auto_assigned: row.get("auto_assigned"),
        updated_at: row.get("updated_at"),
    })
}

async fn insert_assignment(
    executor: &impl tokio_postgres::GenericClient,
    a: &ScheduleAssignment,
) -> std::result::Result<(), tokio_postgres::Error> {
    executor
        .execute(
            &format!(
                "INSERT INTO schedule_assignments ({ASSIGNMENT_COLS}) VALUES \
                 ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12,$13)"
            ),
            &[
                &a.id,
                &a.schedule_id,
                &a.employee_id,
                &a.shift_id,
                &a.status.as_str(),
                &(a.priority as i16),
                &a.notes,
                &a.decline_reason,
                &a.assigned_by,
                &a.assigned_at,
                &a.conflicts_resolved,
                &a.auto_assigned,
                &a.updated_at,
            ],
        )
        .await
        .map(|_| ())
}

#[async_trait]
impl AssignmentStore for PgAssignmentStore {
    async fn create(&self, assignment: &ScheduleAssignment) -> Result<()> {
        let client = self.db.client().await?;
        let pg: &tokio_postgres::Client = &client;
        insert_assignment(pg, assignment).await.map_err(|e| {
            if e.code() == Some(&SqlState::UNIQUE_VIOLATION) {
                Error::conflict(
                    crate::error::ConflictKind::Duplicate,
                    "assignment already exists for this schedule/employee/shift",
                )
            } else {
                Error::Internal(anyhow::Error::new(e).context("assignment insert failed"))
            }
        })
    }

    async fn create_bulk(&self, rows: &[ScheduleAssignment]) -> Result<Vec<RowOutcome>> {
        let mut conn = self.db.client().await?;
        let client: &mut tokio_postgres::Client = &mut conn;
        let mut tx = client.transaction().await.context("begin transaction")?;

        let mut outcomes = Vec::with_capacity(rows.len());
        for (i, row) in rows.iter().enumerate() {
            let sp_name = format!("bulk_row_{i}");
            let sp = tx
                .savepoint(sp_name.as_str())
                .await
                .context("savepoint failed")?;

            match insert_assignment(&sp, row).await {
                Ok(()) => {
                    sp.commit().await.context("savepoint release failed")?;
                    outcomes.push(RowOutcome::Created(row.clone()));
                }
                Err(e) => {
                    // Savepoint rolls back on drop; only this row is lost
                    drop(sp);
                    if e.code() == Some(&SqlState::UNIQUE_VIOLATION) {
                        outcomes.push(RowOutcome::Duplicate);
                    } else {
                        outcomes.push(RowOutcome::Failed(e.to_string()));
                    }
                }
            }
        }

        tx.commit().await.context("commit bulk assignment insert")?;
        Ok(outcomes)
    }

    async fn get(&self, id: Uuid) -> Result<Option<ScheduleAssignment>> {
        let client = self.db.client().await?;
        let row = client
            .query_opt(
                &format!("SELECT {ASSIGNMENT_COLS} FROM schedule_assignments WHERE id = $1"),
                &[&id],
            )
            .await
            .context("assignment lookup failed")?;
        row.map(|r| row_to_assignment(&r)).transpose()
    }

    async fn list(
        &self,
        filter: &AssignmentFilter,
        page: &PageRequest,
    ) -> Result<Page<ScheduleAssignment>> {
        let client = self.db.client().await?;

        let status = filter.status.map(|s| s.as_str().to_string());
        // Keyset pagination on (assigned_at, id)
        let (cursor_ts, cursor_id) = match &page.cursor {
            Some(cursor) => {
                let (ts, id) = decode_cursor(cursor)?;
                (Some(ts), Some(id))
            }
            None => (None, None),
        };
        let limit = page.limit();

        // Fetch one extra row to decide whether a next page exists
        let rows = client
            .query(
                &format!(
                    "SELECT {} FROM schedule_assignments a \
                     JOIN shifts s ON s.id = a.shift_id \
                     WHERE ($1::uuid IS NULL OR a.schedule_id = $1) \
                       AND ($2::uuid IS NULL OR a.employee_id = $2) \
                       AND ($3::uuid IS NULL OR a.shift_id = $3) \
                       AND ($4::text IS NULL OR a.status = $4) \
                       AND ($5::date IS NULL OR s.date >= $5) \
                       AND ($6::date IS NULL OR s.date <= $6) \
                       AND ($7::timestamptz IS NULL OR (a.assigned_at, a.id) > ($7, $8::uuid)) \
                     ORDER BY a.assigned_at, a.id LIMIT {}",
                    ASSIGNMENT_COLS
                        .split(", ")
                        .map(|c| format!("a.{c}"))
                        .collect::<Vec<_>>()
                        .join(", "),
                    limit + 1
                ),
                &[
                    &filter.schedule_id,
                    &filter.employee_id,
                    &filter.shift_id,
                    &status,
                    &filter.date_from,
                    &filter.date_to,
                    &cursor_ts,
                    &cursor_id,
                ],
            )
            .await
            .context("assignment list failed")?;

        let mut items: Vec<ScheduleAssignment> = rows
            .iter()
            .map(row_to_assignment)
            .collect::<Result<Vec<_>>>()?;

        let next_cursor = if items.len() as i64 > limit {
            items.truncate(limit as usize);
            items.last().map(|a| encode_cursor(a.assigned_at, a.id))
        } else {
            None
        };

        Ok(Page::of(items).with_cursor(next_cursor))
    }

    async fn list_for_schedule(&self, schedule_id: Uuid) -> Result<Vec<ScheduleAssignment>> {
        let client = self.db.client().await?;
        let rows = client
            .query(
                &format!(
                    "SELECT {ASSIGNMENT_COLS} FROM schedule_assignments \
                     WHERE schedule_id = $1 ORDER BY assigned_at, id"
                ),
                &[&schedule_id],
            )
            .await
            .context("schedule assignment list failed")?;
        rows.iter().map(row_to_assignment).collect()
    }

    async fn list_for_employee_in_range(
        &self,
        employee_id: Uuid,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<ScheduleAssignment>> {
        let client = self.db.client().await?;
        let rows = client
            .query(
                &format!(
                    "SELECT {} FROM schedule_assignments a \
                     JOIN shifts s ON s.id = a.shift_id \
                     WHERE a.employee_id = $1 AND s.date >= $2 AND s.date <= $3 \
                       AND a.status NOT IN ('declined', 'cancelled') \
                     ORDER BY s.date",
                    ASSIGNMENT_COLS
                        .split(", ")
                        .map(|c| format!("a.{c}"))
                        .collect::<Vec<_>>()
                        .join(", ")
                ),
                &[&employee_id, &from, &to],
            )
            .await
            .context("employee assignment range query failed")?;
        rows.iter().map(row_to_assignment).collect()
    }

    async fn update(&self, assignment: &ScheduleAssignment) -> Result<()> {
        let client = self.db.client().await?;
        let updated = client
            .execute(
                "UPDATE schedule_assignments SET status=$2, priority=$3, notes=$4, \
                 decline_reason=$5, conflicts_resolved=$6, updated_at=$7 WHERE id=$1",
                &[
                    &assignment.id,
                    &assignment.status.as_str(),
                    &(assignment.priority as i16),
                    &assignment.notes,
                    &assignment.decline_reason,
                    &assignment.conflicts_resolved,
                    &Utc::now(),
                ],
            )
            .await
            .context("assignment update failed")?;

        if updated == 0 {
            return Err(Error::not_found("assignment", assignment.id));
        }
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> Result<bool> {
        let client = self.db.client().await?;
        let deleted = client
            .execute("DELETE FROM schedule_assignments WHERE id = $1", &[&id])
            .await
            .context("assignment delete failed")?;
        Ok(deleted > 0)
    }

    async fn has_future_assignments(&self, employee_id: Uuid, date: NaiveDate) -> Result<bool> {
        let client = self.db.client().await?;
        let row = client
            .query_one(
                "SELECT EXISTS( \
                   SELECT 1 FROM schedule_assignments a \
                   JOIN shifts s ON s.id = a.shift_id \
                   WHERE a.employee_id = $1 AND s.date >= $2 \
                     AND a.status NOT IN ('declined', 'cancelled', 'completed'))",
                &[&employee_id, &date],
            )
            .await
            .context("future assignment check failed")?;
        Ok(row.get(0))
    }

    async fn list_expired_pending(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<ScheduleAssignment>> {
        let client = self.db.client().await?;
        let rows = client
            .query(
                &format!(
                    "SELECT {ASSIGNMENT_COLS} FROM schedule_assignments \
                     WHERE status IN ('assigned', 'pending') AND assigned_at < $1"
                ),
                &[&cutoff],
            )
            .await
            .context("expired pending query failed")?;
        rows.iter().map(row_to_assignment).collect()
    }
}
