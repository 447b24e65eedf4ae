//! Shift repository

use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use tokio_postgres::Row;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::models::{Shift, ShiftType, TimeWindow};

use super::page::{Page, PageRequest};
use super::Database;

/// Multi-field filter for shift listings
#[derive(Debug, Clone, Default)]
pub struct ShiftFilter {
    pub date_from: Option<NaiveDate>,
    pub date_to: Option<NaiveDate>,
    pub department_id: Option<Uuid>,
    pub shift_type: Option<ShiftType>,
}

/// Repository for shift records
#[async_trait]
pub trait ShiftStore: Send + Sync {
    async fn create(&self, shift: &Shift) -> Result<()>;

    /// All-or-nothing bulk insert in one transaction
    async fn create_bulk(&self, shifts: &[Shift]) -> Result<()>;

    async fn get(&self, id: Uuid) -> Result<Option<Shift>>;

    async fn get_many(&self, ids: &[Uuid]) -> Result<Vec<Shift>>;

    async fn list(&self, filter: &ShiftFilter, page: &PageRequest) -> Result<Page<Shift>>;

    /// Shifts within a date range, for solver snapshots
    async fn list_in_range(
        &self,
        from: NaiveDate,
        to: NaiveDate,
        department_id: Option<Uuid>,
    ) -> Result<Vec<Shift>>;

    async fn update(&self, shift: &Shift) -> Result<()>;

    /// Delete; blocked while assignments reference the shift unless forced
    async fn delete(&self, id: Uuid, force: bool) -> Result<bool>;

    /// Number of assignments referencing this shift
    async fn assignment_count(&self, id: Uuid) -> Result<i64>;
}

// ============================================================================
// PostgreSQL Implementation
// ============================================================================

pub struct PgShiftStore {
    db: Arc<Database>,
}

impl PgShiftStore {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }
}

const SHIFT_COLS: &str = "id, date, start_time, end_time, shift_type, department_id, \
     required_staff, priority, requirements, overnight, notes, created_at, updated_at";

pub(crate) fn row_to_shift(row: &Row) -> Result<Shift> {
    let shift_type: String = row.get("shift_type");
    let requirements: Vec<String> = row.get("requirements");
    let required_staff: i32 = row.get("required_staff");
    let priority: i16 = row.get("priority");

    Ok(Shift {
        id: row.get("id"),
        date: row.get("date"),
        window: TimeWindow {
            start: row.get("start_time"),
            end: row.get("end_time"),
        },
        shift_type: ShiftType::parse(&shift_type).ok_or_else(|| {
            Error::Internal(anyhow::anyhow!("unknown shift type in row: {shift_type}"))
        })?,
        department_id: row.get("department_id"),
        required_staff: required_staff as u32,
        priority: priority as u8,
        requirements: requirements.into_iter().collect(),
        overnight: row.get("overnight"),
        notes: row.get("notes"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

async fn insert_shift(
    executor: &impl tokio_postgres::GenericClient,
    shift: &Shift,
) -> Result<()> {
    let requirements: Vec<String> = shift.requirements.iter().cloned().collect();
    executor
        .execute(
            &format!(
                "INSERT INTO shifts ({SHIFT_COLS}) VALUES \
                 ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12,$13)"
            ),
            &[
                &shift.id,
                &shift.date,
                &shift.window.start,
                &shift.window.end,
                &shift.shift_type.as_str(),
                &shift.department_id,
                &(shift.required_staff as i32),
                &(shift.priority as i16),
                &requirements,
                &shift.overnight,
                &shift.notes,
                &shift.created_at,
                &shift.updated_at,
            ],
        )
        .await
        .context("shift insert failed")?;
    Ok(())
}

#[async_trait]
impl ShiftStore for PgShiftStore {
    async fn create(&self, shift: &Shift) -> Result<()> {
        let client = self.db.client().await?;
        let pg: &tokio_postgres::Client = &client;
        insert_shift(pg, shift).await
    }

    async fn create_bulk(&self, shifts: &[Shift]) -> Result<()> {
        let mut conn = self.db.client().await?;
        let client: &mut tokio_postgres::Client = &mut conn;
        let tx = client.transaction().await.context("begin transaction")?;
        for shift in shifts {
            insert_shift(&tx, shift).await?;
        }
        tx.commit().await.context("commit bulk shift insert")?;
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<Shift>> {
        let client = self.db.client().await?;
        let row = client
            .query_opt(
                &format!("SELECT {SHIFT_COLS} FROM shifts WHERE id = $1"),
                &[&id],
            )
            .await
            .context("shift lookup failed")?;
        row.map(|r| row_to_shift(&r)).transpose()
    }

    async fn get_many(&self, ids: &[Uuid]) -> Result<Vec<Shift>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let client = self.db.client().await?;
        let rows = client
            .query(
                &format!("SELECT {SHIFT_COLS} FROM shifts WHERE id = ANY($1)"),
                &[&ids],
            )
            .await
            .context("shift bulk fetch failed")?;
        rows.iter().map(row_to_shift).collect()
    }

    async fn list(&self, filter: &ShiftFilter, page: &PageRequest) -> Result<Page<Shift>> {
        let client = self.db.client().await?;
        let shift_type = filter.shift_type.map(|t| t.as_str().to_string());

        const WHERE: &str = "($1::date IS NULL OR date >= $1) \
             AND ($2::date IS NULL OR date <= $2) \
             AND ($3::uuid IS NULL OR department_id = $3) \
             AND ($4::text IS NULL OR shift_type = $4)";

        let rows = client
            .query(
                &format!(
                    "SELECT {SHIFT_COLS} FROM shifts WHERE {WHERE} \
                     ORDER BY date, start_time LIMIT {} OFFSET {}",
                    page.limit(),
                    page.offset()
                ),
                &[
                    &filter.date_from,
                    &filter.date_to,
                    &filter.department_id,
                    &shift_type,
                ],
            )
            .await
            .context("shift list failed")?;
        let total: i64 = client
            .query_one(
                &format!("SELECT COUNT(*) FROM shifts WHERE {WHERE}"),
                &[
                    &filter.date_from,
                    &filter.date_to,
                    &filter.department_id,
                    &shift_type,
                ],
            )
            .await
            .context("shift count failed")?
            .get(0);

        let items: Result<Vec<Shift>> = rows.iter().map(row_to_shift).collect();
        Ok(Page::of(items?).with_total(total))
    }

    async fn list_in_range(
        &self,
        from: NaiveDate,
        to: NaiveDate,
        department_id: Option<Uuid>,
    ) -> Result<Vec<Shift>> {
        let client = self.db.client().await?;
        let rows = match department_id {
            Some(dept) => {
                client
                    .query(
                        &format!(
                            "SELECT {SHIFT_COLS} FROM shifts \
                             WHERE date >= $1 AND date <= $2 AND department_id = $3 \
                             ORDER BY date, start_time"
                        ),
                        &[&from, &to, &dept],
                    )
                    .await
            }
            None => {
                client
                    .query(
                        &format!(
                            "SELECT {SHIFT_COLS} FROM shifts \
                             WHERE date >= $1 AND date <= $2 ORDER BY date, start_time"
                        ),
                        &[&from, &to],
                    )
                    .await
            }
        }
        .context("shift range query failed")?;

        rows.iter().map(row_to_shift).collect()
    }

    async fn update(&self, shift: &Shift) -> Result<()> {
        let client = self.db.client().await?;
        let requirements: Vec<String> = shift.requirements.iter().cloned().collect();
        let updated = client
            .execute(
                "UPDATE shifts SET date=$2, start_time=$3, end_time=$4, shift_type=$5, \
                 department_id=$6, required_staff=$7, priority=$8, requirements=$9, \
                 overnight=$10, notes=$11, updated_at=$12 WHERE id=$1",
                &[
                    &shift.id,
                    &shift.date,
                    &shift.window.start,
                    &shift.window.end,
                    &shift.shift_type.as_str(),
                    &shift.department_id,
                    &(shift.required_staff as i32),
                    &(shift.priority as i16),
                    &requirements,
                    &shift.overnight,
                    &shift.notes,
                    &Utc::now(),
                ],
            )
            .await
            .context("shift update failed")?;

        if updated == 0 {
            return Err(Error::not_found("shift", shift.id));
        }
        Ok(())
    }

    async fn delete(&self, id: Uuid, force: bool) -> Result<bool> {
        let mut conn = self.db.client().await?;
        let client: &mut tokio_postgres::Client = &mut conn;
        let tx = client.transaction().await.context("begin transaction")?;

        if force {
            tx.execute(
                "DELETE FROM schedule_assignments WHERE shift_id = $1",
                &[&id],
            )
            .await
            .context("assignment cleanup failed")?;
        }

        let deleted = tx
            .execute("DELETE FROM shifts WHERE id = $1", &[&id])
            .await
            .context("shift delete failed")?;

        tx.commit().await.context("commit shift delete")?;
        Ok(deleted > 0)
    }

    async fn assignment_count(&self, id: Uuid) -> Result<i64> {
        let client = self.db.client().await?;
        let row = client
            .query_one(
                "SELECT COUNT(*) FROM schedule_assignments WHERE shift_id = $1",
                &[&id],
            )
            .await
            .context("assignment count failed")?;
        Ok(row.get(0))
    }
}
