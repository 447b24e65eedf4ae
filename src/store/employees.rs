//! Employee repository

use std::collections::HashSet;
use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use chrono::Utc;
use tokio_postgres::error::SqlState;
use tokio_postgres::Row;
use uuid::Uuid;

use crate::error::{ConflictKind, Error, Result};
use crate::models::{Availability, Employee, HistoryEntry, HistoryKind, Role};

use super::page::{Page, PageRequest};
use super::Database;

/// Multi-field filter for employee listings
#[derive(Debug, Clone, Default)]
pub struct EmployeeFilter {
    /// Case-insensitive substring over name and email
    pub search: Option<String>,
    pub role: Option<Role>,
    pub department_id: Option<Uuid>,
    pub is_active: Option<bool>,
}

/// Repository for employee records
#[async_trait]
pub trait EmployeeStore: Send + Sync {
    async fn create(&self, employee: &Employee) -> Result<()>;

    async fn get(&self, id: Uuid) -> Result<Option<Employee>>;

    async fn get_by_email(&self, email: &str) -> Result<Option<Employee>>;

    /// Bulk fetch preserving no particular order
    async fn get_many(&self, ids: &[Uuid]) -> Result<Vec<Employee>>;

    async fn list(&self, filter: &EmployeeFilter, page: &PageRequest) -> Result<Page<Employee>>;

    /// All active employees, for solver snapshots and name resolution
    async fn list_active(&self) -> Result<Vec<Employee>>;

    /// Update profile and scheduling fields
    async fn update(&self, employee: &Employee) -> Result<()>;

    /// Hard delete; the caller checks for future assignments first
    async fn delete(&self, id: Uuid) -> Result<bool>;

    /// Change role, recording history in the same transaction
    async fn change_role(
        &self,
        id: Uuid,
        new_role: Role,
        changed_by: Uuid,
        reason: Option<String>,
    ) -> Result<HistoryEntry>;

    /// Change active status, recording history in the same transaction
    async fn change_status(
        &self,
        id: Uuid,
        is_active: bool,
        changed_by: Uuid,
        reason: Option<String>,
    ) -> Result<HistoryEntry>;

    /// Change department, recording history in the same transaction
    async fn change_department(
        &self,
        id: Uuid,
        department_id: Option<Uuid>,
        changed_by: Uuid,
        reason: Option<String>,
    ) -> Result<HistoryEntry>;

    /// Increment the failure counter; returns true when the account locked
    async fn record_login_failure(&self, id: Uuid, lockout_threshold: u32) -> Result<bool>;

    /// Reset the failure counter after a successful login or unlock
    async fn clear_login_failures(&self, id: Uuid) -> Result<()>;

    /// Persist a rotated password hash and its history
    async fn set_password(
        &self,
        id: Uuid,
        password_hash: &str,
        password_history: &[String],
        must_change: bool,
    ) -> Result<()>;
}

// ============================================================================
// PostgreSQL Implementation
// ============================================================================

pub struct PgEmployeeStore {
    db: Arc<Database>,
}

impl PgEmployeeStore {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }
}

const EMPLOYEE_COLS: &str = "id, email, password_hash, role, is_active, email_verified, \
     account_locked, failed_login_attempts, password_must_change, department_id, \
     first_name, last_name, phone, hire_date, hourly_rate, max_hours_per_week, \
     qualifications, availability, password_history, created_at, updated_at";

pub(crate) fn row_to_employee(row: &Row) -> Result<Employee> {
    let role: String = row.get("role");
    let qualifications: Vec<String> = row.get("qualifications");
    let availability: serde_json::Value = row.get("availability");

    Ok(Employee {
        id: row.get("id"),
        email: row.get("email"),
        password_hash: row.get("password_hash"),
        role: Role::parse(&role)
            .ok_or_else(|| Error::Internal(anyhow::anyhow!("unknown role in row: {role}")))?,
        is_active: row.get("is_active"),
        email_verified: row.get("email_verified"),
        account_locked: row.get("account_locked"),
        failed_login_attempts: row.get("failed_login_attempts"),
        password_must_change: row.get("password_must_change"),
        department_id: row.get("department_id"),
        first_name: row.get("first_name"),
        last_name: row.get("last_name"),
        phone: row.get("phone"),
        hire_date: row.get("hire_date"),
        hourly_rate: row.get("hourly_rate"),
        max_hours_per_week: row.get("max_hours_per_week"),
        qualifications: qualifications.into_iter().collect(),
        availability: serde_json::from_value::<Availability>(availability)
            .context("bad availability payload")?,
        password_history: row.get("password_history"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

fn map_unique_violation(e: tokio_postgres::Error, what: &str) -> Error {
    if e.code() == Some(&SqlState::UNIQUE_VIOLATION) {
        Error::conflict(ConflictKind::Duplicate, format!("{what} already exists"))
    } else {
        Error::Internal(anyhow::Error::new(e).context("employee write failed"))
    }
}

#[async_trait]
impl EmployeeStore for PgEmployeeStore {
    async fn create(&self, employee: &Employee) -> Result<()> {
        let client = self.db.client().await?;
        let qualifications: Vec<String> = employee.qualifications.iter().cloned().collect();
        let availability =
            serde_json::to_value(&employee.availability).context("serialize availability")?;

        client
            .execute(
                &format!(
                    "INSERT INTO employees ({EMPLOYEE_COLS}) VALUES \
                     ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12,$13,$14,$15,$16,$17,$18,$19,$20,$21)"
                ),
                &[
                    &employee.id,
                    &employee.email,
                    &employee.password_hash,
                    &employee.role.as_str(),
                    &employee.is_active,
                    &employee.email_verified,
                    &employee.account_locked,
                    &employee.failed_login_attempts,
                    &employee.password_must_change,
                    &employee.department_id,
                    &employee.first_name,
                    &employee.last_name,
                    &employee.phone,
                    &employee.hire_date,
                    &employee.hourly_rate,
                    &employee.max_hours_per_week,
                    &qualifications,
                    &availability,
                    &employee.password_history,
                    &employee.created_at,
                    &employee.updated_at,
                ],
            )
            .await
            .map_err(|e| map_unique_violation(e, "email"))?;

        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<Employee>> {
        let client = self.db.client().await?;
        let row = client
            .query_opt(
                &format!("SELECT {EMPLOYEE_COLS} FROM employees WHERE id = $1"),
                &[&id],
            )
            .await
            .context("employee lookup failed")?;

        row.map(|r| row_to_employee(&r)).transpose()
    }

    async fn get_by_email(&self, email: &str) -> Result<Option<Employee>> {
        let client = self.db.client().await?;
        let row = client
            .query_opt(
                &format!("SELECT {EMPLOYEE_COLS} FROM employees WHERE lower(email) = lower($1)"),
                &[&email],
            )
            .await
            .context("employee lookup by email failed")?;

        row.map(|r| row_to_employee(&r)).transpose()
    }

    async fn get_many(&self, ids: &[Uuid]) -> Result<Vec<Employee>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let client = self.db.client().await?;
        let rows = client
            .query(
                &format!("SELECT {EMPLOYEE_COLS} FROM employees WHERE id = ANY($1)"),
                &[&ids],
            )
            .await
            .context("employee bulk fetch failed")?;

        rows.iter().map(row_to_employee).collect()
    }

    async fn list(&self, filter: &EmployeeFilter, page: &PageRequest) -> Result<Page<Employee>> {
        let client = self.db.client().await?;

        let search = filter
            .search
            .as_ref()
            .map(|s| format!("%{}%", s.to_lowercase()));
        let role = filter.role.map(|r| r.as_str().to_string());

        const WHERE: &str = "($1::text IS NULL OR lower(first_name) LIKE $1 \
               OR lower(last_name) LIKE $1 OR lower(email) LIKE $1) \
             AND ($2::text IS NULL OR role = $2) \
             AND ($3::uuid IS NULL OR department_id = $3) \
             AND ($4::boolean IS NULL OR is_active = $4)";

        let rows = client
            .query(
                &format!(
                    "SELECT {EMPLOYEE_COLS} FROM employees WHERE {WHERE} \
                     ORDER BY last_name, first_name LIMIT {} OFFSET {}",
                    page.limit(),
                    page.offset()
                ),
                &[&search, &role, &filter.department_id, &filter.is_active],
            )
            .await
            .context("employee list failed")?;
        let total: i64 = client
            .query_one(
                &format!("SELECT COUNT(*) FROM employees WHERE {WHERE}"),
                &[&search, &role, &filter.department_id, &filter.is_active],
            )
            .await
            .context("employee count failed")?
            .get(0);

        let items: Result<Vec<Employee>> = rows.iter().map(row_to_employee).collect();
        Ok(Page::of(items?).with_total(total))
    }

    async fn list_active(&self) -> Result<Vec<Employee>> {
        let client = self.db.client().await?;
        let rows = client
            .query(
                &format!(
                    "SELECT {EMPLOYEE_COLS} FROM employees WHERE is_active ORDER BY last_name"
                ),
                &[],
            )
            .await
            .context("active employee list failed")?;

        rows.iter().map(row_to_employee).collect()
    }

    async fn update(&self, employee: &Employee) -> Result<()> {
        let client = self.db.client().await?;
        let qualifications: Vec<String> = employee.qualifications.iter().cloned().collect();
        let availability =
            serde_json::to_value(&employee.availability).context("serialize availability")?;

        let updated = client
            .execute(
                "UPDATE employees SET email=$2, first_name=$3, last_name=$4, phone=$5, \
                 hire_date=$6, hourly_rate=$7, max_hours_per_week=$8, qualifications=$9, \
                 availability=$10, email_verified=$11, account_locked=$12, updated_at=$13 \
                 WHERE id=$1",
                &[
                    &employee.id,
                    &employee.email,
                    &employee.first_name,
                    &employee.last_name,
                    &employee.phone,
                    &employee.hire_date,
                    &employee.hourly_rate,
                    &employee.max_hours_per_week,
                    &qualifications,
                    &availability,
                    &employee.email_verified,
                    &employee.account_locked,
                    &Utc::now(),
                ],
            )
            .await
            .map_err(|e| map_unique_violation(e, "email"))?;

        if updated == 0 {
            return Err(Error::not_found("employee", employee.id));
        }
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> Result<bool> {
        let client = self.db.client().await?;
        let deleted = client
            .execute("DELETE FROM employees WHERE id = $1", &[&id])
            .await
            .context("employee delete failed")?;
        Ok(deleted > 0)
    }

    async fn change_role(
        &self,
        id: Uuid,
        new_role: Role,
        changed_by: Uuid,
        reason: Option<String>,
    ) -> Result<HistoryEntry> {
        let mut conn = self.db.client().await?;
        let client: &mut tokio_postgres::Client = &mut conn;
        let tx = client.transaction().await.context("begin transaction")?;

        let row = tx
            .query_opt("SELECT role FROM employees WHERE id = $1 FOR UPDATE", &[&id])
            .await
            .context("role lookup failed")?
            .ok_or_else(|| Error::not_found("employee", id))?;
        let old_role: String = row.get(0);

        tx.execute(
            "UPDATE employees SET role = $2, updated_at = $3 WHERE id = $1",
            &[&id, &new_role.as_str(), &Utc::now()],
        )
        .await
        .context("role update failed")?;

        let mut entry = HistoryEntry::new(id, HistoryKind::Role, old_role, new_role.as_str(), changed_by);
        entry.reason = reason;
        insert_history(&tx, &entry).await?;

        tx.commit().await.context("commit role change")?;
        Ok(entry)
    }

    async fn change_status(
        &self,
        id: Uuid,
        is_active: bool,
        changed_by: Uuid,
        reason: Option<String>,
    ) -> Result<HistoryEntry> {
        let mut conn = self.db.client().await?;
        let client: &mut tokio_postgres::Client = &mut conn;
        let tx = client.transaction().await.context("begin transaction")?;

        let row = tx
            .query_opt(
                "SELECT is_active FROM employees WHERE id = $1 FOR UPDATE",
                &[&id],
            )
            .await
            .context("status lookup failed")?
            .ok_or_else(|| Error::not_found("employee", id))?;
        let old_active: bool = row.get(0);

        tx.execute(
            "UPDATE employees SET is_active = $2, updated_at = $3 WHERE id = $1",
            &[&id, &is_active, &Utc::now()],
        )
        .await
        .context("status update failed")?;

        let mut entry = HistoryEntry::new(
            id,
            HistoryKind::Status,
            status_label(old_active),
            status_label(is_active),
            changed_by,
        );
        entry.reason = reason;
        insert_history(&tx, &entry).await?;

        tx.commit().await.context("commit status change")?;
        Ok(entry)
    }

    async fn change_department(
        &self,
        id: Uuid,
        department_id: Option<Uuid>,
        changed_by: Uuid,
        reason: Option<String>,
    ) -> Result<HistoryEntry> {
        let mut conn = self.db.client().await?;
        let client: &mut tokio_postgres::Client = &mut conn;
        let tx = client.transaction().await.context("begin transaction")?;

        let row = tx
            .query_opt(
                "SELECT department_id FROM employees WHERE id = $1 FOR UPDATE",
                &[&id],
            )
            .await
            .context("department lookup failed")?
            .ok_or_else(|| Error::not_found("employee", id))?;
        let old_dept: Option<Uuid> = row.get(0);

        tx.execute(
            "UPDATE employees SET department_id = $2, updated_at = $3 WHERE id = $1",
            &[&id, &department_id, &Utc::now()],
        )
        .await
        .context("department update failed")?;

        let mut entry = HistoryEntry::new(
            id,
            HistoryKind::Department,
            dept_label(old_dept),
            dept_label(department_id),
            changed_by,
        );
        entry.reason = reason;
        insert_history(&tx, &entry).await?;

        tx.commit().await.context("commit department change")?;
        Ok(entry)
    }

    async fn record_login_failure(&self, id: Uuid, lockout_threshold: u32) -> Result<bool> {
        let client = self.db.client().await?;
        let row = client
            .query_one(
                "UPDATE employees SET \
                   failed_login_attempts = failed_login_attempts + 1, \
                   account_locked = (failed_login_attempts + 1 >= $2), \
                   updated_at = $3 \
                 WHERE id = $1 RETURNING account_locked",
                &[&id, &(lockout_threshold as i32), &Utc::now()],
            )
            .await
            .context("login failure update failed")?;

        Ok(row.get(0))
    }

    async fn clear_login_failures(&self, id: Uuid) -> Result<()> {
        let client = self.db.client().await?;
        client
            .execute(
                "UPDATE employees SET failed_login_attempts = 0, account_locked = FALSE, \
                 updated_at = $2 WHERE id = $1",
                &[&id, &Utc::now()],
            )
            .await
            .context("login failure reset failed")?;
        Ok(())
    }

    async fn set_password(
        &self,
        id: Uuid,
        password_hash: &str,
        password_history: &[String],
        must_change: bool,
    ) -> Result<()> {
        let client = self.db.client().await?;
        let history: Vec<String> = password_history.to_vec();
        let updated = client
            .execute(
                "UPDATE employees SET password_hash = $2, password_history = $3, \
                 password_must_change = $4, updated_at = $5 WHERE id = $1",
                &[&id, &password_hash, &history, &must_change, &Utc::now()],
            )
            .await
            .context("password update failed")?;

        if updated == 0 {
            return Err(Error::not_found("employee", id));
        }
        Ok(())
    }
}

fn status_label(active: bool) -> &'static str {
    if active {
        "active"
    } else {
        "inactive"
    }
}

fn dept_label(dept: Option<Uuid>) -> String {
    dept.map(|d| d.to_string()).unwrap_or_else(|| "none".to_string())
}

/// Insert a history row inside the caller's transaction
///
/// The write must not proceed if this fails; callers bubble the error
/// before commit.
pub(crate) async fn insert_history(
    tx: &tokio_postgres::Transaction<'_>,
    entry: &HistoryEntry,
) -> Result<()> {
    tx.execute(
        "INSERT INTO user_history (id, user_id, kind, old_value, new_value, changed_by, changed_at, reason) \
         VALUES ($1,$2,$3,$4,$5,$6,$7,$8)",
        &[
            &entry.id,
            &entry.user_id,
            &entry.kind.as_str(),
            &entry.old_value,
            &entry.new_value,
            &entry.changed_by,
            &entry.changed_at,
            &entry.reason,
        ],
    )
    .await
    .context("history insert failed")?;
    Ok(())
}
