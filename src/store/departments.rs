//! Department repository

use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use chrono::Utc;
use tokio_postgres::error::SqlState;
use tokio_postgres::Row;
use uuid::Uuid;

use crate::error::{ConflictKind, Error, Result};
use crate::models::Department;

use super::Database;

/// Repository for the department tree
#[async_trait]
pub trait DepartmentStore: Send + Sync {
    async fn create(&self, department: &Department) -> Result<()>;

    async fn get(&self, id: Uuid) -> Result<Option<Department>>;

    async fn list(&self) -> Result<Vec<Department>>;

    async fn update(&self, department: &Department) -> Result<()>;

    /// Delete a department
    ///
    /// Without `force`, deletion fails when the department still has members
    /// or child departments. With `force`, members are detached and children
    /// re-parented to the deleted node's parent.
    async fn delete(&self, id: Uuid, force: bool) -> Result<bool>;

    /// Active member count, used by the deletion guard
    async fn member_count(&self, id: Uuid) -> Result<i64>;

    async fn child_count(&self, id: Uuid) -> Result<i64>;
}

// ============================================================================
// PostgreSQL Implementation
// ============================================================================

pub struct PgDepartmentStore {
    db: Arc<Database>,
}

impl PgDepartmentStore {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }
}

fn row_to_department(row: &Row) -> Department {
    Department {
        id: row.get("id"),
        name: row.get("name"),
        parent_id: row.get("parent_id"),
        description: row.get("description"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

#[async_trait]
impl DepartmentStore for PgDepartmentStore {
    async fn create(&self, department: &Department) -> Result<()> {
        let client = self.db.client().await?;
        client
            .execute(
                "INSERT INTO departments (id, name, parent_id, description, created_at, updated_at) \
                 VALUES ($1,$2,$3,$4,$5,$6)",
                &[
                    &department.id,
                    &department.name,
                    &department.parent_id,
                    &department.description,
                    &department.created_at,
                    &department.updated_at,
                ],
            )
            .await
            .map_err(|e| {
                if e.code() == Some(&SqlState::UNIQUE_VIOLATION) {
                    Error::conflict(ConflictKind::Duplicate, "department name already exists")
                } else {
                    Error::Internal(anyhow::Error::new(e).context("department insert failed"))
                }
            })?;
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<Department>> {
        let client = self.db.client().await?;
        let row = client
            .query_opt("SELECT * FROM departments WHERE id = $1", &[&id])
            .await
            .context("department lookup failed")?;
        Ok(row.map(|r| row_to_department(&r)))
    }

    async fn list(&self) -> Result<Vec<Department>> {
        let client = self.db.client().await?;
        let rows = client
            .query("SELECT * FROM departments ORDER BY name", &[])
            .await
            .context("department list failed")?;
        Ok(rows.iter().map(row_to_department).collect())
    }

    async fn update(&self, department: &Department) -> Result<()> {
        let client = self.db.client().await?;
        let updated = client
            .execute(
                "UPDATE departments SET name=$2, parent_id=$3, description=$4, updated_at=$5 \
                 WHERE id=$1",
                &[
                    &department.id,
                    &department.name,
                    &department.parent_id,
                    &department.description,
                    &Utc::now(),
                ],
            )
            .await
            .context("department update failed")?;

        if updated == 0 {
            return Err(Error::not_found("department", department.id));
        }
        Ok(())
    }

    async fn delete(&self, id: Uuid, force: bool) -> Result<bool> {
        let mut conn = self.db.client().await?;
        let client: &mut tokio_postgres::Client = &mut conn;
        let tx = client.transaction().await.context("begin transaction")?;

        if force {
            // Detach members and re-parent children before the delete
            let row = tx
                .query_opt("SELECT parent_id FROM departments WHERE id = $1", &[&id])
                .await
                .context("department lookup failed")?;
            let Some(row) = row else {
                return Ok(false);
            };
            let grandparent: Option<Uuid> = row.get(0);

            tx.execute(
                "UPDATE employees SET department_id = NULL WHERE department_id = $1",
                &[&id],
            )
            .await
            .context("member detach failed")?;
            tx.execute(
                "UPDATE departments SET parent_id = $2 WHERE parent_id = $1",
                &[&id, &grandparent],
            )
            .await
            .context("child re-parent failed")?;
        }

        let deleted = tx
            .execute("DELETE FROM departments WHERE id = $1", &[&id])
            .await
            .context("department delete failed")?;

        tx.commit().await.context("commit department delete")?;
        Ok(deleted > 0)
    }

    async fn member_count(&self, id: Uuid) -> Result<i64> {
        let client = self.db.client().await?;
        let row = client
            .query_one(
                "SELECT COUNT(*) FROM employees WHERE department_id = $1 AND is_active",
                &[&id],
            )
            .await
            .context("member count failed")?;
        Ok(row.get(0))
    }

    async fn child_count(&self, id: Uuid) -> Result<i64> {
        let client = self.db.client().await?;
        let row = client
            .query_one("SELECT COUNT(*) FROM departments WHERE parent_id = $1", &[&id])
            .await
            .context("child count failed")?;
        Ok(row.get(0))
    }
}
