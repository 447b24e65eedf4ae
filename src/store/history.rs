//! History repository
//!
//! Read-only access to the append-only audit tables. Writes happen inside
//! the transactions that change the audited value (see the employee store).

use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use tokio_postgres::Row;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::models::{HistoryEntry, HistoryKind};

use super::page::{decode_cursor, encode_cursor, Page, PageRequest};
use super::Database;

/// Read access to audit history
#[async_trait]
pub trait HistoryStore: Send + Sync {
    /// Cursor-paginated history of one kind for one user, oldest first
    async fn list_for_user(
        &self,
        user_id: Uuid,
        kind: HistoryKind,
        page: &PageRequest,
    ) -> Result<Page<HistoryEntry>>;
}

// ============================================================================
// PostgreSQL Implementation
// ============================================================================

pub struct PgHistoryStore {
    db: Arc<Database>,
}

impl PgHistoryStore {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }
}

fn row_to_entry(row: &Row) -> Result<HistoryEntry> {
    let kind: String = row.get("kind");
    Ok(HistoryEntry {
        id: row.get("id"),
        user_id: row.get("user_id"),
        kind: HistoryKind::parse(&kind)
            .ok_or_else(|| Error::Internal(anyhow::anyhow!("unknown history kind: {kind}")))?,
        old_value: row.get("old_value"),
        new_value: row.get("new_value"),
        changed_by: row.get("changed_by"),
        changed_at: row.get("changed_at"),
        reason: row.get("reason"),
    })
}

#[async_trait]
impl HistoryStore for PgHistoryStore {
    async fn list_for_user(
        &self,
        user_id: Uuid,
        kind: HistoryKind,
        page: &PageRequest,
    ) -> Result<Page<HistoryEntry>> {
        let client = self.db.client().await?;
        let limit = page.limit();

        let rows = match &page.cursor {
            Some(cursor) => {
                let (ts, id) = decode_cursor(cursor)?;
                client
                    .query(
                        &format!(
                            "SELECT * FROM user_history \
                             WHERE user_id = $1 AND kind = $2 AND (changed_at, id) > ($3, $4) \
                             ORDER BY changed_at, id LIMIT {}",
                            limit + 1
                        ),
                        &[&user_id, &kind.as_str(), &ts, &id],
                    )
                    .await
            }
            None => {
                client
                    .query(
                        &format!(
                            "SELECT * FROM user_history WHERE user_id = $1 AND kind = $2 \
                             ORDER BY changed_at, id LIMIT {}",
                            limit + 1
                        ),
                        &[&user_id, &kind.as_str()],
                    )
                    .await
            }
        }
        .context("history list failed")?;

        let mut items: Vec<HistoryEntry> =
            rows.iter().map(row_to_entry).collect::<Result<Vec<_>>>()?;

        let next_cursor = if items.len() as i64 > limit {
            items.truncate(limit as usize);
            items.last().map(|e| encode_cursor(e.changed_at, e.id))
        } else {
            None
        };

        Ok(Page::of(items).with_cursor(next_cursor))
    }
}
