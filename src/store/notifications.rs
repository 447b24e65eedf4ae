//! Notification repository

use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use tokio_postgres::Row;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::models::{Notification, NotificationPriority};

use super::page::{Page, PageRequest};
use super::Database;

/// Repository for user notifications
#[async_trait]
pub trait NotificationStore: Send + Sync {
    async fn create(&self, notification: &Notification) -> Result<()>;

    async fn get(&self, id: Uuid) -> Result<Option<Notification>>;

    async fn list_for_recipient(
        &self,
        recipient_id: Uuid,
        unread_only: bool,
        page: &PageRequest,
    ) -> Result<Page<Notification>>;

    async fn mark_read(&self, id: Uuid, recipient_id: Uuid) -> Result<bool>;

    /// Drop notifications past their expiry
    async fn purge_expired(&self) -> Result<u64>;
}

// ============================================================================
// PostgreSQL Implementation
// ============================================================================

pub struct PgNotificationStore {
    db: Arc<Database>,
}

impl PgNotificationStore {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }
}

fn row_to_notification(row: &Row) -> Result<Notification> {
    let priority: String = row.get("priority");
    let actions: serde_json::Value = row.get("actions");

    Ok(Notification {
        id: row.get("id"),
        recipient_id: row.get("recipient_id"),
        category: row.get("category"),
        priority: NotificationPriority::parse(&priority).ok_or_else(|| {
            Error::Internal(anyhow::anyhow!("unknown priority in row: {priority}"))
        })?,
        title: row.get("title"),
        body: row.get("body"),
        is_read: row.get("is_read"),
        created_at: row.get("created_at"),
        expires_at: row.get("expires_at"),
        actions: serde_json::from_value(actions).context("bad actions payload")?,
    })
}

#[async_trait]
impl NotificationStore for PgNotificationStore {
    async fn create(&self, notification: &Notification) -> Result<()> {
        let client = self.db.client().await?;
        let actions =
            serde_json::to_value(&notification.actions).context("serialize actions")?;
        client
            .execute(
                "INSERT INTO notifications (id, recipient_id, category, priority, title, body, \
                 is_read, created_at, expires_at, actions) \
                 VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10)",
                &[
                    &notification.id,
                    &notification.recipient_id,
                    &notification.category,
                    &notification.priority.as_str(),
                    &notification.title,
                    &notification.body,
                    &notification.is_read,
                    &notification.created_at,
                    &notification.expires_at,
                    &actions,
                ],
            )
            .await
            .context("notification insert failed")?;
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<Notification>> {
        let client = self.db.client().await?;
        let row = client
            .query_opt("SELECT * FROM notifications WHERE id = $1", &[&id])
            .await
            .context("notification lookup failed")?;
        row.map(|r| row_to_notification(&r)).transpose()
    }

    async fn list_for_recipient(
        &self,
        recipient_id: Uuid,
        unread_only: bool,
        page: &PageRequest,
    ) -> Result<Page<Notification>> {
        let client = self.db.client().await?;
        let rows = client
            .query(
                &format!(
                    "SELECT * FROM notifications \
                     WHERE recipient_id = $1 AND (NOT $2 OR NOT is_read) \
                       AND (expires_at IS NULL OR expires_at > now()) \
                     ORDER BY created_at DESC LIMIT {} OFFSET {}",
                    page.limit(),
                    page.offset()
                ),
                &[&recipient_id, &unread_only],
            )
            .await
            .context("notification list failed")?;

        let items: Result<Vec<Notification>> = rows.iter().map(row_to_notification).collect();
        Ok(Page::of(items?))
    }

    async fn mark_read(&self, id: Uuid, recipient_id: Uuid) -> Result<bool> {
        let client = self.db.client().await?;
        let updated = client
            .execute(
                "UPDATE notifications SET is_read = TRUE WHERE id = $1 AND recipient_id = $2",
                &[&id, &recipient_id],
            )
            .await
            .context("notification mark-read failed")?;
        Ok(updated > 0)
    }

    async fn purge_expired(&self) -> Result<u64> {
        let client = self.db.client().await?;
        let deleted = client
            .execute(
                "DELETE FROM notifications WHERE expires_at IS NOT NULL AND expires_at <= now()",
                &[],
            )
            .await
            .context("notification purge failed")?;
        Ok(deleted)
    }
}
