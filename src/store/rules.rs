//! Rule repository

use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use tokio_postgres::Row;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::models::{Rule, RulePayload, RuleType};

use super::Database;

/// Repository for scheduling rules
#[async_trait]
pub trait RuleStore: Send + Sync {
    async fn create(&self, rule: &Rule) -> Result<()>;

    async fn get(&self, id: Uuid) -> Result<Option<Rule>>;

    async fn list(&self, rule_type: Option<RuleType>, active_only: bool) -> Result<Vec<Rule>>;

    /// Active rules only, for solver snapshots
    async fn list_active(&self) -> Result<Vec<Rule>>;

    async fn update(&self, rule: &Rule) -> Result<()>;

    async fn delete(&self, id: Uuid) -> Result<bool>;
}

// ============================================================================
// PostgreSQL Implementation
// ============================================================================

pub struct PgRuleStore {
    db: Arc<Database>,
}

impl PgRuleStore {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }
}

fn row_to_rule(row: &Row) -> Result<Rule> {
    let rule_type: String = row.get("rule_type");
    let payload: serde_json::Value = row.get("payload");
    let priority: i16 = row.get("priority");

    Ok(Rule {
        id: row.get("id"),
        rule_type: RuleType::parse(&rule_type).ok_or_else(|| {
            Error::Internal(anyhow::anyhow!("unknown rule type in row: {rule_type}"))
        })?,
        employee_id: row.get("employee_id"),
        priority: priority as u8,
        active: row.get("active"),
        source_text: row.get("source_text"),
        payload: serde_json::from_value::<RulePayload>(payload).context("bad rule payload")?,
        created_at: row.get("created_at"),
    })
}

#[async_trait]
impl RuleStore for PgRuleStore {
    async fn create(&self, rule: &Rule) -> Result<()> {
        let client = self.db.client().await?;
        let payload = serde_json::to_value(&rule.payload).context("serialize rule payload")?;
        client
            .execute(
                "INSERT INTO rules (id, rule_type, employee_id, priority, active, source_text, \
                 payload, created_at) VALUES ($1,$2,$3,$4,$5,$6,$7,$8)",
                &[
                    &rule.id,
                    &rule.rule_type.as_str(),
                    &rule.employee_id,
                    &(rule.priority as i16),
                    &rule.active,
                    &rule.source_text,
                    &payload,
                    &rule.created_at,
                ],
            )
            .await
            .context("rule insert failed")?;
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<Rule>> {
        let client = self.db.client().await?;
        let row = client
            .query_opt("SELECT * FROM rules WHERE id = $1", &[&id])
            .await
            .context("rule lookup failed")?;
        row.map(|r| row_to_rule(&r)).transpose()
    }

    async fn list(&self, rule_type: Option<RuleType>, active_only: bool) -> Result<Vec<Rule>> {
        let client = self.db.client().await?;
        let rows = match rule_type {
            Some(rt) => {
                client
                    .query(
                        "SELECT * FROM rules WHERE rule_type = $1 AND (NOT $2 OR active) \
                         ORDER BY priority DESC, created_at",
                        &[&rt.as_str(), &active_only],
                    )
                    .await
            }
            None => {
                client
                    .query(
                        "SELECT * FROM rules WHERE (NOT $1 OR active) \
                         ORDER BY priority DESC, created_at",
                        &[&active_only],
                    )
                    .await
            }
        }
        .context("rule list failed")?;

        rows.iter().map(row_to_rule).collect()
    }

    async fn list_active(&self) -> Result<Vec<Rule>> {
        self.list(None, true).await
    }

    async fn update(&self, rule: &Rule) -> Result<()> {
        let client = self.db.client().await?;
        let payload = serde_json::to_value(&rule.payload).context("serialize rule payload")?;
        let updated = client
            .execute(
                "UPDATE rules SET priority=$2, active=$3, payload=$4 WHERE id=$1",
                &[&rule.id, &(rule.priority as i16), &rule.active, &payload],
            )
            .await
            .context("rule update failed")?;

        if updated == 0 {
            return Err(Error::not_found("rule", rule.id));
        }
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> Result<bool> {
        let client = self.db.client().await?;
        let deleted = client
            .execute("DELETE FROM rules WHERE id = $1", &[&id])
            .await
            .context("rule delete failed")?;
        Ok(deleted > 0)
    }
}
