//! SQLite-backed read-models

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use pipekeep_common::db::{list_owners, parse_guid};
use pipekeep_common::{Clock, Owner, PipelineStatus, Result, Touchpoint};
use sqlx::{QueryBuilder, Row, Sqlite, SqlitePool};
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

use super::{ActivityRollup, OwnerDirectory, SaleEvent, SaleEventSource, TouchpointProvider};

const MAX_IDS_PER_QUERY: usize = 500;

/// `SELECT ... WHERE <column> IN (ids)` for one chunk of ids
fn select_for_ids<'a>(prefix: &str, column: &str, ids: &[Uuid]) -> QueryBuilder<'a, Sqlite> {
    let mut qb = QueryBuilder::<Sqlite>::new(prefix);
    qb.push(format!(" AND {} IN (", column));
    let mut separated = qb.separated(", ");
    for id in ids {
        separated.push_bind(id.to_string());
    }
    separated.push_unseparated(")");
    qb
}

/// Latest `lead_activities.occurred_at` per lead
#[derive(Debug, Clone)]
pub struct SqliteActivityRollup {
    db: SqlitePool,
}

impl SqliteActivityRollup {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl ActivityRollup for SqliteActivityRollup {
    async fn lookup(&self, ids: &[Uuid]) -> Result<HashMap<Uuid, DateTime<Utc>>> {
        let mut latest: HashMap<Uuid, DateTime<Utc>> = HashMap::new();

        for chunk in ids.chunks(MAX_IDS_PER_QUERY) {
            let mut qb = select_for_ids(
                "SELECT lead_id, occurred_at FROM lead_activities WHERE 1 = 1",
                "lead_id",
                chunk,
            );
            let rows = qb.build().fetch_all(&self.db).await?;

            for row in &rows {
                let lead_id = parse_guid(&row.try_get::<String, _>("lead_id")?)?;
                let occurred_at: DateTime<Utc> = row.try_get("occurred_at")?;
                latest
                    .entry(lead_id)
                    .and_modify(|at| *at = (*at).max(occurred_at))
                    .or_insert(occurred_at);
            }
        }

        Ok(latest)
    }
}

/// The touchpoint each lead points at via `next_touch_id`
///
/// Cancelled touchpoints are ignored. A touchpoint is "future" when it is
/// scheduled at or after the clock's current instant.
#[derive(Clone)]
pub struct SqliteTouchpoints {
    db: SqlitePool,
    clock: Arc<dyn Clock>,
}

impl SqliteTouchpoints {
    pub fn new(db: SqlitePool, clock: Arc<dyn Clock>) -> Self {
        Self { db, clock }
    }
}

#[async_trait]
impl TouchpointProvider for SqliteTouchpoints {
    async fn lookup(&self, ids: &[Uuid]) -> Result<HashMap<Uuid, Touchpoint>> {
        let now = self.clock.now();
        let mut touchpoints = HashMap::new();

        for chunk in ids.chunks(MAX_IDS_PER_QUERY) {
            let mut qb = select_for_ids(
                "SELECT l.guid AS lead_id, t.scheduled_at FROM leads l \
                 JOIN touchpoints t ON t.guid = l.next_touch_id \
                 WHERE t.cancelled = 0",
                "l.guid",
                chunk,
            );
            let rows = qb.build().fetch_all(&self.db).await?;

            for row in &rows {
                let lead_id = parse_guid(&row.try_get::<String, _>("lead_id")?)?;
                let scheduled_at: DateTime<Utc> = row.try_get("scheduled_at")?;
                touchpoints.insert(
                    lead_id,
                    Touchpoint {
                        has_future_touch: scheduled_at >= now,
                        next_touch_at: Some(scheduled_at),
                    },
                );
            }
        }

        Ok(touchpoints)
    }
}

/// Active entries of the `owners` table
#[derive(Debug, Clone)]
pub struct SqliteOwnerDirectory {
    db: SqlitePool,
}

impl SqliteOwnerDirectory {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl OwnerDirectory for SqliteOwnerDirectory {
    async fn owners(&self) -> Result<Vec<Owner>> {
        list_owners(&self.db).await
    }
}

/// Won leads with a closing timestamp
#[derive(Debug, Clone)]
pub struct SqliteSaleEvents {
    db: SqlitePool,
}

impl SqliteSaleEvents {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl SaleEventSource for SqliteSaleEvents {
    async fn sales_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<SaleEvent>> {
        // closed_at is always written as UTC RFC 3339 text, which orders chronologically
        let rows = sqlx::query(
            r#"
            SELECT guid, owner, closed_at FROM leads
            WHERE status = ? AND closed_at >= ? AND closed_at < ?
            ORDER BY closed_at
            "#,
        )
        .bind(PipelineStatus::Won.as_str())
        .bind(from)
        .bind(to)
        .fetch_all(&self.db)
        .await?;

        let mut sales = Vec::with_capacity(rows.len());
        for row in &rows {
            sales.push(SaleEvent {
                lead_id: parse_guid(&row.try_get::<String, _>("guid")?)?,
                owner: row.try_get("owner")?,
                sold_at: row.try_get("closed_at")?,
            });
        }

        Ok(sales)
    }
}
