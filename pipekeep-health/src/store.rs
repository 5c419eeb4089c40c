//! Lead store: batch reads and compare-and-set writes
//!
//! There is no locking anywhere in the engine. Every state transition goes
//! through [`LeadStore::apply_if`], which writes only when the guarded field
//! still holds the expected value, and reports whether a row was touched.
//! Each patch is a single UPDATE statement, so all of its fields commit
//! together or not at all. Warn and Evict additionally require the lead to be
//! owned and in a seller-working status at write time.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use pipekeep_common::db::{lead_from_row, LEAD_COLUMNS};
use pipekeep_common::{Lead, PipelineStatus, Result, UNASSIGNED_OWNER};
use sqlx::{QueryBuilder, Sqlite, SqlitePool};
use uuid::Uuid;

/// Annotation appended to a lead's notes when it is reclaimed
pub const EVICTION_NOTE: &str = "[pipeline health] Reclaimed after inactivity warning expired; \
     returned to the unassigned pool.";

/// Keeps IN lists well under SQLite's bound-parameter limit
const MAX_IDS_PER_QUERY: usize = 500;

/// Expected current value of a field, checked atomically with the write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Guard {
    WarningSent(bool),
}

impl Guard {
    fn push_condition(&self, qb: &mut QueryBuilder<'_, Sqlite>) {
        match self {
            Guard::WarningSent(expected) => {
                qb.push(" AND warning_sent = ");
                qb.push_bind(*expected);
            }
        }
    }
}

/// Field changes a transition pass may apply
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeadPatch {
    /// Mark the owner as warned at `at`
    Warn { at: DateTime<Utc> },
    /// Drop a warning that no longer applies
    ClearWarning,
    /// Reclaim ownership into the unassigned pool
    Evict { at: DateTime<Utc> },
}

impl LeadPatch {
    /// Warn and Evict only ever apply to owned leads in a seller-working status.
    /// The condition rides in the same UPDATE as the write.
    fn push_scope(&self, qb: &mut QueryBuilder<'_, Sqlite>) {
        match self {
            LeadPatch::Warn { .. } | LeadPatch::Evict { .. } => {
                qb.push(" AND owner <> ");
                qb.push_bind(UNASSIGNED_OWNER);
                qb.push(" AND status IN (");
                let mut separated = qb.separated(", ");
                for status in PipelineStatus::SELLER_WORKING {
                    separated.push_bind(status.as_str());
                }
                separated.push_unseparated(")");
            }
            LeadPatch::ClearWarning => {}
        }
    }
}

/// Which owners a filtered read should return
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum OwnerFilter {
    #[default]
    Any,
    /// Anyone but the unassigned sentinel
    Assigned,
    Named(String),
}

/// Predicate for [`LeadStore::fetch_filtered`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LeadFilter {
    /// `None` means every status
    pub statuses: Option<Vec<PipelineStatus>>,
    pub owner: OwnerFilter,
    pub warned_only: bool,
}

impl LeadFilter {
    /// Owned leads in a seller-working status
    pub fn seller_working() -> Self {
        Self {
            statuses: Some(PipelineStatus::SELLER_WORKING.to_vec()),
            owner: OwnerFilter::Assigned,
            warned_only: false,
        }
    }

    /// Every lead currently carrying a warning
    pub fn warned() -> Self {
        Self {
            warned_only: true,
            ..Self::default()
        }
    }

    /// Every lead with a named owner, any status
    pub fn assigned() -> Self {
        Self {
            owner: OwnerFilter::Assigned,
            ..Self::default()
        }
    }

    pub fn for_owner(mut self, owner: impl Into<String>) -> Self {
        self.owner = OwnerFilter::Named(owner.into());
        self
    }
}

/// Shared lead storage
#[async_trait]
pub trait LeadStore: Send + Sync {
    /// Current state of exactly these leads; unknown ids are skipped
    async fn fetch_by_ids(&self, ids: &[Uuid]) -> Result<Vec<Lead>>;

    async fn fetch_filtered(&self, filter: &LeadFilter) -> Result<Vec<Lead>>;

    /// Apply `patch` only if `guard` holds. Returns whether the lead was updated.
    async fn apply_if(&self, id: Uuid, guard: Guard, patch: LeadPatch) -> Result<bool>;
}

/// [`LeadStore`] over the `leads` table
#[derive(Debug, Clone)]
pub struct SqliteLeadStore {
    db: SqlitePool,
}

impl SqliteLeadStore {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl LeadStore for SqliteLeadStore {
    async fn fetch_by_ids(&self, ids: &[Uuid]) -> Result<Vec<Lead>> {
        let mut leads = Vec::with_capacity(ids.len());

        for chunk in ids.chunks(MAX_IDS_PER_QUERY) {
            let mut qb = QueryBuilder::<Sqlite>::new(format!(
                "SELECT {} FROM leads WHERE guid IN (",
                LEAD_COLUMNS
            ));
            let mut separated = qb.separated(", ");
            for id in chunk {
                separated.push_bind(id.to_string());
            }
            separated.push_unseparated(")");

            let rows = qb.build().fetch_all(&self.db).await?;
            for row in &rows {
                leads.push(lead_from_row(row)?);
            }
        }

        Ok(leads)
    }

    async fn fetch_filtered(&self, filter: &LeadFilter) -> Result<Vec<Lead>> {
        let mut qb = QueryBuilder::<Sqlite>::new(format!(
            "SELECT {} FROM leads WHERE 1 = 1",
            LEAD_COLUMNS
        ));

        if let Some(statuses) = &filter.statuses {
            if statuses.is_empty() {
                return Ok(Vec::new());
            }
            qb.push(" AND status IN (");
            let mut separated = qb.separated(", ");
            for status in statuses {
                separated.push_bind(status.as_str());
            }
            separated.push_unseparated(")");
        }

        match &filter.owner {
            OwnerFilter::Any => {}
            OwnerFilter::Assigned => {
                qb.push(" AND owner <> ");
                qb.push_bind(UNASSIGNED_OWNER);
            }
            OwnerFilter::Named(name) => {
                qb.push(" AND owner = ");
                qb.push_bind(name.clone());
            }
        }

        if filter.warned_only {
            qb.push(" AND warning_sent = 1");
        }

        qb.push(" ORDER BY created_at, guid");

        let rows = qb.build().fetch_all(&self.db).await?;
        rows.iter().map(lead_from_row).collect()
    }

    async fn apply_if(&self, id: Uuid, guard: Guard, patch: LeadPatch) -> Result<bool> {
        let mut qb = QueryBuilder::<Sqlite>::new("UPDATE leads SET ");

        match patch {
            LeadPatch::Warn { at } => {
                qb.push("warning_sent = 1, warning_date = ");
                qb.push_bind(at);
            }
            LeadPatch::ClearWarning => {
                qb.push("warning_sent = 0, warning_date = NULL");
            }
            LeadPatch::Evict { at } => {
                qb.push("owner = ");
                qb.push_bind(UNASSIGNED_OWNER);
                qb.push(", status = ");
                qb.push_bind(PipelineStatus::INTAKE.as_str());
                qb.push(", warning_sent = 0, warning_date = NULL");
                qb.push(", notes = CASE WHEN notes = '' THEN ");
                qb.push_bind(EVICTION_NOTE);
                qb.push(" ELSE notes || char(10) || ");
                qb.push_bind(EVICTION_NOTE);
                qb.push(" END, last_update = ");
                qb.push_bind(at);
            }
        }

        qb.push(" WHERE guid = ");
        qb.push_bind(id.to_string());
        guard.push_condition(&mut qb);
        patch.push_scope(&mut qb);

        let result = qb.build().execute(&self.db).await?;
        Ok(result.rows_affected() == 1)
    }
}
