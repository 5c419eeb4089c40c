//! Shared test harness: file-backed SQLite store, fixed clock

#![allow(dead_code)]

use chrono::{DateTime, Duration, TimeZone, Utc};
use pipekeep_common::db::{init_database, insert_lead};
use pipekeep_common::{FixedClock, Lead, PipelineStatus, Thresholds};
use pipekeep_health::store::{LeadFilter, LeadStore};
use pipekeep_health::PipelineContext;
use sqlx::SqlitePool;
use std::sync::Arc;
use tempfile::TempDir;
use uuid::Uuid;

/// Reference instant every scenario is measured from
pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 4, 6, 8, 0, 0).unwrap()
}

/// `t0 + hours`
pub fn h(hours: i64) -> DateTime<Utc> {
    t0() + Duration::hours(hours)
}

pub struct Harness {
    /// Keeps the database file alive for the test
    pub _temp_dir: TempDir,
    pub db: SqlitePool,
    pub clock: Arc<FixedClock>,
    pub ctx: PipelineContext,
}

impl Harness {
    /// Everything backed by a fresh database file, clock stopped at `t0`
    pub async fn new() -> Self {
        let temp_dir = TempDir::new().expect("Should create temp dir");
        let db = init_database(&temp_dir.path().join("pipekeep.db"))
            .await
            .expect("Should initialize database");
        let clock = Arc::new(FixedClock::new(t0()));
        let ctx = PipelineContext::sqlite(db.clone(), clock.clone(), Thresholds::default());

        Self {
            _temp_dir: temp_dir,
            db,
            clock,
            ctx,
        }
    }

    pub fn at(&self, instant: DateTime<Utc>) {
        self.clock.set(instant);
    }

    /// Insert a lead created at `t0`
    pub async fn seed(&self, owner: &str, status: PipelineStatus) -> Lead {
        let mut lead = Lead::new(owner, t0());
        lead.status = status;
        insert_lead(&self.db, &lead).await.expect("Should insert lead");
        lead
    }

    pub async fn reload(&self, id: Uuid) -> Lead {
        self.ctx
            .store
            .fetch_by_ids(&[id])
            .await
            .expect("Should read lead")
            .pop()
            .expect("Lead should exist")
    }

    /// Every lead, ordered by id
    pub async fn snapshot(&self) -> Vec<Lead> {
        let mut leads = self
            .ctx
            .store
            .fetch_filtered(&LeadFilter::default())
            .await
            .expect("Should read leads");
        leads.sort_by_key(|l| l.id);
        leads
    }
}
