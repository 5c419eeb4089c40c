//! Collaborators shared by every pass

use chrono::{DateTime, Utc};
use pipekeep_common::{Clock, Result, Thresholds};
use sqlx::SqlitePool;
use std::sync::Arc;
use uuid::Uuid;

use crate::providers::{
    ActivityRollup, OwnerDirectory, ReadModels, SaleEventSource, SqliteActivityRollup,
    SqliteOwnerDirectory, SqliteSaleEvents, SqliteTouchpoints, TouchpointProvider,
};
use crate::store::{LeadStore, SqliteLeadStore};

/// Store, read-models, clock and thresholds for one deployment
///
/// Cheap to clone; every field is shared.
#[derive(Clone)]
pub struct PipelineContext {
    pub store: Arc<dyn LeadStore>,
    pub activity: Arc<dyn ActivityRollup>,
    pub touchpoints: Arc<dyn TouchpointProvider>,
    pub owners: Arc<dyn OwnerDirectory>,
    pub sales: Arc<dyn SaleEventSource>,
    pub clock: Arc<dyn Clock>,
    pub thresholds: Thresholds,
}

impl PipelineContext {
    /// Everything backed by one SQLite database
    pub fn sqlite(db: SqlitePool, clock: Arc<dyn Clock>, thresholds: Thresholds) -> Self {
        Self {
            store: Arc::new(SqliteLeadStore::new(db.clone())),
            activity: Arc::new(SqliteActivityRollup::new(db.clone())),
            touchpoints: Arc::new(SqliteTouchpoints::new(db.clone(), clock.clone())),
            owners: Arc::new(SqliteOwnerDirectory::new(db.clone())),
            sales: Arc::new(SqliteSaleEvents::new(db)),
            clock,
            thresholds,
        }
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Activity and touchpoint data for exactly these leads
    pub async fn read_models(&self, ids: &[Uuid]) -> Result<ReadModels> {
        ReadModels::fetch(self.activity.as_ref(), self.touchpoints.as_ref(), ids).await
    }
}
