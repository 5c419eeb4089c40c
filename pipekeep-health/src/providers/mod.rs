//! Read-models the engine consumes but does not own
//!
//! Activity rollups and touchpoints are computed elsewhere; the engine only
//! queries them for a set of lead ids. Keeping them behind traits lets tests
//! swap in [`memory`] fakes and lets deployments back them with any store.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use pipekeep_common::{Owner, Result, Touchpoint};
use serde::Serialize;
use std::collections::HashMap;
use uuid::Uuid;

use crate::classifier::Signals;

pub mod memory;
pub mod sqlite;

pub use sqlite::{SqliteActivityRollup, SqliteOwnerDirectory, SqliteSaleEvents, SqliteTouchpoints};

/// Most recent recorded engagement per lead
#[async_trait]
pub trait ActivityRollup: Send + Sync {
    /// Leads without any recorded activity are absent from the map
    async fn lookup(&self, ids: &[Uuid]) -> Result<HashMap<Uuid, DateTime<Utc>>>;
}

/// Next scheduled interaction per lead
#[async_trait]
pub trait TouchpointProvider: Send + Sync {
    /// Leads with nothing scheduled are absent from the map
    async fn lookup(&self, ids: &[Uuid]) -> Result<HashMap<Uuid, Touchpoint>>;
}

/// Directory of people who may own leads
#[async_trait]
pub trait OwnerDirectory: Send + Sync {
    async fn owners(&self) -> Result<Vec<Owner>>;
}

/// A lead reaching the won status
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SaleEvent {
    pub lead_id: Uuid,
    pub owner: String,
    pub sold_at: DateTime<Utc>,
}

/// Sales closed inside a time window
#[async_trait]
pub trait SaleEventSource: Send + Sync {
    /// Sales with `from <= sold_at < to`
    async fn sales_between(&self, from: DateTime<Utc>, to: DateTime<Utc>)
        -> Result<Vec<SaleEvent>>;
}

/// Both read-models resolved for one batch of leads
#[derive(Debug, Clone, Default)]
pub struct ReadModels {
    pub activity: HashMap<Uuid, DateTime<Utc>>,
    pub touchpoints: HashMap<Uuid, Touchpoint>,
}

impl ReadModels {
    /// Fetch both lookups concurrently; either failing fails the whole read
    pub async fn fetch(
        activity: &dyn ActivityRollup,
        touchpoints: &dyn TouchpointProvider,
        ids: &[Uuid],
    ) -> Result<Self> {
        if ids.is_empty() {
            return Ok(Self::default());
        }

        let (activity, touchpoints) =
            tokio::try_join!(activity.lookup(ids), touchpoints.lookup(ids))?;

        Ok(Self {
            activity,
            touchpoints,
        })
    }

    pub fn signals(&self, id: &Uuid) -> Signals {
        Signals {
            last_activity_at: self.activity.get(id).copied(),
            touchpoint: self.touchpoints.get(id).copied(),
        }
    }
}
