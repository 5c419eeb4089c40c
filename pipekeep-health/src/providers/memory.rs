//! In-memory read-models
//!
//! Used by tests and by callers that already hold the rollups in memory.
//! Each fake can be switched into a failing mode to exercise degraded reads,
//! and [`FaultyLeadStore`] does the same for individual lead writes.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use pipekeep_common::{Error, Lead, Owner, Result, Touchpoint};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use uuid::Uuid;

use super::{ActivityRollup, OwnerDirectory, SaleEvent, SaleEventSource, TouchpointProvider};
use crate::store::{Guard, LeadFilter, LeadPatch, LeadStore};

fn unavailable(what: &str) -> Error {
    Error::Provider(format!("{} lookup unavailable", what))
}

/// Activity timestamps keyed by lead
#[derive(Debug, Default)]
pub struct InMemoryActivity {
    latest: RwLock<HashMap<Uuid, DateTime<Utc>>>,
    failing: AtomicBool,
}

impl InMemoryActivity {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an engagement; only the latest per lead is kept
    pub fn record(&self, id: Uuid, at: DateTime<Utc>) {
        let mut latest = self.latest.write().unwrap_or_else(|e| e.into_inner());
        let entry = latest.entry(id).or_insert(at);
        if at > *entry {
            *entry = at;
        }
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

#[async_trait]
impl ActivityRollup for InMemoryActivity {
    async fn lookup(&self, ids: &[Uuid]) -> Result<HashMap<Uuid, DateTime<Utc>>> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(unavailable("activity"));
        }
        let latest = self.latest.read().unwrap_or_else(|e| e.into_inner());
        Ok(ids
            .iter()
            .filter_map(|id| latest.get(id).map(|at| (*id, *at)))
            .collect())
    }
}

/// Touchpoints keyed by lead, reported exactly as stored
#[derive(Debug, Default)]
pub struct InMemoryTouchpoints {
    touchpoints: RwLock<HashMap<Uuid, Touchpoint>>,
    failing: AtomicBool,
}

impl InMemoryTouchpoints {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, id: Uuid, touchpoint: Touchpoint) {
        self.touchpoints
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(id, touchpoint);
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

#[async_trait]
impl TouchpointProvider for InMemoryTouchpoints {
    async fn lookup(&self, ids: &[Uuid]) -> Result<HashMap<Uuid, Touchpoint>> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(unavailable("touchpoint"));
        }
        let touchpoints = self.touchpoints.read().unwrap_or_else(|e| e.into_inner());
        Ok(ids
            .iter()
            .filter_map(|id| touchpoints.get(id).map(|t| (*id, *t)))
            .collect())
    }
}

/// Fixed owner list
#[derive(Debug, Default)]
pub struct StaticOwnerDirectory {
    owners: Vec<Owner>,
}

impl StaticOwnerDirectory {
    pub fn new(owners: Vec<Owner>) -> Self {
        Self { owners }
    }
}

#[async_trait]
impl OwnerDirectory for StaticOwnerDirectory {
    async fn owners(&self) -> Result<Vec<Owner>> {
        Ok(self.owners.clone())
    }
}

/// Fixed list of sales, filtered by window on read
#[derive(Debug, Default)]
pub struct StaticSaleEvents {
    sales: Vec<SaleEvent>,
}

impl StaticSaleEvents {
    pub fn new(sales: Vec<SaleEvent>) -> Self {
        Self { sales }
    }
}

#[async_trait]
impl SaleEventSource for StaticSaleEvents {
    async fn sales_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<SaleEvent>> {
        Ok(self
            .sales
            .iter()
            .filter(|s| s.sold_at >= from && s.sold_at < to)
            .cloned()
            .collect())
    }
}

/// Wraps a [`LeadStore`] and rejects writes to selected leads
///
/// Reads always pass through, so a rejected lead stays exactly as it was.
pub struct FaultyLeadStore {
    inner: Arc<dyn LeadStore>,
    failing: RwLock<HashSet<Uuid>>,
}

impl FaultyLeadStore {
    pub fn new(inner: Arc<dyn LeadStore>) -> Self {
        Self {
            inner,
            failing: RwLock::new(HashSet::new()),
        }
    }

    /// Start or stop rejecting writes to `id`
    pub fn set_failing(&self, id: Uuid, failing: bool) {
        let mut set = self.failing.write().unwrap_or_else(|e| e.into_inner());
        if failing {
            set.insert(id);
        } else {
            set.remove(&id);
        }
    }

    fn is_failing(&self, id: &Uuid) -> bool {
        self.failing
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .contains(id)
    }
}

#[async_trait]
impl LeadStore for FaultyLeadStore {
    async fn fetch_by_ids(&self, ids: &[Uuid]) -> Result<Vec<Lead>> {
        self.inner.fetch_by_ids(ids).await
    }

    async fn fetch_filtered(&self, filter: &LeadFilter) -> Result<Vec<Lead>> {
        self.inner.fetch_filtered(filter).await
    }

    async fn apply_if(&self, id: Uuid, guard: Guard, patch: LeadPatch) -> Result<bool> {
        if self.is_failing(&id) {
            return Err(Error::Internal(format!("write to lead {} rejected", id)));
        }
        self.inner.apply_if(id, guard, patch).await
    }
}
