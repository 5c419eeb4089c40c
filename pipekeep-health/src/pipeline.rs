//! Pipeline view: what the dashboard shows and where batch candidates come from
//!
//! Loading the view is also a reconciliation trigger. Stale warnings are
//! cleared in memory first so the view is correct even if writing those
//! clears back fails; failed writes are picked up by the next pass.

use chrono::{DateTime, Utc};
use pipekeep_common::time::hours_between;
use pipekeep_common::{Lead, Result};
use serde::Serialize;
use tracing::warn;
use uuid::Uuid;

use crate::classifier::{classify, effective_last_activity, grace_ends_at, Classification};
use crate::context::PipelineContext;
use crate::providers::ReadModels;
use crate::reconciler::{persist_cleared, reconcile_in_memory};
use crate::store::LeadFilter;

/// One classified lead
#[derive(Debug, Clone, Serialize)]
pub struct PipelineEntry {
    pub lead: Lead,
    pub classification: Classification,
    pub effective_last_activity: DateTime<Utc>,
    pub idle_hours: f64,
    /// Set while a future touchpoint suspends staleness
    pub protected_until: Option<DateTime<Utc>>,
    /// Set for warned leads with a warning date
    pub grace_ends_at: Option<DateTime<Utc>>,
}

/// Lead counts per classification
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PipelineSummary {
    pub active: usize,
    pub stale_fresh: usize,
    pub stale_warned_pending: usize,
    pub stale_killable: usize,
}

impl PipelineSummary {
    fn count(&mut self, classification: Classification) {
        match classification {
            Classification::Active => self.active += 1,
            Classification::StaleFresh => self.stale_fresh += 1,
            Classification::StaleWarnedPending => self.stale_warned_pending += 1,
            Classification::StaleKillable => self.stale_killable += 1,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PipelineView {
    pub generated_at: DateTime<Utc>,
    pub entries: Vec<PipelineEntry>,
    pub summary: PipelineSummary,
    /// Warned leads missing their warning date
    pub anomalies: usize,
    /// Warnings cleared by the reconciliation this load triggered
    pub warnings_cleared: usize,
    /// Read-models were unavailable; every lead is shown as active
    pub degraded: bool,
}

impl PipelineView {
    /// Ids currently classified `classification`
    pub fn ids_with(&self, classification: Classification) -> Vec<Uuid> {
        self.entries
            .iter()
            .filter(|e| e.classification == classification)
            .map(|e| e.lead.id)
            .collect()
    }
}

/// Classify every owned, seller-working lead (optionally for one owner)
pub async fn load_pipeline(ctx: &PipelineContext, owner: Option<&str>) -> Result<PipelineView> {
    let now = ctx.now();

    let filter = match owner {
        Some(name) => LeadFilter::seller_working().for_owner(name),
        None => LeadFilter::seller_working(),
    };
    let mut leads = ctx.store.fetch_filtered(&filter).await?;
    let ids: Vec<Uuid> = leads.iter().map(|l| l.id).collect();

    let (models, degraded) = match ctx.read_models(&ids).await {
        Ok(models) => (models, false),
        Err(e) => {
            warn!("Read-models unavailable, pipeline shown without staleness: {}", e);
            (ReadModels::default(), true)
        }
    };

    let mut warnings_cleared = 0;
    if !degraded {
        let to_clear = reconcile_in_memory(&mut leads, &models, now);
        if !to_clear.is_empty() {
            let (cleared, failed) = persist_cleared(ctx, &to_clear).await;
            if !failed.is_empty() {
                warn!(
                    "{} cleared warnings not persisted; will retry on next pass",
                    failed.len()
                );
            }
            warnings_cleared = cleared.len();
        }
    }

    let mut summary = PipelineSummary::default();
    let mut anomalies = 0;
    let mut entries = Vec::with_capacity(leads.len());

    for lead in leads {
        let signals = models.signals(&lead.id);
        let classification = if degraded {
            Classification::Active
        } else {
            classify(&lead, &signals, now, &ctx.thresholds)
        };

        if lead.has_warning_anomaly() {
            warn!("Lead {} is warned without a warning date", lead.id);
            anomalies += 1;
        }

        let last_activity = effective_last_activity(&lead, &signals);
        let protected_until = signals
            .touchpoint
            .filter(|t| t.protects_at(now))
            .and_then(|t| t.next_touch_at);

        summary.count(classification);
        entries.push(PipelineEntry {
            classification,
            effective_last_activity: last_activity,
            idle_hours: hours_between(last_activity, now),
            protected_until,
            grace_ends_at: grace_ends_at(&lead, &ctx.thresholds),
            lead,
        });
    }

    Ok(PipelineView {
        generated_at: now,
        entries,
        summary,
        anomalies,
        warnings_cleared,
        degraded,
    })
}
