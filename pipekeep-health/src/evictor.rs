//! Evictor: reclaim leads whose warning went unanswered
//!
//! Mirrors the warning issuer. Candidates are rechecked against current state
//! and the eviction write is conditional on `warning_sent = true`, so a
//! reconciliation that revives a lead between recheck and write wins.
//! Eviction is the only path that removes ownership.

use chrono::{DateTime, Utc};
use pipekeep_common::{Lead, Result, Thresholds};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::batch::{distinct_ids, BatchKind, BatchOutcome};
use crate::classifier::{effective_last_activity, is_protected, Signals};
use crate::context::PipelineContext;
use crate::store::{Guard, LeadPatch};
use crate::warnings::in_scope;

/// Warned, unprotected, untouched since the warning, and out of grace
pub fn is_evictable(
    lead: &Lead,
    signals: &Signals,
    now: DateTime<Utc>,
    thresholds: &Thresholds,
) -> bool {
    if !lead.warning_sent || is_protected(signals, now) {
        return false;
    }

    match lead.warning_date {
        Some(warned_at) => {
            effective_last_activity(lead, signals) <= warned_at
                && now - warned_at >= thresholds.grace_period
        }
        None => true,
    }
}

/// Reclaim `candidate_ids` into the unassigned pool
///
/// Returns how many leads were evicted; zero is a normal outcome.
/// Only an empty request is an error.
pub async fn evict(ctx: &PipelineContext, candidate_ids: &[Uuid]) -> Result<BatchOutcome> {
    let ids = distinct_ids(candidate_ids)?;
    let mut outcome = BatchOutcome::new(BatchKind::Evict, ids.len());
    let now = ctx.now();

    let recheck = async {
        let leads = ctx.store.fetch_by_ids(&ids).await?;
        let models = ctx.read_models(&ids).await?;
        Ok::<_, pipekeep_common::Error>((leads, models))
    };
    let (leads, models) = match recheck.await {
        Ok(state) => state,
        Err(e) => {
            warn!("Eviction batch aborted, could not recheck {} leads: {}", ids.len(), e);
            return Ok(BatchOutcome::read_failed(BatchKind::Evict, ids.len()));
        }
    };

    let mut survivors = Vec::new();
    for lead in &leads {
        if !in_scope(lead) {
            continue;
        }
        let signals = models.signals(&lead.id);
        if is_evictable(lead, &signals, now, &ctx.thresholds) {
            if lead.has_warning_anomaly() {
                warn!(
                    "Lead {} is warned without a warning date; treating as immediately evictable",
                    lead.id
                );
            }
            survivors.push(lead.id);
        }
    }
    outcome.eligible = survivors.len();

    for id in survivors {
        match ctx
            .store
            .apply_if(id, Guard::WarningSent(true), LeadPatch::Evict { at: now })
            .await
        {
            Ok(true) => outcome.applied += 1,
            Ok(false) => debug!("Lead {} was revived or evicted concurrently", id),
            Err(e) => {
                warn!("Failed to evict lead {}: {}", id, e);
                outcome.failed += 1;
            }
        }
    }

    info!(
        "Eviction batch: {} requested, {} eligible, {} evicted, {} failed",
        outcome.requested, outcome.eligible, outcome.applied, outcome.failed
    );
    if outcome.applied == 0 && outcome.failed == 0 {
        info!("Nothing left to evict");
    }

    Ok(outcome)
}
