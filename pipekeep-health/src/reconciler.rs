//! Warning reconciliation
//!
//! A warning stops applying as soon as the lead is protected by a future
//! touchpoint or shows engagement newer than the warning itself. Without this
//! pass a lead that re-engaged after being warned would still be reclaimed.
//!
//! The pass is idempotent: the decision depends only on current state, and
//! the write is guarded on `warning_sent = true`, so re-running it without
//! intervening changes clears nothing new.

use chrono::{DateTime, Utc};
use pipekeep_common::{Lead, Result};
use serde::Serialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::classifier::{effective_last_activity, is_protected, Signals};
use crate::context::PipelineContext;
use crate::providers::ReadModels;
use crate::store::{Guard, LeadFilter, LeadPatch};

/// Result of one reconciliation pass
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    /// Warned leads looked at
    pub examined: usize,
    /// Leads whose warning this pass cleared in the store
    pub cleared: Vec<Uuid>,
    /// Leads that should be cleared but whose write failed; retried next pass
    pub failed: Vec<Uuid>,
}

/// A warning no longer applies
pub fn should_clear(lead: &Lead, signals: &Signals, now: DateTime<Utc>) -> bool {
    if !lead.warning_sent {
        return false;
    }
    if is_protected(signals, now) {
        return true;
    }
    match lead.warning_date {
        Some(warned_at) => effective_last_activity(lead, signals) > warned_at,
        None => false,
    }
}

/// Clear stale warnings on in-memory copies, returning the ids changed
pub fn reconcile_in_memory(
    leads: &mut [Lead],
    models: &ReadModels,
    now: DateTime<Utc>,
) -> Vec<Uuid> {
    let mut changed = Vec::new();
    for lead in leads.iter_mut() {
        if should_clear(lead, &models.signals(&lead.id), now) {
            lead.warning_sent = false;
            lead.warning_date = None;
            changed.push(lead.id);
        }
    }
    changed
}

/// Write cleared warnings back; failures are logged, never propagated
pub async fn persist_cleared(ctx: &PipelineContext, ids: &[Uuid]) -> (Vec<Uuid>, Vec<Uuid>) {
    let mut cleared = Vec::new();
    let mut failed = Vec::new();

    for id in ids {
        match ctx
            .store
            .apply_if(*id, Guard::WarningSent(true), LeadPatch::ClearWarning)
            .await
        {
            Ok(true) => cleared.push(*id),
            Ok(false) => debug!("Warning on lead {} already cleared elsewhere", id),
            Err(e) => {
                warn!("Failed to clear warning on lead {}: {}", id, e);
                failed.push(*id);
            }
        }
    }

    (cleared, failed)
}

/// Reconcile every warned lead in the store
pub async fn reconcile(ctx: &PipelineContext) -> Result<ReconcileReport> {
    let now = ctx.now();
    let mut leads = ctx.store.fetch_filtered(&LeadFilter::warned()).await?;
    if leads.is_empty() {
        return Ok(ReconcileReport::default());
    }

    let ids: Vec<Uuid> = leads.iter().map(|l| l.id).collect();
    let models = ctx.read_models(&ids).await?;

    let to_clear = reconcile_in_memory(&mut leads, &models, now);
    let (cleared, failed) = persist_cleared(ctx, &to_clear).await;

    if !to_clear.is_empty() {
        info!(
            "Reconciled {} warned leads: {} warnings cleared, {} write failures",
            leads.len(),
            cleared.len(),
            failed.len()
        );
    }

    Ok(ReconcileReport {
        examined: leads.len(),
        cleared,
        failed,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use pipekeep_common::Touchpoint;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).unwrap()
    }

    fn h(hours: i64) -> DateTime<Utc> {
        t0() + Duration::hours(hours)
    }

    fn warned(at: Option<DateTime<Utc>>) -> Lead {
        let mut lead = Lead::new("Marta", t0());
        lead.warning_sent = true;
        lead.warning_date = at;
        lead
    }

    #[test]
    fn test_unwarned_lead_never_cleared() {
        let lead = Lead::new("Marta", t0());
        let signals = Signals {
            last_activity_at: Some(h(100)),
            touchpoint: Some(Touchpoint::scheduled(h(500))),
        };
        assert!(!should_clear(&lead, &signals, h(101)));
    }

    #[test]
    fn test_cleared_by_newer_activity() {
        let lead = warned(Some(h(73)));
        let newer = Signals {
            last_activity_at: Some(h(83)),
            touchpoint: None,
        };
        let same = Signals {
            last_activity_at: Some(h(73)),
            touchpoint: None,
        };
        assert!(should_clear(&lead, &newer, h(90)));
        // Strictly newer only
        assert!(!should_clear(&lead, &same, h(90)));
        assert!(!should_clear(&lead, &Signals::default(), h(90)));
    }

    #[test]
    fn test_cleared_by_protection() {
        let lead = warned(Some(h(73)));
        let protected = Signals {
            last_activity_at: None,
            touchpoint: Some(Touchpoint::scheduled(h(120))),
        };
        let lapsed = Signals {
            last_activity_at: None,
            touchpoint: Some(Touchpoint::scheduled(h(80))),
        };
        assert!(should_clear(&lead, &protected, h(90)));
        assert!(!should_clear(&lead, &lapsed, h(90)));
    }

    #[test]
    fn test_anomaly_only_cleared_by_protection() {
        let lead = warned(None);
        let active = Signals {
            last_activity_at: Some(h(100)),
            touchpoint: None,
        };
        let protected = Signals {
            last_activity_at: None,
            touchpoint: Some(Touchpoint::scheduled(h(200))),
        };
        assert!(!should_clear(&lead, &active, h(101)));
        assert!(should_clear(&lead, &protected, h(101)));
    }

    #[test]
    fn test_in_memory_pass_is_idempotent() {
        let revived = warned(Some(h(73)));
        let still_stale = warned(Some(h(73)));
        let mut models = ReadModels::default();
        models.activity.insert(revived.id, h(80));

        let mut leads = vec![revived.clone(), still_stale.clone()];
        let first = reconcile_in_memory(&mut leads, &models, h(85));
        let after_first = leads.clone();
        let second = reconcile_in_memory(&mut leads, &models, h(85));

        assert_eq!(first, vec![revived.id]);
        assert!(second.is_empty());
        assert_eq!(leads, after_first);
        assert!(!leads[0].warning_sent);
        assert_eq!(leads[0].warning_date, None);
        assert!(leads[1].warning_sent);
    }
}
