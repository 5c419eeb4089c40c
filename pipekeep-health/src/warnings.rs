//! Warning issuer
//!
//! Operators pick leads from a pipeline view that may already be out of date.
//! Before anything is written, the candidates are re-read and re-classified;
//! only leads that are still freshly stale survive. The write itself is
//! conditional on `warning_sent = false`, so two operators warning the same
//! lead at once produce exactly one warning.

use pipekeep_common::{Lead, Result};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::batch::{distinct_ids, BatchKind, BatchOutcome};
use crate::classifier::{classify, Classification};
use crate::context::PipelineContext;
use crate::store::{Guard, LeadPatch};

/// Lead is in scope for the warn/evict passes at all
pub(crate) fn in_scope(lead: &Lead) -> bool {
    lead.status.is_seller_working() && !lead.is_unassigned()
}

/// Warn the owners of `candidate_ids`
///
/// Returns how many leads were actually warned; zero is a normal outcome.
/// Only an empty request is an error.
pub async fn issue_warnings(
    ctx: &PipelineContext,
    candidate_ids: &[Uuid],
) -> Result<BatchOutcome> {
    let ids = distinct_ids(candidate_ids)?;
    let mut outcome = BatchOutcome::new(BatchKind::Warn, ids.len());
    let now = ctx.now();

    // Recheck exactly the requested leads against current state
    let recheck = async {
        let leads = ctx.store.fetch_by_ids(&ids).await?;
        let models = ctx.read_models(&ids).await?;
        Ok::<_, pipekeep_common::Error>((leads, models))
    };
    let (leads, models) = match recheck.await {
        Ok(state) => state,
        Err(e) => {
            warn!("Warning batch aborted, could not recheck {} leads: {}", ids.len(), e);
            return Ok(BatchOutcome::read_failed(BatchKind::Warn, ids.len()));
        }
    };

    let survivors: Vec<Uuid> = leads
        .iter()
        .filter(|lead| {
            in_scope(lead)
                && classify(lead, &models.signals(&lead.id), now, &ctx.thresholds)
                    == Classification::StaleFresh
        })
        .map(|lead| lead.id)
        .collect();
    outcome.eligible = survivors.len();

    for id in survivors {
        match ctx
            .store
            .apply_if(id, Guard::WarningSent(false), LeadPatch::Warn { at: now })
            .await
        {
            Ok(true) => outcome.applied += 1,
            Ok(false) => debug!("Lead {} was warned concurrently", id),
            Err(e) => {
                warn!("Failed to warn lead {}: {}", id, e);
                outcome.failed += 1;
            }
        }
    }

    info!(
        "Warning batch: {} requested, {} eligible, {} warned, {} failed",
        outcome.requested, outcome.eligible, outcome.applied, outcome.failed
    );
    if outcome.applied == 0 && outcome.failed == 0 {
        info!("Nothing left to warn");
    }

    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::memory::{
        FaultyLeadStore, InMemoryActivity, InMemoryTouchpoints, StaticOwnerDirectory,
        StaticSaleEvents,
    };
    use crate::store::SqliteLeadStore;
    use chrono::{DateTime, Duration, TimeZone, Utc};
    use pipekeep_common::db::{init_in_memory_database, insert_lead};
    use pipekeep_common::{Error, FixedClock, PipelineStatus, Thresholds, Touchpoint};
    use sqlx::SqlitePool;
    use std::sync::Arc;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).unwrap()
    }

    struct Fixture {
        db: SqlitePool,
        ctx: PipelineContext,
        activity: Arc<InMemoryActivity>,
        touchpoints: Arc<InMemoryTouchpoints>,
    }

    async fn fixture(now: DateTime<Utc>) -> Fixture {
        let db = init_in_memory_database().await.unwrap();
        let activity = Arc::new(InMemoryActivity::new());
        let touchpoints = Arc::new(InMemoryTouchpoints::new());
        let ctx = PipelineContext {
            store: Arc::new(SqliteLeadStore::new(db.clone())),
            activity: activity.clone(),
            touchpoints: touchpoints.clone(),
            owners: Arc::new(StaticOwnerDirectory::default()),
            sales: Arc::new(StaticSaleEvents::default()),
            clock: Arc::new(FixedClock::new(now)),
            thresholds: Thresholds::default(),
        };
        Fixture {
            db,
            ctx,
            activity,
            touchpoints,
        }
    }

    async fn seed(db: &SqlitePool, status: PipelineStatus) -> Lead {
        let mut lead = Lead::new("Marta", t0());
        lead.status = status;
        insert_lead(db, &lead).await.unwrap();
        lead
    }

    #[tokio::test]
    async fn test_empty_request_rejected() {
        let f = fixture(t0()).await;
        assert!(matches!(
            issue_warnings(&f.ctx, &[]).await,
            Err(Error::InvalidInput(_))
        ));
    }

    #[tokio::test]
    async fn test_only_fresh_stale_working_leads_warned() {
        let f = fixture(t0() + Duration::hours(73)).await;
        let stale = seed(&f.db, PipelineStatus::Contacted).await;
        let parked = seed(&f.db, PipelineStatus::Nurture).await;
        let protected = seed(&f.db, PipelineStatus::Qualified).await;
        let busy = seed(&f.db, PipelineStatus::Qualified).await;

        f.touchpoints
            .set(protected.id, Touchpoint::scheduled(t0() + Duration::hours(100)));
        f.activity.record(busy.id, t0() + Duration::hours(50));

        let outcome = issue_warnings(&f.ctx, &[stale.id, parked.id, protected.id, busy.id])
            .await
            .unwrap();
        assert_eq!(outcome.requested, 4);
        assert_eq!(outcome.eligible, 1);
        assert_eq!(outcome.applied, 1);

        let leads = f.ctx.store.fetch_by_ids(&[stale.id, parked.id]).await.unwrap();
        for lead in leads {
            if lead.id == stale.id {
                assert!(lead.warning_sent);
                assert_eq!(lead.warning_date, Some(t0() + Duration::hours(73)));
            } else {
                assert!(!lead.warning_sent);
            }
        }
    }

    #[tokio::test]
    async fn test_second_batch_warns_nothing() {
        let f = fixture(t0() + Duration::hours(80)).await;
        let lead = seed(&f.db, PipelineStatus::Negotiating).await;

        let first = issue_warnings(&f.ctx, &[lead.id, lead.id]).await.unwrap();
        let second = issue_warnings(&f.ctx, &[lead.id]).await.unwrap();

        assert_eq!(first.requested, 1);
        assert_eq!(first.applied, 1);
        assert_eq!(second.eligible, 0);
        assert_eq!(second.applied, 0);
        assert_eq!(second.message(), "Nothing left to warn");
    }

    #[tokio::test]
    async fn test_unreadable_read_models_warn_nothing() {
        let f = fixture(t0() + Duration::hours(80)).await;
        let lead = seed(&f.db, PipelineStatus::Contacted).await;
        f.touchpoints.set_failing(true);

        let outcome = issue_warnings(&f.ctx, &[lead.id]).await.unwrap();
        assert_eq!(outcome, BatchOutcome::read_failed(BatchKind::Warn, 1));

        let stored = f.ctx.store.fetch_by_ids(&[lead.id]).await.unwrap();
        assert!(!stored[0].warning_sent);
    }

    #[tokio::test]
    async fn test_failed_write_counted_and_reported() {
        let mut f = fixture(t0() + Duration::hours(80)).await;
        let written = seed(&f.db, PipelineStatus::Contacted).await;
        let rejected = seed(&f.db, PipelineStatus::Qualified).await;

        let store = Arc::new(FaultyLeadStore::new(f.ctx.store.clone()));
        store.set_failing(rejected.id, true);
        f.ctx.store = store;

        let outcome = issue_warnings(&f.ctx, &[written.id, rejected.id]).await.unwrap();
        assert_eq!(outcome.eligible, 2);
        assert_eq!(outcome.applied, 1);
        assert_eq!(outcome.failed, 1);
        assert_eq!(outcome.lost_races(), 0);
        assert_eq!(
            outcome.message(),
            "1 of 2 requested were applied (1 could not be written, retry later)"
        );

        let leads = f.ctx.store.fetch_by_ids(&[written.id, rejected.id]).await.unwrap();
        for lead in leads {
            assert_eq!(lead.warning_sent, lead.id == written.id);
        }
    }

    #[tokio::test]
    async fn test_unknown_ids_are_not_errors() {
        let f = fixture(t0() + Duration::hours(80)).await;
        let outcome = issue_warnings(&f.ctx, &[Uuid::new_v4()]).await.unwrap();
        assert_eq!(outcome.requested, 1);
        assert_eq!(outcome.applied, 0);
    }
}
