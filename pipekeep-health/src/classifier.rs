//! Staleness classification
//!
//! Pure functions: given a lead, its read-model signals, the current instant
//! and the thresholds, decide where the lead stands. Nothing here touches the
//! store, so the same lead classified twice at the same instant always lands
//! in the same bucket.

use chrono::{DateTime, Utc};
use pipekeep_common::{Lead, Thresholds, Touchpoint};
use serde::Serialize;

/// Where a lead sits in the warn-then-evict lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Classification {
    Active,
    /// Stale and not yet warned
    StaleFresh,
    /// Warned, grace window still running
    StaleWarnedPending,
    /// Warned and grace window over; eligible for eviction
    StaleKillable,
}

impl Classification {
    pub fn is_stale(&self) -> bool {
        !matches!(self, Classification::Active)
    }
}

/// Externally computed facts about one lead
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Signals {
    /// Latest rolled-up engagement, if any was recorded
    pub last_activity_at: Option<DateTime<Utc>>,
    pub touchpoint: Option<Touchpoint>,
}

/// A future touchpoint suspends staleness entirely
pub fn is_protected(signals: &Signals, now: DateTime<Utc>) -> bool {
    signals
        .touchpoint
        .map(|t| t.protects_at(now))
        .unwrap_or(false)
}

/// Latest of rolled-up activity, the lead's own last update, and its creation
pub fn effective_last_activity(lead: &Lead, signals: &Signals) -> DateTime<Utc> {
    let own = lead.last_update.max(lead.created_at);
    match signals.last_activity_at {
        Some(activity) => own.max(activity),
        None => own,
    }
}

/// When the grace window of a warned lead closes
pub fn grace_ends_at(lead: &Lead, thresholds: &Thresholds) -> Option<DateTime<Utc>> {
    if !lead.warning_sent {
        return None;
    }
    lead.warning_date.map(|w| w + thresholds.grace_period)
}

pub fn classify(
    lead: &Lead,
    signals: &Signals,
    now: DateTime<Utc>,
    thresholds: &Thresholds,
) -> Classification {
    if is_protected(signals, now) {
        return Classification::Active;
    }

    let idle = now - effective_last_activity(lead, signals);
    if idle <= thresholds.stale_after {
        return Classification::Active;
    }

    if !lead.warning_sent {
        return Classification::StaleFresh;
    }

    match lead.warning_date {
        Some(warned_at) if now - warned_at < thresholds.grace_period => {
            Classification::StaleWarnedPending
        }
        Some(_) => Classification::StaleKillable,
        // Missing warning date must never block reclamation
        None => Classification::StaleKillable,
    }
}
