//! Outcome reporting for operator-triggered batches

use pipekeep_common::{Error, Result};
use serde::Serialize;
use std::collections::HashSet;
use uuid::Uuid;

/// Which transition a batch attempted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchKind {
    Warn,
    Evict,
}

impl BatchKind {
    fn verb(&self) -> &'static str {
        match self {
            BatchKind::Warn => "warn",
            BatchKind::Evict => "evict",
        }
    }
}

/// Requested versus applied counts for one batch
///
/// A batch is all-or-nothing per lead only. Leads already updated stay
/// updated even when later writes in the same batch fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BatchOutcome {
    pub kind: BatchKind,
    /// Distinct ids asked for
    pub requested: usize,
    /// Ids still eligible when rechecked just before writing
    pub eligible: usize,
    /// Ids whose guarded update took effect
    pub applied: usize,
    /// Ids whose write errored (or every id, if the recheck read failed)
    pub failed: usize,
}

impl BatchOutcome {
    pub fn new(kind: BatchKind, requested: usize) -> Self {
        Self {
            kind,
            requested,
            eligible: 0,
            applied: 0,
            failed: 0,
        }
    }

    /// The recheck could not read current state, so nothing was attempted
    pub fn read_failed(kind: BatchKind, requested: usize) -> Self {
        Self {
            failed: requested,
            ..Self::new(kind, requested)
        }
    }

    /// Ids that passed the recheck but lost the race to another writer
    pub fn lost_races(&self) -> usize {
        self.eligible.saturating_sub(self.applied + self.failed)
    }

    /// Operator-facing summary; zero applied is informational, not a failure
    pub fn message(&self) -> String {
        if self.applied == 0 && self.failed == 0 {
            return format!("Nothing left to {}", self.kind.verb());
        }
        let mut message = format!(
            "{} of {} requested were applied",
            self.applied, self.requested
        );
        if self.failed > 0 {
            message.push_str(&format!(" ({} could not be written, retry later)", self.failed));
        }
        message
    }
}

/// Drop duplicate ids, keeping first-seen order. Empty input is rejected.
pub fn distinct_ids(ids: &[Uuid]) -> Result<Vec<Uuid>> {
    if ids.is_empty() {
        return Err(Error::InvalidInput("No lead ids given".to_string()));
    }
    let mut seen = HashSet::with_capacity(ids.len());
    Ok(ids.iter().copied().filter(|id| seen.insert(*id)).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_distinct_ids_keeps_order() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        assert_eq!(distinct_ids(&[a, b, a, b, a]).unwrap(), vec![a, b]);
        assert!(matches!(distinct_ids(&[]), Err(Error::InvalidInput(_))));
    }

    #[test]
    fn test_messages() {
        let mut outcome = BatchOutcome::new(BatchKind::Warn, 5);
        assert_eq!(outcome.message(), "Nothing left to warn");

        outcome.eligible = 4;
        outcome.applied = 3;
        assert_eq!(outcome.message(), "3 of 5 requested were applied");
        assert_eq!(outcome.lost_races(), 1);

        outcome.failed = 1;
        assert_eq!(
            outcome.message(),
            "3 of 5 requested were applied (1 could not be written, retry later)"
        );

        let failed = BatchOutcome::read_failed(BatchKind::Evict, 2);
        assert_eq!(
            failed.message(),
            "0 of 2 requested were applied (2 could not be written, retry later)"
        );
        assert_eq!(failed.lost_races(), 0);
    }
}
