//! Per-choice answer statistics
//!
//! This module accumulates how many players picked each answer choice and
//! derives percentages from the counts. Counts arrive either as absolute
//! per-choice snapshots (the primary contract, safe under retransmission)
//! or as increments deduplicated by server event id. Percentages are never
//! stored; they are recomputed from counts on every read.
//!
//! No player identity is retained here — only aggregate counts.

use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identifies one answer choice within the current question
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct ChoiceId(pub u32);

impl From<u32> for ChoiceId {
    fn from(index: u32) -> Self {
        Self(index)
    }
}

/// A derived per-choice statistic
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct AnswerStat {
    /// The choice this statistic describes
    pub choice_id: ChoiceId,
    /// How many players picked this choice
    pub count: u64,
    /// Share of all submitted answers, in percent; zero when nobody answered
    pub percentage: f64,
}

/// Accumulates answer counts for the current question
///
/// Reset whenever a new question starts; the deduplication window for
/// delta events is scoped to one question.
#[derive(Debug, Default, Clone)]
pub struct AnswerTally {
    /// Per-choice counts, keyed for deterministic iteration order
    counts: BTreeMap<ChoiceId, u64>,
    /// Delta event ids already applied this question
    seen_deltas: HashSet<Uuid>,
}

impl AnswerTally {
    /// Creates an empty tally
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the absolute count for a choice
    ///
    /// Absolute snapshots are idempotent: replaying the same message in any
    /// order interleaved with duplicates converges on the same counts as
    /// long as the newest snapshot is applied last, which the seq-guarded
    /// cache upstream guarantees.
    pub fn apply_count(&mut self, choice_id: ChoiceId, count: u64) {
        self.counts.insert(choice_id, count);
    }

    /// Applies an incremental count pushed by the server
    ///
    /// Deltas are not safe to replay, so each one carries an event id and
    /// is applied at most once; retransmissions are dropped.
    pub fn apply_delta(&mut self, event_id: Uuid, choice_id: ChoiceId, delta: u64) {
        if !self.seen_deltas.insert(event_id) {
            tracing::debug!(%event_id, "dropped duplicate answer delta");
            return;
        }
        *self.counts.entry(choice_id).or_default() += delta;
    }

    /// Total number of answers submitted across all choices
    pub fn total_answered(&self) -> u64 {
        self.counts.values().sum()
    }

    /// Derives per-choice statistics from the current counts
    ///
    /// Percentages sum to approximately 100 when anyone has answered and
    /// are all zero otherwise.
    pub fn percentages(&self) -> Vec<AnswerStat> {
        let total = self.total_answered();
        self.counts
            .iter()
            .map(|(&choice_id, &count)| AnswerStat {
                choice_id,
                count,
                percentage: if total == 0 {
                    0.0
                } else {
                    count as f64 / total as f64 * 100.0
                },
            })
            .collect()
    }

    /// Clears all counts and the delta deduplication window
    ///
    /// Called when a new question starts.
    pub fn reset(&mut self) {
        self.counts.clear();
        self.seen_deltas.clear();
    }
}
