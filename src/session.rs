//! Authoritative session snapshot cache
//!
//! This module holds the last known authoritative session document pushed
//! by the server: current phase, question index and id, phase timestamps,
//! and host identity. The client never mutates these fields locally — it
//! recomputes everything else from them.
//!
//! Updates are last-write-wins keyed by the server's monotonically
//! increasing sequence number; anything older than the cached snapshot is
//! dropped, which guards against out-of-order and duplicate delivery.

use std::{fmt::Display, str::FromStr};

use serde::{Deserialize, Serialize};
use serde_with::{DeserializeFromStr, SerializeDisplay, skip_serializing_none};
use uuid::Uuid;

use crate::{phase::Phase, room_code::RoomCode, roster::PlayerId};

/// A unique identifier for a live session
#[derive(
    Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, DeserializeFromStr, SerializeDisplay,
)]
pub struct SessionId(Uuid);

impl SessionId {
    /// Creates a new random session ID (used by tests)
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Uuid> for SessionId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

impl Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for SessionId {
    type Err = uuid::Error;

    /// Parses a session ID from a UUID string
    ///
    /// # Errors
    ///
    /// Returns a `uuid::Error` if the string is not a valid UUID.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::from_str(s)?))
    }
}

/// A unique identifier for a question within a quiz
#[derive(
    Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, DeserializeFromStr, SerializeDisplay,
)]
pub struct QuestionId(Uuid);

impl From<Uuid> for QuestionId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

impl Display for QuestionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for QuestionId {
    type Err = uuid::Error;

    /// Parses a question ID from a UUID string
    ///
    /// # Errors
    ///
    /// Returns a `uuid::Error` if the string is not a valid UUID.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::from_str(s)?))
    }
}

/// Lifecycle status of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    /// Players are gathering; no question has started
    Lobby,
    /// The quiz is underway
    InProgress,
    /// The host ended the game or questions are exhausted
    Ended,
}

/// The last known authoritative session document
///
/// Every field here is owned by the server. Timestamps are server epoch
/// milliseconds; the timer unit converts them against the cached clock
/// offset.
#[skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    /// Session identifier
    pub session_id: SessionId,
    /// Human-enterable join code
    pub room_code: RoomCode,
    /// Lifecycle status
    pub status: SessionStatus,
    /// Current phase as reported by the server
    pub phase: Phase,
    /// Zero-based index of the current question
    pub question_index: usize,
    /// Identifier of the current question, absent in the lobby
    pub question_id: Option<QuestionId>,
    /// When the current phase window opened, server epoch milliseconds
    pub question_start_ms: Option<u64>,
    /// When the current phase window closes, server epoch milliseconds
    pub question_end_ms: Option<u64>,
    /// The session host
    pub host_id: PlayerId,
    /// Server sequence number of this document
    pub seq: u64,
}

/// A partial update to the session document
///
/// Fields left unset keep their cached value. The sequence number is
/// mandatory: it orders the patch against the cached snapshot.
#[skip_serializing_none]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotPatch {
    /// Server sequence number of this patch
    pub seq: u64,
    /// New lifecycle status, if changed
    pub status: Option<SessionStatus>,
    /// New phase, if changed
    pub phase: Option<Phase>,
    /// New question index, if changed
    pub question_index: Option<usize>,
    /// New question identifier, if changed
    pub question_id: Option<QuestionId>,
    /// New phase-window start, if changed
    pub question_start_ms: Option<u64>,
    /// New phase-window end, if changed
    pub question_end_ms: Option<u64>,
}

/// Result of offering an update to the cache
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// The update was newer than the cached snapshot and was merged
    Applied,
    /// The update was out of order or duplicate and was discarded
    Dropped,
}

/// Holds the authoritative snapshot and applies seq-ordered updates
///
/// The cache starts empty; nothing meaningful can render until the first
/// full sync arrives. On disconnect the snapshot is marked stale rather
/// than cleared, so screens keep their last view while the transport
/// recovers.
#[derive(Debug, Default)]
pub struct SnapshotCache {
    /// The cached document, absent until the first full sync
    snapshot: Option<SessionSnapshot>,
    /// Set while the transport is down; cleared by a full resync
    stale: bool,
}

impl SnapshotCache {
    /// Creates an empty cache
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the cached snapshot, if any
    pub fn snapshot(&self) -> Option<&SessionSnapshot> {
        self.snapshot.as_ref()
    }

    /// Whether the cached snapshot predates a connection drop
    pub fn is_stale(&self) -> bool {
        self.stale
    }

    /// Marks the snapshot stale without clearing it
    pub fn mark_stale(&mut self) {
        self.stale = true;
    }

    /// Applies a full authoritative snapshot
    ///
    /// A full sync clears staleness. Replays of an already-seen sequence
    /// are accepted idempotently (the document is identical by contract);
    /// only strictly older documents are dropped.
    pub fn sync(&mut self, snapshot: SessionSnapshot) -> ApplyOutcome {
        if let Some(current) = &self.snapshot {
            if snapshot.seq < current.seq {
                tracing::debug!(
                    incoming = snapshot.seq,
                    cached = current.seq,
                    "dropped stale full sync"
                );
                return ApplyOutcome::Dropped;
            }
        }
        self.snapshot = Some(snapshot);
        self.stale = false;
        ApplyOutcome::Applied
    }

    /// Merges a partial update into the cached snapshot
    ///
    /// Patches require an existing snapshot and a strictly newer sequence;
    /// duplicates and reorderings are dropped silently per the delivery
    /// contract.
    pub fn patch(&mut self, patch: SnapshotPatch) -> ApplyOutcome {
        let Some(current) = &mut self.snapshot else {
            tracing::debug!(seq = patch.seq, "dropped patch before first sync");
            return ApplyOutcome::Dropped;
        };

        if patch.seq <= current.seq {
            tracing::debug!(
                incoming = patch.seq,
                cached = current.seq,
                "dropped out-of-order patch"
            );
            return ApplyOutcome::Dropped;
        }

        current.seq = patch.seq;
        if let Some(status) = patch.status {
            current.status = status;
        }
        if let Some(phase) = patch.phase {
            current.phase = phase;
        }
        if let Some(index) = patch.question_index {
            current.question_index = index;
        }
        if let Some(id) = patch.question_id {
            current.question_id = Some(id);
        }
        if let Some(start) = patch.question_start_ms {
            current.question_start_ms = Some(start);
        }
        if let Some(end) = patch.question_end_ms {
            current.question_end_ms = Some(end);
        }

        ApplyOutcome::Applied
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_snapshot(seq: u64) -> SessionSnapshot {
        SessionSnapshot {
            session_id: SessionId::from(Uuid::from_u128(1)),
            room_code: "123456".parse().unwrap(),
            status: SessionStatus::Lobby,
            phase: Phase::Lobby,
            question_index: 0,
            question_id: None,
            question_start_ms: None,
            question_end_ms: None,
            host_id: PlayerId::from(Uuid::from_u128(2)),
            seq,
        }
    }

    fn phase_patch(seq: u64, phase: Phase, index: usize) -> SnapshotPatch {
        SnapshotPatch {
            seq,
            phase: Some(phase),
            question_index: Some(index),
            ..SnapshotPatch::default()
        }
    }

    #[test]
    fn test_patch_before_sync_is_dropped() {
        let mut cache = SnapshotCache::new();
        assert_eq!(
            cache.patch(phase_patch(1, Phase::Countdown, 0)),
            ApplyOutcome::Dropped
        );
        assert!(cache.snapshot().is_none());
    }

    #[test]
    fn test_patch_merges_only_set_fields() {
        let mut cache = SnapshotCache::new();
        cache.sync(base_snapshot(1));

        let patch = SnapshotPatch {
            seq: 2,
            phase: Some(Phase::Countdown),
            question_end_ms: Some(90_000),
            ..SnapshotPatch::default()
        };
        assert_eq!(cache.patch(patch), ApplyOutcome::Applied);

        let snapshot = cache.snapshot().unwrap();
        assert_eq!(snapshot.phase, Phase::Countdown);
        assert_eq!(snapshot.question_end_ms, Some(90_000));
        // Untouched fields keep their cached values.
        assert_eq!(snapshot.status, SessionStatus::Lobby);
        assert_eq!(snapshot.seq, 2);
    }

    #[test]
    fn test_out_of_order_and_duplicate_patches_dropped() {
        let mut cache = SnapshotCache::new();
        cache.sync(base_snapshot(5));

        assert_eq!(
            cache.patch(phase_patch(5, Phase::Countdown, 0)),
            ApplyOutcome::Dropped
        );
        assert_eq!(
            cache.patch(phase_patch(3, Phase::Podium, 9)),
            ApplyOutcome::Dropped
        );
        assert_eq!(cache.snapshot().unwrap().phase, Phase::Lobby);
    }

    #[test]
    fn test_out_of_order_delivery_equals_ordered_subsequence() {
        let updates = [
            phase_patch(2, Phase::Countdown, 0),
            phase_patch(4, Phase::Question, 0),
            phase_patch(3, Phase::Countdown, 0),
            phase_patch(2, Phase::Countdown, 0),
            phase_patch(6, Phase::AnswerReveal, 0),
            phase_patch(5, Phase::Question, 0),
        ];

        let mut shuffled = SnapshotCache::new();
        shuffled.sync(base_snapshot(1));
        for update in updates.iter().cloned() {
            shuffled.patch(update);
        }

        let mut ordered = SnapshotCache::new();
        ordered.sync(base_snapshot(1));
        let mut sorted = updates.to_vec();
        sorted.sort_by_key(|u| u.seq);
        sorted.dedup_by_key(|u| u.seq);
        for update in sorted {
            if update.seq > ordered.snapshot().unwrap().seq {
                ordered.patch(update);
            }
        }

        assert_eq!(shuffled.snapshot(), ordered.snapshot());
        assert_eq!(shuffled.snapshot().unwrap().seq, 6);
        assert_eq!(shuffled.snapshot().unwrap().phase, Phase::AnswerReveal);
    }

    #[test]
    fn test_stale_flag_cleared_by_full_sync_only() {
        let mut cache = SnapshotCache::new();
        cache.sync(base_snapshot(1));
        cache.mark_stale();
        assert!(cache.is_stale());

        cache.patch(phase_patch(2, Phase::Countdown, 0));
        assert!(cache.is_stale());

        cache.sync(base_snapshot(3));
        assert!(!cache.is_stale());
    }

    #[test]
    fn test_full_sync_replays_idempotently_but_rejects_older() {
        let mut cache = SnapshotCache::new();
        assert_eq!(cache.sync(base_snapshot(4)), ApplyOutcome::Applied);
        assert_eq!(cache.sync(base_snapshot(4)), ApplyOutcome::Applied);
        assert_eq!(cache.sync(base_snapshot(2)), ApplyOutcome::Dropped);
        assert_eq!(cache.snapshot().unwrap().seq, 4);
    }

    #[test]
    fn test_snapshot_serde_round_trip() {
        let mut snapshot = base_snapshot(7);
        snapshot.question_id = Some(QuestionId::from(Uuid::from_u128(9)));
        let json = serde_json::to_string(&snapshot).unwrap();
        let restored: SessionSnapshot = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, snapshot);
    }
}
