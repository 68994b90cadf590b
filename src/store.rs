//! Session store: the shared reconciliation core
//!
//! One `SessionStore` exists per active game and is shared by every
//! mounted screen. The transport layer feeds server pushes into
//! [`SessionStore::receive`] — the single mutation path — and the
//! embedding UI drives [`SessionStore::tick`]. Everything screens render
//! is derived from the authoritative snapshot; raw events never reach a
//! screen directly.
//!
//! Update application is atomic with respect to a single synchronous
//! call: subscribers are only notified after the snapshot, phase machine,
//! timer, and aggregates are all consistent.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use web_time::{Duration, SystemTime};

use crate::{
    SyncView, ViewMessage,
    leaderboard::{Ranker, ScoreRow},
    phase::{Phase, PhaseMachine},
    roster::{Participant, PlayerId, Roster},
    screen::{ScreenId, ScreenKind, Screens, ViewSink},
    session::{ApplyOutcome, QuestionId, SessionId, SnapshotCache, SessionSnapshot, SnapshotPatch},
    stats::{AnswerTally, ChoiceId},
    timer::{ClockSync, Countdown, ExpiryKey},
    transport::{ClientCommand, ConnectionState, ConnectionTracker},
};

/// An absolute per-choice count carried by stats and reveal messages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChoiceCount {
    /// The choice being counted
    pub choice_id: ChoiceId,
    /// How many players picked it
    pub count: u64,
}

/// A full authoritative state transfer
///
/// Sent on join and requested again after every reconnect; the client
/// never reconstructs state from buffered deltas across a gap.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FullSync {
    /// The session document
    pub snapshot: SessionSnapshot,
    /// The server's clock at send time, epoch milliseconds
    pub server_now_ms: u64,
    /// The complete roster
    pub roster: Vec<(PlayerId, Participant)>,
    /// Current-question answer counts, if a question is live
    pub stats: Vec<ChoiceCount>,
    /// Current standings
    pub leaderboard: Vec<ScoreRow>,
}

/// Incremental answer statistics pushes
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum StatsMessage {
    /// Absolute per-choice counts (the primary contract)
    Counts(Vec<ChoiceCount>),
    /// A single increment, deduplicated by event id
    Delta {
        /// Server-assigned event id
        event_id: uuid::Uuid,
        /// The choice the increment applies to
        choice_id: ChoiceId,
        /// The increment
        delta: u64,
    },
}

/// Roster pushes
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum RosterMessage {
    /// A participant joined or changed (name, ban flag)
    Upsert {
        /// The participant's id
        player_id: PlayerId,
        /// Their current entry
        participant: Participant,
    },
    /// A participant left
    Left {
        /// The participant's id
        player_id: PlayerId,
    },
}

/// Messages pushed by the session server
///
/// Everything that mutates client state arrives through this enum; the
/// store routes each variant to the owning unit and fans derived views
/// out to screens afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ServerMessage {
    /// Full state transfer (join, resync)
    Sync(FullSync),
    /// Partial session document update
    Session(SnapshotPatch),
    /// A new question's countdown or answering window opened
    QuestionStart {
        /// Sequence number ordering this against the cached snapshot
        seq: u64,
        /// The question being started
        question_id: QuestionId,
        /// Zero-based question index
        question_index: usize,
        /// Phase the window belongs to (countdown or question)
        phase: Phase,
        /// Window open, server epoch milliseconds
        start_ms: u64,
        /// Window close, server epoch milliseconds
        end_ms: u64,
    },
    /// Answer statistics for the current question
    AnswerStats(StatsMessage),
    /// The correct answer is revealed
    Reveal {
        /// Sequence number ordering this against the cached snapshot
        seq: u64,
        /// The correct choices
        correct_choices: Vec<ChoiceId>,
        /// Final counts for the question
        counts: Vec<ChoiceCount>,
    },
    /// Standings between questions
    Leaderboard {
        /// Sequence number ordering this against the cached snapshot
        seq: u64,
        /// Score rows for every ranked player
        rows: Vec<ScoreRow>,
    },
    /// Roster change
    Roster(RosterMessage),
    /// The game ended; final standings follow
    GameEnd {
        /// Sequence number ordering this against the cached snapshot
        seq: u64,
        /// Final score rows
        rows: Vec<ScoreRow>,
    },
}

/// Errors surfaced to the embedding UI
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// No authoritative snapshot has arrived yet; nothing can render
    #[error("no session snapshot has been received yet")]
    NoSession,
}

/// The shared reconciliation core for one active session
///
/// Construct once per game (after the room code resolves), register each
/// screen as it mounts, feed it server messages and ticks, and tear it
/// down on leave. All screens read the same derived timeline.
#[derive(Debug, Default)]
pub struct SessionStore {
    /// Authoritative session document
    cache: SnapshotCache,
    /// Validated phase progression
    machine: PhaseMachine,
    /// Clock offset against the server
    clock: ClockSync,
    /// The shared countdown
    countdown: Countdown,
    /// Current-question answer counts
    tally: AnswerTally,
    /// Standings with rank-change annotations
    ranker: Ranker,
    /// Read-only roster projection
    roster: Roster,
    /// Connection lifecycle
    connection: ConnectionTracker,
    /// Mounted screens
    screens: Screens,
}

// Derived read-only accessors
impl SessionStore {
    /// Current phase
    pub fn phase(&self) -> Phase {
        self.machine.phase()
    }

    /// Zero-based index of the current question
    pub fn question_index(&self) -> usize {
        self.machine.question_index()
    }

    /// The session id, once a snapshot has arrived
    pub fn session_id(&self) -> Option<SessionId> {
        self.cache.snapshot().map(|s| s.session_id)
    }

    /// Whether the cached state predates a connection drop
    pub fn is_stale(&self) -> bool {
        self.cache.is_stale()
    }

    /// Connection lifecycle state
    pub fn connection_state(&self) -> ConnectionState {
        self.connection.state()
    }

    /// Remaining time in the current phase window
    pub fn remaining(&self, local_now: SystemTime) -> Option<Duration> {
        let snapshot = self.cache.snapshot()?;
        let end_ms = snapshot.question_end_ms?;
        Some(self.clock.remaining(server_time(end_ms), local_now))
    }

    /// Builds the full derived view for a mounting or resyncing screen
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoSession`] before the first full sync; no
    /// meaningful screen can render yet.
    pub fn sync_view(&self, local_now: SystemTime) -> Result<SyncView, Error> {
        let snapshot = self.cache.snapshot().ok_or(Error::NoSession)?;
        Ok(SyncView {
            phase: self.machine.phase(),
            question_index: self.machine.question_index(),
            question_id: snapshot.question_id,
            remaining_ms: self
                .remaining(local_now)
                .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX)),
            stats: self.tally.percentages(),
            standings: self.ranker.top(),
            player_names: self.roster.player_names(),
            connection: self.connection.state(),
            stale: self.cache.is_stale(),
        })
    }
}

// Screen lifecycle
impl SessionStore {
    /// Registers a newly mounted screen and sends it the current view
    ///
    /// Before the first full sync there is nothing to send; the screen
    /// stays registered and receives the view when the sync arrives.
    pub fn register_screen<V: ViewSink, F: Fn(ScreenId) -> Option<V>>(
        &mut self,
        screen_id: ScreenId,
        kind: ScreenKind,
        local_now: SystemTime,
        sink_finder: F,
    ) {
        self.screens.register(screen_id, kind);
        if let Ok(view) = self.sync_view(local_now) {
            self.screens.send_sync(&view, screen_id, sink_finder);
        }
    }

    /// Unregisters a screen on unmount and closes its sink
    ///
    /// Deterministic teardown: no tick, expiry, or update reaches the
    /// screen after this call.
    pub fn unregister_screen<V: ViewSink, F: Fn(ScreenId) -> Option<V>>(
        &mut self,
        screen_id: ScreenId,
        sink_finder: F,
    ) {
        self.screens.unregister(screen_id, sink_finder);
    }

    /// Tears the whole store down when the user leaves the session
    ///
    /// Cancels the countdown permanently so no interval survives
    /// navigation away from the game.
    pub fn teardown(&mut self) -> ClientCommand {
        self.countdown.cancel();
        ClientCommand::LeaveRoom
    }
}

// Connection lifecycle
impl SessionStore {
    /// Records a transport drop
    ///
    /// The snapshot is marked stale but kept, the countdown is suspended
    /// so no deadline fires against outdated state, and screens are told
    /// about the lifecycle change. Returns the backoff delay before the
    /// first reconnect attempt.
    pub fn connection_lost<V: ViewSink, F: Fn(ScreenId) -> Option<V>>(
        &mut self,
        sink_finder: F,
    ) -> u64 {
        let delay = self.connection.connection_lost();
        self.cache.mark_stale();
        self.countdown.suspend();
        self.announce_connection(sink_finder);
        delay
    }

    /// Records a failed reconnect attempt
    ///
    /// Returns the next backoff delay, or `None` once the attempt budget
    /// is exhausted — at which point screens show a persistent
    /// disconnected state instead of retrying forever.
    pub fn reconnect_failed<V: ViewSink, F: Fn(ScreenId) -> Option<V>>(
        &mut self,
        sink_finder: F,
    ) -> Option<u64> {
        let next = self.connection.attempt_failed();
        if next.is_none() {
            self.announce_connection(sink_finder);
        }
        next
    }

    /// Records a successful reconnect
    ///
    /// Returns the resync request to emit: the room is re-joined and a
    /// full snapshot requested rather than trusting buffered deltas. The
    /// countdown stays suspended until that sync arrives.
    pub fn connection_restored<V: ViewSink, F: Fn(ScreenId) -> Option<V>>(
        &mut self,
        sink_finder: F,
    ) -> Option<ClientCommand> {
        self.connection.reconnected();
        self.announce_connection(sink_finder);
        self.session_id()
            .map(|session_id| ClientCommand::RequestResync { session_id })
    }

    fn announce_connection<V: ViewSink, F: Fn(ScreenId) -> Option<V>>(&self, sink_finder: F) {
        self.screens.announce(
            &ViewMessage::Connection(self.connection.state()),
            sink_finder,
        );
    }
}

// Tick path
impl SessionStore {
    /// Drives the countdown one tick and fans the result out
    ///
    /// Ticks are expected at roughly 1 Hz but correctness does not depend
    /// on cadence; remaining time is always recomputed from the server
    /// deadline. The expiry for a (question, phase) pair fans out exactly
    /// once no matter how many ticks observe it.
    pub fn tick<V: ViewSink, F: Fn(ScreenId) -> Option<V>>(
        &mut self,
        local_now: SystemTime,
        sink_finder: F,
    ) {
        let Some(outcome) = self.countdown.tick(&self.clock, local_now) else {
            return;
        };

        self.screens.announce(
            &ViewMessage::TimerTick {
                remaining_ms: u64::try_from(outcome.remaining.as_millis()).unwrap_or(u64::MAX),
            },
            &sink_finder,
        );

        if let Some(key) = outcome.expired {
            self.screens.announce(
                &ViewMessage::PhaseExpired {
                    question_id: key.question_id,
                    phase: key.phase,
                },
                &sink_finder,
            );
        }
    }
}

// Server message path
impl SessionStore {
    /// Applies a server push and notifies screens of derived changes
    ///
    /// This is the only mutation path. Stale or out-of-order messages are
    /// dropped silently (logged at debug); duplicate stat deltas are
    /// deduplicated; nothing here is user-visible as an error.
    pub fn receive<V: ViewSink, F: Fn(ScreenId) -> Option<V>>(
        &mut self,
        message: ServerMessage,
        local_now: SystemTime,
        sink_finder: F,
    ) {
        match message {
            ServerMessage::Sync(full) => self.apply_full_sync(full, local_now, sink_finder),
            ServerMessage::Session(patch) => self.apply_patch(patch, sink_finder),
            ServerMessage::QuestionStart {
                seq,
                question_id,
                question_index,
                phase,
                start_ms,
                end_ms,
            } => {
                let patch = SnapshotPatch {
                    seq,
                    phase: Some(phase),
                    question_index: Some(question_index),
                    question_id: Some(question_id),
                    question_start_ms: Some(start_ms),
                    question_end_ms: Some(end_ms),
                    ..SnapshotPatch::default()
                };
                if self.cache.patch(patch) == ApplyOutcome::Applied {
                    self.tally.reset();
                    self.reconcile_phase(&sink_finder);
                    self.rearm_countdown();
                }
            }
            ServerMessage::AnswerStats(stats) => {
                match stats {
                    StatsMessage::Counts(counts) => {
                        for ChoiceCount { choice_id, count } in counts {
                            self.tally.apply_count(choice_id, count);
                        }
                    }
                    StatsMessage::Delta {
                        event_id,
                        choice_id,
                        delta,
                    } => self.tally.apply_delta(event_id, choice_id, delta),
                }
                // Distribution stays off player screens until the reveal.
                let message = ViewMessage::AnswerStats {
                    stats: self.tally.percentages(),
                    total_answered: self.tally.total_answered(),
                };
                self.screens
                    .announce_specific(ScreenKind::Host, &message, &sink_finder);
                self.screens
                    .announce_specific(ScreenKind::Display, &message, &sink_finder);
            }
            ServerMessage::Reveal {
                seq,
                correct_choices,
                counts,
            } => {
                let patch = SnapshotPatch {
                    seq,
                    phase: Some(Phase::AnswerReveal),
                    ..SnapshotPatch::default()
                };
                if self.cache.patch(patch) == ApplyOutcome::Applied {
                    for ChoiceCount { choice_id, count } in counts {
                        self.tally.apply_count(choice_id, count);
                    }
                    self.reconcile_phase(&sink_finder);
                    // The reveal carries no deadline of its own; the
                    // question window is closed and its end must not
                    // keep ticking. A later session patch may arm one.
                    self.countdown.disarm();
                    self.screens.announce(
                        &ViewMessage::Reveal {
                            correct_choices,
                            stats: self.tally.percentages(),
                        },
                        &sink_finder,
                    );
                }
            }
            ServerMessage::Leaderboard { seq, rows } => {
                let patch = SnapshotPatch {
                    seq,
                    phase: Some(Phase::Leaderboard),
                    ..SnapshotPatch::default()
                };
                if self.cache.patch(patch) == ApplyOutcome::Applied {
                    self.ranker.apply(rows);
                    self.reconcile_phase(&sink_finder);
                    self.countdown.disarm();
                    self.screens.announce(
                        &ViewMessage::Leaderboard {
                            standings: self.ranker.top(),
                        },
                        &sink_finder,
                    );
                }
            }
            ServerMessage::Roster(roster) => {
                match roster {
                    RosterMessage::Upsert {
                        player_id,
                        participant,
                    } => {
                        if let Err(e) = self.roster.upsert(player_id, participant) {
                            tracing::warn!(%player_id, error = %e, "roster push rejected");
                        }
                    }
                    RosterMessage::Left { player_id } => self.roster.remove(player_id),
                }
                self.screens.announce(
                    &ViewMessage::Roster {
                        player_count: self
                            .roster
                            .count(crate::roster::ParticipantKind::Player),
                        player_names: self.roster.player_names(),
                    },
                    &sink_finder,
                );
            }
            ServerMessage::GameEnd { seq, rows } => {
                let patch = SnapshotPatch {
                    seq,
                    phase: Some(Phase::Podium),
                    status: Some(crate::session::SessionStatus::Ended),
                    ..SnapshotPatch::default()
                };
                if self.cache.patch(patch) == ApplyOutcome::Applied {
                    self.ranker.apply(rows);
                    self.countdown.disarm();
                    self.reconcile_phase(&sink_finder);
                    self.screens.announce(
                        &ViewMessage::Podium(self.ranker.podium_summary().clone()),
                        &sink_finder,
                    );
                }
            }
        }
    }

    /// Applies a full state transfer and resyncs every screen
    fn apply_full_sync<V: ViewSink, F: Fn(ScreenId) -> Option<V>>(
        &mut self,
        full: FullSync,
        local_now: SystemTime,
        sink_finder: F,
    ) {
        // The seq guard runs first: a dropped stale sync must leave no
        // trace, including in the cached clock offset.
        if self.cache.sync(full.snapshot) == ApplyOutcome::Dropped {
            return;
        }

        // Offset is recomputed on every accepted sync, not just at connect.
        self.clock.observe(server_time(full.server_now_ms), local_now);

        let snapshot = self
            .cache
            .snapshot()
            .expect("snapshot present after accepted sync")
            .clone();

        self.machine
            .force_resync(snapshot.phase, snapshot.question_index);
        self.roster.replace_all(full.roster);
        self.tally.reset();
        for ChoiceCount { choice_id, count } in full.stats {
            self.tally.apply_count(choice_id, count);
        }
        if !full.leaderboard.is_empty() {
            self.ranker.apply(full.leaderboard);
        }
        self.rearm_countdown();
        self.countdown.resume();

        if let Ok(view) = self.sync_view(local_now) {
            for (_, sink, _) in self.screens.vec(&sink_finder) {
                sink.receive_sync(&view);
            }
        }
    }

    /// Merges a partial session update and reconciles derived state
    ///
    /// The countdown is re-armed only when the patch carried a new end
    /// timestamp. A phase change without one disarms instead: the armed
    /// deadline belongs to the window that just closed. Patches touching
    /// neither leave a running countdown alone.
    fn apply_patch<V: ViewSink, F: Fn(ScreenId) -> Option<V>>(
        &mut self,
        patch: SnapshotPatch,
        sink_finder: F,
    ) {
        let changed_phase = patch.phase.is_some();
        let changed_end = patch.question_end_ms.is_some();

        if self.cache.patch(patch) == ApplyOutcome::Applied {
            self.reconcile_phase(&sink_finder);
            if changed_end {
                self.rearm_countdown();
            } else if changed_phase {
                self.countdown.disarm();
            }
        }
    }

    /// Brings the phase machine in line with the accepted snapshot
    ///
    /// Single-step server transitions go through the guard; anything the
    /// guard rejects is treated as an authoritative skip and forced. The
    /// snapshot has already passed the seq check, so the server wins.
    fn reconcile_phase<V: ViewSink, F: Fn(ScreenId) -> Option<V>>(&mut self, sink_finder: F) {
        let Some(snapshot) = self.cache.snapshot() else {
            return;
        };
        let (phase, index) = (snapshot.phase, snapshot.question_index);

        if phase == self.machine.phase() && index == self.machine.question_index() {
            return;
        }

        if index != self.machine.question_index() || self.machine.advance(phase).is_err() {
            self.machine.force_resync(phase, index);
        }

        self.screens.announce(
            &ViewMessage::Phase {
                phase: self.machine.phase(),
                question_index: self.machine.question_index(),
            },
            sink_finder,
        );
    }

    /// Re-arms or disarms the countdown from the accepted snapshot
    ///
    /// Called only for updates that carried a fresh deadline, or for a
    /// full snapshot (authoritative as a whole). Only phases with a
    /// server deadline count down; any other phase clears the armed
    /// deadline so a leftover end timestamp from the previous window
    /// cannot fire.
    fn rearm_countdown(&mut self) {
        let Some(snapshot) = self.cache.snapshot() else {
            return;
        };

        let counts_down = matches!(
            snapshot.phase,
            Phase::Countdown | Phase::Question | Phase::AnswerReveal | Phase::Explanation
        );

        match (counts_down, snapshot.question_id, snapshot.question_end_ms) {
            (true, Some(question_id), Some(end_ms)) => {
                self.countdown.arm(
                    ExpiryKey {
                        question_id,
                        phase: snapshot.phase,
                    },
                    server_time(end_ms),
                );
            }
            _ => self.countdown.disarm(),
        }
    }
}

/// Converts server epoch milliseconds to a timestamp on the server timeline
fn server_time(epoch_ms: u64) -> SystemTime {
    SystemTime::UNIX_EPOCH + Duration::from_millis(epoch_ms)
}
