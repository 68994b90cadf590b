//! # TUIZ Sync Library
//!
//! This library provides the client-side synchronization core for TUIZ
//! live quiz sessions. It reconciles server-pushed session state into a
//! single derived timeline shared by host, player, and public display
//! screens: phase progression, countdown timers corrected for clock skew,
//! answer statistics, and ranked leaderboards.
//!
//! The embedding UI owns the socket and the render loop; this crate owns
//! the policy. Server messages enter through
//! [`store::SessionStore::receive`], ticks through
//! [`store::SessionStore::tick`], and everything screens display flows
//! out through the [`screen::ViewSink`] seam.

#![cfg_attr(all(coverage_nightly, test), feature(coverage_attribute))]
#![deny(missing_docs)]
#![deny(rustdoc::missing_crate_level_docs)]
#![warn(clippy::pedantic)]
#![allow(clippy::too_many_arguments)]
#![allow(clippy::similar_names)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::ignored_unit_patterns)]
#![allow(clippy::struct_field_names)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::wildcard_imports)]
use serde::Serialize;

pub mod constants;

pub mod leaderboard;
pub mod phase;
pub mod room_code;
pub mod roster;
pub mod screen;
pub mod session;
pub mod stats;
pub mod store;
pub mod timer;
pub mod transport;

use leaderboard::{LeaderboardEntry, PodiumSummary, TopList};
use phase::Phase;
use session::QuestionId;
use stats::{AnswerStat, ChoiceId};
use transport::ConnectionState;

/// Incremental view updates fanned out to mounted screens
///
/// Each variant carries derived state, never a raw server event; screens
/// render what they receive without re-deriving anything. Some variants
/// are kind-filtered (answer statistics stay off player screens until the
/// reveal).
#[derive(Debug, Serialize, Clone, derive_more::From)]
pub enum ViewMessage {
    /// The session moved to a new phase
    Phase {
        /// The phase now in effect
        phase: Phase,
        /// Zero-based index of the current question
        question_index: usize,
    },
    /// One countdown tick
    TimerTick {
        /// Time remaining in the current phase window, milliseconds
        remaining_ms: u64,
    },
    /// The current phase window's deadline passed
    PhaseExpired {
        /// The question the deadline belonged to
        question_id: QuestionId,
        /// The phase the deadline belonged to
        phase: Phase,
    },
    /// Updated answer distribution for the current question
    AnswerStats {
        /// Per-choice counts and percentages
        stats: Vec<AnswerStat>,
        /// Total answers submitted so far
        total_answered: u64,
    },
    /// The correct answer was revealed
    Reveal {
        /// The correct choices
        correct_choices: Vec<ChoiceId>,
        /// Final per-choice counts and percentages
        stats: Vec<AnswerStat>,
    },
    /// Updated standings between questions
    Leaderboard {
        /// Truncated standings with the exact ranked count
        standings: TopList<LeaderboardEntry>,
    },
    /// The game ended; final standings are frozen
    #[from]
    Podium(PodiumSummary),
    /// The roster changed
    Roster {
        /// Number of active players
        player_count: usize,
        /// Active player names ordered by join time
        player_names: Vec<String>,
    },
    /// The connection lifecycle state changed
    #[from]
    Connection(ConnectionState),
}

impl ViewMessage {
    /// Converts the view message to a JSON string for transmission
    ///
    /// # Panics
    ///
    /// This method panics if serialization fails, which should never happen
    /// with the default JSON serializer for well-formed data.
    pub fn to_message(&self) -> String {
        serde_json::to_string(self).expect("default serializer cannot fail")
    }
}

/// The complete derived view sent to a screen on mount or resync
///
/// Everything a freshly mounted screen needs to render without waiting
/// for the next incremental update. Also re-sent to every screen after a
/// full snapshot resync, since incremental deltas across a reconnect gap
/// are not trusted.
#[derive(Debug, Serialize, Clone, Default, PartialEq)]
pub struct SyncView {
    /// Current phase
    pub phase: Phase,
    /// Zero-based index of the current question
    pub question_index: usize,
    /// The current question, absent in the lobby
    pub question_id: Option<QuestionId>,
    /// Time remaining in the current phase window, if one is open
    pub remaining_ms: Option<u64>,
    /// Answer distribution for the current question
    pub stats: Vec<AnswerStat>,
    /// Current standings
    pub standings: TopList<LeaderboardEntry>,
    /// Active player names ordered by join time
    pub player_names: Vec<String>,
    /// Connection lifecycle state
    pub connection: ConnectionState,
    /// Whether this view predates a connection drop
    pub stale: bool,
}

impl SyncView {
    /// Converts the view to a JSON string for transmission
    ///
    /// # Panics
    ///
    /// This method panics if serialization fails, which should never happen
    /// with the default JSON serializer for well-formed data.
    pub fn to_message(&self) -> String {
        serde_json::to_string(self).expect("default serializer cannot fail")
    }
}
