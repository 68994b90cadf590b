//! Connection lifecycle tracking and outgoing commands
//!
//! The socket itself belongs to the embedder; this module owns the policy
//! around it. It tracks whether the session channel is up, schedules
//! reconnect attempts with capped exponential backoff and jitter, and
//! defines the typed commands the client emits into the room.
//!
//! On a drop the snapshot cache is marked stale (never cleared) and the
//! countdown is suspended; on reconnect the client re-joins the room and
//! requests a full resync rather than trusting buffered deltas. After the
//! attempt budget is exhausted the tracker settles into a terminal
//! disconnected state that screens surface to the user.

use serde::{Deserialize, Serialize};

use crate::{room_code::RoomCode, roster::PlayerId, session::SessionId};

/// Whether the session channel is currently usable
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    /// The channel is up and deltas are trusted
    Connected,
    /// The channel dropped; a reconnect attempt is pending
    Reconnecting {
        /// The attempt about to be made, 1-based
        attempt: u32,
    },
    /// All reconnect attempts failed; user intervention required
    Disconnected,
}

/// Backoff parameters for reconnect attempts
#[derive(Debug, Clone, Copy)]
pub struct ReconnectPolicy {
    /// Delay before the first attempt, in milliseconds
    pub base_ms: u64,
    /// Upper bound on any single delay, in milliseconds
    pub cap_ms: u64,
    /// Attempts made before giving up
    pub max_attempts: u32,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            base_ms: crate::constants::transport::BACKOFF_BASE_MS,
            cap_ms: crate::constants::transport::BACKOFF_CAP_MS,
            max_attempts: crate::constants::transport::MAX_RECONNECT_ATTEMPTS,
        }
    }
}

impl ReconnectPolicy {
    /// Computes the delay before a given attempt, with jitter
    ///
    /// The deterministic part doubles per attempt; up to half of it again
    /// is added as jitter so simultaneous clients do not reconnect in
    /// lockstep. The cap bounds the jittered total, never just the base.
    pub fn delay_ms(&self, attempt: u32) -> u64 {
        let exponent = attempt.saturating_sub(1).min(63);
        let base = self
            .base_ms
            .saturating_mul(1u64 << exponent.min(20))
            .min(self.cap_ms);
        (base + fastrand::u64(0..=base / 2)).min(self.cap_ms)
    }
}

/// Tracks the connection state machine across drops and reconnects
#[derive(Debug, Default)]
pub struct ConnectionTracker {
    /// Backoff parameters
    policy: ReconnectPolicy,
    /// Current channel state
    state: ConnectionState,
}

impl Default for ConnectionState {
    fn default() -> Self {
        Self::Connected
    }
}

impl ConnectionTracker {
    /// Creates a tracker with the default policy, assuming a live channel
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a tracker with a custom policy
    pub fn with_policy(policy: ReconnectPolicy) -> Self {
        Self {
            policy,
            state: ConnectionState::Connected,
        }
    }

    /// Returns the current channel state
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Whether the channel is currently up
    pub fn is_connected(&self) -> bool {
        matches!(self.state, ConnectionState::Connected)
    }

    /// Records a connection drop
    ///
    /// Returns the delay before the first reconnect attempt. A drop while
    /// already reconnecting keeps the current attempt counter.
    pub fn connection_lost(&mut self) -> u64 {
        let attempt = match self.state {
            ConnectionState::Reconnecting { attempt } => attempt,
            _ => {
                tracing::warn!("session channel lost, scheduling reconnect");
                self.state = ConnectionState::Reconnecting { attempt: 1 };
                1
            }
        };
        self.policy.delay_ms(attempt)
    }

    /// Records a failed reconnect attempt
    ///
    /// Returns the delay before the next attempt, or `None` once the
    /// attempt budget is exhausted and the tracker goes terminal.
    pub fn attempt_failed(&mut self) -> Option<u64> {
        let ConnectionState::Reconnecting { attempt } = self.state else {
            return None;
        };

        if attempt >= self.policy.max_attempts {
            tracing::warn!(attempts = attempt, "reconnect budget exhausted");
            self.state = ConnectionState::Disconnected;
            return None;
        }

        let next = attempt + 1;
        self.state = ConnectionState::Reconnecting { attempt: next };
        tracing::debug!(attempt = next, "scheduling reconnect attempt");
        Some(self.policy.delay_ms(next))
    }

    /// Records a successful reconnect
    ///
    /// The caller must follow up by re-joining the room and requesting a
    /// full resync; buffered deltas from before the drop are not trusted.
    pub fn reconnected(&mut self) {
        tracing::debug!("session channel restored");
        self.state = ConnectionState::Connected;
    }
}

/// Commands the client emits into the session room
///
/// Host commands are only honored server-side for the host connection;
/// player and display screens only observe.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ClientCommand {
    /// Join a room by its code with a display name
    JoinRoom {
        /// The room to join
        room_code: RoomCode,
        /// Display name to register under
        name: String,
    },
    /// Leave the current room
    LeaveRoom,
    /// Ask for a full authoritative snapshot (used after reconnect)
    RequestResync {
        /// The session to resynchronize with
        session_id: SessionId,
    },
    /// Host-only session controls
    Host(HostCommand),
}

/// Host-only session controls
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum HostCommand {
    /// Begin the next question's countdown
    StartQuestion,
    /// Reveal the correct answer for the current question
    RevealAnswer,
    /// Advance out of the current phase
    Next,
    /// End the game and show the podium
    EndGame,
    /// Remove a player from the session
    BanPlayer(PlayerId),
}

impl ClientCommand {
    /// Converts the command to a JSON string for transmission
    ///
    /// # Panics
    ///
    /// This method panics if serialization fails, which should never happen
    /// with the default JSON serializer for well-formed data.
    pub fn to_message(&self) -> String {
        serde_json::to_string(self).expect("default serializer cannot fail")
    }
}
