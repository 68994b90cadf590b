//! Player roster projection
//!
//! The roster is owned by the session server; this module holds the
//! client's read-only projection of it. It is mutated only by applying
//! server pushes (join, leave, ban) — ban and kick themselves are outgoing
//! commands that round-trip through the server before the roster changes.

use std::{
    collections::{HashMap, HashSet},
    fmt::Display,
    str::FromStr,
};

use enum_map::{Enum, EnumMap};
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use serde_with::{DeserializeFromStr, SerializeDisplay};
use thiserror::Error;
use uuid::Uuid;

/// A unique identifier for a player in the session
///
/// Player IDs are assigned by the server and persist across reconnects of
/// the same participant.
#[derive(
    Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, DeserializeFromStr, SerializeDisplay,
)]
pub struct PlayerId(Uuid);

impl PlayerId {
    /// Creates a new random player ID (used by tests and local echoes)
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for PlayerId {
    /// Creates a new random player ID (same as `new()`)
    fn default() -> Self {
        Self::new()
    }
}

impl From<Uuid> for PlayerId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

impl Display for PlayerId {
    /// Formats the ID as a UUID string
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for PlayerId {
    type Err = uuid::Error;

    /// Parses an ID from a UUID string
    ///
    /// # Errors
    ///
    /// Returns a `uuid::Error` if the string is not a valid UUID.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::from_str(s)?))
    }
}

/// The role a roster entry currently holds
///
/// Banned players stay in the projection so screens can render them as
/// removed rather than silently vanishing mid-question.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Enum, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParticipantKind {
    /// The session host
    Host,
    /// An active player
    Player,
    /// A player removed by the host
    Banned,
}

/// A single entry in the roster projection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
    /// Display name chosen at join time
    pub name: String,
    /// When the participant joined, as server epoch milliseconds
    pub joined_at: u64,
    /// Whether this participant hosts the session
    pub is_host: bool,
    /// Whether the host has banned this participant
    pub is_banned: bool,
}

impl Participant {
    /// Returns the role this entry currently holds
    pub fn kind(&self) -> ParticipantKind {
        if self.is_banned {
            ParticipantKind::Banned
        } else if self.is_host {
            ParticipantKind::Host
        } else {
            ParticipantKind::Player
        }
    }
}

/// Errors that can occur when applying roster pushes
#[derive(Error, Serialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// The projection has reached its size cap
    #[error("maximum roster size reached")]
    RosterFull,
}

/// Serialization helper for the Roster struct
#[derive(Deserialize)]
struct RosterSerde {
    mapping: HashMap<PlayerId, Participant>,
}

/// The client's projection of the server-owned roster
///
/// Keeps a kind-keyed reverse index so screens can cheaply count or list
/// active players without scanning the full mapping.
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(from = "RosterSerde")]
pub struct Roster {
    /// Primary mapping from player ID to their entry
    mapping: HashMap<PlayerId, Participant>,

    /// Reverse index organized by role
    #[serde(skip_serializing)]
    reverse_mapping: EnumMap<ParticipantKind, HashSet<PlayerId>>,
}

impl From<RosterSerde> for Roster {
    /// Rebuilds the reverse index from the primary mapping
    fn from(serde: RosterSerde) -> Self {
        let RosterSerde { mapping } = serde;
        let mut reverse_mapping: EnumMap<ParticipantKind, HashSet<PlayerId>> = EnumMap::default();
        for (id, participant) in &mapping {
            reverse_mapping[participant.kind()].insert(*id);
        }
        Self {
            mapping,
            reverse_mapping,
        }
    }
}

impl Roster {
    /// Inserts or updates an entry from a server push
    ///
    /// Handles role moves (player banned, host transferred) by keeping the
    /// reverse index consistent with the entry's current flags.
    ///
    /// # Errors
    ///
    /// Returns [`Error::RosterFull`] when inserting a new entry would
    /// exceed the roster cap. Updates to existing entries always apply.
    pub fn upsert(&mut self, id: PlayerId, participant: Participant) -> Result<(), Error> {
        match self.mapping.get(&id) {
            Some(existing) => {
                let old_kind = existing.kind();
                let new_kind = participant.kind();
                if old_kind != new_kind {
                    self.reverse_mapping[old_kind].remove(&id);
                    self.reverse_mapping[new_kind].insert(id);
                }
            }
            None => {
                if self.mapping.len() >= crate::constants::session::MAX_ROSTER_SIZE {
                    return Err(Error::RosterFull);
                }
                self.reverse_mapping[participant.kind()].insert(id);
            }
        }
        self.mapping.insert(id, participant);
        Ok(())
    }

    /// Removes an entry after a leave push
    pub fn remove(&mut self, id: PlayerId) {
        if let Some(participant) = self.mapping.remove(&id) {
            self.reverse_mapping[participant.kind()].remove(&id);
        }
    }

    /// Replaces the whole projection from a full snapshot resync
    pub fn replace_all<I: IntoIterator<Item = (PlayerId, Participant)>>(&mut self, entries: I) {
        self.mapping = entries.into_iter().collect();
        self.reverse_mapping = EnumMap::default();
        for (id, participant) in &self.mapping {
            self.reverse_mapping[participant.kind()].insert(*id);
        }
    }

    /// Looks up a single entry
    pub fn get(&self, id: PlayerId) -> Option<&Participant> {
        self.mapping.get(&id)
    }

    /// Gets the display name of a player
    pub fn name(&self, id: PlayerId) -> Option<&str> {
        self.mapping.get(&id).map(|p| p.name.as_str())
    }

    /// Counts entries of a specific role
    pub fn count(&self, kind: ParticipantKind) -> usize {
        self.reverse_mapping[kind].len()
    }

    /// Lists active player names ordered by join time
    pub fn player_names(&self) -> Vec<String> {
        self.reverse_mapping[ParticipantKind::Player]
            .iter()
            .filter_map(|id| self.mapping.get(id))
            .sorted_by_key(|p| p.joined_at)
            .map(|p| p.name.clone())
            .collect_vec()
    }
}
