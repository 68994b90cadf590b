//! Screen registration and view fan-out
//!
//! Host, player, and public display screens mount and unmount
//! independently but must all read the same derived timeline. This module
//! keeps the registry of currently mounted screens and fans derived view
//! messages out to them through a sink abstraction, so the store never
//! knows how a screen actually renders or routes.
//!
//! Unregistration is deterministic: once a screen is removed, no further
//! message reaches its sink.

use std::{
    collections::{HashMap, HashSet},
    fmt::Display,
    str::FromStr,
};

use enum_map::{Enum, EnumMap};
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use serde_with::{DeserializeFromStr, SerializeDisplay};
use uuid::Uuid;

use super::{SyncView, ViewMessage};

/// A unique identifier for a mounted screen
#[derive(
    Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, DeserializeFromStr, SerializeDisplay,
)]
pub struct ScreenId(Uuid);

impl ScreenId {
    /// Creates a new random screen ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ScreenId {
    /// Creates a new random screen ID (same as `new()`)
    fn default() -> Self {
        Self::new()
    }
}

impl Display for ScreenId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for ScreenId {
    type Err = uuid::Error;

    /// Parses a screen ID from a UUID string
    ///
    /// # Errors
    ///
    /// Returns a `uuid::Error` if the string is not a valid UUID.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::from_str(s)?))
    }
}

/// The kind of screen a sink belongs to
///
/// Host screens may emit phase-advance commands; player and display
/// screens only observe. Some messages are kind-filtered (e.g. answer
/// statistics go to host and display screens during the question).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Enum, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScreenKind {
    /// The host's control screen
    Host,
    /// A player's personal screen
    Player,
    /// A shared public display (projector)
    Display,
}

/// Trait for delivering derived view state to a mounted screen
///
/// This abstracts the boundary between the sync core and the rendering
/// layer. An implementation might forward into a React state setter over
/// WASM bindings, or into a channel in tests.
pub trait ViewSink {
    /// Delivers an incremental view update
    fn receive_update(&self, message: &ViewMessage);

    /// Delivers a full view for initial mount or reconnection
    fn receive_sync(&self, view: &SyncView);

    /// Tears the sink down when the screen unmounts
    fn close(self);
}

/// Registry of currently mounted screens
///
/// Holds only ids and kinds; the actual sinks are resolved through a
/// finder closure at send time, so a screen that unmounted between
/// registration and delivery is silently skipped.
#[derive(Debug, Default)]
pub struct Screens {
    /// Primary mapping from screen ID to its kind
    mapping: HashMap<ScreenId, ScreenKind>,

    /// Reverse index organized by kind
    reverse_mapping: EnumMap<ScreenKind, HashSet<ScreenId>>,
}

impl Screens {
    /// Creates an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a newly mounted screen
    pub fn register(&mut self, screen_id: ScreenId, kind: ScreenKind) {
        self.mapping.insert(screen_id, kind);
        self.reverse_mapping[kind].insert(screen_id);
    }

    /// Unregisters a screen on unmount
    ///
    /// Resolves the sink one last time to close it. After this call no
    /// announce or send reaches the screen again.
    pub fn unregister<V: ViewSink, F: Fn(ScreenId) -> Option<V>>(
        &mut self,
        screen_id: ScreenId,
        sink_finder: F,
    ) {
        if let Some(kind) = self.mapping.remove(&screen_id) {
            self.reverse_mapping[kind].remove(&screen_id);
            if let Some(sink) = sink_finder(screen_id) {
                sink.close();
            }
        }
    }

    /// Whether a screen is currently registered
    pub fn is_registered(&self, screen_id: ScreenId) -> bool {
        self.mapping.contains_key(&screen_id)
    }

    /// Returns the kind of a registered screen
    pub fn kind(&self, screen_id: ScreenId) -> Option<ScreenKind> {
        self.mapping.get(&screen_id).copied()
    }

    /// Counts registered screens of a specific kind
    pub fn count(&self, kind: ScreenKind) -> usize {
        self.reverse_mapping[kind].len()
    }

    /// Lists registered screens with live sinks
    pub fn vec<V: ViewSink, F: Fn(ScreenId) -> Option<V>>(
        &self,
        sink_finder: F,
    ) -> Vec<(ScreenId, V, ScreenKind)> {
        self.mapping
            .iter()
            .filter_map(|(id, kind)| sink_finder(*id).map(|sink| (*id, sink, *kind)))
            .collect_vec()
    }

    /// Sends personalized messages to all screens using a sender function
    ///
    /// The sender is called per screen and may return a different message
    /// per kind, or `None` to skip that screen.
    pub fn announce_with<S, V: ViewSink, F: Fn(ScreenId) -> Option<V>>(
        &self,
        sender: S,
        sink_finder: F,
    ) where
        S: Fn(ScreenId, ScreenKind) -> Option<ViewMessage>,
    {
        for (screen_id, sink, kind) in self.vec(sink_finder) {
            let Some(message) = sender(screen_id, kind) else {
                continue;
            };
            sink.receive_update(&message);
        }
    }

    /// Broadcasts a view message to every registered screen
    pub fn announce<V: ViewSink, F: Fn(ScreenId) -> Option<V>>(
        &self,
        message: &ViewMessage,
        sink_finder: F,
    ) {
        self.announce_with(|_, _| Some(message.clone()), sink_finder);
    }

    /// Broadcasts a view message to screens of one kind
    pub fn announce_specific<V: ViewSink, F: Fn(ScreenId) -> Option<V>>(
        &self,
        filter: ScreenKind,
        message: &ViewMessage,
        sink_finder: F,
    ) {
        for screen_id in &self.reverse_mapping[filter] {
            if let Some(sink) = sink_finder(*screen_id) {
                sink.receive_update(message);
            }
        }
    }

    /// Sends a full view to one screen (mount or reconnect)
    pub fn send_sync<V: ViewSink, F: Fn(ScreenId) -> Option<V>>(
        &self,
        view: &SyncView,
        screen_id: ScreenId,
        sink_finder: F,
    ) {
        if !self.mapping.contains_key(&screen_id) {
            return;
        }
        if let Some(sink) = sink_finder(screen_id) {
            sink.receive_sync(view);
        }
    }
}
