//! Configuration constants for the TUIZ sync layer
//!
//! This module contains the tunable limits and timing parameters used
//! throughout the reconciliation core. They bound reconnection behavior,
//! display sizes, and the expected tick cadence of the embedding UI.

/// Session-wide limits
pub mod session {
    /// Maximum number of players tracked in a single session roster
    pub const MAX_ROSTER_SIZE: usize = 1000;
    /// Maximum number of questions in a single quiz session
    pub const MAX_QUESTION_COUNT: usize = 100;
}

/// Transport reconnection parameters
pub mod transport {
    /// Initial reconnect backoff delay in milliseconds
    pub const BACKOFF_BASE_MS: u64 = 500;
    /// Upper bound on a single reconnect backoff delay in milliseconds
    pub const BACKOFF_CAP_MS: u64 = 16_000;
    /// Number of failed reconnect attempts before giving up permanently
    pub const MAX_RECONNECT_ATTEMPTS: u32 = 8;
}

/// Countdown timer parameters
pub mod timer {
    /// Expected tick cadence driven by the embedding UI, in milliseconds
    pub const TICK_INTERVAL_MS: u64 = 1000;
}

/// Leaderboard display parameters
pub mod leaderboard {
    /// Maximum number of entries included in a truncated standings list
    pub const DISPLAY_LIMIT: usize = 50;
}

/// Answer statistics parameters
pub mod stats {
    /// Maximum number of answer choices per question
    pub const MAX_CHOICE_COUNT: usize = 8;
}
