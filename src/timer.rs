//! Countdown reconciliation against server timestamps
//!
//! This module derives a locally ticking countdown from server-supplied
//! start/end timestamps. The embedding UI drives ticks (1Hz expected) and
//! owns the actual interval; correctness never depends on tick cadence.
//! Remaining time is always recomputed from the authoritative end timestamp
//! adjusted by a cached clock offset, so a dropped or delayed tick can
//! never make the countdown drift.

use std::collections::HashSet;

use web_time::{Duration, SystemTime};

use crate::{phase::Phase, session::QuestionId};

/// Cached offset between the local clock and the server clock
///
/// The offset is recomputed from every server snapshot that carries the
/// server's own "now", not just once at connect, so drift accumulated over
/// a long session or corrected on resync is always folded in.
#[derive(Debug, Clone, Copy, Default)]
pub struct ClockSync {
    /// Server time minus local time, in milliseconds
    offset_ms: i64,
}

impl ClockSync {
    /// Recomputes the offset from a server-reported "now"
    ///
    /// # Arguments
    ///
    /// * `server_now` - The server's clock reading carried by a snapshot
    /// * `local_now` - The local clock reading when the snapshot arrived
    pub fn observe(&mut self, server_now: SystemTime, local_now: SystemTime) {
        self.offset_ms = match server_now.duration_since(local_now) {
            Ok(ahead) => i64::try_from(ahead.as_millis()).unwrap_or(i64::MAX),
            Err(e) => -i64::try_from(e.duration().as_millis()).unwrap_or(i64::MAX),
        };
    }

    /// Returns the cached offset in milliseconds (server minus local)
    pub fn offset_ms(&self) -> i64 {
        self.offset_ms
    }

    /// Projects the local clock onto the server timeline
    pub fn server_now(&self, local_now: SystemTime) -> SystemTime {
        if self.offset_ms >= 0 {
            local_now + Duration::from_millis(self.offset_ms as u64)
        } else {
            local_now - Duration::from_millis(self.offset_ms.unsigned_abs())
        }
    }

    /// Computes time remaining until `end` on the server timeline
    ///
    /// Never negative: once the adjusted now passes `end` this returns zero.
    pub fn remaining(&self, end: SystemTime, local_now: SystemTime) -> Duration {
        end.duration_since(self.server_now(local_now))
            .unwrap_or(Duration::ZERO)
    }
}

/// Lifecycle state of the countdown
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CountdownState {
    /// No deadline armed
    Idle,
    /// Counting down toward an armed deadline
    Running,
    /// The armed deadline has been reached
    Expired,
}

/// The (question, phase) pair a deadline belongs to
///
/// Expiry is reported exactly once per pair; the pair is the idempotency
/// key guarding against duplicate expiries when the condition is checked
/// on every tick or when the same deadline is re-armed by a resync.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ExpiryKey {
    /// The question the deadline belongs to
    pub question_id: QuestionId,
    /// The phase the deadline belongs to
    pub phase: Phase,
}

/// Result of a single countdown tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TickOutcome {
    /// Time remaining until the armed deadline, zero once reached
    pub remaining: Duration,
    /// Set on the first tick that observes the deadline passing
    pub expired: Option<ExpiryKey>,
}

/// A locally ticking countdown re-armed from server timestamps
///
/// The countdown is recreated (re-armed) whenever the server's start/end
/// timestamps change. It is suspended while the connection is down so a
/// stale deadline cannot fire against an outdated snapshot, and cancelled
/// when its owning screen unmounts, after which no tick or expiry is ever
/// observed again.
#[derive(Debug, Default)]
pub struct Countdown {
    /// Armed deadline, if any
    armed: Option<(ExpiryKey, SystemTime)>,
    /// Whether the armed deadline has been observed to pass
    expired: bool,
    /// Pairs that have already reported expiry
    fired: HashSet<ExpiryKey>,
    /// Ticks are suppressed while the transport is down
    suspended: bool,
    /// Set on teardown, permanently
    cancelled: bool,
}

impl Countdown {
    /// Creates an idle countdown
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the current lifecycle state
    pub fn state(&self) -> CountdownState {
        match (&self.armed, self.expired) {
            (None, _) => CountdownState::Idle,
            (Some(_), false) => CountdownState::Running,
            (Some(_), true) => CountdownState::Expired,
        }
    }

    /// Arms (or re-arms) the countdown toward a server deadline
    ///
    /// Valid from any state except cancelled. Re-arming with a new end time
    /// for the same pair moves an expired countdown back to running, but a
    /// pair that has already reported expiry will not report again.
    pub fn arm(&mut self, key: ExpiryKey, end: SystemTime) {
        if self.cancelled {
            return;
        }
        self.armed = Some((key, end));
        self.expired = false;
    }

    /// Clears the armed deadline without tearing the countdown down
    pub fn disarm(&mut self) {
        self.armed = None;
        self.expired = false;
    }

    /// Suppresses ticking while the transport is disconnected
    pub fn suspend(&mut self) {
        self.suspended = true;
    }

    /// Resumes ticking after a reconnect and resync
    pub fn resume(&mut self) {
        self.suspended = false;
    }

    /// Permanently tears the countdown down
    ///
    /// After cancellation every tick returns `None` and no expiry fires,
    /// regardless of later calls.
    pub fn cancel(&mut self) {
        self.cancelled = true;
        self.armed = None;
    }

    /// Computes the remaining time and detects expiry
    ///
    /// Returns `None` when idle, suspended, or cancelled. The expiry for a
    /// given (question, phase) pair is reported on exactly one tick.
    pub fn tick(&mut self, clock: &ClockSync, local_now: SystemTime) -> Option<TickOutcome> {
        if self.cancelled || self.suspended {
            return None;
        }

        let (key, end) = self.armed?;
        let remaining = clock.remaining(end, local_now);

        let expired = if remaining.is_zero() {
            self.expired = true;
            if self.fired.insert(key) {
                Some(key)
            } else {
                None
            }
        } else {
            None
        };

        Some(TickOutcome { remaining, expired })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn epoch_plus(ms: u64) -> SystemTime {
        SystemTime::UNIX_EPOCH + Duration::from_millis(ms)
    }

    fn key(phase: Phase) -> ExpiryKey {
        ExpiryKey {
            question_id: QuestionId::from(Uuid::from_u128(7)),
            phase,
        }
    }

    #[test]
    fn test_clock_sync_offset_server_ahead() {
        let mut clock = ClockSync::default();
        clock.observe(epoch_plus(10_000), epoch_plus(8_500));
        assert_eq!(clock.offset_ms(), 1_500);
    }

    #[test]
    fn test_clock_sync_offset_server_behind() {
        let mut clock = ClockSync::default();
        clock.observe(epoch_plus(8_000), epoch_plus(9_200));
        assert_eq!(clock.offset_ms(), -1_200);
    }

    #[test]
    fn test_remaining_is_end_minus_adjusted_now() {
        let mut clock = ClockSync::default();
        clock.observe(epoch_plus(10_000), epoch_plus(9_000));

        // Local 14s reads as server 15s; end at 20s leaves 5s.
        assert_eq!(
            clock.remaining(epoch_plus(20_000), epoch_plus(14_000)),
            Duration::from_millis(5_000)
        );
    }

    #[test]
    fn test_remaining_never_negative() {
        let clock = ClockSync::default();
        assert_eq!(
            clock.remaining(epoch_plus(1_000), epoch_plus(60_000)),
            Duration::ZERO
        );
    }

    #[test]
    fn test_offset_recomputed_on_every_observation() {
        let mut clock = ClockSync::default();
        clock.observe(epoch_plus(5_000), epoch_plus(5_000));
        assert_eq!(clock.offset_ms(), 0);

        clock.observe(epoch_plus(50_000), epoch_plus(47_000));
        assert_eq!(clock.offset_ms(), 3_000);
    }

    #[test]
    fn test_countdown_runs_then_expires_once() {
        let clock = ClockSync::default();
        let mut countdown = Countdown::new();
        countdown.arm(key(Phase::Question), epoch_plus(10_000));

        let outcome = countdown.tick(&clock, epoch_plus(7_000)).unwrap();
        assert_eq!(outcome.remaining, Duration::from_millis(3_000));
        assert_eq!(outcome.expired, None);
        assert_eq!(countdown.state(), CountdownState::Running);

        let outcome = countdown.tick(&clock, epoch_plus(10_000)).unwrap();
        assert_eq!(outcome.remaining, Duration::ZERO);
        assert_eq!(outcome.expired, Some(key(Phase::Question)));
        assert_eq!(countdown.state(), CountdownState::Expired);

        // The expiry condition holds on every later tick but reports once.
        let outcome = countdown.tick(&clock, epoch_plus(11_000)).unwrap();
        assert_eq!(outcome.expired, None);
        let outcome = countdown.tick(&clock, epoch_plus(12_000)).unwrap();
        assert_eq!(outcome.expired, None);
    }

    #[test]
    fn test_rearm_same_pair_does_not_refire() {
        let clock = ClockSync::default();
        let mut countdown = Countdown::new();
        countdown.arm(key(Phase::Question), epoch_plus(1_000));
        assert!(
            countdown
                .tick(&clock, epoch_plus(2_000))
                .unwrap()
                .expired
                .is_some()
        );

        countdown.arm(key(Phase::Question), epoch_plus(3_000));
        assert_eq!(countdown.state(), CountdownState::Running);
        let outcome = countdown.tick(&clock, epoch_plus(4_000)).unwrap();
        assert_eq!(outcome.expired, None);
    }

    #[test]
    fn test_distinct_pairs_each_fire() {
        let clock = ClockSync::default();
        let mut countdown = Countdown::new();

        countdown.arm(key(Phase::Countdown), epoch_plus(1_000));
        assert!(
            countdown
                .tick(&clock, epoch_plus(1_500))
                .unwrap()
                .expired
                .is_some()
        );

        countdown.arm(key(Phase::Question), epoch_plus(2_000));
        assert!(
            countdown
                .tick(&clock, epoch_plus(2_500))
                .unwrap()
                .expired
                .is_some()
        );
    }

    #[test]
    fn test_cancel_stops_all_ticks() {
        let clock = ClockSync::default();
        let mut countdown = Countdown::new();
        countdown.arm(key(Phase::Question), epoch_plus(1_000));

        countdown.cancel();
        assert!(countdown.tick(&clock, epoch_plus(5_000)).is_none());

        // Arming after cancellation stays inert.
        countdown.arm(key(Phase::AnswerReveal), epoch_plus(6_000));
        assert!(countdown.tick(&clock, epoch_plus(9_000)).is_none());
        assert_eq!(countdown.state(), CountdownState::Idle);
    }

    #[test]
    fn test_suspend_suppresses_ticks_until_resume() {
        let clock = ClockSync::default();
        let mut countdown = Countdown::new();
        countdown.arm(key(Phase::Question), epoch_plus(10_000));

        countdown.suspend();
        assert!(countdown.tick(&clock, epoch_plus(5_000)).is_none());

        countdown.resume();
        assert!(countdown.tick(&clock, epoch_plus(5_000)).is_some());
    }

    #[test]
    fn test_skewed_clock_delays_expiry() {
        let mut clock = ClockSync::default();
        // Local clock runs 4s fast relative to the server.
        clock.observe(epoch_plus(10_000), epoch_plus(14_000));

        let mut countdown = Countdown::new();
        countdown.arm(key(Phase::Question), epoch_plus(20_000));

        // Local 21s is only server 17s; not expired yet.
        let outcome = countdown.tick(&clock, epoch_plus(21_000)).unwrap();
        assert_eq!(outcome.remaining, Duration::from_millis(3_000));
        assert_eq!(outcome.expired, None);

        let outcome = countdown.tick(&clock, epoch_plus(24_000)).unwrap();
        assert!(outcome.expired.is_some());
    }
}
