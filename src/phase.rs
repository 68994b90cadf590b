//! Game phase state machine
//!
//! This module defines the ordered sequence of screens within a question
//! cycle and the rules for moving between them. The machine validates
//! client-inferred transitions one step at a time, while server snapshots
//! may force any phase unconditionally (the server is authoritative).
//!
//! The machine only exposes the current phase and question index; it never
//! navigates. Screens subscribe to phase updates and perform their own
//! routing, which keeps the host-drives/player-follows split outside the
//! core.

use enum_map::Enum;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The current screen-stage within a session
///
/// Within a question cycle phases are monotonic
/// (countdown → question → reveal → explanation → leaderboard); only the
/// leaderboard may branch, to the next question's countdown or to the
/// podium when the quiz is exhausted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Enum, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Waiting room before the host starts the game
    #[default]
    Lobby,
    /// Short pre-question countdown
    Countdown,
    /// Question displayed, answers open
    Question,
    /// Correct answer and aggregate statistics shown
    AnswerReveal,
    /// Optional per-question explanation
    Explanation,
    /// Standings between questions
    Leaderboard,
    /// Final ranking display at the end of the game
    Podium,
}

impl Phase {
    /// Returns the phases reachable from this one in a single step
    ///
    /// The reveal phase admits both explanation and leaderboard because
    /// explanations are optional per question. The podium is terminal;
    /// only a forced resync can leave it.
    pub fn successors(self) -> &'static [Phase] {
        match self {
            Phase::Lobby => &[Phase::Countdown],
            Phase::Countdown => &[Phase::Question],
            Phase::Question => &[Phase::AnswerReveal],
            Phase::AnswerReveal => &[Phase::Explanation, Phase::Leaderboard],
            Phase::Explanation => &[Phase::Leaderboard],
            Phase::Leaderboard => &[Phase::Countdown, Phase::Podium],
            Phase::Podium => &[],
        }
    }

    /// Whether this phase ends the session flow
    pub fn is_terminal(self) -> bool {
        matches!(self, Phase::Podium)
    }
}

/// Error returned when a transition is not reachable in one step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error, Serialize)]
#[error("cannot move from {from:?} to {to:?} in one step")]
pub struct InvalidTransition {
    /// The phase the machine was in when the transition was attempted
    pub from: Phase,
    /// The phase the transition attempted to reach
    pub to: Phase,
}

/// Validates phase transitions and tracks the current question index
///
/// Client code (timer expiries, host commands echoed back) advances the
/// machine one step at a time through [`PhaseMachine::advance`]. Server
/// snapshots apply through [`PhaseMachine::force_resync`], which bypasses
/// the single-step guard entirely.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhaseMachine {
    /// Current phase
    phase: Phase,
    /// Zero-based index of the current question
    question_index: usize,
}

impl Default for PhaseMachine {
    /// A fresh machine starts in the lobby at question zero
    fn default() -> Self {
        Self {
            phase: Phase::Lobby,
            question_index: 0,
        }
    }
}

impl PhaseMachine {
    /// Creates a new machine in the lobby phase
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the current phase
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Returns the zero-based index of the current question
    pub fn question_index(&self) -> usize {
        self.question_index
    }

    /// Advances the machine to `to` if it is a single-step successor
    ///
    /// Moving from the leaderboard into a countdown begins the next
    /// question cycle and increments the question index.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidTransition`] when `to` is not reachable from the
    /// current phase in one step. The machine is left unchanged.
    pub fn advance(&mut self, to: Phase) -> Result<Phase, InvalidTransition> {
        if !self.phase.successors().contains(&to) {
            return Err(InvalidTransition {
                from: self.phase,
                to,
            });
        }

        if self.phase == Phase::Leaderboard && to == Phase::Countdown {
            self.question_index += 1;
        }

        self.phase = to;
        Ok(self.phase)
    }

    /// Applies an authoritative server phase unconditionally
    ///
    /// A forced resync may skip any number of locally-inferred steps or
    /// move backwards; the server snapshot is the single source of truth
    /// and the guard does not apply.
    pub fn force_resync(&mut self, phase: Phase, question_index: usize) {
        if phase != self.phase || question_index != self.question_index {
            tracing::debug!(
                from = ?self.phase,
                to = ?phase,
                question_index,
                "forced phase resync"
            );
        }
        self.phase = phase;
        self.question_index = question_index;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn advance(machine: &mut PhaseMachine, to: Phase) -> Phase {
        machine.advance(to).unwrap()
    }

    #[test]
    fn test_initial_phase_is_lobby() {
        let machine = PhaseMachine::new();
        assert_eq!(machine.phase(), Phase::Lobby);
        assert_eq!(machine.question_index(), 0);
    }

    #[test]
    fn test_full_question_cycle() {
        let mut machine = PhaseMachine::new();

        assert_eq!(advance(&mut machine, Phase::Countdown), Phase::Countdown);
        assert_eq!(advance(&mut machine, Phase::Question), Phase::Question);
        assert_eq!(
            advance(&mut machine, Phase::AnswerReveal),
            Phase::AnswerReveal
        );
        assert_eq!(
            advance(&mut machine, Phase::Explanation),
            Phase::Explanation
        );
        assert_eq!(
            advance(&mut machine, Phase::Leaderboard),
            Phase::Leaderboard
        );
        assert_eq!(machine.question_index(), 0);
    }

    #[test]
    fn test_reveal_may_skip_explanation() {
        let mut machine = PhaseMachine::new();
        advance(&mut machine, Phase::Countdown);
        advance(&mut machine, Phase::Question);
        advance(&mut machine, Phase::AnswerReveal);

        assert_eq!(
            advance(&mut machine, Phase::Leaderboard),
            Phase::Leaderboard
        );
    }

    #[test]
    fn test_leaderboard_branch_to_next_question_increments_index() {
        let mut machine = PhaseMachine::new();
        advance(&mut machine, Phase::Countdown);
        advance(&mut machine, Phase::Question);
        advance(&mut machine, Phase::AnswerReveal);
        advance(&mut machine, Phase::Leaderboard);

        assert_eq!(advance(&mut machine, Phase::Countdown), Phase::Countdown);
        assert_eq!(machine.question_index(), 1);
    }

    #[test]
    fn test_leaderboard_branch_to_podium() {
        let mut machine = PhaseMachine::new();
        advance(&mut machine, Phase::Countdown);
        advance(&mut machine, Phase::Question);
        advance(&mut machine, Phase::AnswerReveal);
        advance(&mut machine, Phase::Leaderboard);

        assert_eq!(advance(&mut machine, Phase::Podium), Phase::Podium);
        assert!(machine.phase().is_terminal());
        assert_eq!(machine.question_index(), 0);
    }

    #[test]
    fn test_invalid_transition_rejected_and_state_unchanged() {
        let mut machine = PhaseMachine::new();

        let err = machine.advance(Phase::AnswerReveal).unwrap_err();
        assert_eq!(err.from, Phase::Lobby);
        assert_eq!(err.to, Phase::AnswerReveal);
        assert_eq!(machine.phase(), Phase::Lobby);
    }

    #[test]
    fn test_podium_is_terminal_for_stepwise_advances() {
        let mut machine = PhaseMachine::new();
        machine.force_resync(Phase::Podium, 9);

        assert!(machine.advance(Phase::Lobby).is_err());
        assert!(machine.advance(Phase::Countdown).is_err());
    }

    #[test]
    fn test_forced_resync_skips_locally_inferred_state() {
        let mut machine = PhaseMachine::new();
        advance(&mut machine, Phase::Countdown);
        advance(&mut machine, Phase::Question);

        // Server jumps straight past reveal into the leaderboard.
        machine.force_resync(Phase::Leaderboard, 3);
        assert_eq!(machine.phase(), Phase::Leaderboard);
        assert_eq!(machine.question_index(), 3);
    }

    #[test]
    fn test_forced_resync_may_move_backwards() {
        let mut machine = PhaseMachine::new();
        machine.force_resync(Phase::Podium, 5);
        machine.force_resync(Phase::Question, 2);

        assert_eq!(machine.phase(), Phase::Question);
        assert_eq!(machine.question_index(), 2);
    }

    #[test]
    fn test_phase_serialization_uses_snake_case() {
        assert_eq!(
            serde_json::to_string(&Phase::AnswerReveal).unwrap(),
            "\"answer_reveal\""
        );
        let parsed: Phase = serde_json::from_str("\"leaderboard\"").unwrap();
        assert_eq!(parsed, Phase::Leaderboard);
    }
}
