use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Where the orchestration currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Preparing,
    Replaying,
    Recording,
    VerifyReplay,
    Done,
    Aborted,
}

impl RunState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunState::Done | RunState::Aborted)
    }

    /// Phases only move forward; any live state may abort.
    pub fn can_transition_to(&self, next: RunState) -> bool {
        use RunState::*;
        match (self, next) {
            (s, _) if s.is_terminal() => false,
            (_, Aborted) => true,
            (Preparing, Replaying) | (Preparing, Done) => true,
            (Replaying, Recording) | (Replaying, Done) => true,
            (Recording, VerifyReplay) | (Recording, Done) => true,
            (VerifyReplay, Done) => true,
            _ => false,
        }
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RunState::Preparing => "preparing",
            RunState::Replaying => "replaying",
            RunState::Recording => "recording",
            RunState::VerifyReplay => "verify-replay",
            RunState::Done => "done",
            RunState::Aborted => "aborted",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateEntry {
    pub state: RunState,
    pub timestamp: DateTime<Utc>,
}

/// Ordered record of the states a run went through.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateLog {
    entries: Vec<StateEntry>,
}

impl Default for StateLog {
    fn default() -> Self {
        Self {
            entries: vec![StateEntry {
                state: RunState::Preparing,
                timestamp: Utc::now(),
            }],
        }
    }
}

impl StateLog {
    pub fn current(&self) -> RunState {
        self.entries
            .last()
            .map(|e| e.state)
            .unwrap_or(RunState::Preparing)
    }

    /// Record a move to `next`. Returns false, recording nothing, when the
    /// move is not allowed.
    pub fn advance(&mut self, next: RunState) -> bool {
        if !self.current().can_transition_to(next) {
            return false;
        }
        self.entries.push(StateEntry {
            state: next,
            timestamp: Utc::now(),
        });
        true
    }

    pub fn states(&self) -> Vec<RunState> {
        self.entries.iter().map(|e| e.state).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_forward_transitions() {
        let mut log = StateLog::default();
        assert!(log.advance(RunState::Replaying));
        assert!(log.advance(RunState::Recording));
        assert!(log.advance(RunState::VerifyReplay));
        assert!(log.advance(RunState::Done));
        assert_eq!(
            log.states(),
            vec![
                RunState::Preparing,
                RunState::Replaying,
                RunState::Recording,
                RunState::VerifyReplay,
                RunState::Done
            ]
        );
    }

    #[test]
    fn test_no_backward_or_skipping_transitions() {
        assert!(!RunState::Recording.can_transition_to(RunState::Replaying));
        assert!(!RunState::Replaying.can_transition_to(RunState::VerifyReplay));
        assert!(!RunState::Preparing.can_transition_to(RunState::Recording));
    }

    #[test]
    fn test_abort_from_any_live_state() {
        for state in [
            RunState::Preparing,
            RunState::Replaying,
            RunState::Recording,
            RunState::VerifyReplay,
        ] {
            assert!(state.can_transition_to(RunState::Aborted), "{}", state);
        }
    }

    #[test]
    fn test_terminal_states_are_final() {
        let mut log = StateLog::default();
        assert!(log.advance(RunState::Aborted));
        assert!(!log.advance(RunState::Replaying));
        assert!(!log.advance(RunState::Done));
        assert_eq!(log.current(), RunState::Aborted);
    }
}
