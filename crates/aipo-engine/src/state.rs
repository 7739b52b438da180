//! Generation run state machine
//!
//! ```text
//! NotStarted -> ValidatingDependencies -> AssemblingContext -> GeneratingTests
//!   -> GeneratingImplementation -> ValidatingCode -> Organizing -> PendingReview
//! ```
//!
//! Any non-terminal state may move to `Failed` or `Cancelled`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum GenerationState {
    #[default]
    NotStarted,
    ValidatingDependencies,
    AssemblingContext,
    GeneratingTests,
    GeneratingImplementation,
    ValidatingCode,
    Organizing,
    PendingReview,
    Failed,
    Cancelled,
}

impl GenerationState {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::NotStarted => "not-started",
            Self::ValidatingDependencies => "validating-dependencies",
            Self::AssemblingContext => "assembling-context",
            Self::GeneratingTests => "generating-tests",
            Self::GeneratingImplementation => "generating-implementation",
            Self::ValidatingCode => "validating-code",
            Self::Organizing => "organizing",
            Self::PendingReview => "pending-review",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }

    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::PendingReview | Self::Failed | Self::Cancelled)
    }

    /// The next state on the success path.
    #[must_use]
    pub const fn next(&self) -> Option<Self> {
        match self {
            Self::NotStarted => Some(Self::ValidatingDependencies),
            Self::ValidatingDependencies => Some(Self::AssemblingContext),
            Self::AssemblingContext => Some(Self::GeneratingTests),
            Self::GeneratingTests => Some(Self::GeneratingImplementation),
            Self::GeneratingImplementation => Some(Self::ValidatingCode),
            Self::ValidatingCode => Some(Self::Organizing),
            Self::Organizing => Some(Self::PendingReview),
            Self::PendingReview | Self::Failed | Self::Cancelled => None,
        }
    }

    #[must_use]
    pub fn can_transition_to(&self, to: Self) -> bool {
        if self.is_terminal() {
            return false;
        }
        matches!(to, Self::Failed | Self::Cancelled) || self.next() == Some(to)
    }
}

impl fmt::Display for GenerationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateTransition {
    pub from: GenerationState,
    pub to: GenerationState,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("Illegal generation state transition from {from} to {to}")]
pub struct TransitionError {
    pub from: GenerationState,
    pub to: GenerationState,
}

/// Current state plus the timestamped path that led to it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateMachine {
    state: GenerationState,
    history: Vec<StateTransition>,
}

impl StateMachine {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn state(&self) -> GenerationState {
        self.state
    }

    #[must_use]
    pub fn history(&self) -> &[StateTransition] {
        &self.history
    }

    /// Move to `to` if the table allows it.
    ///
    /// # Errors
    ///
    /// Returns `TransitionError` for a transition not in the table; the state
    /// is left unchanged.
    pub fn transition(&mut self, to: GenerationState) -> Result<&StateTransition, TransitionError> {
        if !self.state.can_transition_to(to) {
            return Err(TransitionError {
                from: self.state,
                to,
            });
        }
        debug!(from = self.state.as_str(), to = to.as_str(), "Generation state transition");
        self.history.push(StateTransition {
            from: self.state,
            to,
            at: Utc::now(),
        });
        self.state = to;
        Ok(&self.history[self.history.len() - 1])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SUCCESS_PATH: [GenerationState; 7] = [
        GenerationState::ValidatingDependencies,
        GenerationState::AssemblingContext,
        GenerationState::GeneratingTests,
        GenerationState::GeneratingImplementation,
        GenerationState::ValidatingCode,
        GenerationState::Organizing,
        GenerationState::PendingReview,
    ];

    #[test]
    fn test_success_path_is_legal() {
        let mut machine = StateMachine::new();
        for state in SUCCESS_PATH {
            machine.transition(state).unwrap();
        }
        assert_eq!(machine.state(), GenerationState::PendingReview);
        assert_eq!(machine.history().len(), 7);
        assert!(machine.history().windows(2).all(|w| w[0].to == w[1].from));
    }

    #[test]
    fn test_implementation_cannot_precede_tests() {
        let mut machine = StateMachine::new();
        machine.transition(GenerationState::ValidatingDependencies).unwrap();
        machine.transition(GenerationState::AssemblingContext).unwrap();
        let err = machine
            .transition(GenerationState::GeneratingImplementation)
            .unwrap_err();
        assert_eq!(err.from, GenerationState::AssemblingContext);
        assert_eq!(machine.state(), GenerationState::AssemblingContext);
    }

    #[test]
    fn test_any_active_state_can_fail_or_cancel() {
        for state in SUCCESS_PATH.iter().filter(|s| !s.is_terminal()) {
            assert!(state.can_transition_to(GenerationState::Failed));
            assert!(state.can_transition_to(GenerationState::Cancelled));
        }
    }

    #[test]
    fn test_terminal_states_are_final() {
        for terminal in [
            GenerationState::PendingReview,
            GenerationState::Failed,
            GenerationState::Cancelled,
        ] {
            assert!(!terminal.can_transition_to(GenerationState::Failed));
            assert!(!terminal.can_transition_to(GenerationState::ValidatingDependencies));
        }
    }

    #[test]
    fn test_state_serializes_kebab_case() {
        assert_eq!(
            serde_json::to_string(&GenerationState::PendingReview).unwrap(),
            "\"pending-review\""
        );
    }
}
