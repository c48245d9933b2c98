//! Per-package publish state machine
//!
//! Each package in a run moves through a small set of states. Transitions
//! are validated and timestamped so the run report can show what happened
//! to every package and when.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Publishing state of a single package
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PackageState {
    Pending,
    Skipped,
    DryRun,
    Publishing,
    Published,
    Confirmed,
    Failed,
    TimedOut,
}

impl PackageState {
    /// Check if no further transition is possible from this state
    ///
    /// `Published` is not terminal: it may still be confirmed or time out
    /// when the run waits for the registry.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Skipped | Self::DryRun | Self::Confirmed | Self::Failed | Self::TimedOut
        )
    }

    /// Check if the package ended in a failure state
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failed | Self::TimedOut)
    }

    fn can_transition_to(self, to: PackageState) -> bool {
        use PackageState::*;

        matches!(
            (self, to),
            (Pending, Skipped)
                | (Pending, DryRun)
                | (Pending, Publishing)
                | (Publishing, Published)
                | (Publishing, Failed)
                | (Published, Confirmed)
                | (Published, TimedOut)
        )
    }
}

/// State transition
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StateTransition {
    pub from: PackageState,
    pub to: PackageState,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

/// Rejected state transition
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{package}: 不正な状態遷移です ({from:?} → {to:?})")]
pub struct TransitionError {
    package: String,
    from: PackageState,
    to: PackageState,
}

impl TransitionError {
    pub fn package(&self) -> &str {
        &self.package
    }
}

/// State machine for one package within a run
#[derive(Debug, Clone)]
pub struct PackageStateMachine {
    package: String,
    current_state: PackageState,
    transitions: Vec<StateTransition>,
}

impl PackageStateMachine {
    /// Create a new state machine in the `Pending` state
    pub fn new(package: impl Into<String>) -> Self {
        Self {
            package: package.into(),
            current_state: PackageState::Pending,
            transitions: Vec::new(),
        }
    }

    /// Transition to a new state
    ///
    /// # Arguments
    ///
    /// * `to` - Target state
    /// * `note` - Optional detail recorded with the transition
    ///
    /// # Errors
    ///
    /// Returns `TransitionError` if `to` is not reachable from the current state.
    pub fn transition(
        &mut self,
        to: PackageState,
        note: Option<String>,
    ) -> Result<(), TransitionError> {
        if !self.current_state.can_transition_to(to) {
            return Err(TransitionError {
                package: self.package.clone(),
                from: self.current_state,
                to,
            });
        }

        self.transitions.push(StateTransition {
            from: self.current_state,
            to,
            timestamp: Utc::now(),
            note,
        });
        self.current_state = to;

        Ok(())
    }

    pub fn package(&self) -> &str {
        &self.package
    }

    /// Get current state
    pub fn state(&self) -> PackageState {
        self.current_state
    }

    pub fn transitions(&self) -> &[StateTransition] {
        &self.transitions
    }

    /// Consume the machine, returning its transition history
    pub fn into_transitions(self) -> Vec<StateTransition> {
        self.transitions
    }

    /// Milliseconds between the first and the last transition
    pub fn elapsed_ms(&self) -> i64 {
        match (self.transitions.first(), self.transitions.last()) {
            (Some(first), Some(last)) => (last.timestamp - first.timestamp).num_milliseconds(),
            _ => 0,
        }
    }

    /// Get transition history as human-readable string
    pub fn history(&self) -> String {
        self.transitions
            .iter()
            .map(|t| {
                let time = t.timestamp.to_rfc3339();
                let note = t
                    .note
                    .as_deref()
                    .map(|n| format!(" ({})", n))
                    .unwrap_or_default();
                format!("{}: {:?} → {:?}{}", time, t.from, t.to, note)
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}
