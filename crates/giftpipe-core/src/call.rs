//! Explicit per-call retry state.
//!
//! Every external call that may be retried (provider fallback, language-model retry) drives a
//! [`CallMachine`] instead of falling through nested `match` arms. The machine only tracks
//! state; the caller decides what "retry" means (same request, different provider, smaller
//! prompt).

use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum CallState {
    NotStarted,
    InFlight { attempt: u32 },
    Succeeded { attempt: u32 },
    FailedRetryable { attempt: u32, reason: String },
    FailedTerminal { attempt: u32, reason: String },
}

#[derive(Debug, Clone)]
pub struct CallMachine {
    state: CallState,
    max_attempts: u32,
}

impl CallMachine {
    /// `max_attempts` counts the first call; `2` means "one retry".
    pub fn new(max_attempts: u32) -> Self {
        Self {
            state: CallState::NotStarted,
            max_attempts: max_attempts.max(1),
        }
    }

    pub fn state(&self) -> &CallState {
        &self.state
    }

    fn attempts_made(&self) -> u32 {
        match &self.state {
            CallState::NotStarted => 0,
            CallState::InFlight { attempt }
            | CallState::Succeeded { attempt }
            | CallState::FailedRetryable { attempt, .. }
            | CallState::FailedTerminal { attempt, .. } => *attempt,
        }
    }

    /// Move to `InFlight`. Returns the 1-based attempt number, or `None` when no attempt is
    /// allowed from the current state.
    pub fn start(&mut self) -> Option<u32> {
        match &self.state {
            CallState::NotStarted | CallState::FailedRetryable { .. } => {
                let attempt = self.attempts_made() + 1;
                self.state = CallState::InFlight { attempt };
                Some(attempt)
            }
            _ => None,
        }
    }

    pub fn succeed(&mut self) {
        if let CallState::InFlight { attempt } = self.state {
            self.state = CallState::Succeeded { attempt };
        }
    }

    /// Record a failure. A retryable failure becomes terminal once attempts are used up.
    pub fn fail(&mut self, retryable: bool, reason: impl Into<String>) {
        let CallState::InFlight { attempt } = self.state else {
            return;
        };
        let reason = reason.into();
        self.state = if retryable && attempt < self.max_attempts {
            CallState::FailedRetryable { attempt, reason }
        } else {
            CallState::FailedTerminal { attempt, reason }
        };
    }

    pub fn can_retry(&self) -> bool {
        matches!(self.state, CallState::FailedRetryable { .. })
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self.state,
            CallState::Succeeded { .. } | CallState::FailedTerminal { .. }
        )
    }
}
