//! Attempt state machine types and the retry decision.
//!
//! The orchestrator owns one [`AttemptState`] per run and drives it through
//! [`Phase`] transitions; nothing here performs I/O.

use serde::Serialize;

/// Default ceiling on generation attempts per run.
pub const MAX_ATTEMPTS: u32 = 3;

/// Terminal result of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Terminal {
    Success,
    Failure,
}

/// Which phase of an attempt runs next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Generate,
    Persist,
    ExecuteAndValidate,
    Done(Terminal),
}

/// Mutable bookkeeping for one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttemptState {
    /// Generation attempts made so far (incremented in `Generate`).
    pub attempt_count: u32,
    /// Source text of the current candidate program.
    pub generated_source: String,
    /// Diagnostic from the most recent failure; empty until one occurs.
    pub last_error: String,
    pub phase: Phase,
}

impl Default for AttemptState {
    fn default() -> Self {
        Self {
            attempt_count: 0,
            generated_source: String::new(),
            last_error: String::new(),
            phase: Phase::Generate,
        }
    }
}

impl AttemptState {
    /// Prior error to feed the next generation call, if any.
    pub fn prior_error(&self) -> Option<&str> {
        Some(self.last_error.as_str()).filter(|s| !s.trim().is_empty())
    }

    /// Record a recoverable failure and move to the retry decision.
    pub fn record_failure(&mut self, diagnostic: impl Into<String>, max_attempts: u32) {
        self.last_error = diagnostic.into();
        self.phase = after_failure(self.attempt_count, max_attempts);
    }
}

/// Phase to enter after a failed attempt.
///
/// Retry while budget remains; otherwise the run ends in `Done(Failure)`.
pub fn after_failure(attempt_count: u32, max_attempts: u32) -> Phase {
    if attempt_count < max_attempts {
        Phase::Generate
    } else {
        Phase::Done(Terminal::Failure)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_state_starts_in_generate() {
        let state = AttemptState::default();
        assert_eq!(state.phase, Phase::Generate);
        assert_eq!(state.attempt_count, 0);
        assert_eq!(state.prior_error(), None);
    }

    #[test]
    fn retries_until_budget_is_spent() {
        assert_eq!(after_failure(1, 3), Phase::Generate);
        assert_eq!(after_failure(2, 3), Phase::Generate);
        assert_eq!(after_failure(3, 3), Phase::Done(Terminal::Failure));
    }

    #[test]
    fn record_failure_overwrites_last_error() {
        let mut state = AttemptState {
            attempt_count: 1,
            ..AttemptState::default()
        };
        state.record_failure("first", MAX_ATTEMPTS);
        assert_eq!(state.prior_error(), Some("first"));
        state.attempt_count = 2;
        state.record_failure("second", MAX_ATTEMPTS);
        assert_eq!(state.prior_error(), Some("second"));
        assert_eq!(state.phase, Phase::Generate);
    }
}
