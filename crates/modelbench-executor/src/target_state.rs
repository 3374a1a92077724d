//! Per-target lifecycle
//!
//! Each target moves monotonically through
//! `ready → active → (active | quarantined) → drained`. Quarantine is
//! entered on an authentication failure or on sustained connection
//! failures; once entered, no new dispatches reach the target and
//! existing retries cease.

use modelbench_core::ErrorKind;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};

/// Consecutive connection errors that quarantine a target.
const CONNECTION_ERROR_THRESHOLD: u32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Ready,
    Active,
    /// Carries the failure class that caused the quarantine
    Quarantined(ErrorKind),
    Drained,
}

#[derive(Debug)]
pub struct TargetState {
    phase: Mutex<Phase>,
    consecutive_connection_errors: AtomicU32,
}

impl TargetState {
    pub fn new() -> Self {
        Self {
            phase: Mutex::new(Phase::Ready),
            consecutive_connection_errors: AtomicU32::new(0),
        }
    }

    pub fn phase(&self) -> Phase {
        *self.phase.lock().expect("target state poisoned")
    }

    /// First dispatch to the target.
    pub fn mark_active(&self) {
        let mut phase = self.phase.lock().expect("target state poisoned");
        if *phase == Phase::Ready {
            *phase = Phase::Active;
        }
    }

    /// Quarantine the target. Transitions only from ready/active, keeping
    /// the machine monotonic.
    pub fn quarantine(&self, kind: ErrorKind) {
        let mut phase = self.phase.lock().expect("target state poisoned");
        if matches!(*phase, Phase::Ready | Phase::Active) {
            *phase = Phase::Quarantined(kind);
        }
    }

    /// The failure class behind an active quarantine, if any.
    pub fn quarantined_kind(&self) -> Option<ErrorKind> {
        match self.phase() {
            Phase::Quarantined(kind) => Some(kind),
            _ => None,
        }
    }

    /// All outstanding work for the target finished or was cancelled.
    /// Terminal.
    pub fn mark_drained(&self) {
        let mut phase = self.phase.lock().expect("target state poisoned");
        *phase = Phase::Drained;
    }

    /// Track sustained connection failures; returns true when the
    /// threshold is crossed and the target should be quarantined.
    pub fn record_connection_error(&self) -> bool {
        let count = self
            .consecutive_connection_errors
            .fetch_add(1, Ordering::Relaxed)
            + 1;
        count >= CONNECTION_ERROR_THRESHOLD
    }

    /// Any non-connection result (success or other failure) breaks the
    /// consecutive run.
    pub fn reset_connection_errors(&self) {
        self.consecutive_connection_errors
            .store(0, Ordering::Relaxed);
    }
}

impl Default for TargetState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lifecycle_is_monotonic() {
        let state = TargetState::new();
        assert_eq!(state.phase(), Phase::Ready);
        state.mark_active();
        assert_eq!(state.phase(), Phase::Active);
        state.quarantine(ErrorKind::AuthenticationError);
        assert_eq!(
            state.phase(),
            Phase::Quarantined(ErrorKind::AuthenticationError)
        );
        // A second quarantine attempt does not overwrite the first cause
        state.quarantine(ErrorKind::ConnectionError);
        assert_eq!(
            state.quarantined_kind(),
            Some(ErrorKind::AuthenticationError)
        );
        state.mark_drained();
        assert_eq!(state.phase(), Phase::Drained);
    }

    #[test]
    fn mark_active_only_from_ready() {
        let state = TargetState::new();
        state.quarantine(ErrorKind::AuthenticationError);
        state.mark_active();
        assert!(matches!(state.phase(), Phase::Quarantined(_)));
    }

    #[test]
    fn connection_error_threshold() {
        let state = TargetState::new();
        assert!(!state.record_connection_error());
        assert!(!state.record_connection_error());
        assert!(state.record_connection_error());
    }

    #[test]
    fn success_resets_the_run() {
        let state = TargetState::new();
        state.record_connection_error();
        state.record_connection_error();
        state.reset_connection_errors();
        assert!(!state.record_connection_error());
        assert!(!state.record_connection_error());
        assert!(state.record_connection_error());
    }
}
