//! Management session guard
//!
//! A single atomically compare-and-swapped flag serializing
//! StartManagement/EndManagement pairs from the security manager. The
//! guard detects an interrupted administrative session (double start, end
//! without start); it does not provide mutual exclusion over the
//! operations themselves. Process-lifetime only: a restart resets it to
//! "not started".

use lattice_core::{PermissionError, PermissionResult};
use std::sync::atomic::{AtomicU8, Ordering};

const NOT_STARTED: u8 = 0;
const STARTED: u8 = 1;

/// Lock-free double-entry detector for management sessions
#[derive(Debug, Default)]
pub struct ManagementSessionGuard {
    state: AtomicU8,
}

impl ManagementSessionGuard {
    /// Create a guard in the "not started" state
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark the start of a management session
    ///
    /// Fails with `MANAGEMENT_ALREADY_STARTED` when a session is already
    /// open, which signals that a previous session was interrupted.
    pub fn start_management(&self) -> PermissionResult<()> {
        self.state
            .compare_exchange(NOT_STARTED, STARTED, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| ())
            .map_err(|_| PermissionError::ManagementAlreadyStarted)
    }

    /// Mark the end of a management session
    ///
    /// Fails with `MANAGEMENT_NOT_STARTED` when no session is open.
    pub fn end_management(&self) -> PermissionResult<()> {
        self.state
            .compare_exchange(STARTED, NOT_STARTED, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| ())
            .map_err(|_| PermissionError::ManagementNotStarted)
    }

    /// Whether a session is currently open
    pub fn is_started(&self) -> bool {
        self.state.load(Ordering::Acquire) == STARTED
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn start_end_pairs_succeed() {
        let guard = ManagementSessionGuard::new();
        assert!(!guard.is_started());
        guard.start_management().unwrap();
        assert!(guard.is_started());
        guard.end_management().unwrap();
        assert!(!guard.is_started());
        // a second full pair works after the first
        guard.start_management().unwrap();
        guard.end_management().unwrap();
    }

    #[test]
    fn double_start_is_detected() {
        let guard = ManagementSessionGuard::new();
        guard.start_management().unwrap();
        assert_matches!(
            guard.start_management(),
            Err(PermissionError::ManagementAlreadyStarted)
        );
        // the session is still open; a single end closes it
        guard.end_management().unwrap();
    }

    #[test]
    fn end_without_start_is_detected() {
        let guard = ManagementSessionGuard::new();
        assert_matches!(
            guard.end_management(),
            Err(PermissionError::ManagementNotStarted)
        );
    }

    #[test]
    fn concurrent_starts_admit_exactly_one() {
        use std::sync::Arc;
        let guard = Arc::new(ManagementSessionGuard::new());
        let mut handles = Vec::new();
        for _ in 0..8 {
            let guard = Arc::clone(&guard);
            handles.push(std::thread::spawn(move || {
                guard.start_management().is_ok()
            }));
        }
        let successes = handles
            .into_iter()
            .map(|h| h.join().unwrap_or(false))
            .filter(|ok| *ok)
            .count();
        assert_eq!(successes, 1);
    }
}
