//! Cancellation of runs in progress
//!
//! Runs started while no other run is active get a fresh token, so a
//! cancelled runner can be reused. Runs that overlap share one token and
//! are cancelled together.

use std::sync::{Arc, Mutex, MutexGuard};

use crate::pool::CancelToken;

#[derive(Debug, Default)]
struct ActiveRuns {
    token: CancelToken,
    active: usize,
}

/// Cancels whatever runs a `QueryRunner` has in progress
#[derive(Debug, Clone, Default)]
pub struct RunCanceller {
    runs: Arc<Mutex<ActiveRuns>>,
}

impl RunCanceller {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cancel every run currently in progress. Runs started afterwards are
    /// unaffected.
    pub fn cancel(&self) {
        self.lock().token.cancel();
    }

    /// Whether a run is in progress
    pub fn has_active_runs(&self) -> bool {
        self.lock().active > 0
    }

    /// Register a run; it stays registered until the guard drops
    pub(crate) fn begin(&self) -> ActiveRun {
        let mut runs = self.lock();
        if runs.active == 0 && runs.token.is_cancelled() {
            runs.token = CancelToken::new();
        }
        runs.active += 1;
        ActiveRun {
            token: runs.token.clone(),
            canceller: self.clone(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, ActiveRuns> {
        match self.runs.lock() {
            Ok(runs) => runs,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

/// Registration of one run with its canceller
pub(crate) struct ActiveRun {
    token: CancelToken,
    canceller: RunCanceller,
}

impl ActiveRun {
    pub(crate) fn token(&self) -> CancelToken {
        self.token.clone()
    }
}

impl Drop for ActiveRun {
    fn drop(&mut self) {
        let mut runs = self.canceller.lock();
        runs.active = runs.active.saturating_sub(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancel_reaches_active_run() {
        let canceller = RunCanceller::new();
        let run = canceller.begin();
        assert!(canceller.has_active_runs());

        canceller.cancel();
        assert!(run.token().is_cancelled());
    }

    #[test]
    fn test_next_run_gets_fresh_token() {
        let canceller = RunCanceller::new();
        let first = canceller.begin();
        canceller.cancel();
        drop(first);
        assert!(!canceller.has_active_runs());

        let second = canceller.begin();
        assert!(!second.token().is_cancelled());
    }

    #[test]
    fn test_cancel_while_idle_does_not_poison() {
        let canceller = RunCanceller::new();
        canceller.cancel();
        assert!(!canceller.begin().token().is_cancelled());
    }

    #[test]
    fn test_overlapping_runs_share_token() {
        let canceller = RunCanceller::new();
        let first = canceller.begin();
        let second = canceller.begin();
        canceller.cancel();
        drop(first);

        assert!(second.token().is_cancelled());
        let third = canceller.begin();
        assert!(third.token().is_cancelled());
    }
}
