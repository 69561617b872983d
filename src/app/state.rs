use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Shared session state: the single running/cancellation flag.
///
/// The cycle-runner worker is the only writer of counters; this flag is the
/// only field touched from other contexts (stop requests, the volume-key
/// listener). Readers tolerate staleness -- it is checked at user/cycle
/// boundaries, never mid-sequence -- so relaxed atomics are enough.
pub struct SessionState {
    running: Arc<AtomicBool>,
}

impl SessionState {
    pub fn new() -> Self {
        Self {
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Clone of the flag for the listener and the worker.
    pub fn running_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.running)
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }

    /// Idle -> Running transition. Exactly one run may be active at a time;
    /// returns false when a run already holds the flag.
    pub fn try_begin_run(&self) -> bool {
        self.running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    /// Cooperative cancellation: the worker notices at the next boundary.
    pub fn request_stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }
}

impl Default for SessionState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_one_run_may_hold_the_flag() {
        let session = SessionState::new();
        assert!(!session.is_running());
        assert!(session.try_begin_run());
        assert!(session.is_running());
        assert!(!session.try_begin_run(), "second start must be rejected");
        session.request_stop();
        assert!(!session.is_running());
        assert!(session.try_begin_run());
    }
}
