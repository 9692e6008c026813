//! Per-process observation bookkeeping.
//!
//! Each running process moves through Unobserved -> Observed -> Removed.
//! `ProcessTable` owns the observer handles exclusively and guarantees each
//! one is released exactly once, on a termination event, on `clear`, or on
//! drop.

use crate::WatcherError;
use keyshift_core::Pid;
use std::collections::HashMap;
use tracing::{debug, warn};

/// Registers and releases OS-level "became frontmost" observers.
pub trait ObserverBackend {
    type Handle;

    fn register(&mut self, pid: Pid) -> Result<Self::Handle, WatcherError>;
    fn unregister(&mut self, pid: Pid, handle: Self::Handle);
}

/// Tracks which processes currently hold an observer.
pub struct ProcessTable<B: ObserverBackend> {
    backend: B,
    self_pid: Pid,
    observed: HashMap<Pid, B::Handle>,
}

impl<B: ObserverBackend> ProcessTable<B> {
    pub fn new(backend: B, self_pid: Pid) -> Self {
        Self {
            backend,
            self_pid,
            observed: HashMap::new(),
        }
    }

    /// Move a process to Observed. Invalid pids, the utility's own pid, and
    /// already-observed pids are rejected. A backend failure leaves the pid
    /// unobserved; some processes simply cannot be observed.
    pub fn observe(&mut self, pid: Pid) -> bool {
        if pid < 0 || pid == self.self_pid || self.observed.contains_key(&pid) {
            return false;
        }
        match self.backend.register(pid) {
            Ok(handle) => {
                debug!(pid, "observing process");
                self.observed.insert(pid, handle);
                true
            }
            Err(err) => {
                warn!(pid, error = %err, "could not observe process");
                false
            }
        }
    }

    /// Move a process to Removed, releasing its observer handle. No-op for
    /// processes that were never observed.
    pub fn forget(&mut self, pid: Pid) -> bool {
        match self.observed.remove(&pid) {
            Some(handle) => {
                debug!(pid, "releasing process observer");
                self.backend.unregister(pid, handle);
                true
            }
            None => false,
        }
    }

    /// Release every observer handle. Called on shutdown; also runs on drop.
    pub fn clear(&mut self) {
        for (pid, handle) in self.observed.drain() {
            self.backend.unregister(pid, handle);
        }
    }

    pub fn is_observed(&self, pid: Pid) -> bool {
        self.observed.contains_key(&pid)
    }

    pub fn len(&self) -> usize {
        self.observed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observed.is_empty()
    }
}

impl<B: ObserverBackend> Drop for ProcessTable<B> {
    fn drop(&mut self) {
        self.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::collections::HashSet;
    use std::rc::Rc;

    struct FakeBackend {
        live: Rc<RefCell<HashSet<Pid>>>,
        fail_for: Option<Pid>,
    }

    impl FakeBackend {
        fn new() -> (Self, Rc<RefCell<HashSet<Pid>>>) {
            let live = Rc::new(RefCell::new(HashSet::new()));
            (
                Self {
                    live: Rc::clone(&live),
                    fail_for: None,
                },
                live,
            )
        }
    }

    impl ObserverBackend for FakeBackend {
        type Handle = Pid;

        fn register(&mut self, pid: Pid) -> Result<Pid, WatcherError> {
            if self.fail_for == Some(pid) {
                return Err(WatcherError::ObserverFailed(pid));
            }
            assert!(
                self.live.borrow_mut().insert(pid),
                "double registration for pid {pid}"
            );
            Ok(pid)
        }

        fn unregister(&mut self, pid: Pid, handle: Pid) {
            assert_eq!(pid, handle);
            assert!(
                self.live.borrow_mut().remove(&pid),
                "double release for pid {pid}"
            );
        }
    }

    const SELF_PID: Pid = 99;

    #[test]
    fn test_launch_then_terminate_releases_handle() {
        let (backend, live) = FakeBackend::new();
        let mut table = ProcessTable::new(backend, SELF_PID);

        assert!(table.observe(42));
        assert!(table.is_observed(42));
        assert!(live.borrow().contains(&42));

        assert!(table.forget(42));
        assert!(!table.is_observed(42));
        assert!(live.borrow().is_empty());
    }

    #[test]
    fn test_forget_unobserved_pid_is_noop() {
        let (backend, _live) = FakeBackend::new();
        let mut table = ProcessTable::new(backend, SELF_PID);
        assert!(!table.forget(42));
    }

    #[test]
    fn test_observe_rejects_self_and_invalid_pids() {
        let (backend, live) = FakeBackend::new();
        let mut table = ProcessTable::new(backend, SELF_PID);

        assert!(!table.observe(SELF_PID));
        assert!(!table.observe(-1));
        assert!(live.borrow().is_empty());
    }

    #[test]
    fn test_observe_is_idempotent() {
        let (backend, live) = FakeBackend::new();
        let mut table = ProcessTable::new(backend, SELF_PID);

        assert!(table.observe(42));
        // Second attempt must not re-register (the fake panics on that).
        assert!(!table.observe(42));
        assert_eq!(live.borrow().len(), 1);
    }

    #[test]
    fn test_backend_failure_leaves_pid_unobserved() {
        let (mut backend, live) = FakeBackend::new();
        backend.fail_for = Some(42);
        let mut table = ProcessTable::new(backend, SELF_PID);

        assert!(!table.observe(42));
        assert!(!table.is_observed(42));
        assert!(live.borrow().is_empty());
        // Retrying after the failure is allowed.
        assert!(!table.observe(-5));
    }

    #[test]
    fn test_clear_releases_everything_once() {
        let (backend, live) = FakeBackend::new();
        let mut table = ProcessTable::new(backend, SELF_PID);
        for pid in [1, 2, 3] {
            assert!(table.observe(pid));
        }
        assert_eq!(table.len(), 3);

        table.clear();
        assert!(table.is_empty());
        assert!(live.borrow().is_empty());

        // Drop runs clear again; draining made it a no-op.
    }

    #[test]
    fn test_drop_releases_outstanding_handles() {
        let (backend, live) = FakeBackend::new();
        {
            let mut table = ProcessTable::new(backend, SELF_PID);
            table.observe(7);
            table.observe(8);
            assert_eq!(live.borrow().len(), 2);
        }
        assert!(live.borrow().is_empty());
    }
}
