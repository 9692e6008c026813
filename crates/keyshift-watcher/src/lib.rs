//! Focus-change watcher for KeyShift.
//!
//! Observes process activation and lifecycle events for every running
//! process and emits normalized `FocusChanged` signals. The watcher does not
//! filter or debounce; that responsibility belongs to the consumer. On macOS
//! this runs on AX observers and NSWorkspace notifications; other targets
//! compile with stubs that report `Unsupported`.

pub mod platform;
pub mod tracker;

pub use platform::{frontmost_app, has_accessibility_permission, SystemFrontmost, SystemInputSources};
pub use tracker::{ObserverBackend, ProcessTable};

use keyshift_core::Pid;
use std::sync::mpsc::Sender;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum WatcherError {
    #[error("accessibility permission not granted")]
    PermissionDenied,
    #[error("failed to create focus observer for pid {0}")]
    ObserverFailed(Pid),
    #[error("focus watching is not supported on this platform")]
    Unsupported,
}

/// Normalized signal emitted by the watcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatcherEvent {
    /// A process reported that it became frontmost. Consumers should re-read
    /// the truly-frontmost application at evaluation time rather than trust
    /// this pid.
    FocusChanged(Pid),
}

/// Entry point for focus watching.
pub struct FocusWatcher;

impl FocusWatcher {
    /// Enumerate running processes, subscribe to launch/termination and
    /// activation events, and block servicing them. On macOS this must run
    /// on the main thread (it drives the main run loop). All observer
    /// handles are released before this returns.
    pub fn run(tx: Sender<WatcherEvent>) -> Result<(), WatcherError> {
        #[cfg(target_os = "macos")]
        {
            platform::macos::run_watcher(tx)
        }
        #[cfg(not(target_os = "macos"))]
        {
            let _ = tx;
            Err(WatcherError::Unsupported)
        }
    }
}
