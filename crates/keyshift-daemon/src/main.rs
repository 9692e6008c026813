//! KeyShift Daemon
//!
//! Watches application focus changes and switches the keyboard input source
//! according to the configured conditions. The platform watcher runs on the
//! main thread (macOS requires its run loop there); policy evaluation runs on
//! a single worker thread that owns all mutable switching state.

use anyhow::{Context, Result};
use keyshift_core::{
    ConditionStore, FrontmostProvider, InputSourceRegistry, SettingsStore, SwitchEngine,
    FOCUS_DEBOUNCE,
};
use keyshift_watcher::{
    has_accessibility_permission, FocusWatcher, SystemFrontmost, SystemInputSources, WatcherEvent,
};
use std::collections::VecDeque;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Instant;
use tracing::{debug, info, warn};

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("keyshift=info".parse()?),
        )
        .init();

    info!("KeyShift daemon starting...");

    // Without accessibility permission the watcher cannot observe focus at
    // all. Surface it once and exit; the OS prompt has been triggered.
    if !has_accessibility_permission(true) {
        anyhow::bail!(
            "KeyShift requires accessibility permission. \
             Grant it in System Settings > Privacy & Security > Accessibility, then relaunch."
        );
    }

    // Conditions are loaded before any process is observed.
    let settings = SettingsStore::open_default();
    let set = settings
        .load()
        .with_context(|| format!("failed to load settings from {}", settings.path().display()))?;
    info!(
        conditions = set.conditions.len(),
        default_enabled = set.default.enabled,
        "loaded condition set"
    );
    let store = Arc::new(Mutex::new(ConditionStore::from_set(set)));

    let engine = SwitchEngine::new(
        Arc::clone(&store),
        SystemInputSources,
        SystemFrontmost,
        std::process::id() as keyshift_core::Pid,
    );

    let (tx, rx) = mpsc::channel();
    let reload_store = Arc::clone(&store);
    let evaluator = thread::spawn(move || {
        run_engine_loop(rx, engine, move || {
            reload_conditions(&settings, &reload_store)
        })
    });

    // Blocks on the main run loop until the process is asked to stop.
    let result = FocusWatcher::run(tx);

    if evaluator.join().is_err() {
        debug!("evaluation thread panicked during shutdown");
    }
    // The daemon never writes the settings file; the CLI owns it. Writing
    // here would clobber edits made while the daemon was running.
    result.context("focus watcher failed")?;

    info!("KeyShift daemon stopped");
    Ok(())
}

/// Re-reads the settings file into the shared store so edits made by the
/// CLI take effect without a daemon restart. A load failure keeps whatever
/// conditions are already in memory.
fn reload_conditions(settings: &SettingsStore, store: &Mutex<ConditionStore>) {
    match settings.load() {
        Ok(set) => {
            if let Ok(mut store) = store.lock() {
                store.restore(set);
            }
        }
        Err(err) => warn!(error = %err, "could not reload conditions; keeping current set"),
    }
}

/// Debounced evaluation loop. Every focus signal schedules its own
/// evaluation deadline; evaluations re-read live OS state, so overlapping
/// deadlines are safe and deliberately not coalesced. `refresh` runs before
/// each evaluation to pick up external edits to the condition set.
fn run_engine_loop<R: InputSourceRegistry, F: FrontmostProvider>(
    rx: Receiver<WatcherEvent>,
    mut engine: SwitchEngine<R, F>,
    mut refresh: impl FnMut(),
) {
    let mut pending: VecDeque<Instant> = VecDeque::new();
    loop {
        let event = match pending.front().copied() {
            Some(deadline) => {
                let now = Instant::now();
                if deadline <= now {
                    pending.pop_front();
                    refresh();
                    engine.evaluate();
                    continue;
                }
                match rx.recv_timeout(deadline - now) {
                    Ok(event) => Some(event),
                    Err(RecvTimeoutError::Timeout) => {
                        pending.pop_front();
                        refresh();
                        engine.evaluate();
                        continue;
                    }
                    Err(RecvTimeoutError::Disconnected) => None,
                }
            }
            None => rx.recv().ok(),
        };

        match event {
            Some(WatcherEvent::FocusChanged(pid)) => {
                debug!(pid, "focus change reported");
                pending.push_back(Instant::now() + FOCUS_DEBOUNCE);
            }
            None => {
                // Watcher gone; run whatever was already scheduled and stop.
                for _ in pending.drain(..) {
                    refresh();
                    engine.evaluate();
                }
                break;
            }
        }
    }
}
