//! The input source switch policy engine.
//!
//! Consumes debounced focus-change signals, decides which input source (if
//! any) to activate, and asks the registry to activate it. Every failure path
//! degrades to "do nothing" plus a diagnostic log; the engine never raises to
//! the event loop.

use crate::{AppCondition, ConditionStore, DefaultCondition, FrontmostApp, InputSourceRef, Pid};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Delay between a focus-change signal and policy evaluation. Absorbs the
/// transient intermediate events the OS emits during rapid focus churn;
/// evaluation re-reads the truly-frontmost app once the delay elapses.
pub const FOCUS_DEBOUNCE: Duration = Duration::from_millis(100);

#[derive(Error, Debug)]
pub enum SourceError {
    #[error("input source not found: {0}")]
    NotFound(String),
    #[error("failed to activate input source {id}: status {status}")]
    Activation { id: String, status: i32 },
    #[error("input source registry unavailable on this platform")]
    Unavailable,
    #[error("the frontmost application has no bundle identifier")]
    NoApplicationIdentifier,
}

/// Enumeration and activation of keyboard input sources.
pub trait InputSourceRegistry {
    /// Sources currently eligible for direct activation.
    fn list_activatable(&self) -> Vec<InputSourceRef>;

    /// The input source active right now, including its icon.
    fn current(&self) -> Result<InputSourceRef, SourceError>;

    /// Look up a source by its stable identifier. `NotFound` when the
    /// identifier no longer exists (e.g. the input method was uninstalled).
    fn resolve(&self, id: &str) -> Result<InputSourceRef, SourceError>;

    /// Request the OS make this the active source. Best-effort: callers log
    /// failures and continue.
    fn activate(&self, source: &InputSourceRef) -> Result<(), SourceError>;
}

/// Reports the frontmost application at evaluation time.
pub trait FrontmostProvider {
    fn frontmost(&self) -> Option<FrontmostApp>;
}

/// Decides and performs input source switches on focus changes.
pub struct SwitchEngine<R: InputSourceRegistry, F: FrontmostProvider> {
    store: Arc<Mutex<ConditionStore>>,
    registry: R,
    frontmost: F,
    self_pid: Pid,
    current_pid: Option<Pid>,
}

impl<R: InputSourceRegistry, F: FrontmostProvider> SwitchEngine<R, F> {
    pub fn new(store: Arc<Mutex<ConditionStore>>, registry: R, frontmost: F, self_pid: Pid) -> Self {
        Self {
            store,
            registry,
            frontmost,
            self_pid,
            current_pid: None,
        }
    }

    /// Run the switch policy once. Called after the debounce delay has
    /// elapsed for a focus-change signal; the frontmost app is re-read here
    /// rather than trusting the pid captured at signal time.
    pub fn evaluate(&mut self) {
        let Some(app) = self.frontmost.frontmost() else {
            debug!("no frontmost application, skipping evaluation");
            return;
        };
        if app.pid == self.self_pid {
            return;
        }
        if self.current_pid == Some(app.pid) {
            debug!(pid = app.pid, "focus unchanged, skipping evaluation");
            return;
        }
        let Some(bundle_id) = app.bundle_id.as_deref() else {
            debug!(pid = app.pid, "frontmost application has no identifier");
            return;
        };

        let (app_rule, default_rule) = {
            let store = match self.store.lock() {
                Ok(store) => store,
                Err(_) => {
                    warn!("condition store lock poisoned, skipping evaluation");
                    return;
                }
            };
            let app_rule = store.lookup(bundle_id).map(|c| c.input_source.id.clone());
            let default = store.default_condition();
            let default_rule = (default.enabled && !default.input_source.id.is_empty())
                .then(|| default.input_source.id.clone());
            (app_rule, default_rule)
        };

        let mut target: Option<InputSourceRef> = None;
        if let Some(id) = app_rule {
            match self.registry.resolve(&id) {
                Ok(source) => target = Some(source),
                // A rule pointing at a removed source is not an error; fall
                // through to the default rule.
                Err(err) => {
                    debug!(source = %id, app = %bundle_id, error = %err,
                        "configured input source unavailable, falling back to default");
                }
            }
        }
        if target.is_none() {
            if let Some(id) = default_rule {
                match self.registry.resolve(&id) {
                    Ok(source) => target = Some(source),
                    Err(err) => {
                        debug!(source = %id, error = %err, "default input source unavailable");
                    }
                }
            }
        }

        if let Some(source) = target {
            match self.registry.activate(&source) {
                Ok(()) => info!(source = %source.id, app = %bundle_id, "switched input source"),
                Err(err) => warn!(source = %source.id, error = %err, "failed to activate input source"),
            }
        }

        // Track true focus changes, not switch outcomes: the dedup guard
        // above must fire even when no activation happened.
        self.current_pid = Some(app.pid);
    }

    pub fn current_pid(&self) -> Option<Pid> {
        self.current_pid
    }
}

/// Snapshot an app condition from the live system state at the moment of the
/// user command: the input source active right now, bound to the frontmost
/// application's identity.
pub fn capture_condition<R: InputSourceRegistry>(
    registry: &R,
    app: &FrontmostApp,
) -> Result<AppCondition, SourceError> {
    // An identifier-less application cannot be matched later; refuse to
    // record a condition under an empty key.
    let Some(application_identifier) = app.bundle_id.clone() else {
        return Err(SourceError::NoApplicationIdentifier);
    };
    let current = registry.current()?;
    Ok(AppCondition {
        application_identifier,
        input_source: current,
        enabled: true,
        application_name: app.name.clone(),
        application_icon: app.icon.clone(),
    })
}

/// Snapshot the default condition from the input source active right now.
pub fn capture_default<R: InputSourceRegistry>(
    registry: &R,
    enabled: bool,
) -> Result<DefaultCondition, SourceError> {
    Ok(DefaultCondition {
        input_source: registry.current()?,
        enabled,
    })
}
