//! Platform-specific glue: frontmost application lookup, accessibility
//! permission, and the system input source registry.

#[cfg(target_os = "macos")]
pub(crate) mod macos;

use keyshift_core::{FrontmostApp, FrontmostProvider, InputSourceRef, InputSourceRegistry, SourceError};

/// The application currently receiving keyboard focus, or `None` when the OS
/// reports nothing (or on unsupported platforms).
pub fn frontmost_app() -> Option<FrontmostApp> {
    #[cfg(target_os = "macos")]
    {
        macos::frontmost_app()
    }
    #[cfg(not(target_os = "macos"))]
    {
        None
    }
}

/// Whether the process holds accessibility (focus-observation) permission.
/// With `prompt` set, the OS shows its grant dialog on first refusal.
///
/// Non-macOS targets report true so callers surface the more useful
/// `Unsupported` error from the watcher instead.
pub fn has_accessibility_permission(prompt: bool) -> bool {
    #[cfg(target_os = "macos")]
    {
        macos::has_accessibility_permission(prompt)
    }
    #[cfg(not(target_os = "macos"))]
    {
        let _ = prompt;
        true
    }
}

/// `FrontmostProvider` backed by the live OS.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemFrontmost;

impl FrontmostProvider for SystemFrontmost {
    fn frontmost(&self) -> Option<FrontmostApp> {
        frontmost_app()
    }
}

/// `InputSourceRegistry` backed by the OS text input sources.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemInputSources;

impl InputSourceRegistry for SystemInputSources {
    fn list_activatable(&self) -> Vec<InputSourceRef> {
        #[cfg(target_os = "macos")]
        {
            macos::list_activatable_sources()
        }
        #[cfg(not(target_os = "macos"))]
        {
            Vec::new()
        }
    }

    fn current(&self) -> Result<InputSourceRef, SourceError> {
        #[cfg(target_os = "macos")]
        {
            macos::current_source()
        }
        #[cfg(not(target_os = "macos"))]
        {
            Err(SourceError::Unavailable)
        }
    }

    fn resolve(&self, id: &str) -> Result<InputSourceRef, SourceError> {
        #[cfg(target_os = "macos")]
        {
            macos::resolve_source(id)
        }
        #[cfg(not(target_os = "macos"))]
        {
            let _ = id;
            Err(SourceError::Unavailable)
        }
    }

    fn activate(&self, source: &InputSourceRef) -> Result<(), SourceError> {
        #[cfg(target_os = "macos")]
        {
            macos::activate_source(&source.id)
        }
        #[cfg(not(target_os = "macos"))]
        {
            let _ = source;
            Err(SourceError::Unavailable)
        }
    }
}
