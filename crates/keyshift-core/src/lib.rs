//! KeyShift Core Library
//!
//! Provides the condition data model, the condition store, the input source
//! switch policy engine, and settings persistence for KeyShift.

pub mod engine;
pub mod settings;
pub mod store;

pub use engine::{FrontmostProvider, InputSourceRegistry, SourceError, SwitchEngine, FOCUS_DEBOUNCE};
pub use settings::{SettingsError, SettingsStore};
pub use store::ConditionStore;

use serde::{Deserialize, Serialize};

/// OS process identifier. Scoped to the current boot session, never persisted.
pub type Pid = i32;

/// PNG file signature, used to validate persisted icon blobs at load time.
const PNG_SIGNATURE: [u8; 8] = [0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A];

/// An opaque encoded bitmap blob (PNG when captured on macOS).
///
/// The core never decodes image data; the blob travels between the platform
/// layer and the settings file untouched. Empty means "no icon".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IconBytes(pub Vec<u8>);

impl IconBytes {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Whether the blob starts with the PNG signature.
    pub fn is_png(&self) -> bool {
        self.0.starts_with(&PNG_SIGNATURE)
    }
}

/// A reference to a keyboard input source, captured from the system at the
/// moment a rule was created or updated. Immutable once captured.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputSourceRef {
    #[serde(rename = "inputSourceID")]
    pub id: String,
    #[serde(rename = "inputSourceIcon", default)]
    pub icon: IconBytes,
}

impl InputSourceRef {
    pub fn new(id: impl Into<String>, icon: IconBytes) -> Self {
        Self { id: id.into(), icon }
    }
}

/// A per-application switching rule.
///
/// `application_identifier` is the OS-level bundle identifier and the unique
/// key within a condition set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppCondition {
    #[serde(rename = "applicationIdentifier")]
    pub application_identifier: String,
    #[serde(flatten)]
    pub input_source: InputSourceRef,
    pub enabled: bool,
    #[serde(rename = "applicationName")]
    pub application_name: String,
    #[serde(rename = "applicationIcon", default)]
    pub application_icon: IconBytes,
}

/// The single fallback rule applied when no app condition matches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DefaultCondition {
    #[serde(flatten)]
    pub input_source: InputSourceRef,
    pub enabled: bool,
}

impl DefaultCondition {
    /// The "not configured yet" state: empty source id, disabled.
    pub fn placeholder() -> Self {
        Self {
            input_source: InputSourceRef::default(),
            enabled: false,
        }
    }

    pub fn is_placeholder(&self) -> bool {
        self.input_source.id.is_empty()
    }
}

impl Default for DefaultCondition {
    fn default() -> Self {
        Self::placeholder()
    }
}

/// The full persisted rule set: ordered app conditions (most recently added
/// first) plus exactly one default condition.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConditionSet {
    #[serde(rename = "commonConditions", default)]
    pub conditions: Vec<AppCondition>,
    #[serde(rename = "defaultCondition", default)]
    pub default: DefaultCondition,
}

/// What the OS reports as the frontmost application at a given instant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrontmostApp {
    pub pid: Pid,
    /// Bundle identifier. Absent for some system processes.
    pub bundle_id: Option<String>,
    pub name: String,
    pub icon: IconBytes,
}

/// Get the config directory for KeyShift.
pub fn config_dir() -> std::path::PathBuf {
    directories::ProjectDirs::from("com", "keyshift", "keyshift")
        .map(|dirs| dirs.config_dir().to_path_buf())
        .unwrap_or_else(|| {
            directories::BaseDirs::new()
                .map(|d| d.home_dir().join(".keyshift"))
                .unwrap_or_else(|| std::path::PathBuf::from(".keyshift"))
        })
}

/// Get the settings file path.
pub fn settings_path() -> std::path::PathBuf {
    config_dir().join("settings.json")
}
