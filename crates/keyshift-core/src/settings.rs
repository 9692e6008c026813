//! Settings persistence.
//!
//! The condition set is stored as one JSON document with two named records,
//! `commonConditions` and `defaultCondition`. Loading is lenient: a corrupt
//! record is skipped with a warning rather than aborting the rest of the set,
//! and icon blobs are only checked for a valid PNG signature, never decoded.

use crate::{AppCondition, ConditionSet, DefaultCondition, IconBytes};
use serde_json::Value;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Error, Debug)]
pub enum SettingsError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed settings file: {0}")]
    Malformed(#[from] serde_json::Error),
}

pub struct SettingsStore {
    path: PathBuf,
}

impl SettingsStore {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    /// Store at the default settings path.
    pub fn open_default() -> Self {
        Self::new(crate::settings_path())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the condition set. A missing file yields the default set; a
    /// file that is not valid JSON is an error. Within a valid document,
    /// decode failures are isolated per record.
    pub fn load(&self) -> Result<ConditionSet, SettingsError> {
        let contents = match std::fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "no settings file, starting empty");
                return Ok(ConditionSet::default());
            }
            Err(err) => return Err(err.into()),
        };
        let document: Value = serde_json::from_str(&contents)?;

        let mut conditions = Vec::new();
        if let Some(records) = document.get("commonConditions").and_then(Value::as_array) {
            for record in records {
                match serde_json::from_value::<AppCondition>(record.clone()) {
                    Ok(mut condition) => {
                        validate_icon(&mut condition.input_source.icon, "inputSourceIcon");
                        validate_icon(&mut condition.application_icon, "applicationIcon");
                        conditions.push(condition);
                    }
                    Err(err) => {
                        warn!(error = %err, "skipping corrupt condition record");
                    }
                }
            }
        }

        let default = match document.get("defaultCondition") {
            Some(record) => match serde_json::from_value::<DefaultCondition>(record.clone()) {
                Ok(mut default) => {
                    validate_icon(&mut default.input_source.icon, "inputSourceIcon");
                    default
                }
                Err(err) => {
                    warn!(error = %err, "corrupt default condition, using placeholder");
                    DefaultCondition::placeholder()
                }
            },
            None => DefaultCondition::placeholder(),
        };

        Ok(ConditionSet {
            conditions,
            default,
        })
    }

    /// Persist the condition set, creating the parent directory if needed.
    pub fn save(&self, set: &ConditionSet) -> Result<(), SettingsError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(set)?;
        std::fs::write(&self.path, contents)?;
        Ok(())
    }
}

/// A non-empty icon blob that does not carry the PNG signature failed to
/// round-trip; reset that field only, the record survives.
fn validate_icon(icon: &mut IconBytes, field: &str) {
    if !icon.is_empty() && !icon.is_png() {
        warn!(field, "discarding undecodable icon blob");
        *icon = IconBytes::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{InputSourceRef, PNG_SIGNATURE};
    use tempfile::tempdir;

    fn png_blob() -> IconBytes {
        let mut bytes = PNG_SIGNATURE.to_vec();
        bytes.extend_from_slice(&[0, 0, 0, 0]);
        IconBytes(bytes)
    }

    fn condition(app_id: &str, source_id: &str) -> AppCondition {
        AppCondition {
            application_identifier: app_id.to_string(),
            input_source: InputSourceRef::new(source_id, png_blob()),
            enabled: true,
            application_name: "Test".to_string(),
            application_icon: png_blob(),
        }
    }

    #[test]
    fn test_load_missing_file_yields_default_set() {
        let dir = tempdir().unwrap();
        let store = SettingsStore::new(dir.path().join("settings.json"));
        let set = store.load().unwrap();
        assert!(set.conditions.is_empty());
        assert!(set.default.is_placeholder());
    }

    #[test]
    fn test_save_load_round_trip() {
        let dir = tempdir().unwrap();
        let store = SettingsStore::new(dir.path().join("settings.json"));

        let set = ConditionSet {
            conditions: vec![condition("com.test.a", "src.1"), condition("com.test.b", "src.2")],
            default: DefaultCondition {
                input_source: InputSourceRef::new("src.default", png_blob()),
                enabled: true,
            },
        };

        store.save(&set).unwrap();
        let loaded = store.load().unwrap();
        assert_eq!(loaded, set);
    }

    #[test]
    fn test_corrupt_record_does_not_abort_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(
            &path,
            r#"{
                "commonConditions": [
                    {"applicationIdentifier": "com.test.good", "inputSourceID": "src.1",
                     "enabled": true, "applicationName": "Good"},
                    {"applicationIdentifier": "com.test.bad", "inputSourceID": "src.2",
                     "enabled": "yes", "applicationName": "Bad"},
                    {"applicationIdentifier": "com.test.other", "inputSourceID": "src.3",
                     "enabled": false, "applicationName": "Other"}
                ],
                "defaultCondition": {"inputSourceID": "src.d", "enabled": true}
            }"#,
        )
        .unwrap();

        let set = SettingsStore::new(&path).load().unwrap();
        let ids: Vec<&str> = set
            .conditions
            .iter()
            .map(|c| c.application_identifier.as_str())
            .collect();
        assert_eq!(ids, ["com.test.good", "com.test.other"]);
        assert_eq!(set.default.input_source.id, "src.d");
    }

    #[test]
    fn test_invalid_icon_blob_is_cleared_record_survives() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(
            &path,
            r#"{
                "commonConditions": [
                    {"applicationIdentifier": "com.test.app", "inputSourceID": "src.1",
                     "inputSourceIcon": [1, 2, 3], "enabled": true,
                     "applicationName": "Test", "applicationIcon": [4, 5, 6]}
                ]
            }"#,
        )
        .unwrap();

        let set = SettingsStore::new(&path).load().unwrap();
        assert_eq!(set.conditions.len(), 1);
        assert!(set.conditions[0].input_source.icon.is_empty());
        assert!(set.conditions[0].application_icon.is_empty());
        assert!(set.default.is_placeholder());
    }

    #[test]
    fn test_corrupt_default_falls_back_to_placeholder() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(
            &path,
            r#"{"commonConditions": [], "defaultCondition": {"inputSourceID": 7}}"#,
        )
        .unwrap();

        let set = SettingsStore::new(&path).load().unwrap();
        assert!(set.default.is_placeholder());
        assert!(!set.default.enabled);
    }

    #[test]
    fn test_unparseable_file_is_an_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, "not json at all").unwrap();

        assert!(matches!(
            SettingsStore::new(&path).load(),
            Err(SettingsError::Malformed(_))
        ));
    }
}
