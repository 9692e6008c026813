//! The in-memory condition store.
//!
//! Owns the ordered app-condition sequence and the singleton default
//! condition. All mutation happens on one logical thread; consumers that need
//! sharing wrap the store in `Arc<Mutex<_>>`.

use crate::{AppCondition, ConditionSet, DefaultCondition, InputSourceRef};

/// Single-writer store for the condition set.
///
/// Ordering: new conditions are inserted at the front (most recently added
/// first); updating an existing condition preserves its position.
#[derive(Debug, Default)]
pub struct ConditionStore {
    set: ConditionSet,
}

impl ConditionStore {
    /// An empty store with a placeholder default condition.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store from a loaded set, re-establishing invariants.
    pub fn from_set(set: ConditionSet) -> Self {
        let mut store = Self::new();
        store.restore(set);
        store
    }

    /// Look up the rule for an application. Disabled rules are invisible
    /// here: the policy engine must never act on them, even though they
    /// remain in `snapshot()` for the editor.
    pub fn lookup(&self, application_identifier: &str) -> Option<&AppCondition> {
        self.set
            .conditions
            .iter()
            .filter(|c| c.enabled)
            .find(|c| c.application_identifier == application_identifier)
    }

    /// Insert a condition, or replace the existing one with the same
    /// application identifier in place.
    pub fn upsert(&mut self, condition: AppCondition) {
        match self
            .set
            .conditions
            .iter_mut()
            .find(|c| c.application_identifier == condition.application_identifier)
        {
            Some(existing) => *existing = condition,
            None => self.set.conditions.insert(0, condition),
        }
    }

    /// Delete the condition for an application. Returns false if absent.
    pub fn remove(&mut self, application_identifier: &str) -> bool {
        let before = self.set.conditions.len();
        self.set
            .conditions
            .retain(|c| c.application_identifier != application_identifier);
        self.set.conditions.len() != before
    }

    /// Replace the singleton default condition.
    pub fn set_default(&mut self, input_source: InputSourceRef, enabled: bool) {
        self.set.default = DefaultCondition {
            input_source,
            enabled,
        };
    }

    /// Flip the enabled flag of an app condition without touching other
    /// fields. Returns false if the identifier is unknown.
    pub fn toggle(&mut self, application_identifier: &str, enabled: bool) -> bool {
        match self
            .set
            .conditions
            .iter_mut()
            .find(|c| c.application_identifier == application_identifier)
        {
            Some(condition) => {
                condition.enabled = enabled;
                true
            }
            None => false,
        }
    }

    /// Flip the enabled flag of the default condition.
    pub fn toggle_default(&mut self, enabled: bool) {
        self.set.default.enabled = enabled;
    }

    /// Read-only copy for persistence and rendering.
    pub fn snapshot(&self) -> ConditionSet {
        self.set.clone()
    }

    /// Bulk-replace from a loaded set. Duplicate identifiers are dropped,
    /// first occurrence wins, so a hand-edited settings file cannot break
    /// the uniqueness invariant.
    pub fn restore(&mut self, set: ConditionSet) {
        let mut conditions: Vec<AppCondition> = Vec::with_capacity(set.conditions.len());
        for condition in set.conditions {
            if !conditions
                .iter()
                .any(|c| c.application_identifier == condition.application_identifier)
            {
                conditions.push(condition);
            }
        }
        self.set = ConditionSet {
            conditions,
            default: set.default,
        };
    }

    pub fn conditions(&self) -> &[AppCondition] {
        &self.set.conditions
    }

    pub fn default_condition(&self) -> &DefaultCondition {
        &self.set.default
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::IconBytes;

    fn condition(app_id: &str, source_id: &str, enabled: bool) -> AppCondition {
        AppCondition {
            application_identifier: app_id.to_string(),
            input_source: InputSourceRef::new(source_id, IconBytes::default()),
            enabled,
            application_name: app_id.rsplit('.').next().unwrap_or(app_id).to_string(),
            application_icon: IconBytes::default(),
        }
    }

    #[test]
    fn test_upsert_inserts_at_front() {
        let mut store = ConditionStore::new();
        store.upsert(condition("com.test.first", "src.a", true));
        store.upsert(condition("com.test.second", "src.b", true));

        let ids: Vec<&str> = store
            .conditions()
            .iter()
            .map(|c| c.application_identifier.as_str())
            .collect();
        assert_eq!(ids, ["com.test.second", "com.test.first"]);
    }

    #[test]
    fn test_upsert_never_duplicates_identifier() {
        let mut store = ConditionStore::new();
        store.upsert(condition("com.test.app", "src.a", true));
        store.upsert(condition("com.test.other", "src.b", true));
        store.upsert(condition("com.test.app", "src.c", true));

        let matching: Vec<_> = store
            .conditions()
            .iter()
            .filter(|c| c.application_identifier == "com.test.app")
            .collect();
        assert_eq!(matching.len(), 1);
        assert_eq!(matching[0].input_source.id, "src.c");
    }

    #[test]
    fn test_upsert_preserves_position_on_update() {
        let mut store = ConditionStore::new();
        store.upsert(condition("com.test.a", "src.1", true));
        store.upsert(condition("com.test.b", "src.2", true));
        store.upsert(condition("com.test.c", "src.3", true));

        // Update the middle entry; it must stay in the middle.
        store.upsert(condition("com.test.b", "src.9", true));

        let ids: Vec<&str> = store
            .conditions()
            .iter()
            .map(|c| c.application_identifier.as_str())
            .collect();
        assert_eq!(ids, ["com.test.c", "com.test.b", "com.test.a"]);
        assert_eq!(store.conditions()[1].input_source.id, "src.9");
    }

    #[test]
    fn test_lookup_ignores_disabled_conditions() {
        let mut store = ConditionStore::new();
        store.upsert(condition("com.test.app", "src.a", true));
        assert!(store.lookup("com.test.app").is_some());

        assert!(store.toggle("com.test.app", false));
        assert!(store.lookup("com.test.app").is_none());

        // The record still exists for the editor.
        assert_eq!(store.snapshot().conditions.len(), 1);
        assert!(!store.snapshot().conditions[0].enabled);

        assert!(store.toggle("com.test.app", true));
        assert!(store.lookup("com.test.app").is_some());
    }

    #[test]
    fn test_toggle_unknown_identifier_is_noop() {
        let mut store = ConditionStore::new();
        assert!(!store.toggle("com.test.missing", true));
    }

    #[test]
    fn test_remove() {
        let mut store = ConditionStore::new();
        store.upsert(condition("com.test.app", "src.a", true));
        assert!(store.remove("com.test.app"));
        assert!(!store.remove("com.test.app"));
        assert!(store.conditions().is_empty());
    }

    #[test]
    fn test_default_condition_always_present() {
        let mut store = ConditionStore::new();
        assert!(store.default_condition().is_placeholder());

        store.set_default(InputSourceRef::new("src.default", IconBytes::default()), true);
        assert!(!store.default_condition().is_placeholder());
        assert!(store.default_condition().enabled);

        store.toggle_default(false);
        assert!(!store.default_condition().enabled);
        assert_eq!(store.default_condition().input_source.id, "src.default");

        store.restore(ConditionSet::default());
        assert!(store.default_condition().is_placeholder());
    }

    #[test]
    fn test_snapshot_restore_round_trip() {
        let mut store = ConditionStore::new();
        store.upsert(condition("com.test.a", "src.1", true));
        store.upsert(condition("com.test.b", "src.2", false));
        store.set_default(InputSourceRef::new("src.default", IconBytes::default()), true);

        let snapshot = store.snapshot();
        let mut restored = ConditionStore::new();
        restored.restore(snapshot.clone());

        assert_eq!(restored.snapshot(), snapshot);
    }

    #[test]
    fn test_restore_deduplicates_keeping_first() {
        let set = ConditionSet {
            conditions: vec![
                condition("com.test.app", "src.a", true),
                condition("com.test.app", "src.b", true),
            ],
            default: DefaultCondition::placeholder(),
        };
        let store = ConditionStore::from_set(set);
        assert_eq!(store.conditions().len(), 1);
        assert_eq!(store.conditions()[0].input_source.id, "src.a");
    }
}
