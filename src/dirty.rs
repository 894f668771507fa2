//! Dirty-state tracking.
//!
//! A unit of work snapshots an object's attribute values twice: "previous"
//! when the object is loaded, "current" just before it is saved. The diff of
//! the two is the dirty set driving the partial Update builder.
//!
//! Diff rules: an attribute is dirty if it exists only in the current
//! snapshot, only in the previous snapshot, or in both with unequal values.
//! No previous snapshot degrades to "everything is dirty" (first save); an
//! empty current snapshot yields an empty set (no-op save). Computation
//! never errors.

use crate::entity::Persistent;
use crate::metadata::{EntityDefinition, EXTENDED_PREFIX};
use crate::value::Value;
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// Attribute name to value, extended entries under the
/// `ExtendedProperties.` prefix.
pub type Snapshot = BTreeMap<String, Value>;

/// Per-unit-of-work snapshot store, keyed by `type:id`. Owned exclusively by
/// the unit of work and dropped with it.
#[derive(Debug, Default)]
pub struct ChangeTracker {
    previous: HashMap<String, Snapshot>,
    current: HashMap<String, Snapshot>,
}

/// Snapshot key of one instance.
pub fn instance_key<T: Persistent>(id: &str) -> String {
    format!("{}:{id}", T::type_name())
}

/// Capture every standard attribute the object exposes plus, for extensible
/// instances, every key currently present in the extended bag.
pub fn capture<T: Persistent>(definition: &EntityDefinition, object: &T) -> Snapshot {
    let mut snapshot = Snapshot::new();
    for attribute in definition.attributes().iter() {
        if let Some(value) = object.get(&attribute.name) {
            snapshot.insert(attribute.name.clone(), value);
        }
    }
    if let Some(view) = object.extension() {
        for (name, value) in view.bag {
            snapshot.insert(format!("{EXTENDED_PREFIX}{name}"), value.clone());
        }
    }
    snapshot
}

impl ChangeTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the as-loaded state of an instance.
    pub fn snapshot_previous<T: Persistent>(
        &mut self,
        definition: &EntityDefinition,
        id: &str,
        object: &T,
    ) {
        self.previous
            .insert(instance_key::<T>(id), capture(definition, object));
    }

    /// Record the about-to-save state of an instance.
    pub fn snapshot_current<T: Persistent>(
        &mut self,
        definition: &EntityDefinition,
        id: &str,
        object: &T,
    ) {
        self.current
            .insert(instance_key::<T>(id), capture(definition, object));
    }

    /// The dirty set of an instance, from whatever snapshots exist.
    pub fn dirty_attributes(&self, key: &str) -> BTreeSet<String> {
        let current = self.current.get(key);
        let previous = self.previous.get(key);
        match (previous, current) {
            (_, None) => BTreeSet::new(),
            (None, Some(current)) => current.keys().cloned().collect(),
            (Some(previous), Some(current)) => diff(previous, current),
        }
    }

    /// After a successful save the saved state becomes the new baseline.
    pub fn promote_current(&mut self, key: &str) {
        if let Some(snapshot) = self.current.remove(key) {
            self.previous.insert(key.to_string(), snapshot);
        }
    }

    /// Forget an instance (deleted, or evicted from the unit of work).
    pub fn forget(&mut self, key: &str) {
        self.previous.remove(key);
        self.current.remove(key);
    }
}

fn diff(previous: &Snapshot, current: &Snapshot) -> BTreeSet<String> {
    // An empty current snapshot means a no-op save, not a mass removal.
    if current.is_empty() {
        return BTreeSet::new();
    }
    let mut dirty = BTreeSet::new();
    for (name, value) in current {
        match previous.get(name) {
            Some(old) if old == value => {}
            _ => {
                dirty.insert(name.clone());
            }
        }
    }
    for name in previous.keys() {
        if !current.contains_key(name) {
            dirty.insert(name.clone());
        }
    }
    dirty
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::{AttributeError, ExtensionView};
    use crate::metadata::AttributeInfo;
    use crate::value::ValueKind;

    #[derive(Default, Clone, Debug)]
    struct Ticket {
        id: String,
        title: Option<String>,
        bag: BTreeMap<String, Value>,
    }

    impl Persistent for Ticket {
        fn type_name() -> &'static str {
            "Ticket"
        }

        fn get(&self, attribute: &str) -> Option<Value> {
            match attribute {
                "ID" => Some(Value::Text(self.id.clone())),
                "Title" => Some(self.title.clone().map(Value::Text).unwrap_or(Value::Null)),
                _ => None,
            }
        }

        fn set(&mut self, attribute: &str, value: Value) -> Result<(), AttributeError> {
            match attribute {
                "ID" => {
                    self.id = value.as_text().unwrap_or_default().to_string();
                    Ok(())
                }
                "Title" => {
                    self.title = value.as_text().map(str::to_string);
                    Ok(())
                }
                _ => Err(AttributeError::new(attribute, "no such attribute")),
            }
        }

        fn extension(&self) -> Option<ExtensionView<'_>> {
            Some(ExtensionView {
                system_id: "s",
                repository_id: "r",
                entity_id: "entity-1",
                bag: &self.bag,
            })
        }

        fn extension_mut(&mut self) -> Option<&mut BTreeMap<String, Value>> {
            Some(&mut self.bag)
        }
    }

    fn definition() -> EntityDefinition {
        EntityDefinition::new(
            "Ticket",
            "Tickets",
            "ID",
            vec![
                AttributeInfo::new("ID", ValueKind::Text),
                AttributeInfo::new("Title", ValueKind::Text),
            ],
        )
        .unwrap()
    }

    fn ticket() -> Ticket {
        let mut bag = BTreeMap::new();
        bag.insert("Priority".to_string(), Value::Int(1));
        Ticket {
            id: "t1".into(),
            title: Some("Open".into()),
            bag,
        }
    }

    #[test]
    fn test_unchanged_object_has_empty_dirty_set() {
        let def = definition();
        let object = ticket();
        let mut tracker = ChangeTracker::new();
        tracker.snapshot_previous(&def, "t1", &object);
        tracker.snapshot_current(&def, "t1", &object);
        assert!(tracker.dirty_attributes(&instance_key::<Ticket>("t1")).is_empty());
    }

    #[test]
    fn test_mutated_attributes_are_exactly_the_dirty_set() {
        let def = definition();
        let mut object = ticket();
        let mut tracker = ChangeTracker::new();
        tracker.snapshot_previous(&def, "t1", &object);

        object.title = Some("Closed".into());
        object.bag.insert("Priority".to_string(), Value::Int(5));
        tracker.snapshot_current(&def, "t1", &object);

        let dirty = tracker.dirty_attributes(&instance_key::<Ticket>("t1"));
        let expected: BTreeSet<String> = [
            "Title".to_string(),
            "ExtendedProperties.Priority".to_string(),
        ]
        .into();
        assert_eq!(dirty, expected);
    }

    #[test]
    fn test_removed_bag_entry_is_dirty() {
        let def = definition();
        let mut object = ticket();
        let mut tracker = ChangeTracker::new();
        tracker.snapshot_previous(&def, "t1", &object);

        object.bag.remove("Priority");
        tracker.snapshot_current(&def, "t1", &object);

        let dirty = tracker.dirty_attributes(&instance_key::<Ticket>("t1"));
        assert!(dirty.contains("ExtendedProperties.Priority"));
    }

    #[test]
    fn test_missing_previous_marks_everything_dirty() {
        let def = definition();
        let object = ticket();
        let mut tracker = ChangeTracker::new();
        tracker.snapshot_current(&def, "t1", &object);

        let dirty = tracker.dirty_attributes(&instance_key::<Ticket>("t1"));
        assert!(dirty.contains("ID"));
        assert!(dirty.contains("Title"));
        assert!(dirty.contains("ExtendedProperties.Priority"));
    }

    #[test]
    fn test_missing_current_is_a_noop() {
        let def = definition();
        let object = ticket();
        let mut tracker = ChangeTracker::new();
        tracker.snapshot_previous(&def, "t1", &object);
        assert!(tracker.dirty_attributes(&instance_key::<Ticket>("t1")).is_empty());
    }

    #[test]
    fn test_promote_current_resets_baseline() {
        let def = definition();
        let mut object = ticket();
        let mut tracker = ChangeTracker::new();
        let key = instance_key::<Ticket>("t1");

        tracker.snapshot_previous(&def, "t1", &object);
        object.title = Some("Closed".into());
        tracker.snapshot_current(&def, "t1", &object);
        assert!(!tracker.dirty_attributes(&key).is_empty());

        tracker.promote_current(&key);
        tracker.snapshot_current(&def, "t1", &object);
        assert!(tracker.dirty_attributes(&key).is_empty());
    }

    #[test]
    fn test_instances_are_tracked_independently() {
        let def = definition();
        let first = ticket();
        let mut second = ticket();
        second.id = "t2".into();

        let mut tracker = ChangeTracker::new();
        tracker.snapshot_previous(&def, "t1", &first);
        tracker.snapshot_previous(&def, "t2", &second);

        let mut mutated = second.clone();
        mutated.title = Some("Changed".into());
        tracker.snapshot_current(&def, "t2", &mutated);

        assert!(tracker.dirty_attributes(&instance_key::<Ticket>("t1")).is_empty());
        assert_eq!(
            tracker.dirty_attributes(&instance_key::<Ticket>("t2")),
            ["Title".to_string()].into()
        );
    }
}
