//! The contract persisted objects implement.
//!
//! Dynamic attribute access is registry-based: a type builds an
//! [`AttributeAccessors`] table of typed get/set closures once (typically in
//! a `Lazy` static) and delegates its [`Persistent`] implementation to it.
//! No name lookup is invented per row; the table is a plain map built at
//! startup.
//!
//! Extensibility is a capability: a type either overrides `extension()` /
//! `extension_mut()` or it does not. The engine dispatches on presence, never
//! on a type hierarchy.

use crate::value::Value;
use std::collections::{BTreeMap, HashMap};
use std::fmt;

/// A by-name get or set that failed (unknown attribute, wrong value kind).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeError {
    pub attribute: String,
    pub message: String,
}

impl AttributeError {
    pub fn new(attribute: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            attribute: attribute.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for AttributeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "attribute {}: {}", self.attribute, self.message)
    }
}

impl std::error::Error for AttributeError {}

/// Read-only view of an extensible instance: the sub-schema triad and the
/// dynamic bag.
#[derive(Debug, Clone, Copy)]
pub struct ExtensionView<'a> {
    pub system_id: &'a str,
    pub repository_id: &'a str,
    /// Business entity id - selects which extended-property set applies.
    pub entity_id: &'a str,
    pub bag: &'a BTreeMap<String, Value>,
}

/// Contract every persisted type implements.
pub trait Persistent: Default + Clone + fmt::Debug {
    /// Stable type name used as the registry key and in snapshot keys.
    fn type_name() -> &'static str;

    /// Read an attribute by name. `None` means the type does not expose the
    /// attribute; a null value is `Some(Value::Null)`.
    fn get(&self, attribute: &str) -> Option<Value>;

    /// Write an attribute by name.
    fn set(&mut self, attribute: &str, value: Value) -> Result<(), AttributeError>;

    /// The extension capability. Extensible business entities override both
    /// methods; everything else inherits the absent default.
    fn extension(&self) -> Option<ExtensionView<'_>> {
        None
    }

    fn extension_mut(&mut self) -> Option<&mut BTreeMap<String, Value>> {
        None
    }
}

type Getter<T> = fn(&T) -> Value;
type Setter<T> = fn(&mut T, Value) -> Result<(), AttributeError>;

/// Table of typed accessors for one type, built once at startup.
///
/// # Example
///
/// ```
/// use breakwater::{AttributeAccessors, AttributeError, Value};
/// use once_cell::sync::Lazy;
///
/// #[derive(Default, Clone, Debug)]
/// struct Article {
///     id: String,
///     title: Option<String>,
/// }
///
/// static ACCESSORS: Lazy<AttributeAccessors<Article>> = Lazy::new(|| {
///     AttributeAccessors::new()
///         .with(
///             "ID",
///             |a| Value::Text(a.id.clone()),
///             |a, v| {
///                 a.id = v.as_text().map(str::to_string).ok_or_else(|| {
///                     AttributeError::new("ID", "expected text")
///                 })?;
///                 Ok(())
///             },
///         )
/// });
///
/// let article = Article { id: "a1".into(), title: None };
/// assert_eq!(ACCESSORS.get(&article, "ID"), Some(Value::Text("a1".into())));
/// ```
pub struct AttributeAccessors<T> {
    getters: HashMap<&'static str, Getter<T>>,
    setters: HashMap<&'static str, Setter<T>>,
    order: Vec<&'static str>,
}

impl<T> Default for AttributeAccessors<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> AttributeAccessors<T> {
    pub fn new() -> Self {
        Self {
            getters: HashMap::new(),
            setters: HashMap::new(),
            order: Vec::new(),
        }
    }

    pub fn with(mut self, name: &'static str, getter: Getter<T>, setter: Setter<T>) -> Self {
        self.getters.insert(name, getter);
        self.setters.insert(name, setter);
        self.order.push(name);
        self
    }

    pub fn get(&self, object: &T, attribute: &str) -> Option<Value> {
        self.getters.get(attribute).map(|getter| getter(object))
    }

    pub fn set(&self, object: &mut T, attribute: &str, value: Value) -> Result<(), AttributeError> {
        match self.setters.get(attribute) {
            Some(setter) => setter(object, value),
            None => Err(AttributeError::new(attribute, "no such attribute")),
        }
    }

    /// Attribute names in registration order.
    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.order.iter().copied()
    }
}

/// Collect an object's standard attribute values in definition order.
///
/// Attributes the object does not expose are treated as null.
pub fn attribute_values<T: Persistent>(
    definition: &crate::metadata::EntityDefinition,
    object: &T,
) -> BTreeMap<String, Value> {
    let mut values = BTreeMap::new();
    for attribute in definition.attributes().iter() {
        let value = object.get(&attribute.name).unwrap_or(Value::Null);
        values.insert(attribute.name.clone(), value);
    }
    values
}

#[cfg(test)]
mod tests {
    use super::*;
    use once_cell::sync::Lazy;

    #[derive(Default, Clone, Debug)]
    struct Note {
        id: String,
        text: Option<String>,
    }

    static NOTE_ACCESSORS: Lazy<AttributeAccessors<Note>> = Lazy::new(|| {
        AttributeAccessors::new()
            .with(
                "ID",
                |n: &Note| Value::Text(n.id.clone()),
                |n, v| {
                    n.id = v
                        .as_text()
                        .map(str::to_string)
                        .ok_or_else(|| AttributeError::new("ID", "expected text"))?;
                    Ok(())
                },
            )
            .with(
                "Text",
                |n| n.text.clone().map(Value::Text).unwrap_or(Value::Null),
                |n, v| {
                    n.text = match v {
                        Value::Null => None,
                        Value::Text(s) => Some(s),
                        other => {
                            return Err(AttributeError::new("Text", format!("expected text, got {other:?}")))
                        }
                    };
                    Ok(())
                },
            )
    });

    #[test]
    fn test_accessor_round_trip() {
        let mut note = Note::default();
        NOTE_ACCESSORS
            .set(&mut note, "ID", Value::Text("n1".into()))
            .unwrap();
        NOTE_ACCESSORS
            .set(&mut note, "Text", Value::Text("hello".into()))
            .unwrap();

        assert_eq!(NOTE_ACCESSORS.get(&note, "ID"), Some(Value::Text("n1".into())));
        assert_eq!(NOTE_ACCESSORS.get(&note, "Text"), Some(Value::Text("hello".into())));
    }

    #[test]
    fn test_unknown_attribute() {
        let mut note = Note::default();
        assert_eq!(NOTE_ACCESSORS.get(&note, "Missing"), None);
        assert!(NOTE_ACCESSORS.set(&mut note, "Missing", Value::Null).is_err());
    }

    #[test]
    fn test_null_clears_option_field() {
        let mut note = Note {
            id: "n1".into(),
            text: Some("x".into()),
        };
        NOTE_ACCESSORS.set(&mut note, "Text", Value::Null).unwrap();
        assert_eq!(note.text, None);
    }

    #[test]
    fn test_registration_order_preserved() {
        let names: Vec<&str> = NOTE_ACCESSORS.names().collect();
        assert_eq!(names, ["ID", "Text"]);
    }
}
