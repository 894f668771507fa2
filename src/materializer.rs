//! Row materialization.
//!
//! Turns result rows back into typed objects. Columns are split between
//! standard attributes and extended properties by storage-column lookup
//! (generated projections emit physical column references, so result columns
//! carry physical names). Synthetic columns (`__RowNumber`, `SearchScore`)
//! are recognized and skipped or captured.
//!
//! A coercion failure is a soft, per-attribute error: it is attached to the
//! result and the rest of the row still materializes.

use crate::entity::{AttributeError, Persistent};
use crate::executor::Row;
use crate::metadata::{
    EntityDefinition, ExtendedPropertySet, ENTITY_ID_COLUMN, EXTENDED_KEY_COLUMN,
    REPOSITORY_ID_COLUMN, SYSTEM_ID_COLUMN,
};
use crate::registry::Registry;
use crate::statement::{ROW_NUMBER_COLUMN, SEARCH_SCORE};
use crate::value::{decode_attribute, decode_property, Value};

/// A materialized object plus whatever soft failures and synthetic values
/// rode along with its row.
#[derive(Debug, Clone)]
pub struct Materialized<T> {
    pub object: T,
    /// Per-attribute coercion/assignment failures; the object carries every
    /// other attribute.
    pub attribute_errors: Vec<AttributeError>,
    /// Full-text relevance, present on Search results.
    pub search_score: Option<f64>,
}

impl<T> Materialized<T> {
    pub fn is_clean(&self) -> bool {
        self.attribute_errors.is_empty()
    }
}

/// Materialize one origin-table row (possibly carrying joined extended
/// columns) into a typed object.
pub fn materialize_row<T: Persistent>(
    definition: &EntityDefinition,
    properties: Option<&ExtendedPropertySet>,
    row: &Row,
) -> Materialized<T> {
    let mut result = Materialized {
        object: T::default(),
        attribute_errors: Vec::new(),
        search_score: None,
    };
    for (column, wire) in row.iter() {
        apply_column(definition, properties, column, wire, &mut result);
    }
    result
}

/// Merge the extended-properties row of a Get-by-id into an already
/// materialized object. The triad columns are applied first so the
/// business-entity id is known before the property set is resolved.
pub fn merge_extended_row<T: Persistent>(
    registry: &Registry,
    result: &mut Materialized<T>,
    row: &Row,
) {
    for (column, wire) in row.iter() {
        if column == EXTENDED_KEY_COLUMN {
            // Same identifier as the origin row; nothing to merge.
            continue;
        }
        if matches!(column, SYSTEM_ID_COLUMN | REPOSITORY_ID_COLUMN | ENTITY_ID_COLUMN) {
            if let Err(error) = result.object.set(column, wire.clone()) {
                result.attribute_errors.push(error);
            }
        }
    }

    let Some(entity_id) = result
        .object
        .extension()
        .map(|view| view.entity_id.to_string())
    else {
        return;
    };
    let Some(properties) = registry.property_set(&entity_id) else {
        return;
    };

    for (column, wire) in row.iter() {
        let Some(property) = properties.by_column(column) else {
            continue;
        };
        match decode_property(property, wire) {
            Ok(Value::Null) => {}
            Ok(value) => {
                if let Some(bag) = result.object.extension_mut() {
                    bag.insert(property.name.clone(), value);
                }
            }
            Err(error) => result.attribute_errors.push(AttributeError::new(
                format!("ExtendedProperties.{}", property.name),
                error.to_string(),
            )),
        }
    }
}

fn apply_column<T: Persistent>(
    definition: &EntityDefinition,
    properties: Option<&ExtendedPropertySet>,
    column: &str,
    wire: &Value,
    result: &mut Materialized<T>,
) {
    if column == ROW_NUMBER_COLUMN {
        return;
    }
    if column == SEARCH_SCORE {
        result.search_score = wire.as_f64();
        return;
    }

    if let Some(attribute) = definition.attribute_by_column(column) {
        match decode_attribute(attribute, wire) {
            Ok(value) => {
                if let Err(error) = result.object.set(&attribute.name, value) {
                    result.attribute_errors.push(error);
                }
            }
            Err(error) => result
                .attribute_errors
                .push(AttributeError::new(attribute.name.clone(), error.to_string())),
        }
        return;
    }

    if let Some(property) = properties.and_then(|p| p.by_column(column)) {
        match decode_property(property, wire) {
            Ok(Value::Null) => {}
            Ok(value) => {
                if let Some(bag) = result.object.extension_mut() {
                    bag.insert(property.name.clone(), value);
                }
            }
            Err(error) => result.attribute_errors.push(AttributeError::new(
                format!("ExtendedProperties.{}", property.name),
                error.to_string(),
            )),
        }
    }
    // Anything else (adapter bookkeeping columns) is ignored.
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::{AttributeInfo, StorageMode};
    use crate::value::ValueKind;
    use once_cell::sync::Lazy;
    use serde_json::json;

    #[derive(Default, Clone, Debug)]
    struct Article {
        id: String,
        title: Option<String>,
        body: Option<serde_json::Value>,
    }

    static ACCESSORS: Lazy<crate::entity::AttributeAccessors<Article>> = Lazy::new(|| {
        crate::entity::AttributeAccessors::new()
            .with(
                "ID",
                |a: &Article| Value::Text(a.id.clone()),
                |a, v| {
                    a.id = v
                        .as_text()
                        .map(str::to_string)
                        .ok_or_else(|| AttributeError::new("ID", "expected text"))?;
                    Ok(())
                },
            )
            .with(
                "Title",
                |a| a.title.clone().map(Value::Text).unwrap_or(Value::Null),
                |a, v| {
                    a.title = match v {
                        Value::Null => None,
                        Value::Text(s) => Some(s),
                        other => {
                            return Err(AttributeError::new("Title", format!("expected text, got {other:?}")))
                        }
                    };
                    Ok(())
                },
            )
            .with(
                "Body",
                |a| a.body.clone().map(Value::Json).unwrap_or(Value::Null),
                |a, v| {
                    a.body = match v {
                        Value::Null => None,
                        Value::Json(j) => Some(j),
                        other => {
                            return Err(AttributeError::new("Body", format!("expected JSON, got {other:?}")))
                        }
                    };
                    Ok(())
                },
            )
    });

    impl Persistent for Article {
        fn type_name() -> &'static str {
            "Article"
        }

        fn get(&self, attribute: &str) -> Option<Value> {
            ACCESSORS.get(self, attribute)
        }

        fn set(&mut self, attribute: &str, value: Value) -> Result<(), AttributeError> {
            ACCESSORS.set(self, attribute, value)
        }
    }

    fn definition() -> EntityDefinition {
        EntityDefinition::new(
            "Article",
            "Articles",
            "ID",
            vec![
                AttributeInfo::new("ID", ValueKind::Text).max_length(32),
                AttributeInfo::new("Title", ValueKind::Text).column("C_TITLE"),
                AttributeInfo::new("Body", ValueKind::Json).stored_as(StorageMode::JsonEncoded),
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_materialize_by_physical_column() {
        let def = definition();
        let row = Row::new(
            vec!["ID".to_string(), "C_TITLE".to_string(), "Body".to_string()],
            vec![
                Value::Text("a1".into()),
                Value::Text("First".into()),
                Value::Text("{\"blocks\":[]}".into()),
            ],
        );
        let result: Materialized<Article> = materialize_row(&def, None, &row);
        assert!(result.is_clean());
        assert_eq!(result.object.id, "a1");
        assert_eq!(result.object.title.as_deref(), Some("First"));
        assert_eq!(result.object.body, Some(json!({"blocks": []})));
    }

    #[test]
    fn test_coercion_failure_is_soft() {
        let def = definition();
        let row = Row::new(
            vec!["ID".to_string(), "Body".to_string()],
            vec![Value::Text("a1".into()), Value::Text("{broken".into())],
        );
        let result: Materialized<Article> = materialize_row(&def, None, &row);
        // The bad attribute is reported, the rest of the row survived.
        assert_eq!(result.attribute_errors.len(), 1);
        assert_eq!(result.attribute_errors[0].attribute, "Body");
        assert_eq!(result.object.id, "a1");
    }

    #[test]
    fn test_synthetic_columns_are_captured_or_skipped() {
        let def = definition();
        let row = Row::new(
            vec![
                "ID".to_string(),
                ROW_NUMBER_COLUMN.to_string(),
                SEARCH_SCORE.to_string(),
            ],
            vec![Value::Text("a1".into()), Value::Int(11), Value::Double(0.75)],
        );
        let result: Materialized<Article> = materialize_row(&def, None, &row);
        assert!(result.is_clean());
        assert_eq!(result.search_score, Some(0.75));
    }

    #[test]
    fn test_unknown_columns_are_ignored() {
        let def = definition();
        let row = Row::new(
            vec!["ID".to_string(), "__Vendor".to_string()],
            vec![Value::Text("a1".into()), Value::Int(1)],
        );
        let result: Materialized<Article> = materialize_row(&def, None, &row);
        assert!(result.is_clean());
    }
}
