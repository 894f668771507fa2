//! Create / Get-by-id / Replace / Update / Delete builders.
//!
//! All builders are pure functions over metadata and already-read attribute
//! values. Column lists follow attribute declaration order, which keeps the
//! generated statements deterministic.
//!
//! Policy reproduced exactly from the source system: attributes marked
//! ignore-if-null are omitted from INSERT/UPDATE column lists when their
//! coerced value is null; the primary key never appears in a SET clause;
//! unknown names in a partial-update dirty set are dropped silently.

use super::{BuildError, BuiltStatement, SqlWriter, ORIGIN_ALIAS};
use crate::dialect::Dialect;
use crate::filter::FilterExpression;
use crate::metadata::{
    AttributeInfo, EntityDefinition, ExtendedPropertySet, ExtensionTriad, ENTITY_ID_COLUMN,
    EXTENDED_KEY_COLUMN, EXTENDED_PREFIX, REPOSITORY_ID_COLUMN, SYSTEM_ID_COLUMN,
};
use crate::value::{
    bind_kind_for, encode_attribute, encode_property, BindKind, Value,
};
use std::collections::{BTreeMap, BTreeSet};

fn coerce(attribute: &AttributeInfo, value: &Value) -> Result<Value, BuildError> {
    encode_attribute(attribute, value).map_err(|e| BuildError::ValueCoercion {
        attribute: attribute.name.clone(),
        message: e.to_string(),
    })
}

/// Collect `(attribute, wire value)` pairs for a write, applying coercion and
/// the ignore-if-null omission.
fn writable_columns<'a>(
    definition: &'a EntityDefinition,
    values: &BTreeMap<String, Value>,
    include: impl Fn(&AttributeInfo) -> bool,
) -> Result<Vec<(&'a AttributeInfo, Value)>, BuildError> {
    let mut columns = Vec::new();
    for attribute in definition.attributes().iter() {
        if !include(attribute) {
            continue;
        }
        let value = values.get(&attribute.name).cloned().unwrap_or(Value::Null);
        let wire = coerce(attribute, &value)?;
        if wire.is_null() && attribute.ignore_if_null {
            continue;
        }
        columns.push((attribute, wire));
    }
    Ok(columns)
}

/// The identity value an UPDATE/DELETE keys on. Null or absent means the
/// object cannot be addressed.
fn identity_value(
    definition: &EntityDefinition,
    values: &BTreeMap<String, Value>,
) -> Result<Value, BuildError> {
    match values.get(definition.primary_key()) {
        Some(value) if !value.is_null() => Ok(value.clone()),
        _ => Err(BuildError::InvalidFilterOrSort(format!(
            "{} instance carries no primary key value",
            definition.type_name()
        ))),
    }
}

fn push_pk_predicate(writer: &mut SqlWriter, definition: &EntityDefinition, id: Value) {
    let pk = definition.primary_key_attribute();
    writer.push(" WHERE ");
    writer.ident(&pk.column);
    writer.push(" = ");
    writer.bind(pk.name.clone(), id, bind_kind_for(pk));
}

/// `INSERT INTO origin (cols) VALUES (placeholders)`.
pub fn build_insert(
    dialect: Dialect,
    definition: &EntityDefinition,
    values: &BTreeMap<String, Value>,
) -> Result<BuiltStatement, BuildError> {
    let columns = writable_columns(definition, values, |_| true)?;

    let mut writer = SqlWriter::new(dialect);
    writer.push("INSERT INTO ");
    writer.ident(definition.table_name());
    writer.push(" (");
    for (index, (attribute, _)) in columns.iter().enumerate() {
        if index > 0 {
            writer.push(", ");
        }
        writer.ident(&attribute.column);
    }
    writer.push(") VALUES (");
    for (index, (attribute, wire)) in columns.into_iter().enumerate() {
        if index > 0 {
            writer.push(", ");
        }
        writer.bind(attribute.name.clone(), wire, bind_kind_for(attribute));
    }
    writer.push(")");
    Ok(writer.finish())
}

/// The extended-properties INSERT emitted alongside Create for extensible
/// instances: the shared identifier, the sub-schema triad, and one
/// placeholder per configured property, substituting the property's default
/// when the bag has no entry.
pub fn build_extended_insert(
    dialect: Dialect,
    extended_table: &str,
    properties: &ExtendedPropertySet,
    id: &str,
    triad: &ExtensionTriad,
    bag: &BTreeMap<String, Value>,
) -> Result<BuiltStatement, BuildError> {
    let mut writer = SqlWriter::new(dialect);
    writer.push("INSERT INTO ");
    writer.ident(extended_table);
    writer.push(" (");
    for (index, column) in [
        EXTENDED_KEY_COLUMN,
        SYSTEM_ID_COLUMN,
        REPOSITORY_ID_COLUMN,
        ENTITY_ID_COLUMN,
    ]
    .iter()
    .enumerate()
    {
        if index > 0 {
            writer.push(", ");
        }
        writer.ident(column);
    }
    for property in properties.iter() {
        writer.push(", ");
        writer.ident(&property.column);
    }
    writer.push(") VALUES (");
    writer.bind(EXTENDED_KEY_COLUMN, Value::Text(id.to_string()), BindKind::FixedChar);
    writer.push(", ");
    writer.bind(
        SYSTEM_ID_COLUMN,
        Value::Text(triad.system_id.clone()),
        BindKind::FixedChar,
    );
    writer.push(", ");
    writer.bind(
        REPOSITORY_ID_COLUMN,
        Value::Text(triad.repository_id.clone()),
        BindKind::FixedChar,
    );
    writer.push(", ");
    writer.bind(
        ENTITY_ID_COLUMN,
        Value::Text(triad.entity_id.clone()),
        BindKind::FixedChar,
    );
    for property in properties.iter() {
        let value = bag.get(&property.name).unwrap_or(&property.default_value);
        let wire = encode_property(property, value).map_err(|e| BuildError::ValueCoercion {
            attribute: format!("{EXTENDED_PREFIX}{}", property.name),
            message: e.to_string(),
        })?;
        writer.push(", ");
        writer.bind(property.name.clone(), wire, BindKind::Standard);
    }
    writer.push(")");
    Ok(writer.finish())
}

/// `SELECT <standard cols> FROM origin WHERE pk = @id`.
pub fn build_get_by_id(dialect: Dialect, definition: &EntityDefinition, id: &str) -> BuiltStatement {
    let mut writer = SqlWriter::new(dialect);
    writer.push("SELECT ");
    for (index, attribute) in definition.attributes().iter().enumerate() {
        if index > 0 {
            writer.push(", ");
        }
        writer.ident(&attribute.column);
    }
    writer.push(" FROM ");
    writer.ident(definition.table_name());
    push_pk_predicate(&mut writer, definition, Value::Text(id.to_string()));
    writer.finish()
}

/// `SELECT ID, <extended cols> FROM extended WHERE ID = @id`, merged with the
/// origin row by the materializer.
pub fn build_extended_get(
    dialect: Dialect,
    extended_table: &str,
    properties: &ExtendedPropertySet,
    id: &str,
) -> BuiltStatement {
    let mut writer = SqlWriter::new(dialect);
    writer.push("SELECT ");
    writer.ident(EXTENDED_KEY_COLUMN);
    writer.push(", ");
    writer.ident(SYSTEM_ID_COLUMN);
    writer.push(", ");
    writer.ident(REPOSITORY_ID_COLUMN);
    writer.push(", ");
    writer.ident(ENTITY_ID_COLUMN);
    for property in properties.iter() {
        writer.push(", ");
        writer.ident(&property.column);
    }
    writer.push(" FROM ");
    writer.ident(extended_table);
    writer.push(" WHERE ");
    writer.ident(EXTENDED_KEY_COLUMN);
    writer.push(" = ");
    writer.bind(EXTENDED_KEY_COLUMN, Value::Text(id.to_string()), BindKind::FixedChar);
    writer.finish()
}

/// Full overwrite: `UPDATE origin SET col = @col, ... WHERE pk = @id`,
/// excluding the primary key from the SET list.
pub fn build_replace(
    dialect: Dialect,
    definition: &EntityDefinition,
    values: &BTreeMap<String, Value>,
) -> Result<BuiltStatement, BuildError> {
    let id = identity_value(definition, values)?;
    let columns = writable_columns(definition, values, |attribute| {
        attribute.name != definition.primary_key()
    })?;
    if columns.is_empty() {
        return Err(BuildError::InvalidFilterOrSort(format!(
            "{} has no replaceable attributes",
            definition.type_name()
        )));
    }

    let mut writer = SqlWriter::new(dialect);
    writer.push("UPDATE ");
    writer.ident(definition.table_name());
    writer.push(" SET ");
    for (index, (attribute, wire)) in columns.into_iter().enumerate() {
        if index > 0 {
            writer.push(", ");
        }
        writer.ident(&attribute.column);
        writer.push(" = ");
        writer.bind(attribute.name.clone(), wire, bind_kind_for(attribute));
    }
    push_pk_predicate(&mut writer, definition, id);
    Ok(writer.finish())
}

/// Mirror of Replace for the extended-properties row: every configured
/// property is set, substituting defaults for absent bag entries.
pub fn build_extended_replace(
    dialect: Dialect,
    extended_table: &str,
    properties: &ExtendedPropertySet,
    id: &str,
    bag: &BTreeMap<String, Value>,
) -> Result<Option<BuiltStatement>, BuildError> {
    if properties.is_empty() {
        return Ok(None);
    }
    let mut writer = SqlWriter::new(dialect);
    writer.push("UPDATE ");
    writer.ident(extended_table);
    writer.push(" SET ");
    for (index, property) in properties.iter().enumerate() {
        let value = bag.get(&property.name).unwrap_or(&property.default_value);
        let wire = encode_property(property, value).map_err(|e| BuildError::ValueCoercion {
            attribute: format!("{EXTENDED_PREFIX}{}", property.name),
            message: e.to_string(),
        })?;
        if index > 0 {
            writer.push(", ");
        }
        writer.ident(&property.column);
        writer.push(" = ");
        writer.bind(property.name.clone(), wire, BindKind::Standard);
    }
    writer.push(" WHERE ");
    writer.ident(EXTENDED_KEY_COLUMN);
    writer.push(" = ");
    writer.bind(EXTENDED_KEY_COLUMN, Value::Text(id.to_string()), BindKind::FixedChar);
    Ok(Some(writer.finish()))
}

/// Partial update driven by a dirty set.
///
/// Only dirty names that exist in the metadata are assigned; a dirty set that
/// yields zero standard columns produces no statement (a no-op, not an
/// error).
pub fn build_update(
    dialect: Dialect,
    definition: &EntityDefinition,
    values: &BTreeMap<String, Value>,
    dirty: &BTreeSet<String>,
) -> Result<Option<BuiltStatement>, BuildError> {
    let id = identity_value(definition, values)?;
    let columns = writable_columns(definition, values, |attribute| {
        attribute.name != definition.primary_key() && dirty.contains(&attribute.name)
    })?;
    if columns.is_empty() {
        return Ok(None);
    }

    let mut writer = SqlWriter::new(dialect);
    writer.push("UPDATE ");
    writer.ident(definition.table_name());
    writer.push(" SET ");
    for (index, (attribute, wire)) in columns.into_iter().enumerate() {
        if index > 0 {
            writer.push(", ");
        }
        writer.ident(&attribute.column);
        writer.push(" = ");
        writer.bind(attribute.name.clone(), wire, bind_kind_for(attribute));
    }
    push_pk_predicate(&mut writer, definition, id);
    Ok(Some(writer.finish()))
}

/// Partial update of the extended-properties row. Dirty entries are
/// addressed as `ExtendedProperties.<name>`; entries removed from the bag
/// are set to null.
pub fn build_extended_update(
    dialect: Dialect,
    extended_table: &str,
    properties: &ExtendedPropertySet,
    id: &str,
    bag: &BTreeMap<String, Value>,
    dirty: &BTreeSet<String>,
) -> Result<Option<BuiltStatement>, BuildError> {
    let mut assigned = Vec::new();
    for name in dirty {
        let Some(stripped) = name.strip_prefix(EXTENDED_PREFIX) else {
            continue;
        };
        // Unknown property names are dropped silently, like standard ones.
        let Some(property) = properties.get(stripped) else {
            continue;
        };
        let value = bag.get(stripped).cloned().unwrap_or(Value::Null);
        let wire = encode_property(property, &value).map_err(|e| BuildError::ValueCoercion {
            attribute: name.clone(),
            message: e.to_string(),
        })?;
        assigned.push((property, wire));
    }
    if assigned.is_empty() {
        return Ok(None);
    }

    let mut writer = SqlWriter::new(dialect);
    writer.push("UPDATE ");
    writer.ident(extended_table);
    writer.push(" SET ");
    for (index, (property, wire)) in assigned.into_iter().enumerate() {
        if index > 0 {
            writer.push(", ");
        }
        writer.ident(&property.column);
        writer.push(" = ");
        writer.bind(property.name.clone(), wire, BindKind::Standard);
    }
    writer.push(" WHERE ");
    writer.ident(EXTENDED_KEY_COLUMN);
    writer.push(" = ");
    writer.bind(EXTENDED_KEY_COLUMN, Value::Text(id.to_string()), BindKind::FixedChar);
    Ok(Some(writer.finish()))
}

/// Delete the origin row by primary key.
pub fn build_delete(dialect: Dialect, definition: &EntityDefinition, id: &str) -> BuiltStatement {
    let mut writer = SqlWriter::new(dialect);
    writer.push("DELETE FROM ");
    writer.ident(definition.table_name());
    push_pk_predicate(&mut writer, definition, Value::Text(id.to_string()));
    writer.finish()
}

/// Delete the matching extended-properties row. Emitted unconditionally for
/// extendable types, whether or not the instance carried extended values.
pub fn build_extended_delete(dialect: Dialect, extended_table: &str, id: &str) -> BuiltStatement {
    let mut writer = SqlWriter::new(dialect);
    writer.push("DELETE FROM ");
    writer.ident(extended_table);
    writer.push(" WHERE ");
    writer.ident(EXTENDED_KEY_COLUMN);
    writer.push(" = ");
    writer.bind(EXTENDED_KEY_COLUMN, Value::Text(id.to_string()), BindKind::FixedChar);
    writer.finish()
}

/// Filtered bulk delete. For extendable types the side-table rows go first,
/// through an `IN (SELECT ...)` subquery, so the origin delete cannot orphan
/// them. Returns the statements in execution order.
pub fn build_delete_many(
    dialect: Dialect,
    definition: &EntityDefinition,
    filter: &dyn FilterExpression,
) -> Result<Vec<BuiltStatement>, BuildError> {
    if filter.references_parent() {
        return Err(BuildError::InvalidFilterOrSort(
            "bulk delete cannot reference an associated parent".to_string(),
        ));
    }
    let fragment = filter.render_sql();
    let pk = definition.primary_key_attribute();
    let mut statements = Vec::new();

    if let Some(extended_table) = definition.extended_properties_table() {
        let mut writer = SqlWriter::new(dialect);
        writer.push("DELETE FROM ");
        writer.ident(extended_table);
        writer.push(" WHERE ");
        writer.ident(EXTENDED_KEY_COLUMN);
        writer.push(" IN (SELECT ");
        writer.qualified(ORIGIN_ALIAS, &pk.column);
        writer.push(" FROM ");
        writer.ident(definition.table_name());
        writer.push(" ");
        writer.push(ORIGIN_ALIAS);
        writer.push(" WHERE ");
        writer.splice(&fragment)?;
        writer.push(")");
        statements.push(writer.finish());
    }

    // The filter fragment addresses alias `t`, so the origin delete keeps the
    // alias in each vendor's accepted form.
    let mut writer = SqlWriter::new(dialect);
    match dialect {
        Dialect::SqlServer | Dialect::MySql => {
            writer.push("DELETE ");
            writer.push(ORIGIN_ALIAS);
            writer.push(" FROM ");
        }
        Dialect::Oracle | Dialect::Postgres => {
            writer.push("DELETE FROM ");
        }
    }
    writer.ident(definition.table_name());
    writer.push(" ");
    writer.push(ORIGIN_ALIAS);
    writer.push(" WHERE ");
    writer.splice(&fragment)?;
    statements.push(writer.finish());
    Ok(statements)
}
