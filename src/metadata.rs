//! Entity metadata consumed by the statement builders.
//!
//! An [`EntityDefinition`] describes one persisted type: its origin table,
//! primary key, ordered standard attributes, and - when the type is an
//! extensible business entity - the extended-properties side table and the
//! multi-parent link table. Definitions are built once at startup (usually by
//! a metadata scanner outside this crate), registered, and never mutated.

use crate::value::{Value, ValueKind};
use std::collections::HashMap;
use std::fmt;

/// Column name of the extended-properties side table key (same identifier as
/// the origin row's primary key).
pub const EXTENDED_KEY_COLUMN: &str = "ID";
/// The sub-schema triad columns every extended-properties row carries.
pub const SYSTEM_ID_COLUMN: &str = "SystemID";
pub const REPOSITORY_ID_COLUMN: &str = "RepositoryID";
pub const ENTITY_ID_COLUMN: &str = "EntityID";

/// Name prefix under which extended-property entries appear in snapshots and
/// dirty sets.
pub const EXTENDED_PREFIX: &str = "ExtendedProperties.";

/// How an attribute's value is represented in its column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StorageMode {
    #[default]
    Native,
    JsonEncoded,
    Clob,
    DateAsString,
}

/// Description of one standard (schema-fixed) attribute.
#[derive(Debug, Clone, PartialEq)]
pub struct AttributeInfo {
    pub name: String,
    /// Storage column; defaults to the attribute name.
    pub column: String,
    pub kind: ValueKind,
    pub not_null: bool,
    pub max_length: Option<u32>,
    /// Omit from INSERT/UPDATE column lists when the coerced value is null.
    pub ignore_if_null: bool,
    pub storage: StorageMode,
    /// Part of the entity's full-text index; consumed by the Search builders
    /// on dialects that address columns rather than a prebuilt index.
    pub full_text: bool,
}

impl AttributeInfo {
    pub fn new(name: impl Into<String>, kind: ValueKind) -> Self {
        let name = name.into();
        Self {
            column: name.clone(),
            name,
            kind,
            not_null: false,
            max_length: None,
            ignore_if_null: false,
            storage: StorageMode::Native,
            full_text: false,
        }
    }

    pub fn column(mut self, column: impl Into<String>) -> Self {
        self.column = column.into();
        self
    }

    pub fn not_null(mut self) -> Self {
        self.not_null = true;
        self
    }

    pub fn max_length(mut self, length: u32) -> Self {
        self.max_length = Some(length);
        self
    }

    pub fn ignore_if_null(mut self) -> Self {
        self.ignore_if_null = true;
        self
    }

    pub fn stored_as(mut self, storage: StorageMode) -> Self {
        self.storage = storage;
        self
    }

    pub fn full_text(mut self) -> Self {
        self.full_text = true;
        self
    }
}

/// Insertion-ordered attribute collection with by-name and by-column lookup.
///
/// Iteration order is the declaration order, which is what makes generated
/// column lists deterministic.
#[derive(Debug, Clone)]
pub struct Attributes {
    items: Vec<AttributeInfo>,
    by_name: HashMap<String, usize>,
    by_column: HashMap<String, usize>,
}

impl Attributes {
    fn from_vec(items: Vec<AttributeInfo>) -> Self {
        let mut by_name = HashMap::new();
        let mut by_column = HashMap::new();
        for (index, attribute) in items.iter().enumerate() {
            by_name.insert(attribute.name.clone(), index);
            by_column.insert(attribute.column.clone(), index);
        }
        Self {
            items,
            by_name,
            by_column,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &AttributeInfo> {
        self.items.iter()
    }

    pub fn get(&self, name: &str) -> Option<&AttributeInfo> {
        self.by_name.get(name).map(|&i| &self.items[i])
    }

    pub fn by_column(&self, column: &str) -> Option<&AttributeInfo> {
        self.by_column.get(column).map(|&i| &self.items[i])
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    fn at(&self, index: usize) -> &AttributeInfo {
        &self.items[index]
    }

    fn index_of(&self, name: &str) -> Option<usize> {
        self.by_name.get(name).copied()
    }
}

/// The multi-parent association side table (child id, parent id pairs) the
/// Select builder joins through when a filter references a parent predicate.
#[derive(Debug, Clone, PartialEq)]
pub struct ParentLink {
    pub table: String,
    pub child_column: String,
    pub parent_column: String,
}

impl ParentLink {
    pub fn new(
        table: impl Into<String>,
        child_column: impl Into<String>,
        parent_column: impl Into<String>,
    ) -> Self {
        Self {
            table: table.into(),
            child_column: child_column.into(),
            parent_column: parent_column.into(),
        }
    }
}

/// Metadata construction error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MetadataError {
    /// The declared primary key names no attribute.
    MissingPrimaryKey { type_name: String, primary_key: String },
    /// `DateAsString` storage on a non-date-time attribute.
    InvalidStorageMode { attribute: String },
}

impl fmt::Display for MetadataError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetadataError::MissingPrimaryKey {
                type_name,
                primary_key,
            } => write!(
                f,
                "primary key {primary_key} is not an attribute of {type_name}"
            ),
            MetadataError::InvalidStorageMode { attribute } => write!(
                f,
                "DateAsString storage is only valid for date-time attributes: {attribute}"
            ),
        }
    }
}

impl std::error::Error for MetadataError {}

/// Immutable per-type description driving every statement builder.
#[derive(Debug, Clone)]
pub struct EntityDefinition {
    type_name: String,
    table_name: String,
    primary_key: String,
    primary_key_index: usize,
    attributes: Attributes,
    extended_properties_table: Option<String>,
    parent_link: Option<ParentLink>,
}

impl EntityDefinition {
    pub fn new(
        type_name: impl Into<String>,
        table_name: impl Into<String>,
        primary_key: impl Into<String>,
        attributes: Vec<AttributeInfo>,
    ) -> Result<Self, MetadataError> {
        let type_name = type_name.into();
        let primary_key = primary_key.into();
        let attributes = Attributes::from_vec(attributes);

        let primary_key_index = match attributes.index_of(&primary_key) {
            Some(index) => index,
            None => {
                return Err(MetadataError::MissingPrimaryKey {
                    type_name,
                    primary_key,
                })
            }
        };
        for attribute in attributes.iter() {
            if attribute.storage == StorageMode::DateAsString && attribute.kind != ValueKind::DateTime
            {
                return Err(MetadataError::InvalidStorageMode {
                    attribute: attribute.name.clone(),
                });
            }
        }

        Ok(Self {
            type_name,
            table_name: table_name.into(),
            primary_key,
            primary_key_index,
            attributes,
            extended_properties_table: None,
            parent_link: None,
        })
    }

    pub fn with_extended_table(mut self, table: impl Into<String>) -> Self {
        self.extended_properties_table = Some(table.into());
        self
    }

    pub fn with_parent_link(mut self, link: ParentLink) -> Self {
        self.parent_link = Some(link);
        self
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    pub fn primary_key(&self) -> &str {
        &self.primary_key
    }

    pub fn primary_key_attribute(&self) -> &AttributeInfo {
        self.attributes.at(self.primary_key_index)
    }

    pub fn attributes(&self) -> &Attributes {
        &self.attributes
    }

    pub fn attribute(&self, name: &str) -> Option<&AttributeInfo> {
        self.attributes.get(name)
    }

    pub fn attribute_by_column(&self, column: &str) -> Option<&AttributeInfo> {
        self.attributes.by_column(column)
    }

    pub fn extended_properties_table(&self) -> Option<&str> {
        self.extended_properties_table.as_deref()
    }

    pub fn is_extendable(&self) -> bool {
        self.extended_properties_table.is_some()
    }

    pub fn parent_link(&self) -> Option<&ParentLink> {
        self.parent_link.as_ref()
    }

    /// Attributes flagged as part of the full-text index.
    pub fn full_text_attributes(&self) -> impl Iterator<Item = &AttributeInfo> {
        self.attributes.iter().filter(|a| a.full_text)
    }
}

/// The sub-schema triad stamped onto every extended-properties row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtensionTriad {
    pub system_id: String,
    pub repository_id: String,
    pub entity_id: String,
}

/// One schema-less per-tenant dynamic field.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtendedPropertyDefinition {
    pub name: String,
    pub column: String,
    pub kind: ValueKind,
    /// Substituted on Create when the instance's bag has no entry.
    pub default_value: Value,
}

impl ExtendedPropertyDefinition {
    pub fn new(name: impl Into<String>, kind: ValueKind, default_value: Value) -> Self {
        let name = name.into();
        Self {
            column: name.clone(),
            name,
            kind,
            default_value,
        }
    }

    pub fn column(mut self, column: impl Into<String>) -> Self {
        self.column = column.into();
        self
    }
}

/// The ordered extended-property definitions of one business entity
/// (run-time sub-schema).
#[derive(Debug, Clone)]
pub struct ExtendedPropertySet {
    entity_id: String,
    properties: Vec<ExtendedPropertyDefinition>,
    by_name: HashMap<String, usize>,
    by_column: HashMap<String, usize>,
}

impl ExtendedPropertySet {
    pub fn new(entity_id: impl Into<String>, properties: Vec<ExtendedPropertyDefinition>) -> Self {
        let mut by_name = HashMap::new();
        let mut by_column = HashMap::new();
        for (index, property) in properties.iter().enumerate() {
            by_name.insert(property.name.clone(), index);
            by_column.insert(property.column.clone(), index);
        }
        Self {
            entity_id: entity_id.into(),
            properties,
            by_name,
            by_column,
        }
    }

    /// An empty set, used when a sub-schema declares no dynamic fields yet.
    pub fn empty(entity_id: impl Into<String>) -> Self {
        Self::new(entity_id, Vec::new())
    }

    pub fn entity_id(&self) -> &str {
        &self.entity_id
    }

    pub fn iter(&self) -> impl Iterator<Item = &ExtendedPropertyDefinition> {
        self.properties.iter()
    }

    pub fn get(&self, name: &str) -> Option<&ExtendedPropertyDefinition> {
        self.by_name.get(name).map(|&i| &self.properties[i])
    }

    pub fn by_column(&self, column: &str) -> Option<&ExtendedPropertyDefinition> {
        self.by_column.get(column).map(|&i| &self.properties[i])
    }

    pub fn len(&self) -> usize {
        self.properties.len()
    }

    pub fn is_empty(&self) -> bool {
        self.properties.is_empty()
    }
}
