//! Process-wide metadata registry.
//!
//! Entity definitions, extended-property sets, and named data sources are
//! registered once during the startup phase and read for the rest of the
//! process lifetime. There is no mutation after sealing: the global instance
//! is installed exactly once, and tests construct isolated instances instead
//! of touching the global.

use crate::executor::DataSource;
use crate::metadata::{EntityDefinition, ExtendedPropertySet};
use once_cell::sync::OnceCell;
use std::collections::HashMap;
use std::fmt;

static GLOBAL: OnceCell<Registry> = OnceCell::new();

/// Registration error: duplicates, or installing twice.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    DuplicateDefinition(String),
    DuplicatePropertySet(String),
    DuplicateDataSource(String),
    AlreadyInstalled,
}

impl fmt::Display for RegistryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegistryError::DuplicateDefinition(name) => {
                write!(f, "entity definition already registered: {name}")
            }
            RegistryError::DuplicatePropertySet(id) => {
                write!(f, "extended-property set already registered: {id}")
            }
            RegistryError::DuplicateDataSource(name) => {
                write!(f, "data source already registered: {name}")
            }
            RegistryError::AlreadyInstalled => {
                write!(f, "the global registry has already been installed")
            }
        }
    }
}

impl std::error::Error for RegistryError {}

/// Write-once store of everything the engine resolves by name.
#[derive(Default)]
pub struct Registry {
    definitions: HashMap<String, EntityDefinition>,
    property_sets: HashMap<String, ExtendedPropertySet>,
    data_sources: HashMap<String, Box<dyn DataSource>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_definition(
        &mut self,
        definition: EntityDefinition,
    ) -> Result<(), RegistryError> {
        let key = definition.type_name().to_string();
        if self.definitions.contains_key(&key) {
            return Err(RegistryError::DuplicateDefinition(key));
        }
        self.definitions.insert(key, definition);
        Ok(())
    }

    pub fn register_property_set(
        &mut self,
        set: ExtendedPropertySet,
    ) -> Result<(), RegistryError> {
        let key = set.entity_id().to_string();
        if self.property_sets.contains_key(&key) {
            return Err(RegistryError::DuplicatePropertySet(key));
        }
        self.property_sets.insert(key, set);
        Ok(())
    }

    pub fn register_data_source(
        &mut self,
        name: impl Into<String>,
        source: Box<dyn DataSource>,
    ) -> Result<(), RegistryError> {
        let key = name.into();
        if self.data_sources.contains_key(&key) {
            return Err(RegistryError::DuplicateDataSource(key));
        }
        self.data_sources.insert(key, source);
        Ok(())
    }

    pub fn definition(&self, type_name: &str) -> Option<&EntityDefinition> {
        self.definitions.get(type_name)
    }

    /// Property set of one business entity (run-time sub-schema).
    pub fn property_set(&self, entity_id: &str) -> Option<&ExtendedPropertySet> {
        self.property_sets.get(entity_id)
    }

    pub fn data_source(&self, name: &str) -> Option<&dyn DataSource> {
        self.data_sources.get(name).map(Box::as_ref)
    }

    /// Install this registry as the process-wide instance. Fails if one is
    /// already installed; there is no replacement after startup.
    pub fn install(self) -> Result<(), RegistryError> {
        GLOBAL.set(self).map_err(|_| RegistryError::AlreadyInstalled)
    }

    /// The installed process-wide registry, if any.
    pub fn global() -> Option<&'static Registry> {
        GLOBAL.get()
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("definitions", &self.definitions.len())
            .field("property_sets", &self.property_sets.len())
            .field("data_sources", &self.data_sources.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::AttributeInfo;
    use crate::value::ValueKind;

    fn definition(name: &str) -> EntityDefinition {
        EntityDefinition::new(
            name,
            name,
            "ID",
            vec![AttributeInfo::new("ID", ValueKind::Text)],
        )
        .unwrap()
    }

    #[test]
    fn test_isolated_registry_lookup() {
        let mut registry = Registry::new();
        registry.register_definition(definition("Article")).unwrap();
        registry
            .register_property_set(ExtendedPropertySet::empty("entity-1"))
            .unwrap();

        assert!(registry.definition("Article").is_some());
        assert!(registry.definition("Missing").is_none());
        assert!(registry.property_set("entity-1").is_some());
    }

    #[test]
    fn test_duplicate_definition_rejected() {
        let mut registry = Registry::new();
        registry.register_definition(definition("Article")).unwrap();
        let err = registry.register_definition(definition("Article")).unwrap_err();
        assert!(matches!(err, RegistryError::DuplicateDefinition(_)));
    }

    #[test]
    fn test_duplicate_property_set_rejected() {
        let mut registry = Registry::new();
        registry
            .register_property_set(ExtendedPropertySet::empty("entity-1"))
            .unwrap();
        let err = registry
            .register_property_set(ExtendedPropertySet::empty("entity-1"))
            .unwrap_err();
        assert!(matches!(err, RegistryError::DuplicatePropertySet(_)));
    }
}
