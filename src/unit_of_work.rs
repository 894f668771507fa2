//! The unit of work.
//!
//! A [`UnitOfWork`] owns exactly one connection and at most one transaction
//! scope, committed or rolled back exactly once. Every caller-visible typed
//! operation lives here, each in a blocking form and a cancellable form
//! taking a [`CancellationToken`]. Operations inside one unit of work
//! execute strictly sequentially; the `&mut self` receivers make concurrent
//! use impossible by construction.
//!
//! Dropping a unit of work with an open transaction rolls it back - scoped
//! resources are released on every exit path.

use crate::cancel::CancellationToken;
use crate::dialect::Dialect;
use crate::dirty::{instance_key, ChangeTracker};
use crate::entity::{attribute_values, Persistent};
use crate::executor::{
    execute_affected, query_one, query_rows, query_scalar_u64, Connection, DataSource,
    ExecutionError,
};
use crate::filter::{FilterExpression, SortExpression};
use crate::materializer::{materialize_row, merge_extended_row, Materialized};
use crate::metadata::{EntityDefinition, ExtendedPropertySet, ExtensionTriad};
use crate::registry::Registry;
use crate::search::SearchQuery;
use crate::statement::{
    build_count, build_count_by_search, build_delete, build_delete_many, build_extended_delete,
    build_extended_get, build_extended_insert, build_extended_replace, build_extended_update,
    build_get_by_id, build_insert, build_replace, build_search, build_select, build_update,
    BuildError, BuiltStatement, Page, SelectSpec,
};
use crate::value::Value;
use std::collections::BTreeSet;
use std::fmt;

#[cfg(feature = "tracing")]
use crate::metrics::tracing_helpers;

/// Top-level operation error.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineError {
    /// Statement construction failed; pure, safe to retry after fixing the
    /// call.
    Build(BuildError),
    /// The backend or transport rejected an execution.
    Execution(ExecutionError),
    /// A cancellation signal fired; no partial statement was applied.
    Cancelled,
    /// Transaction scope misuse (begin twice, commit without begin, ...).
    Transaction(String),
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineError::Build(e) => write!(f, "statement build failed: {e}"),
            EngineError::Execution(e) => write!(f, "execution failed: {e}"),
            EngineError::Cancelled => write!(f, "operation cancelled"),
            EngineError::Transaction(msg) => write!(f, "transaction error: {msg}"),
        }
    }
}

impl std::error::Error for EngineError {}

impl From<BuildError> for EngineError {
    fn from(err: BuildError) -> Self {
        EngineError::Build(err)
    }
}

impl From<ExecutionError> for EngineError {
    fn from(err: ExecutionError) -> Self {
        match err {
            ExecutionError::Cancelled => EngineError::Cancelled,
            other => EngineError::Execution(other),
        }
    }
}

/// One connection, one optional transaction scope, one set of dirty-state
/// snapshots. See the module documentation.
pub struct UnitOfWork<'r> {
    registry: &'r Registry,
    dialect: Dialect,
    connection: Box<dyn Connection>,
    tracker: ChangeTracker,
    /// Ambient business-entity id selecting the extended-property sub-schema
    /// for reads.
    business_entity: Option<String>,
    txn_open: bool,
}

impl<'r> UnitOfWork<'r> {
    /// Acquire a connection from the data source and start a unit of work.
    pub fn open(source: &dyn DataSource, registry: &'r Registry) -> Result<Self, EngineError> {
        let connection = source.open().map_err(EngineError::from)?;
        Ok(Self {
            registry,
            dialect: source.dialect(),
            connection,
            tracker: ChangeTracker::new(),
            business_entity: None,
            txn_open: false,
        })
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    /// Select the ambient sub-schema for extended-property reads. Writes use
    /// each instance's own business-entity id.
    pub fn set_business_entity(&mut self, entity_id: Option<String>) {
        self.business_entity = entity_id;
    }

    pub fn in_transaction(&self) -> bool {
        self.txn_open
    }

    // ------------------------------------------------------------------
    // Transaction scope
    // ------------------------------------------------------------------

    pub fn begin(&mut self) -> Result<(), EngineError> {
        if self.txn_open {
            return Err(EngineError::Transaction(
                "transaction already open".to_string(),
            ));
        }
        #[cfg(feature = "tracing")]
        let _span = tracing_helpers::begin_transaction_span().entered();
        self.execute_raw("BEGIN", &CancellationToken::none())?;
        self.txn_open = true;
        Ok(())
    }

    pub fn commit(&mut self) -> Result<(), EngineError> {
        if !self.txn_open {
            return Err(EngineError::Transaction(
                "no transaction to commit".to_string(),
            ));
        }
        #[cfg(feature = "tracing")]
        let _span = tracing_helpers::commit_transaction_span().entered();
        self.execute_raw("COMMIT", &CancellationToken::none())?;
        self.txn_open = false;
        Ok(())
    }

    pub fn rollback(&mut self) -> Result<(), EngineError> {
        if !self.txn_open {
            return Err(EngineError::Transaction(
                "no transaction to roll back".to_string(),
            ));
        }
        #[cfg(feature = "tracing")]
        let _span = tracing_helpers::rollback_transaction_span().entered();
        self.execute_raw("ROLLBACK", &CancellationToken::none())?;
        self.txn_open = false;
        Ok(())
    }

    fn execute_raw(&mut self, text: &str, cancel: &CancellationToken) -> Result<(), EngineError> {
        let statement = BuiltStatement::raw(text);
        execute_affected(self.connection.as_mut(), &statement, cancel)?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Lookup helpers
    // ------------------------------------------------------------------

    fn definition<T: Persistent>(&self) -> Result<&'r EntityDefinition, EngineError> {
        self.registry
            .definition(T::type_name())
            .ok_or_else(|| BuildError::UnknownEntity(T::type_name().to_string()).into())
    }

    /// The property set of the ambient sub-schema, when one is active and
    /// the type is extendable.
    fn ambient_properties(
        &self,
        definition: &EntityDefinition,
    ) -> Option<&'r ExtendedPropertySet> {
        if !definition.is_extendable() {
            return None;
        }
        let entity_id = self.business_entity.as_deref()?;
        self.registry.property_set(entity_id)
    }

    fn identity_of<T: Persistent>(
        definition: &EntityDefinition,
        object: &T,
    ) -> Result<String, EngineError> {
        match object.get(definition.primary_key()) {
            Some(Value::Text(id)) if !id.is_empty() => Ok(id),
            _ => Err(BuildError::InvalidFilterOrSort(format!(
                "{} instance carries no primary key value",
                definition.type_name()
            ))
            .into()),
        }
    }

    /// Record a freshly loaded (or freshly saved) instance as the dirty-diff
    /// baseline.
    fn baseline<T: Persistent>(&mut self, definition: &EntityDefinition, object: &T) {
        if let Ok(id) = Self::identity_of(definition, object) {
            self.tracker.snapshot_previous(definition, &id, object);
        }
    }

    // ------------------------------------------------------------------
    // Create
    // ------------------------------------------------------------------

    pub fn create<T: Persistent>(&mut self, object: &T) -> Result<(), EngineError> {
        self.create_cancellable(object, &CancellationToken::none())
    }

    pub fn create_cancellable<T: Persistent>(
        &mut self,
        object: &T,
        cancel: &CancellationToken,
    ) -> Result<(), EngineError> {
        let definition = self.definition::<T>()?;
        let values = attribute_values(definition, object);
        let statement = build_insert(self.dialect, definition, &values)?;
        execute_affected(self.connection.as_mut(), &statement, cancel)?;

        if let (Some(extended_table), Some(view)) =
            (definition.extended_properties_table(), object.extension())
        {
            let id = Self::identity_of(definition, object)?;
            let triad = ExtensionTriad {
                system_id: view.system_id.to_string(),
                repository_id: view.repository_id.to_string(),
                entity_id: view.entity_id.to_string(),
            };
            let fallback;
            let properties = match self.registry.property_set(view.entity_id) {
                Some(set) => set,
                None => {
                    fallback = ExtendedPropertySet::empty(view.entity_id);
                    &fallback
                }
            };
            let statement = build_extended_insert(
                self.dialect,
                extended_table,
                properties,
                &id,
                &triad,
                view.bag,
            )?;
            execute_affected(self.connection.as_mut(), &statement, cancel)?;
        }

        self.baseline(definition, object);
        Ok(())
    }

    // ------------------------------------------------------------------
    // Get
    // ------------------------------------------------------------------

    pub fn get_by_id<T: Persistent>(&mut self, id: &str) -> Result<Option<Materialized<T>>, EngineError> {
        self.get_by_id_cancellable(id, &CancellationToken::none())
    }

    pub fn get_by_id_cancellable<T: Persistent>(
        &mut self,
        id: &str,
        cancel: &CancellationToken,
    ) -> Result<Option<Materialized<T>>, EngineError> {
        let definition = self.definition::<T>()?;
        let statement = build_get_by_id(self.dialect, definition, id);
        let Some(row) = query_one(self.connection.as_mut(), &statement, cancel)? else {
            return Ok(None);
        };
        let mut result = materialize_row::<T>(definition, None, &row);

        if let Some(extended_table) = definition.extended_properties_table() {
            if let Some(properties) = self.ambient_properties(definition) {
                let statement =
                    build_extended_get(self.dialect, extended_table, properties, id);
                if let Some(extended_row) =
                    query_one(self.connection.as_mut(), &statement, cancel)?
                {
                    merge_extended_row(self.registry, &mut result, &extended_row);
                }
            }
        }

        self.tracker.snapshot_previous(definition, id, &result.object);
        Ok(Some(result))
    }

    pub fn get_first<T: Persistent>(
        &mut self,
        filter: Option<&dyn FilterExpression>,
        sort: Option<&SortExpression>,
    ) -> Result<Option<Materialized<T>>, EngineError> {
        self.get_first_cancellable(filter, sort, &CancellationToken::none())
    }

    pub fn get_first_cancellable<T: Persistent>(
        &mut self,
        filter: Option<&dyn FilterExpression>,
        sort: Option<&SortExpression>,
        cancel: &CancellationToken,
    ) -> Result<Option<Materialized<T>>, EngineError> {
        let mut results = self.select_cancellable(filter, sort, 1, 1, cancel)?;
        if results.is_empty() {
            Ok(None)
        } else {
            Ok(Some(results.remove(0)))
        }
    }

    // ------------------------------------------------------------------
    // Replace / Update
    // ------------------------------------------------------------------

    pub fn replace<T: Persistent>(&mut self, object: &T) -> Result<(), EngineError> {
        self.replace_cancellable(object, &CancellationToken::none())
    }

    pub fn replace_cancellable<T: Persistent>(
        &mut self,
        object: &T,
        cancel: &CancellationToken,
    ) -> Result<(), EngineError> {
        let definition = self.definition::<T>()?;
        let values = attribute_values(definition, object);
        let statement = build_replace(self.dialect, definition, &values)?;
        execute_affected(self.connection.as_mut(), &statement, cancel)?;

        if let (Some(extended_table), Some(view)) =
            (definition.extended_properties_table(), object.extension())
        {
            if let Some(properties) = self.registry.property_set(view.entity_id) {
                let id = Self::identity_of(definition, object)?;
                if let Some(statement) = build_extended_replace(
                    self.dialect,
                    extended_table,
                    properties,
                    &id,
                    view.bag,
                )? {
                    execute_affected(self.connection.as_mut(), &statement, cancel)?;
                }
            }
        }

        self.baseline(definition, object);
        Ok(())
    }

    /// Partial update: the dirty set is computed from the tracker's
    /// snapshots (previous captured on load, current captured here).
    pub fn update<T: Persistent>(&mut self, object: &T) -> Result<(), EngineError> {
        self.update_cancellable(object, &CancellationToken::none())
    }

    pub fn update_cancellable<T: Persistent>(
        &mut self,
        object: &T,
        cancel: &CancellationToken,
    ) -> Result<(), EngineError> {
        let definition = self.definition::<T>()?;
        let id = Self::identity_of(definition, object)?;
        self.tracker.snapshot_current(definition, &id, object);
        let key = instance_key::<T>(&id);
        let dirty = self.tracker.dirty_attributes(&key);
        self.update_attributes_cancellable(object, &dirty, cancel)?;
        self.tracker.promote_current(&key);
        Ok(())
    }

    /// Partial update with a caller-supplied dirty set.
    pub fn update_attributes<T: Persistent>(
        &mut self,
        object: &T,
        dirty: &BTreeSet<String>,
    ) -> Result<(), EngineError> {
        self.update_attributes_cancellable(object, dirty, &CancellationToken::none())
    }

    pub fn update_attributes_cancellable<T: Persistent>(
        &mut self,
        object: &T,
        dirty: &BTreeSet<String>,
        cancel: &CancellationToken,
    ) -> Result<(), EngineError> {
        let definition = self.definition::<T>()?;
        let values = attribute_values(definition, object);
        if let Some(statement) = build_update(self.dialect, definition, &values, dirty)? {
            execute_affected(self.connection.as_mut(), &statement, cancel)?;
        }

        if let (Some(extended_table), Some(view)) =
            (definition.extended_properties_table(), object.extension())
        {
            if let Some(properties) = self.registry.property_set(view.entity_id) {
                let id = Self::identity_of(definition, object)?;
                if let Some(statement) = build_extended_update(
                    self.dialect,
                    extended_table,
                    properties,
                    &id,
                    view.bag,
                    dirty,
                )? {
                    execute_affected(self.connection.as_mut(), &statement, cancel)?;
                }
            }
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Delete
    // ------------------------------------------------------------------

    pub fn delete_by_id<T: Persistent>(&mut self, id: &str) -> Result<(), EngineError> {
        self.delete_by_id_cancellable::<T>(id, &CancellationToken::none())
    }

    pub fn delete_by_id_cancellable<T: Persistent>(
        &mut self,
        id: &str,
        cancel: &CancellationToken,
    ) -> Result<(), EngineError> {
        let definition = self.definition::<T>()?;
        let statement = build_delete(self.dialect, definition, id);
        execute_affected(self.connection.as_mut(), &statement, cancel)?;

        // Unconditional for extendable types, whether or not the instance
        // carried extended values.
        if let Some(extended_table) = definition.extended_properties_table() {
            let statement = build_extended_delete(self.dialect, extended_table, id);
            execute_affected(self.connection.as_mut(), &statement, cancel)?;
        }

        self.tracker.forget(&instance_key::<T>(id));
        Ok(())
    }

    pub fn delete_many<T: Persistent>(
        &mut self,
        filter: &dyn FilterExpression,
    ) -> Result<u64, EngineError> {
        self.delete_many_cancellable::<T>(filter, &CancellationToken::none())
    }

    pub fn delete_many_cancellable<T: Persistent>(
        &mut self,
        filter: &dyn FilterExpression,
        cancel: &CancellationToken,
    ) -> Result<u64, EngineError> {
        let definition = self.definition::<T>()?;
        let statements = build_delete_many(self.dialect, definition, filter)?;
        let mut affected = 0;
        for statement in &statements {
            affected = execute_affected(self.connection.as_mut(), statement, cancel)?;
        }
        // The origin delete runs last; its count is the answer.
        Ok(affected)
    }

    // ------------------------------------------------------------------
    // Select / Count
    // ------------------------------------------------------------------

    pub fn select<T: Persistent>(
        &mut self,
        filter: Option<&dyn FilterExpression>,
        sort: Option<&SortExpression>,
        page_size: usize,
        page_number: usize,
    ) -> Result<Vec<Materialized<T>>, EngineError> {
        self.select_cancellable(filter, sort, page_size, page_number, &CancellationToken::none())
    }

    pub fn select_cancellable<T: Persistent>(
        &mut self,
        filter: Option<&dyn FilterExpression>,
        sort: Option<&SortExpression>,
        page_size: usize,
        page_number: usize,
        cancel: &CancellationToken,
    ) -> Result<Vec<Materialized<T>>, EngineError> {
        let definition = self.definition::<T>()?;
        let properties = self.ambient_properties(definition);
        let spec = SelectSpec {
            definition,
            properties,
            filter,
            sort,
            page: Page::new(page_size, page_number),
            projection: None,
        };
        let statement = build_select(self.dialect, &spec)?;
        let rows = query_rows(self.connection.as_mut(), &statement, cancel)?;

        let mut results = Vec::with_capacity(rows.len());
        for row in &rows {
            let result = materialize_row::<T>(definition, properties, row);
            self.baseline(definition, &result.object);
            results.push(result);
        }
        Ok(results)
    }

    pub fn count<T: Persistent>(
        &mut self,
        filter: Option<&dyn FilterExpression>,
    ) -> Result<u64, EngineError> {
        self.count_cancellable::<T>(filter, &CancellationToken::none())
    }

    pub fn count_cancellable<T: Persistent>(
        &mut self,
        filter: Option<&dyn FilterExpression>,
        cancel: &CancellationToken,
    ) -> Result<u64, EngineError> {
        let definition = self.definition::<T>()?;
        let properties = self.ambient_properties(definition);
        let spec = SelectSpec {
            definition,
            properties,
            filter,
            sort: None,
            page: Page::all(),
            projection: None,
        };
        let statement = build_count(self.dialect, &spec)?;
        Ok(query_scalar_u64(self.connection.as_mut(), &statement, cancel)?)
    }

    // ------------------------------------------------------------------
    // Search
    // ------------------------------------------------------------------

    pub fn search<T: Persistent>(
        &mut self,
        query: &str,
        filter: Option<&dyn FilterExpression>,
        page_size: usize,
        page_number: usize,
    ) -> Result<Vec<Materialized<T>>, EngineError> {
        self.search_cancellable(query, filter, page_size, page_number, &CancellationToken::none())
    }

    pub fn search_cancellable<T: Persistent>(
        &mut self,
        query: &str,
        filter: Option<&dyn FilterExpression>,
        page_size: usize,
        page_number: usize,
        cancel: &CancellationToken,
    ) -> Result<Vec<Materialized<T>>, EngineError> {
        let definition = self.definition::<T>()?;
        let properties = self.ambient_properties(definition);
        let parsed = SearchQuery::parse(query);
        let spec = SelectSpec {
            definition,
            properties,
            filter,
            sort: None,
            page: Page::new(page_size, page_number),
            projection: None,
        };
        let statement = build_search(self.dialect, &spec, &parsed)?;
        let rows = query_rows(self.connection.as_mut(), &statement, cancel)?;

        let mut results = Vec::with_capacity(rows.len());
        for row in &rows {
            let result = materialize_row::<T>(definition, properties, row);
            self.baseline(definition, &result.object);
            results.push(result);
        }
        Ok(results)
    }

    pub fn count_by_search<T: Persistent>(
        &mut self,
        query: &str,
        filter: Option<&dyn FilterExpression>,
    ) -> Result<u64, EngineError> {
        self.count_by_search_cancellable::<T>(query, filter, &CancellationToken::none())
    }

    pub fn count_by_search_cancellable<T: Persistent>(
        &mut self,
        query: &str,
        filter: Option<&dyn FilterExpression>,
        cancel: &CancellationToken,
    ) -> Result<u64, EngineError> {
        let definition = self.definition::<T>()?;
        let properties = self.ambient_properties(definition);
        let parsed = SearchQuery::parse(query);
        let spec = SelectSpec {
            definition,
            properties,
            filter,
            sort: None,
            page: Page::all(),
            projection: None,
        };
        let statement = build_count_by_search(self.dialect, &spec, &parsed)?;
        Ok(query_scalar_u64(self.connection.as_mut(), &statement, cancel)?)
    }
}

impl Drop for UnitOfWork<'_> {
    fn drop(&mut self) {
        if self.txn_open {
            log::warn!("unit of work dropped with an open transaction; rolling back");
            let statement = BuiltStatement::raw("ROLLBACK");
            if let Err(e) = execute_affected(
                self.connection.as_mut(),
                &statement,
                &CancellationToken::none(),
            ) {
                log::warn!("rollback on drop failed: {e}");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::ExecuteOutcome;
    use std::sync::{Arc, Mutex};

    /// Records every statement and answers writes with `Affected(1)`.
    struct RecordingConnection {
        log: Arc<Mutex<Vec<String>>>,
    }

    impl Connection for RecordingConnection {
        fn execute(
            &mut self,
            statement: &BuiltStatement,
            _cancel: &CancellationToken,
        ) -> Result<ExecuteOutcome, ExecutionError> {
            self.log.lock().unwrap().push(statement.text.clone());
            Ok(ExecuteOutcome::Affected(1))
        }
    }

    struct RecordingSource {
        log: Arc<Mutex<Vec<String>>>,
    }

    impl DataSource for RecordingSource {
        fn dialect(&self) -> Dialect {
            Dialect::Postgres
        }

        fn open(&self) -> Result<Box<dyn Connection>, ExecutionError> {
            Ok(Box::new(RecordingConnection {
                log: Arc::clone(&self.log),
            }))
        }
    }

    fn harness() -> (Arc<Mutex<Vec<String>>>, RecordingSource, Registry) {
        let log = Arc::new(Mutex::new(Vec::new()));
        let source = RecordingSource {
            log: Arc::clone(&log),
        };
        (log, source, Registry::new())
    }

    #[test]
    fn test_transaction_state_machine() {
        let (log, source, registry) = harness();
        let mut uow = UnitOfWork::open(&source, &registry).unwrap();

        assert!(!uow.in_transaction());
        uow.begin().unwrap();
        assert!(uow.in_transaction());
        // EDGE CASE: nested begin is a scope misuse, not a savepoint.
        assert!(matches!(uow.begin(), Err(EngineError::Transaction(_))));
        uow.commit().unwrap();
        assert!(!uow.in_transaction());
        assert!(matches!(uow.commit(), Err(EngineError::Transaction(_))));

        assert_eq!(*log.lock().unwrap(), vec!["BEGIN", "COMMIT"]);
    }

    #[test]
    fn test_rollback_once() {
        let (log, source, registry) = harness();
        let mut uow = UnitOfWork::open(&source, &registry).unwrap();
        uow.begin().unwrap();
        uow.rollback().unwrap();
        assert!(matches!(uow.rollback(), Err(EngineError::Transaction(_))));
        assert_eq!(*log.lock().unwrap(), vec!["BEGIN", "ROLLBACK"]);
    }

    #[test]
    fn test_open_transaction_rolls_back_on_drop() {
        let (log, source, registry) = harness();
        {
            let mut uow = UnitOfWork::open(&source, &registry).unwrap();
            uow.begin().unwrap();
            // Dropped without commit or rollback.
        }
        assert_eq!(*log.lock().unwrap(), vec!["BEGIN", "ROLLBACK"]);
    }

    #[test]
    fn test_committed_transaction_does_not_rollback_on_drop() {
        let (log, source, registry) = harness();
        {
            let mut uow = UnitOfWork::open(&source, &registry).unwrap();
            uow.begin().unwrap();
            uow.commit().unwrap();
        }
        assert_eq!(*log.lock().unwrap(), vec!["BEGIN", "COMMIT"]);
    }

    #[test]
    fn test_unknown_entity_is_a_build_error() {
        #[derive(Default, Clone, Debug)]
        struct Ghost;
        impl Persistent for Ghost {
            fn type_name() -> &'static str {
                "Ghost"
            }
            fn get(&self, _attribute: &str) -> Option<Value> {
                None
            }
            fn set(
                &mut self,
                attribute: &str,
                _value: Value,
            ) -> Result<(), crate::entity::AttributeError> {
                Err(crate::entity::AttributeError::new(attribute, "no such attribute"))
            }
        }

        let (_log, source, registry) = harness();
        let mut uow = UnitOfWork::open(&source, &registry).unwrap();
        let err = uow.get_by_id::<Ghost>("x").unwrap_err();
        assert!(matches!(err, EngineError::Build(BuildError::UnknownEntity(_))));
    }
}
