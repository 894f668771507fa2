//! # Breakwater
//!
//! Relational statement-synthesis engine for a polyglot persistence layer:
//! entity metadata, filter trees, sort keys, pagination and full-text query
//! strings go in; vendor-correct parameterized SQL comes out, is executed
//! through an abstract adapter, and rows are materialized back into typed
//! objects. Partial updates are driven by a dirty-state tracker, and a
//! side-table model carries schema-less per-tenant extended properties.
//!
//! See [README on GitHub](https://github.com/microscaler/breakwater) for full architecture.

pub mod cancel;
pub mod config;
pub mod dialect;
pub mod dirty;
pub mod entity;
pub mod executor;
pub mod filter;
mod macros;
pub mod materializer;
pub mod metadata;
pub mod metrics;
pub mod registry;
pub mod search;
pub mod statement;
pub mod unit_of_work;
pub mod value;

pub use cancel::{cancellation_pair, CancellationToken, Canceller};
pub use config::DataSourceSettings;
pub use dialect::{Dialect, DialectCapabilities};
pub use dirty::ChangeTracker;
pub use entity::{AttributeAccessors, AttributeError, ExtensionView, Persistent};
pub use executor::{Connection, DataSource, ExecuteOutcome, ExecutionError, Row};
pub use filter::{
    AllOf, AttributeFilter, Comparison, FilterExpression, ParentFilter, SortExpression, SortTerm,
    SqlFragment,
};
pub use materializer::Materialized;
pub use metadata::{
    AttributeInfo, EntityDefinition, ExtendedPropertyDefinition, ExtendedPropertySet,
    ExtensionTriad, MetadataError, ParentLink, StorageMode,
};
pub use registry::{Registry, RegistryError};
pub use search::SearchQuery;
pub use statement::{BuildError, BuiltStatement, Page, SelectSpec};
pub use unit_of_work::{EngineError, UnitOfWork};
pub use value::{new_id, BindKind, Parameter, Value, ValueKind};
