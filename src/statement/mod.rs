//! Statement synthesis.
//!
//! Pure, side-effect-free construction of [`BuiltStatement`]s from entity
//! metadata, filter/sort/pagination inputs, and the dialect's capabilities.
//! All clause assembly goes through the [`SqlWriter`] fragment builder so
//! the WHERE/JOIN construction is shared across operations and dialects
//! diverge only at quoting, placeholders, pagination, and search rendering.
//!
//! Building is deterministic: the same inputs always produce the same text
//! and parameter order.

mod crud;
mod select;

pub use crud::{
    build_delete, build_delete_many, build_extended_delete, build_extended_get,
    build_extended_insert, build_extended_replace, build_extended_update, build_get_by_id,
    build_insert, build_replace, build_update,
};
pub use select::{build_count, build_count_by_search, build_search, build_select, Page, SelectSpec};

use crate::dialect::{Dialect, UnrecognizedDialect};
use crate::filter::SqlFragment;
use crate::value::{BindKind, Parameter, Value};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::{HashMap, VecDeque};
use std::fmt;

/// Alias of the origin table in every generated statement.
pub const ORIGIN_ALIAS: &str = "t";
/// Alias of the extended-properties side table.
pub const EXTENDED_ALIAS: &str = "x";
/// Alias of the multi-parent link table.
pub const PARENT_ALIAS: &str = "p";
/// Synthetic column carrying the window number in row-number pagination.
pub const ROW_NUMBER_COLUMN: &str = "__RowNumber";
/// Synthetic attribute carrying full-text relevance.
pub const SEARCH_SCORE: &str = "SearchScore";

/// A parameterized statement: text plus ordered, named bind values.
///
/// Immutable and single-use. The text carries no literal values, so it is
/// safe to log.
#[derive(Debug, Clone, PartialEq)]
pub struct BuiltStatement {
    pub text: String,
    pub params: Vec<Parameter>,
}

impl BuiltStatement {
    /// A raw control statement (`BEGIN`, `COMMIT`, `ROLLBACK`) with no
    /// parameters.
    pub fn raw(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            params: Vec::new(),
        }
    }
}

impl fmt::Display for BuiltStatement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

/// Statement-build failure. Pure and local - no I/O has happened yet, so
/// retrying after fixing the call is always safe.
#[derive(Debug, Clone, PartialEq)]
pub enum BuildError {
    /// Configured dialect is not recognized. Fatal, never retried.
    UnsupportedDialect(String),
    /// The dialect belongs to neither pagination family.
    UnsupportedPagination(Dialect),
    /// Malformed or missing predicate/sort for an operation that requires one.
    InvalidFilterOrSort(String),
    /// No entity definition registered for the type.
    UnknownEntity(String),
    /// Search on a dialect that addresses columns, with no full-text
    /// attribute declared.
    FullTextUnavailable(String),
    /// A value failed coercion to its storage representation at build time.
    ValueCoercion { attribute: String, message: String },
}

impl fmt::Display for BuildError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BuildError::UnsupportedDialect(name) => write!(f, "unsupported dialect: {name}"),
            BuildError::UnsupportedPagination(dialect) => {
                write!(f, "dialect {dialect} supports neither pagination family")
            }
            BuildError::InvalidFilterOrSort(msg) => write!(f, "invalid filter or sort: {msg}"),
            BuildError::UnknownEntity(type_name) => {
                write!(f, "no entity definition registered for {type_name}")
            }
            BuildError::FullTextUnavailable(type_name) => {
                write!(f, "no full-text attributes declared for {type_name}")
            }
            BuildError::ValueCoercion { attribute, message } => {
                write!(f, "cannot coerce attribute {attribute}: {message}")
            }
        }
    }
}

impl std::error::Error for BuildError {}

impl From<UnrecognizedDialect> for BuildError {
    fn from(err: UnrecognizedDialect) -> Self {
        BuildError::UnsupportedDialect(err.name)
    }
}

static FRAGMENT_PLACEHOLDER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"@([A-Za-z_][A-Za-z0-9_]*)").expect("placeholder pattern is valid"));

/// Clause accumulator: statement text plus the ordered bind list.
///
/// This is the seam the design replaces string concatenation with - every
/// builder writes clauses and binds through it, and only it knows the
/// dialect's quoting and placeholder styles.
pub(crate) struct SqlWriter {
    dialect: Dialect,
    sql: String,
    params: Vec<Parameter>,
}

impl SqlWriter {
    pub(crate) fn new(dialect: Dialect) -> Self {
        Self {
            dialect,
            sql: String::new(),
            params: Vec::new(),
        }
    }

    pub(crate) fn push(&mut self, text: &str) {
        self.sql.push_str(text);
    }

    /// Write a quoted identifier.
    pub(crate) fn ident(&mut self, name: &str) {
        let quoted = self.dialect.quote_ident(name);
        self.sql.push_str(&quoted);
    }

    /// Write `alias.column` with the column quoted.
    pub(crate) fn qualified(&mut self, alias: &str, column: &str) {
        self.sql.push_str(alias);
        self.sql.push('.');
        self.ident(column);
    }

    /// Bind a parameter and write its placeholder.
    pub(crate) fn bind(&mut self, name: impl Into<String>, value: Value, bind: BindKind) {
        let name = name.into();
        let placeholder = self.dialect.placeholder(&name, self.params.len());
        self.sql.push_str(&placeholder);
        self.params.push(Parameter { name, value, bind });
    }

    /// Splice a filter fragment, rewriting its `@name` placeholders into the
    /// dialect's style and appending its parameters in placeholder order.
    ///
    /// Every placeholder must be matched by a parameter of the same name
    /// (duplicates are consumed first-to-last).
    pub(crate) fn splice(&mut self, fragment: &SqlFragment) -> Result<(), BuildError> {
        let mut queues: HashMap<&str, VecDeque<&Parameter>> = HashMap::new();
        for param in &fragment.params {
            queues.entry(param.name.as_str()).or_default().push_back(param);
        }

        let mut last_end = 0;
        for capture in FRAGMENT_PLACEHOLDER.captures_iter(&fragment.text) {
            let whole = capture.get(0).map(|m| (m.start(), m.end())).unwrap_or((0, 0));
            let name = capture.get(1).map(|m| m.as_str()).unwrap_or("");
            let param = queues
                .get_mut(name)
                .and_then(|queue| queue.pop_front())
                .ok_or_else(|| {
                    BuildError::InvalidFilterOrSort(format!(
                        "fragment placeholder @{name} has no matching parameter"
                    ))
                })?;

            self.sql.push_str(&fragment.text[last_end..whole.0]);
            let placeholder = self.dialect.placeholder(name, self.params.len());
            self.sql.push_str(&placeholder);
            self.params.push(param.clone());
            last_end = whole.1;
        }
        self.sql.push_str(&fragment.text[last_end..]);

        if queues.values().any(|queue| !queue.is_empty()) {
            return Err(BuildError::InvalidFilterOrSort(
                "fragment carries parameters with no matching placeholder".to_string(),
            ));
        }
        Ok(())
    }

    pub(crate) fn dialect(&self) -> Dialect {
        self.dialect
    }

    pub(crate) fn finish(self) -> BuiltStatement {
        BuiltStatement {
            text: self.sql,
            params: self.params,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raw_statement_has_no_params() {
        let stmt = BuiltStatement::raw("BEGIN");
        assert_eq!(stmt.text, "BEGIN");
        assert!(stmt.params.is_empty());
    }

    #[test]
    fn test_writer_bind_renders_dialect_placeholder() {
        let mut writer = SqlWriter::new(Dialect::Postgres);
        writer.push("SELECT 1 WHERE a = ");
        writer.bind("A", Value::Int(1), BindKind::Standard);
        writer.push(" AND b = ");
        writer.bind("B", Value::Int(2), BindKind::Standard);
        let stmt = writer.finish();
        assert_eq!(stmt.text, "SELECT 1 WHERE a = $1 AND b = $2");
        assert_eq!(stmt.params[0].name, "A");
        assert_eq!(stmt.params[1].name, "B");
    }

    #[test]
    fn test_splice_rewrites_placeholders_in_order() {
        let fragment = SqlFragment::new(
            "t.Title = @Title AND t.Rank > @Rank",
            vec![
                Parameter::new("Title", Value::Text("First".into())),
                Parameter::new("Rank", Value::Int(3)),
            ],
        );
        let mut writer = SqlWriter::new(Dialect::Postgres);
        writer.push("WHERE ");
        writer.splice(&fragment).unwrap();
        let stmt = writer.finish();
        assert_eq!(stmt.text, "WHERE t.Title = $1 AND t.Rank > $2");
        assert_eq!(stmt.params.len(), 2);
    }

    #[test]
    fn test_splice_handles_duplicate_names() {
        // EDGE CASE: the same name twice consumes parameters first-to-last.
        let fragment = SqlFragment::new(
            "t.A = @V OR t.B = @V",
            vec![
                Parameter::new("V", Value::Int(1)),
                Parameter::new("V", Value::Int(2)),
            ],
        );
        let mut writer = SqlWriter::new(Dialect::Postgres);
        writer.splice(&fragment).unwrap();
        let stmt = writer.finish();
        assert_eq!(stmt.text, "t.A = $1 OR t.B = $2");
        assert_eq!(stmt.params[0].value, Value::Int(1));
        assert_eq!(stmt.params[1].value, Value::Int(2));
    }

    #[test]
    fn test_splice_does_not_confuse_prefixed_names() {
        let fragment = SqlFragment::new(
            "t.A = @Title AND t.B = @TitleX",
            vec![
                Parameter::new("Title", Value::Int(1)),
                Parameter::new("TitleX", Value::Int(2)),
            ],
        );
        let mut writer = SqlWriter::new(Dialect::SqlServer);
        writer.splice(&fragment).unwrap();
        let stmt = writer.finish();
        assert_eq!(stmt.text, "t.A = @Title AND t.B = @TitleX");
    }

    #[test]
    fn test_splice_missing_parameter_is_an_error() {
        let fragment = SqlFragment::new("t.A = @Missing", vec![]);
        let mut writer = SqlWriter::new(Dialect::MySql);
        let err = writer.splice(&fragment).unwrap_err();
        assert!(matches!(err, BuildError::InvalidFilterOrSort(_)));
    }

    #[test]
    fn test_splice_leftover_parameter_is_an_error() {
        let fragment = SqlFragment::new(
            "1 = 1",
            vec![Parameter::new("Orphan", Value::Int(1))],
        );
        let mut writer = SqlWriter::new(Dialect::MySql);
        let err = writer.splice(&fragment).unwrap_err();
        assert!(matches!(err, BuildError::InvalidFilterOrSort(_)));
    }

    #[test]
    fn test_mysql_placeholders_are_positional() {
        let fragment = SqlFragment::new(
            "t.Title = @Title",
            vec![Parameter::new("Title", Value::Text("x".into()))],
        );
        let mut writer = SqlWriter::new(Dialect::MySql);
        writer.splice(&fragment).unwrap();
        let stmt = writer.finish();
        assert_eq!(stmt.text, "t.Title = ?");
        // Names survive in the parameter list for logging and adapters.
        assert_eq!(stmt.params[0].name, "Title");
    }
}
