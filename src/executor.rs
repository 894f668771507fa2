//! Execution adapter contracts and glue.
//!
//! The engine never speaks a wire protocol. It hands [`BuiltStatement`]s to a
//! [`Connection`] obtained from a [`DataSource`] and gets rows or an affected
//! count back. Adapters own vendor binding (including the fixed-char /
//! long-text / unicode bind kinds) and should abort promptly when the
//! cancellation token fires mid-I/O.
//!
//! The helpers here add the ambient concerns around every execution: timing,
//! metrics, logging (statement text only - it carries no literal values),
//! and the pre-flight cancellation check that guarantees a cancelled call
//! never reaches the backend.

use crate::cancel::CancellationToken;
use crate::dialect::Dialect;
use crate::statement::BuiltStatement;
use crate::value::Value;
use std::fmt;
use std::time::Instant;

#[cfg(feature = "metrics")]
use crate::metrics::METRICS;
#[cfg(feature = "tracing")]
use crate::metrics::tracing_helpers;

/// One result row: ordered column names and values.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    columns: Vec<String>,
    values: Vec<Value>,
}

impl Row {
    pub fn new(columns: Vec<String>, values: Vec<Value>) -> Self {
        debug_assert_eq!(columns.len(), values.len());
        Self { columns, values }
    }

    /// First value under the given column name.
    pub fn get(&self, column: &str) -> Option<&Value> {
        self.columns
            .iter()
            .position(|c| c == column)
            .map(|index| &self.values[index])
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.columns
            .iter()
            .map(String::as_str)
            .zip(self.values.iter())
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

/// What an execution produced.
#[derive(Debug, Clone, PartialEq)]
pub enum ExecuteOutcome {
    Rows(Vec<Row>),
    Affected(u64),
}

/// Execution failure. Backend rejections are propagated unchanged and never
/// retried here; callers may layer a retry policy externally.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionError {
    /// Connection could not be opened.
    ConnectionFailed(String),
    /// The backend rejected the statement (constraint violation, transport
    /// failure, ...).
    Backend(String),
    /// The adapter returned rows where a count was demanded, or vice versa.
    UnexpectedShape(&'static str),
    /// A cancellation signal fired at a suspend point. No partial statement
    /// was applied.
    Cancelled,
}

impl fmt::Display for ExecutionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecutionError::ConnectionFailed(msg) => write!(f, "connection failed: {msg}"),
            ExecutionError::Backend(msg) => write!(f, "backend error: {msg}"),
            ExecutionError::UnexpectedShape(expected) => {
                write!(f, "adapter returned the wrong result shape, expected {expected}")
            }
            ExecutionError::Cancelled => write!(f, "operation cancelled"),
        }
    }
}

impl std::error::Error for ExecutionError {}

/// A live connection. One unit of work owns exactly one; statements on it
/// execute strictly sequentially.
pub trait Connection {
    fn execute(
        &mut self,
        statement: &BuiltStatement,
        cancel: &CancellationToken,
    ) -> Result<ExecuteOutcome, ExecutionError>;
}

/// A named backend an application registers at startup.
pub trait DataSource: Send + Sync {
    fn dialect(&self) -> Dialect;
    fn open(&self) -> Result<Box<dyn Connection>, ExecutionError>;
}

fn run(
    connection: &mut dyn Connection,
    statement: &BuiltStatement,
    cancel: &CancellationToken,
) -> Result<ExecuteOutcome, ExecutionError> {
    // Check before touching the backend so a cancelled call can never
    // partially apply a statement.
    if cancel.is_cancelled() {
        #[cfg(feature = "metrics")]
        METRICS.record_cancelled();
        return Err(ExecutionError::Cancelled);
    }

    #[cfg(feature = "tracing")]
    let _span = tracing_helpers::execute_statement_span(&statement.text).entered();

    log::debug!("executing statement: {}", statement.text);
    let start = Instant::now();
    let result = connection.execute(statement, cancel).map_err(|e| {
        #[cfg(feature = "metrics")]
        match &e {
            ExecutionError::Cancelled => METRICS.record_cancelled(),
            _ => METRICS.record_execution_error(),
        }
        log::warn!("statement failed: {e}");
        e
    });

    let duration = start.elapsed();
    #[cfg(feature = "metrics")]
    METRICS.record_executed(duration);
    let _ = duration;

    result
}

/// Execute a write statement and return the affected-row count.
pub fn execute_affected(
    connection: &mut dyn Connection,
    statement: &BuiltStatement,
    cancel: &CancellationToken,
) -> Result<u64, ExecutionError> {
    match run(connection, statement, cancel)? {
        ExecuteOutcome::Affected(count) => Ok(count),
        ExecuteOutcome::Rows(_) => Err(ExecutionError::UnexpectedShape("an affected count")),
    }
}

/// Execute a query and return every row.
pub fn query_rows(
    connection: &mut dyn Connection,
    statement: &BuiltStatement,
    cancel: &CancellationToken,
) -> Result<Vec<Row>, ExecutionError> {
    match run(connection, statement, cancel)? {
        ExecuteOutcome::Rows(rows) => Ok(rows),
        ExecuteOutcome::Affected(_) => Err(ExecutionError::UnexpectedShape("rows")),
    }
}

/// Execute a query expected to return at most one row.
pub fn query_one(
    connection: &mut dyn Connection,
    statement: &BuiltStatement,
    cancel: &CancellationToken,
) -> Result<Option<Row>, ExecutionError> {
    let mut rows = query_rows(connection, statement, cancel)?;
    if rows.len() > 1 {
        return Err(ExecutionError::UnexpectedShape("at most one row"));
    }
    Ok(rows.pop())
}

/// Execute a scalar query (counts) and read the first column of the first
/// row as an unsigned integer.
pub fn query_scalar_u64(
    connection: &mut dyn Connection,
    statement: &BuiltStatement,
    cancel: &CancellationToken,
) -> Result<u64, ExecutionError> {
    let rows = query_rows(connection, statement, cancel)?;
    let value = rows
        .first()
        .and_then(|row| row.iter().next().map(|(_, v)| v.clone()))
        .ok_or(ExecutionError::UnexpectedShape("a single scalar row"))?;
    value
        .as_i64()
        .and_then(|i| u64::try_from(i).ok())
        .ok_or(ExecutionError::UnexpectedShape("an integer scalar"))
}
