//! Shared fixtures: an in-memory fake execution adapter that records every
//! statement and serves scripted rows, plus two persisted types - a plain
//! `Article` and an extensible `Ticket`.

#![allow(dead_code)]

use breakwater::{
    AttributeAccessors, AttributeError, AttributeInfo, BuiltStatement, CancellationToken,
    Connection, DataSource, Dialect, EntityDefinition, ExecuteOutcome, ExecutionError,
    ExtendedPropertyDefinition, ExtendedPropertySet, ExtensionView, Persistent, Registry, Row,
    StorageMode, Value, ValueKind,
};
use chrono::NaiveDateTime;
use once_cell::sync::Lazy;
use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Mutex};

// ---------------------------------------------------------------------------
// Fake execution adapter
// ---------------------------------------------------------------------------

pub type StatementLog = Arc<Mutex<Vec<BuiltStatement>>>;
pub type ResponseQueue = Arc<Mutex<VecDeque<ExecuteOutcome>>>;

/// Records statements; answers from the scripted queue, defaulting to
/// `Affected(1)` when the queue is empty.
pub struct FakeConnection {
    log: StatementLog,
    responses: ResponseQueue,
}

impl Connection for FakeConnection {
    fn execute(
        &mut self,
        statement: &BuiltStatement,
        cancel: &CancellationToken,
    ) -> Result<ExecuteOutcome, ExecutionError> {
        if cancel.is_cancelled() {
            return Err(ExecutionError::Cancelled);
        }
        self.log.lock().unwrap().push(statement.clone());
        Ok(self
            .responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(ExecuteOutcome::Affected(1)))
    }
}

pub struct FakeSource {
    dialect: Dialect,
    log: StatementLog,
    responses: ResponseQueue,
}

impl DataSource for FakeSource {
    fn dialect(&self) -> Dialect {
        self.dialect
    }

    fn open(&self) -> Result<Box<dyn Connection>, ExecutionError> {
        Ok(Box::new(FakeConnection {
            log: Arc::clone(&self.log),
            responses: Arc::clone(&self.responses),
        }))
    }
}

pub fn fake_source(dialect: Dialect) -> (FakeSource, StatementLog, ResponseQueue) {
    let log: StatementLog = Arc::new(Mutex::new(Vec::new()));
    let responses: ResponseQueue = Arc::new(Mutex::new(VecDeque::new()));
    let source = FakeSource {
        dialect,
        log: Arc::clone(&log),
        responses: Arc::clone(&responses),
    };
    (source, log, responses)
}

pub fn push_rows(responses: &ResponseQueue, rows: Vec<Row>) {
    responses
        .lock()
        .unwrap()
        .push_back(ExecuteOutcome::Rows(rows));
}

pub fn push_scalar(responses: &ResponseQueue, count: i64) {
    push_rows(
        responses,
        vec![Row::new(vec!["count".to_string()], vec![Value::Int(count)])],
    );
}

pub fn logged_texts(log: &StatementLog) -> Vec<String> {
    log.lock().unwrap().iter().map(|s| s.text.clone()).collect()
}

// ---------------------------------------------------------------------------
// Article - plain entity
// ---------------------------------------------------------------------------

#[derive(Default, Clone, Debug, PartialEq)]
pub struct Article {
    pub id: String,
    pub title: Option<String>,
    pub body: Option<serde_json::Value>,
    pub published_at: Option<NaiveDateTime>,
    pub summary: Option<String>,
}

fn expect_text(attribute: &'static str, value: Value) -> Result<Option<String>, AttributeError> {
    match value {
        Value::Null => Ok(None),
        Value::Text(s) => Ok(Some(s)),
        other => Err(AttributeError::new(
            attribute,
            format!("expected text, got {other:?}"),
        )),
    }
}

static ARTICLE_ACCESSORS: Lazy<AttributeAccessors<Article>> = Lazy::new(|| {
    AttributeAccessors::new()
        .with(
            "ID",
            |a: &Article| Value::Text(a.id.clone()),
            |a, v| {
                a.id = expect_text("ID", v)?.unwrap_or_default();
                Ok(())
            },
        )
        .with(
            "Title",
            |a| a.title.clone().map(Value::Text).unwrap_or(Value::Null),
            |a, v| {
                a.title = expect_text("Title", v)?;
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
        .with(
            "PublishedAt",
            |a| a.published_at.map(Value::DateTime).unwrap_or(Value::Null),
            |a, v| {
                a.published_at = match v {
                    Value::Null => None,
                    Value::DateTime(dt) => Some(dt),
                    other => {
                        return Err(AttributeError::new(
                            "PublishedAt",
                            format!("expected date-time, got {other:?}"),
                        ))
                    }
                };
                Ok(())
            },
        )
        .with(
            "Summary",
            |a| a.summary.clone().map(Value::Text).unwrap_or(Value::Null),
            |a, v| {
                a.summary = expect_text("Summary", v)?;
                Ok(())
            },
        )
});

impl Persistent for Article {
    fn type_name() -> &'static str {
        "Article"
    }

    fn get(&self, attribute: &str) -> Option<Value> {
        ARTICLE_ACCESSORS.get(self, attribute)
    }

    fn set(&mut self, attribute: &str, value: Value) -> Result<(), AttributeError> {
        ARTICLE_ACCESSORS.set(self, attribute, value)
    }
}

pub fn article_definition() -> EntityDefinition {
    EntityDefinition::new(
        "Article",
        "Articles",
        "ID",
        vec![
            AttributeInfo::new("ID", ValueKind::Text).not_null().max_length(32),
            AttributeInfo::new("Title", ValueKind::Text).max_length(255).full_text(),
            AttributeInfo::new("Body", ValueKind::Json).stored_as(StorageMode::JsonEncoded),
            AttributeInfo::new("PublishedAt", ValueKind::DateTime)
                .stored_as(StorageMode::DateAsString),
            AttributeInfo::new("Summary", ValueKind::Text).ignore_if_null(),
        ],
    )
    .unwrap()
}

// ---------------------------------------------------------------------------
// Ticket - extensible business entity
// ---------------------------------------------------------------------------

pub const TICKET_ENTITY_ID: &str = "entity-1";

#[derive(Default, Clone, Debug)]
pub struct Ticket {
    pub id: String,
    pub status: Option<String>,
    pub system_id: String,
    pub repository_id: String,
    pub entity_id: String,
    pub bag: BTreeMap<String, Value>,
}

static TICKET_ACCESSORS: Lazy<AttributeAccessors<Ticket>> = Lazy::new(|| {
    AttributeAccessors::new()
        .with(
            "ID",
            |t: &Ticket| Value::Text(t.id.clone()),
            |t, v| {
                t.id = expect_text("ID", v)?.unwrap_or_default();
                Ok(())
            },
        )
        .with(
            "Status",
            |t| t.status.clone().map(Value::Text).unwrap_or(Value::Null),
            |t, v| {
                t.status = expect_text("Status", v)?;
                Ok(())
            },
        )
        .with(
            "SystemID",
            |t| Value::Text(t.system_id.clone()),
            |t, v| {
                t.system_id = expect_text("SystemID", v)?.unwrap_or_default();
                Ok(())
            },
        )
        .with(
            "RepositoryID",
            |t| Value::Text(t.repository_id.clone()),
            |t, v| {
                t.repository_id = expect_text("RepositoryID", v)?.unwrap_or_default();
                Ok(())
            },
        )
        .with(
            "EntityID",
            |t| Value::Text(t.entity_id.clone()),
            |t, v| {
                t.entity_id = expect_text("EntityID", v)?.unwrap_or_default();
                Ok(())
            },
        )
});

impl Persistent for Ticket {
    fn type_name() -> &'static str {
        "Ticket"
    }

    fn get(&self, attribute: &str) -> Option<Value> {
        TICKET_ACCESSORS.get(self, attribute)
    }

    fn set(&mut self, attribute: &str, value: Value) -> Result<(), AttributeError> {
        TICKET_ACCESSORS.set(self, attribute, value)
    }

    fn extension(&self) -> Option<ExtensionView<'_>> {
        Some(ExtensionView {
            system_id: &self.system_id,
            repository_id: &self.repository_id,
            entity_id: &self.entity_id,
            bag: &self.bag,
        })
    }

    fn extension_mut(&mut self) -> Option<&mut BTreeMap<String, Value>> {
        Some(&mut self.bag)
    }
}

pub fn ticket_definition() -> EntityDefinition {
    EntityDefinition::new(
        "Ticket",
        "Tickets",
        "ID",
        vec![
            AttributeInfo::new("ID", ValueKind::Text).not_null().max_length(32),
            AttributeInfo::new("Status", ValueKind::Text).max_length(64),
        ],
    )
    .unwrap()
    .with_extended_table("Tickets_Extended")
}

pub fn ticket_properties() -> ExtendedPropertySet {
    ExtendedPropertySet::new(
        TICKET_ENTITY_ID,
        vec![
            ExtendedPropertyDefinition::new("Priority", ValueKind::Integer, Value::Int(0))
                .column("C_PRIORITY"),
            ExtendedPropertyDefinition::new("Urgent", ValueKind::Bool, Value::Bool(false)),
        ],
    )
}

/// A registry holding both fixture types.
pub fn registry() -> Registry {
    let mut registry = Registry::new();
    registry.register_definition(article_definition()).unwrap();
    registry.register_definition(ticket_definition()).unwrap();
    registry.register_property_set(ticket_properties()).unwrap();
    registry
}
