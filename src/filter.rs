//! Filter and sort contracts.
//!
//! Filter trees are externally supplied and opaque to this engine: the only
//! contract is "can render to a SQL fragment plus ordered parameters".
//! Fragments use `@name` placeholders (rewritten to the vendor style by the
//! statement writer) and address the origin table as alias `t`, the
//! extended-properties table as `x`, and the parent-link table as `p`.
//!
//! Sort keys are structured (attribute name + direction) rather than opaque,
//! because the row-number pagination family must rewrite extended-attribute
//! terms to their physical columns before wrapping.
//!
//! A small set of ready-made predicates ships here for callers and tests;
//! anything richer belongs to the filter layer outside this crate.

use crate::value::{Parameter, Value};

/// A rendered filter fragment: text with `@name` placeholders and the
/// parameters in placeholder order.
#[derive(Debug, Clone, PartialEq)]
pub struct SqlFragment {
    pub text: String,
    pub params: Vec<Parameter>,
}

impl SqlFragment {
    pub fn new(text: impl Into<String>, params: Vec<Parameter>) -> Self {
        Self {
            text: text.into(),
            params,
        }
    }
}

/// Contract filter objects fulfil. The engine never inspects internals.
pub trait FilterExpression {
    fn render_sql(&self) -> SqlFragment;

    /// Whether the filter contains an associated-parent predicate; drives the
    /// multi-parent link join and the DISTINCT projection.
    fn references_parent(&self) -> bool {
        false
    }
}

/// One sort key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortTerm {
    pub attribute: String,
    pub descending: bool,
}

impl SortTerm {
    pub fn asc(attribute: impl Into<String>) -> Self {
        Self {
            attribute: attribute.into(),
            descending: false,
        }
    }

    pub fn desc(attribute: impl Into<String>) -> Self {
        Self {
            attribute: attribute.into(),
            descending: true,
        }
    }
}

/// An ordered list of sort keys.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SortExpression {
    pub terms: Vec<SortTerm>,
}

impl SortExpression {
    pub fn by(terms: Vec<SortTerm>) -> Self {
        Self { terms }
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }
}

/// Comparison operators for [`AttributeFilter`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Like,
}

impl Comparison {
    fn sql(self) -> &'static str {
        match self {
            Comparison::Eq => "=",
            Comparison::Ne => "<>",
            Comparison::Lt => "<",
            Comparison::Le => "<=",
            Comparison::Gt => ">",
            Comparison::Ge => ">=",
            Comparison::Like => "LIKE",
        }
    }
}

/// Single-column comparison against the origin table (`t`) or, with
/// [`AttributeFilter::extended`], the extended-properties table (`x`).
#[derive(Debug, Clone)]
pub struct AttributeFilter {
    column: String,
    alias: &'static str,
    op: Comparison,
    value: Value,
}

impl AttributeFilter {
    pub fn new(column: impl Into<String>, op: Comparison, value: Value) -> Self {
        Self {
            column: column.into(),
            alias: "t",
            op,
            value,
        }
    }

    pub fn eq(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(column, Comparison::Eq, value.into())
    }

    pub fn like(column: impl Into<String>, pattern: impl Into<String>) -> Self {
        Self::new(column, Comparison::Like, Value::Text(pattern.into()))
    }

    /// Address the extended-properties side table instead of the origin.
    pub fn extended(mut self) -> Self {
        self.alias = "x";
        self
    }
}

impl FilterExpression for AttributeFilter {
    fn render_sql(&self) -> SqlFragment {
        SqlFragment::new(
            format!("{}.{} {} @{}", self.alias, self.column, self.op.sql(), self.column),
            vec![Parameter::new(self.column.clone(), self.value.clone())],
        )
    }
}

/// Associated-parent predicate: matches children linked to the given parent
/// through the multi-parent side table (`p`).
#[derive(Debug, Clone)]
pub struct ParentFilter {
    parent_column: String,
    parent_id: String,
}

impl ParentFilter {
    pub fn new(parent_column: impl Into<String>, parent_id: impl Into<String>) -> Self {
        Self {
            parent_column: parent_column.into(),
            parent_id: parent_id.into(),
        }
    }
}

impl FilterExpression for ParentFilter {
    fn render_sql(&self) -> SqlFragment {
        SqlFragment::new(
            format!("p.{} = @{}", self.parent_column, self.parent_column),
            vec![Parameter::new(
                self.parent_column.clone(),
                Value::Text(self.parent_id.clone()),
            )],
        )
    }

    fn references_parent(&self) -> bool {
        true
    }
}

/// Conjunction of filters, each part parenthesized.
pub struct AllOf {
    parts: Vec<Box<dyn FilterExpression>>,
}

impl AllOf {
    pub fn new(parts: Vec<Box<dyn FilterExpression>>) -> Self {
        Self { parts }
    }
}

impl FilterExpression for AllOf {
    fn render_sql(&self) -> SqlFragment {
        let mut text = String::new();
        let mut params = Vec::new();
        for (index, part) in self.parts.iter().enumerate() {
            let fragment = part.render_sql();
            if index > 0 {
                text.push_str(" AND ");
            }
            text.push('(');
            text.push_str(&fragment.text);
            text.push(')');
            params.extend(fragment.params);
        }
        SqlFragment::new(text, params)
    }

    fn references_parent(&self) -> bool {
        self.parts.iter().any(|p| p.references_parent())
    }
}
