//! Select / Count / Search / Count-by-search builders.
//!
//! One scaffold renders the shared FROM/JOIN/WHERE construction; the
//! pagination families and the search mechanisms are the only seams where
//! dialects diverge:
//!
//! - Row-number family: the base select is wrapped in a window-numbering
//!   subquery filtered on `__RowNumber`. The window ORDER BY sits in the
//!   wrapper scope, where the base's output columns carry physical names -
//!   which is why sort terms naming extended attributes are rewritten to
//!   their physical columns before wrapping.
//! - Limit-offset family: a trailing `LIMIT .. OFFSET ..` clause.
//!
//! Search mechanisms: SQL Server joins the prebuilt full-text index
//! (`CONTAINSTABLE`) and projects its rank; Oracle, MySQL and Postgres have
//! no index join here and instead inject a computed relevance expression
//! over the attributes flagged full-text, both into the projection (as the
//! synthetic `SearchScore`) and into WHERE.

use super::{
    BuildError, BuiltStatement, SqlWriter, EXTENDED_ALIAS, ORIGIN_ALIAS, PARENT_ALIAS,
    ROW_NUMBER_COLUMN, SEARCH_SCORE,
};
use crate::dialect::Dialect;
use crate::filter::{FilterExpression, SortExpression};
use crate::metadata::{EntityDefinition, ExtendedPropertySet, EXTENDED_KEY_COLUMN};
use crate::search::{render_terms, SearchQuery};
use crate::value::{BindKind, Value};

/// Pagination window. `size == 0` means "no pagination" - the full result
/// set is returned and no wrapping or offset is applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub size: usize,
    /// 1-based page number.
    pub number: usize,
}

impl Page {
    pub fn new(size: usize, number: usize) -> Self {
        Self { size, number }
    }

    /// The unpaged window.
    pub fn all() -> Self {
        Self { size: 0, number: 1 }
    }

    fn is_paged(&self) -> bool {
        self.size > 0
    }

    /// `(offset, upper bound)` of the window, 1-based exclusive/inclusive.
    fn bounds(&self) -> (usize, usize) {
        let number = self.number.max(1);
        let offset = (number - 1) * self.size;
        (offset, offset + self.size)
    }
}

/// Inputs of one Select/Search build.
pub struct SelectSpec<'a> {
    pub definition: &'a EntityDefinition,
    /// Extended-property set of the ambient sub-schema, when the type is
    /// extendable and a business-entity context is active.
    pub properties: Option<&'a ExtendedPropertySet>,
    pub filter: Option<&'a dyn FilterExpression>,
    pub sort: Option<&'a SortExpression>,
    pub page: Page,
    /// Attribute names to project; defaults to all standard + extended.
    pub projection: Option<&'a [String]>,
}

/// One projected column: `(alias, physical column)`.
type ColumnRef = (&'static str, String);

fn projection_columns(spec: &SelectSpec<'_>) -> Result<Vec<ColumnRef>, BuildError> {
    let mut columns = Vec::new();
    match spec.projection {
        Some(names) => {
            for name in names {
                if let Some(attribute) = spec.definition.attribute(name) {
                    columns.push((ORIGIN_ALIAS, attribute.column.clone()));
                } else if let Some(property) = spec.properties.and_then(|p| p.get(name)) {
                    columns.push((EXTENDED_ALIAS, property.column.clone()));
                } else {
                    return Err(BuildError::InvalidFilterOrSort(format!(
                        "projection names unknown attribute {name}"
                    )));
                }
            }
        }
        None => {
            for attribute in spec.definition.attributes().iter() {
                columns.push((ORIGIN_ALIAS, attribute.column.clone()));
            }
            if let Some(properties) = spec.properties {
                for property in properties.iter() {
                    columns.push((EXTENDED_ALIAS, property.column.clone()));
                }
            }
        }
    }
    Ok(columns)
}

/// Resolve one sort term to renderable SQL. `qualified` is true in base
/// scope (`t.col` / `x.col`) and false in the row-number wrapper scope,
/// where only the physical output columns exist.
fn order_term(
    dialect: Dialect,
    spec: &SelectSpec<'_>,
    attribute: &str,
    qualified: bool,
) -> Result<String, BuildError> {
    if attribute == SEARCH_SCORE {
        return Ok(dialect.quote_ident(SEARCH_SCORE));
    }
    let (alias, column) = if let Some(info) = spec.definition.attribute(attribute) {
        (ORIGIN_ALIAS, info.column.as_str())
    } else if let Some(property) = spec.properties.and_then(|p| p.get(attribute)) {
        (EXTENDED_ALIAS, property.column.as_str())
    } else {
        return Err(BuildError::InvalidFilterOrSort(format!(
            "sort names unknown attribute {attribute}"
        )));
    };
    if qualified {
        Ok(format!("{alias}.{}", dialect.quote_ident(column)))
    } else {
        Ok(dialect.quote_ident(column))
    }
}

/// Render the ORDER BY term list: the caller's sort, or the default (primary
/// key ascending; relevance descending for search).
fn order_clause(
    dialect: Dialect,
    spec: &SelectSpec<'_>,
    qualified: bool,
    search: bool,
) -> Result<String, BuildError> {
    if let Some(sort) = spec.sort.filter(|s| !s.is_empty()) {
        let mut parts = Vec::new();
        for term in &sort.terms {
            let rendered = order_term(dialect, spec, &term.attribute, qualified)?;
            if term.descending {
                parts.push(format!("{rendered} DESC"));
            } else {
                parts.push(rendered);
            }
        }
        return Ok(parts.join(", "));
    }
    if search {
        return Ok(format!("{} DESC", dialect.quote_ident(SEARCH_SCORE)));
    }
    let pk = spec.definition.primary_key_attribute();
    if qualified {
        Ok(format!("{ORIGIN_ALIAS}.{}", dialect.quote_ident(&pk.column)))
    } else {
        Ok(dialect.quote_ident(&pk.column))
    }
}

/// How a dialect computes full-text relevance.
enum SearchMechanism {
    /// Join the prebuilt index table and read its rank (SQL Server).
    ContainsJoin,
    /// `CONTAINS(column, ..)` predicate plus `SCORE(1)` (Oracle).
    ContainsColumn(String),
    /// `MATCH(..) AGAINST (.. IN BOOLEAN MODE)` expression (MySQL).
    MatchColumns(Vec<String>),
    /// `to_tsvector(..) @@ websearch_to_tsquery(..)` with `ts_rank` (Postgres).
    TsVector(Vec<String>),
}

struct SearchPlan {
    mechanism: SearchMechanism,
    condition: String,
    bind: BindKind,
}

fn search_plan(
    dialect: Dialect,
    definition: &EntityDefinition,
    query: &SearchQuery,
) -> Result<SearchPlan, BuildError> {
    let condition = render_terms(dialect, query);
    let bind = if dialect.capabilities().requires_unicode_text {
        BindKind::UnicodeText
    } else {
        BindKind::Standard
    };
    let full_text_columns: Vec<String> = definition
        .full_text_attributes()
        .map(|a| a.column.clone())
        .collect();

    let mechanism = match dialect {
        Dialect::SqlServer => SearchMechanism::ContainsJoin,
        Dialect::Oracle => match full_text_columns.first() {
            Some(column) => SearchMechanism::ContainsColumn(column.clone()),
            None => {
                return Err(BuildError::FullTextUnavailable(
                    definition.type_name().to_string(),
                ))
            }
        },
        Dialect::MySql => {
            if full_text_columns.is_empty() {
                return Err(BuildError::FullTextUnavailable(
                    definition.type_name().to_string(),
                ));
            }
            SearchMechanism::MatchColumns(full_text_columns)
        }
        Dialect::Postgres => {
            if full_text_columns.is_empty() {
                return Err(BuildError::FullTextUnavailable(
                    definition.type_name().to_string(),
                ));
            }
            SearchMechanism::TsVector(full_text_columns)
        }
    };
    Ok(SearchPlan {
        mechanism,
        condition,
        bind,
    })
}

impl SearchPlan {
    /// The text-document expression the Postgres mechanism searches over.
    fn ts_document(dialect: Dialect, columns: &[String]) -> String {
        columns
            .iter()
            .map(|c| format!("coalesce({ORIGIN_ALIAS}.{}, '')", dialect.quote_ident(c)))
            .collect::<Vec<_>>()
            .join(" || ' ' || ")
    }

    fn match_target(dialect: Dialect, columns: &[String]) -> String {
        columns
            .iter()
            .map(|c| format!("{ORIGIN_ALIAS}.{}", dialect.quote_ident(c)))
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Project the relevance as the synthetic `SearchScore` column.
    fn push_score_projection(&self, writer: &mut SqlWriter) {
        let dialect = writer.dialect();
        match &self.mechanism {
            SearchMechanism::ContainsJoin => {
                writer.push(", ft.");
                writer.ident("RANK");
                writer.push(" AS ");
                writer.ident(SEARCH_SCORE);
            }
            SearchMechanism::ContainsColumn(_) => {
                writer.push(", SCORE(1) AS ");
                writer.ident(SEARCH_SCORE);
            }
            SearchMechanism::MatchColumns(columns) => {
                writer.push(&format!(
                    ", MATCH({}) AGAINST (",
                    Self::match_target(dialect, columns)
                ));
                writer.bind(
                    "SearchCondition",
                    Value::Text(self.condition.clone()),
                    self.bind,
                );
                writer.push(" IN BOOLEAN MODE) AS ");
                writer.ident(SEARCH_SCORE);
            }
            SearchMechanism::TsVector(columns) => {
                writer.push(&format!(
                    ", ts_rank(to_tsvector('simple', {}), websearch_to_tsquery('simple', ",
                    Self::ts_document(dialect, columns)
                ));
                writer.bind(
                    "SearchCondition",
                    Value::Text(self.condition.clone()),
                    self.bind,
                );
                writer.push(")) AS ");
                writer.ident(SEARCH_SCORE);
            }
        }
    }

    /// The index join, for the join mechanism.
    fn push_join(&self, writer: &mut SqlWriter, definition: &EntityDefinition) {
        if let SearchMechanism::ContainsJoin = self.mechanism {
            let pk = definition.primary_key_attribute();
            writer.push(" INNER JOIN CONTAINSTABLE(");
            writer.ident(definition.table_name());
            writer.push(", *, ");
            writer.bind(
                "SearchCondition",
                Value::Text(self.condition.clone()),
                self.bind,
            );
            writer.push(") ft ON ");
            writer.qualified(ORIGIN_ALIAS, &pk.column);
            writer.push(" = ft.");
            writer.ident("KEY");
        }
    }

    /// The relevance predicate, for the expression mechanisms.
    fn push_predicate(&self, writer: &mut SqlWriter) {
        let dialect = writer.dialect();
        match &self.mechanism {
            SearchMechanism::ContainsJoin => {}
            SearchMechanism::ContainsColumn(column) => {
                writer.push(&format!("CONTAINS({ORIGIN_ALIAS}.{}, ", dialect.quote_ident(column)));
                writer.bind(
                    "SearchCondition",
                    Value::Text(self.condition.clone()),
                    self.bind,
                );
                writer.push(", 1) > 0");
            }
            SearchMechanism::MatchColumns(columns) => {
                writer.push(&format!("MATCH({}) AGAINST (", Self::match_target(dialect, columns)));
                writer.bind(
                    "SearchCondition",
                    Value::Text(self.condition.clone()),
                    self.bind,
                );
                writer.push(" IN BOOLEAN MODE) > 0");
            }
            SearchMechanism::TsVector(columns) => {
                writer.push(&format!(
                    "to_tsvector('simple', {}) @@ websearch_to_tsquery('simple', ",
                    Self::ts_document(dialect, columns)
                ));
                writer.bind(
                    "SearchCondition",
                    Value::Text(self.condition.clone()),
                    self.bind,
                );
                writer.push(")");
            }
        }
    }

    fn has_predicate(&self) -> bool {
        !matches!(self.mechanism, SearchMechanism::ContainsJoin)
    }
}

/// Should the extended-properties table be joined?
fn joins_extended(spec: &SelectSpec<'_>) -> bool {
    spec.definition.is_extendable() && spec.properties.is_some()
}

/// What the scaffold projects.
enum Projection {
    /// The column list (plus `SearchScore` when searching).
    Columns,
    /// `COUNT(pk)`, `COUNT(DISTINCT pk)` under a parent join.
    Count { distinct: bool },
}

/// Render the shared scaffold: projection, FROM, JOINs, WHERE.
fn render_base(
    spec: &SelectSpec<'_>,
    writer: &mut SqlWriter,
    parent_join: bool,
    search: Option<&SearchPlan>,
    projection: Projection,
) -> Result<(), BuildError> {
    let definition = spec.definition;
    let pk = definition.primary_key_attribute();

    writer.push("SELECT ");
    match projection {
        Projection::Columns => {
            if parent_join {
                // The link table multiplies rows per parent.
                writer.push("DISTINCT ");
            }
            let columns = projection_columns(spec)?;
            for (index, (alias, column)) in columns.iter().enumerate() {
                if index > 0 {
                    writer.push(", ");
                }
                writer.qualified(alias, column);
            }
            if let Some(plan) = search {
                plan.push_score_projection(writer);
            }
        }
        Projection::Count { distinct } => {
            writer.push("COUNT(");
            if distinct {
                writer.push("DISTINCT ");
            }
            writer.qualified(ORIGIN_ALIAS, &pk.column);
            writer.push(")");
        }
    }

    writer.push(" FROM ");
    writer.ident(definition.table_name());
    writer.push(" ");
    writer.push(ORIGIN_ALIAS);

    if joins_extended(spec) {
        if let Some(extended_table) = definition.extended_properties_table() {
            writer.push(" LEFT JOIN ");
            writer.ident(extended_table);
            writer.push(" ");
            writer.push(EXTENDED_ALIAS);
            writer.push(" ON ");
            writer.qualified(ORIGIN_ALIAS, &pk.column);
            writer.push(" = ");
            writer.qualified(EXTENDED_ALIAS, EXTENDED_KEY_COLUMN);
        }
    }
    if parent_join {
        if let Some(link) = definition.parent_link() {
            writer.push(" LEFT JOIN ");
            writer.ident(&link.table);
            writer.push(" ");
            writer.push(PARENT_ALIAS);
            writer.push(" ON ");
            writer.qualified(ORIGIN_ALIAS, &pk.column);
            writer.push(" = ");
            writer.qualified(PARENT_ALIAS, &link.child_column);
        }
    }
    if let Some(plan) = search {
        plan.push_join(writer, definition);
    }

    let has_filter = spec.filter.is_some();
    let has_predicate = search.map(SearchPlan::has_predicate).unwrap_or(false);
    if has_filter || has_predicate {
        writer.push(" WHERE ");
    }
    if let Some(filter) = spec.filter {
        writer.splice(&filter.render_sql())?;
    }
    if let Some(plan) = search.filter(|p| p.has_predicate()) {
        if has_filter {
            writer.push(" AND ");
        }
        plan.push_predicate(writer);
    }
    Ok(())
}

/// Assemble the final statement: base scaffold plus ordering and pagination.
fn assemble(
    dialect: Dialect,
    spec: &SelectSpec<'_>,
    parent_join: bool,
    search: Option<&SearchPlan>,
) -> Result<BuiltStatement, BuildError> {
    let caps = dialect.capabilities();
    let is_search = search.is_some();

    if !spec.page.is_paged() || caps.supports_limit_offset {
        let mut writer = SqlWriter::new(dialect);
        render_base(spec, &mut writer, parent_join, search, Projection::Columns)?;
        writer.push(" ORDER BY ");
        writer.push(&order_clause(dialect, spec, true, is_search)?);
        if spec.page.is_paged() {
            let (offset, _) = spec.page.bounds();
            writer.push(&format!(" LIMIT {} OFFSET {offset}", spec.page.size));
        }
        return Ok(writer.finish());
    }

    if !caps.supports_row_number {
        return Err(BuildError::UnsupportedPagination(dialect));
    }

    // Row-number family: number the entire filtered result, then slice.
    // The window ORDER BY uses physical output columns of the base select.
    let mut base_writer = SqlWriter::new(dialect);
    render_base(spec, &mut base_writer, parent_join, search, Projection::Columns)?;
    let base = base_writer.finish();

    let mut outer_columns: Vec<String> = projection_columns(spec)?
        .into_iter()
        .map(|(_, column)| dialect.quote_ident(&column))
        .collect();
    if is_search {
        outer_columns.push(dialect.quote_ident(SEARCH_SCORE));
    }
    let order = order_clause(dialect, spec, false, is_search)?;
    let (lower, upper) = spec.page.bounds();

    let text = format!(
        "SELECT * FROM (SELECT {cols}, ROW_NUMBER() OVER (ORDER BY {order}) AS {rn} \
         FROM ({base}) T) __Paged WHERE {rn} > {lower} AND {rn} <= {upper} ORDER BY {rn}",
        cols = outer_columns.join(", "),
        rn = ROW_NUMBER_COLUMN,
        base = base.text,
    );
    Ok(BuiltStatement {
        text,
        params: base.params,
    })
}

fn parent_join_for(spec: &SelectSpec<'_>) -> Result<bool, BuildError> {
    let wants_parent = spec.filter.map(|f| f.references_parent()).unwrap_or(false);
    if wants_parent && spec.definition.parent_link().is_none() {
        return Err(BuildError::InvalidFilterOrSort(format!(
            "{} declares no parent link table",
            spec.definition.type_name()
        )));
    }
    Ok(wants_parent)
}

/// Paged, sorted, filtered select over the origin (and side) tables.
pub fn build_select(dialect: Dialect, spec: &SelectSpec<'_>) -> Result<BuiltStatement, BuildError> {
    let parent_join = parent_join_for(spec)?;
    assemble(dialect, spec, parent_join, None)
}

/// Count with the same FROM/JOIN/WHERE construction as Select, no ORDER BY.
pub fn build_count(
    dialect: Dialect,
    spec: &SelectSpec<'_>,
) -> Result<BuiltStatement, BuildError> {
    let parent_join = parent_join_for(spec)?;
    let mut writer = SqlWriter::new(dialect);
    render_base(
        spec,
        &mut writer,
        parent_join,
        None,
        Projection::Count {
            distinct: parent_join,
        },
    )?;
    Ok(writer.finish())
}

/// Full-text search: Select scaffolding plus the dialect's relevance
/// mechanism. An empty query degrades to plain Select semantics. Search
/// never auto-joins the multi-parent table.
pub fn build_search(
    dialect: Dialect,
    spec: &SelectSpec<'_>,
    query: &SearchQuery,
) -> Result<BuiltStatement, BuildError> {
    if query.is_empty() {
        return build_select(dialect, spec);
    }
    if spec.filter.map(|f| f.references_parent()).unwrap_or(false) {
        return Err(BuildError::InvalidFilterOrSort(
            "search does not join the associated-parent table".to_string(),
        ));
    }
    let plan = search_plan(dialect, spec.definition, query)?;
    assemble(dialect, spec, false, Some(&plan))
}

/// Count of a full-text search: same scaffolding, no score projection or
/// ordering; the expression mechanisms keep the relevance predicate in
/// WHERE.
pub fn build_count_by_search(
    dialect: Dialect,
    spec: &SelectSpec<'_>,
    query: &SearchQuery,
) -> Result<BuiltStatement, BuildError> {
    if query.is_empty() {
        return build_count(dialect, spec);
    }
    if spec.filter.map(|f| f.references_parent()).unwrap_or(false) {
        return Err(BuildError::InvalidFilterOrSort(
            "search does not join the associated-parent table".to_string(),
        ));
    }
    let plan = search_plan(dialect, spec.definition, query)?;
    let mut writer = SqlWriter::new(dialect);
    render_base(
        spec,
        &mut writer,
        false,
        Some(&plan),
        Projection::Count { distinct: false },
    )?;
    Ok(writer.finish())
}
