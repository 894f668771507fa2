//! Full-text query parsing and per-family term rendering.
//!
//! A raw query string is parsed once into a [`SearchQuery`] of AND, OR and
//! NOT terms (words or quoted phrases), then rendered into the condition
//! string the target engine's full-text machinery expects:
//!
//! - Row-number family (SQL Server, Oracle): `CONTAINS`-style wildcard terms,
//!   `"*word*" AND ...`, OR-terms parenthesized, NOT-terms as `AND NOT`.
//! - Limit-offset family (MySQL, Postgres): boolean-mode tokens, `+word`,
//!   `-word`, `"phrase"`, space-joined.
//!
//! An empty query renders to an empty string and the Search builders fall
//! back to plain Select semantics.

use crate::dialect::Dialect;
use once_cell::sync::Lazy;
use regex::Regex;

/// One parsed term: a single word or a quoted phrase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Term {
    pub text: String,
    pub phrase: bool,
}

impl Term {
    fn word(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            phrase: false,
        }
    }

    fn phrase(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            phrase: true,
        }
    }
}

/// A parsed full-text query: required terms, optional terms, excluded terms.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchQuery {
    pub and_terms: Vec<Term>,
    pub or_terms: Vec<Term>,
    pub not_terms: Vec<Term>,
}

// `+term`, `-term`, `"a phrase"`, bare word.
static TOKEN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"([+\-]?)(?:"([^"]*)"|(\S+))"#).expect("token pattern is valid")
});

impl SearchQuery {
    /// Parse a raw query string.
    ///
    /// `+`-prefixed tokens become AND terms, `-`-prefixed tokens NOT terms,
    /// everything else OR terms. Double quotes delimit phrases; an unclosed
    /// quote is treated as a literal character of a word.
    pub fn parse(input: &str) -> Self {
        let mut query = SearchQuery::default();
        for capture in TOKEN.captures_iter(input) {
            let term = match (capture.get(2), capture.get(3)) {
                (Some(phrase), _) => {
                    if phrase.as_str().trim().is_empty() {
                        continue;
                    }
                    Term::phrase(phrase.as_str())
                }
                (None, Some(word)) => Term::word(word.as_str()),
                (None, None) => continue,
            };
            match capture.get(1).map(|m| m.as_str()).unwrap_or("") {
                "+" => query.and_terms.push(term),
                "-" => query.not_terms.push(term),
                _ => query.or_terms.push(term),
            }
        }
        query
    }

    pub fn is_empty(&self) -> bool {
        self.and_terms.is_empty() && self.or_terms.is_empty() && self.not_terms.is_empty()
    }
}

/// Render the parsed query into the dialect family's condition string.
pub fn render_terms(dialect: Dialect, query: &SearchQuery) -> String {
    if query.is_empty() {
        return String::new();
    }
    if dialect.capabilities().supports_row_number {
        render_contains(query)
    } else {
        render_boolean_mode(query)
    }
}

/// `CONTAINS` syntax: every term wrapped `"*text*"`, AND > (OR) > NOT.
///
/// Combination rule: with both AND-terms and OR-terms present the result is
/// `AND-terms NOT-terms AND (OR-terms)`; with no AND-terms it is
/// `OR-terms NOT-terms`; a query of nothing but NOT-terms keeps its leading
/// `NOT`.
fn render_contains(query: &SearchQuery) -> String {
    let wrap = |term: &Term| format!("\"*{}*\"", term.text);

    let and_part = query
        .and_terms
        .iter()
        .map(wrap)
        .collect::<Vec<_>>()
        .join(" AND ");
    let or_part = query
        .or_terms
        .iter()
        .map(wrap)
        .collect::<Vec<_>>()
        .join(" OR ");
    let not_part = query
        .not_terms
        .iter()
        .map(|t| format!("AND NOT {}", wrap(t)))
        .collect::<Vec<_>>()
        .join(" ");

    let mut out = String::new();
    if !and_part.is_empty() {
        out.push_str(&and_part);
    } else if !or_part.is_empty() {
        out.push_str(&or_part);
    }
    if !not_part.is_empty() {
        if out.is_empty() {
            // NOT-only query: strip the connective.
            out.push_str(not_part.trim_start_matches("AND "));
        } else {
            out.push(' ');
            out.push_str(&not_part);
        }
    }
    if !and_part.is_empty() && !or_part.is_empty() {
        out.push_str(" AND (");
        out.push_str(&or_part);
        out.push(')');
    }
    out
}

/// Boolean-mode syntax: `+word` / `+"phrase"` required, `-` excluded, bare
/// optional, space-joined.
fn render_boolean_mode(query: &SearchQuery) -> String {
    let token = |term: &Term| {
        if term.phrase {
            format!("\"{}\"", term.text)
        } else {
            term.text.clone()
        }
    };

    let mut parts = Vec::new();
    for term in &query.and_terms {
        parts.push(format!("+{}", token(term)));
    }
    for term in &query.not_terms {
        parts.push(format!("-{}", token(term)));
    }
    for term in &query.or_terms {
        parts.push(token(term));
    }
    parts.join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_classifies_prefixes() {
        let query = SearchQuery::parse("+ocean wave -storm");
        assert_eq!(query.and_terms, vec![Term::word("ocean")]);
        assert_eq!(query.or_terms, vec![Term::word("wave")]);
        assert_eq!(query.not_terms, vec![Term::word("storm")]);
    }

    #[test]
    fn test_parse_phrases() {
        let query = SearchQuery::parse(r#"+"breaking wave" -"open sea" tide"#);
        assert_eq!(query.and_terms, vec![Term::phrase("breaking wave")]);
        assert_eq!(query.not_terms, vec![Term::phrase("open sea")]);
        assert_eq!(query.or_terms, vec![Term::word("tide")]);
    }

    #[test]
    fn test_parse_empty_input() {
        assert!(SearchQuery::parse("").is_empty());
        assert!(SearchQuery::parse("   ").is_empty());
        // EDGE CASE: an empty quoted phrase contributes nothing.
        assert!(SearchQuery::parse("\"\"").is_empty());
    }

    #[test]
    fn test_contains_and_terms_only() {
        let query = SearchQuery::parse("+ocean +wave");
        assert_eq!(
            render_terms(Dialect::SqlServer, &query),
            r#""*ocean*" AND "*wave*""#
        );
    }

    #[test]
    fn test_contains_or_terms_only() {
        let query = SearchQuery::parse("ocean wave");
        assert_eq!(
            render_terms(Dialect::SqlServer, &query),
            r#""*ocean*" OR "*wave*""#
        );
    }

    #[test]
    fn test_contains_combination_rule() {
        // Both AND-terms and OR-terms present:
        // AND-terms NOT-terms AND (OR-terms)
        let query = SearchQuery::parse("+ocean -storm wave tide");
        assert_eq!(
            render_terms(Dialect::Oracle, &query),
            r#""*ocean*" AND NOT "*storm*" AND ("*wave*" OR "*tide*")"#
        );
    }

    #[test]
    fn test_contains_or_with_not() {
        let query = SearchQuery::parse("wave -storm");
        assert_eq!(
            render_terms(Dialect::SqlServer, &query),
            r#""*wave*" AND NOT "*storm*""#
        );
    }

    #[test]
    fn test_contains_not_only() {
        let query = SearchQuery::parse("-storm");
        assert_eq!(render_terms(Dialect::SqlServer, &query), r#"NOT "*storm*""#);
    }

    #[test]
    fn test_boolean_mode_rendering() {
        let query = SearchQuery::parse(r#"+ocean +"breaking wave" -storm tide"#);
        assert_eq!(
            render_terms(Dialect::MySql, &query),
            r#"+ocean +"breaking wave" -storm tide"#
        );
    }

    #[test]
    fn test_empty_query_renders_empty() {
        let query = SearchQuery::default();
        assert_eq!(render_terms(Dialect::SqlServer, &query), "");
        assert_eq!(render_terms(Dialect::Postgres, &query), "");
    }

    #[test]
    fn test_rendering_is_deterministic() {
        let query = SearchQuery::parse("+a b -c");
        let first = render_terms(Dialect::SqlServer, &query);
        let second = render_terms(Dialect::SqlServer, &query);
        assert_eq!(first, second);
    }
}
