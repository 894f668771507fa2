//! Dialect adapter.
//!
//! Identifies the target relational engine and exposes the capability flags
//! the statement builders branch on. Two pagination families exist: the
//! row-number family paginates through a window-numbering subquery, the
//! limit-offset family through a trailing clause. A dialect belongs to at
//! most one family.
//!
//! Quoting and placeholder styles live here too, so the builders stay
//! vendor-neutral everywhere except this seam.

use std::fmt;

/// Supported relational engines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dialect {
    SqlServer,
    Oracle,
    MySql,
    Postgres,
}

/// Capability flags consumed by the statement builders.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DialectCapabilities {
    /// Paginates via a `ROW_NUMBER()` wrapping subquery.
    pub supports_row_number: bool,
    /// Paginates via a trailing `LIMIT .. OFFSET ..` clause.
    pub supports_limit_offset: bool,
    /// Full-text condition parameters need Unicode text binding.
    pub requires_unicode_text: bool,
}

/// A dialect name the adapter does not recognize. No partial fallback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnrecognizedDialect {
    pub name: String,
}

impl fmt::Display for UnrecognizedDialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unrecognized dialect: {}", self.name)
    }
}

impl std::error::Error for UnrecognizedDialect {}

impl Dialect {
    /// Resolve a configured dialect name (case-insensitive).
    pub fn from_name(name: &str) -> Result<Self, UnrecognizedDialect> {
        match name.to_ascii_lowercase().as_str() {
            "sqlserver" | "mssql" => Ok(Dialect::SqlServer),
            "oracle" => Ok(Dialect::Oracle),
            "mysql" | "mariadb" => Ok(Dialect::MySql),
            "postgres" | "postgresql" => Ok(Dialect::Postgres),
            _ => Err(UnrecognizedDialect {
                name: name.to_string(),
            }),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Dialect::SqlServer => "sqlserver",
            Dialect::Oracle => "oracle",
            Dialect::MySql => "mysql",
            Dialect::Postgres => "postgres",
        }
    }

    pub fn capabilities(&self) -> DialectCapabilities {
        match self {
            Dialect::SqlServer | Dialect::Oracle => DialectCapabilities {
                supports_row_number: true,
                supports_limit_offset: false,
                requires_unicode_text: matches!(self, Dialect::SqlServer),
            },
            Dialect::MySql | Dialect::Postgres => DialectCapabilities {
                supports_row_number: false,
                supports_limit_offset: true,
                requires_unicode_text: false,
            },
        }
    }

    /// Quote an identifier the way the engine expects.
    ///
    /// Embedded closing quote characters are doubled.
    pub fn quote_ident(&self, name: &str) -> String {
        match self {
            Dialect::SqlServer => format!("[{}]", name.replace(']', "]]")),
            Dialect::MySql => format!("`{}`", name.replace('`', "``")),
            Dialect::Oracle | Dialect::Postgres => format!("\"{}\"", name.replace('"', "\"\"")),
        }
    }

    /// Render the placeholder for the parameter at `index` (0-based) named
    /// `name`. Parameters stay ordered and named in the built statement
    /// regardless of the style rendered here.
    pub fn placeholder(&self, name: &str, index: usize) -> String {
        match self {
            Dialect::SqlServer => format!("@{name}"),
            Dialect::Oracle => format!(":{name}"),
            Dialect::MySql => "?".to_string(),
            Dialect::Postgres => format!("${}", index + 1),
        }
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_name_accepts_aliases() {
        assert_eq!(Dialect::from_name("MSSQL").unwrap(), Dialect::SqlServer);
        assert_eq!(Dialect::from_name("SqlServer").unwrap(), Dialect::SqlServer);
        assert_eq!(Dialect::from_name("postgresql").unwrap(), Dialect::Postgres);
        assert_eq!(Dialect::from_name("mariadb").unwrap(), Dialect::MySql);
        assert_eq!(Dialect::from_name("oracle").unwrap(), Dialect::Oracle);
    }

    #[test]
    fn test_from_name_rejects_unknown() {
        let err = Dialect::from_name("sybase").unwrap_err();
        assert_eq!(err.name, "sybase");
        assert!(err.to_string().contains("unrecognized dialect"));
    }

    #[test]
    fn test_pagination_families_are_disjoint() {
        for dialect in [
            Dialect::SqlServer,
            Dialect::Oracle,
            Dialect::MySql,
            Dialect::Postgres,
        ] {
            let caps = dialect.capabilities();
            assert!(
                caps.supports_row_number != caps.supports_limit_offset,
                "{dialect} must belong to exactly one pagination family"
            );
        }
    }

    #[test]
    fn test_unicode_text_only_on_sqlserver() {
        assert!(Dialect::SqlServer.capabilities().requires_unicode_text);
        assert!(!Dialect::Oracle.capabilities().requires_unicode_text);
        assert!(!Dialect::MySql.capabilities().requires_unicode_text);
        assert!(!Dialect::Postgres.capabilities().requires_unicode_text);
    }

    #[test]
    fn test_quote_ident_styles() {
        assert_eq!(Dialect::SqlServer.quote_ident("Articles"), "[Articles]");
        assert_eq!(Dialect::MySql.quote_ident("Articles"), "`Articles`");
        assert_eq!(Dialect::Postgres.quote_ident("Articles"), "\"Articles\"");
        assert_eq!(Dialect::Oracle.quote_ident("Articles"), "\"Articles\"");
    }

    #[test]
    fn test_quote_ident_doubles_embedded_quotes() {
        assert_eq!(Dialect::SqlServer.quote_ident("a]b"), "[a]]b]");
        assert_eq!(Dialect::MySql.quote_ident("a`b"), "`a``b`");
        assert_eq!(Dialect::Postgres.quote_ident("a\"b"), "\"a\"\"b\"");
    }

    #[test]
    fn test_placeholder_styles() {
        assert_eq!(Dialect::SqlServer.placeholder("Title", 3), "@Title");
        assert_eq!(Dialect::Oracle.placeholder("Title", 3), ":Title");
        assert_eq!(Dialect::MySql.placeholder("Title", 3), "?");
        assert_eq!(Dialect::Postgres.placeholder("Title", 3), "$4");
    }
}
