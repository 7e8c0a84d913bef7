//! Error taxonomy for the analysis and rewriting engine.
//!
//! Every failure is a construction-time or render-time value carrying the
//! context a caller needs to report it. Nothing in this crate logs or retries
//! an error; the immediate caller decides.

use std::fmt;

use serde::Serialize;
use thiserror::Error;

use crate::ast::SqlValue;

/// Result type alias used throughout the engine.
pub type SqlResult<T> = Result<T, SqlError>;

/// Line/column location reported by the parser frontend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SourcePosition {
    pub line: u64,
    pub column: u64,
}

impl fmt::Display for SourcePosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}, column {}", self.line, self.column)
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SqlError {
    /// Malformed SQL text, raised by the parser frontend.
    #[error("syntax error: {message}{}", fmt_position(.position))]
    Syntax {
        message: String,
        position: Option<SourcePosition>,
    },

    /// A `*` or `alias.*` could not be expanded because no column resolver
    /// was supplied.
    #[error("wildcard over {} requires a table column resolver", fmt_table(.table))]
    UnresolvedWildcard { table: Option<String> },

    /// A column could not be matched to a visible source.
    #[error("cannot resolve column '{column}': {reason}")]
    ColumnResolution { column: String, reason: String },

    /// Target columns of an INSERT could not be derived from the select list.
    #[error("cannot infer insert columns: select item {position} ('{item}') has no name")]
    InferredColumnsMissing { position: usize, item: String },

    /// A JSON mapping entity points at a parent that was never declared.
    #[error("entity '{entity}' references unknown parent '{parent}'")]
    InvalidParentEntity { entity: String, parent: String },

    /// A nested JSON mapping entity has no property name to nest under.
    #[error("entity '{entity}' is nested but has no propertyName")]
    MissingPropertyName { entity: String },

    /// Two occurrences of one parameter name carry different values.
    #[error("parameter '{name}' is bound to conflicting values {first} and {second}")]
    DuplicateParameterConflict {
        name: String,
        first: SqlValue,
        second: SqlValue,
    },

    /// A statement builder was given nothing to operate on.
    #[error("missing operand: {0}")]
    MissingOperand(String),

    /// A WITH clause would contain two tables with the same name.
    #[error("common table '{0}' is already defined in this WITH clause")]
    DuplicateCte(String),

    /// The parser produced a statement kind the engine does not model.
    #[error("unsupported statement: {0}")]
    UnsupportedStatement(String),

    /// A declarative condition could not be interpreted.
    #[error("invalid condition for '{key}': {reason}")]
    InvalidCondition { key: String, reason: String },
}

fn fmt_position(position: &Option<SourcePosition>) -> String {
    match position {
        Some(p) => format!(" at {}", p),
        None => String::new(),
    }
}

fn fmt_table(table: &Option<String>) -> String {
    match table {
        Some(t) => format!("'{}'", t),
        None => "an unknown source".to_string(),
    }
}

impl SqlError {
    pub fn syntax(message: impl Into<String>) -> Self {
        SqlError::Syntax {
            message: message.into(),
            position: None,
        }
    }

    pub fn column(column: impl Into<String>, reason: impl Into<String>) -> Self {
        SqlError::ColumnResolution {
            column: column.into(),
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_syntax_error_display_with_position() {
        let err = SqlError::Syntax {
            message: "Expected end of statement".into(),
            position: Some(SourcePosition { line: 1, column: 8 }),
        };
        assert_eq!(
            err.to_string(),
            "syntax error: Expected end of statement at line 1, column 8"
        );
    }

    #[test]
    fn test_unresolved_wildcard_names_table() {
        let err = SqlError::UnresolvedWildcard {
            table: Some("u".into()),
        };
        assert!(err.to_string().contains("'u'"));

        let anonymous = SqlError::UnresolvedWildcard { table: None };
        assert!(anonymous.to_string().contains("unknown source"));
    }

    #[test]
    fn test_conflict_reports_both_values() {
        let err = SqlError::DuplicateParameterConflict {
            name: "id".into(),
            first: SqlValue::Integer(1),
            second: SqlValue::Integer(2),
        };
        let msg = err.to_string();
        assert!(msg.contains("'id'"));
        assert!(msg.contains('1'));
        assert!(msg.contains('2'));
    }
}
