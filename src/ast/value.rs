//! Dynamically-typed scalar values bound to parameters and fixture cells.

use std::fmt;

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use serde::Serialize;

use super::types::{Literal, ValueComponent};

/// A scalar supplied from outside the SQL text: a parameter binding or a
/// fixture cell.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum SqlValue {
    Null,
    Bool(bool),
    Integer(i64),
    Float(f64),
    String(String),
    Date(NaiveDate),
    Timestamp(DateTime<Utc>),
    /// Objects and arrays. Rendered as quoted JSON text.
    Json(serde_json::Value),
}

impl SqlValue {
    pub fn is_null(&self) -> bool {
        matches!(self, SqlValue::Null)
    }

    /// Literal AST node for this value, following the fixture rendering
    /// rules: dates become quoted ISO-8601 strings and structured values
    /// become quoted JSON text.
    pub fn to_literal(&self) -> ValueComponent {
        let lit = match self {
            SqlValue::Null => Literal::Null,
            SqlValue::Bool(b) => Literal::Boolean(*b),
            SqlValue::Integer(i) => Literal::Number(i.to_string()),
            SqlValue::Float(f) if f.is_finite() => Literal::Number(f.to_string()),
            SqlValue::Float(_) => Literal::Null,
            SqlValue::String(s) => Literal::String(s.clone()),
            SqlValue::Date(d) => Literal::String(d.format("%Y-%m-%d").to_string()),
            SqlValue::Timestamp(ts) => {
                Literal::String(ts.to_rfc3339_opts(SecondsFormat::Millis, true))
            }
            SqlValue::Json(v) => Literal::String(v.to_string()),
        };
        ValueComponent::Literal(lit)
    }
}

impl fmt::Display for SqlValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SqlValue::Null => write!(f, "NULL"),
            SqlValue::Bool(b) => write!(f, "{}", b),
            SqlValue::Integer(i) => write!(f, "{}", i),
            SqlValue::Float(x) => write!(f, "{}", x),
            SqlValue::String(s) => write!(f, "'{}'", s),
            SqlValue::Date(d) => write!(f, "{}", d),
            SqlValue::Timestamp(ts) => write!(f, "{}", ts.to_rfc3339()),
            SqlValue::Json(v) => write!(f, "{}", v),
        }
    }
}

impl From<serde_json::Value> for SqlValue {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => SqlValue::Null,
            serde_json::Value::Bool(b) => SqlValue::Bool(b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => SqlValue::Integer(i),
                None => SqlValue::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            serde_json::Value::String(s) => SqlValue::String(s),
            other => SqlValue::Json(other),
        }
    }
}

impl From<i64> for SqlValue {
    fn from(v: i64) -> Self {
        SqlValue::Integer(v)
    }
}

impl From<i32> for SqlValue {
    fn from(v: i32) -> Self {
        SqlValue::Integer(v.into())
    }
}

impl From<f64> for SqlValue {
    fn from(v: f64) -> Self {
        SqlValue::Float(v)
    }
}

impl From<bool> for SqlValue {
    fn from(v: bool) -> Self {
        SqlValue::Bool(v)
    }
}

impl From<&str> for SqlValue {
    fn from(v: &str) -> Self {
        SqlValue::String(v.to_string())
    }
}

impl From<String> for SqlValue {
    fn from(v: String) -> Self {
        SqlValue::String(v)
    }
}

impl From<NaiveDate> for SqlValue {
    fn from(v: NaiveDate) -> Self {
        SqlValue::Date(v)
    }
}

impl From<DateTime<Utc>> for SqlValue {
    fn from(v: DateTime<Utc>) -> Self {
        SqlValue::Timestamp(v)
    }
}

impl<T: Into<SqlValue>> From<Option<T>> for SqlValue {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(SqlValue::Null)
    }
}
