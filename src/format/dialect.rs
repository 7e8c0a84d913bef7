//! Identifier quoting and placeholder rules per target engine.

use serde::{Deserialize, Serialize};

use crate::error::SqlError;

/// How a preset writes parameter placeholders.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaceholderStyle {
    /// `:name`
    Colon,
    /// `$1`, `$2`, numbered by first appearance
    Dollar,
    /// `?`, one per occurrence
    Question,
    /// `@name`
    At,
}

/// A bundle of rendering rules for one SQL engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DialectPreset {
    #[default]
    Named,
    Postgres,
    MySql,
    SqlServer,
    Sqlite,
}

impl DialectPreset {
    pub const ALL: [DialectPreset; 5] = [
        DialectPreset::Named,
        DialectPreset::Postgres,
        DialectPreset::MySql,
        DialectPreset::SqlServer,
        DialectPreset::Sqlite,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            DialectPreset::Named => "named",
            DialectPreset::Postgres => "postgres",
            DialectPreset::MySql => "mysql",
            DialectPreset::SqlServer => "sqlserver",
            DialectPreset::Sqlite => "sqlite",
        }
    }

    /// Opening and closing identifier quote.
    pub fn quotes(&self) -> (char, char) {
        match self {
            DialectPreset::MySql => ('`', '`'),
            DialectPreset::SqlServer => ('[', ']'),
            _ => ('"', '"'),
        }
    }

    pub fn placeholder_style(&self) -> PlaceholderStyle {
        match self {
            DialectPreset::Named | DialectPreset::Sqlite => PlaceholderStyle::Colon,
            DialectPreset::Postgres => PlaceholderStyle::Dollar,
            DialectPreset::MySql => PlaceholderStyle::Question,
            DialectPreset::SqlServer => PlaceholderStyle::At,
        }
    }

    /// Whether parameters are emitted as an ordered array rather than a map.
    pub fn is_positional(&self) -> bool {
        matches!(
            self.placeholder_style(),
            PlaceholderStyle::Dollar | PlaceholderStyle::Question
        )
    }

    /// Quote `ident`, doubling any embedded closing quote.
    pub fn quote_ident(&self, ident: &str) -> String {
        let (open, close) = self.quotes();
        let mut out = String::with_capacity(ident.len() + 2);
        out.push(open);
        for ch in ident.chars() {
            if ch == close {
                out.push(close);
            }
            out.push(ch);
        }
        out.push(close);
        out
    }

    /// Placeholder text for the parameter `name`, the `index`-th distinct
    /// parameter in render order (1-based).
    pub fn placeholder(&self, name: &str, index: usize) -> String {
        match self.placeholder_style() {
            PlaceholderStyle::Colon => format!(":{}", name),
            PlaceholderStyle::Dollar => format!("${}", index),
            PlaceholderStyle::Question => "?".to_string(),
            PlaceholderStyle::At => format!("@{}", name),
        }
    }
}

impl std::str::FromStr for DialectPreset {
    type Err = SqlError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "named" | "generic" => Ok(DialectPreset::Named),
            "postgres" | "postgresql" | "pg" => Ok(DialectPreset::Postgres),
            "mysql" | "mariadb" => Ok(DialectPreset::MySql),
            "sqlserver" | "mssql" => Ok(DialectPreset::SqlServer),
            "sqlite" => Ok(DialectPreset::Sqlite),
            other => Err(SqlError::UnsupportedStatement(format!(
                "unknown dialect preset '{}'",
                other
            ))),
        }
    }
}

impl std::fmt::Display for DialectPreset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}
