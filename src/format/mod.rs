//! Dialect-aware SQL rendering with parameter reconciliation.
//!
//! ```text
//! Statement ──► Renderer (render.rs) ──► SQL text
//!                   │
//!                   └──► ParamRegistry (params.rs) ──► RenderedParams
//! ```
//!
//! Parameters are numbered by their first appearance in the rendered text,
//! so CTE parameters always precede those of the main query.
pub mod dialect;
pub mod params;
mod render;

use serde::{Deserialize, Serialize};

use crate::ast::types::{Statement, ValueComponent, WithClause};
use crate::error::SqlResult;

pub use dialect::{DialectPreset, PlaceholderStyle};
pub use params::{ParamBinding, RenderedParams};

use render::Renderer;

/// Rendering switches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FormatOptions {
    pub preset: DialectPreset,
    /// Quote every identifier with the preset's quote characters.
    pub quote_identifiers: bool,
    /// One clause per line, subqueries indented.
    pub pretty: bool,
}

impl Default for FormatOptions {
    fn default() -> Self {
        Self {
            preset: DialectPreset::Named,
            quote_identifiers: true,
            pretty: false,
        }
    }
}

impl FormatOptions {
    pub fn preset(preset: DialectPreset) -> Self {
        Self {
            preset,
            ..Self::default()
        }
    }
}

/// Rendered SQL with its reconciled parameters.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FormattedSql {
    pub sql: String,
    pub params: RenderedParams,
}

#[derive(Debug, Clone, Default)]
pub struct SqlFormatter {
    options: FormatOptions,
}

impl SqlFormatter {
    pub fn new(options: FormatOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &FormatOptions {
        &self.options
    }

    /// Render `stmt` and reconcile its parameters.
    ///
    /// Fails with `DuplicateParameterConflict` when one name is bound to
    /// different values, and with `DuplicateCte` when hoisting set-operation
    /// WITH clauses would define one name twice with different bodies.
    pub fn format(&self, stmt: &Statement) -> SqlResult<FormattedSql> {
        let mut renderer = Renderer::new(&self.options);
        let sql = renderer.statement(stmt);
        if let Some(err) = renderer.take_error() {
            return Err(err);
        }
        let params = renderer.params.finish()?;
        tracing::debug!(
            preset = %self.options.preset,
            params = params.len(),
            "formatted statement"
        );
        Ok(FormattedSql { sql, params })
    }

    /// Render a lone expression. Placeholders are written but not collected.
    pub fn expression(&self, value: &ValueComponent) -> String {
        Renderer::new(&self.options).value(value)
    }

    /// Render a bare `WITH ...` clause.
    pub fn with_clause(&self, with: &WithClause) -> String {
        Renderer::new(&self.options).with_clause(with)
    }
}

/// Render with the default options.
pub fn format(stmt: &Statement) -> SqlResult<FormattedSql> {
    SqlFormatter::default().format(stmt)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::parser::parse;
    use crate::ast::types::BinaryOperator;
    use crate::ast::value::SqlValue;
    use crate::error::SqlError;

    fn compact(sql: &str) -> String {
        let options = FormatOptions {
            quote_identifiers: false,
            ..FormatOptions::default()
        };
        SqlFormatter::new(options)
            .format(&parse(sql).unwrap())
            .unwrap()
            .sql
    }

    fn with_preset(preset: DialectPreset, stmt: &Statement) -> SqlResult<FormattedSql> {
        SqlFormatter::new(FormatOptions::preset(preset)).format(stmt)
    }

    #[test]
    fn test_round_trip_reparseable() {
        let cases = [
            "SELECT * FROM users",
            "SELECT DISTINCT u.id, u.name AS full_name FROM users AS u WHERE u.age > 18",
            "SELECT dept, COUNT(*) FROM emp GROUP BY dept HAVING COUNT(*) > 5",
            "SELECT * FROM users ORDER BY name ASC NULLS LAST LIMIT 10 OFFSET 5",
            "SELECT * FROM a LEFT JOIN b ON a.id = b.a_id CROSS JOIN c",
            "SELECT ROW_NUMBER() OVER (PARTITION BY dept ORDER BY salary DESC) FROM employees",
            "SELECT CASE WHEN status = 'active' THEN 1 ELSE 0 END FROM users",
            "SELECT * FROM users WHERE id IN (SELECT user_id FROM active_users)",
            "SELECT * FROM products WHERE price NOT BETWEEN 10 AND 100 AND email IS NOT NULL",
            "WITH active AS (SELECT * FROM users WHERE active = TRUE) SELECT * FROM active",
            "INSERT INTO users (name, email) VALUES ('John', 'john@example.com')",
            "UPDATE users SET name = 'Jane' WHERE id = 1 RETURNING id",
            "DELETE FROM users WHERE id = 1",
            "CREATE TEMPORARY TABLE snapshot AS SELECT id FROM users",
        ];
        for sql in cases {
            let rendered = compact(sql);
            assert!(
                parse(&rendered).is_ok(),
                "re-parse failed for {} -> {}",
                sql,
                rendered
            );
        }
    }

    #[test]
    fn test_built_operands_keep_their_grouping() {
        let formatter = SqlFormatter::new(FormatOptions {
            quote_identifiers: false,
            ..Default::default()
        });
        let col = |name: &str| ValueComponent::column(None, name);

        let flag = ValueComponent::binary(
            ValueComponent::binary(col("a"), BinaryOperator::Or, col("b")),
            BinaryOperator::Eq,
            ValueComponent::param("flag", true),
        );
        assert_eq!(formatter.expression(&flag), "(a OR b) = :flag");

        let chained = ValueComponent::binary(
            ValueComponent::binary(col("x"), BinaryOperator::Gt, col("y")),
            BinaryOperator::Eq,
            col("z"),
        );
        assert_eq!(formatter.expression(&chained), "(x > y) = z");

        let right_nested = ValueComponent::binary(
            col("a"),
            BinaryOperator::Minus,
            ValueComponent::binary(col("b"), BinaryOperator::Minus, col("c")),
        );
        assert_eq!(formatter.expression(&right_nested), "a - (b - c)");

        assert_eq!(
            compact("SELECT a - b - c, a + b * c FROM t WHERE a OR b AND c"),
            "SELECT a - b - c, a + b * c FROM t WHERE a OR b AND c"
        );
    }

    #[test]
    fn test_string_literal_quotes_are_doubled() {
        assert_eq!(
            compact("SELECT 'O''Brien' AS n"),
            "SELECT 'O''Brien' AS n"
        );
    }

    #[test]
    fn test_identifier_quoting_per_preset() {
        let stmt = parse("SELECT u.id FROM public.users u").unwrap();
        let named = with_preset(DialectPreset::Named, &stmt).unwrap();
        assert_eq!(
            named.sql,
            r#"SELECT "u"."id" FROM "public"."users" AS "u""#
        );
        let mysql = with_preset(DialectPreset::MySql, &stmt).unwrap();
        assert_eq!(mysql.sql, "SELECT `u`.`id` FROM `public`.`users` AS `u`");
        let mssql = with_preset(DialectPreset::SqlServer, &stmt).unwrap();
        assert_eq!(mssql.sql, "SELECT [u].[id] FROM [public].[users] AS [u]");
    }

    #[test]
    fn test_cte_parameters_are_numbered_first() {
        let mut stmt = parse(
            "WITH recent AS (SELECT * FROM orders WHERE created_at > :since) \
             SELECT * FROM recent WHERE user_id = :user_id",
        )
        .unwrap();
        stmt.set_parameter("user_id", 10);
        stmt.set_parameter("since", "2024-01-01");
        let out = with_preset(DialectPreset::Postgres, &stmt).unwrap();
        assert!(out.sql.contains(r#""created_at" > $1"#));
        assert!(out.sql.contains(r#""user_id" = $2"#));
        assert_eq!(
            out.params,
            RenderedParams::Positional(vec![
                SqlValue::String("2024-01-01".into()),
                SqlValue::Integer(10),
            ])
        );
    }

    #[test]
    fn test_mysql_repeats_values_per_placeholder() {
        let mut stmt = parse("SELECT * FROM t WHERE a = :x OR b = :x").unwrap();
        stmt.set_parameter("x", 3);
        let out = with_preset(DialectPreset::MySql, &stmt).unwrap();
        assert_eq!(out.sql, "SELECT * FROM `t` WHERE `a` = ? OR `b` = ?");
        assert_eq!(
            out.params,
            RenderedParams::Positional(vec![SqlValue::Integer(3), SqlValue::Integer(3)])
        );
    }

    #[test]
    fn test_unbound_parameter_renders_null_value() {
        let stmt = parse("SELECT * FROM t WHERE a = :missing").unwrap();
        let out = with_preset(DialectPreset::Sqlite, &stmt).unwrap();
        assert_eq!(out.params.get("missing"), Some(&SqlValue::Null));
    }

    #[test]
    fn test_union_hoists_operand_with_clauses() {
        let stmt = parse(
            "(WITH a AS (SELECT 1 AS v) SELECT v FROM a) \
             UNION ALL \
             (WITH b AS (SELECT 2 AS v) SELECT v FROM b)",
        )
        .unwrap();
        let sql = SqlFormatter::new(FormatOptions {
            quote_identifiers: false,
            ..Default::default()
        })
        .format(&stmt)
        .unwrap()
        .sql;
        assert_eq!(
            sql,
            "WITH a AS (SELECT 1 AS v), b AS (SELECT 2 AS v) \
             SELECT v FROM a UNION ALL SELECT v FROM b"
        );
    }

    #[test]
    fn test_conflicting_cte_names_across_operands() {
        let stmt = parse(
            "(WITH a AS (SELECT 1 AS v) SELECT v FROM a) \
             UNION \
             (WITH a AS (SELECT 2 AS v) SELECT v FROM a)",
        )
        .unwrap();
        assert_eq!(
            format(&stmt).unwrap_err(),
            SqlError::DuplicateCte("a".into())
        );
    }

    #[test]
    fn test_operand_with_limit_is_parenthesized() {
        assert_eq!(
            compact("(SELECT id FROM a ORDER BY id LIMIT 1) UNION SELECT id FROM b"),
            "(SELECT id FROM a ORDER BY id LIMIT 1) UNION SELECT id FROM b"
        );
    }

    #[test]
    fn test_pretty_layout() {
        let options = FormatOptions {
            quote_identifiers: false,
            pretty: true,
            ..Default::default()
        };
        let stmt = parse("SELECT id FROM (SELECT id FROM users WHERE active) AS s WHERE id > 1")
            .unwrap();
        let sql = SqlFormatter::new(options).format(&stmt).unwrap().sql;
        assert_eq!(
            sql,
            "SELECT id\nFROM (\n    SELECT id\n    FROM users\n    WHERE active\n) AS s\nWHERE id > 1"
        );
    }

    #[test]
    fn test_formatted_sql_serializes() {
        let mut stmt = parse("SELECT * FROM users WHERE id = :id").unwrap();
        stmt.set_parameter("id", 1);
        let json = serde_json::to_value(format(&stmt).unwrap()).unwrap();
        assert_eq!(json["params"], serde_json::json!({ "id": 1 }));
    }
}
