//! Canonical single-select shape for any query.

use crate::ast::types::*;
use crate::ast::visitor::collect_operand_withs;
use crate::collect::select_value::positional_names;
use crate::error::{SqlError, SqlResult};

use super::RewritePass;

const BINARY_ALIAS: &str = "bq";
const VALUES_ALIAS: &str = "vq";

/// Turns any query statement into a `SimpleSelect`.
///
/// - `SimpleSelect` is returned unchanged (same allocation).
/// - `BinarySelect` becomes `SELECT * FROM (<original>) AS bq`.
/// - `Values` becomes `SELECT * FROM (<original>) AS vq(column1, ...)`,
///   or with the query's own column aliases when it has them.
///
/// WITH clauses owned by set-operation operands move to the wrapper so they
/// stay visible ahead of the whole query.
#[derive(Debug, Default, Clone, Copy)]
pub struct QueryNormalizer;

impl QueryNormalizer {
    pub fn new() -> Self {
        Self
    }

    pub fn normalize(&self, stmt: Statement) -> SqlResult<Box<SimpleSelect>> {
        match stmt {
            Statement::Select(select) => Ok(select),
            Statement::Binary(binary) => {
                let mut inner = Statement::Binary(binary);
                let with = take_operand_withs(&mut inner)?;
                tracing::debug!(alias = BINARY_ALIAS, "normalized set operation");
                Ok(Box::new(wrap(inner, BINARY_ALIAS, vec![], with)))
            }
            Statement::Values(values) => {
                let width = values.rows.first().map_or(0, Vec::len);
                let columns = if values.column_aliases.is_empty() {
                    positional_names(width)
                } else {
                    values.column_aliases.clone()
                };
                tracing::debug!(alias = VALUES_ALIAS, width, "normalized VALUES list");
                Ok(Box::new(wrap(
                    Statement::Values(ValuesQuery {
                        rows: values.rows,
                        column_aliases: vec![],
                    }),
                    VALUES_ALIAS,
                    columns,
                    None,
                )))
            }
            other => Err(SqlError::UnsupportedStatement(format!(
                "cannot normalize {} into a select",
                statement_label(&other)
            ))),
        }
    }
}

impl RewritePass for QueryNormalizer {
    fn name(&self) -> &str {
        "normalize"
    }

    fn description(&self) -> &str {
        "Wraps set operations and VALUES lists into a single select"
    }

    fn rewrite(&self, stmt: Statement) -> SqlResult<Statement> {
        self.normalize(stmt).map(Statement::Select)
    }
}

fn wrap(
    inner: Statement,
    alias: &str,
    columns: Vec<String>,
    with: Option<WithClause>,
) -> SimpleSelect {
    SimpleSelect {
        with,
        items: vec![SelectItem::new(ValueComponent::Wildcard { qualifier: None })],
        from: vec![TableSource::Subquery {
            query: Box::new(inner),
            alias: alias.to_string(),
            columns,
            lateral: false,
        }],
        ..Default::default()
    }
}

/// Detach the WITH clauses of every leaf select in a set-operation chain and
/// merge them into one clause. Identical repeats collapse.
fn take_operand_withs(stmt: &mut Statement) -> SqlResult<Option<WithClause>> {
    let mut found = Vec::new();
    collect_operand_withs(stmt, &mut found);
    if found.is_empty() {
        return Ok(None);
    }
    let mut merged = WithClause::default();
    for with in found {
        merged.recursive |= with.recursive;
        for table in &with.tables {
            match merged.get(&table.name) {
                Some(existing) if existing == table => {}
                Some(_) => return Err(SqlError::DuplicateCte(table.name.clone())),
                None => merged.tables.push(table.clone()),
            }
        }
    }
    clear_operand_withs(stmt);
    Ok(Some(merged))
}

fn clear_operand_withs(stmt: &mut Statement) {
    match stmt {
        Statement::Select(s) => s.with = None,
        Statement::Binary(b) => {
            clear_operand_withs(&mut b.left);
            clear_operand_withs(&mut b.right);
        }
        _ => {}
    }
}

fn statement_label(stmt: &Statement) -> &'static str {
    match stmt {
        Statement::Select(_) => "SELECT",
        Statement::Binary(_) => "set operation",
        Statement::Values(_) => "VALUES",
        Statement::Insert(_) => "INSERT",
        Statement::CreateTable(_) => "CREATE TABLE",
        Statement::Update(_) => "UPDATE",
        Statement::Delete(_) => "DELETE",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::parser::parse;
    use crate::format::{FormatOptions, SqlFormatter};

    fn render(select: Box<SimpleSelect>) -> String {
        SqlFormatter::new(FormatOptions {
            quote_identifiers: false,
            ..Default::default()
        })
        .format(&Statement::Select(select))
        .unwrap()
        .sql
    }

    #[test]
    fn test_simple_select_is_the_same_node() {
        let stmt = parse("SELECT id FROM users").unwrap();
        let Statement::Select(boxed) = stmt else {
            panic!("Expected select");
        };
        let before: *const SimpleSelect = &*boxed;
        let normalized = QueryNormalizer::new()
            .normalize(Statement::Select(boxed))
            .unwrap();
        assert!(std::ptr::eq(before, &*normalized));
    }

    #[test]
    fn test_binary_is_wrapped_as_bq() {
        let normalized = QueryNormalizer::new()
            .normalize(parse("SELECT id FROM a UNION SELECT id FROM b").unwrap())
            .unwrap();
        assert_eq!(
            render(normalized),
            "SELECT * FROM (SELECT id FROM a UNION SELECT id FROM b) AS bq"
        );
    }

    #[test]
    fn test_values_get_positional_columns() {
        let normalized = QueryNormalizer::new()
            .normalize(parse("VALUES (1, 'a'), (2, 'b')").unwrap())
            .unwrap();
        assert_eq!(
            render(normalized),
            "SELECT * FROM (VALUES (1, 'a'), (2, 'b')) AS vq(column1, column2)"
        );
    }

    #[test]
    fn test_values_keep_their_aliases() {
        let values = Statement::Values(ValuesQuery {
            rows: vec![vec![ValueComponent::null()]],
            column_aliases: vec!["id".into()],
        });
        let normalized = QueryNormalizer::new().normalize(values).unwrap();
        assert_eq!(render(normalized), "SELECT * FROM (VALUES (NULL)) AS vq(id)");
    }

    #[test]
    fn test_operand_with_moves_to_wrapper() {
        let normalized = QueryNormalizer::new()
            .normalize(
                parse("WITH a AS (SELECT 1 AS v) SELECT v FROM a UNION ALL SELECT v FROM a")
                    .unwrap(),
            )
            .unwrap();
        assert_eq!(
            render(normalized),
            "WITH a AS (SELECT 1 AS v) \
             SELECT * FROM (SELECT v FROM a UNION ALL SELECT v FROM a) AS bq"
        );
    }

    #[test]
    fn test_dml_is_rejected() {
        assert!(matches!(
            QueryNormalizer::new().normalize(parse("DELETE FROM t").unwrap()),
            Err(SqlError::UnsupportedStatement(_))
        ));
    }
}
