//! Literal fixture tables injected as CTEs.
//!
//! Each fixture becomes `name(col1, ...) AS (VALUES (...), ...)` at the front
//! of the statement's WITH clause. References to the physical table then
//! resolve to the CTE, so the query runs against the literal rows.

use std::collections::BTreeMap;

use serde::Deserialize;
use serde_json::{Map, Value};

use crate::ast::types::*;
use crate::ast::value::SqlValue;
use crate::ast::visitor::walk_table_sources_mut;
use crate::collect::TableSchema;
use crate::error::{SqlError, SqlResult};
use crate::format::{FormatOptions, SqlFormatter};

use super::RewritePass;

pub type FixtureRow = BTreeMap<String, SqlValue>;

/// Rows standing in for one table.
#[derive(Debug, Clone, PartialEq)]
pub struct FixtureTable {
    pub schema: TableSchema,
    pub rows: Vec<FixtureRow>,
}

impl FixtureTable {
    pub fn new(schema: TableSchema, rows: Vec<FixtureRow>) -> Self {
        Self { schema, rows }
    }

    /// A fixture with a single all-NULL row.
    pub fn null_row(schema: TableSchema) -> Self {
        Self {
            rows: vec![FixtureRow::new()],
            schema,
        }
    }

    fn target(&self) -> QualifiedName {
        QualifiedName::parse(&self.schema.name)
    }

    /// Cells of `row` in schema order, NULL where a column is missing.
    fn cells(&self, row: &FixtureRow) -> SqlResult<Vec<ValueComponent>> {
        for key in row.keys() {
            if !self.schema.has_column(key) {
                return Err(SqlError::column(
                    key.as_str(),
                    format!("fixture column is not part of table '{}'", self.schema.name),
                ));
            }
        }
        Ok(self
            .schema
            .columns
            .iter()
            .map(|column| {
                row.get(column)
                    .or_else(|| {
                        row.iter()
                            .find(|(k, _)| k.eq_ignore_ascii_case(column))
                            .map(|(_, v)| v)
                    })
                    .map_or_else(ValueComponent::null, SqlValue::to_literal)
            })
            .collect())
    }
}

/// Builds fixture CTEs and prepends them to statements.
#[derive(Debug, Clone, Copy, Default)]
pub struct FixtureInjector {
    quote_identifiers: bool,
}

impl FixtureInjector {
    pub fn new(quote_identifiers: bool) -> Self {
        Self { quote_identifiers }
    }

    /// `name(cols) AS (VALUES ...)`, or a typed empty select when the fixture
    /// has no rows.
    pub fn build_cte(&self, fixture: &FixtureTable) -> SqlResult<CommonTable> {
        let columns = fixture.schema.columns.clone();
        if columns.is_empty() {
            return Err(SqlError::MissingOperand(format!(
                "fixture for '{}' declares no columns",
                fixture.schema.name
            )));
        }
        let body = if fixture.rows.is_empty() {
            Statement::Select(Box::new(SimpleSelect {
                items: columns
                    .iter()
                    .map(|c| SelectItem::aliased(ValueComponent::null(), c.as_str()))
                    .collect(),
                filter: Some(ValueComponent::binary(
                    ValueComponent::Literal(Literal::Number("1".into())),
                    BinaryOperator::Eq,
                    ValueComponent::Literal(Literal::Number("0".into())),
                )),
                ..Default::default()
            }))
        } else {
            Statement::Values(ValuesQuery {
                rows: fixture
                    .rows
                    .iter()
                    .map(|row| fixture.cells(row))
                    .collect::<SqlResult<_>>()?,
                column_aliases: vec![],
            })
        };
        Ok(CommonTable {
            name: fixture.target().name,
            columns,
            body,
        })
    }

    pub fn build_with(&self, fixtures: &[FixtureTable]) -> SqlResult<WithClause> {
        WithClause::new(
            fixtures
                .iter()
                .map(|f| self.build_cte(f))
                .collect::<SqlResult<_>>()?,
        )
    }

    /// Prepend one CTE per fixture to `stmt`'s WITH clause.
    ///
    /// A CTE the statement already defines under the same name is kept and
    /// that fixture is skipped. Schema-qualified references to a fixture
    /// table lose their schema so the CTE shadows them.
    pub fn inject(&self, mut stmt: Statement, fixtures: &[FixtureTable]) -> SqlResult<Statement> {
        if fixtures.is_empty() {
            return Ok(stmt);
        }
        let slot = stmt.with_clause_mut().ok_or_else(|| {
            SqlError::UnsupportedStatement("fixtures need a statement with a query".to_string())
        })?;

        let mut ctes = Vec::with_capacity(fixtures.len());
        let mut targets = Vec::with_capacity(fixtures.len());
        for fixture in fixtures {
            let target = fixture.target();
            if slot.as_ref().is_some_and(|w| w.get(&target.name).is_some()) {
                tracing::debug!(
                    table = %fixture.schema.name,
                    "statement defines this CTE itself, fixture skipped"
                );
                continue;
            }
            ctes.push(self.build_cte(fixture)?);
            targets.push(target);
        }
        if ctes.is_empty() {
            return Ok(stmt);
        }
        let count = ctes.len();
        slot.get_or_insert_with(WithClause::default).prepend(ctes)?;

        walk_table_sources_mut(&mut stmt, &mut |source| {
            if let TableSource::Table { schema, name, .. } = source {
                let Some(own) = schema.as_deref() else {
                    return;
                };
                let shadowed = targets.iter().any(|t| {
                    t.name.eq_ignore_ascii_case(name)
                        && t.schema.as_deref().map_or(true, |s| s.eq_ignore_ascii_case(own))
                });
                if shadowed {
                    *schema = None;
                }
            }
        });
        tracing::debug!(fixtures = count, "injected fixture CTEs");
        Ok(stmt)
    }

    /// Inject one all-NULL row per table, so a statement can be checked for
    /// shape without data.
    pub fn inject_null_scaffolding(
        &self,
        stmt: Statement,
        schemas: &[TableSchema],
    ) -> SqlResult<Statement> {
        let fixtures: Vec<FixtureTable> = schemas
            .iter()
            .cloned()
            .map(FixtureTable::null_row)
            .collect();
        self.inject(stmt, &fixtures)
    }

    /// Render the fixtures as a standalone `WITH ...` clause.
    pub fn to_with_sql(&self, fixtures: &[FixtureTable]) -> SqlResult<String> {
        let with = self.build_with(fixtures)?;
        let formatter = SqlFormatter::new(FormatOptions {
            quote_identifiers: self.quote_identifiers,
            ..Default::default()
        });
        Ok(formatter.with_clause(&with))
    }
}

/// A [`RewritePass`] that injects a fixed set of fixtures.
pub struct FixturePass {
    injector: FixtureInjector,
    fixtures: Vec<FixtureTable>,
}

impl FixturePass {
    pub fn new(injector: FixtureInjector, fixtures: Vec<FixtureTable>) -> Self {
        Self { injector, fixtures }
    }
}

impl RewritePass for FixturePass {
    fn name(&self) -> &str {
        "inject_fixtures"
    }

    fn description(&self) -> &str {
        "Prepends literal fixture tables as CTEs"
    }

    fn rewrite(&self, stmt: Statement) -> SqlResult<Statement> {
        self.injector.inject(stmt, &self.fixtures)
    }
}

/// Fixture file contents: table name to rows, optionally with an explicit
/// column list.
///
/// ```json
/// {
///   "users": [{ "id": 1, "name": "Ann" }],
///   "orders": { "columns": ["id", "user_id", "total"], "rows": [] }
/// }
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(transparent)]
pub struct FixtureFile {
    tables: BTreeMap<String, FixtureSource>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum FixtureSource {
    Rows(Vec<Map<String, Value>>),
    Table {
        #[serde(default)]
        columns: Vec<String>,
        rows: Vec<Map<String, Value>>,
    },
}

impl FixtureFile {
    /// Resolve each table's columns: the explicit list, else the matching
    /// collected schema, else the keys used by its rows.
    pub fn into_tables(self, schemas: &[TableSchema]) -> Vec<FixtureTable> {
        self.tables
            .into_iter()
            .map(|(name, source)| {
                let (declared, rows) = match source {
                    FixtureSource::Rows(rows) => (vec![], rows),
                    FixtureSource::Table { columns, rows } => (columns, rows),
                };
                let rows: Vec<FixtureRow> = rows
                    .into_iter()
                    .map(|row| row.into_iter().map(|(k, v)| (k, SqlValue::from(v))).collect())
                    .collect();
                let columns = if !declared.is_empty() {
                    declared
                } else if let Some(schema) = schemas.iter().find(|s| {
                    s.name.eq_ignore_ascii_case(&name)
                        || QualifiedName::parse(&s.name).name.eq_ignore_ascii_case(&name)
                }) {
                    let mut columns = schema.columns.clone();
                    for key in rows.iter().flat_map(|r| r.keys()) {
                        if !columns.iter().any(|c| c.eq_ignore_ascii_case(key)) {
                            columns.push(key.clone());
                        }
                    }
                    columns
                } else {
                    rows.iter().flat_map(|r| r.keys().cloned()).collect()
                };
                FixtureTable::new(TableSchema::new(name, columns), rows)
            })
            .collect()
    }
}
