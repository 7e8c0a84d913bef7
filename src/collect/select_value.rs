//! Output items of a query, with wildcards expanded.

use crate::ast::scope::{qualifier_matches, Relation, ScopeStack};
use crate::ast::types::{CommonTable, SimpleSelect, Statement, TableSource, ValueComponent};
use crate::ast::visitor::{walk_statement, Visitor};
use crate::error::{SqlError, SqlResult};

use super::resolver::{resolve_table, TableColumnResolver};

const MAX_EXPANSION_DEPTH: usize = 64;

/// One output column of a query.
#[derive(Debug, Clone, PartialEq)]
pub struct SelectValue {
    /// Name the column is exposed under, if it has one.
    pub name: Option<String>,
    pub value: ValueComponent,
}

/// Lists the root query's output items. `*` and `q.*` are expanded into one
/// column per underlying column, qualified with the alias visible in the
/// root query, so expansion through nested CTEs yields `outer_alias.col`
/// rather than the original table.
///
/// For a set operation the leftmost branch names the output.
pub struct SelectValueCollector<'r> {
    resolver: Option<&'r dyn TableColumnResolver>,
    values: Vec<SelectValue>,
    done: bool,
    error: Option<SqlError>,
}

impl<'r> SelectValueCollector<'r> {
    pub fn new() -> Self {
        Self {
            resolver: None,
            values: Vec::new(),
            done: false,
            error: None,
        }
    }

    pub fn with_resolver(resolver: &'r dyn TableColumnResolver) -> Self {
        Self {
            resolver: Some(resolver),
            ..Self::new()
        }
    }

    pub fn collect(&mut self, stmt: &Statement) -> SqlResult<Vec<SelectValue>> {
        self.values.clear();
        self.done = false;
        self.error = None;
        walk_statement(self, stmt);
        match self.error.take() {
            Some(err) => Err(err),
            None => Ok(std::mem::take(&mut self.values)),
        }
    }

    fn expand(&self, select: &SimpleSelect, scopes: &ScopeStack<'_>) -> SqlResult<Vec<SelectValue>> {
        let outputs = OutputColumns::new(self.resolver, Some(scopes));
        let mut values = Vec::new();
        for item in &select.items {
            let ValueComponent::Wildcard { qualifier } = &item.value else {
                values.push(SelectValue {
                    name: item.output_name().map(str::to_string),
                    value: item.value.clone(),
                });
                continue;
            };
            for resolved in scopes.current_sources() {
                if let Some(q) = qualifier {
                    if !qualifier_matches(resolved.source, q) {
                        continue;
                    }
                }
                let alias = resolved.source.reference_name();
                for column in outputs.of_relation(resolved.source, resolved.relation)? {
                    values.push(SelectValue {
                        value: ValueComponent::column(Some(alias), column.as_str()),
                        name: Some(column),
                    });
                }
            }
        }
        Ok(values)
    }
}

impl Default for SelectValueCollector<'_> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'a> Visitor<'a> for SelectValueCollector<'_> {
    fn visit_select(&mut self, select: &'a SimpleSelect, scopes: &ScopeStack<'a>) {
        if self.done || !scopes.at_root_query() {
            return;
        }
        self.done = true;
        match self.expand(select, scopes) {
            Ok(values) => self.values = values,
            Err(err) => self.error = Some(err),
        }
    }
}

/// Column names a statement or FROM entry exposes.
///
/// CTE references are looked up in the WITH clauses met on the way down and
/// then in `scopes`, innermost first.
pub(crate) struct OutputColumns<'a, 's> {
    resolver: Option<&'s dyn TableColumnResolver>,
    scopes: Option<&'s ScopeStack<'a>>,
}

impl<'a, 's> OutputColumns<'a, 's> {
    pub(crate) fn new(
        resolver: Option<&'s dyn TableColumnResolver>,
        scopes: Option<&'s ScopeStack<'a>>,
    ) -> Self {
        Self { resolver, scopes }
    }

    pub(crate) fn of_statement(&self, stmt: &'a Statement) -> SqlResult<Vec<String>> {
        self.statement(stmt, &mut Vec::new(), 0)
    }

    /// Outputs of `select` with `env` as the CTEs visible around it.
    pub(crate) fn of_select(
        &self,
        select: &'a SimpleSelect,
        env: &[&'a CommonTable],
    ) -> SqlResult<Vec<String>> {
        let mut env = env.to_vec();
        if let Some(with) = &select.with {
            env.extend(with.tables.iter());
        }
        self.select(select, &mut env, 0)
    }

    pub(crate) fn of_relation(
        &self,
        source: &'a TableSource,
        relation: Relation<'a>,
    ) -> SqlResult<Vec<String>> {
        match relation {
            Relation::Physical { schema, name } => {
                self.physical(schema, name, source.reference_name())
            }
            Relation::Cte(cte) => self.common_table(cte, &mut Vec::new(), 0),
            Relation::Subquery { query, columns } if columns.is_empty() => {
                self.statement(query, &mut Vec::new(), 0)
            }
            Relation::Subquery { columns, .. } => Ok(columns.to_vec()),
            Relation::Function => Ok(vec![]),
        }
    }

    fn statement(
        &self,
        stmt: &'a Statement,
        env: &mut Vec<&'a CommonTable>,
        depth: usize,
    ) -> SqlResult<Vec<String>> {
        if depth > MAX_EXPANSION_DEPTH {
            return Err(SqlError::column("*", "wildcard expansion nests too deeply"));
        }
        match stmt {
            Statement::Select(s) => {
                let mark = env.len();
                if let Some(with) = &s.with {
                    env.extend(with.tables.iter());
                }
                let result = self.select(s, env, depth);
                env.truncate(mark);
                result
            }
            Statement::Binary(b) => self.statement(&b.left, env, depth + 1),
            Statement::Values(v) if !v.column_aliases.is_empty() => Ok(v.column_aliases.clone()),
            Statement::Values(v) => Ok(positional_names(
                v.rows.first().map(Vec::len).unwrap_or(0),
            )),
            Statement::Insert(i) => Ok(named_items(&i.returning)),
            Statement::Update(u) => Ok(named_items(&u.returning)),
            Statement::Delete(d) => Ok(named_items(&d.returning)),
            Statement::CreateTable(_) => Ok(vec![]),
        }
    }

    fn select(
        &self,
        s: &'a SimpleSelect,
        env: &mut Vec<&'a CommonTable>,
        depth: usize,
    ) -> SqlResult<Vec<String>> {
        let mut names = Vec::new();
        for item in &s.items {
            match &item.value {
                ValueComponent::Wildcard { qualifier } => {
                    for source in s.sources() {
                        if qualifier
                            .as_deref()
                            .is_some_and(|q| !qualifier_matches(source, q))
                        {
                            continue;
                        }
                        names.extend(self.source(source, env, depth + 1)?);
                    }
                }
                _ => names.extend(item.output_name().map(str::to_string)),
            }
        }
        Ok(names)
    }

    fn source(
        &self,
        source: &'a TableSource,
        env: &mut Vec<&'a CommonTable>,
        depth: usize,
    ) -> SqlResult<Vec<String>> {
        match source {
            TableSource::Table {
                schema: None, name, ..
            } => match self.lookup_cte(env, name) {
                Some(cte) => self.common_table(cte, env, depth),
                None => self.physical(None, name, source.reference_name()),
            },
            TableSource::Table {
                schema: Some(schema),
                name,
                ..
            } => self.physical(Some(schema), name, source.reference_name()),
            TableSource::Subquery { query, columns, .. } if columns.is_empty() => {
                self.statement(query, env, depth)
            }
            TableSource::Subquery { columns, .. } => Ok(columns.clone()),
            TableSource::Function { .. } => Ok(vec![]),
        }
    }

    fn common_table(
        &self,
        cte: &'a CommonTable,
        env: &mut Vec<&'a CommonTable>,
        depth: usize,
    ) -> SqlResult<Vec<String>> {
        if !cte.columns.is_empty() {
            return Ok(cte.columns.clone());
        }
        self.statement(&cte.body, env, depth + 1)
    }

    fn lookup_cte(&self, env: &[&'a CommonTable], name: &str) -> Option<&'a CommonTable> {
        env.iter()
            .rev()
            .find(|c| c.name.eq_ignore_ascii_case(name))
            .copied()
            .or_else(|| self.scopes.and_then(|s| s.resolve_cte(name)))
    }

    fn physical(&self, schema: Option<&str>, name: &str, alias: &str) -> SqlResult<Vec<String>> {
        let Some(resolver) = self.resolver else {
            return Err(SqlError::UnresolvedWildcard {
                table: Some(alias.to_string()),
            });
        };
        resolve_table(resolver, schema, name).ok_or_else(|| {
            SqlError::column(
                format!("{}.*", alias),
                format!("resolver has no columns for table '{}'", name),
            )
        })
    }
}

/// `column1 .. columnN`, the names VALUES lists expose.
pub(crate) fn positional_names(count: usize) -> Vec<String> {
    (1..=count).map(|i| format!("column{}", i)).collect()
}

/// Bare ORDER BY entries naming an output alias of `select`. Only these read
/// the projection; every other unqualified column reads a source.
pub(crate) fn order_by_alias_refs(select: &SimpleSelect) -> Vec<*const ValueComponent> {
    select
        .order_by
        .iter()
        .filter(|o| match &o.value {
            ValueComponent::Column {
                qualifier: None,
                name,
            } => select
                .items
                .iter()
                .filter_map(|i| i.alias.as_deref())
                .any(|alias| alias.eq_ignore_ascii_case(name)),
            _ => false,
        })
        .map(|o| &o.value as *const ValueComponent)
        .collect()
}

fn named_items(items: &[crate::ast::types::SelectItem]) -> Vec<String> {
    items
        .iter()
        .filter_map(|i| i.output_name().map(str::to_string))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::parser::parse;
    use std::collections::HashMap;

    fn resolver() -> HashMap<String, Vec<String>> {
        let mut map = HashMap::new();
        map.insert(
            "users".to_string(),
            vec!["id".to_string(), "name".to_string(), "email".to_string()],
        );
        map
    }

    fn names(values: &[SelectValue]) -> Vec<&str> {
        values.iter().filter_map(|v| v.name.as_deref()).collect()
    }

    #[test]
    fn test_explicit_items() {
        let stmt = parse("SELECT u.id, u.name AS full_name, now() FROM users u").unwrap();
        let values = SelectValueCollector::new().collect(&stmt).unwrap();
        assert_eq!(values.len(), 3);
        assert_eq!(names(&values), vec!["id", "full_name"]);
        assert_eq!(values[2].name, None);
    }

    #[test]
    fn test_wildcard_over_physical_table_needs_resolver() {
        let stmt = parse("SELECT * FROM users u").unwrap();
        let err = SelectValueCollector::new().collect(&stmt).unwrap_err();
        assert_eq!(
            err,
            SqlError::UnresolvedWildcard {
                table: Some("u".into())
            }
        );

        let map = resolver();
        let values = SelectValueCollector::with_resolver(&map)
            .collect(&stmt)
            .unwrap();
        assert_eq!(names(&values), vec!["id", "name", "email"]);
        assert_eq!(values[0].value, ValueComponent::column(Some("u"), "id"));
    }

    #[test]
    fn test_wildcard_through_nested_ctes_requalifies_to_outer_alias() {
        let stmt = parse(
            "WITH base AS (SELECT * FROM users), \
                  narrowed AS (SELECT b.id, b.name FROM base b) \
             SELECT n.* FROM narrowed n",
        )
        .unwrap();
        let map = resolver();
        let values = SelectValueCollector::with_resolver(&map)
            .collect(&stmt)
            .unwrap();
        assert_eq!(
            values,
            vec![
                SelectValue {
                    name: Some("id".into()),
                    value: ValueComponent::column(Some("n"), "id"),
                },
                SelectValue {
                    name: Some("name".into()),
                    value: ValueComponent::column(Some("n"), "name"),
                },
            ]
        );
    }

    #[test]
    fn test_subquery_wildcard_does_not_need_resolver() {
        let stmt = parse("SELECT * FROM (SELECT id, name FROM users) AS sub").unwrap();
        let values = SelectValueCollector::new().collect(&stmt).unwrap();
        assert_eq!(names(&values), vec!["id", "name"]);
    }

    #[test]
    fn test_values_expose_positional_names() {
        let stmt = parse("SELECT * FROM (VALUES (1, 'a')) AS v").unwrap();
        let values = SelectValueCollector::new().collect(&stmt).unwrap();
        assert_eq!(names(&values), vec!["column1", "column2"]);
    }

    #[test]
    fn test_union_uses_left_branch_names() {
        let stmt = parse("SELECT id AS k FROM a UNION SELECT other FROM b").unwrap();
        let values = SelectValueCollector::new().collect(&stmt).unwrap();
        assert_eq!(names(&values), vec!["k"]);
    }
}
