//! Physical tables and the columns a statement reads from them.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;

use crate::ast::scope::{qualifier_matches, Relation, ResolvedSource, ScopeKind, ScopeStack};
use crate::ast::types::{SimpleSelect, Statement, TableSource, ValueComponent};
use crate::ast::visitor::{walk_statement, Visitor, Walk};
use crate::error::{SqlError, SqlResult};

use super::resolver::{resolve_table, TableColumnResolver};
use super::select_value::{order_by_alias_refs, OutputColumns};

/// A table name with its ordered, duplicate-free column list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableSchema {
    pub name: String,
    pub columns: Vec<String>,
}

impl TableSchema {
    /// Build a schema, dropping repeated column names but keeping the order
    /// of first occurrence.
    pub fn new<I, S>(name: impl Into<String>, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut unique: Vec<String> = Vec::new();
        for column in columns {
            let column = column.into();
            if !unique.contains(&column) {
                unique.push(column);
            }
        }
        Self {
            name: name.into(),
            columns: unique,
        }
    }

    pub fn has_column(&self, column: &str) -> bool {
        self.columns.iter().any(|c| c.eq_ignore_ascii_case(column))
    }
}

/// Collects every physical table a statement reads or writes together with
/// the sorted union of the columns it references. Names that resolve to a
/// CTE are not tables; what the CTE body reads is collected instead.
///
/// Entries are keyed `schema.table` when the reference is schema qualified.
pub struct SchemaCollector<'r> {
    resolver: Option<&'r dyn TableColumnResolver>,
    tables: BTreeMap<String, BTreeSet<String>>,
    /// ORDER BY entries that name an output alias, per open query.
    aliases: Vec<Vec<*const ValueComponent>>,
    error: Option<SqlError>,
}

impl<'r> SchemaCollector<'r> {
    pub fn new() -> Self {
        Self {
            resolver: None,
            tables: BTreeMap::new(),
            aliases: Vec::new(),
            error: None,
        }
    }

    pub fn with_resolver(resolver: &'r dyn TableColumnResolver) -> Self {
        Self {
            resolver: Some(resolver),
            ..Self::new()
        }
    }

    pub fn collect(&mut self, stmt: &Statement) -> SqlResult<Vec<TableSchema>> {
        self.tables.clear();
        self.aliases.clear();
        self.error = None;
        walk_statement(self, stmt);
        if let Some(err) = self.error.take() {
            return Err(err);
        }
        Ok(std::mem::take(&mut self.tables)
            .into_iter()
            .map(|(name, columns)| TableSchema::new(name, columns))
            .collect())
    }

    fn table(&mut self, schema: Option<&str>, name: &str) -> &mut BTreeSet<String> {
        let key = match schema {
            Some(s) => format!("{}.{}", s, name),
            None => name.to_string(),
        };
        self.tables.entry(key).or_default()
    }

    fn record(&mut self, relation: Relation<'_>, column: &str) {
        if let Relation::Physical { schema, name } = relation {
            self.table(schema, name).insert(column.to_string());
        }
    }

    fn column(
        &mut self,
        value: &ValueComponent,
        qualifier: Option<&str>,
        name: &str,
        scopes: &ScopeStack<'_>,
    ) -> SqlResult<()> {
        if let Some(q) = qualifier {
            if let Some(resolved) = scopes.resolve_qualifier(q) {
                self.record(resolved.relation, name);
            }
            return Ok(());
        }
        let is_alias = self
            .aliases
            .last()
            .is_some_and(|refs| refs.iter().any(|r| std::ptr::eq(*r, value)));
        if is_alias {
            return Ok(());
        }
        let sources = scopes.current_sources();
        match sources.as_slice() {
            [] => Ok(()),
            [only] => {
                self.record(only.relation, name);
                Ok(())
            }
            _ => {
                let owners: Vec<&ResolvedSource<'_>> = sources
                    .iter()
                    .filter(|s| self.declares(s, name, scopes))
                    .collect();
                match owners.as_slice() {
                    [owner] => {
                        self.record(owner.relation, name);
                        Ok(())
                    }
                    [] => Err(SqlError::column(
                        name,
                        format!("no source among {} declares it", source_list(&sources)),
                    )),
                    _ => Err(SqlError::column(
                        name,
                        format!("ambiguous between {}", source_list(&sources)),
                    )),
                }
            }
        }
    }

    /// Whether `source` is known to expose `column`.
    fn declares(&self, source: &ResolvedSource<'_>, column: &str, scopes: &ScopeStack<'_>) -> bool {
        let columns = match source.relation {
            Relation::Physical { schema, name } => self
                .resolver
                .and_then(|r| resolve_table(r, schema, name)),
            Relation::Function => None,
            relation => OutputColumns::new(self.resolver, Some(scopes))
                .of_relation(source.source, relation)
                .ok(),
        };
        columns.is_some_and(|cols| cols.iter().any(|c| c.eq_ignore_ascii_case(column)))
    }

    fn wildcards(&mut self, select: &SimpleSelect, scopes: &ScopeStack<'_>) -> SqlResult<()> {
        for item in &select.items {
            let ValueComponent::Wildcard { qualifier } = &item.value else {
                continue;
            };
            for resolved in scopes.current_sources() {
                if qualifier
                    .as_deref()
                    .is_some_and(|q| !qualifier_matches(resolved.source, q))
                {
                    continue;
                }
                let Relation::Physical { schema, name } = resolved.relation else {
                    continue;
                };
                let Some(resolver) = self.resolver else {
                    return Err(SqlError::UnresolvedWildcard {
                        table: Some(resolved.source.reference_name().to_string()),
                    });
                };
                let columns = resolve_table(resolver, schema, name).ok_or_else(|| {
                    SqlError::column(
                        format!("{}.*", resolved.source.reference_name()),
                        format!("resolver has no columns for table '{}'", name),
                    )
                })?;
                self.table(schema, name).extend(columns);
            }
        }
        Ok(())
    }

    fn fail(&mut self, result: SqlResult<()>) {
        if let Err(err) = result {
            self.error.get_or_insert(err);
        }
    }
}

fn source_list(sources: &[ResolvedSource<'_>]) -> String {
    sources
        .iter()
        .map(|s| s.source.reference_name())
        .collect::<Vec<_>>()
        .join(", ")
}

impl Default for SchemaCollector<'_> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'a> Visitor<'a> for SchemaCollector<'_> {
    fn enter_scope(&mut self, kind: ScopeKind, _scopes: &ScopeStack<'a>) {
        if kind == ScopeKind::Query {
            self.aliases.push(Vec::new());
        }
    }

    fn leave_scope(&mut self, kind: ScopeKind, _scopes: &ScopeStack<'a>) {
        if kind == ScopeKind::Query {
            self.aliases.pop();
        }
    }

    fn visit_statement(&mut self, stmt: &'a Statement, scopes: &ScopeStack<'a>) -> Walk {
        match stmt {
            Statement::Insert(insert) => {
                let set = self.table(insert.table.schema.as_deref(), &insert.table.name);
                set.extend(insert.columns.iter().cloned());
            }
            Statement::Update(update) => {
                if let TableSource::Table { schema, name, .. } = &update.target {
                    let schema = schema.as_deref();
                    let is_cte = schema.is_none() && scopes.resolve_cte(name).is_some();
                    if !is_cte {
                        let set = self.table(schema, name);
                        set.extend(update.assignments.iter().map(|a| a.column.clone()));
                    }
                }
            }
            _ => {}
        }
        Walk::Continue
    }

    fn visit_select(&mut self, select: &'a SimpleSelect, scopes: &ScopeStack<'a>) {
        if let Some(frame) = self.aliases.last_mut() {
            *frame = order_by_alias_refs(select);
        }
        let result = self.wildcards(select, scopes);
        self.fail(result);
    }

    fn visit_table_source(&mut self, source: &'a TableSource, scopes: &ScopeStack<'a>) -> Walk {
        if let Relation::Physical { schema, name } = scopes.resolve_relation(source) {
            self.table(schema, name);
        }
        Walk::Continue
    }

    fn visit_value(&mut self, value: &'a ValueComponent, scopes: &ScopeStack<'a>) -> Walk {
        if let ValueComponent::Column { qualifier, name } = value {
            let result = self.column(value, qualifier.as_deref(), name, scopes);
            self.fail(result);
        }
        Walk::Continue
    }
}
