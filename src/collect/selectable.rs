//! Columns that can be referenced from the root query.

use crate::ast::scope::{qualifier_matches, Relation, ScopeKind, ScopeStack};
use crate::ast::types::{SimpleSelect, Statement, ValueComponent};
use crate::ast::visitor::{walk_statement, Visitor, Walk};
use crate::error::{SqlError, SqlResult};

use super::resolver::{resolve_table, TableColumnResolver};
use super::select_value::{order_by_alias_refs, OutputColumns};

/// `qualifier.name` as visible in the root query.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SelectableColumn {
    pub qualifier: String,
    pub name: String,
}

impl SelectableColumn {
    pub fn to_value(&self) -> ValueComponent {
        ValueComponent::column(Some(&self.qualifier), self.name.as_str())
    }
}

#[derive(Debug)]
struct SourceColumns {
    reference: String,
    /// Referenced columns are only added to tables and table functions; a
    /// derived source exposes exactly its outputs.
    open: bool,
    columns: Vec<String>,
}

impl SourceColumns {
    fn add(&mut self, column: &str) {
        if !self.columns.iter().any(|c| c == column) {
            self.columns.push(column.to_string());
        }
    }
}

/// Flattens the root query's FROM list into referenceable columns.
///
/// Subquery and CTE sources expose their output columns only. Physical
/// tables expose the resolver's columns, when a resolver is given, plus
/// every column the root query references on them. Results are grouped per
/// source in FROM order. For a set operation the leftmost branch is used.
pub struct SelectableColumnCollector<'r> {
    resolver: Option<&'r dyn TableColumnResolver>,
    groups: Vec<SourceColumns>,
    /// Root ORDER BY entries that name an output alias.
    aliases: Vec<*const ValueComponent>,
    active: bool,
    done: bool,
    error: Option<SqlError>,
}

impl<'r> SelectableColumnCollector<'r> {
    pub fn new() -> Self {
        Self {
            resolver: None,
            groups: Vec::new(),
            aliases: Vec::new(),
            active: false,
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

    pub fn collect(&mut self, stmt: &Statement) -> SqlResult<Vec<SelectableColumn>> {
        self.groups.clear();
        self.aliases.clear();
        self.active = false;
        self.done = false;
        self.error = None;
        walk_statement(self, stmt);
        if let Some(err) = self.error.take() {
            return Err(err);
        }
        Ok(std::mem::take(&mut self.groups)
            .into_iter()
            .flat_map(|g| {
                let reference = g.reference;
                g.columns.into_iter().map(move |name| SelectableColumn {
                    qualifier: reference.clone(),
                    name,
                })
            })
            .collect())
    }

    fn open_root(&mut self, select: &SimpleSelect, scopes: &ScopeStack<'_>) -> SqlResult<()> {
        let outputs = OutputColumns::new(self.resolver, Some(scopes));
        self.aliases = order_by_alias_refs(select);
        for resolved in scopes.current_sources() {
            let reference = resolved.source.reference_name().to_string();
            let group = match resolved.relation {
                Relation::Physical { schema, name } => SourceColumns {
                    reference,
                    open: true,
                    columns: self
                        .resolver
                        .and_then(|r| resolve_table(r, schema, name))
                        .unwrap_or_default(),
                },
                Relation::Function => SourceColumns {
                    reference,
                    open: true,
                    columns: vec![],
                },
                relation => SourceColumns {
                    reference,
                    open: false,
                    columns: outputs.of_relation(resolved.source, relation)?,
                },
            };
            self.groups.push(group);
        }

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
                if matches!(resolved.relation, Relation::Physical { .. }) && self.resolver.is_none()
                {
                    return Err(SqlError::UnresolvedWildcard {
                        table: Some(resolved.source.reference_name().to_string()),
                    });
                }
            }
        }
        Ok(())
    }

    fn reference(
        &mut self,
        value: &ValueComponent,
        qualifier: Option<&str>,
        name: &str,
        scopes: &ScopeStack<'_>,
    ) {
        let target = match qualifier {
            Some(q) => match scopes.resolve_qualifier(q) {
                Some(resolved) if resolved.distance == 0 => {
                    resolved.source.reference_name().to_string()
                }
                _ => return,
            },
            None if self.aliases.iter().any(|r| std::ptr::eq(*r, value)) => return,
            None if self.groups.len() == 1 => self.groups[0].reference.clone(),
            None => return,
        };
        if let Some(group) = self
            .groups
            .iter_mut()
            .find(|g| g.open && g.reference == target)
        {
            group.add(name);
        }
    }
}

impl Default for SelectableColumnCollector<'_> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'a> Visitor<'a> for SelectableColumnCollector<'_> {
    fn leave_scope(&mut self, kind: ScopeKind, scopes: &ScopeStack<'a>) {
        if kind == ScopeKind::Query && self.active && scopes.at_root_query() {
            self.active = false;
        }
    }

    fn visit_select(&mut self, select: &'a SimpleSelect, scopes: &ScopeStack<'a>) {
        if self.done || !scopes.at_root_query() {
            return;
        }
        self.done = true;
        self.active = true;
        if let Err(err) = self.open_root(select, scopes) {
            self.error = Some(err);
            self.active = false;
        }
    }

    fn visit_value(&mut self, value: &'a ValueComponent, scopes: &ScopeStack<'a>) -> Walk {
        if self.active && scopes.at_root_query() {
            if let ValueComponent::Column { qualifier, name } = value {
                self.reference(value, qualifier.as_deref(), name, scopes);
            }
        }
        Walk::Continue
    }
}
