//! FROM entries touched by a statement.

use serde::Serialize;

use crate::ast::scope::{Relation, ScopeStack};
use crate::ast::types::{CommonTable, Statement, TableSource};
use crate::ast::visitor::{walk_statement, Visitor, Walk};

/// A named FROM entry: a table, a CTE reference or a table function.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct TableReference {
    pub schema: Option<String>,
    pub name: String,
    pub alias: Option<String>,
}

impl TableReference {
    /// Name columns of this entry are qualified with.
    pub fn reference_name(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.name)
    }
}

/// Lists the tables a statement touches.
///
/// With `selectable_only` (the default) only the root query's FROM list is
/// considered, on every branch of a set operation. CTE references are
/// listed by name and neither CTE bodies nor subqueries are entered.
///
/// Otherwise the whole tree is scanned, CTE bodies included, and only
/// physical tables and table functions are reported.
#[derive(Debug)]
pub struct TableSourceCollector {
    selectable_only: bool,
    found: Vec<TableReference>,
}

impl Default for TableSourceCollector {
    fn default() -> Self {
        Self::new(true)
    }
}

impl TableSourceCollector {
    pub fn new(selectable_only: bool) -> Self {
        Self {
            selectable_only,
            found: Vec::new(),
        }
    }

    pub fn collect(&mut self, stmt: &Statement) -> Vec<TableReference> {
        self.found.clear();
        walk_statement(self, stmt);
        std::mem::take(&mut self.found)
    }

    fn push(&mut self, schema: Option<&str>, name: &str, alias: Option<&str>) {
        let reference = TableReference {
            schema: schema.map(str::to_string),
            name: name.to_string(),
            alias: alias.map(str::to_string),
        };
        if !self.found.contains(&reference) {
            self.found.push(reference);
        }
    }
}

impl<'a> Visitor<'a> for TableSourceCollector {
    fn visit_common_table(&mut self, _cte: &'a CommonTable, _scopes: &ScopeStack<'a>) -> Walk {
        if self.selectable_only {
            Walk::SkipChildren
        } else {
            Walk::Continue
        }
    }

    fn visit_table_source(&mut self, source: &'a TableSource, scopes: &ScopeStack<'a>) -> Walk {
        if self.selectable_only {
            if !scopes.at_root_query() {
                return Walk::SkipChildren;
            }
            match source {
                TableSource::Table {
                    schema,
                    name,
                    alias,
                } => self.push(schema.as_deref(), name, alias.as_deref()),
                TableSource::Function { name, alias, .. } => {
                    self.push(None, name, alias.as_deref())
                }
                TableSource::Subquery { .. } => {}
            }
            return Walk::SkipChildren;
        }

        match (scopes.resolve_relation(source), source) {
            (Relation::Physical { schema, name }, _) => self.push(schema, name, source.alias()),
            (Relation::Function, TableSource::Function { name, alias, .. }) => {
                self.push(None, name, alias.as_deref())
            }
            _ => {}
        }
        Walk::Continue
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::parser::parse;

    fn names(refs: &[TableReference]) -> Vec<&str> {
        refs.iter().map(|r| r.name.as_str()).collect()
    }

    const NESTED: &str = "WITH active AS (SELECT id FROM users WHERE active) \
        SELECT a.id, o.total FROM active a \
        JOIN orders o ON o.user_id = a.id \
        WHERE o.id IN (SELECT order_id FROM refunds)";

    #[test]
    fn test_selectable_only_lists_root_sources() {
        let stmt = parse(NESTED).unwrap();
        let refs = TableSourceCollector::default().collect(&stmt);
        assert_eq!(names(&refs), vec!["active", "orders"]);
        assert_eq!(refs[0].reference_name(), "a");
    }

    #[test]
    fn test_full_scan_excludes_cte_names() {
        let stmt = parse(NESTED).unwrap();
        let refs = TableSourceCollector::new(false).collect(&stmt);
        assert_eq!(names(&refs), vec!["users", "orders", "refunds"]);
    }

    #[test]
    fn test_selectable_only_follows_union_branches_but_not_subqueries() {
        let stmt = parse(
            "SELECT id FROM users \
             UNION ALL \
             SELECT id FROM (SELECT id FROM archived_users) AS x \
             UNION ALL \
             SELECT id FROM users",
        )
        .unwrap();
        let refs = TableSourceCollector::default().collect(&stmt);
        assert_eq!(names(&refs), vec!["users"]);

        let refs = TableSourceCollector::new(false).collect(&stmt);
        assert_eq!(names(&refs), vec!["users", "archived_users"]);
    }

    #[test]
    fn test_dedup_keeps_distinct_aliases() {
        let stmt = parse(
            "SELECT * FROM users a JOIN users b ON a.manager_id = b.id JOIN public.users c ON TRUE",
        )
        .unwrap();
        let refs = TableSourceCollector::default().collect(&stmt);
        assert_eq!(refs.len(), 3);
        assert_eq!(refs[2].schema.as_deref(), Some("public"));
    }
}
