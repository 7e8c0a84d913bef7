//! Common table expression discovery.

use crate::ast::scope::{Relation, ScopeStack};
use crate::ast::types::{CommonTable, Statement, TableSource};
use crate::ast::visitor::{walk_statement, Visitor, Walk};

/// Gathers every CTE reachable from a statement: nested WITH clauses, CTE
/// bodies, subqueries and both sides of set operations.
///
/// Results are innermost first. A CTE is emitted only after every CTE
/// declared inside its own body; siblings keep their source order.
#[derive(Debug, Default)]
pub struct CteCollector<'a> {
    tables: Vec<&'a CommonTable>,
}

impl<'a> CteCollector<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn collect(&mut self, stmt: &'a Statement) -> Vec<&'a CommonTable> {
        self.tables.clear();
        walk_statement(self, stmt);
        std::mem::take(&mut self.tables)
    }

    /// Names of all reachable CTEs, innermost first.
    pub fn names(stmt: &'a Statement) -> Vec<String> {
        CteCollector::new()
            .collect(stmt)
            .into_iter()
            .map(|t| t.name.clone())
            .collect()
    }
}

impl<'a> Visitor<'a> for CteCollector<'a> {
    fn leave_common_table(&mut self, cte: &'a CommonTable, _scopes: &ScopeStack<'a>) {
        self.tables.push(cte);
    }
}

/// CTE-to-CTE references of one common table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CteDependency {
    pub name: String,
    /// CTEs referenced from this CTE's body, in first-reference order.
    pub depends_on: Vec<String>,
}

/// Lists which CTEs each CTE reads from, resolved through scope so a
/// reference to a shadowed physical table is not counted.
#[derive(Debug, Default)]
pub struct CteDependencyAnalyzer<'a> {
    /// CTEs whose body is being walked, with their slot in `result`.
    open: Vec<(&'a CommonTable, usize)>,
    result: Vec<CteDependency>,
}

impl<'a> CteDependencyAnalyzer<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Dependencies per CTE, innermost first (same order as [`CteCollector`]).
    pub fn analyze(&mut self, stmt: &'a Statement) -> Vec<CteDependency> {
        self.open.clear();
        self.result.clear();
        walk_statement(self, stmt);
        std::mem::take(&mut self.result)
    }

    /// CTE names in an order where every CTE follows the CTEs it reads.
    pub fn materialization_order(&mut self, stmt: &'a Statement) -> Vec<String> {
        let mut pending = self.analyze(stmt);
        let mut ordered: Vec<String> = Vec::with_capacity(pending.len());
        while !pending.is_empty() {
            let ready = pending.iter().position(|d| {
                d.depends_on
                    .iter()
                    .all(|dep| ordered.iter().any(|o| o.eq_ignore_ascii_case(dep)))
            });
            // Mutually recursive CTEs never become ready; keep source order.
            let next = pending.remove(ready.unwrap_or(0));
            ordered.push(next.name);
        }
        ordered
    }
}

impl<'a> Visitor<'a> for CteDependencyAnalyzer<'a> {
    fn visit_common_table(&mut self, cte: &'a CommonTable, _scopes: &ScopeStack<'a>) -> Walk {
        self.open.push((cte, self.result.len()));
        self.result.push(CteDependency {
            name: cte.name.clone(),
            depends_on: vec![],
        });
        Walk::Continue
    }

    fn leave_common_table(&mut self, _cte: &'a CommonTable, _scopes: &ScopeStack<'a>) {
        // Move this entry behind the entries of CTEs nested in its body.
        if let Some((_, idx)) = self.open.pop() {
            let entry = self.result.remove(idx);
            self.result.push(entry);
        }
    }

    fn visit_table_source(&mut self, source: &'a TableSource, scopes: &ScopeStack<'a>) -> Walk {
        let Some(&(current, idx)) = self.open.last() else {
            return Walk::Continue;
        };
        if let Relation::Cte(target) = scopes.resolve_relation(source) {
            let entry = &mut self.result[idx];
            if !std::ptr::eq(target, current) && !entry.depends_on.contains(&target.name) {
                entry.depends_on.push(target.name.clone());
            }
        }
        Walk::Continue
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::parser::parse;

    #[test]
    fn test_innermost_first() {
        let stmt = parse(
            "WITH outer_cte AS ( \
                WITH middle AS ( \
                    WITH inner_cte AS (SELECT 1 AS x) SELECT x FROM inner_cte \
                ) SELECT x FROM middle \
             ), sibling AS (SELECT 2 AS y) \
             SELECT * FROM outer_cte, sibling",
        )
        .unwrap();
        assert_eq!(
            CteCollector::names(&stmt),
            vec!["inner_cte", "middle", "outer_cte", "sibling"]
        );
    }

    #[test]
    fn test_collects_from_subqueries_and_union_branches() {
        let stmt = parse(
            "SELECT * FROM (WITH a AS (SELECT 1 AS v) SELECT v FROM a) s \
             UNION ALL \
             SELECT * FROM (WITH b AS (SELECT 2 AS v) SELECT v FROM b) t",
        )
        .unwrap();
        assert_eq!(CteCollector::names(&stmt), vec!["a", "b"]);
    }

    #[test]
    fn test_collector_resets_between_calls() {
        let first = parse("WITH a AS (SELECT 1) SELECT * FROM a").unwrap();
        let second = parse("SELECT 1").unwrap();
        let mut collector = CteCollector::new();
        assert_eq!(collector.collect(&first).len(), 1);
        assert!(collector.collect(&second).is_empty());
    }

    #[test]
    fn test_dependencies_resolve_through_scope() {
        let stmt = parse(
            "WITH a AS (SELECT 1 AS id), \
                  b AS (SELECT id FROM a JOIN users u ON u.id = a.id), \
                  c AS (SELECT id FROM b UNION SELECT id FROM a) \
             SELECT * FROM c",
        )
        .unwrap();
        let deps = CteDependencyAnalyzer::new().analyze(&stmt);
        assert_eq!(deps[0].name, "a");
        assert!(deps[0].depends_on.is_empty());
        assert_eq!(deps[1].depends_on, vec!["a"]);
        assert_eq!(deps[2].depends_on, vec!["b", "a"]);
    }

    #[test]
    fn test_recursive_self_reference_is_not_a_dependency() {
        let stmt = parse(
            "WITH RECURSIVE t(n) AS (SELECT 1 UNION ALL SELECT n + 1 FROM t WHERE n < 5) \
             SELECT * FROM t",
        )
        .unwrap();
        let deps = CteDependencyAnalyzer::new().analyze(&stmt);
        assert_eq!(deps.len(), 1);
        assert!(deps[0].depends_on.is_empty());
    }

    #[test]
    fn test_materialization_order() {
        let stmt = parse(
            "WITH b AS (SELECT 1 AS id), a AS (SELECT id FROM b) SELECT * FROM a",
        )
        .unwrap();
        assert_eq!(
            CteDependencyAnalyzer::new().materialization_order(&stmt),
            vec!["b", "a"]
        );
    }
}
