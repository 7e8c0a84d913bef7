//! Locating the selects that produce a set of columns.

use crate::ast::types::{CommonTable, InsertSource, SimpleSelect, Statement, TableSource, ValueComponent};

use super::resolver::TableColumnResolver;
use super::select_value::OutputColumns;

const MAX_DEPTH: usize = 64;

/// Finds the leaf selects that define every requested column, following
/// CTE references, derived tables and set-operation branches.
///
/// A table name resolves to the nearest visible CTE before it is treated as
/// a physical table. Branches of a set operation that miss a column are left
/// out. `VALUES` leaves are never returned. A select whose output includes a
/// wildcard that cannot be expanded is assumed to define the column.
#[derive(Default)]
pub struct UpstreamSelectQueryFinder<'r> {
    resolver: Option<&'r dyn TableColumnResolver>,
}

impl<'r> UpstreamSelectQueryFinder<'r> {
    pub fn new() -> Self {
        Self { resolver: None }
    }

    pub fn with_resolver(resolver: &'r dyn TableColumnResolver) -> Self {
        Self {
            resolver: Some(resolver),
        }
    }

    pub fn find<'a>(&self, stmt: &'a Statement, columns: &[&str]) -> Vec<&'a SimpleSelect> {
        let mut found = Vec::new();
        self.statement(stmt, columns, &mut Vec::new(), 0, &mut found);
        let mut unique: Vec<&'a SimpleSelect> = Vec::with_capacity(found.len());
        for select in found {
            if !unique.iter().any(|u| std::ptr::eq(*u, select)) {
                unique.push(select);
            }
        }
        unique
    }

    fn statement<'a>(
        &self,
        stmt: &'a Statement,
        columns: &[&str],
        env: &mut Vec<&'a CommonTable>,
        depth: usize,
        found: &mut Vec<&'a SimpleSelect>,
    ) {
        if depth > MAX_DEPTH {
            return;
        }
        match stmt {
            Statement::Select(s) => self.select(s, columns, env, depth, found),
            Statement::Binary(b) => {
                // Operand WITH clauses are hoisted over the whole operation.
                let mark = env.len();
                for side in [&b.left, &b.right] {
                    if let Some(with) = leading_with(side) {
                        env.extend(with.iter());
                    }
                }
                self.statement(&b.left, columns, env, depth + 1, found);
                self.statement(&b.right, columns, env, depth + 1, found);
                env.truncate(mark);
            }
            Statement::Values(_) => {}
            Statement::Insert(i) => {
                if let InsertSource::Query(q) = &i.source {
                    self.statement(q, columns, env, depth + 1, found);
                }
            }
            Statement::CreateTable(c) => {
                if let Some(q) = &c.as_query {
                    self.statement(q, columns, env, depth + 1, found);
                }
            }
            Statement::Update(_) | Statement::Delete(_) => {}
        }
    }

    fn select<'a>(
        &self,
        s: &'a SimpleSelect,
        columns: &[&str],
        env: &mut Vec<&'a CommonTable>,
        depth: usize,
        found: &mut Vec<&'a SimpleSelect>,
    ) {
        let mark = env.len();
        if let Some(with) = &s.with {
            env.extend(with.tables.iter());
        }

        let before = found.len();
        for source in s.sources() {
            match source {
                TableSource::Table {
                    schema: None, name, ..
                } => {
                    let Some(pos) = env.iter().rposition(|c| c.name.eq_ignore_ascii_case(name))
                    else {
                        continue;
                    };
                    let cte = env[pos];
                    // The body sees what was declared before it, never itself.
                    let mut inner: Vec<&'a CommonTable> = env[..pos].to_vec();
                    self.statement(&cte.body, columns, &mut inner, depth + 1, found);
                }
                TableSource::Subquery { query, .. } => {
                    self.statement(query, columns, env, depth + 1, found);
                }
                TableSource::Table { .. } | TableSource::Function { .. } => {}
            }
        }

        if found.len() == before && self.defines_all(s, columns, env) {
            found.push(s);
        }
        env.truncate(mark);
    }

    fn defines_all<'a>(&self, s: &'a SimpleSelect, columns: &[&str], env: &[&'a CommonTable]) -> bool {
        let has_wildcard = s
            .items
            .iter()
            .any(|i| matches!(i.value, ValueComponent::Wildcard { .. }));
        let outputs = OutputColumns::new(self.resolver, None).of_select(s, env);
        match outputs {
            Ok(names) => columns
                .iter()
                .all(|c| names.iter().any(|n| n.eq_ignore_ascii_case(c))),
            Err(_) => has_wildcard,
        }
    }
}

/// CTEs of the WITH clause attached to a set-operation operand.
fn leading_with(stmt: &Statement) -> Option<&[CommonTable]> {
    match stmt {
        Statement::Select(s) => s.with.as_ref().map(|w| w.tables.as_slice()),
        Statement::Binary(b) => leading_with(&b.left),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::parser::parse;

    fn first_item(select: &SimpleSelect) -> String {
        match &select.items[0].value {
            ValueComponent::Column { qualifier, name } => match qualifier {
                Some(q) => format!("{}.{}", q, name),
                None => name.clone(),
            },
            other => format!("{:?}", other),
        }
    }

    #[test]
    fn test_root_select_is_its_own_upstream() {
        let stmt = parse("SELECT u.id, u.name FROM users u").unwrap();
        let found = UpstreamSelectQueryFinder::new().find(&stmt, &["id", "name"]);
        assert_eq!(found.len(), 1);
        assert_eq!(first_item(found[0]), "u.id");
    }

    #[test]
    fn test_follows_cte_and_subquery_to_leaf() {
        let stmt = parse(
            "WITH base AS (SELECT id, name FROM users) \
             SELECT s.id FROM (SELECT b.id, b.name FROM base b) AS s",
        )
        .unwrap();
        let found = UpstreamSelectQueryFinder::new().find(&stmt, &["name"]);
        assert_eq!(found.len(), 1);
        assert_eq!(first_item(found[0]), "id");
    }

    #[test]
    fn test_cte_beats_physical_table_of_same_name() {
        let stmt = parse(
            "WITH users AS (SELECT 1 AS id, 'x' AS nickname) SELECT id FROM users",
        )
        .unwrap();
        let found = UpstreamSelectQueryFinder::new().find(&stmt, &["nickname"]);
        assert_eq!(found.len(), 1);
        assert!(found[0].from.is_empty());
    }

    #[test]
    fn test_nearest_cte_wins() {
        let stmt = parse(
            "WITH t AS (SELECT 1 AS outer_col) \
             SELECT * FROM (WITH t AS (SELECT 2 AS inner_col) SELECT inner_col FROM t) AS x",
        )
        .unwrap();
        let finder = UpstreamSelectQueryFinder::new();
        assert_eq!(finder.find(&stmt, &["inner_col"]).len(), 1);
        assert!(finder.find(&stmt, &["outer_col"]).is_empty());
    }

    #[test]
    fn test_union_branches_missing_columns_are_excluded() {
        let stmt = parse(
            "SELECT id, email FROM users \
             UNION ALL \
             SELECT id, NULL AS other FROM admins \
             UNION ALL \
             SELECT id, contact AS email FROM vendors",
        )
        .unwrap();
        let found = UpstreamSelectQueryFinder::new().find(&stmt, &["id", "email"]);
        assert_eq!(found.len(), 2);
    }

    #[test]
    fn test_values_leaf_is_skipped() {
        let stmt = parse("SELECT * FROM (VALUES (1, 2)) AS v(a, b)").unwrap();
        let found = UpstreamSelectQueryFinder::new().find(&stmt, &["a"]);
        // The VALUES body is never returned; the wrapping select is.
        assert_eq!(found.len(), 1);
        assert!(matches!(found[0].items[0].value, ValueComponent::Wildcard { .. }));
    }

    #[test]
    fn test_unresolved_wildcard_is_permissive() {
        let stmt = parse("SELECT * FROM users").unwrap();
        let found = UpstreamSelectQueryFinder::new().find(&stmt, &["anything"]);
        assert_eq!(found.len(), 1);
    }
}
