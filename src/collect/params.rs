//! Parameter placeholders of a statement.

use crate::ast::scope::ScopeStack;
use crate::ast::types::{Statement, ValueComponent};
use crate::ast::value::SqlValue;
use crate::ast::visitor::{walk_statement, Visitor, Walk};

/// One placeholder occurrence.
#[derive(Debug, Clone, PartialEq)]
pub struct ParameterReference {
    pub name: String,
    pub value: Option<SqlValue>,
}

/// Lists placeholders in the order they are rendered: hoisted WITH clauses
/// first, then the main query. Every occurrence is reported.
#[derive(Debug, Default)]
pub struct ParameterCollector {
    found: Vec<ParameterReference>,
}

impl ParameterCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn collect(&mut self, stmt: &Statement) -> Vec<ParameterReference> {
        self.found.clear();
        walk_statement(self, stmt);
        std::mem::take(&mut self.found)
    }

    /// Distinct parameter names in first-appearance order.
    pub fn names(stmt: &Statement) -> Vec<String> {
        let mut names: Vec<String> = Vec::new();
        for p in ParameterCollector::new().collect(stmt) {
            if !names.contains(&p.name) {
                names.push(p.name);
            }
        }
        names
    }
}

impl<'a> Visitor<'a> for ParameterCollector {
    fn visit_value(&mut self, value: &'a ValueComponent, _scopes: &ScopeStack<'a>) -> Walk {
        if let ValueComponent::Parameter { name, value } = value {
            self.found.push(ParameterReference {
                name: name.clone(),
                value: value.clone(),
            });
        }
        Walk::Continue
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::parser::{parse, ParserDialect, SqlParser, StatementParser};

    #[test]
    fn test_cte_parameters_come_first() {
        let stmt = parse(
            "WITH recent AS (SELECT * FROM orders WHERE created_at > :since) \
             SELECT * FROM recent r WHERE r.user_id = :user_id AND r.total > :since",
        )
        .unwrap();
        assert_eq!(ParameterCollector::names(&stmt), vec!["since", "user_id"]);
        assert_eq!(ParameterCollector::new().collect(&stmt).len(), 3);
    }

    #[test]
    fn test_bound_values_are_reported() {
        let mut stmt = parse("SELECT * FROM users WHERE id = :id").unwrap();
        assert_eq!(stmt.set_parameter("id", 7), 1);
        let params = ParameterCollector::new().collect(&stmt);
        assert_eq!(params[0].value, Some(SqlValue::Integer(7)));
    }

    #[test]
    fn test_anonymous_placeholders_are_numbered() {
        let stmt = SqlParser::new(ParserDialect::MySql)
            .parse("SELECT * FROM t WHERE a = ? AND b IN (SELECT c FROM u WHERE d = ?)")
            .unwrap();
        assert_eq!(ParameterCollector::names(&stmt), vec!["p1", "p2"]);
    }
}
