//! Declarative WHERE injection.
//!
//! A condition map names, per key, the values to filter on. Each key becomes
//! one predicate on the root query, bound through parameters named after the
//! key, and the predicates are ANDed onto the existing WHERE clause.
//!
//! ```text
//! { "user_id": { "column": "id", "=": 10 } }
//!   SELECT u.id, u.name FROM users u
//!   → SELECT u.id, u.name FROM users u WHERE u.id = :user_id
//! ```

use serde::Deserialize;
use serde_json::{Map, Value};

use crate::ast::types::*;
use crate::ast::value::SqlValue;
use crate::collect::{SelectableColumn, SelectableColumnCollector, TableColumnResolver};
use crate::error::{SqlError, SqlResult};

use super::normalizer::QueryNormalizer;

/// A single comparison inside a condition.
#[derive(Debug, Clone, PartialEq)]
pub enum Operator {
    Eq(SqlValue),
    NotEq(SqlValue),
    Lt(SqlValue),
    LtEq(SqlValue),
    Gt(SqlValue),
    GtEq(SqlValue),
    /// Inclusive lower bound.
    Min(SqlValue),
    /// Inclusive upper bound.
    Max(SqlValue),
    Like(SqlValue),
    ILike(SqlValue),
    In(Vec<SqlValue>),
}

impl Operator {
    fn parse(key: &str, op: &str, value: Value) -> SqlResult<Self> {
        let scalar = |value: Value| -> SqlResult<SqlValue> {
            match value {
                Value::Array(_) | Value::Object(_) => Err(SqlError::InvalidCondition {
                    key: key.to_string(),
                    reason: format!("operator '{}' takes a scalar", op),
                }),
                other => Ok(other.into()),
            }
        };
        Ok(match op {
            "=" | "eq" => Operator::Eq(scalar(value)?),
            "!=" | "<>" | "ne" => Operator::NotEq(scalar(value)?),
            "<" | "lt" => Operator::Lt(scalar(value)?),
            "<=" | "le" | "lte" => Operator::LtEq(scalar(value)?),
            ">" | "gt" => Operator::Gt(scalar(value)?),
            ">=" | "ge" | "gte" => Operator::GtEq(scalar(value)?),
            "min" => Operator::Min(scalar(value)?),
            "max" => Operator::Max(scalar(value)?),
            "like" => Operator::Like(scalar(value)?),
            "ilike" => Operator::ILike(scalar(value)?),
            "in" => match value {
                Value::Array(items) => Operator::In(items.into_iter().map(SqlValue::from).collect()),
                _ => {
                    return Err(SqlError::InvalidCondition {
                        key: key.to_string(),
                        reason: "operator 'in' takes an array".to_string(),
                    })
                }
            },
            other => {
                return Err(SqlError::InvalidCondition {
                    key: key.to_string(),
                    reason: format!("unknown operator '{}'", other),
                })
            }
        })
    }

    /// Position in the emitted predicate group.
    fn rank(&self) -> u8 {
        match self {
            Operator::Eq(_) => 0,
            Operator::NotEq(_) => 1,
            Operator::Min(_) => 2,
            Operator::Max(_) => 3,
            Operator::Gt(_) => 4,
            Operator::GtEq(_) => 5,
            Operator::Lt(_) => 6,
            Operator::LtEq(_) => 7,
            Operator::Like(_) => 8,
            Operator::ILike(_) => 9,
            Operator::In(_) => 10,
        }
    }

    /// Predicate on `target`, or `None` when every value is null.
    fn predicate(&self, key: &str, target: &ValueComponent) -> Option<ValueComponent> {
        if let Operator::In(values) = self {
            let list: Vec<ValueComponent> = values
                .iter()
                .enumerate()
                .filter(|(_, v)| !v.is_null())
                .map(|(i, v)| ValueComponent::param(format!("{}_in_{}", key, i + 1), v.clone()))
                .collect();
            if list.is_empty() {
                return None;
            }
            return Some(ValueComponent::InList {
                expr: Box::new(target.clone()),
                list,
                negated: false,
            });
        }
        let (suffix, op, value) = match self {
            Operator::Eq(v) => (None, BinaryOperator::Eq, v),
            Operator::NotEq(v) => (Some("ne"), BinaryOperator::NotEq, v),
            Operator::Lt(v) => (Some("lt"), BinaryOperator::Lt, v),
            Operator::LtEq(v) => (Some("le"), BinaryOperator::LtEq, v),
            Operator::Gt(v) => (Some("gt"), BinaryOperator::Gt, v),
            Operator::GtEq(v) => (Some("ge"), BinaryOperator::GtEq, v),
            Operator::Min(v) => (Some("min"), BinaryOperator::GtEq, v),
            Operator::Max(v) => (Some("max"), BinaryOperator::LtEq, v),
            Operator::Like(v) => (Some("like"), BinaryOperator::Like, v),
            Operator::ILike(v) => (Some("ilike"), BinaryOperator::ILike, v),
            Operator::In(_) => return None,
        };
        if value.is_null() {
            return None;
        }
        let name = match suffix {
            Some(s) => format!("{}_{}", key, s),
            None => key.to_string(),
        };
        Some(ValueComponent::binary(
            target.clone(),
            op,
            ValueComponent::param(name, value.clone()),
        ))
    }
}

/// What to filter one key on.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    /// Equality against the column named by the key.
    Value(SqlValue),
    /// One or more comparisons, optionally against an explicit column.
    Operators {
        column: Option<String>,
        operators: Vec<Operator>,
    },
}

impl Condition {
    pub fn from_json(key: &str, value: Value) -> SqlResult<Self> {
        match value {
            Value::Object(map) => {
                let mut column = None;
                let mut operators = Vec::new();
                for (op, value) in map {
                    if op == "column" {
                        match value {
                            Value::String(c) => column = Some(c),
                            _ => {
                                return Err(SqlError::InvalidCondition {
                                    key: key.to_string(),
                                    reason: "'column' must be a string".to_string(),
                                })
                            }
                        }
                    } else {
                        operators.push(Operator::parse(key, &op.to_ascii_lowercase(), value)?);
                    }
                }
                if operators.is_empty() {
                    return Err(SqlError::InvalidCondition {
                        key: key.to_string(),
                        reason: "no operator given".to_string(),
                    });
                }
                operators.sort_by_key(Operator::rank);
                Ok(Condition::Operators { column, operators })
            }
            Value::Array(items) => Ok(Condition::Operators {
                column: None,
                operators: vec![Operator::In(items.into_iter().map(SqlValue::from).collect())],
            }),
            scalar => Ok(Condition::Value(scalar.into())),
        }
    }

    fn column(&self) -> Option<&str> {
        match self {
            Condition::Value(_) => None,
            Condition::Operators { column, .. } => column.as_deref(),
        }
    }
}

/// Conditions keyed by parameter name, in insertion order. JSON input keeps
/// its document order.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(try_from = "Map<String, Value>")]
pub struct ConditionMap {
    entries: Vec<(String, Condition)>,
}

impl ConditionMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from a JSON object.
    pub fn from_json(value: Value) -> SqlResult<Self> {
        match value {
            Value::Object(map) => Self::try_from(map),
            _ => Err(SqlError::InvalidCondition {
                key: String::new(),
                reason: "conditions must be a JSON object".to_string(),
            }),
        }
    }

    /// Add or replace the condition for `key`.
    pub fn insert(&mut self, key: impl Into<String>, condition: Condition) {
        let key = key.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = condition,
            None => self.entries.push((key, condition)),
        }
    }

    /// Builder-style equality condition.
    pub fn eq(mut self, key: impl Into<String>, value: impl Into<SqlValue>) -> Self {
        self.insert(key, Condition::Value(value.into()));
        self
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Condition)> {
        self.entries.iter().map(|(k, c)| (k.as_str(), c))
    }
}

impl TryFrom<Map<String, Value>> for ConditionMap {
    type Error = SqlError;

    fn try_from(map: Map<String, Value>) -> Result<Self, Self::Error> {
        let mut conditions = ConditionMap::new();
        for (key, value) in map {
            let condition = Condition::from_json(&key, value)?;
            conditions.insert(key, condition);
        }
        Ok(conditions)
    }
}

/// Appends parameterized predicates to a query's WHERE clause.
///
/// Target columns are resolved against the root query: a `qualifier.column`
/// name first, then a select-item alias, then a unique selectable column.
/// Set operations and VALUES lists are normalized into a wrapping select
/// first so the predicates apply to the whole result.
pub struct SqlParamInjector<'r> {
    resolver: Option<&'r dyn TableColumnResolver>,
    allow_all_null: bool,
}

impl<'r> SqlParamInjector<'r> {
    pub fn new() -> Self {
        Self {
            resolver: None,
            allow_all_null: false,
        }
    }

    pub fn with_resolver(resolver: &'r dyn TableColumnResolver) -> Self {
        Self {
            resolver: Some(resolver),
            ..Self::new()
        }
    }

    /// Accept a map whose every value is null, returning the query unfiltered.
    pub fn allow_all_null(mut self, allow: bool) -> Self {
        self.allow_all_null = allow;
        self
    }

    pub fn inject(&self, stmt: Statement, conditions: &ConditionMap) -> SqlResult<Statement> {
        if conditions.is_empty() {
            return Ok(stmt);
        }
        let mut stmt = match stmt {
            Statement::Binary(_) | Statement::Values(_) => {
                Statement::Select(QueryNormalizer::new().normalize(stmt)?)
            }
            Statement::Select(_) => stmt,
            _ => {
                return Err(SqlError::UnsupportedStatement(
                    "parameters can only be injected into queries".to_string(),
                ))
            }
        };

        let selectable = match self.resolver {
            Some(r) => SelectableColumnCollector::with_resolver(r).collect(&stmt)?,
            None => SelectableColumnCollector::new().collect(&stmt)?,
        };
        let items: &[SelectItem] = match &stmt {
            Statement::Select(s) => &s.items,
            _ => &[],
        };

        let mut predicates = Vec::new();
        for (key, condition) in conditions.iter() {
            let target_name = condition.column().unwrap_or(key);
            let group: Vec<ValueComponent> = match condition {
                Condition::Value(v) if v.is_null() => vec![],
                Condition::Value(v) => {
                    let target = resolve_target(items, &selectable, target_name)?;
                    vec![ValueComponent::binary(
                        target,
                        BinaryOperator::Eq,
                        ValueComponent::param(key, v.clone()),
                    )]
                }
                Condition::Operators { operators, .. } => {
                    let target = resolve_target(items, &selectable, target_name)?;
                    operators
                        .iter()
                        .filter_map(|op| op.predicate(key, &target))
                        .collect()
                }
            };
            if group.is_empty() {
                tracing::debug!(key, "skipped null condition");
                continue;
            }
            let count = group.len();
            if let Some(combined) = ValueComponent::and_all(group) {
                predicates.push(if count > 1 {
                    ValueComponent::Nested(Box::new(combined))
                } else {
                    combined
                });
            }
        }

        if predicates.is_empty() && !self.allow_all_null {
            let key = conditions.iter().next().map(|(k, _)| k).unwrap_or_default();
            return Err(SqlError::InvalidCondition {
                key: key.to_string(),
                reason: "every condition value is null".to_string(),
            });
        }

        tracing::debug!(predicates = predicates.len(), "injected WHERE conditions");
        if let Some(select) = stmt.leftmost_select_mut() {
            for predicate in predicates {
                select.append_where(predicate);
            }
        }
        Ok(stmt)
    }
}

impl Default for SqlParamInjector<'_> {
    fn default() -> Self {
        Self::new()
    }
}

fn resolve_target(
    items: &[SelectItem],
    selectable: &[SelectableColumn],
    name: &str,
) -> SqlResult<ValueComponent> {
    if let Some((qualifier, column)) = name.split_once('.') {
        return selectable
            .iter()
            .find(|c| {
                c.qualifier.eq_ignore_ascii_case(qualifier) && c.name.eq_ignore_ascii_case(column)
            })
            .map(SelectableColumn::to_value)
            .ok_or_else(|| SqlError::column(name, "no visible source exposes this column"));
    }

    if let Some(item) = items.iter().find(|i| {
        i.alias
            .as_deref()
            .is_some_and(|a| a.eq_ignore_ascii_case(name))
    }) {
        return Ok(match &item.value {
            atom @ (ValueComponent::Column { .. }
            | ValueComponent::Literal(_)
            | ValueComponent::Parameter { .. }
            | ValueComponent::Function { .. }
            | ValueComponent::Nested(_)) => atom.clone(),
            expr => ValueComponent::Nested(Box::new(expr.clone())),
        });
    }

    let matches: Vec<&SelectableColumn> = selectable
        .iter()
        .filter(|c| c.name.eq_ignore_ascii_case(name))
        .collect();
    match matches.as_slice() {
        [single] => Ok(single.to_value()),
        [] => Err(SqlError::column(
            name,
            "no visible source exposes this column",
        )),
        many => Err(SqlError::column(
            name,
            format!(
                "ambiguous between {}",
                many.iter()
                    .map(|c| format!("{}.{}", c.qualifier, c.name))
                    .collect::<Vec<_>>()
                    .join(", ")
            ),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::parser::parse;
    use crate::format::{FormatOptions, SqlFormatter};
    use serde_json::json;
    use std::collections::HashMap;

    fn render(stmt: &Statement) -> String {
        SqlFormatter::new(FormatOptions {
            quote_identifiers: false,
            ..Default::default()
        })
        .format(stmt)
        .unwrap()
        .sql
    }

    fn inject(sql: &str, conditions: Value) -> SqlResult<Statement> {
        SqlParamInjector::new().inject(
            parse(sql).unwrap(),
            &ConditionMap::from_json(conditions).unwrap(),
        )
    }

    #[test]
    fn test_explicit_column_mapping() {
        let stmt = inject(
            "SELECT u.id, u.name FROM users u",
            json!({ "user_id": { "column": "id", "=": 10 } }),
        )
        .unwrap();
        assert_eq!(
            render(&stmt),
            "SELECT u.id, u.name FROM users AS u WHERE u.id = :user_id"
        );
    }

    #[test]
    fn test_implicit_equality_and_existing_where() {
        let stmt = inject(
            "SELECT u.id, u.status FROM users u WHERE u.active OR u.admin",
            json!({ "status": "open" }),
        )
        .unwrap();
        assert_eq!(
            render(&stmt),
            "SELECT u.id, u.status FROM users AS u \
             WHERE (u.active OR u.admin) AND u.status = :status"
        );
    }

    #[test]
    fn test_range_is_a_parenthesized_group() {
        let stmt = inject(
            "SELECT o.id, o.total FROM orders o",
            json!({ "total": { "min": 10, "max": 100 } }),
        )
        .unwrap();
        assert_eq!(
            render(&stmt),
            "SELECT o.id, o.total FROM orders AS o \
             WHERE (o.total >= :total_min AND o.total <= :total_max)"
        );
    }

    #[test]
    fn test_like_and_in_lists() {
        let stmt = inject(
            "SELECT p.name, p.kind FROM products p",
            json!({ "name": { "like": "%box%" }, "kind": [1, null, 3] }),
        )
        .unwrap();
        let sql = render(&stmt);
        assert!(sql.contains("p.name LIKE :name_like"), "{}", sql);
        assert!(sql.contains("p.kind IN (:kind_in_1, :kind_in_3)"), "{}", sql);
    }

    #[test]
    fn test_null_values_are_skipped() {
        let stmt = inject(
            "SELECT u.id, u.name FROM users u",
            json!({ "id": 1, "name": null }),
        )
        .unwrap();
        assert_eq!(
            render(&stmt),
            "SELECT u.id, u.name FROM users AS u WHERE u.id = :id"
        );
    }

    #[test]
    fn test_all_null_map() {
        let err = inject("SELECT u.id FROM users u", json!({ "id": null })).unwrap_err();
        assert!(matches!(err, SqlError::InvalidCondition { .. }));

        let stmt = SqlParamInjector::new()
            .allow_all_null(true)
            .inject(
                parse("SELECT u.id FROM users u").unwrap(),
                &ConditionMap::new().eq("id", SqlValue::Null),
            )
            .unwrap();
        assert_eq!(render(&stmt), "SELECT u.id FROM users AS u");
    }

    #[test]
    fn test_select_alias_resolves_to_its_expression() {
        let stmt = inject(
            "SELECT u.name AS full_name FROM users u",
            json!({ "full_name": "Ann" }),
        )
        .unwrap();
        assert_eq!(
            render(&stmt),
            "SELECT u.name AS full_name FROM users AS u WHERE u.name = :full_name"
        );
    }

    #[test]
    fn test_expression_alias_is_grouped() {
        let stmt = inject(
            "SELECT u.a OR u.b AS flag FROM users u",
            json!({ "flag": true }),
        )
        .unwrap();
        assert_eq!(
            render(&stmt),
            "SELECT u.a OR u.b AS flag FROM users AS u WHERE (u.a OR u.b) = :flag"
        );

        let stmt = inject(
            "SELECT o.total > 100 AS large FROM orders o",
            json!({ "large": false }),
        )
        .unwrap();
        assert_eq!(
            render(&stmt),
            "SELECT o.total > 100 AS large FROM orders AS o WHERE (o.total > 100) = :large"
        );

        let stmt = inject(
            "SELECT lower(u.name) AS name FROM users u",
            json!({ "name": "ann" }),
        )
        .unwrap();
        assert_eq!(
            render(&stmt),
            "SELECT lower(u.name) AS name FROM users AS u WHERE lower(u.name) = :name"
        );
    }

    #[test]
    fn test_ambiguous_and_unknown_columns() {
        let err = inject(
            "SELECT u.id, o.id FROM users u JOIN orders o ON o.user_id = u.id",
            json!({ "id": 1 }),
        )
        .unwrap_err();
        assert!(matches!(err, SqlError::ColumnResolution { .. }));

        let ok = inject(
            "SELECT u.id, o.id FROM users u JOIN orders o ON o.user_id = u.id",
            json!({ "order": { "column": "o.id", "=": 1 } }),
        )
        .unwrap();
        assert!(render(&ok).ends_with("WHERE o.id = :order"));

        let err = inject("SELECT u.id FROM users u", json!({ "missing": 1 })).unwrap_err();
        assert!(matches!(err, SqlError::ColumnResolution { .. }));
    }

    #[test]
    fn test_resolver_columns_are_injectable() {
        let mut map = HashMap::new();
        map.insert(
            "users".to_string(),
            vec!["id".to_string(), "email".to_string()],
        );
        let stmt = SqlParamInjector::with_resolver(&map)
            .inject(
                parse("SELECT u.id FROM users u").unwrap(),
                &ConditionMap::new().eq("email", "a@b.c"),
            )
            .unwrap();
        assert!(render(&stmt).ends_with("WHERE u.email = :email"));
    }

    #[test]
    fn test_union_is_normalized_first() {
        let stmt = inject(
            "SELECT id FROM a UNION SELECT id FROM b",
            json!({ "id": { ">": 5 } }),
        )
        .unwrap();
        assert_eq!(
            render(&stmt),
            "SELECT * FROM (SELECT id FROM a UNION SELECT id FROM b) AS bq WHERE bq.id > :id_gt"
        );
    }

    #[test]
    fn test_conditions_follow_document_order() {
        let conditions: ConditionMap =
            serde_json::from_str(r#"{ "zeta": 1, "alpha": 2 }"#).unwrap();
        assert_eq!(
            conditions.iter().map(|(k, _)| k).collect::<Vec<_>>(),
            vec!["zeta", "alpha"]
        );
        let stmt = SqlParamInjector::new()
            .inject(parse("SELECT t.zeta, t.alpha FROM t").unwrap(), &conditions)
            .unwrap();
        assert_eq!(
            render(&stmt),
            "SELECT t.zeta, t.alpha FROM t WHERE t.zeta = :zeta AND t.alpha = :alpha"
        );
    }

    #[test]
    fn test_invalid_operator() {
        let err = ConditionMap::from_json(json!({ "id": { "between": [1, 2] } })).unwrap_err();
        assert!(matches!(err, SqlError::InvalidCondition { .. }));
    }
}
