//! Statement tree types for sqlscope.
//!
//! This module defines the representation every collector walks and every
//! rewrite produces. The tree is:
//! - Exhaustive (one enum per node category, matched everywhere)
//! - Owned (subtrees are boxed, never shared)
//! - Mutable only through builder methods taking `&mut self` or `self`

use crate::error::{SqlError, SqlResult};

use super::value::SqlValue;

/// Top-level statement.
#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    Select(Box<SimpleSelect>),
    /// Set operation (UNION, INTERSECT, EXCEPT) over two statements.
    Binary(Box<BinarySelect>),
    /// Standalone `VALUES (...), (...)`.
    Values(ValuesQuery),
    Insert(Box<InsertStatement>),
    CreateTable(Box<CreateTableStatement>),
    Update(Box<UpdateStatement>),
    Delete(Box<DeleteStatement>),
}

/// A single SELECT with all standard SQL clauses.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SimpleSelect {
    pub with: Option<WithClause>,
    pub distinct: bool,
    pub items: Vec<SelectItem>,
    pub from: Vec<TableSource>,
    pub joins: Vec<Join>,
    pub filter: Option<ValueComponent>,
    pub group_by: Vec<ValueComponent>,
    pub having: Option<ValueComponent>,
    pub order_by: Vec<OrderByItem>,
    pub limit: Option<ValueComponent>,
    pub offset: Option<ValueComponent>,
}

/// `left <op> right`, with ordering and limits applying to the whole result.
#[derive(Debug, Clone, PartialEq)]
pub struct BinarySelect {
    pub left: Statement,
    pub op: SetOperator,
    pub all: bool,
    pub right: Statement,
    pub order_by: Vec<OrderByItem>,
    pub limit: Option<ValueComponent>,
    pub offset: Option<ValueComponent>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetOperator {
    Union,
    Intersect,
    Except,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ValuesQuery {
    pub rows: Vec<Vec<ValueComponent>>,
    /// Optional column names; empty means positional `column1..n`.
    pub column_aliases: Vec<String>,
}

/// `WITH [RECURSIVE] a AS (...), b AS (...)`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct WithClause {
    pub recursive: bool,
    pub tables: Vec<CommonTable>,
}

/// One named entry of a WITH clause.
#[derive(Debug, Clone, PartialEq)]
pub struct CommonTable {
    pub name: String,
    pub columns: Vec<String>,
    pub body: Statement,
}

/// A single item in the SELECT list: `value [AS alias]`.
#[derive(Debug, Clone, PartialEq)]
pub struct SelectItem {
    pub value: ValueComponent,
    pub alias: Option<String>,
}

/// Relation in a FROM clause or JOIN.
#[derive(Debug, Clone, PartialEq)]
pub enum TableSource {
    /// Physical table or CTE reference; which one is decided by scope.
    Table {
        schema: Option<String>,
        name: String,
        alias: Option<String>,
    },
    /// `(SELECT ...) AS alias(col, ...)`
    Subquery {
        query: Box<Statement>,
        alias: String,
        columns: Vec<String>,
        lateral: bool,
    },
    /// Table-valued function: `generate_series(1, 10) AS alias`
    Function {
        name: String,
        args: Vec<ValueComponent>,
        alias: Option<String>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Join {
    pub join_type: JoinType,
    pub source: TableSource,
    pub condition: Option<JoinCondition>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinType {
    Inner,
    Left,
    Right,
    Full,
    Cross,
}

#[derive(Debug, Clone, PartialEq)]
pub enum JoinCondition {
    On(ValueComponent),
    Using(Vec<String>),
    Natural,
}

/// Value expression. Recursive to support arbitrary nesting.
#[derive(Debug, Clone, PartialEq)]
pub enum ValueComponent {
    /// `qualifier.name` or `name`.
    Column {
        qualifier: Option<String>,
        name: String,
    },
    Literal(Literal),
    /// Named placeholder, optionally carrying its bound value.
    Parameter {
        name: String,
        value: Option<SqlValue>,
    },
    Function {
        name: String,
        args: Vec<ValueComponent>,
        distinct: bool,
        filter: Option<Box<ValueComponent>>,
        over: Option<Box<WindowSpec>>,
    },
    Binary {
        left: Box<ValueComponent>,
        op: BinaryOperator,
        right: Box<ValueComponent>,
    },
    Unary {
        op: UnaryOperator,
        operand: Box<ValueComponent>,
    },
    /// `(a, b, c)` row constructor.
    Tuple(Vec<ValueComponent>),
    /// `expr [NOT] IN (v1, v2, ...)`
    InList {
        expr: Box<ValueComponent>,
        list: Vec<ValueComponent>,
        negated: bool,
    },
    /// `*` or `qualifier.*`
    Wildcard { qualifier: Option<String> },
    Case {
        operand: Option<Box<ValueComponent>>,
        branches: Vec<(ValueComponent, ValueComponent)>,
        else_value: Option<Box<ValueComponent>>,
    },
    Subquery(Box<Statement>),
    Exists(Box<Statement>),
    InSubquery {
        expr: Box<ValueComponent>,
        query: Box<Statement>,
        negated: bool,
    },
    Between {
        expr: Box<ValueComponent>,
        low: Box<ValueComponent>,
        high: Box<ValueComponent>,
        negated: bool,
    },
    IsNull {
        expr: Box<ValueComponent>,
        negated: bool,
    },
    /// `CAST(expr AS type)`, or `expr::type` when `shorthand`.
    Cast {
        expr: Box<ValueComponent>,
        data_type: String,
        shorthand: bool,
    },
    /// `ARRAY[...]`
    Array(Vec<ValueComponent>),
    /// Parenthesized expression.
    Nested(Box<ValueComponent>),
    /// Verbatim SQL for constructs not modelled above.
    Raw(String),
}

/// Literal values in SQL.
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Null,
    Boolean(bool),
    /// Numeric text kept as written (`100.00` stays `100.00`).
    Number(String),
    String(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOperator {
    // Comparison
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    // Logical
    And,
    Or,
    // Arithmetic
    Plus,
    Minus,
    Multiply,
    Divide,
    Modulo,
    // String
    Like,
    ILike,
    NotLike,
    NotILike,
    Concat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOperator {
    Not,
    Minus,
    Plus,
}

/// `OVER (...)` specification, or a reference to a named window.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct WindowSpec {
    pub name: Option<String>,
    pub partition_by: Vec<ValueComponent>,
    pub order_by: Vec<OrderByItem>,
    pub frame: Option<WindowFrame>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WindowFrame {
    pub mode: WindowFrameMode,
    pub start: WindowFrameBound,
    pub end: Option<WindowFrameBound>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowFrameMode {
    Rows,
    Range,
    Groups,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowFrameBound {
    CurrentRow,
    Preceding(Option<u64>),
    Following(Option<u64>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderByItem {
    pub value: ValueComponent,
    pub asc: Option<bool>,
    pub nulls_first: Option<bool>,
}

/// `schema.name` target of DDL/DML.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QualifiedName {
    pub schema: Option<String>,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct InsertStatement {
    pub table: QualifiedName,
    pub columns: Vec<String>,
    pub source: InsertSource,
    pub returning: Vec<SelectItem>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum InsertSource {
    Values(Vec<Vec<ValueComponent>>),
    Query(Box<Statement>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct CreateTableStatement {
    pub name: QualifiedName,
    pub temporary: bool,
    pub if_not_exists: bool,
    pub columns: Vec<ColumnDefinition>,
    pub as_query: Option<Box<Statement>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ColumnDefinition {
    pub name: String,
    pub data_type: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UpdateStatement {
    pub with: Option<WithClause>,
    pub target: TableSource,
    pub assignments: Vec<Assignment>,
    pub from: Vec<TableSource>,
    pub filter: Option<ValueComponent>,
    pub returning: Vec<SelectItem>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Assignment {
    pub column: String,
    pub value: ValueComponent,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DeleteStatement {
    pub with: Option<WithClause>,
    pub target: TableSource,
    pub using: Vec<TableSource>,
    pub filter: Option<ValueComponent>,
    pub returning: Vec<SelectItem>,
}

impl Statement {
    /// Leftmost `SimpleSelect` of a set-operation chain, or the statement
    /// itself when it is a plain select.
    pub fn leftmost_select_mut(&mut self) -> Option<&mut SimpleSelect> {
        match self {
            Statement::Select(s) => Some(s),
            Statement::Binary(b) => b.left.leftmost_select_mut(),
            _ => None,
        }
    }

    /// Bind `value` to every parameter named `name`. Returns how many
    /// placeholders were updated.
    pub fn set_parameter(&mut self, name: &str, value: impl Into<SqlValue>) -> usize {
        let value = value.into();
        let mut count = 0;
        super::visitor::walk_values_mut(self, &mut |v| {
            if let ValueComponent::Parameter { name: n, value: slot } = v {
                if n == name {
                    *slot = Some(value.clone());
                    count += 1;
                }
            }
        });
        count
    }

    /// The WITH clause that owns CTEs visible to this statement's body.
    pub fn with_clause_mut(&mut self) -> Option<&mut Option<WithClause>> {
        match self {
            Statement::Select(s) => Some(&mut s.with),
            Statement::Binary(b) => b.left.with_clause_mut(),
            Statement::Update(u) => Some(&mut u.with),
            Statement::Delete(d) => Some(&mut d.with),
            Statement::Insert(i) => match &mut i.source {
                InsertSource::Query(q) => q.with_clause_mut(),
                InsertSource::Values(_) => None,
            },
            Statement::CreateTable(c) => c.as_query.as_mut().and_then(|q| q.with_clause_mut()),
            Statement::Values(_) => None,
        }
    }
}

impl SimpleSelect {
    /// Append a predicate to WHERE, combined with AND. OR-trees on either
    /// side are parenthesized so precedence is preserved.
    pub fn append_where(&mut self, condition: ValueComponent) {
        self.filter = Some(match self.filter.take() {
            Some(existing) => ValueComponent::and(existing.nest_if_or(), condition.nest_if_or()),
            None => condition,
        });
    }

    /// Add a CTE after the existing ones.
    pub fn append_cte(&mut self, cte: CommonTable) -> SqlResult<()> {
        self.with.get_or_insert_with(WithClause::default).push(cte)
    }

    /// Insert CTEs ahead of the existing ones, preserving their order.
    pub fn prepend_ctes(&mut self, ctes: Vec<CommonTable>) -> SqlResult<()> {
        self.with.get_or_insert_with(WithClause::default).prepend(ctes)
    }

    /// Replace the expression of the select item exposed as `name`.
    pub fn override_select_item<F>(&mut self, name: &str, rewrite: F) -> SqlResult<()>
    where
        F: FnOnce(ValueComponent) -> ValueComponent,
    {
        let item = self
            .items
            .iter_mut()
            .find(|item| item.output_name() == Some(name))
            .ok_or_else(|| SqlError::column(name, "no select item exposes this name"))?;
        let previous = std::mem::replace(&mut item.value, ValueComponent::Literal(Literal::Null));
        item.value = rewrite(previous);
        if item.alias.is_none() && item.output_name() != Some(name) {
            item.alias = Some(name.to_string());
        }
        Ok(())
    }

    /// Every source of this query's FROM clause, joins included, in order.
    pub fn sources(&self) -> impl Iterator<Item = &TableSource> {
        self.from.iter().chain(self.joins.iter().map(|j| &j.source))
    }
}

impl WithClause {
    pub fn new(tables: Vec<CommonTable>) -> SqlResult<Self> {
        let mut clause = WithClause::default();
        for table in tables {
            clause.push(table)?;
        }
        Ok(clause)
    }

    pub fn get(&self, name: &str) -> Option<&CommonTable> {
        self.tables.iter().find(|t| t.name.eq_ignore_ascii_case(name))
    }

    pub fn push(&mut self, table: CommonTable) -> SqlResult<()> {
        if self.get(&table.name).is_some() {
            return Err(SqlError::DuplicateCte(table.name));
        }
        self.tables.push(table);
        Ok(())
    }

    pub fn prepend(&mut self, tables: Vec<CommonTable>) -> SqlResult<()> {
        let mut combined = WithClause {
            recursive: self.recursive,
            tables: Vec::with_capacity(tables.len() + self.tables.len()),
        };
        for table in tables.into_iter().chain(self.tables.iter().cloned()) {
            combined.push(table)?;
        }
        *self = combined;
        Ok(())
    }
}

impl SelectItem {
    pub fn new(value: ValueComponent) -> Self {
        Self { value, alias: None }
    }

    pub fn aliased(value: ValueComponent, alias: impl Into<String>) -> Self {
        Self {
            value,
            alias: Some(alias.into()),
        }
    }

    /// Name this item is visible under outside the query: the alias, or the
    /// column name for a bare column reference.
    pub fn output_name(&self) -> Option<&str> {
        match (&self.alias, &self.value) {
            (Some(a), _) => Some(a.as_str()),
            (None, ValueComponent::Column { name, .. }) => Some(name.as_str()),
            _ => None,
        }
    }
}

impl TableSource {
    pub fn table(name: impl Into<String>) -> Self {
        TableSource::Table {
            schema: None,
            name: name.into(),
            alias: None,
        }
    }

    pub fn subquery(query: Statement, alias: impl Into<String>) -> Self {
        TableSource::Subquery {
            query: Box::new(query),
            alias: alias.into(),
            columns: vec![],
            lateral: false,
        }
    }

    /// Explicit alias, if any.
    pub fn alias(&self) -> Option<&str> {
        match self {
            TableSource::Table { alias, .. } | TableSource::Function { alias, .. } => {
                alias.as_deref()
            }
            TableSource::Subquery { alias, .. } => Some(alias.as_str()),
        }
    }

    /// Name used to qualify columns of this source.
    pub fn reference_name(&self) -> &str {
        match self {
            TableSource::Table { name, alias, .. } => alias.as_deref().unwrap_or(name),
            TableSource::Subquery { alias, .. } => alias,
            TableSource::Function { name, alias, .. } => alias.as_deref().unwrap_or(name),
        }
    }
}

impl QualifiedName {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            schema: None,
            name: name.into(),
        }
    }

    /// Split `schema.table` into its parts.
    pub fn parse(qualified: &str) -> Self {
        match qualified.rsplit_once('.') {
            Some((schema, name)) => Self {
                schema: Some(schema.to_string()),
                name: name.to_string(),
            },
            None => Self::new(qualified),
        }
    }
}

impl InsertStatement {
    /// Build an INSERT from either literal rows or a source query.
    pub fn try_new(
        table: QualifiedName,
        columns: Vec<String>,
        rows: Vec<Vec<ValueComponent>>,
        query: Option<Statement>,
    ) -> SqlResult<Self> {
        let source = match (query, rows.is_empty()) {
            (Some(q), true) => InsertSource::Query(Box::new(q)),
            (None, false) => InsertSource::Values(rows),
            (Some(_), false) => {
                return Err(SqlError::MissingOperand(format!(
                    "INSERT INTO {} takes rows or a query, not both",
                    table.name
                )))
            }
            (None, true) => {
                return Err(SqlError::MissingOperand(format!(
                    "INSERT INTO {} has neither rows nor a source query",
                    table.name
                )))
            }
        };
        Ok(Self {
            table,
            columns,
            source,
            returning: vec![],
        })
    }
}

impl ValueComponent {
    pub fn column(qualifier: Option<&str>, name: impl Into<String>) -> Self {
        ValueComponent::Column {
            qualifier: qualifier.map(str::to_string),
            name: name.into(),
        }
    }

    pub fn param(name: impl Into<String>, value: impl Into<SqlValue>) -> Self {
        ValueComponent::Parameter {
            name: name.into(),
            value: Some(value.into()),
        }
    }

    pub fn string(s: impl Into<String>) -> Self {
        ValueComponent::Literal(Literal::String(s.into()))
    }

    pub fn null() -> Self {
        ValueComponent::Literal(Literal::Null)
    }

    pub fn function(name: impl Into<String>, args: Vec<ValueComponent>) -> Self {
        ValueComponent::Function {
            name: name.into(),
            args,
            distinct: false,
            filter: None,
            over: None,
        }
    }

    pub fn binary(left: ValueComponent, op: BinaryOperator, right: ValueComponent) -> Self {
        ValueComponent::Binary {
            left: Box::new(left),
            op,
            right: Box::new(right),
        }
    }

    pub fn and(left: ValueComponent, right: ValueComponent) -> Self {
        Self::binary(left, BinaryOperator::And, right)
    }

    pub fn is_null(expr: ValueComponent) -> Self {
        ValueComponent::IsNull {
            expr: Box::new(expr),
            negated: false,
        }
    }

    /// Fold predicates into a left-deep AND chain.
    pub fn and_all(parts: Vec<ValueComponent>) -> Option<Self> {
        parts.into_iter().reduce(ValueComponent::and)
    }

    fn nest_if_or(self) -> Self {
        match self {
            ValueComponent::Binary {
                op: BinaryOperator::Or,
                ..
            } => ValueComponent::Nested(Box::new(self)),
            other => other,
        }
    }
}
