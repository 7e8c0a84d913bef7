/// SQL → statement tree.
///
/// `sqlparser` is the parsing frontend; this module lowers its tree into the
/// engine's own representation so collectors and rewrites never depend on
/// the frontend's node shapes. Constructs the engine does not model are kept
/// verbatim as `ValueComponent::Raw`.
use sqlparser::ast as sp;
use sqlparser::dialect::{
    Dialect, GenericDialect, MsSqlDialect, MySqlDialect, PostgreSqlDialect, SQLiteDialect,
};
use sqlparser::parser::{Parser, ParserError};

use crate::error::{SourcePosition, SqlError, SqlResult};

use super::types::*;

/// Parse a single statement with the PostgreSQL grammar.
pub fn parse(sql: &str) -> SqlResult<Statement> {
    SqlParser::default().parse(sql)
}

/// Parse every statement in `sql`.
pub fn parse_many(sql: &str) -> SqlResult<Vec<Statement>> {
    SqlParser::default().parse_many(sql)
}

/// Parse a statement that must be a plain SELECT.
pub fn parse_select(sql: &str) -> SqlResult<SimpleSelect> {
    match parse(sql)? {
        Statement::Select(s) => Ok(*s),
        _ => Err(SqlError::UnsupportedStatement(
            "expected a plain SELECT".to_string(),
        )),
    }
}

/// Turns SQL text into statements.
///
/// Implemented by [`SqlParser`]; callers holding a different frontend can
/// plug it in wherever a parser is expected.
pub trait StatementParser: Send + Sync {
    /// Human-readable name of the grammar this parser accepts.
    fn name(&self) -> &str;

    fn parse_many(&self, sql: &str) -> SqlResult<Vec<Statement>>;

    /// Parse exactly one statement.
    fn parse(&self, sql: &str) -> SqlResult<Statement> {
        let mut statements = self.parse_many(sql)?;
        if statements.len() != 1 {
            return Err(SqlError::syntax(format!(
                "expected 1 statement, found {}",
                statements.len()
            )));
        }
        Ok(statements.remove(0))
    }
}

/// Grammar used by the `sqlparser` frontend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ParserDialect {
    #[default]
    Postgres,
    MySql,
    SqlServer,
    Sqlite,
    Generic,
}

impl std::str::FromStr for ParserDialect {
    type Err = SqlError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "postgres" | "postgresql" => Ok(ParserDialect::Postgres),
            "mysql" => Ok(ParserDialect::MySql),
            "sqlserver" | "mssql" => Ok(ParserDialect::SqlServer),
            "sqlite" => Ok(ParserDialect::Sqlite),
            "generic" | "named" => Ok(ParserDialect::Generic),
            other => Err(SqlError::syntax(format!("unknown dialect '{}'", other))),
        }
    }
}

/// `sqlparser`-backed parser.
#[derive(Debug, Clone, Copy, Default)]
pub struct SqlParser {
    pub dialect: ParserDialect,
}

impl SqlParser {
    pub fn new(dialect: ParserDialect) -> Self {
        Self { dialect }
    }

    fn frontend(&self) -> Box<dyn Dialect> {
        match self.dialect {
            ParserDialect::Postgres => Box::new(PostgreSqlDialect {}),
            ParserDialect::MySql => Box::new(MySqlDialect {}),
            ParserDialect::SqlServer => Box::new(MsSqlDialect {}),
            ParserDialect::Sqlite => Box::new(SQLiteDialect {}),
            ParserDialect::Generic => Box::new(GenericDialect {}),
        }
    }
}

impl StatementParser for SqlParser {
    fn name(&self) -> &str {
        match self.dialect {
            ParserDialect::Postgres => "PostgreSQL",
            ParserDialect::MySql => "MySQL",
            ParserDialect::SqlServer => "SQL Server",
            ParserDialect::Sqlite => "SQLite",
            ParserDialect::Generic => "Generic SQL",
        }
    }

    fn parse_many(&self, sql: &str) -> SqlResult<Vec<Statement>> {
        let dialect = self.frontend();
        let statements = Parser::parse_sql(dialect.as_ref(), sql).map_err(syntax_error)?;
        let mut lowering = Lowering::default();
        statements
            .into_iter()
            .map(|s| lowering.statement(s))
            .collect()
    }
}

fn syntax_error(err: ParserError) -> SqlError {
    let raw = match err {
        ParserError::TokenizerError(m) | ParserError::ParserError(m) => m,
        ParserError::RecursionLimitExceeded => "recursion limit exceeded".to_string(),
    };
    let position = extract_position(&raw);
    let message = match raw.find(" at Line: ") {
        Some(idx) => raw[..idx].to_string(),
        None => raw,
    };
    SqlError::Syntax { message, position }
}

/// Pull `Line: X, Column: Y` out of a frontend error message.
fn extract_position(message: &str) -> Option<SourcePosition> {
    let number_after = |tag: &str| -> Option<u64> {
        let start = message.rfind(tag)? + tag.len();
        let digits: String = message[start..]
            .chars()
            .take_while(|c| c.is_ascii_digit())
            .collect();
        digits.parse().ok()
    };
    Some(SourcePosition {
        line: number_after("Line: ")?,
        column: number_after("Column: ")?,
    })
}

/// Lowering state for one parse call.
#[derive(Default)]
struct Lowering {
    /// Count of anonymous `?` placeholders seen so far.
    anonymous: usize,
}

impl Lowering {
    fn statement(&mut self, stmt: sp::Statement) -> SqlResult<Statement> {
        match stmt {
            sp::Statement::Query(q) => self.query(*q),
            sp::Statement::Insert(insert) => self.insert(insert),
            sp::Statement::Update {
                table,
                assignments,
                from,
                selection,
                returning,
                ..
            } => {
                if from.is_some() {
                    return Err(SqlError::UnsupportedStatement(
                        "UPDATE ... FROM".to_string(),
                    ));
                }
                self.update(table, assignments, selection, returning)
            }
            sp::Statement::Delete(delete) => self.delete(delete),
            sp::Statement::CreateTable(create) => self.create_table(create),
            other => Err(SqlError::UnsupportedStatement(statement_kind(&other))),
        }
    }

    fn query(&mut self, query: sp::Query) -> SqlResult<Statement> {
        let with = query.with.map(|w| self.with_clause(w)).transpose()?;
        let body = self.set_expr(*query.body)?;

        let order_by = query
            .order_by
            .map(|ob| ob.exprs)
            .unwrap_or_default()
            .into_iter()
            .map(|o| self.order_by(o))
            .collect::<SqlResult<Vec<_>>>()?;
        let limit = query.limit.map(|l| self.expr(l)).transpose()?;
        let offset = query.offset.map(|o| self.expr(o.value)).transpose()?;

        let body = apply_query_modifiers(body, order_by, limit, offset)?;
        match with {
            Some(with) => attach_with(body, with),
            None => Ok(body),
        }
    }

    fn with_clause(&mut self, with: sp::With) -> SqlResult<WithClause> {
        let tables = with
            .cte_tables
            .into_iter()
            .map(|cte| {
                Ok(CommonTable {
                    name: cte.alias.name.value,
                    columns: cte.alias.columns.into_iter().map(|c| c.name.value).collect(),
                    body: self.query(*cte.query)?,
                })
            })
            .collect::<SqlResult<Vec<_>>>()?;
        let mut clause = WithClause::new(tables)?;
        clause.recursive = with.recursive;
        Ok(clause)
    }

    fn set_expr(&mut self, expr: sp::SetExpr) -> SqlResult<Statement> {
        match expr {
            sp::SetExpr::Select(select) => self.select(*select),
            sp::SetExpr::Query(query) => self.query(*query),
            sp::SetExpr::SetOperation {
                op,
                set_quantifier,
                left,
                right,
                ..
            } => {
                let op = match op {
                    sp::SetOperator::Union => SetOperator::Union,
                    sp::SetOperator::Intersect => SetOperator::Intersect,
                    sp::SetOperator::Except => SetOperator::Except,
                    #[allow(unreachable_patterns)]
                    other => {
                        return Err(SqlError::UnsupportedStatement(format!(
                            "set operator {}",
                            other
                        )))
                    }
                };
                let all = match set_quantifier {
                    sp::SetQuantifier::All => true,
                    sp::SetQuantifier::Distinct | sp::SetQuantifier::None => false,
                    other => {
                        return Err(SqlError::UnsupportedStatement(format!(
                            "set quantifier {}",
                            other
                        )))
                    }
                };
                let left = self.set_expr(*left)?;
                let right = self.set_expr(*right)?;
                Ok(Statement::Binary(Box::new(BinarySelect {
                    left,
                    op,
                    all,
                    right,
                    order_by: vec![],
                    limit: None,
                    offset: None,
                })))
            }
            sp::SetExpr::Values(values) => Ok(Statement::Values(ValuesQuery {
                rows: self.rows(values.rows)?,
                column_aliases: vec![],
            })),
            other => Err(SqlError::UnsupportedStatement(format!(
                "query body {}",
                other
            ))),
        }
    }

    fn select(&mut self, select: sp::Select) -> SqlResult<Statement> {
        let distinct = match select.distinct {
            None => false,
            Some(sp::Distinct::Distinct) => true,
            Some(sp::Distinct::On(_)) => {
                return Err(SqlError::UnsupportedStatement("DISTINCT ON".to_string()))
            }
        };
        if !select.named_window.is_empty() {
            return Err(SqlError::UnsupportedStatement("WINDOW clause".to_string()));
        }

        let items = select
            .projection
            .into_iter()
            .map(|item| self.select_item(item))
            .collect::<SqlResult<Vec<_>>>()?;

        let mut from = Vec::new();
        let mut joins = Vec::new();
        for twj in select.from {
            from.push(self.table_factor(twj.relation)?);
            for join in twj.joins {
                joins.push(self.join(join)?);
            }
        }

        let filter = select.selection.map(|e| self.expr(e)).transpose()?;
        let group_by = match select.group_by {
            sp::GroupByExpr::Expressions(exprs, _) => self.exprs(exprs)?,
            sp::GroupByExpr::All(_) => {
                return Err(SqlError::UnsupportedStatement("GROUP BY ALL".to_string()))
            }
        };
        let having = select.having.map(|e| self.expr(e)).transpose()?;

        Ok(Statement::Select(Box::new(SimpleSelect {
            with: None,
            distinct,
            items,
            from,
            joins,
            filter,
            group_by,
            having,
            order_by: vec![],
            limit: None,
            offset: None,
        })))
    }

    fn select_item(&mut self, item: sp::SelectItem) -> SqlResult<SelectItem> {
        match item {
            sp::SelectItem::UnnamedExpr(expr) => Ok(SelectItem::new(self.expr(expr)?)),
            sp::SelectItem::ExprWithAlias { expr, alias } => {
                Ok(SelectItem::aliased(self.expr(expr)?, alias.value))
            }
            sp::SelectItem::Wildcard(_) => Ok(SelectItem::new(ValueComponent::Wildcard {
                qualifier: None,
            })),
            sp::SelectItem::QualifiedWildcard(name, _) => {
                Ok(SelectItem::new(ValueComponent::Wildcard {
                    qualifier: Some(object_name(&name)),
                }))
            }
        }
    }

    fn table_factor(&mut self, tf: sp::TableFactor) -> SqlResult<TableSource> {
        match tf {
            sp::TableFactor::Table {
                name,
                alias,
                args: Some(args),
                ..
            } => Ok(TableSource::Function {
                name: object_name(&name),
                args: args
                    .args
                    .into_iter()
                    .map(|a| self.function_arg(a))
                    .collect::<SqlResult<Vec<_>>>()?,
                alias: alias.map(|a| a.name.value),
            }),
            sp::TableFactor::Table { name, alias, .. } => {
                let mut parts: Vec<String> = name.0.into_iter().map(|p| p.value).collect();
                let table = parts.pop().unwrap_or_default();
                let schema = if parts.is_empty() {
                    None
                } else {
                    Some(parts.join("."))
                };
                Ok(TableSource::Table {
                    schema,
                    name: table,
                    alias: alias.map(|a| a.name.value),
                })
            }
            sp::TableFactor::Derived {
                lateral,
                subquery,
                alias,
                ..
            } => {
                let (alias, columns) = match alias {
                    Some(a) => (
                        a.name.value,
                        a.columns.into_iter().map(|c| c.name.value).collect(),
                    ),
                    None => ("_subquery".to_string(), vec![]),
                };
                Ok(TableSource::Subquery {
                    query: Box::new(self.query(*subquery)?),
                    alias,
                    columns,
                    lateral,
                })
            }
            sp::TableFactor::TableFunction { expr, alias } => {
                let alias = alias.map(|a| a.name.value);
                match self.expr(expr)? {
                    ValueComponent::Function { name, args, .. } => {
                        Ok(TableSource::Function { name, args, alias })
                    }
                    other => Err(SqlError::UnsupportedStatement(format!(
                        "table function {:?}",
                        other
                    ))),
                }
            }
            other => Err(SqlError::UnsupportedStatement(format!(
                "FROM item {}",
                other
            ))),
        }
    }

    fn join(&mut self, join: sp::Join) -> SqlResult<Join> {
        let (join_type, constraint) = match join.join_operator {
            sp::JoinOperator::Inner(c) => (JoinType::Inner, Some(c)),
            sp::JoinOperator::LeftOuter(c) => (JoinType::Left, Some(c)),
            sp::JoinOperator::RightOuter(c) => (JoinType::Right, Some(c)),
            sp::JoinOperator::FullOuter(c) => (JoinType::Full, Some(c)),
            sp::JoinOperator::CrossJoin => (JoinType::Cross, None),
            other => {
                return Err(SqlError::UnsupportedStatement(format!(
                    "join operator {:?}",
                    other
                )))
            }
        };
        let condition = match constraint {
            Some(sp::JoinConstraint::On(expr)) => Some(JoinCondition::On(self.expr(expr)?)),
            Some(sp::JoinConstraint::Using(cols)) => Some(JoinCondition::Using(
                cols.into_iter().map(|c| c.value).collect(),
            )),
            Some(sp::JoinConstraint::Natural) => Some(JoinCondition::Natural),
            Some(sp::JoinConstraint::None) | None => None,
        };
        Ok(Join {
            join_type,
            source: self.table_factor(join.relation)?,
            condition,
        })
    }

    fn exprs(&mut self, exprs: Vec<sp::Expr>) -> SqlResult<Vec<ValueComponent>> {
        exprs.into_iter().map(|e| self.expr(e)).collect()
    }

    fn rows(&mut self, rows: Vec<Vec<sp::Expr>>) -> SqlResult<Vec<Vec<ValueComponent>>> {
        rows.into_iter().map(|row| self.exprs(row)).collect()
    }

    fn boxed(&mut self, expr: sp::Expr) -> SqlResult<Box<ValueComponent>> {
        Ok(Box::new(self.expr(expr)?))
    }

    fn expr(&mut self, expr: sp::Expr) -> SqlResult<ValueComponent> {
        match expr {
            sp::Expr::Identifier(ident) => match ident.value.strip_prefix('@') {
                Some(name) => Ok(ValueComponent::Parameter {
                    name: name.to_string(),
                    value: None,
                }),
                None => Ok(ValueComponent::Column {
                    qualifier: None,
                    name: ident.value,
                }),
            },
            sp::Expr::CompoundIdentifier(parts) => {
                let mut names: Vec<String> = parts.into_iter().map(|p| p.value).collect();
                let name = names.pop().unwrap_or_default();
                let qualifier = if names.is_empty() {
                    None
                } else {
                    Some(names.join("."))
                };
                Ok(ValueComponent::Column { qualifier, name })
            }
            sp::Expr::Value(val) => Ok(self.value(val)),
            sp::Expr::BinaryOp { left, op, right } => match binary_op(&op) {
                Some(mapped) => Ok(ValueComponent::Binary {
                    left: self.boxed(*left)?,
                    op: mapped,
                    right: self.boxed(*right)?,
                }),
                None => Ok(ValueComponent::Raw(
                    sp::Expr::BinaryOp { left, op, right }.to_string(),
                )),
            },
            sp::Expr::UnaryOp { op, expr } => {
                let mapped = match op {
                    sp::UnaryOperator::Not => UnaryOperator::Not,
                    sp::UnaryOperator::Minus => UnaryOperator::Minus,
                    sp::UnaryOperator::Plus => UnaryOperator::Plus,
                    other => {
                        return Ok(ValueComponent::Raw(
                            sp::Expr::UnaryOp { op: other, expr }.to_string(),
                        ))
                    }
                };
                Ok(ValueComponent::Unary {
                    op: mapped,
                    operand: self.boxed(*expr)?,
                })
            }
            sp::Expr::Function(func) => self.function(func),
            sp::Expr::Case {
                operand,
                conditions,
                results,
                else_result,
            } => {
                let branches = conditions
                    .into_iter()
                    .zip(results)
                    .map(|(c, r)| Ok((self.expr(c)?, self.expr(r)?)))
                    .collect::<SqlResult<Vec<_>>>()?;
                Ok(ValueComponent::Case {
                    operand: operand.map(|o| self.boxed(*o)).transpose()?,
                    branches,
                    else_value: else_result.map(|e| self.boxed(*e)).transpose()?,
                })
            }
            sp::Expr::Subquery(q) => Ok(ValueComponent::Subquery(Box::new(self.query(*q)?))),
            sp::Expr::Exists { subquery, negated } => {
                let exists = ValueComponent::Exists(Box::new(self.query(*subquery)?));
                if negated {
                    Ok(ValueComponent::Unary {
                        op: UnaryOperator::Not,
                        operand: Box::new(exists),
                    })
                } else {
                    Ok(exists)
                }
            }
            sp::Expr::InList {
                expr,
                list,
                negated,
            } => Ok(ValueComponent::InList {
                expr: self.boxed(*expr)?,
                list: self.exprs(list)?,
                negated,
            }),
            sp::Expr::InSubquery {
                expr,
                subquery,
                negated,
            } => Ok(ValueComponent::InSubquery {
                expr: self.boxed(*expr)?,
                query: Box::new(self.query(*subquery)?),
                negated,
            }),
            sp::Expr::Between {
                expr,
                negated,
                low,
                high,
            } => Ok(ValueComponent::Between {
                expr: self.boxed(*expr)?,
                low: self.boxed(*low)?,
                high: self.boxed(*high)?,
                negated,
            }),
            sp::Expr::IsNull(expr) => Ok(ValueComponent::IsNull {
                expr: self.boxed(*expr)?,
                negated: false,
            }),
            sp::Expr::IsNotNull(expr) => Ok(ValueComponent::IsNull {
                expr: self.boxed(*expr)?,
                negated: true,
            }),
            sp::Expr::Cast {
                kind:
                    kind @ (sp::CastKind::Cast | sp::CastKind::DoubleColon),
                expr,
                data_type,
                ..
            } => Ok(ValueComponent::Cast {
                expr: self.boxed(*expr)?,
                data_type: data_type.to_string(),
                shorthand: matches!(kind, sp::CastKind::DoubleColon),
            }),
            sp::Expr::Nested(expr) => Ok(ValueComponent::Nested(self.boxed(*expr)?)),
            sp::Expr::Like {
                negated,
                expr,
                pattern,
                escape_char: None,
                ..
            } => self.pattern_match(*expr, *pattern, negated, false),
            sp::Expr::ILike {
                negated,
                expr,
                pattern,
                escape_char: None,
                ..
            } => self.pattern_match(*expr, *pattern, negated, true),
            sp::Expr::Tuple(items) => Ok(ValueComponent::Tuple(self.exprs(items)?)),
            sp::Expr::Array(arr) => Ok(ValueComponent::Array(self.exprs(arr.elem)?)),
            other => Ok(ValueComponent::Raw(other.to_string())),
        }
    }

    fn pattern_match(
        &mut self,
        expr: sp::Expr,
        pattern: sp::Expr,
        negated: bool,
        case_insensitive: bool,
    ) -> SqlResult<ValueComponent> {
        let op = match (case_insensitive, negated) {
            (false, false) => BinaryOperator::Like,
            (false, true) => BinaryOperator::NotLike,
            (true, false) => BinaryOperator::ILike,
            (true, true) => BinaryOperator::NotILike,
        };
        Ok(ValueComponent::Binary {
            left: self.boxed(expr)?,
            op,
            right: self.boxed(pattern)?,
        })
    }

    fn value(&mut self, val: sp::Value) -> ValueComponent {
        match val {
            sp::Value::Null => ValueComponent::Literal(Literal::Null),
            sp::Value::Boolean(b) => ValueComponent::Literal(Literal::Boolean(b)),
            sp::Value::Number(n, _) => ValueComponent::Literal(Literal::Number(n.to_string())),
            sp::Value::SingleQuotedString(s) => ValueComponent::Literal(Literal::String(s)),
            sp::Value::Placeholder(p) => ValueComponent::Parameter {
                name: self.placeholder_name(&p),
                value: None,
            },
            other => ValueComponent::Raw(other.to_string()),
        }
    }

    /// `:name`, `@name` and `$name` lose their sigil. `$n` becomes `pn`;
    /// anonymous `?` placeholders are numbered in order of appearance.
    fn placeholder_name(&mut self, placeholder: &str) -> String {
        if placeholder == "?" {
            self.anonymous += 1;
            return format!("p{}", self.anonymous);
        }
        let stripped = placeholder.trim_start_matches([':', '@', '$', '?']);
        if !stripped.is_empty() && stripped.chars().all(|c| c.is_ascii_digit()) {
            format!("p{}", stripped)
        } else {
            stripped.to_string()
        }
    }

    fn function(&mut self, func: sp::Function) -> SqlResult<ValueComponent> {
        let name = object_name(&func.name);

        let (args, distinct) = match func.args {
            sp::FunctionArguments::List(list) if list.clauses.is_empty() => {
                let distinct = matches!(
                    list.duplicate_treatment,
                    Some(sp::DuplicateTreatment::Distinct)
                );
                let args = list
                    .args
                    .into_iter()
                    .map(|a| self.function_arg(a))
                    .collect::<SqlResult<Vec<_>>>()?;
                (args, distinct)
            }
            sp::FunctionArguments::None => (vec![], false),
            sp::FunctionArguments::Subquery(q) => (
                vec![ValueComponent::Subquery(Box::new(self.query(*q)?))],
                false,
            ),
            list @ sp::FunctionArguments::List(_) => {
                // Aggregate ORDER BY / LIMIT inside the argument list.
                return Ok(ValueComponent::Raw(format!("{}{}", name, list)));
            }
        };

        let filter = func.filter.map(|f| self.boxed(*f)).transpose()?;
        let over = match func.over {
            Some(sp::WindowType::WindowSpec(spec)) => Some(Box::new(self.window_spec(spec)?)),
            Some(sp::WindowType::NamedWindow(ident)) => Some(Box::new(WindowSpec {
                name: Some(ident.value),
                ..Default::default()
            })),
            None => None,
        };

        Ok(ValueComponent::Function {
            name,
            args,
            distinct,
            filter,
            over,
        })
    }

    fn function_arg(&mut self, arg: sp::FunctionArg) -> SqlResult<ValueComponent> {
        match arg {
            sp::FunctionArg::Unnamed(sp::FunctionArgExpr::Expr(e)) => self.expr(e),
            sp::FunctionArg::Unnamed(sp::FunctionArgExpr::Wildcard) => {
                Ok(ValueComponent::Wildcard { qualifier: None })
            }
            sp::FunctionArg::Unnamed(sp::FunctionArgExpr::QualifiedWildcard(name)) => {
                Ok(ValueComponent::Wildcard {
                    qualifier: Some(object_name(&name)),
                })
            }
            other => Ok(ValueComponent::Raw(other.to_string())),
        }
    }

    fn window_spec(&mut self, spec: sp::WindowSpec) -> SqlResult<WindowSpec> {
        let partition_by = self.exprs(spec.partition_by)?;
        let order_by = spec
            .order_by
            .into_iter()
            .map(|o| self.order_by(o))
            .collect::<SqlResult<Vec<_>>>()?;
        let frame = spec.window_frame.map(convert_window_frame);
        Ok(WindowSpec {
            name: None,
            partition_by,
            order_by,
            frame,
        })
    }

    fn order_by(&mut self, order: sp::OrderByExpr) -> SqlResult<OrderByItem> {
        Ok(OrderByItem {
            value: self.expr(order.expr)?,
            asc: order.asc,
            nulls_first: order.nulls_first,
        })
    }

    fn insert(&mut self, insert: sp::Insert) -> SqlResult<Statement> {
        let parts: Vec<&str> = insert
            .table_name
            .0
            .iter()
            .map(|p| p.value.as_str())
            .collect();
        let table = QualifiedName::parse(&parts.join("."));
        let columns: Vec<String> = insert.columns.into_iter().map(|c| c.value).collect();

        let (rows, query) = match insert.source {
            Some(src) if src.with.is_none() && src.order_by.is_none() && src.limit.is_none() => {
                match *src.body {
                    sp::SetExpr::Values(values) => (self.rows(values.rows)?, None),
                    other => (vec![], Some(self.set_expr(other)?)),
                }
            }
            Some(src) => (vec![], Some(self.query(*src)?)),
            None => (vec![], None),
        };

        let mut stmt = InsertStatement::try_new(table, columns, rows, query)?;
        stmt.returning = self.returning(insert.returning)?;
        Ok(Statement::Insert(Box::new(stmt)))
    }

    fn update(
        &mut self,
        table: sp::TableWithJoins,
        assignments: Vec<sp::Assignment>,
        selection: Option<sp::Expr>,
        returning: Option<Vec<sp::SelectItem>>,
    ) -> SqlResult<Statement> {
        let target = self.table_factor(table.relation)?;
        let assignments = assignments
            .into_iter()
            .map(|a| {
                Ok(Assignment {
                    column: a.target.to_string(),
                    value: self.expr(a.value)?,
                })
            })
            .collect::<SqlResult<Vec<_>>>()?;
        let filter = selection.map(|e| self.expr(e)).transpose()?;

        Ok(Statement::Update(Box::new(UpdateStatement {
            with: None,
            target,
            assignments,
            from: vec![],
            filter,
            returning: self.returning(returning)?,
        })))
    }

    fn delete(&mut self, delete: sp::Delete) -> SqlResult<Statement> {
        let tables = match delete.from {
            sp::FromTable::WithFromKeyword(tables) | sp::FromTable::WithoutKeyword(tables) => {
                tables
            }
        };
        let target = match tables.into_iter().next() {
            Some(twj) => self.table_factor(twj.relation)?,
            None => {
                return Err(SqlError::MissingOperand(
                    "DELETE without a target table".to_string(),
                ))
            }
        };
        let using = delete
            .using
            .unwrap_or_default()
            .into_iter()
            .map(|twj| self.table_factor(twj.relation))
            .collect::<SqlResult<Vec<_>>>()?;
        let filter = delete.selection.map(|e| self.expr(e)).transpose()?;

        Ok(Statement::Delete(Box::new(DeleteStatement {
            with: None,
            target,
            using,
            filter,
            returning: self.returning(delete.returning)?,
        })))
    }

    fn create_table(&mut self, create: sp::CreateTable) -> SqlResult<Statement> {
        let parts: Vec<&str> = create.name.0.iter().map(|p| p.value.as_str()).collect();
        let columns = create
            .columns
            .into_iter()
            .map(|c| ColumnDefinition {
                name: c.name.value,
                data_type: c.data_type.to_string(),
            })
            .collect();
        let as_query = create
            .query
            .map(|q| self.query(*q).map(Box::new))
            .transpose()?;

        Ok(Statement::CreateTable(Box::new(CreateTableStatement {
            name: QualifiedName::parse(&parts.join(".")),
            temporary: create.temporary,
            if_not_exists: create.if_not_exists,
            columns,
            as_query,
        })))
    }

    fn returning(&mut self, items: Option<Vec<sp::SelectItem>>) -> SqlResult<Vec<SelectItem>> {
        items
            .unwrap_or_default()
            .into_iter()
            .map(|item| self.select_item(item))
            .collect()
    }
}

/// Attach trailing ORDER BY / LIMIT / OFFSET to the statement they govern.
/// A parenthesized select that already carries its own modifiers is wrapped
/// so neither set is lost.
fn apply_query_modifiers(
    body: Statement,
    order_by: Vec<OrderByItem>,
    limit: Option<ValueComponent>,
    offset: Option<ValueComponent>,
) -> SqlResult<Statement> {
    if order_by.is_empty() && limit.is_none() && offset.is_none() {
        return Ok(body);
    }
    match body {
        Statement::Select(mut s)
            if s.order_by.is_empty() && s.limit.is_none() && s.offset.is_none() =>
        {
            s.order_by = order_by;
            s.limit = limit;
            s.offset = offset;
            Ok(Statement::Select(s))
        }
        Statement::Binary(mut b)
            if b.order_by.is_empty() && b.limit.is_none() && b.offset.is_none() =>
        {
            b.order_by = order_by;
            b.limit = limit;
            b.offset = offset;
            Ok(Statement::Binary(b))
        }
        Statement::Values(_) => Err(SqlError::UnsupportedStatement(
            "ORDER BY / LIMIT on a bare VALUES list".to_string(),
        )),
        other => Ok(Statement::Select(Box::new(SimpleSelect {
            items: vec![SelectItem::new(ValueComponent::Wildcard { qualifier: None })],
            from: vec![TableSource::subquery(other, "_sub")],
            order_by,
            limit,
            offset,
            ..Default::default()
        }))),
    }
}

/// A WITH clause over a set operation belongs to its leftmost leaf select;
/// the formatter hoists it back ahead of the whole operation.
fn attach_with(mut body: Statement, with: WithClause) -> SqlResult<Statement> {
    if let Statement::Values(_) = body {
        return Err(SqlError::UnsupportedStatement(
            "WITH over a bare VALUES list".to_string(),
        ));
    }
    let Some(select) = body.leftmost_select_mut() else {
        return Err(SqlError::UnsupportedStatement(
            "WITH over a non-select operand".to_string(),
        ));
    };
    match select.with.as_mut() {
        None => select.with = Some(with),
        Some(existing) => {
            existing.recursive |= with.recursive;
            existing.prepend(with.tables)?;
        }
    }
    Ok(body)
}

fn binary_op(op: &sp::BinaryOperator) -> Option<BinaryOperator> {
    Some(match op {
        sp::BinaryOperator::Eq => BinaryOperator::Eq,
        sp::BinaryOperator::NotEq => BinaryOperator::NotEq,
        sp::BinaryOperator::Lt => BinaryOperator::Lt,
        sp::BinaryOperator::LtEq => BinaryOperator::LtEq,
        sp::BinaryOperator::Gt => BinaryOperator::Gt,
        sp::BinaryOperator::GtEq => BinaryOperator::GtEq,
        sp::BinaryOperator::And => BinaryOperator::And,
        sp::BinaryOperator::Or => BinaryOperator::Or,
        sp::BinaryOperator::Plus => BinaryOperator::Plus,
        sp::BinaryOperator::Minus => BinaryOperator::Minus,
        sp::BinaryOperator::Multiply => BinaryOperator::Multiply,
        sp::BinaryOperator::Divide => BinaryOperator::Divide,
        sp::BinaryOperator::Modulo => BinaryOperator::Modulo,
        sp::BinaryOperator::StringConcat => BinaryOperator::Concat,
        _ => return None,
    })
}

fn convert_window_frame(frame: sp::WindowFrame) -> WindowFrame {
    let mode = match frame.units {
        sp::WindowFrameUnits::Rows => WindowFrameMode::Rows,
        sp::WindowFrameUnits::Range => WindowFrameMode::Range,
        sp::WindowFrameUnits::Groups => WindowFrameMode::Groups,
    };
    WindowFrame {
        mode,
        start: convert_window_frame_bound(frame.start_bound),
        end: frame.end_bound.map(convert_window_frame_bound),
    }
}

fn convert_window_frame_bound(bound: sp::WindowFrameBound) -> WindowFrameBound {
    let offset = |expr: Option<Box<sp::Expr>>| match expr.map(|e| *e) {
        Some(sp::Expr::Value(sp::Value::Number(n, _))) => n.to_string().parse().ok(),
        _ => None,
    };
    match bound {
        sp::WindowFrameBound::CurrentRow => WindowFrameBound::CurrentRow,
        sp::WindowFrameBound::Preceding(e) => WindowFrameBound::Preceding(offset(e)),
        sp::WindowFrameBound::Following(e) => WindowFrameBound::Following(offset(e)),
    }
}

fn object_name(name: &sp::ObjectName) -> String {
    name.0
        .iter()
        .map(|p| p.value.as_str())
        .collect::<Vec<_>>()
        .join(".")
}

fn statement_kind(stmt: &sp::Statement) -> String {
    stmt.to_string()
        .split_whitespace()
        .take(2)
        .collect::<Vec<_>>()
        .join(" ")
}
