//! Statement composition: set operations, INSERT ... SELECT and
//! CREATE TABLE ... AS.

use crate::ast::types::*;
use crate::error::{SqlError, SqlResult};
use crate::format::SqlFormatter;

/// Chain `queries` left-associatively with `op`.
///
/// Every operand keeps its own WITH clause; the formatter hoists them ahead
/// of the whole operation when rendering. A single query is returned as is.
pub fn to_binary_query(
    queries: Vec<Statement>,
    op: SetOperator,
    all: bool,
) -> SqlResult<Statement> {
    let mut iter = queries.into_iter();
    let first = iter.next().ok_or_else(|| {
        SqlError::MissingOperand("a set operation needs at least one query".to_string())
    })?;
    Ok(iter.fold(first, |left, right| {
        Statement::Binary(Box::new(BinarySelect {
            left,
            op,
            all,
            right,
            order_by: vec![],
            limit: None,
            offset: None,
        }))
    }))
}

pub fn to_union(queries: Vec<Statement>) -> SqlResult<Statement> {
    to_binary_query(queries, SetOperator::Union, false)
}

pub fn to_union_all(queries: Vec<Statement>) -> SqlResult<Statement> {
    to_binary_query(queries, SetOperator::Union, true)
}

/// `INSERT INTO table (cols...) <select>`, with the column list taken from
/// the select's output names.
///
/// Fails with `InferredColumnsMissing` when an output has no name, such as
/// a bare wildcard or an unaliased expression.
pub fn to_insert_query(select: Statement, table: &str) -> SqlResult<Statement> {
    let columns = output_names(&select)?;
    let insert = InsertStatement::try_new(QualifiedName::parse(table), columns, vec![], Some(select))?;
    Ok(Statement::Insert(Box::new(insert)))
}

/// `CREATE [TEMPORARY] TABLE name AS <select>`.
pub fn to_create_table_query(select: Statement, name: &str, temporary: bool) -> SqlResult<Statement> {
    match select {
        Statement::Select(_) | Statement::Binary(_) | Statement::Values(_) => {}
        _ => {
            return Err(SqlError::UnsupportedStatement(
                "CREATE TABLE ... AS needs a query".to_string(),
            ))
        }
    }
    Ok(Statement::CreateTable(Box::new(CreateTableStatement {
        name: QualifiedName::parse(name),
        temporary,
        if_not_exists: false,
        columns: vec![],
        as_query: Some(Box::new(select)),
    })))
}

/// Output column names of a query, in order.
fn output_names(stmt: &Statement) -> SqlResult<Vec<String>> {
    match stmt {
        Statement::Select(s) => s
            .items
            .iter()
            .enumerate()
            .map(|(i, item)| {
                item.output_name().map(str::to_string).ok_or_else(|| {
                    SqlError::InferredColumnsMissing {
                        position: i + 1,
                        item: SqlFormatter::default().expression(&item.value),
                    }
                })
            })
            .collect(),
        Statement::Binary(b) => output_names(&b.left),
        Statement::Values(v) if !v.column_aliases.is_empty() => Ok(v.column_aliases.clone()),
        Statement::Values(_) => Err(SqlError::InferredColumnsMissing {
            position: 1,
            item: "VALUES".to_string(),
        }),
        _ => Err(SqlError::UnsupportedStatement(
            "INSERT ... SELECT needs a query".to_string(),
        )),
    }
}
