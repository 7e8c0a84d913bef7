//! Statement tree → SQL text.
//!
//! One renderer covers both layouts: compact output joins clauses with a
//! space, pretty output puts each clause on its own line and indents
//! subqueries one level per nesting.

use crate::ast::types::*;
use crate::ast::visitor::collect_operand_withs;
use crate::error::SqlError;

use super::params::ParamRegistry;
use super::FormatOptions;

const INDENT: &str = "    ";

pub(crate) struct Renderer<'o> {
    options: &'o FormatOptions,
    pub(crate) params: ParamRegistry,
    depth: usize,
    error: Option<SqlError>,
}

impl<'o> Renderer<'o> {
    pub(crate) fn new(options: &'o FormatOptions) -> Self {
        Self {
            options,
            params: ParamRegistry::new(options.preset),
            depth: 0,
            error: None,
        }
    }

    pub(crate) fn take_error(&mut self) -> Option<SqlError> {
        self.error.take()
    }

    fn sep(&self) -> String {
        if self.options.pretty {
            format!("\n{}", INDENT.repeat(self.depth))
        } else {
            " ".to_string()
        }
    }

    fn ident(&self, name: &str) -> String {
        if self.options.quote_identifiers {
            self.options.preset.quote_ident(name)
        } else {
            name.to_string()
        }
    }

    fn qualified(&self, schema: Option<&str>, name: &str) -> String {
        match schema {
            Some(s) => format!("{}.{}", self.ident(s), self.ident(name)),
            None => self.ident(name),
        }
    }

    fn ident_list(&self, names: &[String]) -> String {
        names
            .iter()
            .map(|n| self.ident(n))
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Render a statement body nested one level deeper, wrapped in
    /// parentheses.
    fn nested(&mut self, stmt: &Statement) -> String {
        self.depth += 1;
        let inner = self.statement(stmt);
        self.depth -= 1;
        if self.options.pretty {
            format!(
                "(\n{}{}\n{})",
                INDENT.repeat(self.depth + 1),
                inner,
                INDENT.repeat(self.depth)
            )
        } else {
            format!("({})", inner)
        }
    }

    pub(crate) fn statement(&mut self, stmt: &Statement) -> String {
        match stmt {
            Statement::Select(s) => self.select(s, true),
            Statement::Binary(b) => self.binary(b),
            Statement::Values(v) => self.values(&v.rows),
            Statement::Insert(i) => self.insert(i),
            Statement::CreateTable(c) => self.create_table(c),
            Statement::Update(u) => self.update(u),
            Statement::Delete(d) => self.delete(d),
        }
    }

    pub(crate) fn with_clause(&mut self, with: &WithClause) -> String {
        let ctes: Vec<String> = with
            .tables
            .iter()
            .map(|c| {
                let cols = if c.columns.is_empty() {
                    String::new()
                } else {
                    format!("({})", self.ident_list(&c.columns))
                };
                let name = self.ident(&c.name);
                let body = self.nested(&c.body);
                format!("{}{} AS {}", name, cols, body)
            })
            .collect();
        let recursive = if with.recursive { "RECURSIVE " } else { "" };
        let joiner = if self.options.pretty {
            format!(",{}", self.sep())
        } else {
            ", ".to_string()
        };
        format!("WITH {}{}", recursive, ctes.join(&joiner))
    }

    fn select(&mut self, select: &SimpleSelect, own_with: bool) -> String {
        let mut parts = Vec::new();

        if own_with {
            if let Some(with) = &select.with {
                parts.push(self.with_clause(with));
            }
        }

        let mut head = String::from("SELECT ");
        if select.distinct {
            head.push_str("DISTINCT ");
        }
        let items: Vec<String> = select.items.iter().map(|i| self.select_item(i)).collect();
        if items.is_empty() {
            head.push('*');
        } else {
            head.push_str(&items.join(", "));
        }
        parts.push(head);

        if !select.from.is_empty() {
            let tables: Vec<String> = select.from.iter().map(|t| self.table_source(t)).collect();
            parts.push(format!("FROM {}", tables.join(", ")));
        }

        for join in &select.joins {
            let join = self.join(join);
            parts.push(join);
        }

        if let Some(filter) = &select.filter {
            parts.push(format!("WHERE {}", self.value(filter)));
        }

        if !select.group_by.is_empty() {
            let groups = self.values_list(&select.group_by);
            parts.push(format!("GROUP BY {}", groups));
        }

        if let Some(having) = &select.having {
            parts.push(format!("HAVING {}", self.value(having)));
        }

        self.modifiers(
            &mut parts,
            &select.order_by,
            select.limit.as_ref(),
            select.offset.as_ref(),
        );

        parts.join(&self.sep())
    }

    fn modifiers(
        &mut self,
        parts: &mut Vec<String>,
        order_by: &[OrderByItem],
        limit: Option<&ValueComponent>,
        offset: Option<&ValueComponent>,
    ) {
        if !order_by.is_empty() {
            let orders: Vec<String> = order_by.iter().map(|o| self.order_by(o)).collect();
            parts.push(format!("ORDER BY {}", orders.join(", ")));
        }
        if let Some(limit) = limit {
            parts.push(format!("LIMIT {}", self.value(limit)));
        }
        if let Some(offset) = offset {
            parts.push(format!("OFFSET {}", self.value(offset)));
        }
    }

    /// Set operation with every operand WITH clause hoisted in front.
    fn binary(&mut self, b: &BinarySelect) -> String {
        let mut hoisted: Vec<&WithClause> = Vec::new();
        collect_operand_withs(&b.left, &mut hoisted);
        collect_operand_withs(&b.right, &mut hoisted);

        let mut parts = Vec::new();
        if let Some(with) = self.merge_withs(&hoisted) {
            parts.push(self.with_clause(&with));
        }
        parts.push(self.set_operation(b));
        self.modifiers(&mut parts, &b.order_by, b.limit.as_ref(), b.offset.as_ref());
        parts.join(&self.sep())
    }

    fn merge_withs(&mut self, withs: &[&WithClause]) -> Option<WithClause> {
        if withs.is_empty() {
            return None;
        }
        let mut merged = WithClause::default();
        for with in withs {
            merged.recursive |= with.recursive;
            for table in &with.tables {
                match merged.get(&table.name) {
                    Some(existing) if existing == table => {}
                    Some(_) => {
                        self.error
                            .get_or_insert(SqlError::DuplicateCte(table.name.clone()));
                    }
                    None => merged.tables.push(table.clone()),
                }
            }
        }
        Some(merged)
    }

    fn set_operation(&mut self, b: &BinarySelect) -> String {
        let left = self.operand(&b.left, b.op, false);
        let right = self.operand(&b.right, b.op, true);
        let op = match b.op {
            SetOperator::Union => "UNION",
            SetOperator::Intersect => "INTERSECT",
            SetOperator::Except => "EXCEPT",
        };
        let all = if b.all { " ALL" } else { "" };
        let sep = self.sep();
        format!("{}{}{}{}{}{}", left, sep, op, all, sep, right)
    }

    fn operand(&mut self, stmt: &Statement, parent: SetOperator, right: bool) -> String {
        match stmt {
            Statement::Select(s) => {
                let body = self.select(s, false);
                if s.order_by.is_empty() && s.limit.is_none() && s.offset.is_none() {
                    body
                } else {
                    format!("({})", body)
                }
            }
            Statement::Binary(inner) => {
                let has_modifiers =
                    !inner.order_by.is_empty() || inner.limit.is_some() || inner.offset.is_some();
                let binds_looser =
                    parent == SetOperator::Intersect && inner.op != SetOperator::Intersect;
                if !right && !has_modifiers && !binds_looser {
                    return self.set_operation(inner);
                }
                let mut parts = vec![self.set_operation(inner)];
                self.modifiers(
                    &mut parts,
                    &inner.order_by,
                    inner.limit.as_ref(),
                    inner.offset.as_ref(),
                );
                format!("({})", parts.join(&self.sep()))
            }
            Statement::Values(v) => self.values(&v.rows),
            other => self.nested(other),
        }
    }

    fn values(&mut self, rows: &[Vec<ValueComponent>]) -> String {
        let rows: Vec<String> = rows
            .iter()
            .map(|row| format!("({})", self.values_list(row)))
            .collect();
        let joiner = if self.options.pretty {
            format!(",{}{}", self.sep(), INDENT)
        } else {
            ", ".to_string()
        };
        format!("VALUES {}", rows.join(&joiner))
    }

    fn select_item(&mut self, item: &SelectItem) -> String {
        let value = self.value(&item.value);
        match &item.alias {
            Some(a) => format!("{} AS {}", value, self.ident(a)),
            None => value,
        }
    }

    fn table_source(&mut self, source: &TableSource) -> String {
        match source {
            TableSource::Table {
                schema,
                name,
                alias,
            } => {
                let mut s = self.qualified(schema.as_deref(), name);
                if let Some(a) = alias {
                    s.push_str(&format!(" AS {}", self.ident(a)));
                }
                s
            }
            TableSource::Subquery {
                query,
                alias,
                columns,
                lateral,
            } => {
                let lateral = if *lateral { "LATERAL " } else { "" };
                let body = self.nested(query);
                let cols = if columns.is_empty() {
                    String::new()
                } else {
                    format!("({})", self.ident_list(columns))
                };
                format!("{}{} AS {}{}", lateral, body, self.ident(alias), cols)
            }
            TableSource::Function { name, args, alias } => {
                let mut s = format!("{}({})", name, self.values_list(args));
                if let Some(a) = alias {
                    s.push_str(&format!(" AS {}", self.ident(a)));
                }
                s
            }
        }
    }

    fn join(&mut self, join: &Join) -> String {
        let kind = match join.join_type {
            JoinType::Inner => "JOIN",
            JoinType::Left => "LEFT JOIN",
            JoinType::Right => "RIGHT JOIN",
            JoinType::Full => "FULL JOIN",
            JoinType::Cross => "CROSS JOIN",
        };
        let table = self.table_source(&join.source);
        match &join.condition {
            Some(JoinCondition::On(cond)) => format!("{} {} ON {}", kind, table, self.value(cond)),
            Some(JoinCondition::Using(cols)) => {
                format!("{} {} USING ({})", kind, table, self.ident_list(cols))
            }
            Some(JoinCondition::Natural) => format!("NATURAL {} {}", kind, table),
            None => format!("{} {}", kind, table),
        }
    }

    fn values_list(&mut self, values: &[ValueComponent]) -> String {
        values
            .iter()
            .map(|v| self.value(v))
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Operand of `parent`, parenthesized when it would otherwise bind to
    /// a neighbouring operator. Comparisons do not chain.
    fn binary_operand(
        &mut self,
        child: &ValueComponent,
        parent: BinaryOperator,
        right: bool,
    ) -> String {
        let rendered = self.value(child);
        let ValueComponent::Binary { op, .. } = child else {
            return rendered;
        };
        let (inner, outer) = (precedence(*op), precedence(parent));
        let associative = matches!(
            parent,
            BinaryOperator::And
                | BinaryOperator::Or
                | BinaryOperator::Plus
                | BinaryOperator::Multiply
                | BinaryOperator::Concat
        );
        let comparison = outer == precedence(BinaryOperator::Eq);
        let wrap = inner < outer || (inner == outer && (comparison || (right && !associative)));
        if wrap {
            format!("({})", rendered)
        } else {
            rendered
        }
    }

    pub(crate) fn value(&mut self, value: &ValueComponent) -> String {
        match value {
            ValueComponent::Column { qualifier, name } => match qualifier {
                Some(q) => format!("{}.{}", self.ident(q), self.ident(name)),
                None => self.ident(name),
            },
            ValueComponent::Literal(lit) => literal(lit),
            ValueComponent::Parameter { name, value } => {
                self.params.register(name, value.as_ref())
            }
            ValueComponent::Function {
                name,
                args,
                distinct,
                filter,
                over,
            } => {
                let distinct = if *distinct { "DISTINCT " } else { "" };
                let mut s = format!("{}({}{})", name, distinct, self.values_list(args));
                if let Some(f) = filter {
                    s.push_str(&format!(" FILTER (WHERE {})", self.value(f)));
                }
                if let Some(w) = over {
                    match &w.name {
                        Some(window) => s.push_str(&format!(" OVER {}", self.ident(window))),
                        None => s.push_str(&format!(" OVER ({})", self.window_spec(w))),
                    }
                }
                s
            }
            ValueComponent::Binary { left, op, right } => {
                let left = self.binary_operand(left, *op, false);
                let right = self.binary_operand(right, *op, true);
                format!("{} {} {}", left, binary_operator(*op), right)
            }
            ValueComponent::Unary { op, operand } => match op {
                UnaryOperator::Not => format!("NOT {}", self.value(operand)),
                UnaryOperator::Minus => format!("-{}", self.value(operand)),
                UnaryOperator::Plus => format!("+{}", self.value(operand)),
            },
            ValueComponent::Tuple(items) => format!("({})", self.values_list(items)),
            ValueComponent::InList {
                expr,
                list,
                negated,
            } => {
                let not = if *negated { "NOT " } else { "" };
                let expr = self.value(expr);
                format!("{} {}IN ({})", expr, not, self.values_list(list))
            }
            ValueComponent::Wildcard { qualifier } => match qualifier {
                Some(q) => format!("{}.*", self.ident(q)),
                None => "*".to_string(),
            },
            ValueComponent::Case {
                operand,
                branches,
                else_value,
            } => {
                let mut s = String::from("CASE");
                if let Some(op) = operand {
                    s.push_str(&format!(" {}", self.value(op)));
                }
                for (when, then) in branches {
                    let when = self.value(when);
                    let then = self.value(then);
                    s.push_str(&format!(" WHEN {} THEN {}", when, then));
                }
                if let Some(e) = else_value {
                    s.push_str(&format!(" ELSE {}", self.value(e)));
                }
                s.push_str(" END");
                s
            }
            ValueComponent::Subquery(q) => self.nested(q),
            ValueComponent::Exists(q) => format!("EXISTS {}", self.nested(q)),
            ValueComponent::InSubquery {
                expr,
                query,
                negated,
            } => {
                let not = if *negated { "NOT " } else { "" };
                let expr = self.value(expr);
                format!("{} {}IN {}", expr, not, self.nested(query))
            }
            ValueComponent::Between {
                expr,
                low,
                high,
                negated,
            } => {
                let not = if *negated { "NOT " } else { "" };
                let expr = self.value(expr);
                let low = self.value(low);
                let high = self.value(high);
                format!("{} {}BETWEEN {} AND {}", expr, not, low, high)
            }
            ValueComponent::IsNull { expr, negated } => {
                let not = if *negated { " NOT" } else { "" };
                format!("{} IS{} NULL", self.value(expr), not)
            }
            ValueComponent::Cast {
                expr,
                data_type,
                shorthand,
            } => {
                if *shorthand {
                    format!("{}::{}", self.value(expr), data_type)
                } else {
                    format!("CAST({} AS {})", self.value(expr), data_type)
                }
            }
            ValueComponent::Array(items) => format!("ARRAY[{}]", self.values_list(items)),
            ValueComponent::Nested(inner) => format!("({})", self.value(inner)),
            ValueComponent::Raw(sql) => sql.clone(),
        }
    }

    fn window_spec(&mut self, spec: &WindowSpec) -> String {
        let mut parts = Vec::new();
        if !spec.partition_by.is_empty() {
            parts.push(format!(
                "PARTITION BY {}",
                self.values_list(&spec.partition_by)
            ));
        }
        if !spec.order_by.is_empty() {
            let orders: Vec<String> = spec.order_by.iter().map(|o| self.order_by(o)).collect();
            parts.push(format!("ORDER BY {}", orders.join(", ")));
        }
        if let Some(frame) = &spec.frame {
            parts.push(window_frame(frame));
        }
        parts.join(" ")
    }

    fn order_by(&mut self, order: &OrderByItem) -> String {
        let mut s = self.value(&order.value);
        match order.asc {
            Some(true) => s.push_str(" ASC"),
            Some(false) => s.push_str(" DESC"),
            None => {}
        }
        match order.nulls_first {
            Some(true) => s.push_str(" NULLS FIRST"),
            Some(false) => s.push_str(" NULLS LAST"),
            None => {}
        }
        s
    }

    fn returning(&mut self, items: &[SelectItem]) -> Option<String> {
        if items.is_empty() {
            return None;
        }
        let items: Vec<String> = items.iter().map(|i| self.select_item(i)).collect();
        Some(format!("RETURNING {}", items.join(", ")))
    }

    fn insert(&mut self, insert: &InsertStatement) -> String {
        let mut head = format!(
            "INSERT INTO {}",
            self.qualified(insert.table.schema.as_deref(), &insert.table.name)
        );
        if !insert.columns.is_empty() {
            head.push_str(&format!(" ({})", self.ident_list(&insert.columns)));
        }
        let mut parts = vec![head];
        parts.push(match &insert.source {
            InsertSource::Values(rows) => self.values(rows),
            InsertSource::Query(q) => self.statement(q),
        });
        parts.extend(self.returning(&insert.returning));
        parts.join(&self.sep())
    }

    fn create_table(&mut self, create: &CreateTableStatement) -> String {
        let mut s = String::from("CREATE ");
        if create.temporary {
            s.push_str("TEMPORARY ");
        }
        s.push_str("TABLE ");
        if create.if_not_exists {
            s.push_str("IF NOT EXISTS ");
        }
        s.push_str(&self.qualified(create.name.schema.as_deref(), &create.name.name));
        if !create.columns.is_empty() {
            let cols: Vec<String> = create
                .columns
                .iter()
                .map(|c| format!("{} {}", self.ident(&c.name), c.data_type))
                .collect();
            s.push_str(&format!(" ({})", cols.join(", ")));
        }
        if let Some(q) = &create.as_query {
            let body = self.statement(q);
            s.push_str(&format!(" AS{}{}", self.sep(), body));
        }
        s
    }

    fn update(&mut self, update: &UpdateStatement) -> String {
        let mut parts = Vec::new();
        if let Some(with) = &update.with {
            parts.push(self.with_clause(with));
        }
        parts.push(format!("UPDATE {}", self.table_source(&update.target)));
        let sets: Vec<String> = update
            .assignments
            .iter()
            .map(|a| {
                let value = self.value(&a.value);
                format!("{} = {}", self.ident(&a.column), value)
            })
            .collect();
        parts.push(format!("SET {}", sets.join(", ")));
        if !update.from.is_empty() {
            let from: Vec<String> = update.from.iter().map(|t| self.table_source(t)).collect();
            parts.push(format!("FROM {}", from.join(", ")));
        }
        if let Some(filter) = &update.filter {
            parts.push(format!("WHERE {}", self.value(filter)));
        }
        parts.extend(self.returning(&update.returning));
        parts.join(&self.sep())
    }

    fn delete(&mut self, delete: &DeleteStatement) -> String {
        let mut parts = Vec::new();
        if let Some(with) = &delete.with {
            parts.push(self.with_clause(with));
        }
        parts.push(format!("DELETE FROM {}", self.table_source(&delete.target)));
        if !delete.using.is_empty() {
            let using: Vec<String> = delete.using.iter().map(|t| self.table_source(t)).collect();
            parts.push(format!("USING {}", using.join(", ")));
        }
        if let Some(filter) = &delete.filter {
            parts.push(format!("WHERE {}", self.value(filter)));
        }
        parts.extend(self.returning(&delete.returning));
        parts.join(&self.sep())
    }
}

fn literal(lit: &Literal) -> String {
    match lit {
        Literal::Null => "NULL".to_string(),
        Literal::Boolean(true) => "TRUE".to_string(),
        Literal::Boolean(false) => "FALSE".to_string(),
        Literal::Number(n) => n.clone(),
        Literal::String(s) => format!("'{}'", s.replace('\'', "''")),
    }
}

/// Binding strength, loosest first.
fn precedence(op: BinaryOperator) -> u8 {
    match op {
        BinaryOperator::Or => 1,
        BinaryOperator::And => 2,
        BinaryOperator::Eq
        | BinaryOperator::NotEq
        | BinaryOperator::Lt
        | BinaryOperator::LtEq
        | BinaryOperator::Gt
        | BinaryOperator::GtEq => 4,
        BinaryOperator::Like
        | BinaryOperator::ILike
        | BinaryOperator::NotLike
        | BinaryOperator::NotILike => 5,
        BinaryOperator::Concat => 6,
        BinaryOperator::Plus | BinaryOperator::Minus => 7,
        BinaryOperator::Multiply | BinaryOperator::Divide | BinaryOperator::Modulo => 8,
    }
}

fn binary_operator(op: BinaryOperator) -> &'static str {
    match op {
        BinaryOperator::Eq => "=",
        BinaryOperator::NotEq => "<>",
        BinaryOperator::Lt => "<",
        BinaryOperator::LtEq => "<=",
        BinaryOperator::Gt => ">",
        BinaryOperator::GtEq => ">=",
        BinaryOperator::And => "AND",
        BinaryOperator::Or => "OR",
        BinaryOperator::Plus => "+",
        BinaryOperator::Minus => "-",
        BinaryOperator::Multiply => "*",
        BinaryOperator::Divide => "/",
        BinaryOperator::Modulo => "%",
        BinaryOperator::Like => "LIKE",
        BinaryOperator::ILike => "ILIKE",
        BinaryOperator::NotLike => "NOT LIKE",
        BinaryOperator::NotILike => "NOT ILIKE",
        BinaryOperator::Concat => "||",
    }
}

fn window_frame(frame: &WindowFrame) -> String {
    let mode = match frame.mode {
        WindowFrameMode::Rows => "ROWS",
        WindowFrameMode::Range => "RANGE",
        WindowFrameMode::Groups => "GROUPS",
    };
    match &frame.end {
        Some(end) => format!(
            "{} BETWEEN {} AND {}",
            mode,
            frame_bound(&frame.start),
            frame_bound(end)
        ),
        None => format!("{} {}", mode, frame_bound(&frame.start)),
    }
}

fn frame_bound(bound: &WindowFrameBound) -> String {
    match bound {
        WindowFrameBound::CurrentRow => "CURRENT ROW".to_string(),
        WindowFrameBound::Preceding(None) => "UNBOUNDED PRECEDING".to_string(),
        WindowFrameBound::Preceding(Some(n)) => format!("{} PRECEDING", n),
        WindowFrameBound::Following(None) => "UNBOUNDED FOLLOWING".to_string(),
        WindowFrameBound::Following(Some(n)) => format!("{} FOLLOWING", n),
    }
}
