//! Depth-first traversal with scope tracking.
//!
//! `walk_statement` visits nodes in the order they appear in rendered SQL.
//! For a set operation the WITH clauses of every operand are entered before
//! any operand body, because the formatter hoists them ahead of the whole
//! operation and they are visible to every branch.
//!
//! Collectors implement [`Visitor`] and never descend the tree themselves.

use super::scope::{ScopeKind, ScopeStack};
use super::types::*;

/// Whether the walker should descend into the children of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Walk {
    Continue,
    SkipChildren,
}

/// Read-only visitor over a statement tree.
///
/// Every hook has a no-op default; implement only what you need.
pub trait Visitor<'a> {
    fn enter_scope(&mut self, _kind: ScopeKind, _scopes: &ScopeStack<'a>) {}

    fn leave_scope(&mut self, _kind: ScopeKind, _scopes: &ScopeStack<'a>) {}

    /// Called for every statement, the root included.
    fn visit_statement(&mut self, _stmt: &'a Statement, _scopes: &ScopeStack<'a>) -> Walk {
        Walk::Continue
    }

    /// Called once the query frame of `select` is in scope, before any of
    /// its clauses are walked.
    fn visit_select(&mut self, _select: &'a SimpleSelect, _scopes: &ScopeStack<'a>) {}

    fn visit_common_table(&mut self, _cte: &'a CommonTable, _scopes: &ScopeStack<'a>) -> Walk {
        Walk::Continue
    }

    /// Called after the body of `cte` has been walked.
    fn leave_common_table(&mut self, _cte: &'a CommonTable, _scopes: &ScopeStack<'a>) {}

    /// `SkipChildren` keeps the walker out of a subquery body.
    fn visit_table_source(&mut self, _source: &'a TableSource, _scopes: &ScopeStack<'a>) -> Walk {
        Walk::Continue
    }

    fn visit_value(&mut self, _value: &'a ValueComponent, _scopes: &ScopeStack<'a>) -> Walk {
        Walk::Continue
    }
}

/// Walk `stmt` depth-first, driving `visitor`.
pub fn walk_statement<'a, V: Visitor<'a>>(visitor: &mut V, stmt: &'a Statement) {
    let mut walker = Walker {
        visitor,
        scopes: ScopeStack::new(),
    };
    walker.statement(stmt);
}

struct Walker<'v, 'a, V> {
    visitor: &'v mut V,
    scopes: ScopeStack<'a>,
}

impl<'v, 'a, V: Visitor<'a>> Walker<'v, 'a, V> {
    fn enter(&mut self, kind: ScopeKind) {
        self.visitor.enter_scope(kind, &self.scopes);
    }

    fn leave(&mut self, kind: ScopeKind) {
        self.visitor.leave_scope(kind, &self.scopes);
        self.scopes.pop();
    }

    fn statement(&mut self, stmt: &'a Statement) {
        if self.visitor.visit_statement(stmt, &self.scopes) == Walk::SkipChildren {
            return;
        }
        match stmt {
            Statement::Select(s) => self.select(s, false),
            Statement::Binary(b) => self.binary(b),
            Statement::Values(v) => self.rows(&v.rows),
            Statement::Insert(i) => {
                match &i.source {
                    InsertSource::Values(rows) => self.rows(rows),
                    InsertSource::Query(q) => self.statement(q),
                }
                for item in &i.returning {
                    self.value(&item.value);
                }
            }
            Statement::CreateTable(c) => {
                if let Some(q) = &c.as_query {
                    self.statement(q);
                }
            }
            Statement::Update(u) => {
                let pushed = self.with_clause(u.with.as_ref());
                let mut sources = vec![&u.target];
                sources.extend(u.from.iter());
                self.scopes.push_sources(sources);
                self.enter(ScopeKind::Query);
                self.table_source(&u.target);
                for a in &u.assignments {
                    self.value(&a.value);
                }
                for source in &u.from {
                    self.table_source(source);
                }
                self.opt_value(u.filter.as_ref());
                for item in &u.returning {
                    self.value(&item.value);
                }
                self.leave(ScopeKind::Query);
                if pushed {
                    self.leave(ScopeKind::With);
                }
            }
            Statement::Delete(d) => {
                let pushed = self.with_clause(d.with.as_ref());
                let mut sources = vec![&d.target];
                sources.extend(d.using.iter());
                self.scopes.push_sources(sources);
                self.enter(ScopeKind::Query);
                self.table_source(&d.target);
                for source in &d.using {
                    self.table_source(source);
                }
                self.opt_value(d.filter.as_ref());
                for item in &d.returning {
                    self.value(&item.value);
                }
                self.leave(ScopeKind::Query);
                if pushed {
                    self.leave(ScopeKind::With);
                }
            }
        }
    }

    fn binary(&mut self, b: &'a BinarySelect) {
        let mut hoisted = Vec::new();
        collect_operand_withs(&b.left, &mut hoisted);
        collect_operand_withs(&b.right, &mut hoisted);
        for with in hoisted.iter().copied() {
            self.with_clause(Some(with));
        }

        self.operand(&b.left);
        self.operand(&b.right);
        for o in &b.order_by {
            self.value(&o.value);
        }
        self.opt_value(b.limit.as_ref());
        self.opt_value(b.offset.as_ref());

        for _ in &hoisted {
            self.leave(ScopeKind::With);
        }
    }

    /// Operand of a set operation whose WITH clause is already in scope.
    fn operand(&mut self, stmt: &'a Statement) {
        if self.visitor.visit_statement(stmt, &self.scopes) == Walk::SkipChildren {
            return;
        }
        match stmt {
            Statement::Select(s) => self.select(s, true),
            Statement::Binary(b) => {
                self.operand(&b.left);
                self.operand(&b.right);
                for o in &b.order_by {
                    self.value(&o.value);
                }
                self.opt_value(b.limit.as_ref());
                self.opt_value(b.offset.as_ref());
            }
            Statement::Values(v) => self.rows(&v.rows),
            other => self.statement(other),
        }
    }

    /// Push and walk a WITH clause. Returns whether a frame was pushed; the
    /// caller leaves it once the owning query is done.
    fn with_clause(&mut self, with: Option<&'a WithClause>) -> bool {
        let Some(with) = with else {
            return false;
        };
        self.scopes.push_with(with);
        self.enter(ScopeKind::With);
        let total = with.tables.len();
        for (idx, cte) in with.tables.iter().enumerate() {
            self.scopes
                .set_visible_ctes(if with.recursive { total } else { idx });
            if self.visitor.visit_common_table(cte, &self.scopes) == Walk::Continue {
                self.scopes.push_common_table(cte);
                self.enter(ScopeKind::CommonTable);
                self.statement(&cte.body);
                self.leave(ScopeKind::CommonTable);
            }
            self.visitor.leave_common_table(cte, &self.scopes);
        }
        self.scopes.set_visible_ctes(total);
        true
    }

    fn select(&mut self, s: &'a SimpleSelect, with_in_scope: bool) {
        let pushed = !with_in_scope && self.with_clause(s.with.as_ref());

        self.scopes.push_query(s);
        self.enter(ScopeKind::Query);
        self.visitor.visit_select(s, &self.scopes);

        for item in &s.items {
            self.value(&item.value);
        }
        for source in &s.from {
            self.table_source(source);
        }
        for join in &s.joins {
            self.table_source(&join.source);
            if let Some(JoinCondition::On(cond)) = &join.condition {
                self.value(cond);
            }
        }
        self.opt_value(s.filter.as_ref());
        for g in &s.group_by {
            self.value(g);
        }
        self.opt_value(s.having.as_ref());
        for o in &s.order_by {
            self.value(&o.value);
        }
        self.opt_value(s.limit.as_ref());
        self.opt_value(s.offset.as_ref());

        self.leave(ScopeKind::Query);
        if pushed {
            self.leave(ScopeKind::With);
        }
    }

    fn table_source(&mut self, source: &'a TableSource) {
        if self.visitor.visit_table_source(source, &self.scopes) == Walk::SkipChildren {
            return;
        }
        match source {
            TableSource::Table { .. } => {}
            TableSource::Subquery { query, alias, .. } => {
                self.subquery(Some(alias.as_str()), query)
            }
            TableSource::Function { args, .. } => {
                for a in args {
                    self.value(a);
                }
            }
        }
    }

    fn subquery(&mut self, alias: Option<&'a str>, query: &'a Statement) {
        self.scopes.push_subquery(alias);
        self.enter(ScopeKind::Subquery);
        self.statement(query);
        self.leave(ScopeKind::Subquery);
    }

    fn rows(&mut self, rows: &'a [Vec<ValueComponent>]) {
        for row in rows {
            for v in row {
                self.value(v);
            }
        }
    }

    fn opt_value(&mut self, value: Option<&'a ValueComponent>) {
        if let Some(v) = value {
            self.value(v);
        }
    }

    fn value(&mut self, value: &'a ValueComponent) {
        if self.visitor.visit_value(value, &self.scopes) == Walk::SkipChildren {
            return;
        }
        match value {
            ValueComponent::Column { .. }
            | ValueComponent::Literal(_)
            | ValueComponent::Parameter { .. }
            | ValueComponent::Wildcard { .. }
            | ValueComponent::Raw(_) => {}
            ValueComponent::Function {
                args, filter, over, ..
            } => {
                for a in args {
                    self.value(a);
                }
                if let Some(f) = filter {
                    self.value(f);
                }
                if let Some(w) = over {
                    for p in &w.partition_by {
                        self.value(p);
                    }
                    for o in &w.order_by {
                        self.value(&o.value);
                    }
                }
            }
            ValueComponent::Binary { left, right, .. } => {
                self.value(left);
                self.value(right);
            }
            ValueComponent::Unary { operand, .. } => self.value(operand),
            ValueComponent::Tuple(items) | ValueComponent::Array(items) => {
                for i in items {
                    self.value(i);
                }
            }
            ValueComponent::InList { expr, list, .. } => {
                self.value(expr);
                for i in list {
                    self.value(i);
                }
            }
            ValueComponent::Case {
                operand,
                branches,
                else_value,
            } => {
                if let Some(o) = operand {
                    self.value(o);
                }
                for (when, then) in branches {
                    self.value(when);
                    self.value(then);
                }
                if let Some(e) = else_value {
                    self.value(e);
                }
            }
            ValueComponent::Subquery(q) | ValueComponent::Exists(q) => self.subquery(None, q),
            ValueComponent::InSubquery { expr, query, .. } => {
                self.value(expr);
                self.subquery(None, query);
            }
            ValueComponent::Between {
                expr, low, high, ..
            } => {
                self.value(expr);
                self.value(low);
                self.value(high);
            }
            ValueComponent::IsNull { expr, .. }
            | ValueComponent::Cast { expr, .. }
            | ValueComponent::Nested(expr) => self.value(expr),
        }
    }
}

/// WITH clauses owned by the leaf selects of a set-operation chain, left to
/// right. Subquery bodies are not searched.
pub fn collect_operand_withs<'a>(stmt: &'a Statement, out: &mut Vec<&'a WithClause>) {
    match stmt {
        Statement::Select(s) => out.extend(s.with.as_ref()),
        Statement::Binary(b) => {
            collect_operand_withs(&b.left, out);
            collect_operand_withs(&b.right, out);
        }
        _ => {}
    }
}

/// Apply `f` to every value expression in `stmt`, parents before children.
pub fn walk_values_mut(stmt: &mut Statement, f: &mut dyn FnMut(&mut ValueComponent)) {
    match stmt {
        Statement::Select(s) => select_values_mut(s, f),
        Statement::Binary(b) => {
            walk_values_mut(&mut b.left, f);
            walk_values_mut(&mut b.right, f);
            for o in &mut b.order_by {
                value_mut(&mut o.value, f);
            }
            for v in b.limit.iter_mut().chain(b.offset.iter_mut()) {
                value_mut(v, f);
            }
        }
        Statement::Values(v) => rows_mut(&mut v.rows, f),
        Statement::Insert(i) => {
            match &mut i.source {
                InsertSource::Values(rows) => rows_mut(rows, f),
                InsertSource::Query(q) => walk_values_mut(q, f),
            }
            for item in &mut i.returning {
                value_mut(&mut item.value, f);
            }
        }
        Statement::CreateTable(c) => {
            if let Some(q) = &mut c.as_query {
                walk_values_mut(q, f);
            }
        }
        Statement::Update(u) => {
            with_values_mut(u.with.as_mut(), f);
            source_values_mut(&mut u.target, f);
            for s in &mut u.from {
                source_values_mut(s, f);
            }
            for a in &mut u.assignments {
                value_mut(&mut a.value, f);
            }
            if let Some(v) = &mut u.filter {
                value_mut(v, f);
            }
            for item in &mut u.returning {
                value_mut(&mut item.value, f);
            }
        }
        Statement::Delete(d) => {
            with_values_mut(d.with.as_mut(), f);
            for s in &mut d.using {
                source_values_mut(s, f);
            }
            if let Some(v) = &mut d.filter {
                value_mut(v, f);
            }
            for item in &mut d.returning {
                value_mut(&mut item.value, f);
            }
        }
    }
}

fn with_values_mut(with: Option<&mut WithClause>, f: &mut dyn FnMut(&mut ValueComponent)) {
    if let Some(w) = with {
        for cte in &mut w.tables {
            walk_values_mut(&mut cte.body, f);
        }
    }
}

fn rows_mut(rows: &mut [Vec<ValueComponent>], f: &mut dyn FnMut(&mut ValueComponent)) {
    for v in rows.iter_mut().flatten() {
        value_mut(v, f);
    }
}

fn select_values_mut(s: &mut SimpleSelect, f: &mut dyn FnMut(&mut ValueComponent)) {
    with_values_mut(s.with.as_mut(), f);
    for item in &mut s.items {
        value_mut(&mut item.value, f);
    }
    for source in &mut s.from {
        source_values_mut(source, f);
    }
    for join in &mut s.joins {
        source_values_mut(&mut join.source, f);
        if let Some(JoinCondition::On(cond)) = &mut join.condition {
            value_mut(cond, f);
        }
    }
    if let Some(v) = &mut s.filter {
        value_mut(v, f);
    }
    for g in &mut s.group_by {
        value_mut(g, f);
    }
    if let Some(v) = &mut s.having {
        value_mut(v, f);
    }
    for o in &mut s.order_by {
        value_mut(&mut o.value, f);
    }
    for v in s.limit.iter_mut().chain(s.offset.iter_mut()) {
        value_mut(v, f);
    }
}

fn source_values_mut(source: &mut TableSource, f: &mut dyn FnMut(&mut ValueComponent)) {
    match source {
        TableSource::Table { .. } => {}
        TableSource::Subquery { query, .. } => walk_values_mut(query, f),
        TableSource::Function { args, .. } => {
            for a in args {
                value_mut(a, f);
            }
        }
    }
}

fn value_mut(value: &mut ValueComponent, f: &mut dyn FnMut(&mut ValueComponent)) {
    f(value);
    value_children_mut(value, &mut |child| value_mut(child, f));
    match value {
        ValueComponent::Subquery(q)
        | ValueComponent::Exists(q)
        | ValueComponent::InSubquery { query: q, .. } => walk_values_mut(q, f),
        _ => {}
    }
}

/// Direct value children of `value`. Nested statements are not entered.
pub fn value_children_mut(value: &mut ValueComponent, f: &mut dyn FnMut(&mut ValueComponent)) {
    match value {
        ValueComponent::Column { .. }
        | ValueComponent::Literal(_)
        | ValueComponent::Parameter { .. }
        | ValueComponent::Wildcard { .. }
        | ValueComponent::Raw(_)
        | ValueComponent::Subquery(_)
        | ValueComponent::Exists(_) => {}
        ValueComponent::Function {
            args, filter, over, ..
        } => {
            args.iter_mut().for_each(&mut *f);
            if let Some(x) = filter {
                f(x.as_mut());
            }
            if let Some(w) = over {
                w.partition_by.iter_mut().for_each(&mut *f);
                for o in &mut w.order_by {
                    f(&mut o.value);
                }
            }
        }
        ValueComponent::Binary { left, right, .. } => {
            f(left.as_mut());
            f(right.as_mut());
        }
        ValueComponent::Tuple(items) | ValueComponent::Array(items) => {
            items.iter_mut().for_each(&mut *f);
        }
        ValueComponent::InList { expr, list, .. } => {
            f(expr.as_mut());
            list.iter_mut().for_each(&mut *f);
        }
        ValueComponent::Case {
            operand,
            branches,
            else_value,
        } => {
            if let Some(o) = operand {
                f(o.as_mut());
            }
            for (when, then) in branches {
                f(when);
                f(then);
            }
            if let Some(e) = else_value {
                f(e.as_mut());
            }
        }
        ValueComponent::Between {
            expr, low, high, ..
        } => {
            f(expr.as_mut());
            f(low.as_mut());
            f(high.as_mut());
        }
        ValueComponent::Unary { operand: expr, .. }
        | ValueComponent::InSubquery { expr, .. }
        | ValueComponent::IsNull { expr, .. }
        | ValueComponent::Cast { expr, .. }
        | ValueComponent::Nested(expr) => f(expr.as_mut()),
    }
}

/// Apply `f` to every FROM/JOIN entry in `stmt`, subquery bodies and value
/// subqueries included.
pub fn walk_table_sources_mut(stmt: &mut Statement, f: &mut dyn FnMut(&mut TableSource)) {
    sources_in_statement_mut(stmt, f);
    walk_values_mut(stmt, &mut |value| match value {
        ValueComponent::Subquery(q)
        | ValueComponent::Exists(q)
        | ValueComponent::InSubquery { query: q, .. } => sources_in_statement_mut(q, &mut *f),
        _ => {}
    });
}

fn sources_in_statement_mut(stmt: &mut Statement, f: &mut dyn FnMut(&mut TableSource)) {
    match stmt {
        Statement::Select(s) => {
            if let Some(w) = &mut s.with {
                for cte in &mut w.tables {
                    sources_in_statement_mut(&mut cte.body, f);
                }
            }
            for source in s.from.iter_mut().chain(s.joins.iter_mut().map(|j| &mut j.source)) {
                f(source);
                if let TableSource::Subquery { query, .. } = source {
                    sources_in_statement_mut(query, f);
                }
            }
        }
        Statement::Binary(b) => {
            sources_in_statement_mut(&mut b.left, f);
            sources_in_statement_mut(&mut b.right, f);
        }
        Statement::Values(_) => {}
        Statement::Insert(i) => {
            if let InsertSource::Query(q) = &mut i.source {
                sources_in_statement_mut(q, f);
            }
        }
        Statement::CreateTable(c) => {
            if let Some(q) = &mut c.as_query {
                sources_in_statement_mut(q, f);
            }
        }
        Statement::Update(u) => {
            if let Some(w) = &mut u.with {
                for cte in &mut w.tables {
                    sources_in_statement_mut(&mut cte.body, f);
                }
            }
            f(&mut u.target);
            for source in &mut u.from {
                f(source);
            }
        }
        Statement::Delete(d) => {
            if let Some(w) = &mut d.with {
                for cte in &mut w.tables {
                    sources_in_statement_mut(&mut cte.body, f);
                }
            }
            f(&mut d.target);
            for source in &mut d.using {
                f(source);
            }
        }
    }
}
