//! Lexical scopes used while walking a statement.
//!
//! A frame is pushed for every WITH clause, every query's FROM list, every
//! CTE body and every subquery. Name lookups search frames innermost-first,
//! which gives the resolution order: nearest subquery alias or CTE, then
//! outer CTEs, then the physical table.

use super::types::{CommonTable, SimpleSelect, Statement, TableSource, WithClause};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeKind {
    /// CTEs declared by a WITH clause.
    With,
    /// Body of one common table.
    CommonTable,
    /// FROM/JOIN sources of a query (or the target of UPDATE/DELETE).
    Query,
    /// Derived table, scalar subquery, EXISTS or IN body.
    Subquery,
}

#[derive(Debug, Clone)]
struct ScopeFrame<'a> {
    kind: ScopeKind,
    name: Option<&'a str>,
    ctes: &'a [CommonTable],
    visible: usize,
    sources: Vec<&'a TableSource>,
}

impl<'a> ScopeFrame<'a> {
    fn new(kind: ScopeKind) -> Self {
        Self {
            kind,
            name: None,
            ctes: &[],
            visible: 0,
            sources: Vec::new(),
        }
    }
}

/// What a FROM entry actually refers to once scope is taken into account.
#[derive(Debug, Clone, Copy)]
pub enum Relation<'a> {
    Physical {
        schema: Option<&'a str>,
        name: &'a str,
    },
    Cte(&'a CommonTable),
    Subquery {
        query: &'a Statement,
        columns: &'a [String],
    },
    Function,
}

/// A FROM entry matched by qualifier lookup.
#[derive(Debug, Clone, Copy)]
pub struct ResolvedSource<'a> {
    pub source: &'a TableSource,
    pub relation: Relation<'a>,
    /// Number of query frames crossed; 0 means the innermost query.
    pub distance: usize,
}

#[derive(Debug, Clone, Default)]
pub struct ScopeStack<'a> {
    frames: Vec<ScopeFrame<'a>>,
}

impl<'a> ScopeStack<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    pub fn current_kind(&self) -> Option<ScopeKind> {
        self.frames.last().map(|f| f.kind)
    }

    /// How many CTE bodies enclose the current position.
    pub fn cte_nesting(&self) -> usize {
        self.frames
            .iter()
            .filter(|f| f.kind == ScopeKind::CommonTable)
            .count()
    }

    /// Alias or name of the nearest enclosing scope of `kind`.
    pub fn enclosing_name(&self, kind: ScopeKind) -> Option<&'a str> {
        self.frames
            .iter()
            .rev()
            .find(|f| f.kind == kind)
            .and_then(|f| f.name)
    }

    /// True while no subquery, CTE body or outer query encloses the
    /// innermost query frame.
    pub fn at_root_query(&self) -> bool {
        self.frames
            .iter()
            .filter(|f| f.kind != ScopeKind::With)
            .count()
            == 1
            && self.current_kind() == Some(ScopeKind::Query)
    }

    /// Push a WITH clause. No table is visible until `set_visible_ctes`.
    pub fn push_with(&mut self, with: &'a WithClause) {
        let mut frame = ScopeFrame::new(ScopeKind::With);
        frame.ctes = with.tables.as_slice();
        self.frames.push(frame);
    }

    /// Make the first `count` CTEs of the innermost WITH frame visible.
    pub fn set_visible_ctes(&mut self, count: usize) {
        if let Some(frame) = self
            .frames
            .iter_mut()
            .rev()
            .find(|f| f.kind == ScopeKind::With)
        {
            frame.visible = count.min(frame.ctes.len());
        }
    }

    pub fn push_query(&mut self, select: &'a SimpleSelect) {
        self.push_sources(select.sources().collect());
    }

    pub fn push_sources(&mut self, sources: Vec<&'a TableSource>) {
        let mut frame = ScopeFrame::new(ScopeKind::Query);
        frame.sources = sources;
        self.frames.push(frame);
    }

    pub fn push_common_table(&mut self, cte: &'a CommonTable) {
        let mut frame = ScopeFrame::new(ScopeKind::CommonTable);
        frame.name = Some(cte.name.as_str());
        self.frames.push(frame);
    }

    pub fn push_subquery(&mut self, alias: Option<&'a str>) {
        let mut frame = ScopeFrame::new(ScopeKind::Subquery);
        frame.name = alias;
        self.frames.push(frame);
    }

    pub fn pop(&mut self) {
        self.frames.pop();
    }

    /// Innermost visible CTE called `name`.
    pub fn resolve_cte(&self, name: &str) -> Option<&'a CommonTable> {
        self.resolve_cte_below(name, self.frames.len())
    }

    fn resolve_cte_below(&self, name: &str, limit: usize) -> Option<&'a CommonTable> {
        self.frames[..limit]
            .iter()
            .rev()
            .filter(|f| f.kind == ScopeKind::With)
            .find_map(|f| {
                let ctes: &'a [CommonTable] = f.ctes;
                ctes[..f.visible]
                    .iter()
                    .find(|c| c.name.eq_ignore_ascii_case(name))
            })
    }

    /// Classify a FROM entry as seen from the current position.
    pub fn resolve_relation(&self, source: &'a TableSource) -> Relation<'a> {
        self.relation_below(source, self.frames.len())
    }

    fn relation_below(&self, source: &'a TableSource, limit: usize) -> Relation<'a> {
        match source {
            TableSource::Table {
                schema: None, name, ..
            } => match self.resolve_cte_below(name, limit) {
                Some(cte) => Relation::Cte(cte),
                None => Relation::Physical { schema: None, name },
            },
            TableSource::Table {
                schema: Some(schema),
                name,
                ..
            } => Relation::Physical {
                schema: Some(schema.as_str()),
                name,
            },
            TableSource::Subquery { query, columns, .. } => Relation::Subquery { query, columns },
            TableSource::Function { .. } => Relation::Function,
        }
    }

    /// Find the FROM entry a column qualifier refers to, searching the
    /// innermost query first and then enclosing (correlated) queries.
    pub fn resolve_qualifier(&self, qualifier: &str) -> Option<ResolvedSource<'a>> {
        let mut distance = 0;
        for (idx, frame) in self.frames.iter().enumerate().rev() {
            if frame.kind != ScopeKind::Query {
                continue;
            }
            if let Some(source) = frame
                .sources
                .iter()
                .copied()
                .find(|s| qualifier_matches(s, qualifier))
            {
                return Some(ResolvedSource {
                    source,
                    relation: self.relation_below(source, idx),
                    distance,
                });
            }
            distance += 1;
        }
        None
    }

    /// Sources of the innermost query frame, resolved.
    pub fn current_sources(&self) -> Vec<ResolvedSource<'a>> {
        let Some((idx, frame)) = self
            .frames
            .iter()
            .enumerate()
            .rev()
            .find(|(_, f)| f.kind == ScopeKind::Query)
        else {
            return Vec::new();
        };
        frame
            .sources
            .iter()
            .map(|&source| ResolvedSource {
                source,
                relation: self.relation_below(source, idx),
                distance: 0,
            })
            .collect()
    }
}

/// Whether `qualifier` names `source`: its alias when it has one, otherwise
/// its table name with or without schema.
pub(crate) fn qualifier_matches(source: &TableSource, qualifier: &str) -> bool {
    match source {
        TableSource::Table {
            schema,
            name,
            alias: None,
        } => {
            name.eq_ignore_ascii_case(qualifier)
                || schema
                    .as_ref()
                    .is_some_and(|s| format!("{}.{}", s, name).eq_ignore_ascii_case(qualifier))
        }
        other => other.reference_name().eq_ignore_ascii_case(qualifier),
    }
}
