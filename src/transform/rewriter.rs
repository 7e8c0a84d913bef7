/// Rewrite pipeline.
///
/// A pass takes a statement and returns a rewritten one. Passes are pure:
/// the same input always yields the same output, which keeps them
/// composable and testable in isolation.
use crate::ast::types::*;
use crate::ast::visitor::walk_values_mut;
use crate::error::SqlResult;

/// One statement-to-statement rewrite.
///
/// # Example
///
/// ```ignore
/// struct StripLimit;
///
/// impl RewritePass for StripLimit {
///     fn name(&self) -> &str { "strip_limit" }
///     fn rewrite(&self, stmt: Statement) -> SqlResult<Statement> {
///         // drop LIMIT from the root select
///     }
/// }
/// ```
pub trait RewritePass: Send + Sync {
    /// Unique name identifying this pass.
    fn name(&self) -> &str;

    fn description(&self) -> &str {
        ""
    }

    /// Returns the statement unchanged when the pass does not apply.
    fn rewrite(&self, stmt: Statement) -> SqlResult<Statement>;
}

/// Runs registered passes in insertion order.
#[derive(Default)]
pub struct Rewriter {
    passes: Vec<Box<dyn RewritePass>>,
}

impl Rewriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_defaults() -> Self {
        let mut rewriter = Self::new();
        rewriter.add_pass(Box::new(SimplifyNesting));
        rewriter
    }

    pub fn add_pass(&mut self, pass: Box<dyn RewritePass>) {
        self.passes.push(pass);
    }

    /// Builder-style variant of [`add_pass`](Self::add_pass).
    pub fn pass(mut self, pass: impl RewritePass + 'static) -> Self {
        self.passes.push(Box::new(pass));
        self
    }

    pub fn rewrite(&self, stmt: Statement) -> SqlResult<Statement> {
        let mut current = stmt;
        for pass in &self.passes {
            tracing::trace!(pass = pass.name(), "running rewrite pass");
            current = pass.rewrite(current)?;
        }
        Ok(current)
    }

    pub fn pass_names(&self) -> Vec<&str> {
        self.passes.iter().map(|p| p.name()).collect()
    }
}

/// Drops parentheses that cannot change meaning: `((x))` and parentheses
/// around a bare column, literal, parameter or wildcard.
#[derive(Debug, Default, Clone, Copy)]
pub struct SimplifyNesting;

impl RewritePass for SimplifyNesting {
    fn name(&self) -> &str {
        "simplify_nesting"
    }

    fn description(&self) -> &str {
        "Removes unnecessary parenthesized expressions"
    }

    fn rewrite(&self, mut stmt: Statement) -> SqlResult<Statement> {
        walk_values_mut(&mut stmt, &mut simplify);
        Ok(stmt)
    }
}

fn simplify(value: &mut ValueComponent) {
    while let ValueComponent::Nested(inner) = value {
        let removable = match inner.as_ref() {
            ValueComponent::Column { .. }
            | ValueComponent::Literal(_)
            | ValueComponent::Parameter { .. }
            | ValueComponent::Wildcard { .. } => true,
            // Keep the outer pair only
            ValueComponent::Nested(_) => true,
            _ => false,
        };
        if !removable {
            return;
        }
        let inner = std::mem::replace(inner.as_mut(), ValueComponent::null());
        *value = inner;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::parser::parse;
    use crate::format::{FormatOptions, SqlFormatter};
    use crate::transform::QueryNormalizer;

    fn render(stmt: &Statement) -> String {
        SqlFormatter::new(FormatOptions {
            quote_identifiers: false,
            ..Default::default()
        })
        .format(stmt)
        .unwrap()
        .sql
    }

    #[test]
    fn test_empty_pipeline_is_identity() {
        let stmt = parse("SELECT ((a)) FROM t").unwrap();
        assert_eq!(Rewriter::new().rewrite(stmt.clone()).unwrap(), stmt);
    }

    #[test]
    fn test_default_pass_names() {
        assert_eq!(Rewriter::with_defaults().pass_names(), vec!["simplify_nesting"]);
    }

    #[test]
    fn test_simplify_nesting() {
        let stmt = parse("SELECT ((a)), (b + 1) FROM t WHERE ((x = 1)) AND (y)").unwrap();
        let out = Rewriter::with_defaults().rewrite(stmt).unwrap();
        assert_eq!(render(&out), "SELECT a, (b + 1) FROM t WHERE (x = 1) AND y");
    }

    #[test]
    fn test_passes_run_in_order() {
        let rewriter = Rewriter::new()
            .pass(QueryNormalizer::new())
            .pass(SimplifyNesting);
        assert_eq!(rewriter.pass_names(), vec!["normalize", "simplify_nesting"]);
        let out = rewriter
            .rewrite(parse("SELECT (a) FROM t UNION SELECT a FROM u").unwrap())
            .unwrap();
        assert_eq!(
            render(&out),
            "SELECT * FROM (SELECT a FROM t UNION SELECT a FROM u) AS bq"
        );
    }
}
