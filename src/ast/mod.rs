/// Statement tree and traversal.
///
/// ```text
/// SQL text
///       ↓
/// Parser boundary      (parser.rs, sqlparser frontend)
///       ↓
/// Statement tree       (types.rs, value.rs)
///       ↓
/// Scoped traversal     (visitor.rs, scope.rs)
///       ↓
/// Collectors / rewrites / formatter (crate::collect, crate::transform, crate::format)
/// ```
pub mod parser;
pub mod scope;
pub mod types;
pub mod value;
pub mod visitor;

pub use parser::{parse, parse_many, parse_select, ParserDialect, SqlParser, StatementParser};
pub use scope::{Relation, ResolvedSource, ScopeKind, ScopeStack};
pub use types::*;
pub use value::SqlValue;
pub use visitor::{walk_statement, walk_table_sources_mut, walk_values_mut, Visitor, Walk};
