//! Read-only analyses over a statement tree.
//!
//! Every collector is a [`Visitor`](crate::ast::Visitor) driven by the shared
//! walker and resets its state on each call.
pub mod cte;
pub mod params;
pub mod resolver;
pub mod schema;
pub mod select_value;
pub mod selectable;
pub mod table_source;
pub mod upstream;

pub use cte::{CteCollector, CteDependency, CteDependencyAnalyzer};
pub use params::{ParameterCollector, ParameterReference};
pub use resolver::TableColumnResolver;
pub use schema::{SchemaCollector, TableSchema};
pub use select_value::{SelectValue, SelectValueCollector};
pub use selectable::{SelectableColumn, SelectableColumnCollector};
pub use table_source::{TableReference, TableSourceCollector};
pub use upstream::UpstreamSelectQueryFinder;
