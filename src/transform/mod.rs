//! Statement-to-statement rewrites.
//!
//! ```text
//! Statement ──► builder / normalizer ──► param_injector ──► fixture ──► Statement
//!                                 └── json_projection ──┘
//! ```
//!
//! Every rewrite consumes its input and returns a new tree. Passes that fit
//! the [`RewritePass`] shape can be chained through a [`Rewriter`].
pub mod builder;
pub mod fixture;
pub mod json_projection;
pub mod normalizer;
pub mod param_injector;
pub mod rewriter;

pub use builder::{to_binary_query, to_create_table_query, to_insert_query, to_union, to_union_all};
pub use fixture::{FixtureFile, FixtureInjector, FixturePass, FixtureRow, FixtureTable};
pub use json_projection::{JsonEntity, JsonMapping, JsonProjectionBuilder, ResultFormat};
pub use normalizer::QueryNormalizer;
pub use param_injector::{Condition, ConditionMap, Operator, SqlParamInjector};
pub use rewriter::{RewritePass, Rewriter, SimplifyNesting};
