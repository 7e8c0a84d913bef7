pub mod ast;
pub mod collect;
pub mod config;
pub mod error;
pub mod format;
pub mod transform;

pub use ast::{parse, parse_many, Statement};
pub use error::{SqlError, SqlResult};
pub use format::{FormattedSql, SqlFormatter};
