//! Source side of a capture cycle: the poll query and the connector that
//! runs it.

pub mod connector;
pub mod dialect;
pub mod error;
pub mod query;
pub mod sql;

pub use connector::SourceConnector;
pub use dialect::Dialect;
pub use error::SourceError;
pub use query::{build_query, SourceQuery, SourceQueryBuilder, DEFAULT_PAGE_SIZE};
pub use sql::SqlConnector;
