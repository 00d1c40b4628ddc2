use async_trait::async_trait;

use delta_core::{Row, SourceConfig};

use crate::error::SourceError;
use crate::query::SourceQuery;

/// Executes a poll query against a source database and returns its rows in
/// result order.
#[async_trait]
pub trait SourceConnector: Send + Sync {
    async fn fetch(&self, source: &SourceConfig, query: &SourceQuery)
        -> Result<Vec<Row>, SourceError>;
}
