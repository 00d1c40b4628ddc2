use thiserror::Error;

/// Failures reading from a source database. All are scoped to one cycle
/// and retried on the next tick.
#[derive(Error, Debug)]
pub enum SourceError {
    /// Unreachable host, rejected credentials or connect timeout.
    #[error("source connection failed: {0}")]
    Connection(String),

    /// Malformed SQL, missing table or column, permissions, row decoding.
    #[error("source query failed: {0}")]
    Query(String),

    #[error("unsupported source vendor: {0}")]
    UnsupportedVendor(String),
}
