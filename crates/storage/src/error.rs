use thiserror::Error;

/// Failure to write a batch object. The caller must not commit the
/// watermark for a batch whose delivery failed.
#[derive(Error, Debug)]
pub enum DeliveryError {
    #[error("object store error: {0}")]
    ObjectStore(#[from] object_store::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("encoding error: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("unsupported storage provider: {0}")]
    UnsupportedProvider(String),

    #[error("unsupported output format: {0}")]
    UnsupportedFormat(String),
}
