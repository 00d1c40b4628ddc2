use thiserror::Error;

/// Structural problems with a job definition. Reported synchronously to the
/// caller; the job is not created.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("malformed job definition: {0}")]
    Malformed(String),

    #[error("missing required field: {0}")]
    MissingField(&'static str),

    #[error("unsupported source vendor '{0}': expected postgres or mysql")]
    UnsupportedVendor(String),

    #[error("unsupported storage provider '{0}': expected s3, local or memory")]
    UnsupportedProvider(String),

    #[error("unsupported format '{0}': expected json or jsonl")]
    UnsupportedFormat(String),

    #[error("invalid identifier for {field}: '{value}'")]
    InvalidIdentifier { field: &'static str, value: String },

    #[error("{field} must be greater than zero")]
    NotPositive { field: &'static str },
}

/// Startup configuration errors. These are the only fatal errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("{key} must be greater than zero")]
    NotPositive { key: &'static str },

    #[error("invalid value for {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
}
