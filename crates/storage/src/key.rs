use std::fmt;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use delta_core::OutputFormat;

/// Location of one delivered batch object within its bucket.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ObjectKey(String);

impl ObjectKey {
    /// `{base_path}/{job_id}/{table}/{YYYYMMDDThhmmssZ}.{ext}`. The base path is
    /// trimmed of slashes and dropped entirely when empty.
    pub fn for_batch(
        base_path: &str,
        job_id: Uuid,
        table: &str,
        at: DateTime<Utc>,
        format: &OutputFormat,
    ) -> Self {
        let stamp = at.format("%Y%m%dT%H%M%SZ");
        let base = base_path.trim_matches('/');
        if base.is_empty() {
            Self(format!("{}/{}/{}.{}", job_id, table, stamp, format.extension()))
        } else {
            Self(format!(
                "{}/{}/{}/{}.{}",
                base,
                job_id,
                table,
                stamp,
                format.extension()
            ))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn to_path(&self) -> object_store::path::Path {
        object_store::path::Path::from(self.0.as_str())
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
