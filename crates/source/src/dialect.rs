//! SQL dialect differences that matter to the poll query.

use delta_core::SourceVendor;

use crate::error::SourceError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    Postgres,
    MySql,
}

impl Dialect {
    pub fn for_vendor(vendor: &SourceVendor) -> Result<Self, SourceError> {
        match vendor {
            SourceVendor::Postgres => Ok(Dialect::Postgres),
            SourceVendor::MySql => Ok(Dialect::MySql),
            SourceVendor::Unsupported(v) => Err(SourceError::UnsupportedVendor(v.clone())),
        }
    }

    pub fn quote_identifier(&self, name: &str) -> String {
        match self {
            Dialect::Postgres => format!("\"{}\"", name.replace('"', "\"\"")),
            Dialect::MySql => format!("`{}`", name.replace('`', "``")),
        }
    }

    /// Bind placeholder for the 1-based parameter `index`.
    pub fn placeholder(&self, index: usize) -> String {
        match self {
            Dialect::Postgres => format!("${}", index),
            Dialect::MySql => "?".to_string(),
        }
    }

    /// Optionally schema-qualified table reference.
    pub fn table_ref(&self, schema: Option<&str>, table: &str) -> String {
        match schema {
            Some(s) => format!("{}.{}", self.quote_identifier(s), self.quote_identifier(table)),
            None => self.quote_identifier(table),
        }
    }
}
