//! Bounded, ordered poll query for one capture cycle.

use delta_core::{CaptureConfig, Watermark};

use crate::dialect::Dialect;

/// Rows fetched per job per cycle unless configured otherwise.
pub const DEFAULT_PAGE_SIZE: u32 = 100;

/// SQL text plus positional parameters, in placeholder order.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceQuery {
    pub sql: String,
    pub params: Vec<Watermark>,
}

pub struct SourceQueryBuilder<'a> {
    capture: &'a CaptureConfig,
    dialect: Dialect,
    page_size: u32,
}

impl<'a> SourceQueryBuilder<'a> {
    pub fn new(capture: &'a CaptureConfig, dialect: Dialect) -> Self {
        Self {
            capture,
            dialect,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    pub fn page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size;
        self
    }

    /// Build the poll query for the given committed watermark.
    ///
    /// Without a watermark column there is no predicate and no ordering, so
    /// every cycle re-reads the leading page of the table.
    pub fn build_poll_query(&self, last_watermark: Option<&Watermark>) -> SourceQuery {
        let table = self
            .dialect
            .table_ref(self.capture.schema.as_deref(), &self.capture.table);
        let mut sql = format!("SELECT * FROM {}", table);
        let mut params = Vec::new();

        if let Some(column) = &self.capture.watermark_column {
            let column = self.dialect.quote_identifier(column);
            if let Some(w) = last_watermark {
                params.push(w.clone());
                sql.push_str(&format!(
                    " WHERE {} > {}",
                    column,
                    self.dialect.placeholder(params.len())
                ));
            }
            sql.push_str(&format!(" ORDER BY {} ASC", column));
        }

        sql.push_str(&format!(" LIMIT {}", self.page_size));
        SourceQuery { sql, params }
    }
}

/// Shorthand for [`SourceQueryBuilder`].
pub fn build_query(
    dialect: Dialect,
    capture: &CaptureConfig,
    last_watermark: Option<&Watermark>,
    page_size: u32,
) -> SourceQuery {
    SourceQueryBuilder::new(capture, dialect)
        .page_size(page_size)
        .build_poll_query(last_watermark)
}
