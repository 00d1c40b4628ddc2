//! sqlx-backed connector for postgres-family and mysql-family sources.
//!
//! Each fetch opens a dedicated connection, runs the single poll query and
//! closes the connection before returning, whether the query succeeded or not.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use rust_decimal::Decimal;
use sqlx::mysql::{MySqlArguments, MySqlConnectOptions, MySqlRow};
use sqlx::postgres::{PgArguments, PgConnectOptions, PgRow};
use sqlx::query::Query;
use sqlx::{Column, Connection, MySql, MySqlConnection, PgConnection, Postgres, Row as _, TypeInfo};
use tracing::debug;

use delta_core::{FieldValue, Row, SourceConfig, SourceVendor, Watermark};

use crate::connector::SourceConnector;
use crate::error::SourceError;
use crate::query::SourceQuery;

pub struct SqlConnector {
    connect_timeout: Duration,
}

impl SqlConnector {
    pub fn new(connect_timeout: Duration) -> Self {
        Self { connect_timeout }
    }

    async fn fetch_postgres(
        &self,
        source: &SourceConfig,
        query: &SourceQuery,
    ) -> Result<Vec<Row>, SourceError> {
        let opts = PgConnectOptions::new()
            .host(&source.host)
            .port(source.port)
            .database(&source.database)
            .username(&source.user)
            .password(&source.password);

        let mut conn = tokio::time::timeout(self.connect_timeout, PgConnection::connect_with(&opts))
            .await
            .map_err(|_| connect_timed_out(self.connect_timeout))?
            .map_err(|e| SourceError::Connection(e.to_string()))?;

        let mut q = sqlx::query::<Postgres>(&query.sql);
        for param in &query.params {
            q = bind_pg(q, param);
        }
        let result = q.fetch_all(&mut conn).await;
        close(conn.close().await);

        result
            .map_err(|e| SourceError::Query(e.to_string()))?
            .iter()
            .map(decode_pg_row)
            .collect()
    }

    async fn fetch_mysql(
        &self,
        source: &SourceConfig,
        query: &SourceQuery,
    ) -> Result<Vec<Row>, SourceError> {
        let opts = MySqlConnectOptions::new()
            .host(&source.host)
            .port(source.port)
            .database(&source.database)
            .username(&source.user)
            .password(&source.password);

        let mut conn =
            tokio::time::timeout(self.connect_timeout, MySqlConnection::connect_with(&opts))
                .await
                .map_err(|_| connect_timed_out(self.connect_timeout))?
                .map_err(|e| SourceError::Connection(e.to_string()))?;

        let mut q = sqlx::query::<MySql>(&query.sql);
        for param in &query.params {
            q = bind_mysql(q, param);
        }
        let result = q.fetch_all(&mut conn).await;
        close(conn.close().await);

        result
            .map_err(|e| SourceError::Query(e.to_string()))?
            .iter()
            .map(decode_mysql_row)
            .collect()
    }
}

#[async_trait]
impl SourceConnector for SqlConnector {
    async fn fetch(
        &self,
        source: &SourceConfig,
        query: &SourceQuery,
    ) -> Result<Vec<Row>, SourceError> {
        match &source.vendor {
            SourceVendor::Postgres => self.fetch_postgres(source, query).await,
            SourceVendor::MySql => self.fetch_mysql(source, query).await,
            SourceVendor::Unsupported(v) => Err(SourceError::UnsupportedVendor(v.clone())),
        }
    }
}

fn connect_timed_out(after: Duration) -> SourceError {
    SourceError::Connection(format!("connect timed out after {:?}", after))
}

fn close(result: Result<(), sqlx::Error>) {
    if let Err(e) = result {
        debug!(error = %e, "source connection did not close cleanly");
    }
}

// ── Parameter binding ────────────────────────────────────────────────

fn bind_pg<'q>(
    q: Query<'q, Postgres, PgArguments>,
    w: &Watermark,
) -> Query<'q, Postgres, PgArguments> {
    match w {
        Watermark::Int(v) => q.bind(*v),
        Watermark::Float(v) => q.bind(*v),
        Watermark::Decimal(v) => q.bind(*v),
        Watermark::Timestamp(v) => q.bind(*v),
        Watermark::Text(v) => q.bind(v.clone()),
    }
}

fn bind_mysql<'q>(
    q: Query<'q, MySql, MySqlArguments>,
    w: &Watermark,
) -> Query<'q, MySql, MySqlArguments> {
    match w {
        Watermark::Int(v) => q.bind(*v),
        Watermark::Float(v) => q.bind(*v),
        Watermark::Decimal(v) => q.bind(*v),
        Watermark::Timestamp(v) => q.bind(*v),
        Watermark::Text(v) => q.bind(v.clone()),
    }
}

// ── Row decoding ─────────────────────────────────────────────────────

fn decode_error(column: &str, e: sqlx::Error) -> SourceError {
    SourceError::Query(format!("decoding column '{}': {}", column, e))
}

fn midnight_utc(d: NaiveDate) -> FieldValue {
    FieldValue::Timestamp(d.and_time(NaiveTime::MIN).and_utc())
}

fn decode_pg_row(row: &PgRow) -> Result<Row, SourceError> {
    let mut out = Row::with_capacity(row.columns().len());
    for col in row.columns() {
        let idx = col.ordinal();
        let value = decode_pg_value(row, idx, col.type_info().name())
            .map_err(|e| decode_error(col.name(), e))?;
        out.insert(col.name().to_string(), value);
    }
    Ok(out)
}

fn decode_pg_value(row: &PgRow, idx: usize, type_name: &str) -> Result<FieldValue, sqlx::Error> {
    let value = match type_name {
        "BOOL" => row.try_get::<Option<bool>, _>(idx)?.map(FieldValue::Bool),
        "INT2" => row
            .try_get::<Option<i16>, _>(idx)?
            .map(|v| FieldValue::Int(v.into())),
        "INT4" => row
            .try_get::<Option<i32>, _>(idx)?
            .map(|v| FieldValue::Int(v.into())),
        "INT8" => row.try_get::<Option<i64>, _>(idx)?.map(FieldValue::Int),
        "FLOAT4" => row
            .try_get::<Option<f32>, _>(idx)?
            .map(|v| FieldValue::Float(v.into())),
        "FLOAT8" => row.try_get::<Option<f64>, _>(idx)?.map(FieldValue::Float),
        "NUMERIC" => row.try_get::<Option<Decimal>, _>(idx)?.map(FieldValue::Decimal),
        "TEXT" | "VARCHAR" | "BPCHAR" | "NAME" => {
            row.try_get::<Option<String>, _>(idx)?.map(FieldValue::Text)
        }
        "BYTEA" => row.try_get::<Option<Vec<u8>>, _>(idx)?.map(FieldValue::Bytes),
        "DATE" => row.try_get::<Option<NaiveDate>, _>(idx)?.map(midnight_utc),
        "TIME" => row
            .try_get::<Option<NaiveTime>, _>(idx)?
            .map(|t| FieldValue::Text(t.to_string())),
        "TIMESTAMP" => row
            .try_get::<Option<NaiveDateTime>, _>(idx)?
            .map(|t| FieldValue::Timestamp(t.and_utc())),
        "TIMESTAMPTZ" => row
            .try_get::<Option<DateTime<Utc>>, _>(idx)?
            .map(FieldValue::Timestamp),
        "UUID" => row
            .try_get::<Option<uuid::Uuid>, _>(idx)?
            .map(|u| FieldValue::Text(u.to_string())),
        "JSON" | "JSONB" => row
            .try_get::<Option<serde_json::Value>, _>(idx)?
            .map(FieldValue::Json),
        other => match row.try_get_unchecked::<Option<String>, _>(idx) {
            Ok(v) => v.map(FieldValue::Text),
            Err(e) => {
                debug!(column_type = other, error = %e, "undecodable column, emitting null");
                None
            }
        },
    };
    Ok(value.unwrap_or(FieldValue::Null))
}

fn decode_mysql_row(row: &MySqlRow) -> Result<Row, SourceError> {
    let mut out = Row::with_capacity(row.columns().len());
    for col in row.columns() {
        let idx = col.ordinal();
        let value = decode_mysql_value(row, idx, col.type_info().name())
            .map_err(|e| decode_error(col.name(), e))?;
        out.insert(col.name().to_string(), value);
    }
    Ok(out)
}

fn decode_mysql_value(
    row: &MySqlRow,
    idx: usize,
    type_name: &str,
) -> Result<FieldValue, sqlx::Error> {
    let value = match type_name {
        "BOOLEAN" => row.try_get::<Option<bool>, _>(idx)?.map(FieldValue::Bool),
        "TINYINT" | "SMALLINT" | "MEDIUMINT" | "INT" | "BIGINT" => {
            row.try_get::<Option<i64>, _>(idx)?.map(FieldValue::Int)
        }
        "TINYINT UNSIGNED" | "SMALLINT UNSIGNED" | "MEDIUMINT UNSIGNED" | "INT UNSIGNED"
        | "BIGINT UNSIGNED" => row.try_get::<Option<u64>, _>(idx)?.map(|v| {
            i64::try_from(v)
                .map(FieldValue::Int)
                .unwrap_or_else(|_| FieldValue::Decimal(Decimal::from(v)))
        }),
        "FLOAT" => row
            .try_get::<Option<f32>, _>(idx)?
            .map(|v| FieldValue::Float(v.into())),
        "DOUBLE" => row.try_get::<Option<f64>, _>(idx)?.map(FieldValue::Float),
        "DECIMAL" => row.try_get::<Option<Decimal>, _>(idx)?.map(FieldValue::Decimal),
        "CHAR" | "VARCHAR" | "TEXT" | "TINYTEXT" | "MEDIUMTEXT" | "LONGTEXT" | "ENUM" | "SET" => {
            row.try_get::<Option<String>, _>(idx)?.map(FieldValue::Text)
        }
        "BINARY" | "VARBINARY" | "BLOB" | "TINYBLOB" | "MEDIUMBLOB" | "LONGBLOB" => {
            row.try_get::<Option<Vec<u8>>, _>(idx)?.map(FieldValue::Bytes)
        }
        "DATE" => row.try_get::<Option<NaiveDate>, _>(idx)?.map(midnight_utc),
        "TIME" => row
            .try_get::<Option<NaiveTime>, _>(idx)?
            .map(|t| FieldValue::Text(t.to_string())),
        "DATETIME" => row
            .try_get::<Option<NaiveDateTime>, _>(idx)?
            .map(|t| FieldValue::Timestamp(t.and_utc())),
        "TIMESTAMP" => row
            .try_get::<Option<DateTime<Utc>>, _>(idx)?
            .map(FieldValue::Timestamp),
        "JSON" => row
            .try_get::<Option<serde_json::Value>, _>(idx)?
            .map(FieldValue::Json),
        other => match row.try_get_unchecked::<Option<String>, _>(idx) {
            Ok(v) => v.map(FieldValue::Text),
            Err(e) => {
                debug!(column_type = other, error = %e, "undecodable column, emitting null");
                None
            }
        },
    };
    Ok(value.unwrap_or(FieldValue::Null))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source(vendor: &str, port: u16) -> SourceConfig {
        serde_json::from_value(serde_json::json!({
            "vendor": vendor,
            "host": "127.0.0.1",
            "port": port,
            "database": "shop",
            "user": "reader",
            "password": "secret"
        }))
        .unwrap()
    }

    fn query() -> SourceQuery {
        SourceQuery {
            sql: "SELECT * FROM \"orders\" LIMIT 100".into(),
            params: vec![],
        }
    }

    #[tokio::test]
    async fn unsupported_vendor_is_rejected_before_connecting() {
        let connector = SqlConnector::new(Duration::from_millis(200));
        let err = connector.fetch(&source("oracle", 1521), &query()).await.unwrap_err();
        assert!(matches!(err, SourceError::UnsupportedVendor(v) if v == "oracle"));
    }

    #[tokio::test]
    async fn unreachable_postgres_is_a_connection_error() {
        // Port 9 (discard) on localhost is closed in test environments.
        let connector = SqlConnector::new(Duration::from_millis(500));
        let err = connector.fetch(&source("postgres", 9), &query()).await.unwrap_err();
        assert!(matches!(err, SourceError::Connection(_)));
    }

    #[tokio::test]
    async fn unreachable_mysql_is_a_connection_error() {
        let connector = SqlConnector::new(Duration::from_millis(500));
        let err = connector.fetch(&source("mysql", 9), &query()).await.unwrap_err();
        assert!(matches!(err, SourceError::Connection(_)));
    }

    #[test]
    fn dates_become_midnight_utc() {
        let d = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        match midnight_utc(d) {
            FieldValue::Timestamp(ts) => assert_eq!(ts.to_rfc3339(), "2024-03-01T00:00:00+00:00"),
            other => panic!("expected timestamp, got {:?}", other),
        }
    }
}
