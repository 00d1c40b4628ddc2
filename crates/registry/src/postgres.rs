//! PostgreSQL-backed registry over the `capture_jobs` table.
//!
//! Definition sections are stored as JSONB documents; `enabled` and
//! `status` are plain columns guarded by a CHECK constraint so the pair
//! cannot drift apart.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing::{error, info};
use uuid::Uuid;

use delta_core::config::PostgresConfig;
use delta_core::{CaptureState, Clock, Job, JobDefinition, JobStatus, SystemClock};

use crate::{check_state, JobRegistry, RegistryError};

const JOB_COLUMNS: &str = "id, name, source_json, destination_json, capture_json, \
                           enabled, status, state_json, created_at, updated_at";

#[derive(Debug, sqlx::FromRow)]
struct JobRow {
    id: Uuid,
    name: String,
    source_json: serde_json::Value,
    destination_json: serde_json::Value,
    capture_json: serde_json::Value,
    enabled: bool,
    status: String,
    state_json: serde_json::Value,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl JobRow {
    fn into_job(self) -> Result<Job, RegistryError> {
        let id = self.id;
        let status = JobStatus::parse(&self.status).ok_or_else(|| RegistryError::Decode {
            id,
            reason: format!("unknown status '{}'", self.status),
        })?;
        Ok(Job {
            id,
            name: self.name,
            source: decode(id, "source_json", self.source_json)?,
            destination: decode(id, "destination_json", self.destination_json)?,
            capture: decode(id, "capture_json", self.capture_json)?,
            enabled: self.enabled,
            status,
            created_at: self.created_at,
            updated_at: self.updated_at,
            state: decode(id, "state_json", self.state_json)?,
        })
    }
}

fn decode<T: DeserializeOwned>(
    id: Uuid,
    column: &str,
    value: serde_json::Value,
) -> Result<T, RegistryError> {
    serde_json::from_value(value).map_err(|e| RegistryError::Decode {
        id,
        reason: format!("{column}: {e}"),
    })
}

fn encode<T: serde::Serialize>(value: &T) -> Result<serde_json::Value, RegistryError> {
    serde_json::to_value(value).map_err(|e| RegistryError::InvalidState(e.to_string()))
}

pub struct PgRegistry {
    pool: PgPool,
    clock: Arc<dyn Clock>,
}

impl PgRegistry {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            clock: Arc::new(SystemClock),
        }
    }

    /// Connect, apply pending migrations and return a ready registry.
    pub async fn connect(config: &PostgresConfig) -> Result<Self, RegistryError> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .connect(&config.connection_string())
            .await?;
        info!("PostgreSQL connected: {}", config.host);
        sqlx::migrate!("../../migrations")
            .run(&pool)
            .await
            .map_err(|e| RegistryError::Database(e.into()))?;
        info!("Database migrations applied successfully");
        Ok(Self::new(pool))
    }

    async fn set_enabled(&self, id: Uuid, status: JobStatus) -> Result<Job, RegistryError> {
        let sql = format!(
            "UPDATE capture_jobs SET enabled = $2, status = $3, updated_at = $4
             WHERE id = $1
             RETURNING {JOB_COLUMNS}"
        );
        let row = sqlx::query_as::<_, JobRow>(&sql)
            .bind(id)
            .bind(status == JobStatus::Running)
            .bind(status.as_str())
            .bind(self.clock.now())
            .fetch_optional(&self.pool)
            .await
            .map_err(log_db_error)?
            .ok_or(RegistryError::NotFound(id))?;
        row.into_job()
    }
}

#[async_trait]
impl JobRegistry for PgRegistry {
    async fn create(&self, definition: JobDefinition) -> Result<Job, RegistryError> {
        definition.validate()?;
        let job = Job::from_definition(definition, self.clock.now());

        let sql = format!(
            "INSERT INTO capture_jobs
                (id, name, source_json, destination_json, capture_json,
                 enabled, status, state_json, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
             RETURNING {JOB_COLUMNS}"
        );
        let row = sqlx::query_as::<_, JobRow>(&sql)
            .bind(job.id)
            .bind(&job.name)
            .bind(encode(&job.source)?)
            .bind(encode(&job.destination)?)
            .bind(encode(&job.capture)?)
            .bind(job.enabled)
            .bind(job.status.as_str())
            .bind(encode(&job.state)?)
            .bind(job.created_at)
            .bind(job.updated_at)
            .fetch_one(&self.pool)
            .await
            .map_err(log_db_error)?;

        info!(job_id = %job.id, name = %job.name, "capture job created");
        row.into_job()
    }

    async fn get(&self, id: Uuid) -> Result<Job, RegistryError> {
        let sql = format!("SELECT {JOB_COLUMNS} FROM capture_jobs WHERE id = $1");
        sqlx::query_as::<_, JobRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(log_db_error)?
            .ok_or(RegistryError::NotFound(id))?
            .into_job()
    }

    async fn list(&self) -> Result<Vec<Job>, RegistryError> {
        let sql = format!("SELECT {JOB_COLUMNS} FROM capture_jobs ORDER BY created_at, id");
        sqlx::query_as::<_, JobRow>(&sql)
            .fetch_all(&self.pool)
            .await
            .map_err(log_db_error)?
            .into_iter()
            .map(JobRow::into_job)
            .collect()
    }

    async fn start(&self, id: Uuid) -> Result<Job, RegistryError> {
        self.set_enabled(id, JobStatus::Running).await
    }

    async fn stop(&self, id: Uuid) -> Result<Job, RegistryError> {
        self.set_enabled(id, JobStatus::Stopped).await
    }

    async fn update_state(&self, id: Uuid, state: CaptureState) -> Result<(), RegistryError> {
        check_state(&state)?;
        let result = sqlx::query(
            "UPDATE capture_jobs SET state_json = $2, updated_at = $3 WHERE id = $1",
        )
        .bind(id)
        .bind(encode(&state)?)
        .bind(self.clock.now())
        .execute(&self.pool)
        .await
        .map_err(log_db_error)?;

        if result.rows_affected() == 0 {
            return Err(RegistryError::NotFound(id));
        }
        Ok(())
    }
}

fn log_db_error(e: sqlx::Error) -> RegistryError {
    error!("capture job registry database error: {}", e);
    RegistryError::Database(e)
}

#[cfg(test)]
mod tests {
    use super::*;
    use delta_core::Watermark;
    use serde_json::json;

    fn row() -> JobRow {
        let now = Utc::now();
        JobRow {
            id: Uuid::new_v4(),
            name: "orders-capture".into(),
            source_json: json!({
                "vendor": "mysql", "host": "db", "port": 3306,
                "database": "shop", "user": "reader", "password": "pw"
            }),
            destination_json: json!({ "provider": "s3", "bucket": "lake", "base_path": "raw" }),
            capture_json: json!({ "table": "orders", "watermark_column": "updated_at" }),
            enabled: true,
            status: "running".into(),
            state_json: json!({ "last_watermark": { "type": "int", "value": 42 } }),
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn row_decodes_into_job() {
        let job = row().into_job().unwrap();
        assert_eq!(job.status, JobStatus::Running);
        assert_eq!(job.source.password, "pw");
        assert_eq!(job.capture.watermark_column.as_deref(), Some("updated_at"));
        assert_eq!(job.state.last_watermark, Some(Watermark::Int(42)));
    }

    #[test]
    fn empty_state_document_means_no_watermark() {
        let mut r = row();
        r.state_json = json!({});
        assert!(r.into_job().unwrap().state.last_watermark.is_none());
    }

    #[test]
    fn unknown_status_is_a_decode_error() {
        let mut r = row();
        r.status = "paused".into();
        assert!(matches!(r.into_job(), Err(RegistryError::Decode { .. })));
    }

    #[test]
    fn corrupt_section_is_a_decode_error() {
        let mut r = row();
        r.capture_json = json!({ "watermark_column": "id" });
        let err = r.into_job().unwrap_err();
        assert!(err.to_string().contains("capture_json"));
        assert_eq!(err.status_code(), 500);
    }
}
