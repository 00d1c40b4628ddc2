//! Capture job model: definition, lifecycle status and capture state.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ValidationError;
use crate::watermark::Watermark;

// ── Source ───────────────────────────────────────────────────────────

/// Source database family. Unknown vendor strings are carried through so
/// validation can report them instead of failing deserialization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum SourceVendor {
    Postgres,
    MySql,
    Unsupported(String),
}

impl From<String> for SourceVendor {
    fn from(s: String) -> Self {
        match s.to_ascii_lowercase().as_str() {
            "postgres" | "postgresql" | "pg" => SourceVendor::Postgres,
            "mysql" | "mariadb" => SourceVendor::MySql,
            _ => SourceVendor::Unsupported(s),
        }
    }
}

impl From<SourceVendor> for String {
    fn from(v: SourceVendor) -> Self {
        match v {
            SourceVendor::Postgres => "postgres".to_string(),
            SourceVendor::MySql => "mysql".to_string(),
            SourceVendor::Unsupported(s) => s,
        }
    }
}

/// Connection descriptor for the source database.
#[derive(Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    pub vendor: SourceVendor,
    pub host: String,
    pub port: u16,
    pub database: String,
    pub user: String,
    #[serde(default)]
    pub password: String,
}

impl fmt::Debug for SourceConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SourceConfig")
            .field("vendor", &self.vendor)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("user", &self.user)
            .field("password", &"***")
            .finish()
    }
}

// ── Destination ──────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum StorageProvider {
    #[default]
    S3,
    /// Local filesystem under the configured data dir (development).
    Local,
    /// Process-local in-memory store (tests).
    Memory,
    Unsupported(String),
}

impl From<String> for StorageProvider {
    fn from(s: String) -> Self {
        match s.to_ascii_lowercase().as_str() {
            "s3" => StorageProvider::S3,
            "local" => StorageProvider::Local,
            "memory" => StorageProvider::Memory,
            _ => StorageProvider::Unsupported(s),
        }
    }
}

impl From<StorageProvider> for String {
    fn from(p: StorageProvider) -> Self {
        match p {
            StorageProvider::S3 => "s3".to_string(),
            StorageProvider::Local => "local".to_string(),
            StorageProvider::Memory => "memory".to_string(),
            StorageProvider::Unsupported(s) => s,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DestinationConfig {
    #[serde(default)]
    pub provider: StorageProvider,
    pub bucket: String,
    #[serde(default)]
    pub base_path: String,
}

// ── Capture ──────────────────────────────────────────────────────────

/// Serialization format of delivered batch objects.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum OutputFormat {
    /// A single JSON array of row objects.
    #[default]
    Json,
    /// Newline-delimited JSON, one row object per line.
    Jsonl,
    Unsupported(String),
}

impl OutputFormat {
    pub fn extension(&self) -> &str {
        match self {
            OutputFormat::Json => "json",
            OutputFormat::Jsonl => "jsonl",
            OutputFormat::Unsupported(s) => s,
        }
    }
}

impl From<String> for OutputFormat {
    fn from(s: String) -> Self {
        match s.to_ascii_lowercase().as_str() {
            "json" => OutputFormat::Json,
            "jsonl" | "ndjson" => OutputFormat::Jsonl,
            _ => OutputFormat::Unsupported(s),
        }
    }
}

impl From<OutputFormat> for String {
    fn from(f: OutputFormat) -> Self {
        f.extension().to_string()
    }
}

fn default_polling_interval_ms() -> u64 {
    5000
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptureConfig {
    pub table: String,
    #[serde(default)]
    pub schema: Option<String>,
    /// Column used as the incremental cursor (e.g. `id`, `updated_at`).
    #[serde(default)]
    pub watermark_column: Option<String>,
    /// Informational only; the engine polls on one global cadence.
    #[serde(default = "default_polling_interval_ms")]
    pub polling_interval_ms: u64,
    #[serde(default)]
    pub format: OutputFormat,
}

// ── Definition ───────────────────────────────────────────────────────

/// Request body for creating a capture job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobDefinition {
    pub name: String,
    pub source: SourceConfig,
    pub destination: DestinationConfig,
    pub capture: CaptureConfig,
}

impl JobDefinition {
    pub fn validate(&self) -> Result<(), ValidationError> {
        require("name", &self.name)?;

        let src = &self.source;
        if let SourceVendor::Unsupported(v) = &src.vendor {
            return Err(ValidationError::UnsupportedVendor(v.clone()));
        }
        require("source.host", &src.host)?;
        if src.port == 0 {
            return Err(ValidationError::NotPositive { field: "source.port" });
        }
        require("source.database", &src.database)?;
        require("source.user", &src.user)?;

        let dst = &self.destination;
        if let StorageProvider::Unsupported(p) = &dst.provider {
            return Err(ValidationError::UnsupportedProvider(p.clone()));
        }
        require("destination.bucket", &dst.bucket)?;

        let cap = &self.capture;
        require("capture.table", &cap.table)?;
        identifier("capture.table", &cap.table)?;
        if let Some(schema) = &cap.schema {
            identifier("capture.schema", schema)?;
        }
        if let Some(column) = &cap.watermark_column {
            identifier("capture.watermark_column", column)?;
        }
        if cap.polling_interval_ms == 0 {
            return Err(ValidationError::NotPositive {
                field: "capture.polling_interval_ms",
            });
        }
        if let OutputFormat::Unsupported(f) = &cap.format {
            return Err(ValidationError::UnsupportedFormat(f.clone()));
        }
        Ok(())
    }
}

fn require(field: &'static str, value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::MissingField(field));
    }
    Ok(())
}

/// Table, schema and column names are spliced into SQL text, so only plain
/// identifiers are accepted.
fn identifier(field: &'static str, value: &str) -> Result<(), ValidationError> {
    if is_plain_identifier(value) {
        Ok(())
    } else {
        Err(ValidationError::InvalidIdentifier {
            field,
            value: value.to_string(),
        })
    }
}

pub fn is_plain_identifier(value: &str) -> bool {
    let mut chars = value.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$')
}

// ── Job ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Created,
    Running,
    Stopped,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Created => "created",
            JobStatus::Running => "running",
            JobStatus::Stopped => "stopped",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "created" => Some(JobStatus::Created),
            "running" => Some(JobStatus::Running),
            "stopped" => Some(JobStatus::Stopped),
            _ => None,
        }
    }
}

/// Mutable progress of a job. `None` means no rows consumed yet.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CaptureState {
    #[serde(default)]
    pub last_watermark: Option<Watermark>,
}

impl CaptureState {
    pub fn at(watermark: Watermark) -> Self {
        Self {
            last_watermark: Some(watermark),
        }
    }

    pub fn is_valid(&self) -> bool {
        self.last_watermark.as_ref().map_or(true, Watermark::is_valid)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: Uuid,
    pub name: String,
    pub source: SourceConfig,
    pub destination: DestinationConfig,
    pub capture: CaptureConfig,
    pub enabled: bool,
    pub status: JobStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub state: CaptureState,
}

impl Job {
    /// A freshly created job: disabled, `created`, nothing consumed.
    pub fn from_definition(def: JobDefinition, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: def.name,
            source: def.source,
            destination: def.destination,
            capture: def.capture,
            enabled: false,
            status: JobStatus::Created,
            created_at: now,
            updated_at: now,
            state: CaptureState::default(),
        }
    }

    pub fn start(&mut self, now: DateTime<Utc>) {
        self.enabled = true;
        self.status = JobStatus::Running;
        self.updated_at = now;
    }

    pub fn stop(&mut self, now: DateTime<Utc>) {
        self.enabled = false;
        self.status = JobStatus::Stopped;
        self.updated_at = now;
    }
}

// ── Tests ────────────────────────────────────────────────────────────
