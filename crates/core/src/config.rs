use std::env;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Load .env file (silently ignores if missing).
pub fn load_dotenv() {
    dotenvy::dotenv().ok();
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_opt(key: &str) -> Option<String> {
    env::var(key).ok().filter(|s| !s.is_empty())
}

/// Read a profiled env var: tries {PROFILE}_{KEY} first, falls back to {KEY}.
fn profiled_env_opt(profile: &str, key: &str) -> Option<String> {
    if !profile.is_empty() {
        let prefixed = format!("{}_{}", profile, key);
        if let Some(v) = env_opt(&prefixed) {
            return Some(v);
        }
    }
    env_opt(key)
}

fn profiled_env_or(profile: &str, key: &str, default: &str) -> String {
    profiled_env_opt(profile, key).unwrap_or_else(|| default.to_string())
}

fn profiled_env_u16(profile: &str, key: &str, default: u16) -> u16 {
    profiled_env_opt(profile, key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn profiled_env_u32(profile: &str, key: &str, default: u32) -> u32 {
    profiled_env_opt(profile, key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn profiled_env_u64(profile: &str, key: &str, default: u64) -> u64 {
    profiled_env_opt(profile, key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

// ── Top-level config ──────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Active profile name (empty = default).
    pub profile: String,
    pub server: ServerConfig,
    pub registry: RegistryConfig,
    pub storage: StorageConfig,
    pub postgres: PostgresConfig,
    pub worker: WorkerConfig,
}

impl Config {
    /// Build config from environment variables (call `load_dotenv()` first).
    /// Profile is read from `CAPTURE_PROFILE`. When set (e.g. `PROD`),
    /// every key is first looked up as `{PROFILE}_{KEY}`, falling back to `{KEY}`.
    pub fn from_env() -> Self {
        let profile = env_or("CAPTURE_PROFILE", "").to_uppercase();
        Self::for_profile(&profile)
    }

    /// Build config for a specific named profile (empty string = default).
    pub fn for_profile(profile: &str) -> Self {
        let p = profile.to_uppercase();
        let p = p.as_str();
        Self {
            profile: p.to_string(),
            server: ServerConfig::from_env_profiled(p),
            registry: RegistryConfig::from_env_profiled(p),
            storage: StorageConfig::from_env_profiled(p),
            postgres: PostgresConfig::from_env_profiled(p),
            worker: WorkerConfig::from_env_profiled(p),
        }
    }

    pub fn profile_label(&self) -> &str {
        if self.profile.is_empty() { "default" } else { &self.profile }
    }

    /// Reject settings the engine cannot run with. Called once at startup.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.worker.poll_interval_secs == 0 {
            return Err(ConfigError::NotPositive { key: "POLL_JOBS_INTERVAL" });
        }
        if self.worker.page_size == 0 {
            return Err(ConfigError::NotPositive { key: "PAGE_SIZE" });
        }
        if self.storage.store_cache_size == 0 {
            return Err(ConfigError::NotPositive { key: "STORE_CACHE_SIZE" });
        }
        if !self.registry.backend_url.starts_with("http://")
            && !self.registry.backend_url.starts_with("https://")
        {
            return Err(ConfigError::Invalid {
                key: "BACKEND_URL",
                reason: format!("'{}' is not an http(s) URL", self.registry.backend_url),
            });
        }
        Ok(())
    }

    /// Print a redacted summary for startup logs.
    pub fn log_summary(&self) {
        tracing::info!("Config loaded (profile: {}):", self.profile_label());
        tracing::info!("  server:      {}:{}", self.server.host, self.server.port);
        tracing::info!("  registry:    backend_url={}", self.registry.backend_url);
        tracing::info!(
            "  storage:     endpoint={}, region={}, data_dir={}",
            self.storage.s3_endpoint.as_deref().unwrap_or("(aws default)"),
            self.storage.s3_region,
            self.storage.data_dir.display()
        );
        tracing::info!(
            "  postgres:    host={}, db={}, configured={}",
            self.postgres.host,
            self.postgres.database,
            self.postgres.is_configured()
        );
        tracing::info!(
            "  worker:      interval={}s, page_size={}",
            self.worker.poll_interval_secs,
            self.worker.page_size
        );
    }
}

// ── Server ────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub cors_origin: String,
}

impl ServerConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            host: profiled_env_or(p, "HOST", "0.0.0.0"),
            port: profiled_env_u16(p, "PORT", 8000),
            cors_origin: profiled_env_or(p, "CORS_ORIGIN", "*"),
        }
    }
}

// ── Registry (as seen by the worker) ──────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryConfig {
    pub backend_url: String,
    pub timeout_secs: u64,
}

impl RegistryConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            backend_url: profiled_env_or(p, "BACKEND_URL", "http://localhost:8000"),
            timeout_secs: profiled_env_u64(p, "REGISTRY_TIMEOUT_SECS", 10),
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

// ── Object storage ────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// S3-compatible endpoint (e.g. MinIO). `None` = AWS.
    pub s3_endpoint: Option<String>,
    pub s3_access_key: Option<String>,
    pub s3_secret_key: Option<String>,
    pub s3_region: String,
    /// Root for `local` destinations.
    pub data_dir: PathBuf,
    /// Number of per-bucket store clients kept alive.
    pub store_cache_size: u32,
}

impl StorageConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            s3_endpoint: profiled_env_opt(p, "S3_ENDPOINT"),
            s3_access_key: profiled_env_opt(p, "S3_ACCESS_KEY"),
            s3_secret_key: profiled_env_opt(p, "S3_SECRET_KEY"),
            s3_region: profiled_env_or(p, "S3_REGION", "us-east-1"),
            data_dir: PathBuf::from(profiled_env_or(p, "DATA_DIR", "data")),
            store_cache_size: profiled_env_u32(p, "STORE_CACHE_SIZE", 32),
        }
    }
}

// ── PostgreSQL (registry persistence) ─────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostgresConfig {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub ssl_mode: String,
    pub max_connections: u32,
}

impl PostgresConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            host: profiled_env_or(p, "PG_HOST", "localhost"),
            port: profiled_env_u16(p, "PG_PORT", 5432),
            database: profiled_env_or(p, "PG_DATABASE", "capture"),
            username: profiled_env_opt(p, "PG_USERNAME"),
            password: profiled_env_opt(p, "PG_PASSWORD"),
            ssl_mode: profiled_env_or(p, "PG_SSL_MODE", "prefer"),
            max_connections: profiled_env_u32(p, "PG_MAX_CONNECTIONS", 10),
        }
    }

    pub fn connection_string(&self) -> String {
        let user = self.username.as_deref().unwrap_or("postgres");
        let pass = self.password.as_deref().unwrap_or("");
        format!(
            "postgres://{}:{}@{}:{}/{}?sslmode={}",
            user, pass, self.host, self.port, self.database, self.ssl_mode
        )
    }

    pub fn is_configured(&self) -> bool {
        self.username.is_some()
    }
}

// ── Polling worker ────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Global polling cadence.
    pub poll_interval_secs: u64,
    /// Maximum rows fetched per job per cycle.
    pub page_size: u32,
    pub source_connect_timeout_secs: u64,
}

impl WorkerConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            poll_interval_secs: profiled_env_u64(p, "POLL_JOBS_INTERVAL", 5),
            page_size: profiled_env_u32(p, "PAGE_SIZE", 100),
            source_connect_timeout_secs: profiled_env_u64(p, "SOURCE_CONNECT_TIMEOUT_SECS", 10),
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn source_connect_timeout(&self) -> Duration {
        Duration::from_secs(self.source_connect_timeout_secs)
    }
}
