use std::sync::Arc;

use tracing::{info, warn};

use delta_core::config::PostgresConfig;
use delta_registry::{InMemoryRegistry, JobRegistry, PgRegistry, RegistryError};

/// Shared application state passed to all handlers.
pub struct AppState {
    pub registry: Arc<dyn JobRegistry>,
    /// `postgres` or `memory`, reported by `/health`.
    pub registry_kind: &'static str,
}

impl AppState {
    pub fn new(registry: Arc<dyn JobRegistry>, registry_kind: &'static str) -> Self {
        Self {
            registry,
            registry_kind,
        }
    }

    /// Pick the registry backend: PostgreSQL when configured, unless
    /// `force_memory` is set.
    pub async fn open(
        postgres: &PostgresConfig,
        force_memory: bool,
    ) -> Result<Self, RegistryError> {
        if force_memory {
            info!("in-memory registry requested, jobs are kept in memory only");
        } else if postgres.is_configured() {
            let registry = PgRegistry::connect(postgres).await?;
            return Ok(Self::new(Arc::new(registry), "postgres"));
        } else {
            warn!("PostgreSQL not configured, jobs are kept in memory only");
        }
        Ok(Self::new(Arc::new(InMemoryRegistry::new()), "memory"))
    }
}
