//! Job registry: the authoritative store of capture job definitions,
//! lifecycle status and committed capture state.
//!
//! Three implementations share the [`JobRegistry`] trait:
//! - [`InMemoryRegistry`] for tests and single-process deployments,
//! - [`PgRegistry`] persisting jobs in PostgreSQL,
//! - [`HttpRegistry`] used by workers to reach a remote registry service.

pub mod api;
pub mod error;
pub mod http;
pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use uuid::Uuid;

use delta_core::{CaptureState, Job, JobDefinition};

pub use error::RegistryError;
pub use http::HttpRegistry;
pub use memory::InMemoryRegistry;
pub use postgres::PgRegistry;

#[async_trait]
pub trait JobRegistry: Send + Sync {
    /// Validate and store a new job in the `created` state.
    async fn create(&self, definition: JobDefinition) -> Result<Job, RegistryError>;

    async fn get(&self, id: Uuid) -> Result<Job, RegistryError>;

    /// All jobs in creation order.
    async fn list(&self) -> Result<Vec<Job>, RegistryError>;

    /// Enable a job. Idempotent.
    async fn start(&self, id: Uuid) -> Result<Job, RegistryError>;

    /// Disable a job. Idempotent; capture state is retained.
    async fn stop(&self, id: Uuid) -> Result<Job, RegistryError>;

    /// Replace the capture state of a job. The only path by which
    /// capture progress becomes durable.
    async fn update_state(&self, id: Uuid, state: CaptureState) -> Result<(), RegistryError>;
}

/// Shared guard for `update_state` implementations.
pub(crate) fn check_state(state: &CaptureState) -> Result<(), RegistryError> {
    if state.is_valid() {
        Ok(())
    } else {
        Err(RegistryError::InvalidState(
            "last_watermark must be a finite value".into(),
        ))
    }
}
