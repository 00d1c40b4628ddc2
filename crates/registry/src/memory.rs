//! Process-local registry backed by an insertion-ordered map.

use std::sync::Arc;

use async_trait::async_trait;
use indexmap::IndexMap;
use tokio::sync::RwLock;
use tracing::info;
use uuid::Uuid;

use delta_core::{CaptureState, Clock, Job, JobDefinition, SystemClock};

use crate::{check_state, JobRegistry, RegistryError};

pub struct InMemoryRegistry {
    jobs: RwLock<IndexMap<Uuid, Job>>,
    clock: Arc<dyn Clock>,
}

impl InMemoryRegistry {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            jobs: RwLock::new(IndexMap::new()),
            clock,
        }
    }

    async fn modify<F>(&self, id: Uuid, f: F) -> Result<Job, RegistryError>
    where
        F: FnOnce(&mut Job),
    {
        let mut jobs = self.jobs.write().await;
        let job = jobs.get_mut(&id).ok_or(RegistryError::NotFound(id))?;
        f(job);
        Ok(job.clone())
    }
}

impl Default for InMemoryRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl JobRegistry for InMemoryRegistry {
    async fn create(&self, definition: JobDefinition) -> Result<Job, RegistryError> {
        definition.validate()?;
        let job = Job::from_definition(definition, self.clock.now());
        info!(job_id = %job.id, name = %job.name, "capture job created");
        self.jobs.write().await.insert(job.id, job.clone());
        Ok(job)
    }

    async fn get(&self, id: Uuid) -> Result<Job, RegistryError> {
        self.jobs
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or(RegistryError::NotFound(id))
    }

    async fn list(&self) -> Result<Vec<Job>, RegistryError> {
        Ok(self.jobs.read().await.values().cloned().collect())
    }

    async fn start(&self, id: Uuid) -> Result<Job, RegistryError> {
        let now = self.clock.now();
        self.modify(id, |job| job.start(now)).await
    }

    async fn stop(&self, id: Uuid) -> Result<Job, RegistryError> {
        let now = self.clock.now();
        self.modify(id, |job| job.stop(now)).await
    }

    async fn update_state(&self, id: Uuid, state: CaptureState) -> Result<(), RegistryError> {
        check_state(&state)?;
        let now = self.clock.now();
        self.modify(id, |job| {
            job.state = state;
            job.updated_at = now;
        })
        .await?;
        Ok(())
    }
}
