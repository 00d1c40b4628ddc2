use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use object_store::ObjectStore;
use tracing::info;

use delta_core::config::StorageConfig;
use delta_core::{Clock, DestinationConfig, Job, Row, SystemClock};

use crate::cache::StoreCache;
use crate::encode::encode_batch;
use crate::error::DeliveryError;
use crate::key::ObjectKey;

/// Writes one cycle's batch as a single immutable object.
#[async_trait]
pub trait BatchSink: Send + Sync {
    /// Returns the written key, or `None` when `rows` is empty and nothing
    /// was written.
    async fn deliver(&self, job: &Job, rows: &[Row]) -> Result<Option<ObjectKey>, DeliveryError>;
}

pub struct ObjectStoreSink {
    stores: StoreCache,
    clock: Arc<dyn Clock>,
}

impl ObjectStoreSink {
    pub fn new(settings: StorageConfig) -> Self {
        Self::with_clock(settings, Arc::new(SystemClock))
    }

    pub fn with_clock(settings: StorageConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            stores: StoreCache::new(settings),
            clock,
        }
    }

    pub fn store_for(
        &self,
        destination: &DestinationConfig,
    ) -> Result<Arc<dyn ObjectStore>, DeliveryError> {
        self.stores.store_for(destination)
    }
}

#[async_trait]
impl BatchSink for ObjectStoreSink {
    async fn deliver(&self, job: &Job, rows: &[Row]) -> Result<Option<ObjectKey>, DeliveryError> {
        if rows.is_empty() {
            return Ok(None);
        }

        let payload = encode_batch(rows, &job.capture.format)?;
        let key = ObjectKey::for_batch(
            &job.destination.base_path,
            job.id,
            &job.capture.table,
            self.clock.now(),
            &job.capture.format,
        );
        let store = self.store_for(&job.destination)?;
        let size = payload.len();
        store.put(&key.to_path(), Bytes::from(payload).into()).await?;

        info!(
            job_id = %job.id,
            bucket = %job.destination.bucket,
            key = %key,
            rows = rows.len(),
            bytes = size,
            "batch delivered"
        );
        Ok(Some(key))
    }
}
