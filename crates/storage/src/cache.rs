use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex, PoisonError};

use lru::LruCache;
use object_store::ObjectStore;
use tracing::debug;

use delta_core::config::StorageConfig;
use delta_core::DestinationConfig;

use crate::backend::StorageBackend;
use crate::error::DeliveryError;

/// Bounded cache of object store clients keyed by provider and bucket.
///
/// Evicting a `memory` store discards its contents; size the cache above
/// the number of in-memory destinations.
pub struct StoreCache {
    stores: Mutex<LruCache<(String, String), Arc<dyn ObjectStore>>>,
    settings: StorageConfig,
}

impl StoreCache {
    pub fn new(settings: StorageConfig) -> Self {
        let capacity =
            NonZeroUsize::new(settings.store_cache_size as usize).unwrap_or(NonZeroUsize::MIN);
        Self {
            stores: Mutex::new(LruCache::new(capacity)),
            settings,
        }
    }

    /// Return the cached store for `destination`, building it on first use.
    pub fn store_for(
        &self,
        destination: &DestinationConfig,
    ) -> Result<Arc<dyn ObjectStore>, DeliveryError> {
        let key = (
            String::from(destination.provider.clone()),
            destination.bucket.clone(),
        );

        if let Some(store) = self.lock().get(&key) {
            return Ok(store.clone());
        }

        debug!(provider = %key.0, bucket = %key.1, "building object store client");
        let store = StorageBackend::for_destination(destination, &self.settings)?.store();

        // Another caller may have raced us here; keep whichever landed first.
        let mut stores = self.lock();
        Ok(stores.get_or_insert(key, || store).clone())
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.lock().len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, LruCache<(String, String), Arc<dyn ObjectStore>>> {
        self.stores.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
