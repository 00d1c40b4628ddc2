use std::path::PathBuf;
use std::sync::Arc;

use object_store::aws::AmazonS3Builder;
use object_store::local::LocalFileSystem;
use object_store::memory::InMemory;
use object_store::ObjectStore;
use tracing::info;

use delta_core::config::StorageConfig;
use delta_core::{DestinationConfig, StorageProvider};

use crate::error::DeliveryError;

/// Object store for one destination bucket.
pub enum StorageBackend {
    Local(LocalBackend),
    S3(S3Backend),
    Memory(Arc<InMemory>),
}

impl StorageBackend {
    pub fn for_destination(
        destination: &DestinationConfig,
        settings: &StorageConfig,
    ) -> Result<Self, DeliveryError> {
        match &destination.provider {
            StorageProvider::S3 => Ok(Self::S3(S3Backend::new(&destination.bucket, settings)?)),
            StorageProvider::Local => Ok(Self::Local(LocalBackend::new(
                settings.data_dir.join(&destination.bucket),
            )?)),
            StorageProvider::Memory => Ok(Self::Memory(Arc::new(InMemory::new()))),
            StorageProvider::Unsupported(p) => Err(DeliveryError::UnsupportedProvider(p.clone())),
        }
    }

    pub fn store(&self) -> Arc<dyn ObjectStore> {
        match self {
            StorageBackend::Local(b) => b.store.clone(),
            StorageBackend::S3(b) => b.store.clone(),
            StorageBackend::Memory(m) => m.clone(),
        }
    }
}

/// Filesystem directory standing in for a bucket.
pub struct LocalBackend {
    pub store: Arc<dyn ObjectStore>,
}

impl LocalBackend {
    pub fn new(root: PathBuf) -> Result<Self, DeliveryError> {
        std::fs::create_dir_all(&root)?;
        let root = std::fs::canonicalize(&root).unwrap_or(root);
        let store = LocalFileSystem::new_with_prefix(&root)?;
        info!("Storage: local backend at {}", root.display());
        Ok(Self {
            store: Arc::new(store),
        })
    }
}

/// S3 or an S3-compatible service (MinIO, R2) when an endpoint is set.
pub struct S3Backend {
    pub store: Arc<dyn ObjectStore>,
}

impl S3Backend {
    pub fn new(bucket: &str, settings: &StorageConfig) -> Result<Self, DeliveryError> {
        let mut builder = AmazonS3Builder::new()
            .with_region(&settings.s3_region)
            .with_bucket_name(bucket);

        if let Some(ref key) = settings.s3_access_key {
            builder = builder.with_access_key_id(key);
        }
        if let Some(ref secret) = settings.s3_secret_key {
            builder = builder.with_secret_access_key(secret);
        }

        if let Some(ref endpoint) = settings.s3_endpoint {
            // object_store requires absolute URLs
            let endpoint_url = if endpoint.starts_with("http://")
                || endpoint.starts_with("https://")
            {
                endpoint.clone()
            } else {
                format!("https://{}", endpoint)
            };
            builder = builder
                .with_endpoint(&endpoint_url)
                .with_allow_http(endpoint_url.starts_with("http://"))
                .with_virtual_hosted_style_request(false);
        }

        let store = builder.build()?;
        info!(
            "Storage: S3 backend s3://{} (region: {}, endpoint: {})",
            bucket,
            settings.s3_region,
            settings.s3_endpoint.as_deref().unwrap_or("aws")
        );

        Ok(Self {
            store: Arc::new(store),
        })
    }
}
