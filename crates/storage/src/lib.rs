//! Delivery side of a capture cycle: object keys, batch encoding and the
//! object-store sink.

pub mod backend;
pub mod cache;
pub mod encode;
pub mod error;
pub mod key;
pub mod sink;

pub use backend::StorageBackend;
pub use cache::StoreCache;
pub use encode::encode_batch;
pub use error::DeliveryError;
pub use key::ObjectKey;
pub use sink::{BatchSink, ObjectStoreSink};
