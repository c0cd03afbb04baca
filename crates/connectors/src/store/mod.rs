pub mod error;
pub mod gcs;
pub mod local;

use crate::{
    gcp::GcpAuth,
    store::{error::StoreError, gcs::GcsObjectStore, local::LocalObjectStore},
};
use async_trait::async_trait;
use std::sync::Arc;

/// Durable storage addressed by path strings.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Reads the whole object. A missing object fails with
    /// [`StoreError::NotFound`], distinct from every other failure.
    async fn read(&self, path: &str) -> Result<Vec<u8>, StoreError>;

    async fn exists(&self, path: &str) -> Result<bool, StoreError>;

    /// Opens a streamed whole-object write. Nothing is visible at `path`
    /// until [`ObjectWriter::finish`] succeeds.
    async fn create(&self, path: &str) -> Result<Box<dyn ObjectWriter>, StoreError>;

    async fn write(&self, path: &str, bytes: &[u8]) -> Result<(), StoreError> {
        let mut writer = self.create(path).await?;
        writer.write_all(bytes).await?;
        writer.finish().await
    }

    fn name(&self) -> &'static str;
}

#[async_trait]
pub trait ObjectWriter: Send {
    async fn write_all(&mut self, bytes: &[u8]) -> Result<(), StoreError>;

    /// Publishes the object. Dropping a writer without calling this discards
    /// everything written.
    async fn finish(self: Box<Self>) -> Result<(), StoreError>;
}

pub type SharedStore = Arc<dyn ObjectStore>;

/// Picks the store implementation from the destination's scheme.
pub fn store_for(destination: &str, access_token: Option<String>) -> SharedStore {
    if destination.starts_with("gs://") {
        Arc::new(GcsObjectStore::new(GcpAuth::from_token(access_token)))
    } else {
        Arc::new(LocalObjectStore::new())
    }
}
