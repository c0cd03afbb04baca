use crate::{
    error::CacheError,
    retry::{classify_store_error, classify_store_probe},
};
use connectors::store::SharedStore;
use engine_core::{layout::TableLayout, retry::RetryPolicy};
use model::{events::MissReason, split::SplitSpec};
use tracing::{debug, info, warn};

/// Outcome of checking a split against the stored fingerprint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheCheck {
    Hit,
    Miss(MissReason),
}

impl CacheCheck {
    pub fn is_hit(&self) -> bool {
        matches!(self, CacheCheck::Hit)
    }
}

/// Fingerprint sidecars next to each content file decide whether a split
/// has to be exported again.
pub struct ChecksumCache {
    store: SharedStore,
    retry: RetryPolicy,
}

impl ChecksumCache {
    pub fn new(store: SharedStore, retry: RetryPolicy) -> Self {
        Self { store, retry }
    }

    /// Compares the stored fingerprint with the planned one byte for byte,
    /// then confirms the content file is still there. Any failure to read
    /// either resolves to a miss.
    pub async fn check(
        &self,
        spec: &SplitSpec,
        layout: &TableLayout,
    ) -> Result<CacheCheck, CacheError> {
        let expected = canonical(spec)?;
        let fingerprint_path = layout.fingerprint_path(spec.split_id);

        let stored = self
            .retry
            .run(|| self.store.read(&fingerprint_path), classify_store_probe)
            .await
            .map_err(|e| e.into_inner());
        match stored {
            Ok(stored) if stored == expected => {}
            Ok(stored) => {
                info!(
                    path = %fingerprint_path,
                    stored = %String::from_utf8_lossy(&stored),
                    planned = %String::from_utf8_lossy(&expected),
                    "Fingerprint changed"
                );
                return Ok(CacheCheck::Miss(MissReason::FingerprintChanged));
            }
            Err(e) if e.is_not_found() => {
                debug!(path = %fingerprint_path, "No fingerprint stored");
                return Ok(CacheCheck::Miss(MissReason::FingerprintMissing));
            }
            Err(e) => {
                warn!(path = %fingerprint_path, error = %e, "Fingerprint unreadable, treating as a miss");
                return Ok(CacheCheck::Miss(MissReason::FingerprintUnreadable));
            }
        }

        let content_path = layout.content_path(spec.split_id);
        let present = self
            .retry
            .run(|| self.store.exists(&content_path), classify_store_probe)
            .await;
        match present {
            Ok(true) => Ok(CacheCheck::Hit),
            Ok(false) => {
                info!(path = %content_path, "Fingerprint matches but content file is missing");
                Ok(CacheCheck::Miss(MissReason::ContentMissing))
            }
            Err(e) => {
                warn!(path = %content_path, error = %e.into_inner(), "Content file unreadable, treating as a miss");
                Ok(CacheCheck::Miss(MissReason::ContentMissing))
            }
        }
    }

    pub async fn is_cached(&self, spec: &SplitSpec, layout: &TableLayout) -> Result<bool, CacheError> {
        Ok(self.check(spec, layout).await?.is_hit())
    }

    /// Records the fingerprint of a split whose content has been written.
    /// Must only be called after the content file is complete.
    pub async fn persist(&self, spec: &SplitSpec, layout: &TableLayout) -> Result<(), CacheError> {
        let payload = canonical(spec)?;
        let path = layout.fingerprint_path(spec.split_id);
        debug!(path = %path, payload = %String::from_utf8_lossy(&payload), "Writing fingerprint");

        self.retry
            .run(|| self.store.write(&path, &payload), classify_store_error)
            .await
            .map_err(|e| CacheError::Store(e.into_inner()))
    }
}

fn canonical(spec: &SplitSpec) -> Result<Vec<u8>, CacheError> {
    spec.fingerprint()
        .canonical()
        .map_err(|source| CacheError::Serialize {
            split_id: spec.split_id,
            source,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use connectors::store::local::LocalObjectStore;
    use model::split::SplitSize;
    use std::sync::Arc;

    fn spec(row_count: u64, checksum: &str) -> SplitSpec {
        SplitSpec {
            row_count,
            checksum: Some(checksum.to_string()),
            ..SplitSpec::empty(SplitSize::Rows(1_000_000))
        }
    }

    fn setup() -> (tempfile::TempDir, SharedStore, TableLayout) {
        let dir = tempfile::tempdir().unwrap();
        let store: SharedStore = Arc::new(LocalObjectStore::new());
        let layout = TableLayout::new(
            dir.path().to_str().unwrap(),
            "orders",
            SplitSize::Rows(1_000_000),
        );
        (dir, store, layout)
    }

    #[tokio::test]
    async fn missing_fingerprint_is_a_miss() {
        let (_dir, store, layout) = setup();
        let cache = ChecksumCache::new(store, RetryPolicy::default());
        assert_eq!(
            cache.check(&spec(5, "a"), &layout).await.unwrap(),
            CacheCheck::Miss(MissReason::FingerprintMissing)
        );
    }

    #[tokio::test]
    async fn hit_requires_matching_fingerprint_and_content() {
        let (_dir, store, layout) = setup();
        let cache = ChecksumCache::new(store.clone(), RetryPolicy::none());
        let planned = spec(5, "a");

        cache.persist(&planned, &layout).await.unwrap();
        assert_eq!(
            cache.check(&planned, &layout).await.unwrap(),
            CacheCheck::Miss(MissReason::ContentMissing)
        );

        store
            .write(&layout.content_path(1), b"id\n1\n")
            .await
            .unwrap();
        assert!(cache.is_cached(&planned, &layout).await.unwrap());
    }

    #[tokio::test]
    async fn any_fingerprint_difference_is_a_miss() {
        let (_dir, store, layout) = setup();
        let cache = ChecksumCache::new(store.clone(), RetryPolicy::none());
        store
            .write(&layout.content_path(1), b"id\n1\n")
            .await
            .unwrap();
        cache.persist(&spec(5, "a"), &layout).await.unwrap();

        assert_eq!(
            cache.check(&spec(5, "b"), &layout).await.unwrap(),
            CacheCheck::Miss(MissReason::FingerprintChanged)
        );
        assert_eq!(
            cache.check(&spec(6, "a"), &layout).await.unwrap(),
            CacheCheck::Miss(MissReason::FingerprintChanged)
        );
    }

    #[tokio::test]
    async fn stored_bytes_must_match_exactly() {
        let (_dir, store, layout) = setup();
        let cache = ChecksumCache::new(store.clone(), RetryPolicy::none());
        let planned = spec(5, "a");
        store
            .write(&layout.content_path(1), b"id\n1\n")
            .await
            .unwrap();

        let mut padded = planned.fingerprint().canonical().unwrap();
        padded.push(b'\n');
        store
            .write(&layout.fingerprint_path(1), &padded)
            .await
            .unwrap();

        assert!(!cache.is_cached(&planned, &layout).await.unwrap());
    }
}
