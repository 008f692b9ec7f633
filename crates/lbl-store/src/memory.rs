use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use lbl_observe::metrics::{Counter, Gauge};

use crate::{validate_key, ObjectStore, ObjectStoreError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    pub bytes: Vec<u8>,
    pub content_type: String,
}

/// In-process object store for tests and dry runs.
///
/// Supports per-key failure injection, keys that never complete, a fixed put latency, and
/// records the highest number of puts observed in flight at once.
#[derive(Debug, Default)]
pub struct MemoryObjectStore {
    bucket: String,
    objects: Mutex<BTreeMap<String, StoredObject>>,
    fail_keys: Mutex<BTreeSet<String>>,
    hang_keys: Mutex<BTreeSet<String>>,
    unreachable: AtomicBool,
    put_delay: Duration,
    put_calls: Counter,
    inflight: Counter,
    inflight_high_water: Gauge,
}

struct InflightGuard<'a>(&'a Counter);

impl Drop for InflightGuard<'_> {
    fn drop(&mut self) {
        self.0.dec();
    }
}

impl MemoryObjectStore {
    pub fn new(bucket: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            ..Self::default()
        }
    }

    pub fn with_put_delay(mut self, delay: Duration) -> Self {
        self.put_delay = delay;
        self
    }

    /// Every put to `key` fails.
    pub fn fail_key(&self, key: impl Into<String>) {
        if let Ok(mut g) = self.fail_keys.lock() {
            g.insert(key.into());
        }
    }

    /// Every put to `key` never completes.
    pub fn hang_key(&self, key: impl Into<String>) {
        if let Ok(mut g) = self.hang_keys.lock() {
            g.insert(key.into());
        }
    }

    /// When set, every operation fails as if the endpoint could not be reached.
    pub fn set_unreachable(&self, unreachable: bool) {
        self.unreachable.store(unreachable, Ordering::Relaxed);
    }

    pub fn object(&self, key: &str) -> Option<StoredObject> {
        self.objects.lock().ok().and_then(|g| g.get(key).cloned())
    }

    pub fn keys(&self) -> Vec<String> {
        self.objects
            .lock()
            .map(|g| g.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Inserts an object without going through the put path (no delay, no failure injection).
    pub fn seed(&self, key: impl Into<String>, bytes: impl Into<Vec<u8>>) {
        if let Ok(mut g) = self.objects.lock() {
            g.insert(
                key.into(),
                StoredObject {
                    bytes: bytes.into(),
                    content_type: "application/octet-stream".to_string(),
                },
            );
        }
    }

    pub fn put_calls(&self) -> u64 {
        self.put_calls.get()
    }

    pub fn inflight_high_water(&self) -> u64 {
        self.inflight_high_water.get()
    }

    fn check_reachable(&self) -> Result<(), ObjectStoreError> {
        if self.unreachable.load(Ordering::Relaxed) {
            return Err(ObjectStoreError::Runtime(format!(
                "endpoint unreachable for bucket {}",
                self.bucket
            )));
        }
        Ok(())
    }

    fn contains(set: &Mutex<BTreeSet<String>>, key: &str) -> Result<bool, ObjectStoreError> {
        set.lock()
            .map(|g| g.contains(key))
            .map_err(|_| ObjectStoreError::Runtime("memory store mutex poisoned".to_string()))
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    fn backend_tag(&self) -> &'static str {
        "memory"
    }

    fn bucket(&self) -> &str {
        &self.bucket
    }

    async fn put_bytes(
        &self,
        key: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<(), ObjectStoreError> {
        self.put_calls.inc();
        self.inflight.inc();
        let _guard = InflightGuard(&self.inflight);
        self.inflight_high_water.set_max(self.inflight.get());

        validate_key(key)?;
        self.check_reachable()?;

        if !self.put_delay.is_zero() {
            tokio::time::sleep(self.put_delay).await;
        }
        if Self::contains(&self.hang_keys, key)? {
            std::future::pending::<()>().await;
        }
        if Self::contains(&self.fail_keys, key)? {
            return Err(ObjectStoreError::Runtime(format!(
                "injected put failure: {key}"
            )));
        }

        let mut g = self
            .objects
            .lock()
            .map_err(|_| ObjectStoreError::Runtime("memory store mutex poisoned".to_string()))?;
        g.insert(
            key.to_string(),
            StoredObject {
                bytes,
                content_type: content_type.to_string(),
            },
        );
        Ok(())
    }

    async fn put_file(
        &self,
        key: &str,
        path: &Path,
        content_type: &str,
    ) -> Result<(), ObjectStoreError> {
        let bytes = tokio::fs::read(path).await?;
        self.put_bytes(key, bytes, content_type).await
    }

    async fn get_bytes(&self, key: &str) -> Result<Vec<u8>, ObjectStoreError> {
        self.check_reachable()?;
        self.object(key)
            .map(|o| o.bytes)
            .ok_or_else(|| ObjectStoreError::NotFound(key.to_string()))
    }

    async fn list_prefix(&self, prefix: &str) -> Result<Vec<String>, ObjectStoreError> {
        self.check_reachable()?;
        let prefix = prefix.trim_start_matches('/');
        Ok(self
            .keys()
            .into_iter()
            .filter(|k| k.starts_with(prefix) && !k.ends_with('/'))
            .collect())
    }
}
