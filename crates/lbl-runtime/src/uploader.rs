use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use lbl_core::{MatchedImage, UploadResult};
use lbl_observe::metrics::{Counter, DurationAgg, Gauge, ScopedTimer};
use lbl_store::{content_type_for, ObjectStore};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::bounded::run_bounded;

pub const DEFAULT_UPLOAD_CONCURRENCY: usize = 10;
pub const DEFAULT_TRANSFER_TIMEOUT: Duration = Duration::from_secs(300);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploaderConfig {
    /// Key prefix; each image lands at `{prefix}/{file_name}`.
    pub prefix: String,
    pub concurrency: usize,
    /// `None` waits forever on a stuck transfer.
    ///
    /// Expiry only stops waiting: the result is reported as failed, but a backend that writes on
    /// a blocking thread (the local mirror) may still complete the object afterwards.
    pub transfer_timeout: Option<Duration>,
}

impl Default for UploaderConfig {
    fn default() -> Self {
        Self {
            prefix: String::new(),
            concurrency: DEFAULT_UPLOAD_CONCURRENCY,
            transfer_timeout: Some(DEFAULT_TRANSFER_TIMEOUT),
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum UploaderConfigError {
    #[error("upload concurrency must be > 0")]
    ZeroConcurrency,
    #[error("transfer timeout must be > 0 (omit it to disable)")]
    ZeroTimeout,
}

impl UploaderConfig {
    pub fn validate(&self) -> Result<(), UploaderConfigError> {
        if self.concurrency == 0 {
            return Err(UploaderConfigError::ZeroConcurrency);
        }
        if self.transfer_timeout.is_some_and(|t| t.is_zero()) {
            return Err(UploaderConfigError::ZeroTimeout);
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct UploadMetrics {
    pub started: Counter,
    pub succeeded: Counter,
    pub failed: Counter,
    pub inflight: Counter,
    pub inflight_high_water: Gauge,
    pub transfer: DurationAgg,
}

/// Copies matched local images to the object store, `concurrency` at a time.
///
/// One attempt per image. A failed or timed-out transfer becomes a failed `UploadResult` and
/// never stops the others.
pub struct Uploader {
    store: Arc<dyn ObjectStore>,
    cfg: UploaderConfig,
    metrics: Arc<UploadMetrics>,
}

impl Uploader {
    pub fn new(store: Arc<dyn ObjectStore>, cfg: UploaderConfig) -> Result<Self, UploaderConfigError> {
        cfg.validate()?;
        Ok(Self {
            store,
            cfg,
            metrics: Arc::new(UploadMetrics::default()),
        })
    }

    pub fn metrics(&self) -> Arc<UploadMetrics> {
        self.metrics.clone()
    }

    /// One result per input image, sorted by input index.
    pub async fn upload_all(&self, images: &[MatchedImage]) -> Vec<UploadResult> {
        let prefix = self.cfg.prefix.clone();
        let timeout = self.cfg.transfer_timeout;
        let store = self.store.clone();
        let metrics = self.metrics.clone();

        let done = run_bounded(images.to_vec(), self.cfg.concurrency, |index, image| {
            let store = store.clone();
            let metrics = metrics.clone();
            let key = image.remote_key(&prefix);
            async move { upload_one(store.as_ref(), &metrics, index, image, key, timeout).await }
        })
        .await;

        let mut results: Vec<UploadResult> = done
            .into_iter()
            .map(|(index, r)| {
                r.unwrap_or_else(|| {
                    self.metrics.failed.inc();
                    let (file_name, key) = images
                        .get(index)
                        .map(|m| (m.file_name.clone(), m.remote_key(&prefix)))
                        .unwrap_or_default();
                    UploadResult::failed(index, file_name, key, "upload task did not complete")
                })
            })
            .collect();
        results.sort_by_key(|r| r.index);

        let snap = self.metrics.transfer.snapshot();
        info!(
            target: "lbl_proof",
            event = "upload_complete",
            backend = self.store.backend_tag(),
            bucket = self.store.bucket(),
            prefix = self.cfg.prefix.as_str(),
            concurrency = self.cfg.concurrency as u64,
            attempted = results.len() as u64,
            succeeded = self.metrics.succeeded.get(),
            failed = self.metrics.failed.get(),
            inflight_high_water = self.metrics.inflight_high_water.get(),
            transfer_avg_ms = snap.avg_ns() / 1_000_000,
            transfer_max_ms = snap.max_ns / 1_000_000,
            "uploads complete"
        );
        results
    }
}

async fn upload_one(
    store: &dyn ObjectStore,
    metrics: &UploadMetrics,
    index: usize,
    image: MatchedImage,
    key: String,
    timeout: Option<Duration>,
) -> UploadResult {
    metrics.started.inc();
    metrics.inflight.inc();
    metrics.inflight_high_water.set_max(metrics.inflight.get());

    let outcome = {
        let _timer = ScopedTimer::new(&metrics.transfer);
        let put = store.put_file(
            &key,
            Path::new(&image.resolved_path),
            content_type_for(&image.file_name),
        );
        match timeout {
            Some(t) => match tokio::time::timeout(t, put).await {
                Ok(r) => r.map_err(|e| e.to_string()),
                Err(_) => Err(format!("timed out after {t:?}")),
            },
            None => put.await.map_err(|e| e.to_string()),
        }
    };
    metrics.inflight.dec();

    match outcome {
        Ok(()) => {
            metrics.succeeded.inc();
            debug!(
                file_name = image.file_name.as_str(),
                key = key.as_str(),
                "uploaded"
            );
            UploadResult::ok(index, image.file_name, key)
        }
        Err(error) => {
            metrics.failed.inc();
            warn!(
                target: "lbl_proof",
                event = "upload_item_failed",
                file_name = image.file_name.as_str(),
                key = key.as_str(),
                error = error.as_str(),
                "upload failed"
            );
            UploadResult::failed(index, image.file_name, key, error)
        }
    }
}
