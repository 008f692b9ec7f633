#![forbid(unsafe_code)]
#![cfg_attr(not(test), deny(clippy::expect_used, clippy::unwrap_used))]

pub mod fs;
pub mod memory;
#[cfg(feature = "s3")]
pub mod s3;

use std::path::Path;

use async_trait::async_trait;
use thiserror::Error;

pub use fs::FsObjectStore;
pub use memory::{MemoryObjectStore, StoredObject};
#[cfg(feature = "s3")]
pub use s3::S3ObjectStore;

/// Content type used for newline-delimited JSON manifests.
pub const JSONL_CONTENT_TYPE: &str = "application/x-ndjson";

#[derive(Debug, Error)]
pub enum ObjectStoreError {
    #[error("invalid object key: {0:?}")]
    InvalidKey(String),
    #[error("object not found: {0}")]
    NotFound(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("{0}")]
    Runtime(String),
}

/// The three remote-storage primitives the pipeline needs, over a single bucket.
///
/// - Writes are last-writer-wins; there is no conditional put.
/// - Keys are relative to the bucket and never start with `/`.
/// - Every call is a single attempt. Callers decide what a failure means.
#[async_trait]
pub trait ObjectStore: Send + Sync + 'static {
    fn backend_tag(&self) -> &'static str;

    fn bucket(&self) -> &str;

    /// The `s3://` URI an object written under `key` is addressed by.
    fn uri_for(&self, key: &str) -> String {
        format!("s3://{}/{}", self.bucket(), key.trim_start_matches('/'))
    }

    async fn put_bytes(
        &self,
        key: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<(), ObjectStoreError>;

    async fn put_file(
        &self,
        key: &str,
        path: &Path,
        content_type: &str,
    ) -> Result<(), ObjectStoreError>;

    async fn get_bytes(&self, key: &str) -> Result<Vec<u8>, ObjectStoreError>;

    /// Keys under `prefix`, sorted. Directory placeholder keys (ending in `/`) are skipped.
    async fn list_prefix(&self, prefix: &str) -> Result<Vec<String>, ObjectStoreError>;
}

/// Content type for an image file, guessed from its extension.
pub fn content_type_for(file_name: &str) -> &'static str {
    let ext = file_name
        .rsplit_once('.')
        .map(|(_, e)| e.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "bmp" => "image/bmp",
        "webp" => "image/webp",
        "jsonl" | "ndjson" => JSONL_CONTENT_TYPE,
        _ => "application/octet-stream",
    }
}

pub(crate) fn validate_key(key: &str) -> Result<(), ObjectStoreError> {
    let bad = key.trim().is_empty()
        || key.starts_with('/')
        || key.contains('\\')
        || key.split('/').any(|part| part == "..");
    if bad {
        return Err(ObjectStoreError::InvalidKey(key.to_string()));
    }
    Ok(())
}

pub(crate) fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), std::io::Error> {
    use std::io::Write;

    let parent = path.parent().ok_or_else(|| {
        std::io::Error::new(std::io::ErrorKind::InvalidInput, "path must have parent")
    })?;
    std::fs::create_dir_all(parent)?;

    let mut tmp = path.to_path_buf();
    let suffix = format!(
        "tmp.{}.{}",
        std::process::id(),
        lbl_observe::time::unix_time_ms()
    );
    let file_name = path
        .file_name()
        .and_then(|s| s.to_str())
        .ok_or_else(|| std::io::Error::new(std::io::ErrorKind::InvalidInput, "bad filename"))?;
    tmp.set_file_name(format!(".{file_name}.{suffix}"));

    {
        let mut f = std::fs::OpenOptions::new()
            .create_new(true)
            .write(true)
            .open(&tmp)?;
        f.write_all(bytes)?;
        f.sync_all()?;
    }

    std::fs::rename(tmp, path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_type_by_extension() {
        assert_eq!(content_type_for("car1.jpg"), "image/jpeg");
        assert_eq!(content_type_for("car1.JPEG"), "image/jpeg");
        assert_eq!(content_type_for("car2.png"), "image/png");
        assert_eq!(content_type_for("m.jsonl"), JSONL_CONTENT_TYPE);
        assert_eq!(content_type_for("noext"), "application/octet-stream");
    }

    #[test]
    fn keys_are_validated() {
        assert!(validate_key("cars/car1.jpg").is_ok());
        assert!(validate_key("").is_err());
        assert!(validate_key("/abs").is_err());
        assert!(validate_key("a/../b").is_err());
        assert!(validate_key("a\\b").is_err());
    }
}
