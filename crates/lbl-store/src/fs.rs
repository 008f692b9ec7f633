use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::{validate_key, write_atomic, ObjectStore, ObjectStoreError};

/// A bucket mirrored into a local directory: object `key` lives at `root/key`.
///
/// Source refs still render as `s3://<bucket>/<key>` so manifests written against this store
/// match the ones a real bucket would produce.
#[derive(Debug, Clone)]
pub struct FsObjectStore {
    root: PathBuf,
    bucket: String,
}

impl FsObjectStore {
    pub fn new(root: impl Into<PathBuf>, bucket: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            bucket: bucket.into(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, ObjectStoreError> {
        validate_key(key)?;
        let mut p = self.root.clone();
        for part in key.split('/').filter(|s| !s.is_empty()) {
            p.push(part);
        }
        Ok(p)
    }

    fn collect_keys(dir: &Path, rel: &str, out: &mut Vec<String>) -> Result<(), std::io::Error> {
        for entry in std::fs::read_dir(dir)? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().to_string();
            if name.starts_with('.') {
                continue;
            }
            let key = if rel.is_empty() {
                name
            } else {
                format!("{rel}/{name}")
            };
            let ft = entry.file_type()?;
            if ft.is_dir() {
                Self::collect_keys(&entry.path(), &key, out)?;
            } else if ft.is_file() {
                out.push(key);
            }
        }
        Ok(())
    }
}

#[async_trait]
impl ObjectStore for FsObjectStore {
    fn backend_tag(&self) -> &'static str {
        "fs"
    }

    fn bucket(&self) -> &str {
        &self.bucket
    }

    async fn put_bytes(
        &self,
        key: &str,
        bytes: Vec<u8>,
        _content_type: &str,
    ) -> Result<(), ObjectStoreError> {
        let path = self.path_for(key)?;
        tokio::task::spawn_blocking(move || write_atomic(&path, &bytes))
            .await
            .map_err(|e| ObjectStoreError::Runtime(format!("fs put task failed: {e}")))??;
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
        let path = self.path_for(key)?;
        match tokio::fs::read(&path).await {
            Ok(b) => Ok(b),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(ObjectStoreError::NotFound(key.to_string()))
            }
            Err(e) => Err(ObjectStoreError::Io(e)),
        }
    }

    async fn list_prefix(&self, prefix: &str) -> Result<Vec<String>, ObjectStoreError> {
        let root = self.root.clone();
        let mut keys = tokio::task::spawn_blocking(move || -> Result<Vec<String>, std::io::Error> {
            let mut out = Vec::new();
            if root.is_dir() {
                Self::collect_keys(&root, "", &mut out)?;
            }
            Ok(out)
        })
        .await
        .map_err(|e| ObjectStoreError::Runtime(format!("fs list task failed: {e}")))??;

        let prefix = prefix.trim_start_matches('/');
        keys.retain(|k| k.starts_with(prefix));
        keys.sort();
        Ok(keys)
    }
}
