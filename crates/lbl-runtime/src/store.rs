use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Result;
use lbl_core::S3Uri;
use lbl_store::{FsObjectStore, ObjectStore};

/// Opens the object store for `bucket`.
///
/// `local_root` mirrors the bucket into `<local_root>/<key>` on disk; otherwise the S3 client is
/// built from the ambient environment (see `lbl_store::s3::client_from_env`).
pub async fn open_store(
    bucket: &str,
    local_root: Option<&Path>,
    create_bucket: bool,
) -> Result<Arc<dyn ObjectStore>> {
    if let Some(root) = local_root {
        return Ok(Arc::new(FsObjectStore::new(root, bucket)));
    }
    open_s3(bucket, create_bucket).await
}

#[cfg(feature = "s3")]
async fn open_s3(bucket: &str, create_bucket: bool) -> Result<Arc<dyn ObjectStore>> {
    let store = lbl_store::S3ObjectStore::from_env(bucket).await?;
    if create_bucket {
        store.ensure_bucket().await;
    }
    Ok(Arc::new(store))
}

#[cfg(not(feature = "s3"))]
async fn open_s3(bucket: &str, _create_bucket: bool) -> Result<Arc<dyn ObjectStore>> {
    anyhow::bail!(
        "bucket {bucket:?} needs the 's3' feature (or pass --local-root to mirror it on disk)"
    )
}

/// A manifest location given on the command line: a local path or an `s3://` URI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Location {
    Local(PathBuf),
    Object(S3Uri),
}

impl Location {
    pub fn parse(input: &str) -> Result<Self> {
        if S3Uri::is_s3(input) {
            return Ok(Location::Object(S3Uri::parse(input)?));
        }
        if input.trim().is_empty() {
            anyhow::bail!("empty location");
        }
        Ok(Location::Local(PathBuf::from(input)))
    }
}

impl std::fmt::Display for Location {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Location::Local(p) => write!(f, "{}", p.display()),
            Location::Object(u) => write!(f, "{u}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn location_parse() {
        assert_eq!(
            Location::parse("s3://b/manifests/a.jsonl").unwrap(),
            Location::Object(S3Uri::new("b", "manifests/a.jsonl"))
        );
        assert_eq!(
            Location::parse("out/a.jsonl").unwrap(),
            Location::Local(PathBuf::from("out/a.jsonl"))
        );
        assert!(Location::parse("  ").is_err());
        assert!(Location::parse("s3://").is_err());
    }

    #[tokio::test]
    async fn local_root_opens_fs_store() -> Result<()> {
        let root = std::env::temp_dir().join(format!("lbl-open-store-{}", std::process::id()));
        let store = open_store("b", Some(root.as_path()), false).await?;
        assert_eq!(store.backend_tag(), "fs");
        assert_eq!(store.uri_for("k.jsonl"), "s3://b/k.jsonl");
        Ok(())
    }
}
