use lbl_store::{ObjectStore, ObjectStoreError, JSONL_CONTENT_TYPE};
use thiserror::Error;
use tracing::info;

use crate::encode::ManifestRecord;

#[derive(Debug, Error)]
pub enum WriteError {
    #[error("serialize manifest record {index}: {source}")]
    Serialize {
        index: usize,
        #[source]
        source: serde_json::Error,
    },
    #[error("write manifest {uri}: {source}")]
    Store {
        uri: String,
        #[source]
        source: ObjectStoreError,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WrittenManifest {
    pub key: String,
    pub uri: String,
    pub records: u64,
    pub bytes: u64,
}

/// Compact JSON per record, joined with `\n`. No array wrapper, no trailing newline.
pub fn to_jsonl(records: &[ManifestRecord]) -> Result<Vec<u8>, WriteError> {
    let mut out: Vec<u8> = Vec::with_capacity(records.len() * 256);
    for (index, record) in records.iter().enumerate() {
        if index > 0 {
            out.push(b'\n');
        }
        serde_json::to_writer(&mut out, record)
            .map_err(|source| WriteError::Serialize { index, source })?;
    }
    Ok(out)
}

/// Persists `records` as a single object at `key`, replacing whatever is there.
///
/// Single attempt; a store failure is fatal to the caller.
pub async fn write_manifest(
    store: &dyn ObjectStore,
    key: &str,
    records: &[ManifestRecord],
) -> Result<WrittenManifest, WriteError> {
    let bytes = to_jsonl(records)?;
    let len = bytes.len() as u64;
    let uri = store.uri_for(key);

    store
        .put_bytes(key, bytes, JSONL_CONTENT_TYPE)
        .await
        .map_err(|source| WriteError::Store {
            uri: uri.clone(),
            source,
        })?;

    info!(
        target: "lbl_proof",
        event = "manifest_written",
        backend = store.backend_tag(),
        bucket = store.bucket(),
        key,
        records = records.len() as u64,
        bytes = len,
        "manifest written"
    );

    Ok(WrittenManifest {
        key: key.to_string(),
        uri,
        records: records.len() as u64,
        bytes: len,
    })
}
