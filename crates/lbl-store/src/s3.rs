use std::path::Path;

use async_trait::async_trait;
use aws_sdk_s3::primitives::{AggregatedBytes, ByteStream};
use tracing::warn;

use crate::{validate_key, ObjectStore, ObjectStoreError};

#[derive(Debug, Clone)]
pub struct S3ObjectStore {
    client: aws_sdk_s3::Client,
    bucket: String,
}

impl S3ObjectStore {
    pub fn new(client: aws_sdk_s3::Client, bucket: impl Into<String>) -> Self {
        Self {
            client,
            bucket: bucket.into(),
        }
    }

    /// Build a store for `bucket` using [`client_from_env`].
    pub async fn from_env(bucket: impl Into<String>) -> Result<Self, ObjectStoreError> {
        let client = client_from_env().await?;
        Ok(Self::new(client, bucket))
    }

    /// Best-effort bucket creation (ignore "already exists/owned" errors).
    pub async fn ensure_bucket(&self) {
        if let Err(err) = self.client.create_bucket().bucket(&self.bucket).send().await {
            warn!(
                ?err,
                bucket = self.bucket.as_str(),
                "create_bucket failed (continuing)"
            );
        }
    }

    async fn put_stream(
        &self,
        key: &str,
        body: ByteStream,
        content_type: &str,
    ) -> Result<(), ObjectStoreError> {
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .content_type(content_type)
            .body(body)
            .send()
            .await
            .map_err(|err| map_put_err(&self.bucket, key, err))?;
        Ok(())
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    fn backend_tag(&self) -> &'static str {
        "s3"
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
        validate_key(key)?;
        self.put_stream(key, ByteStream::from(bytes), content_type)
            .await
    }

    async fn put_file(
        &self,
        key: &str,
        path: &Path,
        content_type: &str,
    ) -> Result<(), ObjectStoreError> {
        validate_key(key)?;
        let body = ByteStream::from_path(path).await.map_err(|e| {
            ObjectStoreError::Runtime(format!(
                "ByteStream::from_path failed: {}: {e}",
                path.display()
            ))
        })?;
        self.put_stream(key, body, content_type).await
    }

    async fn get_bytes(&self, key: &str) -> Result<Vec<u8>, ObjectStoreError> {
        validate_key(key)?;
        let out = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|err| map_get_err(key, err))?;
        let bytes: AggregatedBytes = out.body.collect().await.map_err(|e| {
            ObjectStoreError::Runtime(format!("get_object body collect failed: {e:?}"))
        })?;
        Ok(bytes.into_bytes().to_vec())
    }

    async fn list_prefix(&self, prefix: &str) -> Result<Vec<String>, ObjectStoreError> {
        let prefix = prefix.trim_start_matches('/');
        let mut keys: Vec<String> = Vec::new();
        let mut token: Option<String> = None;
        loop {
            let mut req = self.client.list_objects_v2().bucket(&self.bucket);
            if !prefix.is_empty() {
                req = req.prefix(prefix);
            }
            if let Some(t) = token.as_deref() {
                req = req.continuation_token(t);
            }
            let resp = req.send().await.map_err(|err| {
                ObjectStoreError::Runtime(format!(
                    "s3 list_objects_v2 failed: s3://{}/{prefix}: {err:?}",
                    self.bucket
                ))
            })?;
            if let Some(contents) = resp.contents {
                for obj in contents {
                    let Some(k) = obj.key else { continue };
                    if k.ends_with('/') {
                        continue;
                    }
                    keys.push(k);
                }
            }
            if resp.is_truncated.unwrap_or(false) {
                token = resp.next_continuation_token;
                if token.is_none() {
                    break;
                }
            } else {
                break;
            }
        }
        keys.sort();
        Ok(keys)
    }
}

/// Build an S3 client from the ambient environment.
///
/// - Default: standard AWS resolution (region/creds from env/config/role).
/// - Optional: override endpoint via `LBL_S3_ENDPOINT_URL` (for MinIO or other S3-compatible stores).
/// - Optional: `LBL_S3_FORCE_PATH_STYLE=1` to force path-style addressing (defaults on with an endpoint).
pub async fn client_from_env() -> Result<aws_sdk_s3::Client, ObjectStoreError> {
    let cfg = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;

    let endpoint_url: Option<String> = std::env::var("LBL_S3_ENDPOINT_URL").ok();
    let force_path_style = match parse_env_bool("LBL_S3_FORCE_PATH_STYLE")? {
        Some(v) => v,
        None => endpoint_url.is_some(),
    };

    let mut b = aws_sdk_s3::config::Builder::from(&cfg);
    if let Some(url) = endpoint_url {
        b = b.endpoint_url(url);
    }
    if force_path_style {
        b = b.force_path_style(true);
    }

    Ok(aws_sdk_s3::Client::from_conf(b.build()))
}

fn parse_env_bool(key: &str) -> Result<Option<bool>, ObjectStoreError> {
    match std::env::var(key) {
        Ok(v) => parse_bool(&v).map(Some).ok_or_else(|| {
            ObjectStoreError::Runtime(format!(
                "invalid boolean env var {}={:?} (expected true/false/1/0)",
                key, v
            ))
        }),
        Err(std::env::VarError::NotPresent) => Ok(None),
        Err(e) => Err(ObjectStoreError::Runtime(format!(
            "read env var {key} failed: {e}"
        ))),
    }
}

fn parse_bool(v: &str) -> Option<bool> {
    match v.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "y" | "on" => Some(true),
        "0" | "false" | "no" | "n" | "off" => Some(false),
        _ => None,
    }
}

fn map_put_err(
    bucket: &str,
    key: &str,
    err: aws_sdk_s3::error::SdkError<aws_sdk_s3::operation::put_object::PutObjectError>,
) -> ObjectStoreError {
    ObjectStoreError::Runtime(format!("s3 put_object failed: s3://{bucket}/{key}: {err:?}"))
}

fn map_get_err(
    key: &str,
    err: aws_sdk_s3::error::SdkError<aws_sdk_s3::operation::get_object::GetObjectError>,
) -> ObjectStoreError {
    match err {
        aws_sdk_s3::error::SdkError::ServiceError(ref se) => {
            if se.err().is_no_such_key() {
                ObjectStoreError::NotFound(key.to_string())
            } else {
                ObjectStoreError::Runtime(format!("s3 get_object service error: {err:?}"))
            }
        }
        other => ObjectStoreError::Runtime(format!("s3 get_object failed: {other:?}")),
    }
}
