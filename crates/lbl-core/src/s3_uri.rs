use std::fmt;

use thiserror::Error;

/// A `s3://bucket/key` location. `key` may be empty (bucket root) or a prefix.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct S3Uri {
    pub bucket: String,
    pub key: String,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum S3UriParseError {
    #[error("empty s3 uri")]
    Empty,
    #[error("invalid s3 uri {0:?}; expected s3://bucket[/key]")]
    MissingScheme(String),
    #[error("invalid s3 uri {0:?}; missing bucket")]
    MissingBucket(String),
}

impl S3Uri {
    pub fn new(bucket: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            key: key.into(),
        }
    }

    pub fn parse(input: &str) -> Result<Self, S3UriParseError> {
        let input = input.trim();
        if input.is_empty() {
            return Err(S3UriParseError::Empty);
        }
        let rest = input
            .strip_prefix("s3://")
            .ok_or_else(|| S3UriParseError::MissingScheme(input.to_string()))?;
        let (bucket, key) = match rest.split_once('/') {
            Some((b, k)) => (b.trim(), k.trim_start_matches('/')),
            None => (rest.trim(), ""),
        };
        if bucket.is_empty() {
            return Err(S3UriParseError::MissingBucket(input.to_string()));
        }
        Ok(Self::new(bucket, key))
    }

    pub fn is_s3(input: &str) -> bool {
        input.trim().starts_with("s3://")
    }

    /// Treats `key` as a prefix and appends `name` under it.
    pub fn join(&self, name: &str) -> Self {
        Self::new(self.bucket.clone(), crate::join_key(&self.key, name))
    }
}

impl fmt::Display for S3Uri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "s3://{}/{}", self.bucket, self.key)
    }
}
