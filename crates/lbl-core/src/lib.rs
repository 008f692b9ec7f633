#![forbid(unsafe_code)]
#![cfg_attr(not(test), deny(clippy::expect_used, clippy::unwrap_used))]

pub mod s3_uri;
pub mod types;

pub use s3_uri::{S3Uri, S3UriParseError};
pub use types::{join_key, LabelRow, MatchedImage, RunSummary, UploadResult};
