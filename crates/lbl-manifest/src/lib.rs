#![forbid(unsafe_code)]
#![cfg_attr(not(test), deny(clippy::expect_used, clippy::unwrap_used))]

//! Manifest records for managed image-classification services.
//!
//! A manifest is newline-delimited JSON, one record per labeled image. Three record shapes are
//! in circulation; which one to produce is always configured, never sniffed from input.

pub mod class_index;
pub mod convert;
pub mod decode;
pub mod encode;
pub mod schema;
pub mod writer;

pub use class_index::{ClassIndex, ClassIndexError};
pub use convert::{convert_manifest, ConvertError};
pub use decode::{decode_line, decode_manifest, decode_record, DecodeError, LabeledRef};
pub use encode::{creation_date_now, EncodeError, Encoder, JobMetadata, ManifestRecord};
pub use schema::{SchemaParseError, SchemaVariant};
pub use writer::{to_jsonl, write_manifest, WriteError, WrittenManifest};
