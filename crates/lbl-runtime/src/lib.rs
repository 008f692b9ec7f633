#![forbid(unsafe_code)]
#![cfg_attr(not(test), deny(clippy::expect_used, clippy::unwrap_used))]

pub mod bounded;
pub mod matcher;
pub mod pipeline;
pub mod source;
pub mod store;
pub mod uploader;

pub use matcher::{DirCorpus, ImageCorpus, ImageMatcher, MatchReport, NameSetCorpus};
pub use pipeline::{
    ImageSource, Pipeline, PipelineConfig, PipelineError, RunOutcome, UnmappedPolicy,
};
pub use source::{read_label_rows, rows_from_table, LabelColumns, SourceFormatError};
pub use store::{open_store, Location};
pub use uploader::{UploadMetrics, Uploader, UploaderConfig, UploaderConfigError};
