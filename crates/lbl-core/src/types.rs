use std::fmt;

use serde::{Deserialize, Serialize};

/// One row of the label source.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LabelRow {
    pub image_identifier: String,
    pub class_label: String,
}

impl LabelRow {
    pub fn new(image_identifier: impl Into<String>, class_label: impl Into<String>) -> Self {
        Self {
            image_identifier: image_identifier.into(),
            class_label: class_label.into(),
        }
    }
}

/// A label row whose image was found in the corpus.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchedImage {
    pub row: LabelRow,
    /// Local file path for directory corpora, full object key for remote corpora.
    pub resolved_path: String,
    pub file_name: String,
}

impl MatchedImage {
    /// Remote key this image is uploaded to. Depends only on `file_name`.
    pub fn remote_key(&self, prefix: &str) -> String {
        join_key(prefix, &self.file_name)
    }
}

/// Outcome of a single upload attempt.
///
/// `index` is the position of the originating `MatchedImage` in the uploader input and is the
/// join key back to its label row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadResult {
    pub index: usize,
    pub file_name: String,
    pub remote_key: String,
    pub succeeded: bool,
    pub error: Option<String>,
}

impl UploadResult {
    pub fn ok(index: usize, file_name: impl Into<String>, remote_key: impl Into<String>) -> Self {
        Self {
            index,
            file_name: file_name.into(),
            remote_key: remote_key.into(),
            succeeded: true,
            error: None,
        }
    }

    pub fn failed(
        index: usize,
        file_name: impl Into<String>,
        remote_key: impl Into<String>,
        error: impl Into<String>,
    ) -> Self {
        Self {
            index,
            file_name: file_name.into(),
            remote_key: remote_key.into(),
            succeeded: false,
            error: Some(error.into()),
        }
    }
}

/// End-of-run counts reported to the operator.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    pub rows: u64,
    pub matched: u64,
    pub unmatched: u64,
    pub uploaded: u64,
    pub upload_failed: u64,
    pub unmapped_skipped: u64,
    pub records: u64,
    pub manifest_uri: String,
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "rows={} matched={} unmatched={} uploaded={} upload_failed={} unmapped_skipped={} records={} manifest={}",
            self.rows,
            self.matched,
            self.unmatched,
            self.uploaded,
            self.upload_failed,
            self.unmapped_skipped,
            self.records,
            self.manifest_uri
        )
    }
}

/// Joins an object key prefix and a name with exactly one `/` between them.
///
/// An empty (or all-slash) prefix yields the bare name.
pub fn join_key(prefix: &str, name: &str) -> String {
    let p = prefix.trim_matches('/');
    let n = name.trim_start_matches('/');
    if p.is_empty() {
        n.to_string()
    } else {
        format!("{p}/{n}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_key_normalizes_slashes() {
        assert_eq!(join_key("cars/", "car1.jpg"), "cars/car1.jpg");
        assert_eq!(join_key("cars", "car1.jpg"), "cars/car1.jpg");
        assert_eq!(join_key("/a/b/", "/x.png"), "a/b/x.png");
        assert_eq!(join_key("", "x.png"), "x.png");
        assert_eq!(join_key("/", "x.png"), "x.png");
    }

    #[test]
    fn remote_key_depends_only_on_file_name() {
        let a = MatchedImage {
            row: LabelRow::new("car1", "scratch"),
            resolved_path: "/data/one/car1.jpg".to_string(),
            file_name: "car1.jpg".to_string(),
        };
        let b = MatchedImage {
            row: LabelRow::new("car1.jpg", "dent"),
            resolved_path: "/other/car1.jpg".to_string(),
            file_name: "car1.jpg".to_string(),
        };
        assert_eq!(a.remote_key("cars/"), b.remote_key("cars/"));
    }
}
