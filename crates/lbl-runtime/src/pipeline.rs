use std::path::PathBuf;
use std::sync::Arc;

use lbl_core::{LabelRow, MatchedImage, RunSummary, UploadResult};
use lbl_manifest::{
    write_manifest, ClassIndex, EncodeError, Encoder, JobMetadata, ManifestRecord, SchemaVariant,
    WriteError,
};
use lbl_store::{ObjectStore, ObjectStoreError};
use thiserror::Error;
use tracing::{info, warn};

use crate::matcher::{DirCorpus, ImageCorpus, ImageMatcher, MatchReport, NameSetCorpus};
use crate::source::{read_label_rows, LabelColumns, SourceFormatError};
use crate::uploader::{Uploader, UploaderConfig, UploaderConfigError};

/// Where the images named by the label source live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageSource {
    /// Local files, uploaded under the uploader prefix.
    LocalDir(PathBuf),
    /// Objects already in the destination bucket under this key prefix. Nothing is uploaded.
    Remote { prefix: String },
}

/// What to do with a label the class index does not know (index-labeled schema only).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnmappedPolicy {
    Abort,
    Skip,
}

impl UnmappedPolicy {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "abort" | "fail" => Some(UnmappedPolicy::Abort),
            "skip" => Some(UnmappedPolicy::Skip),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub label_source: PathBuf,
    pub columns: LabelColumns,
    pub images: ImageSource,
    pub extensions: Vec<String>,
    pub upload: UploaderConfig,
    pub manifest_key: String,
    pub schema: SchemaVariant,
    pub job: JobMetadata,
    /// Required mapping for the index-labeled schema. Derived from the run's labels when absent.
    pub class_index: Option<ClassIndex>,
    pub unmapped: UnmappedPolicy,
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Source(#[from] SourceFormatError),
    #[error(transparent)]
    Uploader(#[from] UploaderConfigError),
    #[error("list images under {prefix:?}: {source}")]
    ListImages {
        prefix: String,
        #[source]
        source: ObjectStoreError,
    },
    #[error(transparent)]
    Encode(#[from] EncodeError),
    #[error(transparent)]
    Write(#[from] WriteError),
}

#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub summary: RunSummary,
    pub uploads: Vec<UploadResult>,
    pub unmatched: Vec<LabelRow>,
    /// Set when the class index was derived during the run (and persisted beside the manifest).
    pub derived_class_index: Option<ClassIndex>,
}

/// rows -> matched images -> uploads -> manifest records -> manifest object, in one forward pass.
pub struct Pipeline {
    cfg: PipelineConfig,
    store: Arc<dyn ObjectStore>,
}

impl Pipeline {
    pub fn new(cfg: PipelineConfig, store: Arc<dyn ObjectStore>) -> Self {
        Self { cfg, store }
    }

    pub async fn run(&self) -> Result<RunOutcome, PipelineError> {
        let rows = read_label_rows(&self.cfg.label_source, &self.cfg.columns)?;
        info!(
            target: "lbl_proof",
            event = "labels_loaded",
            source = %self.cfg.label_source.display(),
            rows = rows.len() as u64,
            "label rows loaded"
        );
        self.run_rows(rows).await
    }

    pub async fn run_rows(&self, rows: Vec<LabelRow>) -> Result<RunOutcome, PipelineError> {
        let cfg = &self.cfg;
        info!(
            target: "lbl_proof",
            event = "run_start",
            bucket = self.store.bucket(),
            manifest_key = cfg.manifest_key.as_str(),
            schema = %cfg.schema,
            rows = rows.len() as u64,
            "run starting"
        );

        let uploader = Uploader::new(self.store.clone(), cfg.upload.clone())?;
        let matcher = ImageMatcher::new(&cfg.extensions);

        let corpus: Box<dyn ImageCorpus> = match &cfg.images {
            ImageSource::LocalDir(dir) => Box::new(DirCorpus::new(dir)),
            ImageSource::Remote { prefix } => {
                let keys = self.store.list_prefix(prefix).await.map_err(|source| {
                    PipelineError::ListImages {
                        prefix: prefix.clone(),
                        source,
                    }
                })?;
                Box::new(NameSetCorpus::from_keys(prefix, keys))
            }
        };
        let MatchReport { matched, unmatched } = matcher.match_rows(&rows, corpus.as_ref());
        info!(
            target: "lbl_proof",
            event = "match_complete",
            matched = matched.len() as u64,
            unmatched = unmatched.len() as u64,
            "image matching complete"
        );

        let uploads = match &cfg.images {
            ImageSource::LocalDir(_) => uploader.upload_all(&matched).await,
            ImageSource::Remote { .. } => matched
                .iter()
                .enumerate()
                .map(|(i, m)| UploadResult::ok(i, m.file_name.clone(), m.resolved_path.clone()))
                .collect(),
        };

        let derived_class_index = match (&cfg.class_index, cfg.schema.needs_class_index()) {
            (None, true) => Some(ClassIndex::from_labels_sorted(
                rows.iter().map(|r| r.class_label.as_str()),
            )),
            _ => None,
        };
        let class_index = cfg.class_index.clone().or_else(|| derived_class_index.clone());
        let encoder = Encoder::new(cfg.schema.clone(), cfg.job.clone(), class_index)?;

        let (records, unmapped_skipped) = self.encode_uploads(&encoder, &matched, &uploads)?;

        if let Some(index) = &derived_class_index {
            let key = labels_key_for(&cfg.manifest_key);
            self.store
                .put_bytes(&key, index.to_labels_tsv().into_bytes(), "text/tab-separated-values")
                .await
                .map_err(|source| {
                    PipelineError::Write(WriteError::Store {
                        uri: self.store.uri_for(&key),
                        source,
                    })
                })?;
            info!(
                target: "lbl_proof",
                event = "class_index_written",
                key = key.as_str(),
                classes = index.len() as u64,
                "derived class index written"
            );
        }

        let written = write_manifest(self.store.as_ref(), &cfg.manifest_key, &records).await?;

        let uploaded = uploads.iter().filter(|u| u.succeeded).count() as u64;
        let summary = RunSummary {
            rows: rows.len() as u64,
            matched: matched.len() as u64,
            unmatched: unmatched.len() as u64,
            uploaded,
            upload_failed: uploads.len() as u64 - uploaded,
            unmapped_skipped,
            records: written.records,
            manifest_uri: written.uri,
        };
        info!(
            target: "lbl_proof",
            event = "run_complete",
            rows = summary.rows,
            matched = summary.matched,
            unmatched = summary.unmatched,
            uploaded = summary.uploaded,
            upload_failed = summary.upload_failed,
            unmapped_skipped = summary.unmapped_skipped,
            records = summary.records,
            manifest = summary.manifest_uri.as_str(),
            "run complete"
        );

        Ok(RunOutcome {
            summary,
            uploads,
            unmatched,
            derived_class_index,
        })
    }

    /// One record per successful upload, in input order.
    fn encode_uploads(
        &self,
        encoder: &Encoder,
        matched: &[MatchedImage],
        uploads: &[UploadResult],
    ) -> Result<(Vec<ManifestRecord>, u64), PipelineError> {
        let mut ok: Vec<&UploadResult> = uploads.iter().filter(|u| u.succeeded).collect();
        ok.sort_by_key(|u| u.index);

        let mut records = Vec::with_capacity(ok.len());
        let mut skipped = 0u64;
        for u in ok {
            let Some(image) = matched.get(u.index) else {
                continue;
            };
            let source_ref = self.store.uri_for(&u.remote_key);
            match encoder.encode(&source_ref, &image.row.class_label) {
                Ok(r) => records.push(r),
                Err(EncodeError::UnmappedClass(class)) if self.cfg.unmapped == UnmappedPolicy::Skip => {
                    skipped += 1;
                    warn!(
                        target: "lbl_proof",
                        event = "record_skipped_unmapped",
                        class = class.as_str(),
                        source_ref = source_ref.as_str(),
                        "class not in index; record skipped"
                    );
                }
                Err(e) => return Err(e.into()),
            }
        }
        Ok((records, skipped))
    }
}

/// `manifests/run.jsonl` -> `manifests/run.labels.tsv`.
pub fn labels_key_for(manifest_key: &str) -> String {
    let (dir, name) = match manifest_key.rsplit_once('/') {
        Some((d, n)) => (Some(d), n),
        None => (None, manifest_key),
    };
    let stem = match name.rsplit_once('.') {
        Some((s, _)) if !s.is_empty() => s,
        _ => name,
    };
    match dir {
        Some(d) => format!("{d}/{stem}.labels.tsv"),
        None => format!("{stem}.labels.tsv"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn labels_key_sits_beside_manifest() {
        assert_eq!(
            labels_key_for("manifests/car-damage.jsonl"),
            "manifests/car-damage.labels.tsv"
        );
        assert_eq!(labels_key_for("m.jsonl"), "m.labels.tsv");
        assert_eq!(labels_key_for("a/b/noext"), "a/b/noext.labels.tsv");
    }

    #[test]
    fn unmapped_policy_parse() {
        assert_eq!(UnmappedPolicy::parse("Abort"), Some(UnmappedPolicy::Abort));
        assert_eq!(UnmappedPolicy::parse("skip"), Some(UnmappedPolicy::Skip));
        assert_eq!(UnmappedPolicy::parse("ignore"), None);
    }
}
