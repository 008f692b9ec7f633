#![forbid(unsafe_code)]
#![cfg_attr(not(test), deny(clippy::expect_used, clippy::unwrap_used))]

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;

use lbl_core::S3Uri;
use lbl_manifest::{ClassIndex, JobMetadata, SchemaVariant};
use lbl_runtime::matcher::DEFAULT_EXTENSIONS;
use lbl_runtime::pipeline::{ImageSource, Pipeline, PipelineConfig, UnmappedPolicy};
use lbl_runtime::source::LabelColumns;
use lbl_runtime::store::open_store;
use lbl_runtime::uploader::{UploaderConfig, DEFAULT_UPLOAD_CONCURRENCY};

#[derive(Debug, Parser)]
#[command(name = "lbl-build-manifest")]
struct Args {
    /// Label source: .csv, .xlsx, .xls or .ods with an image column and a label column.
    #[arg(long, env = "LBL_LABELS")]
    labels: PathBuf,

    #[arg(long, env = "LBL_IMAGE_COLUMN", default_value = "image")]
    image_column: String,

    #[arg(long, env = "LBL_LABEL_COLUMN", default_value = "label")]
    label_column: String,

    /// Local directory holding the images. Mutually exclusive with --images-prefix.
    #[arg(long, env = "LBL_IMAGES_DIR", conflicts_with = "images_prefix")]
    images_dir: Option<PathBuf>,

    /// Key prefix in the destination bucket where the images already live (no upload).
    #[arg(long, env = "LBL_IMAGES_PREFIX")]
    images_prefix: Option<String>,

    /// Candidate extensions, probed in order.
    #[arg(long, env = "LBL_EXTENSIONS", value_delimiter = ',')]
    extensions: Vec<String>,

    /// Upload destination, `s3://bucket/prefix`.
    #[arg(long, env = "LBL_DEST")]
    dest: String,

    /// Manifest object key in the destination bucket.
    #[arg(long, env = "LBL_MANIFEST_KEY", default_value = "manifests/manifest.jsonl")]
    manifest_key: String,

    /// classification | class | index (or 1 | 2 | 3).
    #[arg(long, env = "LBL_SCHEMA", default_value = "class")]
    schema: String,

    /// Label attribute for the classification schema.
    #[arg(long, env = "LBL_LABEL_ATTRIBUTE")]
    label_attribute: Option<String>,

    #[arg(long, env = "LBL_JOB_NAME", default_value = "image-classification")]
    job_name: String,

    #[arg(long, env = "LBL_CONFIDENCE", default_value_t = 1.0)]
    confidence: f64,

    #[arg(long, env = "LBL_HUMAN_ANNOTATED", default_value_t = true, action = clap::ArgAction::Set)]
    human_annotated: bool,

    /// labels.tsv mapping class names to indices (index schema). Derived from the labels when omitted.
    #[arg(long, env = "LBL_CLASS_INDEX")]
    class_index: Option<PathBuf>,

    /// abort | skip: what to do with labels missing from the class index.
    #[arg(long, env = "LBL_UNMAPPED", default_value = "abort")]
    unmapped: String,

    #[arg(long, env = "LBL_UPLOAD_CONCURRENCY", default_value_t = DEFAULT_UPLOAD_CONCURRENCY)]
    concurrency: usize,

    /// Per-image transfer timeout; 0 disables it.
    #[arg(long, env = "LBL_TRANSFER_TIMEOUT_SECS", default_value_t = 300)]
    transfer_timeout_secs: u64,

    /// Mirror the bucket under this local directory instead of talking to S3.
    #[arg(long, env = "LBL_LOCAL_ROOT")]
    local_root: Option<PathBuf>,

    /// Best-effort create the destination bucket first (useful against MinIO).
    #[arg(long, env = "LBL_CREATE_BUCKET")]
    create_bucket: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    lbl_observe::logging::init_tracing();
    let args = Args::parse();

    let dest = S3Uri::parse(&args.dest)?;
    let schema = SchemaVariant::parse(&args.schema, args.label_attribute.as_deref())?;
    let unmapped = UnmappedPolicy::parse(&args.unmapped)
        .with_context(|| format!("invalid --unmapped {:?} (expected abort|skip)", args.unmapped))?;

    let images = match (&args.images_dir, &args.images_prefix) {
        (Some(dir), None) => ImageSource::LocalDir(dir.clone()),
        (None, Some(prefix)) => ImageSource::Remote {
            prefix: prefix.clone(),
        },
        _ => anyhow::bail!("exactly one of --images-dir or --images-prefix is required"),
    };

    let class_index = match &args.class_index {
        Some(path) => {
            let bytes = tokio::fs::read(path)
                .await
                .with_context(|| format!("read class index {}", path.display()))?;
            Some(ClassIndex::parse_labels_tsv(&bytes)?)
        }
        None => None,
    };

    let extensions = if args.extensions.is_empty() {
        DEFAULT_EXTENSIONS.iter().map(|e| e.to_string()).collect()
    } else {
        args.extensions.clone()
    };

    let mut job = JobMetadata::new(args.job_name.clone());
    job.confidence = args.confidence;
    job.human_annotated = args.human_annotated;

    let cfg = PipelineConfig {
        label_source: args.labels.clone(),
        columns: LabelColumns {
            image: args.image_column.clone(),
            label: args.label_column.clone(),
        },
        images,
        extensions,
        upload: UploaderConfig {
            prefix: dest.key.clone(),
            concurrency: args.concurrency,
            transfer_timeout: (args.transfer_timeout_secs > 0)
                .then(|| Duration::from_secs(args.transfer_timeout_secs)),
        },
        manifest_key: args.manifest_key.clone(),
        schema,
        job,
        class_index,
        unmapped,
    };

    let store = open_store(&dest.bucket, args.local_root.as_deref(), args.create_bucket).await?;
    let outcome = Pipeline::new(cfg, store).run().await?;

    for row in &outcome.unmatched {
        tracing::warn!(
            target: "lbl_proof",
            event = "row_unmatched",
            image = row.image_identifier.as_str(),
            class = row.class_label.as_str(),
            "no image found for label row"
        );
    }
    println!("{}", outcome.summary);
    Ok(())
}
