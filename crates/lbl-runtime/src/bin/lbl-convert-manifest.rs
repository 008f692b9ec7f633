#![forbid(unsafe_code)]
#![cfg_attr(not(test), deny(clippy::expect_used, clippy::unwrap_used))]

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;

use lbl_manifest::{
    convert_manifest, decode_manifest, to_jsonl, write_manifest, ClassIndex, Encoder, JobMetadata,
    SchemaVariant,
};
use lbl_runtime::pipeline::labels_key_for;
use lbl_runtime::store::{open_store, Location};

/// Rewrites a manifest from one record schema to another. Source references are kept as-is.
#[derive(Debug, Parser)]
#[command(name = "lbl-convert-manifest")]
struct Args {
    /// Input manifest: local path or s3://bucket/key.
    #[arg(long, env = "LBL_CONVERT_INPUT")]
    input: String,

    /// Output manifest: local path or s3://bucket/key.
    #[arg(long, env = "LBL_CONVERT_OUTPUT")]
    output: String,

    #[arg(long, env = "LBL_CONVERT_FROM")]
    from: String,

    #[arg(long, env = "LBL_CONVERT_TO")]
    to: String,

    /// Label attribute when reading the classification schema.
    #[arg(long, env = "LBL_CONVERT_FROM_ATTRIBUTE")]
    from_attribute: Option<String>,

    /// Label attribute when writing the classification schema.
    #[arg(long, env = "LBL_CONVERT_TO_ATTRIBUTE")]
    to_attribute: Option<String>,

    /// labels.tsv used to read index-labeled input without class-name metadata.
    #[arg(long, env = "LBL_CONVERT_FROM_CLASS_INDEX")]
    from_class_index: Option<PathBuf>,

    /// labels.tsv used for index-labeled output. Derived (sorted) from the input when omitted.
    #[arg(long, env = "LBL_CONVERT_TO_CLASS_INDEX")]
    to_class_index: Option<PathBuf>,

    #[arg(long, env = "LBL_JOB_NAME", default_value = "image-classification")]
    job_name: String,

    #[arg(long, env = "LBL_CONFIDENCE", default_value_t = 1.0)]
    confidence: f64,

    /// Mirror s3:// locations under this local directory instead of talking to S3.
    #[arg(long, env = "LBL_LOCAL_ROOT")]
    local_root: Option<PathBuf>,
}

async fn read_class_index(path: Option<&Path>) -> Result<Option<ClassIndex>> {
    let Some(path) = path else {
        return Ok(None);
    };
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("read class index {}", path.display()))?;
    Ok(Some(ClassIndex::parse_labels_tsv(&bytes)?))
}

async fn read_text(loc: &Location, args: &Args) -> Result<String> {
    let bytes = match loc {
        Location::Local(path) => tokio::fs::read(path)
            .await
            .with_context(|| format!("read {}", path.display()))?,
        Location::Object(uri) => {
            let store = open_store(&uri.bucket, args.local_root.as_deref(), false).await?;
            store.get_bytes(&uri.key).await?
        }
    };
    String::from_utf8(bytes).with_context(|| format!("{loc} is not utf-8"))
}

async fn write_bytes(loc: &Location, args: &Args, bytes: Vec<u8>, content_type: &str) -> Result<()> {
    match loc {
        Location::Local(path) => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                tokio::fs::create_dir_all(parent).await?;
            }
            tokio::fs::write(path, bytes)
                .await
                .with_context(|| format!("write {}", path.display()))?;
        }
        Location::Object(uri) => {
            let store = open_store(&uri.bucket, args.local_root.as_deref(), false).await?;
            store.put_bytes(&uri.key, bytes, content_type).await?;
        }
    }
    Ok(())
}

fn sibling_labels_location(loc: &Location) -> Location {
    match loc {
        Location::Local(path) => {
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            Location::Local(path.with_file_name(labels_key_for(&name)))
        }
        Location::Object(uri) => {
            let mut uri = uri.clone();
            uri.key = labels_key_for(&uri.key);
            Location::Object(uri)
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    lbl_observe::logging::init_tracing();
    let args = Args::parse();

    let from = SchemaVariant::parse(&args.from, args.from_attribute.as_deref())?;
    let to = SchemaVariant::parse(&args.to, args.to_attribute.as_deref())?;
    let input = Location::parse(&args.input)?;
    let output = Location::parse(&args.output)?;

    let from_index = read_class_index(args.from_class_index.as_deref()).await?;
    let text = read_text(&input, &args).await?;

    let mut derived = None;
    let to_index = match read_class_index(args.to_class_index.as_deref()).await? {
        Some(ci) => Some(ci),
        None if to.needs_class_index() => {
            let refs = decode_manifest(&text, &from, from_index.as_ref())?;
            let ci = ClassIndex::from_labels_sorted(refs.iter().map(|r| r.class_name.as_str()));
            derived = Some(ci.clone());
            Some(ci)
        }
        None => None,
    };

    // One creation-date for the whole run.
    let mut job = JobMetadata::new(args.job_name.clone());
    job.confidence = args.confidence;
    let encoder = Encoder::new(to.clone(), job, to_index)?;
    let records = convert_manifest(&text, &from, from_index.as_ref(), &encoder)?;

    if let Some(ci) = &derived {
        let labels = sibling_labels_location(&output);
        write_bytes(&labels, &args, ci.to_labels_tsv().into_bytes(), "text/tab-separated-values")
            .await?;
        tracing::info!(
            target: "lbl_proof",
            event = "class_index_written",
            location = %labels,
            classes = ci.len() as u64,
            "derived class index written"
        );
    }

    let n = records.len();
    match &output {
        Location::Object(uri) => {
            let store = open_store(&uri.bucket, args.local_root.as_deref(), false).await?;
            write_manifest(store.as_ref(), &uri.key, &records).await?;
        }
        Location::Local(_) => {
            write_bytes(&output, &args, to_jsonl(&records)?, lbl_store::JSONL_CONTENT_TYPE).await?;
        }
    }

    tracing::info!(
        target: "lbl_proof",
        event = "convert_complete",
        from = %from,
        to = %to,
        records = n as u64,
        output = %output,
        "manifest converted"
    );
    println!("records={n} from={from} to={to} output={output}");
    Ok(())
}
