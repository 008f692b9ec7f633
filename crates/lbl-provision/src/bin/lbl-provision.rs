#![forbid(unsafe_code)]
#![cfg_attr(not(test), deny(clippy::expect_used, clippy::unwrap_used))]

#[cfg(feature = "rekognition")]
use anyhow::{Context, Result};

#[cfg(feature = "rekognition")]
use clap::Parser;

#[cfg(not(feature = "rekognition"))]
fn main() {
    eprintln!(
        "lbl-provision requires feature 'rekognition' (run with: cargo run -p lbl-provision --features rekognition --bin lbl-provision -- ...)"
    );
    std::process::exit(2);
}

#[cfg(feature = "rekognition")]
#[derive(Debug, Parser)]
#[command(name = "lbl-provision")]
struct Args {
    /// Project name; created if no project with exactly this name exists.
    #[arg(long, env = "LBL_PROJECT_NAME")]
    project: String,

    /// Ground-truth manifest (s3://bucket/key) to register as a dataset.
    #[arg(long, env = "LBL_DATASET_MANIFEST")]
    manifest: Option<String>,

    /// train | test
    #[arg(long, env = "LBL_DATASET_TYPE", default_value = "train")]
    dataset_type: String,
}

#[cfg(feature = "rekognition")]
#[tokio::main]
async fn main() -> Result<()> {
    use lbl_core::S3Uri;
    use lbl_provision::{create_dataset, ensure_project, DatasetType, RekognitionProjectApi};

    lbl_observe::logging::init_tracing();
    let args = Args::parse();

    let dataset_type = DatasetType::parse(&args.dataset_type).with_context(|| {
        format!(
            "invalid --dataset-type {:?} (expected train|test)",
            args.dataset_type
        )
    })?;
    let manifest = args.manifest.as_deref().map(S3Uri::parse).transpose()?;

    let api = RekognitionProjectApi::from_env().await;
    let ensured = ensure_project(&api, &args.project).await?;
    let project = ensured.project();
    let status = if ensured.was_created() {
        "created"
    } else {
        "found"
    };
    println!("project={} status={status} arn={}", project.name, project.arn);

    if let Some(manifest) = manifest {
        let arn = create_dataset(&api, project, dataset_type, &manifest).await?;
        println!("dataset={dataset_type} arn={arn}");
    }
    Ok(())
}
