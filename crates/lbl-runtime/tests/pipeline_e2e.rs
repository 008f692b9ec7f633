use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use serde_json::Value;

use lbl_core::LabelRow;
use lbl_manifest::{ClassIndex, EncodeError, JobMetadata, SchemaVariant};
use lbl_runtime::pipeline::{
    ImageSource, Pipeline, PipelineConfig, PipelineError, UnmappedPolicy,
};
use lbl_runtime::source::LabelColumns;
use lbl_runtime::uploader::UploaderConfig;
use lbl_store::{FsObjectStore, MemoryObjectStore};

fn temp_dir(test_name: &str) -> Result<PathBuf> {
    let mut root = std::env::temp_dir();
    root.push(format!(
        "lbl-runtime-{test_name}-{}-{}",
        std::process::id(),
        lbl_observe::time::unix_time_ms()
    ));
    std::fs::create_dir_all(&root)?;
    Ok(root)
}

fn job() -> JobMetadata {
    JobMetadata {
        job_name: "car-damage-detection".to_string(),
        confidence: 1.0,
        human_annotated: true,
        creation_date: "2024-05-01T12:00:00.000000".to_string(),
    }
}

fn config(images_dir: &Path, schema: SchemaVariant) -> PipelineConfig {
    PipelineConfig {
        label_source: images_dir.join("labels.csv"),
        columns: LabelColumns::default(),
        images: ImageSource::LocalDir(images_dir.to_path_buf()),
        extensions: vec![".jpg".into(), ".jpeg".into(), ".png".into()],
        upload: UploaderConfig {
            prefix: "cars/".to_string(),
            concurrency: 10,
            transfer_timeout: Some(Duration::from_secs(10)),
        },
        manifest_key: "manifests/car-damage-detection-manifest.jsonl".to_string(),
        schema,
        job: job(),
        class_index: None,
        unmapped: UnmappedPolicy::Abort,
    }
}

fn manifest_lines(store: &MemoryObjectStore, key: &str) -> Result<Vec<Value>> {
    let obj = store
        .object(key)
        .ok_or_else(|| anyhow::anyhow!("manifest {key} not written"))?;
    let text = String::from_utf8(obj.bytes)?;
    if text.is_empty() {
        return Ok(Vec::new());
    }
    text.split('\n')
        .map(|l| serde_json::from_str(l).map_err(anyhow::Error::from))
        .collect()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn two_matched_rows_become_two_class_lines() -> Result<()> {
    let dir = temp_dir("e2e-class")?;
    std::fs::write(dir.join("car1.jpg"), b"jpg")?;
    std::fs::write(dir.join("car2.png"), b"png")?;
    std::fs::write(dir.join("labels.csv"), "image,label\ncar1,scratch\ncar2,dent\n")?;

    let store = Arc::new(MemoryObjectStore::new("b"));
    let cfg = config(&dir, SchemaVariant::ClassWithDate);
    let key = cfg.manifest_key.clone();
    let outcome = Pipeline::new(cfg, store.clone()).run().await?;

    let lines = manifest_lines(&store, &key)?;
    assert_eq!(lines.len(), 2);
    assert_eq!(lines[0]["source-ref"], "s3://b/cars/car1.jpg");
    assert_eq!(lines[0]["class"], "scratch");
    assert_eq!(lines[0]["class-metadata"]["class-name"], "scratch");
    assert_eq!(lines[0]["class-metadata"]["human-annotated"], "yes");
    assert_eq!(lines[1]["source-ref"], "s3://b/cars/car2.png");
    assert_eq!(lines[1]["class"], "dent");
    assert_eq!(lines[1]["class-metadata"]["class-name"], "dent");

    assert!(store.object("cars/car1.jpg").is_some());
    assert!(store.object("cars/car2.png").is_some());

    let s = outcome.summary;
    assert_eq!((s.rows, s.matched, s.unmatched), (2, 2, 0));
    assert_eq!((s.uploaded, s.upload_failed, s.records), (2, 0, 2));
    assert_eq!(
        s.manifest_uri,
        "s3://b/manifests/car-damage-detection-manifest.jsonl"
    );
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn unmatched_row_is_counted_not_failed() -> Result<()> {
    let dir = temp_dir("e2e-unmatched")?;
    std::fs::write(dir.join("car1.jpg"), b"jpg")?;
    std::fs::write(dir.join("car3.gif"), b"gif")?;

    let store = Arc::new(MemoryObjectStore::new("b"));
    let cfg = config(&dir, SchemaVariant::ClassWithDate);
    let key = cfg.manifest_key.clone();
    let outcome = Pipeline::new(cfg, store.clone())
        .run_rows(vec![
            LabelRow::new("car1", "scratch"),
            LabelRow::new("car3", "dent"),
        ])
        .await?;

    let lines = manifest_lines(&store, &key)?;
    assert_eq!(lines.len(), 1);
    assert_eq!(lines[0]["source-ref"], "s3://b/cars/car1.jpg");
    assert_eq!(outcome.summary.unmatched, 1);
    assert_eq!(outcome.unmatched, vec![LabelRow::new("car3", "dent")]);
    assert!(store.object("cars/car3.gif").is_none());
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn failed_upload_produces_no_manifest_line() -> Result<()> {
    let dir = temp_dir("e2e-upload-fail")?;
    for n in ["a", "b", "c"] {
        std::fs::write(dir.join(format!("{n}.jpg")), n.as_bytes())?;
    }
    let store = Arc::new(MemoryObjectStore::new("b"));
    store.fail_key("cars/b.jpg");

    let cfg = config(&dir, SchemaVariant::ClassWithDate);
    let key = cfg.manifest_key.clone();
    let outcome = Pipeline::new(cfg, store.clone())
        .run_rows(vec![
            LabelRow::new("a", "dent"),
            LabelRow::new("b", "dent"),
            LabelRow::new("c", "scratch"),
        ])
        .await?;

    let lines = manifest_lines(&store, &key)?;
    let refs: Vec<&str> = lines
        .iter()
        .filter_map(|l| l["source-ref"].as_str())
        .collect();
    assert_eq!(refs, vec!["s3://b/cars/a.jpg", "s3://b/cars/c.jpg"]);
    assert_eq!(outcome.summary.uploaded, 2);
    assert_eq!(outcome.summary.upload_failed, 1);
    assert_eq!(outcome.uploads.len(), 3);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn index_schema_aborts_on_unmapped_class() -> Result<()> {
    let dir = temp_dir("e2e-unmapped-abort")?;
    std::fs::write(dir.join("a.jpg"), b"a")?;
    std::fs::write(dir.join("b.jpg"), b"b")?;

    let store = Arc::new(MemoryObjectStore::new("b"));
    let mut cfg = config(&dir, SchemaVariant::IndexLabeled);
    cfg.class_index = Some(ClassIndex::from_names(["dent"])?);
    let key = cfg.manifest_key.clone();

    let err = Pipeline::new(cfg, store.clone())
        .run_rows(vec![LabelRow::new("a", "dent"), LabelRow::new("b", "glass")])
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        PipelineError::Encode(EncodeError::UnmappedClass(ref c)) if c == "glass"
    ));
    assert!(store.object(&key).is_none());
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn index_schema_can_skip_unmapped_class() -> Result<()> {
    let dir = temp_dir("e2e-unmapped-skip")?;
    std::fs::write(dir.join("a.jpg"), b"a")?;
    std::fs::write(dir.join("b.jpg"), b"b")?;

    let store = Arc::new(MemoryObjectStore::new("b"));
    let mut cfg = config(&dir, SchemaVariant::IndexLabeled);
    cfg.class_index = Some(ClassIndex::from_names(["scratch", "dent"])?);
    cfg.unmapped = UnmappedPolicy::Skip;
    let key = cfg.manifest_key.clone();

    let outcome = Pipeline::new(cfg, store.clone())
        .run_rows(vec![LabelRow::new("a", "dent"), LabelRow::new("b", "glass")])
        .await?;
    let lines = manifest_lines(&store, &key)?;
    assert_eq!(lines.len(), 1);
    assert_eq!(lines[0]["image-label"], 1);
    assert_eq!(lines[0]["image-label-metadata"]["type"], "groundtruth/image-classification");
    assert_eq!(outcome.summary.unmapped_skipped, 1);
    assert!(outcome.derived_class_index.is_none());
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn index_schema_derives_and_persists_class_index() -> Result<()> {
    let dir = temp_dir("e2e-derived-index")?;
    std::fs::write(dir.join("a.jpg"), b"a")?;
    std::fs::write(dir.join("b.png"), b"b")?;

    let store = Arc::new(MemoryObjectStore::new("b"));
    let cfg = config(&dir, SchemaVariant::IndexLabeled);
    let outcome = Pipeline::new(cfg, store.clone())
        .run_rows(vec![LabelRow::new("a", "scratch"), LabelRow::new("b", "dent")])
        .await?;

    let derived = outcome.derived_class_index.unwrap();
    assert_eq!(derived.index_of("dent"), Some(0));
    assert_eq!(derived.index_of("scratch"), Some(1));

    let tsv = store
        .object("manifests/car-damage-detection-manifest.labels.tsv")
        .unwrap();
    assert_eq!(ClassIndex::parse_labels_tsv(&tsv.bytes)?, derived);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn remote_corpus_builds_manifest_without_uploading() -> Result<()> {
    let dir = temp_dir("e2e-remote")?;
    let store = Arc::new(MemoryObjectStore::new("b"));
    store.seed("raw/car1.jpeg", b"x".to_vec());
    store.seed("raw/car2.png", b"y".to_vec());

    let mut cfg = config(&dir, SchemaVariant::Classification {
        label_attribute: "damage".to_string(),
    });
    cfg.images = ImageSource::Remote {
        prefix: "raw/".to_string(),
    };
    let key = cfg.manifest_key.clone();

    let outcome = Pipeline::new(cfg, store.clone())
        .run_rows(vec![
            LabelRow::new("car1", "scratch"),
            LabelRow::new("car2.jpg", "dent"),
            LabelRow::new("car9", "dent"),
        ])
        .await?;

    let lines = manifest_lines(&store, &key)?;
    assert_eq!(lines.len(), 2);
    assert_eq!(lines[0]["source-ref"], "s3://b/raw/car1.jpeg");
    assert_eq!(lines[0]["damage"], "scratch");
    assert_eq!(lines[1]["source-ref"], "s3://b/raw/car2.png");
    assert_eq!(outcome.summary.unmatched, 1);
    // Only the manifest was put; seeded images were not re-uploaded.
    assert_eq!(store.put_calls(), 1);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn unreachable_manifest_destination_is_fatal() -> Result<()> {
    let dir = temp_dir("e2e-write-fail")?;
    std::fs::write(dir.join("a.jpg"), b"a")?;
    let store = Arc::new(MemoryObjectStore::new("b"));
    store.set_unreachable(true);

    let err = Pipeline::new(config(&dir, SchemaVariant::ClassWithDate), store)
        .run_rows(vec![LabelRow::new("a", "dent")])
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::Write(_)));
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn missing_label_column_aborts_before_any_upload() -> Result<()> {
    let dir = temp_dir("e2e-bad-source")?;
    std::fs::write(dir.join("a.jpg"), b"a")?;
    std::fs::write(dir.join("labels.csv"), "image,class\na,dent\n")?;
    let store = Arc::new(MemoryObjectStore::new("b"));

    let err = Pipeline::new(config(&dir, SchemaVariant::ClassWithDate), store.clone())
        .run()
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::Source(_)));
    assert_eq!(store.put_calls(), 0);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn local_mirror_store_end_to_end() -> Result<()> {
    let dir = temp_dir("e2e-fs-store")?;
    let bucket_root = dir.join("bucket");
    std::fs::write(dir.join("car1.jpg"), b"jpg")?;
    std::fs::write(dir.join("labels.csv"), "Image,Label\ncar1.jpg,scratch\n")?;

    let store = Arc::new(FsObjectStore::new(&bucket_root, "b"));
    let outcome = Pipeline::new(config(&dir, SchemaVariant::ClassWithDate), store)
        .run()
        .await?;

    assert_eq!(outcome.summary.records, 1);
    assert!(bucket_root.join("cars").join("car1.jpg").is_file());
    let text = std::fs::read_to_string(
        bucket_root
            .join("manifests")
            .join("car-damage-detection-manifest.jsonl"),
    )?;
    assert!(text.starts_with(r#"{"source-ref":"s3://b/cars/car1.jpg","class":"scratch""#));
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn workbook_label_source_drives_a_run() -> Result<()> {
    let dir = temp_dir("e2e-workbook")?;
    std::fs::write(dir.join("1001.jpg"), b"jpg")?;
    std::fs::write(dir.join("car3.png"), b"png")?;

    let store = Arc::new(MemoryObjectStore::new("b"));
    let mut cfg = config(&dir, SchemaVariant::ClassWithDate);
    cfg.label_source = Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join("labels.xlsx");
    let key = cfg.manifest_key.clone();
    let outcome = Pipeline::new(cfg, store.clone()).run().await?;

    let lines = manifest_lines(&store, &key)?;
    let pairs: Vec<(&str, &str)> = lines
        .iter()
        .filter_map(|l| Some((l["source-ref"].as_str()?, l["class"].as_str()?)))
        .collect();
    assert_eq!(
        pairs,
        vec![
            ("s3://b/cars/1001.jpg", "dent"),
            ("s3://b/cars/car3.png", "glass"),
        ]
    );
    assert_eq!(outcome.summary.rows, 3);
    assert_eq!(outcome.summary.unmatched, 1);
    Ok(())
}
