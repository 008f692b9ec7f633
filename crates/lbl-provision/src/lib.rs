#![forbid(unsafe_code)]
#![cfg_attr(not(test), deny(clippy::expect_used, clippy::unwrap_used))]

//! Ensures a managed image-classification project exists and attaches manifest datasets to it.
//!
//! The managed API sits behind [`ProjectApi`]; lookup-by-name is a pure query over its listing.

#[cfg(feature = "rekognition")]
pub mod rekognition;

use std::fmt;

use async_trait::async_trait;
use lbl_core::S3Uri;
use thiserror::Error;
use tracing::info;

#[cfg(feature = "rekognition")]
pub use rekognition::RekognitionProjectApi;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectSummary {
    pub name: String,
    pub arn: String,
}

/// A project known to exist.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectRef {
    pub name: String,
    pub arn: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Ensured {
    Created(ProjectRef),
    Found(ProjectRef),
}

impl Ensured {
    pub fn project(&self) -> &ProjectRef {
        match self {
            Ensured::Created(p) | Ensured::Found(p) => p,
        }
    }

    pub fn was_created(&self) -> bool {
        matches!(self, Ensured::Created(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatasetType {
    Train,
    Test,
}

impl DatasetType {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "train" => Some(DatasetType::Train),
            "test" => Some(DatasetType::Test),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DatasetType::Train => "TRAIN",
            DatasetType::Test => "TEST",
        }
    }
}

impl fmt::Display for DatasetType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failure reported by a [`ProjectApi`] call.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ApiError {
    #[error("project {0:?} already exists")]
    AlreadyExists(String),
    #[error("{0}")]
    Other(String),
}

#[derive(Debug, Error)]
pub enum ProvisionError {
    #[error("invalid project name {0:?}")]
    InvalidName(String),
    #[error("{op} failed: {source}")]
    Api {
        op: &'static str,
        #[source]
        source: ApiError,
    },
    #[error("project {0:?} reported as existing but not found in listing")]
    VanishedAfterConflict(String),
}

/// Managed ML-project operations. One attempt per call.
#[async_trait]
pub trait ProjectApi: Send + Sync {
    /// Returns the new project's ARN.
    async fn create_project(&self, name: &str) -> Result<String, ApiError>;

    /// All projects visible to the caller, or only those named `name` when the API can filter.
    async fn list_projects(&self, name: Option<&str>) -> Result<Vec<ProjectSummary>, ApiError>;

    /// Returns the new dataset's ARN.
    async fn create_dataset(
        &self,
        project_arn: &str,
        dataset_type: DatasetType,
        manifest: &S3Uri,
    ) -> Result<String, ApiError>;
}

/// Exact, case-sensitive name match. The first listed match wins.
pub fn find_project(projects: &[ProjectSummary], name: &str) -> Option<ProjectRef> {
    projects.iter().find(|p| p.name == name).map(|p| ProjectRef {
        name: p.name.clone(),
        arn: p.arn.clone(),
    })
}

/// `arn:aws:rekognition:<region>:<acct>:project/<name>/<version>` -> `<name>`.
pub fn project_name_from_arn(arn: &str) -> Option<&str> {
    let (_, rest) = arn.split_once(":project/")?;
    let name = rest.split('/').next()?;
    (!name.is_empty()).then_some(name)
}

/// Looks the project up by name and creates it only if absent.
///
/// A create that loses a race ("already exists") falls back to a second lookup.
pub async fn ensure_project(api: &dyn ProjectApi, name: &str) -> Result<Ensured, ProvisionError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(ProvisionError::InvalidName(name.to_string()));
    }

    if let Some(found) = lookup(api, name).await? {
        info!(
            target: "lbl_proof",
            event = "project_found",
            project = name,
            arn = found.arn.as_str(),
            "using existing project"
        );
        return Ok(Ensured::Found(found));
    }

    match api.create_project(name).await {
        Ok(arn) => {
            info!(
                target: "lbl_proof",
                event = "project_created",
                project = name,
                arn = arn.as_str(),
                "project created"
            );
            Ok(Ensured::Created(ProjectRef {
                name: name.to_string(),
                arn,
            }))
        }
        Err(ApiError::AlreadyExists(_)) => lookup(api, name)
            .await?
            .map(Ensured::Found)
            .ok_or_else(|| ProvisionError::VanishedAfterConflict(name.to_string())),
        Err(source) => Err(ProvisionError::Api {
            op: "create_project",
            source,
        }),
    }
}

async fn lookup(api: &dyn ProjectApi, name: &str) -> Result<Option<ProjectRef>, ProvisionError> {
    let projects = api
        .list_projects(Some(name))
        .await
        .map_err(|source| ProvisionError::Api {
            op: "list_projects",
            source,
        })?;
    Ok(find_project(&projects, name))
}

/// Registers `manifest` as the ground truth of a new dataset in `project`.
pub async fn create_dataset(
    api: &dyn ProjectApi,
    project: &ProjectRef,
    dataset_type: DatasetType,
    manifest: &S3Uri,
) -> Result<String, ProvisionError> {
    let arn = api
        .create_dataset(&project.arn, dataset_type, manifest)
        .await
        .map_err(|source| ProvisionError::Api {
            op: "create_dataset",
            source,
        })?;
    info!(
        target: "lbl_proof",
        event = "dataset_created",
        project = project.name.as_str(),
        dataset_type = dataset_type.as_str(),
        manifest = %manifest,
        arn = arn.as_str(),
        "dataset created"
    );
    Ok(arn)
}
