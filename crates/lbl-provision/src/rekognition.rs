use async_trait::async_trait;
use aws_sdk_rekognition::error::DisplayErrorContext;
use aws_sdk_rekognition::types::{DatasetSource, GroundTruthManifest, S3Object};
use lbl_core::S3Uri;

use crate::{project_name_from_arn, ApiError, DatasetType, ProjectApi, ProjectSummary};

/// [`ProjectApi`] backed by Amazon Rekognition Custom Labels.
#[derive(Debug, Clone)]
pub struct RekognitionProjectApi {
    client: aws_sdk_rekognition::Client,
}

impl RekognitionProjectApi {
    pub fn new(client: aws_sdk_rekognition::Client) -> Self {
        Self { client }
    }

    /// Standard AWS resolution (region/creds from env/config/role).
    pub async fn from_env() -> Self {
        let cfg = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
        Self::new(aws_sdk_rekognition::Client::new(&cfg))
    }
}

fn other<E: std::error::Error + 'static>(err: E) -> ApiError {
    ApiError::Other(DisplayErrorContext(err).to_string())
}

fn sdk_dataset_type(t: DatasetType) -> aws_sdk_rekognition::types::DatasetType {
    match t {
        DatasetType::Train => aws_sdk_rekognition::types::DatasetType::Train,
        DatasetType::Test => aws_sdk_rekognition::types::DatasetType::Test,
    }
}

#[async_trait]
impl ProjectApi for RekognitionProjectApi {
    async fn create_project(&self, name: &str) -> Result<String, ApiError> {
        let out = self
            .client
            .create_project()
            .project_name(name)
            .send()
            .await
            .map_err(|err| {
                if err
                    .as_service_error()
                    .is_some_and(|e| e.is_resource_in_use_exception())
                {
                    ApiError::AlreadyExists(name.to_string())
                } else {
                    other(err)
                }
            })?;
        out.project_arn()
            .map(str::to_string)
            .ok_or_else(|| ApiError::Other("create_project returned no project arn".to_string()))
    }

    async fn list_projects(&self, name: Option<&str>) -> Result<Vec<ProjectSummary>, ApiError> {
        let mut out = Vec::new();
        let mut token: Option<String> = None;
        loop {
            let mut req = self.client.describe_projects();
            if let Some(n) = name {
                req = req.project_names(n);
            }
            if let Some(t) = &token {
                req = req.next_token(t);
            }
            let resp = req.send().await.map_err(other)?;

            for p in resp.project_descriptions() {
                let Some(arn) = p.project_arn() else {
                    continue;
                };
                let Some(project) = project_name_from_arn(arn) else {
                    continue;
                };
                out.push(ProjectSummary {
                    name: project.to_string(),
                    arn: arn.to_string(),
                });
            }

            token = resp.next_token().map(str::to_string);
            if token.is_none() {
                break;
            }
        }
        Ok(out)
    }

    async fn create_dataset(
        &self,
        project_arn: &str,
        dataset_type: DatasetType,
        manifest: &S3Uri,
    ) -> Result<String, ApiError> {
        let source = DatasetSource::builder()
            .ground_truth_manifest(
                GroundTruthManifest::builder()
                    .s3_object(
                        S3Object::builder()
                            .bucket(&manifest.bucket)
                            .name(&manifest.key)
                            .build(),
                    )
                    .build(),
            )
            .build();
        let out = self
            .client
            .create_dataset()
            .project_arn(project_arn)
            .dataset_type(sdk_dataset_type(dataset_type))
            .dataset_source(source)
            .send()
            .await
            .map_err(other)?;
        out.dataset_arn()
            .map(str::to_string)
            .ok_or_else(|| ApiError::Other("create_dataset returned no dataset arn".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dataset_type_maps_to_sdk() {
        assert_eq!(
            sdk_dataset_type(DatasetType::Train),
            aws_sdk_rekognition::types::DatasetType::Train
        );
        assert_eq!(
            sdk_dataset_type(DatasetType::Test),
            aws_sdk_rekognition::types::DatasetType::Test
        );
    }
}
