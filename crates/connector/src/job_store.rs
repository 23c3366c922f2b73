//! Job store client: job creation from an uploaded datafile, plus the
//! explicit empty-job path for cycles that discover zero record ids.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::info;
use url::Url;

use bibharvest_core::JobSpecification;

use crate::config_store::parse_base_url;
use crate::error::ConnectorError;

/// Snapshot of a created job.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobInfo {
    pub job_id: i64,
}

#[async_trait]
pub trait JobStore: Send + Sync {
    /// Create a job whose records are read from the uploaded datafile.
    async fn add_job(
        &self,
        specification: &JobSpecification,
        file_id: &str,
    ) -> Result<JobInfo, ConnectorError>;

    /// Create a job with zero records.
    async fn add_empty_job(
        &self,
        specification: &JobSpecification,
    ) -> Result<JobInfo, ConnectorError>;
}

/// HTTP implementation against the job store service.
pub struct HttpJobStore {
    client: reqwest::Client,
    base_url: Url,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct AddJobRequest<'a> {
    specification: &'a JobSpecification,
    #[serde(skip_serializing_if = "Option::is_none")]
    file_id: Option<&'a str>,
    is_empty: bool,
}

impl HttpJobStore {
    pub fn new(base_url: &str) -> Result<Self, ConnectorError> {
        let base_url = parse_base_url(base_url)?;
        info!(url = %base_url, "job store connector initialized");
        Ok(Self {
            client: reqwest::Client::new(),
            base_url,
        })
    }

    async fn post_job(&self, request: &AddJobRequest<'_>) -> Result<JobInfo, ConnectorError> {
        let url = self
            .base_url
            .join("jobs")
            .map_err(|e| ConnectorError::Url(e.to_string()))?;
        let response = self.client.post(url).json(request).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ConnectorError::UnexpectedStatus {
                status: status.as_u16(),
                message: response.text().await.unwrap_or_default(),
            });
        }
        response
            .json()
            .await
            .map_err(|e| ConnectorError::Decode(e.to_string()))
    }
}

#[async_trait]
impl JobStore for HttpJobStore {
    async fn add_job(
        &self,
        specification: &JobSpecification,
        file_id: &str,
    ) -> Result<JobInfo, ConnectorError> {
        self.post_job(&AddJobRequest {
            specification,
            file_id: Some(file_id),
            is_empty: false,
        })
        .await
    }

    async fn add_empty_job(
        &self,
        specification: &JobSpecification,
    ) -> Result<JobInfo, ConnectorError> {
        self.post_job(&AddJobRequest {
            specification,
            file_id: None,
            is_empty: true,
        })
        .await
    }
}
