//! File store client: datafile upload/download for job creation and
//! query-file based configs.

use async_trait::async_trait;
use serde::Deserialize;
use tracing::info;
use url::Url;

use crate::config_store::parse_base_url;
use crate::error::ConnectorError;

#[async_trait]
pub trait FileStore: Send + Sync {
    /// Upload a new file, returning its store id.
    async fn add_file(&self, bytes: Vec<u8>) -> Result<String, ConnectorError>;

    /// Download a file by id.
    async fn get_file(&self, file_id: &str) -> Result<Vec<u8>, ConnectorError>;

    /// Remove a file by id.
    async fn delete_file(&self, file_id: &str) -> Result<(), ConnectorError>;
}

/// HTTP implementation against the file store service.
pub struct HttpFileStore {
    client: reqwest::Client,
    base_url: Url,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AddFileResponse {
    file_id: String,
}

impl HttpFileStore {
    pub fn new(base_url: &str) -> Result<Self, ConnectorError> {
        let base_url = parse_base_url(base_url)?;
        info!(url = %base_url, "file store connector initialized");
        Ok(Self {
            client: reqwest::Client::new(),
            base_url,
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url, ConnectorError> {
        self.base_url
            .join(path)
            .map_err(|e| ConnectorError::Url(e.to_string()))
    }
}

#[async_trait]
impl FileStore for HttpFileStore {
    async fn add_file(&self, bytes: Vec<u8>) -> Result<String, ConnectorError> {
        let url = self.endpoint("files")?;
        let response = self
            .client
            .post(url)
            .header("content-type", "application/octet-stream")
            .body(bytes)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ConnectorError::UnexpectedStatus {
                status: status.as_u16(),
                message: response.text().await.unwrap_or_default(),
            });
        }
        let body: AddFileResponse = response
            .json()
            .await
            .map_err(|e| ConnectorError::Decode(e.to_string()))?;
        Ok(body.file_id)
    }

    async fn get_file(&self, file_id: &str) -> Result<Vec<u8>, ConnectorError> {
        let url = self.endpoint(&format!("files/{file_id}"))?;
        let response = self.client.get(url).send().await?;
        let status = response.status();
        if status.as_u16() == 404 {
            return Err(ConnectorError::NotFound(format!("file {file_id}")));
        }
        if !status.is_success() {
            return Err(ConnectorError::UnexpectedStatus {
                status: status.as_u16(),
                message: response.text().await.unwrap_or_default(),
            });
        }
        Ok(response.bytes().await?.to_vec())
    }

    async fn delete_file(&self, file_id: &str) -> Result<(), ConnectorError> {
        let url = self.endpoint(&format!("files/{file_id}"))?;
        let response = self.client.delete(url).send().await?;
        let status = response.status();
        if !status.is_success() && status.as_u16() != 404 {
            return Err(ConnectorError::UnexpectedStatus {
                status: status.as_u16(),
                message: response.text().await.unwrap_or_default(),
            });
        }
        Ok(())
    }
}
