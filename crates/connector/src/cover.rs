//! Cover-presence service client: bulk "already has cover art" lookup.

use std::collections::HashSet;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::info;
use url::Url;

use crate::config_store::parse_base_url;
use crate::error::ConnectorError;

/// Call surface for the has-cover batch pre-filter.
#[async_trait]
pub trait CoverService: Send + Sync {
    /// Subset of `bibliographic_record_ids` that already have cover art.
    async fn filter_has_cover(
        &self,
        bibliographic_record_ids: &[String],
    ) -> Result<HashSet<String>, ConnectorError>;
}

/// HTTP implementation against the cover presence service.
pub struct HttpCoverService {
    client: reqwest::Client,
    base_url: Url,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CoverRequest<'a> {
    bibliographic_record_ids: &'a [String],
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CoverResponse {
    with_cover: HashSet<String>,
}

impl HttpCoverService {
    pub fn new(base_url: &str) -> Result<Self, ConnectorError> {
        let base_url = parse_base_url(base_url)?;
        info!(url = %base_url, "cover service connector initialized");
        Ok(Self {
            client: reqwest::Client::new(),
            base_url,
        })
    }
}

#[async_trait]
impl CoverService for HttpCoverService {
    async fn filter_has_cover(
        &self,
        bibliographic_record_ids: &[String],
    ) -> Result<HashSet<String>, ConnectorError> {
        let url = self
            .base_url
            .join("api/v1/exists")
            .map_err(|e| ConnectorError::Url(e.to_string()))?;
        let request = CoverRequest {
            bibliographic_record_ids,
        };
        let response = self.client.post(url).json(&request).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ConnectorError::UnexpectedStatus {
                status: status.as_u16(),
                message: response.text().await.unwrap_or_default(),
            });
        }
        let body: CoverResponse = response
            .json()
            .await
            .map_err(|e| ConnectorError::Decode(e.to_string()))?;
        Ok(body.with_cover)
    }
}
