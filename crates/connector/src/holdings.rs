//! Holdings service client: which agencies hold copies of a record.

use std::collections::HashSet;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::info;
use url::Url;

use crate::config_store::parse_base_url;
use crate::error::ConnectorError;

/// Call surface the holdings-filtered harvester kinds depend on.
#[async_trait]
pub trait HoldingsService: Send + Sync {
    /// Subset of `bibliographic_record_ids` that have holdings for any of
    /// `agencies` (any agency at all when `agencies` is empty).
    async fn get_record_holdings(
        &self,
        bibliographic_record_ids: &HashSet<String>,
        agencies: &HashSet<u32>,
    ) -> Result<HashSet<String>, ConnectorError>;

    /// Whether a single record has any holdings within `agencies`.
    async fn has_any_holdings(
        &self,
        bibliographic_record_id: &str,
        agencies: &HashSet<u32>,
    ) -> Result<bool, ConnectorError> {
        let ids = HashSet::from([bibliographic_record_id.to_string()]);
        Ok(!self.get_record_holdings(&ids, agencies).await?.is_empty())
    }
}

/// HTTP implementation against the holdings items service.
pub struct HttpHoldingsService {
    client: reqwest::Client,
    base_url: Url,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct HoldingsRequest<'a> {
    bibliographic_record_ids: Vec<&'a str>,
    agencies: Vec<u32>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct HoldingsResponse {
    with_holdings: HashSet<String>,
}

impl HttpHoldingsService {
    pub fn new(base_url: &str) -> Result<Self, ConnectorError> {
        let base_url = parse_base_url(base_url)?;
        info!(url = %base_url, "holdings service connector initialized");
        Ok(Self {
            client: reqwest::Client::new(),
            base_url,
        })
    }
}

#[async_trait]
impl HoldingsService for HttpHoldingsService {
    async fn get_record_holdings(
        &self,
        bibliographic_record_ids: &HashSet<String>,
        agencies: &HashSet<u32>,
    ) -> Result<HashSet<String>, ConnectorError> {
        let url = self
            .base_url
            .join("api/v1/holdings-by-record-ids")
            .map_err(|e| ConnectorError::Url(e.to_string()))?;
        let request = HoldingsRequest {
            bibliographic_record_ids: bibliographic_record_ids.iter().map(String::as_str).collect(),
            agencies: agencies.iter().copied().collect(),
        };
        let response = self.client.post(url).json(&request).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ConnectorError::UnexpectedStatus {
                status: status.as_u16(),
                message: response.text().await.unwrap_or_default(),
            });
        }
        let body: HoldingsResponse = response
            .json()
            .await
            .map_err(|e| ConnectorError::Decode(e.to_string()))?;
        Ok(body.with_holdings)
    }
}
