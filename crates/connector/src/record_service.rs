//! Record service client: fetches a record plus its related records.

use std::collections::HashMap;

use async_trait::async_trait;
use base64::Engine;
use serde::Deserialize;
use tracing::info;
use url::Url;

use bibharvest_core::RecordId;

use crate::config_store::parse_base_url;
use crate::error::ConnectorError;

/// Parameters for a collection fetch.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RecordParams {
    /// Expand authority records into the returned collection.
    pub expand: bool,
    /// Let the service substitute enrichment parents for the requested agency.
    pub use_parent_agency: bool,
}

/// One record as returned by the record service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordData {
    pub record_id: RecordId,
    /// RFC 3339 creation timestamp; absent for stub records.
    pub created: Option<String>,
    /// Comma-separated provenance list of agency ids.
    pub enrichment_trail: Option<String>,
    pub tracking_id: Option<String>,
    /// marcXchange document bytes.
    pub content: Vec<u8>,
}

/// Call surface the fetch tasks need from the record source.
#[async_trait]
pub trait RecordService: Send + Sync {
    /// Fetch `id` and its related records, keyed by bibliographic record id.
    async fn get_record_collection(
        &self,
        id: &RecordId,
        params: &RecordParams,
    ) -> Result<HashMap<String, RecordData>, ConnectorError>;
}

/// HTTP implementation against the record service REST API.
pub struct HttpRecordService {
    client: reqwest::Client,
    base_url: Url,
}

#[derive(Debug, Deserialize)]
struct CollectionDto {
    records: Vec<RecordDto>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RecordDto {
    record_id: RecordIdDto,
    created: Option<String>,
    enrichment_trail: Option<String>,
    tracking_id: Option<String>,
    /// Base64-encoded marcXchange document.
    content: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RecordIdDto {
    bibliographic_record_id: String,
    agency_id: u32,
}

impl HttpRecordService {
    pub fn new(base_url: &str) -> Result<Self, ConnectorError> {
        let base_url = parse_base_url(base_url)?;
        info!(url = %base_url, "record service connector initialized");
        Ok(Self {
            client: reqwest::Client::new(),
            base_url,
        })
    }
}

#[async_trait]
impl RecordService for HttpRecordService {
    async fn get_record_collection(
        &self,
        id: &RecordId,
        params: &RecordParams,
    ) -> Result<HashMap<String, RecordData>, ConnectorError> {
        let mut url = self
            .base_url
            .join(&format!(
                "api/v1/record/{}/{}/content/collection",
                id.agency_id, id.bibliographic_record_id
            ))
            .map_err(|e| ConnectorError::Url(e.to_string()))?;
        url.query_pairs_mut()
            .append_pair("expand", if params.expand { "true" } else { "false" })
            .append_pair(
                "use-parent-agency",
                if params.use_parent_agency { "true" } else { "false" },
            );

        let response = self.client.get(url).send().await?;
        let status = response.status();
        if status.as_u16() == 404 {
            return Err(ConnectorError::NotFound(id.to_string()));
        }
        if !status.is_success() {
            return Err(ConnectorError::UnexpectedStatus {
                status: status.as_u16(),
                message: response.text().await.unwrap_or_default(),
            });
        }
        let dto: CollectionDto = response
            .json()
            .await
            .map_err(|e| ConnectorError::Decode(e.to_string()))?;

        let mut records = HashMap::with_capacity(dto.records.len());
        for record in dto.records {
            let content = base64::engine::general_purpose::STANDARD
                .decode(&record.content)
                .map_err(|e| ConnectorError::Decode(format!("record content: {e}")))?;
            records.insert(
                record.record_id.bibliographic_record_id.clone(),
                RecordData {
                    record_id: RecordId::new(
                        record.record_id.bibliographic_record_id,
                        record.record_id.agency_id,
                    ),
                    created: record.created,
                    enrichment_trail: record.enrichment_trail,
                    tracking_id: record.tracking_id,
                    content,
                },
            );
        }
        Ok(records)
    }
}
