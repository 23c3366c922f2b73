//! Week resolver client: maps a catalogue code and date to the week code
//! the cataloguing workflow assigns for that date (shift-day rules live
//! in the service, not here).

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::Deserialize;
use tracing::info;
use url::Url;

use crate::config_store::parse_base_url;
use crate::error::ConnectorError;

#[async_trait]
pub trait WeekResolver: Send + Sync {
    /// Week code for `catalogue_code` at `date`, e.g. `"BKM202324"`.
    async fn week_code(
        &self,
        catalogue_code: &str,
        date: NaiveDate,
    ) -> Result<String, ConnectorError>;
}

/// HTTP implementation against the week resolver service.
pub struct HttpWeekResolver {
    client: reqwest::Client,
    base_url: Url,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WeekCodeResponse {
    week_code: String,
}

impl HttpWeekResolver {
    pub fn new(base_url: &str) -> Result<Self, ConnectorError> {
        let base_url = parse_base_url(base_url)?;
        info!(url = %base_url, "week resolver connector initialized");
        Ok(Self {
            client: reqwest::Client::new(),
            base_url,
        })
    }
}

#[async_trait]
impl WeekResolver for HttpWeekResolver {
    async fn week_code(
        &self,
        catalogue_code: &str,
        date: NaiveDate,
    ) -> Result<String, ConnectorError> {
        let url = self
            .base_url
            .join(&format!(
                "api/v1/date/{catalogue_code}/{}",
                date.format("%Y-%m-%d")
            ))
            .map_err(|e| ConnectorError::Url(e.to_string()))?;
        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ConnectorError::UnexpectedStatus {
                status: status.as_u16(),
                message: response.text().await.unwrap_or_default(),
            });
        }
        let body: WeekCodeResponse = response
            .json()
            .await
            .map_err(|e| ConnectorError::Decode(e.to_string()))?;
        Ok(body.week_code)
    }
}
