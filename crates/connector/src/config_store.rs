//! Config store client: durable harvest configurations with
//! optimistic-concurrency updates.

use async_trait::async_trait;
use reqwest::StatusCode;
use tracing::info;
use url::Url;

use bibharvest_core::HarvestConfig;

use crate::error::ConnectorError;

/// Call surface the harvest engine needs from the config store.
#[async_trait]
pub trait ConfigStore: Send + Sync {
    /// Fetch one config by id.
    async fn get_config(&self, id: i64) -> Result<HarvestConfig, ConnectorError>;

    /// All configs with `enabled == true`, for the scheduler sweep.
    async fn list_enabled_configs(&self) -> Result<Vec<HarvestConfig>, ConnectorError>;

    /// Persist `config`. The store compares `config.version` against the
    /// stored version; a mismatch yields [`ConnectorError::Conflict`].
    /// On success the returned value carries the bumped version.
    async fn update_config(&self, config: &HarvestConfig) -> Result<HarvestConfig, ConnectorError>;
}

/// HTTP implementation against the config store REST service.
pub struct HttpConfigStore {
    client: reqwest::Client,
    base_url: Url,
}

impl HttpConfigStore {
    pub fn new(base_url: &str) -> Result<Self, ConnectorError> {
        let base_url = parse_base_url(base_url)?;
        info!(url = %base_url, "config store connector initialized");
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
impl ConfigStore for HttpConfigStore {
    async fn get_config(&self, id: i64) -> Result<HarvestConfig, ConnectorError> {
        let url = self.endpoint(&format!("harvester-configs/{id}"))?;
        let response = self.client.get(url).send().await?;
        match response.status() {
            StatusCode::NOT_FOUND => Err(ConnectorError::NotFound(format!("config {id}"))),
            status if !status.is_success() => Err(ConnectorError::UnexpectedStatus {
                status: status.as_u16(),
                message: response.text().await.unwrap_or_default(),
            }),
            _ => response
                .json()
                .await
                .map_err(|e| ConnectorError::Decode(e.to_string())),
        }
    }

    async fn list_enabled_configs(&self) -> Result<Vec<HarvestConfig>, ConnectorError> {
        let mut url = self.endpoint("harvester-configs")?;
        url.query_pairs_mut().append_pair("enabled", "true");
        let response = self.client.get(url).send().await?;
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

    async fn update_config(&self, config: &HarvestConfig) -> Result<HarvestConfig, ConnectorError> {
        let url = self.endpoint(&format!("harvester-configs/{}", config.id))?;
        let response = self.client.put(url).json(config).send().await?;
        match response.status() {
            StatusCode::CONFLICT => Err(ConnectorError::Conflict),
            StatusCode::NOT_FOUND => {
                Err(ConnectorError::NotFound(format!("config {}", config.id)))
            }
            status if !status.is_success() => Err(ConnectorError::UnexpectedStatus {
                status: status.as_u16(),
                message: response.text().await.unwrap_or_default(),
            }),
            _ => response
                .json()
                .await
                .map_err(|e| ConnectorError::Decode(e.to_string())),
        }
    }
}

/// Normalize a base url so `Url::join` treats it as a directory.
pub(crate) fn parse_base_url(base_url: &str) -> Result<Url, ConnectorError> {
    let normalized = if base_url.ends_with('/') {
        base_url.to_string()
    } else {
        format!("{base_url}/")
    };
    Url::parse(&normalized).map_err(|e| ConnectorError::Url(e.to_string()))
}
