//! Watermark persistence with optimistic-concurrency conflict handling.

use std::sync::Arc;

use tracing::{error, warn};

use bibharvest_connector::{ConfigStore, ConnectorError};
use bibharvest_core::{HarvestConfig, HarvesterError};

/// Conflict retries before the push is declared failed. Conflicts only
/// arise from concurrent admin edits, so the cap is small.
pub const MAX_CONFLICT_RETRIES: u32 = 3;

pub struct ConfigUpdater {
    config_store: Arc<dyn ConfigStore>,
}

impl ConfigUpdater {
    pub fn new(config_store: Arc<dyn ConfigStore>) -> Self {
        Self { config_store }
    }

    /// Persist `config`. On a version conflict the current persisted
    /// value is re-fetched, the locally computed watermark grafted onto
    /// it, and the push retried up to [`MAX_CONFLICT_RETRIES`] times.
    pub async fn push(&self, config: HarvestConfig) -> Result<HarvestConfig, HarvesterError> {
        let watermark = config.content.time_of_last_harvest;
        let mut candidate = config;
        let mut conflicts = 0;
        loop {
            match self.config_store.update_config(&candidate).await {
                Ok(persisted) => return Ok(persisted),
                Err(ConnectorError::Conflict) => {
                    conflicts += 1;
                    if conflicts > MAX_CONFLICT_RETRIES {
                        return Err(HarvesterError::WatermarkConflict {
                            id: candidate.id,
                            attempts: conflicts,
                        });
                    }
                    warn!(
                        config_id = candidate.id,
                        conflicts, "config push conflicted, refreshing and retrying"
                    );
                    let refreshed =
                        self.config_store
                            .get_config(candidate.id)
                            .await
                            .map_err(|e| {
                                error!(
                                    config_id = candidate.id,
                                    error = %e,
                                    "failed to refresh config after push conflict"
                                );
                                HarvesterError::ConfigStore(e.to_string())
                            })?;
                    candidate = refreshed;
                    candidate.content.time_of_last_harvest = watermark;
                }
                Err(e) => {
                    error!(config_id = candidate.id, error = %e, "config push failed");
                    return Err(HarvesterError::ConfigStore(e.to_string()));
                }
            }
        }
    }
}
