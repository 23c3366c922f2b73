use std::env;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Load .env file (silently ignores if missing).
pub fn load_dotenv() {
    dotenvy::dotenv().ok();
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_opt(key: &str) -> Option<String> {
    env::var(key).ok().filter(|s| !s.is_empty())
}

fn env_u32(key: &str, default: u32) -> u32 {
    env_opt(key).and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn env_u64(key: &str, default: u64) -> u64 {
    env_opt(key).and_then(|v| v.parse().ok()).unwrap_or(default)
}

// ── Top-level config ──────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub scheduler: SchedulerSettings,
    pub config_store: ConfigStoreSettings,
    pub search_index: SearchIndexSettings,
    pub record_service: RecordServiceSettings,
    pub holdings: HoldingsSettings,
    pub cover: CoverSettings,
    pub file_store: FileStoreSettings,
    pub job_store: JobStoreSettings,
    pub week_resolver: WeekResolverSettings,
}

impl Config {
    /// Build config from environment variables (call `load_dotenv()` first).
    pub fn from_env() -> Self {
        Self {
            scheduler: SchedulerSettings::from_env(),
            config_store: ConfigStoreSettings::from_env(),
            search_index: SearchIndexSettings::from_env(),
            record_service: RecordServiceSettings::from_env(),
            holdings: HoldingsSettings::from_env(),
            cover: CoverSettings::from_env(),
            file_store: FileStoreSettings::from_env(),
            job_store: JobStoreSettings::from_env(),
            week_resolver: WeekResolverSettings::from_env(),
        }
    }

    /// Print a redacted summary for startup logs.
    pub fn log_summary(&self) {
        tracing::info!("Config loaded:");
        tracing::info!(
            "  scheduler:      tick={}s, dispatch_permits={}, staging_dir={}",
            self.scheduler.tick_secs,
            self.scheduler.dispatch_permits,
            self.scheduler.staging_dir.display()
        );
        tracing::info!("  config-store:   url={}", self.config_store.base_url);
        tracing::info!("  search-index:   url={}", self.search_index.base_url);
        tracing::info!("  record-service: url={}", self.record_service.base_url);
        tracing::info!("  holdings:       url={}", self.holdings.base_url);
        tracing::info!("  cover:          url={}", self.cover.base_url);
        tracing::info!("  file-store:     url={}", self.file_store.base_url);
        tracing::info!("  job-store:      url={}", self.job_store.base_url);
        tracing::info!("  week-resolver:  url={}", self.week_resolver.base_url);
    }
}

// ── Scheduler ─────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerSettings {
    /// Seconds between eligibility sweeps over the known configs.
    pub tick_secs: u64,
    /// Max harvest cycles dispatched concurrently across all configs.
    pub dispatch_permits: u32,
    /// Directory for per-cycle record id staging files and job spools.
    pub staging_dir: PathBuf,
}

impl SchedulerSettings {
    fn from_env() -> Self {
        Self {
            tick_secs: env_u64("HARVEST_TICK_SECS", 30),
            dispatch_permits: env_u32("HARVEST_DISPATCH_PERMITS", 4),
            staging_dir: PathBuf::from(env_or("HARVEST_STAGING_DIR", "data/staging")),
        }
    }
}

// ── Collaborator endpoints ────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigStoreSettings {
    pub base_url: String,
}

impl ConfigStoreSettings {
    fn from_env() -> Self {
        Self {
            base_url: env_or("CONFIG_STORE_URL", "http://localhost:8080/config-store"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchIndexSettings {
    pub base_url: String,
}

impl SearchIndexSettings {
    fn from_env() -> Self {
        Self {
            base_url: env_or("SEARCH_INDEX_URL", "http://localhost:8983/solr"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordServiceSettings {
    pub base_url: String,
}

impl RecordServiceSettings {
    fn from_env() -> Self {
        Self {
            base_url: env_or("RECORD_SERVICE_URL", "http://localhost:8080/record-service"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HoldingsSettings {
    pub base_url: String,
}

impl HoldingsSettings {
    fn from_env() -> Self {
        Self {
            base_url: env_or("HOLDINGS_SERVICE_URL", "http://localhost:8080/holdings"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoverSettings {
    pub base_url: String,
}

impl CoverSettings {
    fn from_env() -> Self {
        Self {
            base_url: env_or("COVER_SERVICE_URL", "http://localhost:8080/cover"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileStoreSettings {
    pub base_url: String,
}

impl FileStoreSettings {
    fn from_env() -> Self {
        Self {
            base_url: env_or("FILE_STORE_URL", "http://localhost:8080/file-store"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobStoreSettings {
    pub base_url: String,
}

impl JobStoreSettings {
    fn from_env() -> Self {
        Self {
            base_url: env_or("JOB_STORE_URL", "http://localhost:8080/job-store"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeekResolverSettings {
    pub base_url: String,
}

impl WeekResolverSettings {
    fn from_env() -> Self {
        Self {
            base_url: env_or("WEEK_RESOLVER_URL", "http://localhost:8080/week-resolver"),
        }
    }
}
