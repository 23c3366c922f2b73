//! Periodic harvest engine.
//!
//! Converts query results from the external search index into batched
//! ingestion jobs: query resolution, paginated record discovery, durable
//! staging of discovered ids, bounded-concurrency per-record fetch with
//! per-record fault isolation, job assembly, watermark advancement with
//! optimistic-concurrency retry, and cron-like harvest scheduling.

pub mod config_updater;
pub mod fetch;
pub mod job;
pub mod marc;
pub mod operation;
pub mod query;
pub mod scheduler;
pub mod searcher;
pub mod staging;

pub use config_updater::{ConfigUpdater, MAX_CONFLICT_RETRIES};
pub use fetch::{FetchOutcome, FetchPlan, RecordFetcher, DBC_COMMON_AGENCY};
pub use job::JobBuilder;
pub use operation::{HarvestOperation, HarvesterContext, MAX_TASKS_PER_BATCH};
pub use query::QuerySubstitutor;
pub use scheduler::{can_run, ContextHarvestExecutor, HarvestExecutor, HarvestScheduler};
pub use searcher::{RecordSearcher, SEARCH_PAGE_SIZE};
pub use staging::{StagingFile, StagingReader, StagingWriter};
