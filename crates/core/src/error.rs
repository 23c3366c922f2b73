//! Harvester error types.
//!
//! A harvest cycle surfaces exactly one [`HarvesterError`] on failure;
//! per-record problems never reach this type (they are encoded as
//! diagnostic envelopes by the fetch layer instead).

use thiserror::Error;

#[derive(Debug, Error)]
pub enum HarvesterError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid harvest config {id}: {reason}")]
    InvalidConfig { id: i64, reason: String },

    #[error("query resolution failed: {0}")]
    QueryResolution(String),

    #[error("search index error: {0}")]
    SearchIndex(String),

    #[error("record service error: {0}")]
    RecordService(String),

    #[error("holdings service error: {0}")]
    Holdings(String),

    #[error("cover service error after {attempts} attempts: {message}")]
    CoverService { attempts: u32, message: String },

    #[error("file store error: {0}")]
    FileStore(String),

    #[error("job store error: {0}")]
    JobStore(String),

    #[error("config store error: {0}")]
    ConfigStore(String),

    #[error("watermark push for config {id} still conflicting after {attempts} attempts")]
    WatermarkConflict { id: i64, attempts: u32 },

    #[error("fetch task failed: {0}")]
    TaskFailure(String),
}
