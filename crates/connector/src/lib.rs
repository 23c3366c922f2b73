//! Async clients for the harvester's external collaborators.
//!
//! One module per collaborator contract: a trait describing the call
//! surface the harvest engine depends on, plus a reqwest-backed HTTP
//! implementation. Tests substitute the traits with in-memory fakes.

pub mod config_store;
pub mod cover;
pub mod error;
pub mod file_store;
pub mod holdings;
pub mod job_store;
pub mod record_service;
pub mod search;
pub mod week_resolver;

pub use config_store::{ConfigStore, HttpConfigStore};
pub use cover::{CoverService, HttpCoverService};
pub use error::ConnectorError;
pub use file_store::{FileStore, HttpFileStore};
pub use holdings::{HoldingsService, HttpHoldingsService};
pub use job_store::{HttpJobStore, JobInfo, JobStore};
pub use record_service::{HttpRecordService, RecordData, RecordParams, RecordService};
pub use search::{HttpSearchIndex, SearchIndex, SearchPage, FIRST_CURSOR_MARK};
pub use week_resolver::{HttpWeekResolver, WeekResolver};
