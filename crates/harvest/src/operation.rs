//! The harvest operation: one cycle from query resolution to watermark
//! advancement.
//!
//! Cycle state machine: resolve queries → search → stage → fetch in
//! bounded batches → assemble job → advance watermark, with the staging
//! file deleted on every exit path. Per-record faults are isolated by
//! the fetch tasks; anything surfacing here aborts the whole cycle.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::task::JoinSet;
use tracing::{info, warn};

use bibharvest_connector::{
    ConfigStore, CoverService, FileStore, HoldingsService, HttpConfigStore, HttpCoverService,
    HttpFileStore, HttpHoldingsService, HttpJobStore, HttpRecordService, HttpSearchIndex,
    HttpWeekResolver, JobStore, RecordService, SearchIndex, WeekResolver,
};
use bibharvest_core::{
    Config, HarvestConfig, HarvesterError, HarvesterKind, HoldingsFilter, JobSpecification,
    RecordId,
};

use crate::config_updater::ConfigUpdater;
use crate::fetch::{FetchOutcome, FetchPlan, RecordFetcher};
use crate::job::JobBuilder;
use crate::query::QuerySubstitutor;
use crate::searcher::RecordSearcher;
use crate::staging::StagingFile;

/// Max fetch tasks in flight within one batch; the batch barrier bounds
/// resident load on the record source.
pub const MAX_TASKS_PER_BATCH: usize = 10;

/// Retry policy for the bulk cover-filter call.
const COVER_FILTER_MAX_ATTEMPTS: u32 = 6;
const COVER_FILTER_RETRY_DELAY: Duration = Duration::from_secs(1);

/// Shared collaborator handles and settings for all harvest cycles.
pub struct HarvesterContext {
    pub config_store: Arc<dyn ConfigStore>,
    pub search_index: Arc<dyn SearchIndex>,
    pub record_service: Arc<dyn RecordService>,
    pub holdings: Arc<dyn HoldingsService>,
    pub cover: Arc<dyn CoverService>,
    pub file_store: Arc<dyn FileStore>,
    pub job_store: Arc<dyn JobStore>,
    pub week_resolver: Arc<dyn WeekResolver>,
    pub staging_dir: PathBuf,
}

impl std::fmt::Debug for HarvesterContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HarvesterContext")
            .field("staging_dir", &self.staging_dir)
            .finish_non_exhaustive()
    }
}

impl HarvesterContext {
    /// Wire up HTTP connectors from the environment config.
    pub fn from_config(config: &Config) -> Result<Self, HarvesterError> {
        let connector = |e: bibharvest_connector::ConnectorError| {
            HarvesterError::InvalidConfig {
                id: 0,
                reason: e.to_string(),
            }
        };
        Ok(Self {
            config_store: Arc::new(
                HttpConfigStore::new(&config.config_store.base_url).map_err(connector)?,
            ),
            search_index: Arc::new(
                HttpSearchIndex::new(&config.search_index.base_url).map_err(connector)?,
            ),
            record_service: Arc::new(
                HttpRecordService::new(&config.record_service.base_url).map_err(connector)?,
            ),
            holdings: Arc::new(
                HttpHoldingsService::new(&config.holdings.base_url).map_err(connector)?,
            ),
            cover: Arc::new(HttpCoverService::new(&config.cover.base_url).map_err(connector)?),
            file_store: Arc::new(
                HttpFileStore::new(&config.file_store.base_url).map_err(connector)?,
            ),
            job_store: Arc::new(HttpJobStore::new(&config.job_store.base_url).map_err(connector)?),
            week_resolver: Arc::new(
                HttpWeekResolver::new(&config.week_resolver.base_url).map_err(connector)?,
            ),
            staging_dir: config.scheduler.staging_dir.clone(),
        })
    }
}

struct BatchStats {
    iterated: u64,
    filtered: u64,
}

#[derive(Debug)]
pub struct HarvestOperation {
    config: HarvestConfig,
    plan: FetchPlan,
    ctx: Arc<HarvesterContext>,
}

impl HarvestOperation {
    pub fn new(config: HarvestConfig, ctx: Arc<HarvesterContext>) -> Result<Self, HarvesterError> {
        if config.content.harvester_kind == HarvesterKind::WithHoldings
            && config.content.holdings_filter.is_none()
        {
            return Err(HarvesterError::InvalidConfig {
                id: config.id,
                reason: "with-holdings harvester requires a holdings filter".to_string(),
            });
        }
        let plan = FetchPlan::for_config(&config.content);
        Ok(Self { config, plan, ctx })
    }

    /// Run one harvest cycle; returns the number of records added to the
    /// created job (0 for the empty-job path).
    pub async fn execute(&self) -> Result<u64, HarvesterError> {
        info!(
            config_id = self.config.id,
            name = %self.config.content.name,
            "starting harvest cycle"
        );
        let staging = StagingFile::create(&self.ctx.staging_dir, self.config.id)?;
        let searcher = RecordSearcher::new(self.ctx.search_index.clone());

        let mut time_of_search: Option<DateTime<Utc>> = None;
        {
            let mut writer = staging.writer()?;
            for template in self.query_templates().await? {
                let substitutor = QuerySubstitutor::new();
                let query = substitutor
                    .replace(
                        &template,
                        self.config.content.time_of_last_harvest,
                        self.ctx.week_resolver.as_ref(),
                    )
                    .await?;
                info!(config_id = self.config.id, query = %query, "executing index query");
                let found = searcher
                    .search_into(&self.config.content.collection, &query, &mut writer)
                    .await?;
                info!(config_id = self.config.id, found, "index query completed");
                // The last query's capture instant becomes the watermark.
                time_of_search = Some(substitutor.now());
            }
            writer.flush()?;
        }

        let records_added = self.assemble(&staging).await?;

        if let Some(instant) = time_of_search {
            ConfigUpdater::new(self.ctx.config_store.clone())
                .push(self.config.with_time_of_last_harvest(instant))
                .await?;
            info!(config_id = self.config.id, watermark = %instant, "advanced watermark");
        }
        info!(
            config_id = self.config.id,
            records_added, "harvest cycle completed"
        );
        Ok(records_added)
        // `staging` drops here, deleting the file on success and failure alike.
    }

    /// Dry-run the configured queries without creating a job. Index and
    /// holdings errors are rendered into the status text instead of
    /// propagating, so operators can iterate on a query without alerts.
    pub async fn validate_query(&self) -> String {
        match self.try_validate().await {
            Ok(status) => status,
            Err(e) => format!("query validation failed: {e}"),
        }
    }

    async fn try_validate(&self) -> Result<String, HarvesterError> {
        let searcher = RecordSearcher::new(self.ctx.search_index.clone());
        let templates = self.query_templates().await?;
        if let Some(filter) = self.plan.holdings_filter {
            let mut bib_ids: HashSet<String> = HashSet::new();
            for template in &templates {
                let query = self.resolve(template).await?;
                for id in searcher
                    .search_to_vec(&self.config.content.collection, &query)
                    .await?
                {
                    let bib = id
                        .split_once(':')
                        .map(|(bib, _)| bib.to_string())
                        .unwrap_or(id);
                    bib_ids.insert(bib);
                }
            }
            let agencies: HashSet<u32> = self
                .config
                .content
                .holdings_lookup_agencies
                .iter()
                .copied()
                .collect();
            let with_holdings = self
                .ctx
                .holdings
                .get_record_holdings(&bib_ids, &agencies)
                .await
                .map_err(|e| HarvesterError::Holdings(e.to_string()))?;
            let count = match filter {
                HoldingsFilter::WithHoldings => with_holdings.len(),
                HoldingsFilter::WithoutHoldings => bib_ids.len() - with_holdings.len(),
            };
            Ok(format!(
                "Found {count} records by combined index and holdings search."
            ))
        } else {
            let mut total = 0;
            for template in &templates {
                let query = self.resolve(template).await?;
                total += searcher
                    .validate_count(&self.config.content.collection, &query)
                    .await?;
            }
            Ok(format!("Found {total} records matching query."))
        }
    }

    async fn resolve(&self, template: &str) -> Result<String, HarvesterError> {
        QuerySubstitutor::new()
            .replace(
                template,
                self.config.content.time_of_last_harvest,
                self.ctx.week_resolver.as_ref(),
            )
            .await
    }

    async fn assemble(&self, staging: &StagingFile) -> Result<u64, HarvesterError> {
        let mut job = JobBuilder::new(
            self.ctx.file_store.clone(),
            self.ctx.job_store.clone(),
            JobSpecification::from_config(&self.config),
            &self.ctx.staging_dir,
        )?;
        let fetcher = RecordFetcher::new(
            self.ctx.record_service.clone(),
            self.ctx.holdings.clone(),
            self.plan.clone(),
            &self.config.content,
        );

        let staged_any;
        let stats = if self.plan.cover_prefilter {
            // The cover pre-filter needs the whole discovered id set for
            // its single bulk call.
            let mut staged = Vec::new();
            for id in staging.reader()? {
                staged.push(id?);
            }
            staged_any = !staged.is_empty();
            let surviving = self.filter_covered(staged).await?;
            self.run_batches(surviving.into_iter().map(Ok), &fetcher, &mut job)
                .await?
        } else {
            let stats = self
                .run_batches(staging.reader()?, &fetcher, &mut job)
                .await?;
            staged_any = stats.iterated > 0;
            stats
        };

        if !staged_any {
            // Query found zero record ids so an empty job is created.
            job.add_empty_job().await?;
            return Ok(0);
        }
        if job.build().await?.is_none() {
            warn!(
                config_id = self.config.id,
                filtered = stats.filtered,
                "every discovered record was filtered, no job created"
            );
        }
        Ok(job.records_added())
    }

    /// Pull ids in bounded batches, one fetch task per id, with a full
    /// join at each batch boundary.
    async fn run_batches<I>(
        &self,
        mut ids: I,
        fetcher: &RecordFetcher,
        job: &mut JobBuilder,
    ) -> Result<BatchStats, HarvesterError>
    where
        I: Iterator<Item = std::io::Result<RecordId>> + Send,
    {
        let mut stats = BatchStats {
            iterated: 0,
            filtered: 0,
        };
        loop {
            let mut batch = Vec::with_capacity(MAX_TASKS_PER_BATCH);
            while batch.len() < MAX_TASKS_PER_BATCH {
                match ids.next() {
                    Some(id) => batch.push(id?),
                    None => break,
                }
            }
            if batch.is_empty() {
                break;
            }
            stats.iterated += batch.len() as u64;

            let mut tasks = JoinSet::new();
            for id in batch {
                tasks.spawn(fetcher.clone().fetch(id));
            }
            // Batch barrier: every task joins before the next batch starts.
            while let Some(joined) = tasks.join_next().await {
                match joined.map_err(|e| HarvesterError::TaskFailure(e.to_string()))? {
                    FetchOutcome::Envelope(envelope) => job.add_record(&envelope)?,
                    FetchOutcome::Filtered(_) => stats.filtered += 1,
                }
            }
        }
        Ok(stats)
    }

    async fn filter_covered(
        &self,
        staged: Vec<RecordId>,
    ) -> Result<Vec<RecordId>, HarvesterError> {
        if staged.is_empty() {
            return Ok(staged);
        }
        let bib_ids: Vec<String> = staged
            .iter()
            .map(|id| id.bibliographic_record_id.clone())
            .collect();
        let mut attempt = 1;
        let covered = loop {
            match self.ctx.cover.filter_has_cover(&bib_ids).await {
                Ok(covered) => break covered,
                Err(e) if attempt < COVER_FILTER_MAX_ATTEMPTS => {
                    warn!(attempt, error = %e, "cover filter call failed, retrying");
                    tokio::time::sleep(COVER_FILTER_RETRY_DELAY).await;
                    attempt += 1;
                }
                Err(e) => {
                    return Err(HarvesterError::CoverService {
                        attempts: attempt,
                        message: e.to_string(),
                    })
                }
            }
        };
        let staged_count = staged.len();
        let surviving: Vec<RecordId> = staged
            .into_iter()
            .filter(|id| !covered.contains(&id.bibliographic_record_id))
            .collect();
        info!(
            covered = staged_count - surviving.len(),
            remaining = surviving.len(),
            "cover pre-filter applied"
        );
        Ok(surviving)
    }

    async fn query_templates(&self) -> Result<Vec<String>, HarvesterError> {
        let content = &self.config.content;
        let templates: Vec<String> = match (&content.query, &content.query_file_id) {
            (Some(query), None) => vec![query.clone()],
            (None, Some(file_id)) => {
                let bytes = self
                    .ctx
                    .file_store
                    .get_file(file_id)
                    .await
                    .map_err(|e| HarvesterError::FileStore(e.to_string()))?;
                let text = String::from_utf8(bytes).map_err(|e| {
                    HarvesterError::QueryResolution(format!(
                        "query file {file_id} is not valid utf-8: {e}"
                    ))
                })?;
                text.lines()
                    .map(str::trim)
                    .filter(|line| !line.is_empty())
                    .map(String::from)
                    .collect()
            }
            (Some(_), Some(_)) => {
                return Err(HarvesterError::InvalidConfig {
                    id: self.config.id,
                    reason: "both query and query_file_id are set".to_string(),
                })
            }
            (None, None) => {
                return Err(HarvesterError::InvalidConfig {
                    id: self.config.id,
                    reason: "neither query nor query_file_id is set".to_string(),
                })
            }
        };
        if templates.is_empty() {
            return Err(HarvesterError::InvalidConfig {
                id: self.config.id,
                reason: "query file contains no query templates".to_string(),
            });
        }
        Ok(templates)
    }
}
