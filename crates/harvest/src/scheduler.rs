//! Cron-based harvest scheduler.
//!
//! Sweeps the enabled configs on a fixed tick and dispatches a harvest
//! cycle for every config whose schedule is satisfied or overdue. A
//! dispatch is fire-and-forget behind a semaphore, so a burst of due
//! configs queues instead of starving the per-cycle fetch pool, and a
//! config with a cycle already in flight is not dispatched again.

use std::collections::HashSet;
use std::str::FromStr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, Offset, Utc};
use cron::Schedule;
use tokio::sync::Semaphore;
use tracing::{debug, error, info, warn};

use bibharvest_connector::ConfigStore;
use bibharvest_core::config::SchedulerSettings;
use bibharvest_core::{HarvestConfig, HarvesterError};

use crate::operation::{HarvestOperation, HarvesterContext};

/// Runs one harvest cycle for a config; substituted in scheduler tests.
#[async_trait]
pub trait HarvestExecutor: Send + Sync {
    async fn execute(&self, config: HarvestConfig) -> Result<u64, HarvesterError>;
}

/// Production executor backed by the shared harvester context.
pub struct ContextHarvestExecutor {
    ctx: Arc<HarvesterContext>,
}

impl ContextHarvestExecutor {
    pub fn new(ctx: Arc<HarvesterContext>) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl HarvestExecutor for ContextHarvestExecutor {
    async fn execute(&self, config: HarvestConfig) -> Result<u64, HarvesterError> {
        HarvestOperation::new(config, self.ctx.clone())?.execute().await
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ScheduleError {
    #[error("invalid cron expression: {0}")]
    Cron(#[from] cron::error::Error),
    #[error("invalid timezone {0:?} (expected UTC or a fixed offset)")]
    Timezone(String),
}

pub struct HarvestScheduler {
    config_store: Arc<dyn ConfigStore>,
    executor: Arc<dyn HarvestExecutor>,
    dispatch: Arc<Semaphore>,
    running: Arc<Mutex<HashSet<i64>>>,
    tick: Duration,
}

impl HarvestScheduler {
    pub fn new(
        config_store: Arc<dyn ConfigStore>,
        executor: Arc<dyn HarvestExecutor>,
        settings: &SchedulerSettings,
    ) -> Self {
        Self {
            config_store,
            executor,
            dispatch: Arc::new(Semaphore::new(settings.dispatch_permits as usize)),
            running: Arc::new(Mutex::new(HashSet::new())),
            tick: Duration::from_secs(settings.tick_secs),
        }
    }

    /// Run the scheduler loop; never returns.
    pub async fn run(&self) {
        info!(
            "harvest scheduler started (tick interval: {}s)",
            self.tick.as_secs()
        );
        loop {
            tokio::time::sleep(self.tick).await;
            self.tick_once(Utc::now()).await;
        }
    }

    /// One eligibility sweep over the enabled configs.
    pub async fn tick_once(&self, now: DateTime<Utc>) {
        let configs = match self.config_store.list_enabled_configs().await {
            Ok(configs) => configs,
            Err(e) => {
                warn!(error = %e, "scheduler: failed to list enabled configs");
                return;
            }
        };

        for config in configs {
            let due = match can_run(
                &config.content.schedule,
                &config.content.timezone,
                now,
                config.content.time_of_last_harvest,
            ) {
                Ok(due) => due,
                Err(e) => {
                    warn!(
                        config_id = config.id,
                        name = %config.content.name,
                        error = %e,
                        "scheduler: eligibility check failed, skipping"
                    );
                    continue;
                }
            };
            if !due {
                continue;
            }
            {
                let mut running = self.running.lock().unwrap();
                if !running.insert(config.id) {
                    debug!(config_id = config.id, "scheduler: cycle already in flight");
                    continue;
                }
            }

            info!(
                config_id = config.id,
                name = %config.content.name,
                "scheduler: dispatching harvest"
            );
            let executor = self.executor.clone();
            let dispatch = self.dispatch.clone();
            let running = self.running.clone();
            let config_id = config.id;
            tokio::spawn(async move {
                // Holding a permit bounds concurrently running cycles.
                let _permit = dispatch.acquire_owned().await;
                match executor.execute(config).await {
                    Ok(records) => {
                        info!(config_id, records, "harvest cycle finished")
                    }
                    Err(e) => error!(config_id, error = %e, "harvest cycle failed"),
                }
                running.lock().unwrap().remove(&config_id);
            });
        }
    }

    /// Number of cycles currently in flight.
    pub fn running_harvests(&self) -> usize {
        self.running.lock().unwrap().len()
    }
}

/// Whether a harvest may run now: the schedule fires within the current
/// tick window, or a fire time has passed since the last harvest
/// (overdue). An unset watermark is always due.
pub fn can_run(
    schedule: &str,
    timezone: &str,
    now: DateTime<Utc>,
    last_harvest: Option<DateTime<Utc>>,
) -> Result<bool, ScheduleError> {
    let schedule = parse_cron(schedule)?;
    let offset = parse_timezone(timezone)?;
    let now_local = now.with_timezone(&offset);

    let Some(last_harvest) = last_harvest else {
        return Ok(true);
    };

    // Overdue: the first fire time after the last harvest has passed.
    let last_local = last_harvest.with_timezone(&offset);
    if let Some(fire) = schedule.after(&last_local).next() {
        if fire <= now_local {
            return Ok(true);
        }
    }

    // Satisfied: a fire time lands inside the current tick window.
    let window_start = now_local - chrono::Duration::seconds(60);
    if let Some(fire) = schedule.after(&window_start).next() {
        return Ok(fire <= now_local);
    }
    Ok(false)
}

/// Parse a cron expression, auto-prepending "0 " for 5-field expressions.
///
/// The `cron` crate requires 6 fields (sec min hr dom mon dow), but the
/// admin GUI writes 5-field cron (min hr dom mon dow).
fn parse_cron(expr: &str) -> Result<Schedule, cron::error::Error> {
    let parts: Vec<&str> = expr.split_whitespace().collect();
    if parts.len() == 5 {
        let six_field = format!("0 {expr}");
        Schedule::from_str(&six_field)
    } else {
        Schedule::from_str(expr)
    }
}

/// `UTC` (or empty) and fixed `+HH:MM` / `-HH:MM` offsets.
fn parse_timezone(timezone: &str) -> Result<FixedOffset, ScheduleError> {
    match timezone {
        "" | "UTC" | "utc" => Ok(Utc.fix()),
        other => other
            .parse::<FixedOffset>()
            .map_err(|_| ScheduleError::Timezone(other.to_string())),
    }
}
