//! Job assembly against the file store and job store.
//!
//! Envelopes are spooled to a local datafile as they complete; `build()`
//! uploads the spool to the file store and creates a job referencing the
//! uploaded file. A job-store rejection that is not a server error rolls
//! the uploaded file back out of the file store. Cycles that discover
//! zero record ids take the explicit empty-job path instead.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use std::sync::Arc;

use tracing::{error, info, warn};
use uuid::Uuid;

use bibharvest_connector::{FileStore, JobInfo, JobStore};
use bibharvest_core::{Envelope, HarvesterError, JobSpecification};

pub struct JobBuilder {
    file_store: Arc<dyn FileStore>,
    job_store: Arc<dyn JobStore>,
    specification: JobSpecification,
    spool_path: PathBuf,
    spool: Option<BufWriter<File>>,
    records_added: u64,
}

impl JobBuilder {
    pub fn new(
        file_store: Arc<dyn FileStore>,
        job_store: Arc<dyn JobStore>,
        specification: JobSpecification,
        spool_dir: &std::path::Path,
    ) -> Result<Self, HarvesterError> {
        fs::create_dir_all(spool_dir)?;
        let spool_path = spool_dir.join(format!("{}.datafile", Uuid::new_v4()));
        let spool = BufWriter::new(File::create(&spool_path)?);
        Ok(Self {
            file_store,
            job_store,
            specification,
            spool_path,
            spool: Some(spool),
            records_added: 0,
        })
    }

    /// Append one envelope to the datafile spool.
    ///
    /// Framing per record: metadata length line, metadata JSON, content
    /// length line, content bytes (empty for diagnostic-only envelopes).
    pub fn add_record(&mut self, envelope: &Envelope) -> Result<(), HarvesterError> {
        let spool = self
            .spool
            .as_mut()
            .ok_or_else(|| HarvesterError::JobStore("job builder already finalized".to_string()))?;
        let metadata = serde_json::to_vec(&envelope.metadata)
            .map_err(|e| HarvesterError::JobStore(format!("metadata serialization: {e}")))?;
        let content = envelope.content.as_deref().unwrap_or_default();
        writeln!(spool, "{}", metadata.len())?;
        spool.write_all(&metadata)?;
        spool.write_all(b"\n")?;
        writeln!(spool, "{}", content.len())?;
        spool.write_all(content)?;
        spool.write_all(b"\n")?;
        self.records_added += 1;
        Ok(())
    }

    pub fn records_added(&self) -> u64 {
        self.records_added
    }

    /// Upload the datafile, if non-empty, and create the job referencing
    /// it. Returns `None` when no records were added (no job is created).
    pub async fn build(&mut self) -> Result<Option<JobInfo>, HarvesterError> {
        if let Some(mut spool) = self.spool.take() {
            spool.flush()?;
        }
        if self.records_added == 0 {
            info!("no records added, skipping job creation");
            return Ok(None);
        }

        let bytes = fs::read(&self.spool_path)?;
        let file_id = self
            .file_store
            .add_file(bytes)
            .await
            .map_err(|e| HarvesterError::FileStore(e.to_string()))?;
        info!(file_id = %file_id, "added datafile to file-store");

        match self.job_store.add_job(&self.specification, &file_id).await {
            Ok(job) => {
                info!(
                    job_id = job.job_id,
                    records = self.records_added,
                    "created job in job-store"
                );
                Ok(Some(job))
            }
            Err(e) => {
                // On a server error the job-store may still reference the
                // uploaded file, so only roll back on client-side rejects.
                if !e.is_server_error() {
                    info!(file_id = %file_id, "removing datafile from file-store");
                    if let Err(delete_err) = self.file_store.delete_file(&file_id).await {
                        error!(file_id = %file_id, error = %delete_err, "failed to remove uploaded datafile");
                    }
                }
                Err(HarvesterError::JobStore(e.to_string()))
            }
        }
    }

    /// Create a job with zero records.
    pub async fn add_empty_job(&self) -> Result<JobInfo, HarvesterError> {
        let job = self
            .job_store
            .add_empty_job(&self.specification)
            .await
            .map_err(|e| HarvesterError::JobStore(e.to_string()))?;
        info!(job_id = job.job_id, "created empty job in job-store");
        Ok(job)
    }
}

impl Drop for JobBuilder {
    fn drop(&mut self) {
        self.spool = None;
        if let Err(e) = fs::remove_file(&self.spool_path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(path = %self.spool_path.display(), error = %e, "failed to delete datafile spool");
            }
        }
    }
}
