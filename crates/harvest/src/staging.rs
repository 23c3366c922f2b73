//! Durable staging of discovered record ids.
//!
//! One staging file exists per harvest cycle, keyed by config id, with
//! one `bibliographicRecordId:agencyId` line per discovered record. The
//! file is deleted when the owning [`StagingFile`] is dropped, on every
//! exit path of the cycle.

use std::fs::{self, File};
use std::io::{self, BufRead, BufReader, BufWriter, Lines, Write};
use std::path::{Path, PathBuf};

use tracing::warn;

use bibharvest_core::{HarvesterError, RecordId};

/// Handle owning the on-disk staging file for one cycle.
pub struct StagingFile {
    path: PathBuf,
}

impl StagingFile {
    /// Create the staging file for `config_id`, replacing any stale file
    /// left behind by a crashed cycle.
    pub fn create(staging_dir: &Path, config_id: i64) -> Result<Self, HarvesterError> {
        fs::create_dir_all(staging_dir)?;
        let path = staging_dir.join(format!("{config_id}.record-ids.txt"));
        if path.exists() {
            warn!(path = %path.display(), "removing stale staging file");
            fs::remove_file(&path)?;
        }
        File::create(&path)?;
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Open for appending discovered ids.
    pub fn writer(&self) -> Result<StagingWriter, HarvesterError> {
        let file = fs::OpenOptions::new().append(true).open(&self.path)?;
        Ok(StagingWriter {
            out: BufWriter::new(file),
        })
    }

    /// Open for forward-only iteration.
    pub fn reader(&self) -> Result<StagingReader, HarvesterError> {
        let file = File::open(&self.path)?;
        Ok(StagingReader {
            lines: BufReader::new(file).lines(),
        })
    }
}

impl Drop for StagingFile {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path) {
            if e.kind() != io::ErrorKind::NotFound {
                warn!(path = %self.path.display(), error = %e, "failed to delete staging file");
            }
        }
    }
}

/// Appends id lines to the staging file.
pub struct StagingWriter {
    out: BufWriter<File>,
}

impl StagingWriter {
    /// Append one id line (already in `bib:agency` form).
    pub fn append(&mut self, id: &str) -> io::Result<()> {
        writeln!(self.out, "{id}")
    }

    pub fn flush(&mut self) -> io::Result<()> {
        self.out.flush()
    }
}

/// Forward-only iterator over staged record ids.
///
/// Blank or malformed lines are skipped with a logged warning; only IO
/// failures terminate iteration.
pub struct StagingReader {
    lines: Lines<BufReader<File>>,
}

impl Iterator for StagingReader {
    type Item = io::Result<RecordId>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            match self.lines.next()? {
                Err(e) => return Some(Err(e)),
                Ok(line) => {
                    let line = line.trim();
                    if line.is_empty() {
                        continue;
                    }
                    match line.parse::<RecordId>() {
                        Ok(id) => return Some(Ok(id)),
                        Err(e) => {
                            warn!(error = %e, "skipping malformed staging line");
                            continue;
                        }
                    }
                }
            }
        }
    }
}
