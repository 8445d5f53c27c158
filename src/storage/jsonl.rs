//! JSONL-based log storage, one file per job.

use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use super::traits::LogStore;
use crate::domain::PersistRequest;
use crate::error::{Result, RunnerError};

/// Appends records to `<base_path>/<job_id>.jsonl`.
///
/// Writes are serialized through a mutex so lines from concurrent pool
/// workers never interleave within a file.
pub struct JsonlLogStore {
    base_path: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonlLogStore {
    /// Create a new JsonlLogStore at the given path.
    pub fn new(base_path: impl AsRef<Path>) -> Result<Self> {
        let base_path = base_path.as_ref().to_path_buf();
        fs::create_dir_all(&base_path)?;
        Ok(Self {
            base_path,
            write_lock: Mutex::new(()),
        })
    }

    /// Get the file path for a job.
    pub fn job_path(&self, job_id: u64) -> PathBuf {
        self.base_path.join(format!("{}.jsonl", job_id))
    }
}

impl LogStore for JsonlLogStore {
    fn append(&self, record: &PersistRequest) -> Result<()> {
        let line = serde_json::to_string(record)?;
        let _guard = self.write_lock.lock().map_err(|e| RunnerError::Storage(e.to_string()))?;

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.job_path(record.job.job_id))?;
        writeln!(file, "{}", line)?;
        Ok(())
    }

    fn read_job(&self, job_id: u64) -> Result<Vec<PersistRequest>> {
        let path = self.job_path(job_id);
        if !path.exists() {
            return Ok(Vec::new());
        }

        let reader = BufReader::new(File::open(&path)?);
        let mut records = Vec::new();
        for line in reader.lines() {
            let line = line?;
            if !line.trim().is_empty() {
                records.push(serde_json::from_str(&line)?);
            }
        }
        Ok(records)
    }
}
