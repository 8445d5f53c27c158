//! Storage trait for persisted job output.

use crate::domain::PersistRequest;
use crate::error::Result;

/// Durable sink for log records, keyed by job.
pub trait LogStore: Send + Sync {
    /// Append one record to its job's log.
    fn append(&self, record: &PersistRequest) -> Result<()>;

    /// All stored records of a job, in the order they were appended.
    fn read_job(&self, job_id: u64) -> Result<Vec<PersistRequest>>;
}
