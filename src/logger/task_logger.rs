//! Per-job logger: timestamps lines, fans them out to viewers and hands
//! them to the persistence pool.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;

use super::viewers::{BroadcastSink, ViewerRegistry};
use crate::domain::{JobRef, LogEvent, PersistRequest};
use crate::error::{FatalError, RunnerError};

/// Logger injected into a job at start.
///
/// Cheap to clone; every drain task holds its own copy. For each call the
/// event is broadcast to the viewers registered at that moment, then sent
/// to the persistence channel. A full channel suspends the caller until a
/// worker frees a slot, so slow storage throttles the producer instead of
/// losing records.
#[derive(Clone)]
pub struct TaskLogger {
    job: JobRef,
    viewers: Arc<ViewerRegistry>,
    sink: Arc<dyn BroadcastSink>,
    persist_tx: mpsc::Sender<PersistRequest>,
}

impl fmt::Debug for TaskLogger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskLogger")
            .field("job", &self.job)
            .field("viewers", &self.viewers.len())
            .finish_non_exhaustive()
    }
}

impl TaskLogger {
    pub fn new(
        job: JobRef,
        viewers: Arc<ViewerRegistry>,
        sink: Arc<dyn BroadcastSink>,
        persist_tx: mpsc::Sender<PersistRequest>,
    ) -> Self {
        Self {
            job,
            viewers,
            sink,
            persist_tx,
        }
    }

    pub fn job(&self) -> JobRef {
        self.job
    }

    pub fn viewers(&self) -> &Arc<ViewerRegistry> {
        &self.viewers
    }

    /// Log a line stamped with the current time.
    pub async fn log(&self, text: impl Into<String>) -> Result<(), FatalError> {
        self.log_at(text, Utc::now()).await
    }

    /// Log a line with a caller-supplied timestamp.
    pub async fn log_at(&self, text: impl Into<String>, timestamp: DateTime<Utc>) -> Result<(), FatalError> {
        self.emit(LogEvent::new(self.job, text, timestamp)).await
    }

    /// Format then log: `logger.logf(format_args!("step {} done", n)).await`.
    ///
    /// The arguments are rendered before this returns; the future only
    /// borrows the logger.
    pub fn logf<'a>(&'a self, args: fmt::Arguments<'_>) -> impl Future<Output = Result<(), FatalError>> + use<'a> {
        let text = args.to_string();
        self.log(text)
    }

    /// Announce a failure on the job stream, then hand back the error to
    /// propagate. A fatal logging error takes precedence over `err`.
    pub async fn fail(&self, message: impl Into<String>, err: RunnerError) -> RunnerError {
        let message = message.into();
        log::error!("Job {} aborted: {}: {}", self.job.job_id, message, err);
        match self.log(message).await {
            Ok(()) => err,
            Err(fatal) => fatal.into(),
        }
    }

    async fn emit(&self, event: LogEvent) -> Result<(), FatalError> {
        let payload = event.to_transport().map_err(|source| FatalError::Serialization {
            job_id: self.job.job_id,
            source,
        })?;

        for viewer in self.viewers.snapshot() {
            self.sink.deliver(&viewer, &payload);
        }

        if self.persist_tx.send(event.into_persist_request()).await.is_err() {
            log::error!(
                "Persistence queue closed, log record for job {} not stored",
                self.job.job_id
            );
        }

        Ok(())
    }
}
