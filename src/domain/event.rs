//! Log event types for job output.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::job::JobRef;

/// Event type constants used in the transport form
pub mod event_types {
    pub const LOG: &str = "log";
}

/// One line of job output, stamped with its emission time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEvent {
    job: JobRef,
    text: String,
    timestamp: DateTime<Utc>,
}

/// Wire shape delivered to viewers.
#[derive(Serialize)]
struct TransportEvent<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    output: &'a str,
    time: DateTime<Utc>,
    task_id: u64,
    project_id: u64,
}

impl LogEvent {
    pub fn new(job: JobRef, text: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            job,
            text: text.into(),
            timestamp,
        }
    }

    pub fn job(&self) -> JobRef {
        self.job
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// Serialize into the JSON payload sent to viewers.
    ///
    /// Format: `{"type":"log","output":..,"time":..,"task_id":..,"project_id":..}`
    pub fn to_transport(&self) -> serde_json::Result<String> {
        serde_json::to_string(&TransportEvent {
            kind: event_types::LOG,
            output: &self.text,
            time: self.timestamp,
            task_id: self.job.job_id,
            project_id: self.job.project_id,
        })
    }

    /// Build the persistence hand-off for this event.
    pub fn into_persist_request(self) -> PersistRequest {
        PersistRequest {
            job: self.job,
            output: self.text,
            time: self.timestamp,
        }
    }
}

/// Durable-storage record for one log event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistRequest {
    pub job: JobRef,
    pub output: String,
    pub time: DateTime<Utc>,
}
