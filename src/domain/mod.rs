//! Domain types for playrun
//!
//! - JobRef / Template: identity of a job and the template it runs
//! - LogEvent: one timestamped line of job output
//! - PersistRequest: the durable-storage hand-off for a LogEvent

pub mod event;
pub mod job;

pub use event::{LogEvent, PersistRequest, event_types};
pub use job::{JobRef, Template};
