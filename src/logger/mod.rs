//! Job log fan-out.
//!
//! [`TaskLogger`] is the single entry point for job output. Each line is
//! broadcast to the job's [`ViewerRegistry`] through a [`BroadcastSink`] and
//! then queued for the persistence pool.

mod task_logger;
mod viewers;

pub use task_logger::TaskLogger;
pub use viewers::{BroadcastSink, ViewerId, ViewerRegistry};
