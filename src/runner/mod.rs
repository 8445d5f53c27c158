//! Job runner module - orchestrates one job execution.
//!
//! This module provides:
//! - JobRunner: requirements provisioning and process launch for a job
//! - RepositoryProvider / ExecutionEngine: the collaborators it drives
//! - ProcessHandle: the cancellation hook handed out when a process starts

mod job_runner;
mod process;
mod traits;

pub use job_runner::{InstallOutcome, InstallReport, JobRunner, RequirementsKind};
pub use process::{KillSignal, ProcessHandle};
pub use traits::{ExecutionEngine, FixedRepository, ProcessStarted, RepositoryProvider};
