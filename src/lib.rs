//! playrun - execution core for automation playbook jobs
//!
//! playrun launches playbook processes, captures their output line by line,
//! fans every line out to live viewers and a persistence pool, and skips
//! dependency provisioning when requirements files have not changed.

pub mod cache;
pub mod capture;
pub mod config;
pub mod domain;
pub mod engine;
pub mod error;
pub mod logger;
pub mod runner;
pub mod storage;

pub use error::{FatalError, Result, RunnerError};
