//! Collaborator interfaces the job runner depends on.

use std::collections::BTreeMap;
use std::path::PathBuf;

use async_trait::async_trait;

use super::process::ProcessHandle;
use crate::error::{Result, RunnerError};

/// Callback invoked once with the live process right after it starts.
pub type ProcessStarted = Box<dyn FnOnce(ProcessHandle) + Send>;

/// Resolves where a template's repository is checked out.
pub trait RepositoryProvider: Send + Sync {
    /// Full path of the checkout for `template_id`. The path must exist
    /// once this returns successfully.
    fn full_path(&self, template_id: u64) -> Result<PathBuf>;
}

/// Runs external commands on behalf of a job.
///
/// Both calls complete only when the command has exited and its output has
/// been fully captured.
#[async_trait]
pub trait ExecutionEngine: Send + Sync {
    /// Run the automation process.
    async fn run_process(
        &self,
        args: &[String],
        env: &[(String, String)],
        inputs: &BTreeMap<String, String>,
        on_started: ProcessStarted,
    ) -> Result<()>;

    /// Run a dependency provisioning command (e.g. `role install -r ...`).
    async fn run_provisioning(&self, args: &[String]) -> Result<()>;
}

/// Repository provider for a checkout at a known location.
#[derive(Debug, Clone)]
pub struct FixedRepository {
    path: PathBuf,
}

impl FixedRepository {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl RepositoryProvider for FixedRepository {
    fn full_path(&self, template_id: u64) -> Result<PathBuf> {
        if !self.path.is_dir() {
            return Err(RunnerError::Repository(format!(
                "checkout for template {} not found at {}",
                template_id,
                self.path.display()
            )));
        }
        Ok(self.path.clone())
    }
}
