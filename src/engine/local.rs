//! Local process engine - runs playbook and galaxy binaries on this host.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::{Child, ChildStdin, Command};

use crate::capture::{CaptureSummary, OutputCapture};
use crate::config::EngineConfig;
use crate::error::{Result, RunnerError};
use crate::logger::TaskLogger;
use crate::runner::{ExecutionEngine, ProcessHandle, ProcessStarted};

/// How long output may keep flowing after a killed process is reaped.
const KILL_DRAIN_GRACE: Duration = Duration::from_secs(5);

/// Engine that spawns child processes in the repository checkout.
///
/// Output of every child is captured line by line into the job's logger,
/// and a call only returns once both output streams are drained.
pub struct LocalEngine {
    config: EngineConfig,
    work_dir: PathBuf,
    logger: TaskLogger,
}

impl LocalEngine {
    pub fn new(config: EngineConfig, work_dir: impl Into<PathBuf>, logger: TaskLogger) -> Self {
        Self {
            config,
            work_dir: work_dir.into(),
            logger,
        }
    }

    /// Environment for a child process.
    ///
    /// Inherited variables minus sensitive prefixes, then `HOME`, `PWD`,
    /// configured extras and finally the job's own variables. Later entries
    /// win on duplicate keys.
    pub fn child_env(
        &self,
        inherited: impl IntoIterator<Item = (String, String)>,
        job_env: &[(String, String)],
    ) -> Vec<(String, String)> {
        let mut env: Vec<(String, String)> = inherited
            .into_iter()
            .filter(|(key, _)| {
                !self
                    .config
                    .sensitive_env_prefixes
                    .iter()
                    .any(|prefix| key.starts_with(prefix.as_str()))
            })
            .collect();

        if let Some(home) = &self.config.home_dir {
            env.push(("HOME".to_string(), home.to_string_lossy().into_owned()));
        }
        env.push(("PWD".to_string(), self.work_dir.to_string_lossy().into_owned()));
        env.extend(self.config.extra_env.iter().cloned());
        env.extend(job_env.iter().cloned());
        env
    }

    fn command(&self, program: &str, args: &[String], job_env: &[(String, String)], with_stdin: bool) -> Command {
        let inherited = std::env::vars_os().filter_map(|(k, v)| Some((k.into_string().ok()?, v.into_string().ok()?)));

        let mut cmd = Command::new(program);
        cmd.args(args)
            .current_dir(&self.work_dir)
            .env_clear()
            .envs(self.child_env(inherited, job_env))
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .stdin(if with_stdin { Stdio::piped() } else { Stdio::null() })
            .kill_on_drop(true);
        // Own process group, so a kill reaches every descendant.
        #[cfg(unix)]
        cmd.process_group(0);
        cmd
    }

    async fn execute(
        &self,
        program: &str,
        mut cmd: Command,
        inputs: Option<&BTreeMap<String, String>>,
        on_started: Option<ProcessStarted>,
    ) -> Result<()> {
        let mut child = cmd
            .spawn()
            .map_err(|e| RunnerError::Process(format!("Failed to start {}: {}", program, e)))?;

        let (handle, mut kill) = ProcessHandle::new(child.id());
        if let Some(on_started) = on_started {
            on_started(handle);
        } else {
            drop(handle);
        }

        let capture = OutputCapture::attach(&mut child, &self.logger)?;

        let writer = match (child.stdin.take(), inputs) {
            (Some(stdin), Some(inputs)) => Some(tokio::spawn(write_inputs(stdin, inputs.clone()))),
            _ => None,
        };

        let (status, killed) = tokio::select! {
            status = child.wait() => (status?, false),
            _ = kill.requested() => {
                log::info!("Killing {} for job {}", program, self.logger.job().job_id);
                (terminate(&mut child).await?, true)
            }
        };
        if let Some(writer) = writer {
            writer.abort();
        }

        let summary = if killed {
            match capture.join_within(KILL_DRAIN_GRACE).await {
                Err(e) if !e.is_fatal() => {
                    log::warn!("{} for job {}: {}", program, self.logger.job().job_id, e);
                    CaptureSummary::default()
                }
                other => other?,
            }
        } else {
            capture.join().await?
        };
        log::debug!(
            "{} exited with {} after {} output lines",
            program,
            status,
            summary.total_lines()
        );

        if status.success() {
            Ok(())
        } else {
            Err(RunnerError::Process(format!("{} exited with {}", program, status)))
        }
    }
}

/// Kill the child's whole process group, then reap the child.
async fn terminate(child: &mut Child) -> std::io::Result<ExitStatus> {
    #[cfg(unix)]
    if let Some(pid) = child.id() {
        use nix::sys::signal::{Signal, killpg};
        use nix::unistd::Pid;

        match killpg(Pid::from_raw(pid as i32), Signal::SIGKILL) {
            Ok(()) => return child.wait().await,
            Err(e) => log::warn!("Failed to kill process group {}: {}", pid, e),
        }
    }
    child.kill().await?;
    child.wait().await
}

/// Answer prompts: one value per line in key order, then close stdin.
async fn write_inputs(mut stdin: ChildStdin, inputs: BTreeMap<String, String>) {
    for (key, value) in &inputs {
        let written = async {
            stdin.write_all(value.as_bytes()).await?;
            stdin.write_all(b"\n").await
        }
        .await;
        if let Err(e) = written {
            log::warn!("Failed to pass input {} to process: {}", key, e);
            return;
        }
    }
    if let Err(e) = stdin.shutdown().await {
        log::debug!("Failed to close process stdin: {}", e);
    }
}

#[async_trait]
impl ExecutionEngine for LocalEngine {
    async fn run_process(
        &self,
        args: &[String],
        env: &[(String, String)],
        inputs: &BTreeMap<String, String>,
        on_started: ProcessStarted,
    ) -> Result<()> {
        let program = self.config.playbook_bin.clone();
        let cmd = self.command(&program, args, env, !inputs.is_empty());
        self.execute(&program, cmd, Some(inputs), Some(on_started)).await
    }

    async fn run_provisioning(&self, args: &[String]) -> Result<()> {
        let program = self.config.galaxy_bin.clone();
        let cmd = self.command(&program, args, &[], false);
        self.execute(&program, cmd, None, None)
            .await
            .map_err(|e| match e {
                RunnerError::Process(msg) => RunnerError::Provisioning(msg),
                other => other,
            })
    }
}
