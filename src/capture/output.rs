//! Concurrent capture of a child process's stdout and stderr.

use std::fmt;
use std::time::Duration;

use futures::StreamExt;
use tokio::io::{AsyncBufRead, AsyncRead, BufReader};
use tokio::process::Child;
use tokio::task::JoinHandle;

use super::line_reader::LineReader;
use crate::error::{FatalError, Result, RunnerError};
use crate::logger::TaskLogger;

/// Which output stream a drain task reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamKind {
    Stdout,
    Stderr,
}

impl fmt::Display for StreamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StreamKind::Stdout => f.write_str("stdout"),
            StreamKind::Stderr => f.write_str("stderr"),
        }
    }
}

/// What one drain task saw before it stopped.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StreamSummary {
    /// Lines handed to the logger
    pub lines: usize,
    /// Read fault that ended the stream early, if any
    pub fault: Option<String>,
}

impl StreamSummary {
    pub fn ended_cleanly(&self) -> bool {
        self.fault.is_none()
    }
}

/// Result of a finished capture.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CaptureSummary {
    pub stdout: StreamSummary,
    pub stderr: StreamSummary,
}

impl CaptureSummary {
    pub fn total_lines(&self) -> usize {
        self.stdout.lines + self.stderr.lines
    }
}

type DrainHandle = JoinHandle<std::result::Result<StreamSummary, FatalError>>;

/// Owns the two drain tasks of a running process.
///
/// Each stream is drained by its own task with no coordination between
/// them: lines of one stream reach the logger in order, but the relative
/// order of stdout and stderr lines is unspecified. A read fault ends only
/// the stream it happened on.
pub struct OutputCapture {
    stdout: DrainHandle,
    stderr: DrainHandle,
}

impl OutputCapture {
    /// Take the child's piped stdout and stderr and start draining them.
    pub fn attach(child: &mut Child, logger: &TaskLogger) -> Result<Self> {
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| RunnerError::Capture("child stdout is not piped".to_string()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| RunnerError::Capture("child stderr is not piped".to_string()))?;
        Ok(Self::from_streams(stdout, stderr, logger))
    }

    /// Start draining two arbitrary readers.
    pub fn from_streams<O, E>(stdout: O, stderr: E, logger: &TaskLogger) -> Self
    where
        O: AsyncRead + Send + Unpin + 'static,
        E: AsyncRead + Send + Unpin + 'static,
    {
        Self {
            stdout: tokio::spawn(drain(StreamKind::Stdout, BufReader::new(stdout), logger.clone())),
            stderr: tokio::spawn(drain(StreamKind::Stderr, BufReader::new(stderr), logger.clone())),
        }
    }

    /// Wait for both drain tasks to finish.
    pub async fn join(self) -> Result<CaptureSummary> {
        let (stdout, stderr) = tokio::join!(self.stdout, self.stderr);
        Ok(CaptureSummary {
            stdout: finished(StreamKind::Stdout, stdout)?,
            stderr: finished(StreamKind::Stderr, stderr)?,
        })
    }

    /// Like [`join`](Self::join), but gives up after `grace`.
    ///
    /// Used once the process is gone: a descendant that inherited the pipes
    /// can keep them open indefinitely. On timeout both drain tasks are
    /// aborted and a `Capture` error is returned.
    pub async fn join_within(self, grace: Duration) -> Result<CaptureSummary> {
        let stdout = self.stdout.abort_handle();
        let stderr = self.stderr.abort_handle();

        match tokio::time::timeout(grace, self.join()).await {
            Ok(summary) => summary,
            Err(_) => {
                stdout.abort();
                stderr.abort();
                Err(RunnerError::Capture(format!(
                    "output streams still open {:?} after process exit",
                    grace
                )))
            }
        }
    }
}

fn finished(
    kind: StreamKind,
    joined: std::result::Result<std::result::Result<StreamSummary, FatalError>, tokio::task::JoinError>,
) -> Result<StreamSummary> {
    match joined {
        Ok(summary) => Ok(summary?),
        Err(e) => Err(RunnerError::Capture(format!("{} drain task failed: {}", kind, e))),
    }
}

async fn drain<R>(kind: StreamKind, reader: R, logger: TaskLogger) -> std::result::Result<StreamSummary, FatalError>
where
    R: AsyncBufRead + Unpin,
{
    let job_id = logger.job().job_id;
    let lines = LineReader::new(reader).into_stream();
    tokio::pin!(lines);

    let mut summary = StreamSummary::default();
    while let Some(item) = lines.next().await {
        match item {
            Ok(line) => {
                logger.log(line).await?;
                summary.lines += 1;
            }
            Err(mut e) => {
                if let Some(partial) = e.take_partial() {
                    logger.log(partial).await?;
                    summary.lines += 1;
                }
                if e.is_closed() {
                    log::warn!("{} of job {} closed while reading: {}", kind, job_id, e.io_error());
                } else {
                    log::warn!("Failed to read {} of job {}: {}", kind, job_id, e.io_error());
                }
                summary.fault = Some(e.to_string());
            }
        }
    }

    log::debug!("{} of job {} drained after {} lines", kind, job_id, summary.lines);
    Ok(summary)
}
