//! Cancellation hook for a running automation process.

use tokio::sync::mpsc;

/// Handle to a live child process, given to the `on_started` callback.
///
/// Cloneable; any clone may request termination. Timeouts and signalling
/// policy belong to whoever holds the handle.
#[derive(Debug, Clone)]
pub struct ProcessHandle {
    pid: Option<u32>,
    kill_tx: mpsc::Sender<()>,
}

/// Engine side of a [`ProcessHandle`].
#[derive(Debug)]
pub struct KillSignal {
    kill_rx: mpsc::Receiver<()>,
}

impl ProcessHandle {
    pub fn new(pid: Option<u32>) -> (Self, KillSignal) {
        let (kill_tx, kill_rx) = mpsc::channel(1);
        (Self { pid, kill_tx }, KillSignal { kill_rx })
    }

    /// OS process id, if the process was still running when it started.
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Ask the engine to kill the process.
    ///
    /// Returns false once the process has already been reaped.
    pub fn kill(&self) -> bool {
        match self.kill_tx.try_send(()) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(())) => true,
            Err(mpsc::error::TrySendError::Closed(())) => false,
        }
    }
}

impl KillSignal {
    /// Resolves when a kill has been requested.
    ///
    /// Never resolves if every handle is dropped without requesting one.
    pub async fn requested(&mut self) {
        if self.kill_rx.recv().await.is_none() {
            std::future::pending::<()>().await;
        }
    }
}
