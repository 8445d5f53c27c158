//! Persistence worker pool.
//!
//! A dispatcher reads the shared bounded queue and routes each record to a
//! worker chosen by job id, so one job's records are stored in the order
//! they were logged while different jobs are written in parallel.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::traits::LogStore;
use crate::domain::PersistRequest;

/// Configuration for the PersistencePool.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Number of storage workers
    pub workers: usize,
    /// Capacity of the shared queue producers send into
    pub queue_capacity: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            queue_capacity: 256,
        }
    }
}

/// Fixed-size pool of storage workers.
pub struct PersistencePool {
    dispatcher: JoinHandle<()>,
    workers: Vec<JoinHandle<usize>>,
}

impl PersistencePool {
    /// Start the pool; returns it with the sender producers log into.
    pub fn spawn(config: &PoolConfig, store: Arc<dyn LogStore>) -> (Self, mpsc::Sender<PersistRequest>) {
        let worker_count = config.workers.max(1);
        let (tx, rx) = mpsc::channel(config.queue_capacity.max(1));

        let mut shards = Vec::with_capacity(worker_count);
        let mut workers = Vec::with_capacity(worker_count);
        for id in 0..worker_count {
            let (shard_tx, shard_rx) = mpsc::channel(config.queue_capacity.max(1));
            shards.push(shard_tx);
            workers.push(tokio::spawn(store_records(id, shard_rx, store.clone())));
        }

        let dispatcher = tokio::spawn(dispatch(rx, shards));
        log::debug!("Persistence pool started with {} workers", worker_count);

        (Self { dispatcher, workers }, tx)
    }

    /// Wait until every sender is dropped and all queued records are stored.
    ///
    /// Returns the number of records written.
    pub async fn shutdown(self) -> usize {
        if let Err(e) = self.dispatcher.await {
            log::error!("Persistence dispatcher failed: {}", e);
        }

        let mut stored = 0;
        for worker in self.workers {
            match worker.await {
                Ok(count) => stored += count,
                Err(e) => log::error!("Persistence worker failed: {}", e),
            }
        }
        stored
    }
}

async fn dispatch(mut rx: mpsc::Receiver<PersistRequest>, shards: Vec<mpsc::Sender<PersistRequest>>) {
    while let Some(record) = rx.recv().await {
        let shard = (record.job.job_id % shards.len() as u64) as usize;
        if shards[shard].send(record).await.is_err() {
            log::error!("Persistence worker {} is gone, record dropped", shard);
        }
    }
}

async fn store_records(id: usize, mut rx: mpsc::Receiver<PersistRequest>, store: Arc<dyn LogStore>) -> usize {
    let mut stored = 0;
    while let Some(record) = rx.recv().await {
        match store.append(&record) {
            Ok(()) => stored += 1,
            Err(e) => log::warn!(
                "Worker {} failed to store log record for job {}: {}",
                id,
                record.job.job_id,
                e
            ),
        }
    }
    stored
}
