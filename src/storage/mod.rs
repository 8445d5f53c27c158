//! Storage layer for playrun - durable job output.
//!
//! The persistence pool consumes `PersistRequest`s produced by every
//! `TaskLogger` and writes them to a `LogStore`. The bundled store keeps one
//! JSONL file per job.

mod jsonl;
mod pool;
mod traits;

pub use jsonl::JsonlLogStore;
pub use pool::{PersistencePool, PoolConfig};
pub use traits::LogStore;
