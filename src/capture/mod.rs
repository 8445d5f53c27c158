//! Child process output capture.
//!
//! - LineReader: turns a byte stream into complete lines
//! - OutputCapture: drains stdout and stderr concurrently into a TaskLogger

mod line_reader;
mod output;

pub use line_reader::{LineReadError, LineReader};
pub use output::{CaptureSummary, OutputCapture, StreamKind, StreamSummary};
