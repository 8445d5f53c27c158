//! Execution engines.
//!
//! LocalEngine launches the playbook and galaxy binaries as child
//! processes and captures their output into the job's TaskLogger.

mod local;

pub use local::LocalEngine;
