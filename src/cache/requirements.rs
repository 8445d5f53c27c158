//! Decides whether a requirements file needs provisioning again.

use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};

use md5::{Digest, Md5};

use crate::error::Result;

/// Suffix appended to a requirements path to locate its hash record.
pub const HASH_RECORD_SUFFIX: &str = ".md5";

/// Path of the hash record paired with `requirements`.
pub fn hash_record_path(requirements: &Path) -> PathBuf {
    let mut path = requirements.as_os_str().to_owned();
    path.push(HASH_RECORD_SUFFIX);
    PathBuf::from(path)
}

/// Lowercase hex MD5 of a file's content, streamed.
pub fn file_digest(path: &Path) -> io::Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Md5::new();
    io::copy(&mut file, &mut hasher)?;
    Ok(hex::encode(hasher.finalize()))
}

/// Hash-record bookkeeping for requirements files.
///
/// Any doubt counts as a change: a missing or unreadable record, or a
/// digest that can't be computed, means the file must be provisioned.
/// Records are only written after a successful provisioning run.
#[derive(Debug, Clone, Copy, Default)]
pub struct RequirementsCache;

impl RequirementsCache {
    pub fn new() -> Self {
        Self
    }

    /// Whether `requirements` changed since it was last provisioned.
    pub fn needs_provisioning(&self, requirements: &Path) -> bool {
        let record_path = hash_record_path(requirements);

        let stored = match fs::read_to_string(&record_path) {
            Ok(stored) => stored,
            Err(e) => {
                log::debug!("No usable hash record at {}: {}", record_path.display(), e);
                return true;
            }
        };

        match file_digest(requirements) {
            Ok(current) => stored != current,
            Err(e) => {
                log::warn!("Failed to hash {}: {}", requirements.display(), e);
                true
            }
        }
    }

    /// Store the current digest of `requirements`, replacing any prior record.
    ///
    /// The record is written to a temporary sibling and renamed into place,
    /// so readers never see a half-written digest.
    pub fn record(&self, requirements: &Path) -> Result<String> {
        let digest = file_digest(requirements)?;
        let record_path = hash_record_path(requirements);

        let mut tmp_path = record_path.clone().into_os_string();
        tmp_path.push(".tmp");
        let tmp_path = PathBuf::from(tmp_path);

        fs::write(&tmp_path, &digest)?;
        if let Err(e) = fs::rename(&tmp_path, &record_path) {
            let _ = fs::remove_file(&tmp_path);
            return Err(e.into());
        }

        log::debug!("Recorded digest {} for {}", digest, requirements.display());
        Ok(digest)
    }
}
