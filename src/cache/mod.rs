//! Content-hash cache for requirements files.
//!
//! Each requirements file has a sibling `<file>.md5` hash record holding the
//! lowercase hex MD5 of the content it was last provisioned with.

mod requirements;

pub use requirements::{HASH_RECORD_SUFFIX, RequirementsCache, file_digest, hash_record_path};
