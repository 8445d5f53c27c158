//! Job identity and template types.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Identity of a running job, carried on every event it produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobRef {
    /// Job (task) identifier
    pub job_id: u64,
    /// Owning project identifier
    pub project_id: u64,
}

impl JobRef {
    pub fn new(job_id: u64, project_id: u64) -> Self {
        Self { job_id, project_id }
    }
}

/// The template a job was launched from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Template {
    /// Template identifier, used to resolve the repository checkout
    pub id: u64,
    /// Automation entry file, relative to the repository root
    pub playbook: PathBuf,
}

impl Template {
    pub fn new(id: u64, playbook: impl Into<PathBuf>) -> Self {
        Self {
            id,
            playbook: playbook.into(),
        }
    }

    /// Directory containing the playbook once joined onto `repo_root`.
    ///
    /// A playbook at the repository root yields the root itself.
    pub fn playbook_dir(&self, repo_root: &Path) -> PathBuf {
        let playbook_path = repo_root.join(&self.playbook);
        match playbook_path.parent() {
            Some(dir) => dir.to_path_buf(),
            None => repo_root.to_path_buf(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_playbook_dir_nested() {
        let template = Template::new(1, "deploy/site.yml");
        assert_eq!(
            template.playbook_dir(Path::new("/repos/7")),
            PathBuf::from("/repos/7/deploy")
        );
    }

    #[test]
    fn test_playbook_dir_at_root() {
        let template = Template::new(1, "site.yml");
        assert_eq!(template.playbook_dir(Path::new("/repos/7")), PathBuf::from("/repos/7"));
    }

    #[test]
    fn test_playbook_dir_is_repeatable() {
        let template = Template::new(3, "a/b/c.yml");
        let root = Path::new("/srv/repo");
        assert_eq!(template.playbook_dir(root), template.playbook_dir(root));
    }
}
