//! Runner configuration.
//!
//! Loaded from `.playrun.yml` or `~/.config/playrun/playrun.yml`.

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::storage::PoolConfig;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct RunnerConfig {
    pub log_level: Option<String>,
    pub engine: EngineConfig,
    pub persistence: PersistenceConfig,
}

/// How automation and provisioning processes are launched.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct EngineConfig {
    /// Binary that runs playbooks
    pub playbook_bin: String,
    /// Binary that installs roles and collections
    pub galaxy_bin: String,
    /// `HOME` for child processes; inherited when unset
    pub home_dir: Option<PathBuf>,
    /// Inherited variables with these prefixes are not passed to children
    pub sensitive_env_prefixes: Vec<String>,
    /// Variables added to every child environment
    pub extra_env: Vec<(String, String)>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            playbook_bin: "ansible-playbook".to_string(),
            galaxy_bin: "ansible-galaxy".to_string(),
            home_dir: None,
            sensitive_env_prefixes: vec!["PLAYRUN_".to_string()],
            extra_env: vec![
                ("PYTHONUNBUFFERED".to_string(), "1".to_string()),
                ("ANSIBLE_FORCE_COLOR".to_string(), "True".to_string()),
            ],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct PersistenceConfig {
    pub workers: usize,
    pub queue_capacity: usize,
    pub log_dir: PathBuf,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        let pool = PoolConfig::default();
        Self {
            workers: pool.workers,
            queue_capacity: pool.queue_capacity,
            log_dir: dirs::data_local_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("playrun")
                .join("jobs"),
        }
    }
}

impl PersistenceConfig {
    pub fn pool_config(&self) -> PoolConfig {
        PoolConfig {
            workers: self.workers,
            queue_capacity: self.queue_capacity,
        }
    }
}

impl RunnerConfig {
    /// Load configuration with fallback chain.
    ///
    /// Search order:
    /// 1. Explicit path if provided
    /// 2. .playrun.yml in current directory
    /// 3. ~/.config/playrun/playrun.yml
    /// 4. Defaults
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        let project_config = PathBuf::from(".playrun.yml");
        if project_config.exists() {
            match Self::load_from_file(&project_config) {
                Ok(config) => {
                    log::info!("Loaded config from .playrun.yml");
                    return Ok(config);
                }
                Err(e) => {
                    log::warn!("Failed to load .playrun.yml: {}", e);
                }
            }
        }

        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("playrun").join("playrun.yml");
            if user_config.exists() {
                match Self::load_from_file(&user_config) {
                    Ok(config) => {
                        log::info!("Loaded config from {}", user_config.display());
                        return Ok(config);
                    }
                    Err(e) => {
                        log::warn!("Failed to load {}: {}", user_config.display(), e);
                    }
                }
            }
        }

        log::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;
        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.persistence.workers == 0 {
            eyre::bail!("persistence.workers must be > 0");
        }
        if self.persistence.queue_capacity == 0 {
            eyre::bail!("persistence.queue-capacity must be > 0");
        }
        if self.engine.playbook_bin.trim().is_empty() {
            eyre::bail!("engine.playbook-bin must not be empty");
        }
        if self.engine.galaxy_bin.trim().is_empty() {
            eyre::bail!("engine.galaxy-bin must not be empty");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = RunnerConfig::default();
        assert_eq!(config.engine.playbook_bin, "ansible-playbook");
        assert_eq!(config.engine.galaxy_bin, "ansible-galaxy");
        assert_eq!(config.persistence.workers, 4);
        assert_eq!(config.persistence.queue_capacity, 256);
        assert!(config.persistence.log_dir.ends_with("playrun/jobs"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_explicit_file_with_partial_sections() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("playrun.yml");
        fs::write(
            &path,
            r#"
log-level: debug
engine:
  playbook-bin: /opt/ansible/bin/ansible-playbook
  home-dir: /var/lib/playrun
persistence:
  workers: 2
"#,
        )
        .unwrap();

        let config = RunnerConfig::load(Some(&path)).unwrap();

        assert_eq!(config.log_level.as_deref(), Some("debug"));
        assert_eq!(config.engine.playbook_bin, "/opt/ansible/bin/ansible-playbook");
        assert_eq!(config.engine.galaxy_bin, "ansible-galaxy");
        assert_eq!(config.engine.home_dir, Some(PathBuf::from("/var/lib/playrun")));
        assert_eq!(config.persistence.workers, 2);
        assert_eq!(config.persistence.queue_capacity, 256);
        assert_eq!(config.persistence.pool_config().workers, 2);
    }

    #[test]
    fn test_load_rejects_zero_workers() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("playrun.yml");
        fs::write(&path, "persistence:\n  workers: 0\n").unwrap();

        assert!(RunnerConfig::load(Some(&path)).is_err());
    }

    #[test]
    fn test_load_missing_explicit_file_fails() {
        let path = PathBuf::from("/nonexistent/playrun.yml");
        assert!(RunnerConfig::load(Some(&path)).is_err());
    }
}
