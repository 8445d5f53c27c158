//! Job runner - provisions dependencies and launches the automation process.
//!
//! The JobRunner resolves the job's repository checkout, installs collection
//! and role requirements when they changed since the last successful install,
//! and hands process execution to an [`ExecutionEngine`].

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::Mutex;

use super::traits::{ExecutionEngine, ProcessStarted, RepositoryProvider};
use crate::cache::RequirementsCache;
use crate::domain::Template;
use crate::error::Result;
use crate::logger::TaskLogger;

/// Kind of requirements file provisioned before a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequirementsKind {
    Collection,
    Role,
}

impl RequirementsKind {
    /// First argument of the provisioning command.
    pub fn command(&self) -> &'static str {
        match self {
            RequirementsKind::Collection => "collection",
            RequirementsKind::Role => "role",
        }
    }

    /// Directory holding the requirements file.
    pub fn dir_name(&self) -> &'static str {
        match self {
            RequirementsKind::Collection => "collections",
            RequirementsKind::Role => "roles",
        }
    }
}

impl fmt::Display for RequirementsKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/requirements.yml", self.dir_name())
    }
}

/// What happened to one requirements file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallOutcome {
    /// No requirements file present
    Missing,
    /// Hash record matches the current content
    Unchanged,
    /// Provisioning ran and succeeded
    Installed,
}

/// Per-kind outcome of [`JobRunner::install_requirements`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InstallReport {
    pub collections: InstallOutcome,
    pub roles: InstallOutcome,
}

/// Runs one job: requirements first, then the automation process.
///
/// At most one child process (provisioning or automation) is alive at a
/// time for a given runner.
pub struct JobRunner<P, E>
where
    P: RepositoryProvider,
    E: ExecutionEngine,
{
    template: Template,
    repository: Arc<P>,
    engine: Arc<E>,
    logger: TaskLogger,
    cache: RequirementsCache,
    process_slot: Mutex<()>,
}

impl<P, E> JobRunner<P, E>
where
    P: RepositoryProvider,
    E: ExecutionEngine,
{
    pub fn new(template: Template, repository: Arc<P>, engine: Arc<E>, logger: TaskLogger) -> Self {
        Self {
            template,
            repository,
            engine,
            logger,
            cache: RequirementsCache::new(),
            process_slot: Mutex::new(()),
        }
    }

    pub fn template(&self) -> &Template {
        &self.template
    }

    pub fn logger(&self) -> &TaskLogger {
        &self.logger
    }

    /// Directory containing the template's playbook inside the checkout.
    pub fn playbook_dir(&self) -> Result<PathBuf> {
        let repo_root = self.repository.full_path(self.template.id)?;
        Ok(self.template.playbook_dir(&repo_root))
    }

    /// Install collection requirements, then role requirements.
    ///
    /// The first failure stops the sequence; nothing else runs after it.
    pub async fn install_requirements(&self) -> Result<InstallReport> {
        let repo_root = self.resolve_repo_root().await?;
        let playbook_dir = self.template.playbook_dir(&repo_root);

        let collections = playbook_dir
            .join(RequirementsKind::Collection.dir_name())
            .join("requirements.yml");
        let collections = self.install(RequirementsKind::Collection, &collections).await?;

        let roles = repo_root.join(RequirementsKind::Role.dir_name()).join("requirements.yml");
        let roles = self.install(RequirementsKind::Role, &roles).await?;

        Ok(InstallReport { collections, roles })
    }

    /// Run the automation process and return its result unchanged.
    pub async fn run(
        &self,
        args: &[String],
        env: &[(String, String)],
        inputs: &BTreeMap<String, String>,
        on_started: ProcessStarted,
    ) -> Result<()> {
        let _slot = self.process_slot.lock().await;
        log::info!("Starting job {} ({})", self.logger.job().job_id, self.template.playbook.display());
        self.engine.run_process(args, env, inputs, on_started).await
    }

    async fn resolve_repo_root(&self) -> Result<PathBuf> {
        match self.repository.full_path(self.template.id) {
            Ok(path) => Ok(path),
            Err(e) => Err(self
                .logger
                .fail(
                    format!("Failed to resolve repository for template {}", self.template.id),
                    e,
                )
                .await),
        }
    }

    async fn install(&self, kind: RequirementsKind, requirements: &Path) -> Result<InstallOutcome> {
        if !requirements.exists() {
            self.logger
                .log(format!("No {} file found. Skip galaxy install process.", kind))
                .await?;
            return Ok(InstallOutcome::Missing);
        }

        if !self.cache.needs_provisioning(requirements) {
            self.logger
                .log(format!("{} has no changes. Skip galaxy install process.", kind))
                .await?;
            return Ok(InstallOutcome::Unchanged);
        }

        let args = vec![
            kind.command().to_string(),
            "install".to_string(),
            "-r".to_string(),
            requirements.to_string_lossy().into_owned(),
            "--force".to_string(),
        ];

        let provisioned = {
            let _slot = self.process_slot.lock().await;
            self.engine.run_provisioning(&args).await
        };
        if let Err(e) = provisioned {
            return Err(self.logger.fail(format!("Failed to install {}", kind), e).await);
        }

        if let Err(e) = self.cache.record(requirements) {
            return Err(self
                .logger
                .fail(format!("Failed to record digest of {}", kind), e)
                .await);
        }

        Ok(InstallOutcome::Installed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{file_digest, hash_record_path};
    use crate::domain::{JobRef, PersistRequest};
    use crate::error::RunnerError;
    use crate::logger::{BroadcastSink, ViewerId, ViewerRegistry};
    use crate::runner::ProcessHandle;
    use async_trait::async_trait;
    use std::fs;
    use std::sync::Mutex as StdMutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;
    use tokio::sync::mpsc;

    struct NullSink;

    impl BroadcastSink for NullSink {
        fn deliver(&self, _viewer: &ViewerId, _payload: &str) {}
    }

    /// Records provisioning calls; fails when `fail_on` matches the kind.
    #[derive(Default)]
    struct MockEngine {
        provisioning: StdMutex<Vec<Vec<String>>>,
        fail_on: Option<&'static str>,
        runs: AtomicUsize,
    }

    impl MockEngine {
        fn failing_on(kind: &'static str) -> Self {
            Self {
                fail_on: Some(kind),
                ..Default::default()
            }
        }

        fn calls(&self) -> Vec<Vec<String>> {
            self.provisioning.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ExecutionEngine for MockEngine {
        async fn run_process(
            &self,
            _args: &[String],
            _env: &[(String, String)],
            _inputs: &BTreeMap<String, String>,
            on_started: ProcessStarted,
        ) -> Result<()> {
            self.runs.fetch_add(1, Ordering::SeqCst);
            let (handle, _signal) = ProcessHandle::new(Some(4242));
            on_started(handle);
            Err(RunnerError::Process("exit status 2".to_string()))
        }

        async fn run_provisioning(&self, args: &[String]) -> Result<()> {
            self.provisioning.lock().unwrap().push(args.to_vec());
            if self.fail_on == Some(args[0].as_str()) {
                return Err(RunnerError::Provisioning(format!("{} install failed", args[0])));
            }
            Ok(())
        }
    }

    struct BrokenRepository;

    impl RepositoryProvider for BrokenRepository {
        fn full_path(&self, template_id: u64) -> Result<PathBuf> {
            Err(RunnerError::Repository(format!("no checkout for {}", template_id)))
        }
    }

    struct Fixture {
        repo: TempDir,
        engine: Arc<MockEngine>,
        runner: JobRunner<crate::runner::FixedRepository, MockEngine>,
        rx: mpsc::Receiver<PersistRequest>,
    }

    impl Fixture {
        fn new(engine: MockEngine) -> Self {
            let repo = TempDir::new().unwrap();
            fs::create_dir_all(repo.path().join("deploy")).unwrap();
            let engine = Arc::new(engine);
            let (tx, rx) = mpsc::channel(64);
            let logger = TaskLogger::new(JobRef::new(5, 1), Arc::new(ViewerRegistry::new()), Arc::new(NullSink), tx);
            let runner = JobRunner::new(
                Template::new(11, "deploy/site.yml"),
                Arc::new(crate::runner::FixedRepository::new(repo.path())),
                engine.clone(),
                logger,
            );
            Self { repo, engine, runner, rx }
        }

        fn write(&self, relative: &str, content: &str) -> PathBuf {
            let path = self.repo.path().join(relative);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(&path, content).unwrap();
            path
        }

        fn logged(&mut self) -> Vec<String> {
            let mut out = Vec::new();
            while let Ok(record) = self.rx.try_recv() {
                out.push(record.output);
            }
            out
        }
    }

    #[tokio::test]
    async fn test_no_requirements_files_skips_both() {
        let mut fx = Fixture::new(MockEngine::default());

        let report = fx.runner.install_requirements().await.unwrap();

        assert_eq!(
            report,
            InstallReport {
                collections: InstallOutcome::Missing,
                roles: InstallOutcome::Missing,
            }
        );
        assert!(fx.engine.calls().is_empty());
        assert_eq!(
            fx.logged(),
            vec![
                "No collections/requirements.yml file found. Skip galaxy install process.",
                "No roles/requirements.yml file found. Skip galaxy install process.",
            ]
        );
    }

    #[tokio::test]
    async fn test_changed_roles_are_installed_and_recorded() {
        let fx = Fixture::new(MockEngine::default());
        let roles = fx.write("roles/requirements.yml", "- src: geerlingguy.docker\n");

        let report = fx.runner.install_requirements().await.unwrap();

        assert_eq!(report.roles, InstallOutcome::Installed);
        assert_eq!(
            fx.engine.calls(),
            vec![vec![
                "role".to_string(),
                "install".to_string(),
                "-r".to_string(),
                roles.to_string_lossy().into_owned(),
                "--force".to_string(),
            ]]
        );
        assert_eq!(
            fs::read_to_string(hash_record_path(&roles)).unwrap(),
            file_digest(&roles).unwrap()
        );
    }

    #[tokio::test]
    async fn test_unchanged_roles_are_skipped() {
        let mut fx = Fixture::new(MockEngine::default());
        fx.write("roles/requirements.yml", "- src: geerlingguy.docker\n");

        fx.runner.install_requirements().await.unwrap();
        fx.logged();
        let report = fx.runner.install_requirements().await.unwrap();

        assert_eq!(report.roles, InstallOutcome::Unchanged);
        assert_eq!(fx.engine.calls().len(), 1);
        assert!(
            fx.logged()
                .contains(&"roles/requirements.yml has no changes. Skip galaxy install process.".to_string())
        );
    }

    #[tokio::test]
    async fn test_collections_live_next_to_playbook_and_run_first() {
        let fx = Fixture::new(MockEngine::default());
        let collections = fx.write("deploy/collections/requirements.yml", "collections: []\n");
        fx.write("roles/requirements.yml", "[]\n");

        fx.runner.install_requirements().await.unwrap();

        let calls = fx.engine.calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0][0], "collection");
        assert_eq!(calls[0][3], collections.to_string_lossy());
        assert_eq!(calls[1][0], "role");
    }

    #[tokio::test]
    async fn test_collection_failure_stops_before_roles() {
        let mut fx = Fixture::new(MockEngine::failing_on("collection"));
        let collections = fx.write("deploy/collections/requirements.yml", "collections: []\n");
        fx.write("roles/requirements.yml", "[]\n");

        let err = fx.runner.install_requirements().await.unwrap_err();

        assert!(matches!(err, RunnerError::Provisioning(_)));
        assert_eq!(fx.engine.calls().len(), 1);
        assert!(!hash_record_path(&collections).exists());
        assert_eq!(
            fx.logged().last().map(String::as_str),
            Some("Failed to install collections/requirements.yml")
        );
    }

    #[tokio::test]
    async fn test_unwritable_digest_record_aborts_install() {
        let mut fx = Fixture::new(MockEngine::default());
        let roles = fx.write("roles/requirements.yml", "- src: geerlingguy.docker\n");
        let mut tmp = hash_record_path(&roles).into_os_string();
        tmp.push(".tmp");
        fs::create_dir_all(&tmp).unwrap();

        let err = fx.runner.install_requirements().await.unwrap_err();

        assert!(matches!(err, RunnerError::Io(_)));
        assert_eq!(fx.engine.calls().len(), 1);
        assert!(!hash_record_path(&roles).exists());
        assert_eq!(
            fx.logged().last().map(String::as_str),
            Some("Failed to record digest of roles/requirements.yml")
        );
    }

    #[tokio::test]
    async fn test_failed_install_is_retried_next_run() {
        let fx = Fixture::new(MockEngine::failing_on("role"));
        fx.write("roles/requirements.yml", "[]\n");

        assert!(fx.runner.install_requirements().await.is_err());
        assert!(fx.runner.install_requirements().await.is_err());

        assert_eq!(fx.engine.calls().len(), 2);
    }

    #[tokio::test]
    async fn test_repository_failure_is_announced() {
        let (tx, mut rx) = mpsc::channel(8);
        let logger = TaskLogger::new(JobRef::new(5, 1), Arc::new(ViewerRegistry::new()), Arc::new(NullSink), tx);
        let engine = Arc::new(MockEngine::default());
        let runner = JobRunner::new(
            Template::new(11, "site.yml"),
            Arc::new(BrokenRepository),
            engine.clone(),
            logger,
        );

        let err = runner.install_requirements().await.unwrap_err();

        assert!(matches!(err, RunnerError::Repository(_)));
        assert!(engine.calls().is_empty());
        assert_eq!(
            rx.try_recv().unwrap().output,
            "Failed to resolve repository for template 11"
        );
        assert!(runner.playbook_dir().is_err());
    }

    #[tokio::test]
    async fn test_run_passes_handle_and_error_through() {
        let fx = Fixture::new(MockEngine::default());
        let seen = Arc::new(StdMutex::new(None));

        let seen_in_cb = seen.clone();
        let err = fx
            .runner
            .run(
                &["-i".to_string(), "hosts".to_string()],
                &[],
                &BTreeMap::new(),
                Box::new(move |handle: ProcessHandle| {
                    *seen_in_cb.lock().unwrap() = handle.pid();
                }),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, RunnerError::Process(ref m) if m == "exit status 2"));
        assert_eq!(*seen.lock().unwrap(), Some(4242));
        assert_eq!(fx.engine.runs.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_playbook_dir_joins_repo_root() {
        let fx = Fixture::new(MockEngine::default());
        assert_eq!(fx.runner.playbook_dir().unwrap(), fx.repo.path().join("deploy"));
        assert_eq!(fx.runner.playbook_dir().unwrap(), fx.runner.playbook_dir().unwrap());
    }
}
