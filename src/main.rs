use clap::Parser;
use colored::*;
use eyre::{Context, Result};
use log::info;
use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

mod cli;

use cli::Cli;
use cli::commands::{Commands, JobArgs};
use playrun::config::RunnerConfig;
use playrun::domain::{JobRef, Template};
use playrun::engine::LocalEngine;
use playrun::logger::{BroadcastSink, TaskLogger, ViewerId, ViewerRegistry};
use playrun::runner::{FixedRepository, JobRunner, ProcessHandle};
use playrun::storage::{JsonlLogStore, PersistencePool};

fn setup_logging(level: Option<&str>) -> Result<()> {
    let log_dir = dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("playrun")
        .join("logs");

    fs::create_dir_all(&log_dir).context("Failed to create log directory")?;

    let log_file = log_dir.join("playrun.log");

    let target = Box::new(
        fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_file)
            .context("Failed to open log file")?,
    );

    let mut builder = env_logger::Builder::from_default_env();
    if let Some(level) = level {
        builder.parse_filters(level);
    }
    builder.target(env_logger::Target::Pipe(target)).init();

    info!("Logging initialized, writing to: {}", log_file.display());
    Ok(())
}

/// Prints job output for the local terminal viewer.
struct ConsoleSink {
    verbose: bool,
}

impl BroadcastSink for ConsoleSink {
    fn deliver(&self, viewer: &ViewerId, payload: &str) {
        let output = serde_json::from_str::<serde_json::Value>(payload)
            .ok()
            .and_then(|msg| msg.get("output").and_then(|o| o.as_str()).map(str::to_string));

        match output {
            Some(line) if self.verbose => println!("{} {}", format!("[{}]", viewer).dimmed(), line),
            Some(line) => println!("{}", line),
            None => log::warn!("Dropping malformed message for viewer {}", viewer),
        }
    }
}

async fn run_application(cli: &Cli, config: &RunnerConfig) -> Result<()> {
    info!("Starting application");

    if cli.is_verbose() {
        println!("{}", "Verbose mode enabled".yellow());
    }

    match &cli.command {
        Commands::Install { job } => run_job(cli, config, job, None).await,
        Commands::Run {
            job,
            env,
            inputs,
            args,
        } => {
            let request = RunRequest {
                env: env.clone(),
                inputs: inputs.iter().cloned().collect(),
                args: args.clone(),
            };
            run_job(cli, config, job, Some(request)).await
        }
    }
}

struct RunRequest {
    env: Vec<(String, String)>,
    inputs: BTreeMap<String, String>,
    args: Vec<String>,
}

async fn run_job(cli: &Cli, config: &RunnerConfig, job: &JobArgs, request: Option<RunRequest>) -> Result<()> {
    let store = JsonlLogStore::new(&config.persistence.log_dir).context("Failed to open job log store")?;
    let (pool, persist_tx) = PersistencePool::spawn(&config.persistence.pool_config(), Arc::new(store));

    let viewers = Arc::new(ViewerRegistry::new());
    viewers.register(ViewerId::new("console"));
    let sink: Arc<dyn BroadcastSink> = Arc::new(ConsoleSink {
        verbose: cli.is_verbose(),
    });

    let logger = TaskLogger::new(JobRef::new(job.job_id, job.project_id), viewers, sink, persist_tx);
    let template = Template::new(job.template_id, &job.playbook);
    let engine = LocalEngine::new(config.engine.clone(), &job.repo, logger.clone());
    let runner = JobRunner::new(
        template,
        Arc::new(FixedRepository::new(&job.repo)),
        Arc::new(engine),
        logger,
    );

    let outcome = execute(&runner, request).await;

    // Every sender must be gone before the pool can drain.
    drop(runner);
    let stored = pool.shutdown().await;
    info!("Job {} finished, {} log records stored", job.job_id, stored);

    match outcome {
        Ok(()) => {
            println!("{}", "Job finished".green());
            Ok(())
        }
        Err(e) if e.is_fatal() => {
            eprintln!("{} {}", "Job aborted:".red().bold(), e);
            Err(e.into())
        }
        Err(e) => {
            eprintln!("{} {}", "Job failed:".red(), e);
            Err(e.into())
        }
    }
}

async fn execute(runner: &JobRunner<FixedRepository, LocalEngine>, request: Option<RunRequest>) -> playrun::Result<()> {
    let report = runner.install_requirements().await?;
    info!("Requirements: collections {:?}, roles {:?}", report.collections, report.roles);

    let Some(request) = request else {
        return Ok(());
    };

    let mut args = vec![runner.template().playbook.to_string_lossy().into_owned()];
    args.extend(request.args);

    let on_started = Box::new(|handle: ProcessHandle| {
        info!("Playbook started with pid {:?}", handle.pid());
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                log::warn!("Interrupt received, stopping playbook");
                handle.kill();
            }
        });
    });

    runner.run(&args, &request.env, &request.inputs, on_started).await
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = RunnerConfig::load(cli.config.as_ref()).context("Failed to load configuration")?;

    setup_logging(config.log_level.as_deref()).context("Failed to setup logging")?;

    info!("Starting with config from: {:?}", cli.config);

    run_application(&cli, &config).await.context("Application failed")?;

    Ok(())
}
