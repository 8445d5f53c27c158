//! CLI command definitions using clap.
//!
//! - install: provision collection and role requirements
//! - run: provision requirements, then run the playbook

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// playrun - run automation playbooks with live, persisted output
#[derive(Parser, Debug)]
#[command(name = "playrun")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Optional config file path
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Check if verbose mode is enabled
    pub fn is_verbose(&self) -> bool {
        self.verbose
    }
}

/// Main subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Install collection and role requirements only
    Install {
        #[command(flatten)]
        job: JobArgs,
    },

    /// Install requirements, then run the playbook
    Run {
        #[command(flatten)]
        job: JobArgs,

        /// Extra environment variables (KEY=VALUE)
        #[arg(short, long = "env", value_parser = parse_key_value)]
        env: Vec<(String, String)>,

        /// Answers for interactive prompts (NAME=VALUE)
        #[arg(short, long = "input", value_parser = parse_key_value)]
        inputs: Vec<(String, String)>,

        /// Arguments passed through to the playbook binary
        #[arg(last = true)]
        args: Vec<String>,
    },
}

/// Identity of the job and where its checkout lives
#[derive(Args, Debug, Clone)]
pub struct JobArgs {
    /// Repository checkout directory
    #[arg(short, long)]
    pub repo: PathBuf,

    /// Playbook path relative to the repository root
    #[arg(short, long)]
    pub playbook: PathBuf,

    /// Job identifier used for persisted output
    #[arg(long, default_value_t = 1)]
    pub job_id: u64,

    /// Project identifier
    #[arg(long, default_value_t = 1)]
    pub project_id: u64,

    /// Template identifier
    #[arg(long, default_value_t = 1)]
    pub template_id: u64,
}

fn parse_key_value(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(format!("expected KEY=VALUE, got '{}'", raw)),
    }
}
