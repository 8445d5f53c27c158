//! CLI module for playrun - command-line interface and subcommands.

pub mod commands;

pub use commands::Cli;
