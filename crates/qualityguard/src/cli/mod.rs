//! Command-line interface for qualityguard.
//!
//! This module provides the CLI structure, command definitions and input
//! parsing for the `qguard` binary.

mod commands;
mod input;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

pub use commands::{
    AnalyzeCommand, ChartCommand, ConfigCommand, HistoricalCommand, QueueCommand, SaveCommand,
    StatusCommand,
};
pub use input::{parse_batch, parse_series};

/// qguard - Quality control from the shop floor, online or not
///
/// Inspect measurement batches, compute control charts, and keep working
/// when the measurement service is unreachable: reads fall back to the
/// local cache and writes are queued for replay.
#[derive(Debug, Parser)]
#[command(name = "qguard")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to custom configuration file
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Increase verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// The command to execute
    #[command(subcommand)]
    pub command: Command,
}

/// Available commands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Check the service and show sync status
    Status(StatusCommand),

    /// Compute a control chart for a series
    Chart(ChartCommand),

    /// Analyse a measurements file and show derived alerts
    Analyze(AnalyzeCommand),

    /// Fetch historical data, or read it from the cache
    Historical(HistoricalCommand),

    /// Persist a batch, queueing it when offline
    Save(SaveCommand),

    /// Inspect or replay the offline queue
    #[command(subcommand)]
    Queue(QueueCommand),

    /// Run a live session until interrupted
    Watch,

    /// View or validate configuration
    #[command(subcommand)]
    Config(ConfigCommand),
}

impl Cli {
    /// Get the verbosity level based on flags.
    #[must_use]
    pub fn verbosity(&self) -> crate::logging::Verbosity {
        if self.quiet {
            crate::logging::Verbosity::Quiet
        } else {
            match self.verbose {
                0 => crate::logging::Verbosity::Normal,
                1 => crate::logging::Verbosity::Verbose,
                _ => crate::logging::Verbosity::Trace,
            }
        }
    }
}
