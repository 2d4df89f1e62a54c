//! CLI command definitions.
//!
//! This module defines the structure of all CLI subcommands.

use std::path::PathBuf;

use clap::{Args, Subcommand};

/// Status command arguments.
#[derive(Debug, Args)]
pub struct StatusCommand {
    /// Output as JSON
    #[arg(short, long)]
    pub json: bool,
}

/// Control chart command arguments.
#[derive(Debug, Args)]
pub struct ChartCommand {
    /// File with the series: a JSON array or one number per line
    pub file: PathBuf,

    /// Lower specification limit, for Cpk
    #[arg(long, requires = "upper", allow_negative_numbers = true)]
    pub lower: Option<f64>,

    /// Upper specification limit, for Cpk
    #[arg(long, requires = "lower", allow_negative_numbers = true)]
    pub upper: Option<f64>,

    /// Output as JSON
    #[arg(short, long)]
    pub json: bool,
}

/// Analysis command arguments.
#[derive(Debug, Args)]
pub struct AnalyzeCommand {
    /// Measurements file (a batch or a bare JSON array)
    pub file: PathBuf,

    /// Use the local rules without contacting the service
    #[arg(long)]
    pub offline: bool,

    /// Output as JSON
    #[arg(short, long)]
    pub json: bool,
}

/// Historical data command arguments.
#[derive(Debug, Args)]
pub struct HistoricalCommand {
    /// Date range (e.g. "7d"); defaults to the configured range
    #[arg(short, long)]
    pub range: Option<String>,

    /// Product type; defaults to the configured product
    #[arg(short, long)]
    pub product: Option<String>,

    /// Output as JSON
    #[arg(short, long)]
    pub json: bool,
}

/// Save command arguments.
#[derive(Debug, Args)]
pub struct SaveCommand {
    /// Batch file to persist
    pub file: PathBuf,
}

/// Offline queue commands.
#[derive(Debug, Subcommand)]
pub enum QueueCommand {
    /// List queued writes
    List {
        /// Output as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// Replay queued writes now
    Drain,
}

/// Configuration commands.
#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Show current configuration
    Show {
        /// Output as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// Show the configuration file path
    Path,

    /// Validate configuration
    Validate {
        /// Path to configuration file to validate
        #[arg(short, long)]
        file: Option<PathBuf>,
    },
}
