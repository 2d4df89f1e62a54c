//! `qualityguard` - An offline-resilient quality-control client
//!
//! This library provides the core of a shop-floor inspection client: a sync
//! layer that falls back to a local cache and queues writes while the
//! measurement service is unreachable, statistical process control charts,
//! and an alert feed fed by analysis results and live push messages.

#![warn(missing_docs)]
#![warn(missing_debug_implementations)]
#![deny(unsafe_code)]

pub mod alerts;
pub mod analysis;
pub mod cli;
pub mod config;
pub mod dashboard;
pub mod error;
pub mod logging;
pub mod measurement;
pub mod scheduler;
pub mod spc;
pub mod storage;
pub mod sync;

pub use alerts::{Alert, AlertFeed, AlertId, Severity, SeverityFilter};
pub use analysis::{local_analysis, AnalysisResult};
pub use config::Config;
pub use dashboard::Dashboard;
pub use error::{Error, Result};
pub use logging::init_logging;
pub use measurement::{BatchMetadata, Measurement, MeasurementBatch, SaveAck, Status};
pub use scheduler::{RefreshScheduler, SchedulerHandle};
pub use spc::{process_capability, ControlChart, ControlLimits};
pub use storage::{Storage, StorageStats};
pub use sync::{SyncClient, SyncState};
