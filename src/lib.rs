pub mod adapters;
pub mod config;
pub mod core;
pub mod domain;
pub mod utils;

pub use adapters::{FileReportSink, HttpListClient, HttpTelemetryClient, LocalStorage};
pub use config::CleanupConfig;
pub use core::workflow::{CleanupWorkflow, RunSummary};
pub use utils::error::{CleanupError, Result};
