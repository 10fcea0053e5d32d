pub mod age_filter;
pub mod audit;
pub mod catalog;
pub mod crosscheck;
pub mod executor;
pub mod pager;
pub mod selector;
pub mod workflow;

pub use crate::domain::model::{Candidate, Decision, Destination, TelemetryOutcome};
pub use crate::domain::ports::{Confirmation, ListApi, ReportSink, Storage, TelemetryApi};
pub use crate::utils::error::Result;
