use crate::utils::error::QueryFailure;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A record straight off a list page, before normalization.
pub type RawRecord = serde_json::Value;

/// Identity of a destination across the whole run.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DestinationKey {
    pub list_id: String,
    pub id: String,
}

impl fmt::Display for DestinationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.list_id, self.id)
    }
}

/// One destination list as the vendor's list index describes it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DestinationListInfo {
    pub id: String,
    pub name: String,
    pub destination_count: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Destination {
    pub id: String,
    pub value: String,
    pub created_at: DateTime<Utc>,
    pub list_id: String,
}

impl Destination {
    pub fn key(&self) -> DestinationKey {
        DestinationKey {
            list_id: self.list_id.clone(),
            id: self.id.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RejectReason {
    NotAnObject,
    MissingId,
    MissingValue,
    MissingTimestamp,
    UnparseableTimestamp(String),
    DuplicateId,
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejectReason::NotAnObject => write!(f, "record is not a JSON object"),
            RejectReason::MissingId => write!(f, "no id field"),
            RejectReason::MissingValue => write!(f, "no destination/domain/url/value field"),
            RejectReason::MissingTimestamp => write!(f, "no creation timestamp field"),
            RejectReason::UnparseableTimestamp(raw) => {
                write!(f, "unparseable creation timestamp '{}'", raw)
            }
            RejectReason::DuplicateId => write!(f, "duplicate id within list"),
        }
    }
}

/// A raw record that failed normalization. Counted and reported, never deleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RejectedRecord {
    pub list_id: String,
    pub raw_id: Option<String>,
    pub raw_value: Option<String>,
    pub reason: RejectReason,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TelemetrySignal {
    pub matched: bool,
    pub last_seen: Option<DateTime<Utc>>,
    pub raw_hit_count: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TelemetryOutcome {
    Observed(TelemetrySignal),
    /// The telemetry source answered but knows nothing about the indicator.
    NoData,
    Failed(QueryFailure),
}

impl TelemetryOutcome {
    pub fn summary(&self) -> String {
        match self {
            TelemetryOutcome::Observed(signal) => match signal.last_seen {
                Some(ts) => format!(
                    "{} hit(s), last seen {}",
                    signal.raw_hit_count,
                    ts.format("%Y-%m-%d %H:%M:%S")
                ),
                None => format!("{} hit(s)", signal.raw_hit_count),
            },
            TelemetryOutcome::NoData => "no data".to_string(),
            TelemetryOutcome::Failed(failure) => format!("query failed: {}", failure),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Decision {
    Keep,
    Flag,
    Delete,
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Decision::Keep => "KEEP",
            Decision::Flag => "FLAG",
            Decision::Delete => "DELETE",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub destination: Destination,
    pub age_days: i64,
    pub telemetry: Option<TelemetryOutcome>,
    pub decision: Decision,
    pub reason: String,
}

/// Delete candidates for one execution, in the order they will be submitted.
#[derive(Debug, Clone)]
pub struct BatchJob {
    pub candidates: Vec<Candidate>,
    pub batch_size: usize,
    pub dry_run: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeletionOutcome {
    SkippedDryRun,
    Deleted,
    Failed(String),
    /// The batch was never issued because the run was aborted.
    Cancelled,
}

impl fmt::Display for DeletionOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeletionOutcome::SkippedDryRun => f.write_str("SKIPPED_DRYRUN"),
            DeletionOutcome::Deleted => f.write_str("DELETED"),
            DeletionOutcome::Failed(reason) => write!(f, "FAILED({})", reason),
            DeletionOutcome::Cancelled => f.write_str("CANCELLED"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeletionRecord {
    pub candidate: Candidate,
    pub batch_index: usize,
    pub outcome: DeletionOutcome,
}
