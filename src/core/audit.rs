//! Projection of a run into its audit trail. No I/O; sinks render the result.

use crate::core::catalog::DestinationCatalog;
use crate::domain::model::{Candidate, Decision, DeletionOutcome, DeletionRecord, DestinationKey};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RunMode {
    DryRun,
    Live,
}

#[derive(Debug, Clone, Copy)]
pub struct AuditMeta {
    pub generated_at: DateTime<Utc>,
    pub mode: RunMode,
    pub confirmation_denied: bool,
    pub cancelled: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AuditSummary {
    pub total_fetched: usize,
    pub rejected_malformed: usize,
    pub kept: usize,
    pub flagged: usize,
    pub delete_candidates: usize,
    pub deleted: usize,
    pub skipped_dry_run: usize,
    pub failed: usize,
    pub cancelled: usize,
}

/// Per-list tally, with the vendor's list name when the index provided one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ListAudit {
    pub list_id: String,
    pub name: Option<String>,
    pub fetched: usize,
    pub rejected: usize,
}

/// One row per fetched record, whatever became of it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuditEntry {
    pub list_id: String,
    pub id: Option<String>,
    pub value: Option<String>,
    pub created_at: Option<String>,
    pub age_days: Option<i64>,
    pub decision: String,
    pub telemetry: String,
    pub outcome: String,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct AuditReport {
    pub generated_at: DateTime<Utc>,
    pub mode: RunMode,
    pub confirmation_denied: bool,
    pub cancelled: bool,
    pub summary: AuditSummary,
    pub lists: Vec<ListAudit>,
    pub entries: Vec<AuditEntry>,
}

impl AuditReport {
    pub fn has_failures(&self) -> bool {
        self.summary.failed > 0
    }
}

pub fn write(
    catalogs: &[DestinationCatalog],
    candidates: &[Candidate],
    records: &[DeletionRecord],
    meta: AuditMeta,
) -> AuditReport {
    let outcomes: HashMap<DestinationKey, &DeletionOutcome> = records
        .iter()
        .map(|r| (r.candidate.destination.key(), &r.outcome))
        .collect();

    let mut summary = AuditSummary {
        total_fetched: catalogs.iter().map(DestinationCatalog::total_fetched).sum(),
        rejected_malformed: catalogs.iter().map(|c| c.rejected.len()).sum(),
        ..Default::default()
    };

    let mut entries = Vec::with_capacity(summary.total_fetched);

    for candidate in candidates {
        let outcome = match candidate.decision {
            Decision::Keep => {
                summary.kept += 1;
                String::new()
            }
            Decision::Flag => {
                summary.flagged += 1;
                String::new()
            }
            Decision::Delete => {
                summary.delete_candidates += 1;
                match outcomes.get(&candidate.destination.key()) {
                    Some(outcome) => {
                        match outcome {
                            DeletionOutcome::Deleted => summary.deleted += 1,
                            DeletionOutcome::SkippedDryRun => summary.skipped_dry_run += 1,
                            DeletionOutcome::Failed(_) => summary.failed += 1,
                            DeletionOutcome::Cancelled => summary.cancelled += 1,
                        }
                        outcome.to_string()
                    }
                    None => "NOT_EXECUTED".to_string(),
                }
            }
        };

        entries.push(AuditEntry {
            list_id: candidate.destination.list_id.clone(),
            id: Some(candidate.destination.id.clone()),
            value: Some(candidate.destination.value.clone()),
            created_at: Some(candidate.destination.created_at.format(TIMESTAMP_FORMAT).to_string()),
            age_days: Some(candidate.age_days),
            decision: candidate.decision.to_string(),
            telemetry: candidate
                .telemetry
                .as_ref()
                .map(|t| t.summary())
                .unwrap_or_default(),
            outcome,
            reason: candidate.reason.clone(),
        });
    }

    for rejected in catalogs.iter().flat_map(|c| c.rejected.iter()) {
        entries.push(AuditEntry {
            list_id: rejected.list_id.clone(),
            id: rejected.raw_id.clone(),
            value: rejected.raw_value.clone(),
            created_at: None,
            age_days: None,
            decision: "REJECTED".to_string(),
            telemetry: String::new(),
            outcome: String::new(),
            reason: rejected.reason.to_string(),
        });
    }

    AuditReport {
        generated_at: meta.generated_at,
        mode: meta.mode,
        confirmation_denied: meta.confirmation_denied,
        cancelled: meta.cancelled,
        summary,
        lists: catalogs
            .iter()
            .map(|c| ListAudit {
                list_id: c.list_id.clone(),
                name: c.name.clone(),
                fetched: c.total_fetched(),
                rejected: c.rejected.len(),
            })
            .collect(),
        entries,
    }
}
