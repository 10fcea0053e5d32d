//! The KEEP / FLAG / DELETE decision table.
//!
//! | age ≥ threshold | cross-check | telemetry            | decision |
//! |-----------------|-------------|----------------------|----------|
//! | no              | any         | any                  | KEEP     |
//! | yes             | disabled    | n/a                  | DELETE   |
//! | yes             | enabled     | no data / unmatched  | DELETE   |
//! | yes             | enabled     | matched              | FLAG     |
//! | yes             | enabled     | failed or missing    | FLAG     |
//!
//! With `on_no_data = "flag"`, destinations the telemetry source has never
//! heard of go to review instead of deletion.

use crate::core::age_filter::{AgePartition, AgedDestination};
use crate::domain::model::{Candidate, Decision, DestinationKey, TelemetryOutcome};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NoDataAction {
    Delete,
    Flag,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SelectionPolicy {
    pub threshold_days: i64,
    pub crosscheck_enabled: bool,
    pub on_no_data: NoDataAction,
}

fn decide_old(
    aged: &AgedDestination,
    telemetry: Option<&TelemetryOutcome>,
    policy: &SelectionPolicy,
) -> (Decision, String) {
    let age = format!("{} days old (threshold {})", aged.age_days, policy.threshold_days);

    if !policy.crosscheck_enabled {
        return (Decision::Delete, format!("{}; cross-check disabled", age));
    }

    match telemetry {
        None => (
            Decision::Flag,
            format!("{}; no cross-check result recorded, needs review", age),
        ),
        Some(TelemetryOutcome::Failed(failure)) => (
            Decision::Flag,
            format!("{}; cross-check failed ({}), needs review", age, failure),
        ),
        Some(TelemetryOutcome::Observed(signal)) if signal.matched => (
            Decision::Flag,
            format!(
                "{}; recent activity in telemetry ({})",
                age,
                TelemetryOutcome::Observed(signal.clone()).summary()
            ),
        ),
        Some(TelemetryOutcome::Observed(_)) => (
            Decision::Delete,
            format!("{}; no recent activity in telemetry", age),
        ),
        Some(TelemetryOutcome::NoData) => match policy.on_no_data {
            NoDataAction::Delete => (
                Decision::Delete,
                format!("{}; telemetry has no data for destination", age),
            ),
            NoDataAction::Flag => (
                Decision::Flag,
                format!("{}; telemetry has no data for destination, needs review", age),
            ),
        },
    }
}

/// Pure: identical inputs always give an identical, identically ordered result.
pub fn select(
    partition: &AgePartition,
    telemetry: &BTreeMap<DestinationKey, TelemetryOutcome>,
    policy: &SelectionPolicy,
) -> Vec<Candidate> {
    let mut candidates: Vec<Candidate> = partition
        .recent
        .iter()
        .map(|aged| Candidate {
            destination: aged.destination.clone(),
            age_days: aged.age_days,
            telemetry: None,
            decision: Decision::Keep,
            reason: format!(
                "{} days old, below threshold of {}",
                aged.age_days, policy.threshold_days
            ),
        })
        .collect();

    candidates.extend(partition.old.iter().map(|aged| {
        let outcome = telemetry.get(&aged.destination.key());
        let (decision, reason) = decide_old(aged, outcome, policy);
        Candidate {
            destination: aged.destination.clone(),
            age_days: aged.age_days,
            telemetry: outcome.cloned(),
            decision,
            reason,
        }
    }));

    candidates.sort_by(|a, b| {
        a.destination
            .list_id
            .cmp(&b.destination.list_id)
            .then(a.destination.created_at.cmp(&b.destination.created_at))
            .then_with(|| compare_ids(&a.destination.id, &b.destination.id))
    });

    candidates
}

/// Numeric ids compare as numbers so `9` sorts before `10`; they precede
/// non-numeric ids, which compare as text.
fn compare_ids(a: &str, b: &str) -> Ordering {
    match (a.parse::<u64>(), b.parse::<u64>()) {
        (Ok(x), Ok(y)) => x.cmp(&y).then_with(|| a.cmp(b)),
        (Ok(_), Err(_)) => Ordering::Less,
        (Err(_), Ok(_)) => Ordering::Greater,
        (Err(_), Err(_)) => a.cmp(b),
    }
}

pub fn count_decisions(candidates: &[Candidate]) -> (usize, usize, usize) {
    candidates
        .iter()
        .fold((0, 0, 0), |(keep, flag, delete), c| match c.decision {
            Decision::Keep => (keep + 1, flag, delete),
            Decision::Flag => (keep, flag + 1, delete),
            Decision::Delete => (keep, flag, delete + 1),
        })
}
