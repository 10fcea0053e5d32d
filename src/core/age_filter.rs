use crate::domain::model::Destination;
use chrono::{DateTime, Utc};

const SECONDS_PER_DAY: i64 = 86_400;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgedDestination {
    pub destination: Destination,
    pub age_days: i64,
}

#[derive(Debug, Clone, Default)]
pub struct AgePartition {
    pub threshold_days: i64,
    pub old: Vec<AgedDestination>,
    pub recent: Vec<AgedDestination>,
}

/// Whole days elapsed, floored (a destination created in the future has a negative age).
pub fn age_in_days(created_at: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    (now - created_at).num_seconds().div_euclid(SECONDS_PER_DAY)
}

pub fn partition(
    destinations: &[Destination],
    threshold_days: i64,
    now: DateTime<Utc>,
) -> AgePartition {
    let (old, recent): (Vec<_>, Vec<_>) = destinations
        .iter()
        .map(|destination| AgedDestination {
            age_days: age_in_days(destination.created_at, now),
            destination: destination.clone(),
        })
        .partition(|aged| aged.age_days >= threshold_days);

    tracing::info!(
        "⏳ Age filter (≥ {} days): {} old, {} recent",
        threshold_days,
        old.len(),
        recent.len()
    );

    AgePartition {
        threshold_days,
        old,
        recent,
    }
}
