//! Corroboration of old destinations against the telemetry source.
//!
//! Queries run concurrently up to a fixed bound, each under its own timeout.
//! A failed or timed-out query is recorded as [`TelemetryOutcome::Failed`]
//! and never reads as "no activity".

use crate::core::age_filter::AgedDestination;
use crate::domain::model::{DestinationKey, TelemetryOutcome};
use crate::domain::ports::TelemetryApi;
use crate::utils::error::QueryFailure;
use futures::stream::{self, StreamExt};
use std::collections::BTreeMap;
use std::time::Duration;

pub struct TelemetryCrossChecker<'a, T: TelemetryApi> {
    api: &'a T,
    lookback_days: u32,
    concurrency: usize,
    timeout: Duration,
}

impl<'a, T: TelemetryApi> TelemetryCrossChecker<'a, T> {
    pub fn new(api: &'a T, lookback_days: u32, concurrency: usize, timeout: Duration) -> Self {
        Self {
            api,
            lookback_days,
            concurrency: concurrency.max(1),
            timeout,
        }
    }

    pub async fn query(&self, indicator: &str) -> TelemetryOutcome {
        match tokio::time::timeout(self.timeout, self.api.query(indicator, self.lookback_days))
            .await
        {
            Ok(outcome) => outcome,
            Err(_) => TelemetryOutcome::Failed(QueryFailure::Timeout),
        }
    }

    /// Results are keyed by destination, so completion order never leaks out.
    pub async fn check(&self, old: &[AgedDestination]) -> BTreeMap<DestinationKey, TelemetryOutcome> {
        let total = old.len();
        tracing::info!(
            "🔎 Cross-checking {} destinations (lookback {} days, concurrency {})",
            total,
            self.lookback_days,
            self.concurrency
        );

        let results: Vec<(DestinationKey, TelemetryOutcome)> =
            stream::iter(old.iter().map(|aged| async move {
                let outcome = self.query(&aged.destination.value).await;
                tracing::debug!(
                    "🔎 {} ({}): {}",
                    aged.destination.value,
                    aged.destination.key(),
                    outcome.summary()
                );
                (aged.destination.key(), outcome)
            }))
            .buffer_unordered(self.concurrency)
            .collect()
            .await;

        let outcomes: BTreeMap<_, _> = results.into_iter().collect();

        let failed = outcomes
            .values()
            .filter(|o| matches!(o, TelemetryOutcome::Failed(_)))
            .count();
        let matched = outcomes
            .values()
            .filter(|o| matches!(o, TelemetryOutcome::Observed(s) if s.matched))
            .count();
        if failed > 0 {
            tracing::warn!("⚠️ {} of {} telemetry queries failed", failed, total);
        }
        tracing::info!(
            "🔎 Cross-check done: {} with recent activity, {} failed, {} quiet",
            matched,
            failed,
            total - matched - failed
        );

        outcomes
    }
}
