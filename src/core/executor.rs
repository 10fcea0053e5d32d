//! Batched deletion of DELETE candidates.
//!
//! Dry-run and live runs share one loop; the only difference is whether the
//! delete endpoint is actually called for a batch. A failed batch is never
//! retried and never assumed partially successful.

use crate::config::VENDOR_MAX_BATCH;
use crate::domain::model::{BatchJob, Candidate, Decision, DeletionOutcome, DeletionRecord};
use crate::domain::ports::ListApi;
use crate::utils::error::{CleanupError, Result};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// The two independent human confirmations required before live deletion.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConfirmationGates {
    pub proceed_past_review: bool,
    pub proceed_to_live: bool,
}

impl ConfirmationGates {
    pub fn confirmed() -> Self {
        Self {
            proceed_past_review: true,
            proceed_to_live: true,
        }
    }

    pub fn is_open(&self) -> bool {
        self.proceed_past_review && self.proceed_to_live
    }
}

impl BatchJob {
    /// Keeps only DELETE candidates, in the given order.
    pub fn new(candidates: &[Candidate], batch_size: usize, dry_run: bool) -> Self {
        Self {
            candidates: candidates
                .iter()
                .filter(|c| c.decision == Decision::Delete)
                .cloned()
                .collect(),
            batch_size: batch_size.clamp(1, VENDOR_MAX_BATCH),
            dry_run,
        }
    }

    /// Consecutive chunks of at most `batch_size`, never spanning two lists.
    pub fn batches(&self) -> Vec<&[Candidate]> {
        self.candidates
            .chunk_by(|a, b| a.destination.list_id == b.destination.list_id)
            .flat_map(|same_list| same_list.chunks(self.batch_size))
            .collect()
    }
}

pub struct DeletionExecutor<'a, L: ListApi> {
    api: &'a L,
    batch_delay: Duration,
}

impl<'a, L: ListApi> DeletionExecutor<'a, L> {
    pub fn new(api: &'a L, batch_delay: Duration) -> Self {
        Self { api, batch_delay }
    }

    pub async fn execute(
        &self,
        job: &BatchJob,
        gates: ConfirmationGates,
        cancel: &CancellationToken,
    ) -> Result<Vec<DeletionRecord>> {
        if !job.dry_run && !gates.is_open() {
            tracing::warn!("🛑 Live deletion requested without both confirmations");
            return Err(CleanupError::ConfirmationDenied);
        }

        let batches = job.batches();
        let total = batches.len();
        let mode = if job.dry_run { "DRY RUN" } else { "LIVE" };
        tracing::info!(
            "🗑️ {}: {} candidates in {} batch(es) of ≤ {}",
            mode,
            job.candidates.len(),
            total,
            job.batch_size
        );

        let mut records = Vec::with_capacity(job.candidates.len());
        for (index, batch) in batches.into_iter().enumerate() {
            let outcome = if index > 0 && !self.pause(cancel).await {
                DeletionOutcome::Cancelled
            } else if cancel.is_cancelled() {
                DeletionOutcome::Cancelled
            } else {
                self.submit(job.dry_run, batch).await
            };

            match &outcome {
                DeletionOutcome::Failed(reason) => tracing::error!(
                    "❌ Batch {}/{} ({} items) failed: {}",
                    index + 1,
                    total,
                    batch.len(),
                    reason
                ),
                DeletionOutcome::Cancelled => tracing::warn!(
                    "🛑 Batch {}/{} ({} items) not issued: run cancelled",
                    index + 1,
                    total,
                    batch.len()
                ),
                other => tracing::info!(
                    "✅ Batch {}/{} ({} items): {}",
                    index + 1,
                    total,
                    batch.len(),
                    other
                ),
            }

            records.extend(batch.iter().map(|candidate| DeletionRecord {
                candidate: candidate.clone(),
                batch_index: index,
                outcome: outcome.clone(),
            }));
        }

        Ok(records)
    }

    /// Rate-limit pause between batches. Returns false if cancelled meanwhile.
    async fn pause(&self, cancel: &CancellationToken) -> bool {
        tokio::select! {
            _ = cancel.cancelled() => false,
            _ = tokio::time::sleep(self.batch_delay) => true,
        }
    }

    async fn submit(&self, dry_run: bool, batch: &[Candidate]) -> DeletionOutcome {
        let Some(first) = batch.first() else {
            return DeletionOutcome::SkippedDryRun;
        };
        let list_id = &first.destination.list_id;
        let ids: Vec<String> = batch.iter().map(|c| c.destination.id.clone()).collect();
        tracing::debug!("🗑️ List {}: batch ids {:?}", list_id, ids);

        if dry_run {
            return DeletionOutcome::SkippedDryRun;
        }

        match self.api.delete_batch(list_id, &ids).await {
            Ok(()) => DeletionOutcome::Deleted,
            Err(err) => DeletionOutcome::Failed(err.to_string()),
        }
    }
}
