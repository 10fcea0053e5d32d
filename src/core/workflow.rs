use crate::config::CleanupConfig;
use crate::core::age_filter;
use crate::core::audit::{self, AuditMeta, AuditReport, RunMode};
use crate::core::catalog::DestinationCatalog;
use crate::core::crosscheck::TelemetryCrossChecker;
use crate::core::executor::{ConfirmationGates, DeletionExecutor};
use crate::core::pager::{PageFetcher, RetryPolicy};
use crate::core::selector::{self, count_decisions};
use crate::domain::model::{BatchJob, DeletionOutcome, DeletionRecord, Destination};
use crate::domain::ports::{Confirmation, ListApi, ReportSink, TelemetryApi};
use crate::utils::error::{CleanupError, Result};
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

#[derive(Debug)]
pub struct RunSummary {
    pub report: AuditReport,
    pub report_location: String,
}

impl RunSummary {
    pub fn any_batch_failed(&self) -> bool {
        self.report.has_failures()
    }

    pub fn was_cancelled(&self) -> bool {
        self.report.cancelled
    }
}

const FINAL_QUESTION: &str = "Are you absolutely sure you want to delete these destinations?";

fn never_issued(records: Vec<DeletionRecord>) -> Vec<DeletionRecord> {
    records
        .into_iter()
        .map(|r| DeletionRecord {
            outcome: DeletionOutcome::Cancelled,
            ..r
        })
        .collect()
}

/// Drives one cleanup run: fetch, normalize, age filter, cross-check, select,
/// review, confirm, delete, audit.
pub struct CleanupWorkflow<L: ListApi, T: TelemetryApi> {
    config: Arc<CleanupConfig>,
    list_api: L,
    telemetry_api: Option<T>,
    cancel: CancellationToken,
}

impl<L: ListApi, T: TelemetryApi> CleanupWorkflow<L, T> {
    pub fn new(config: Arc<CleanupConfig>, list_api: L, telemetry_api: Option<T>) -> Self {
        Self {
            config,
            list_api,
            telemetry_api,
            cancel: CancellationToken::new(),
        }
    }

    /// Token that stops the run (e.g. wired to Ctrl-C). Fetch and cross-check
    /// abort, the confirmation gates are skipped and unissued batches are
    /// recorded as cancelled.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Resolves `work` unless the run is cancelled first.
    async fn until_cancelled<F: Future>(&self, stage: &str, work: F) -> Result<F::Output> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => {
                tracing::warn!("🛑 Run cancelled during {}", stage);
                Err(CleanupError::Cancelled {
                    stage: stage.to_string(),
                })
            }
            output = work => Ok(output),
        }
    }

    /// Names from the vendor's list index. Missing names only cost readability.
    async fn list_names(&self) -> HashMap<String, String> {
        match self.list_api.list_lists().await {
            Ok(lists) => lists.into_iter().map(|l| (l.id, l.name)).collect(),
            Err(e) => {
                tracing::warn!("⚠️ Could not read the list index ({}); reporting list ids only", e);
                HashMap::new()
            }
        }
    }

    async fn fetch_catalogs(&self) -> Result<Vec<DestinationCatalog>> {
        let mut names = self.list_names().await;
        let fetcher = PageFetcher::new(
            &self.list_api,
            self.config.page_size(),
            RetryPolicy::new(self.config.retry_base_delay()),
        );

        let mut catalogs = Vec::with_capacity(self.config.list_ids().len());
        for list_id in self.config.list_ids() {
            let records = fetcher.fetch_all(list_id).await?;
            let catalog = DestinationCatalog::build(list_id, &records).with_name(names.remove(list_id));
            tracing::info!("📥 List {}: {} record(s)", catalog.label(), catalog.total_fetched());
            catalogs.push(catalog);
        }
        Ok(catalogs)
    }

    fn confirmation_question(&self, catalogs: &[DestinationCatalog], delete_count: usize) -> String {
        let lists = catalogs
            .iter()
            .map(DestinationCatalog::label)
            .collect::<Vec<_>>()
            .join(", ");
        if self.config.crosscheck_enabled() {
            format!(
                "Delete {} destinations created at least {} days ago and not seen in telemetry \
                 for the last {} days from list(s) {}?",
                delete_count,
                self.config.threshold_days(),
                self.config.lookback_days(),
                lists
            )
        } else {
            format!(
                "Delete {} destinations created at least {} days ago from list(s) {}?",
                delete_count,
                self.config.threshold_days(),
                lists
            )
        }
    }

    /// `None` when the run is cancelled before the answer arrives.
    async fn ask<C: Confirmation>(&self, confirm: &C, question: &str) -> Option<bool> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => None,
            answer = confirm.confirm(question) => Some(answer),
        }
    }

    /// Both gates, or `None` if cancellation arrives before or between them.
    async fn ask_gates<C: Confirmation>(&self, confirm: &C, question: &str) -> Option<ConfirmationGates> {
        if self.cancel.is_cancelled() {
            return None;
        }
        let proceed_past_review = self.ask(confirm, question).await?;
        if self.cancel.is_cancelled() {
            return None;
        }
        let proceed_to_live = proceed_past_review && self.ask(confirm, FINAL_QUESTION).await?;
        if self.cancel.is_cancelled() {
            return None;
        }
        Some(ConfirmationGates {
            proceed_past_review,
            proceed_to_live,
        })
    }

    pub async fn run<C: Confirmation, S: ReportSink>(
        &self,
        now: DateTime<Utc>,
        confirm: &C,
        sink: &S,
    ) -> Result<RunSummary> {
        tracing::info!(
            "🚀 Starting cleanup of {} list(s), threshold {} days",
            self.config.list_ids().len(),
            self.config.threshold_days()
        );

        // Fetch + normalize. Any FetchError aborts before a single decision is made.
        let catalogs = self
            .until_cancelled("list fetch", self.fetch_catalogs())
            .await??;
        let destinations: Vec<Destination> = catalogs
            .iter()
            .flat_map(|c| c.destinations.iter().cloned())
            .collect();

        let policy = self.config.selection_policy();
        let partition = age_filter::partition(&destinations, policy.threshold_days, now);

        let telemetry = match (&self.telemetry_api, policy.crosscheck_enabled) {
            (Some(api), true) => {
                let checker = TelemetryCrossChecker::new(
                    api,
                    self.config.lookback_days(),
                    self.config.crosscheck_concurrency(),
                    self.config.crosscheck_timeout(),
                );
                self.until_cancelled("telemetry cross-check", checker.check(&partition.old))
                    .await?
            }
            (None, true) => {
                tracing::warn!("⚠️ Cross-check enabled but no telemetry client; old entries go to review");
                BTreeMap::new()
            }
            (_, false) => BTreeMap::new(),
        };

        let candidates = selector::select(&partition, &telemetry, &policy);
        let (kept, flagged, to_delete) = count_decisions(&candidates);
        tracing::info!(
            "📋 Selection: {} keep, {} flag, {} delete",
            kept,
            flagged,
            to_delete
        );

        let executor = DeletionExecutor::new(&self.list_api, self.config.batch_delay());
        let review_job = BatchJob::new(&candidates, self.config.batch_size(), true);
        let review = executor
            .execute(&review_job, ConfirmationGates::default(), &self.cancel)
            .await?;

        let mode = if self.config.dry_run() {
            RunMode::DryRun
        } else {
            RunMode::Live
        };

        let (records, confirmation_denied) = if mode == RunMode::Live && to_delete > 0 {
            let question = self.confirmation_question(&catalogs, to_delete);
            match self.ask_gates(confirm, &question).await {
                None => {
                    tracing::warn!("🛑 Run cancelled before deletion; no batch was issued");
                    (never_issued(review), false)
                }
                Some(gates) => {
                    let live_job = BatchJob::new(&candidates, self.config.batch_size(), false);
                    match executor.execute(&live_job, gates, &self.cancel).await {
                        Ok(records) => (records, false),
                        Err(CleanupError::ConfirmationDenied) => {
                            tracing::warn!("🛑 Deletion not confirmed; keeping dry-run results");
                            (review, true)
                        }
                        Err(e) => return Err(e),
                    }
                }
            }
        } else {
            (review, false)
        };

        let report = audit::write(
            &catalogs,
            &candidates,
            &records,
            AuditMeta {
                generated_at: now,
                mode,
                confirmation_denied,
                cancelled: self.cancel.is_cancelled(),
            },
        );

        let report_location = sink.emit(&report).await?;
        let s = &report.summary;
        tracing::info!(
            "📊 Fetched {}, rejected {}, kept {}, flagged {}, deleted {}, dry-run {}, failed {}, cancelled {}",
            s.total_fetched,
            s.rejected_malformed,
            s.kept,
            s.flagged,
            s.deleted,
            s.skipped_dry_run,
            s.failed,
            s.cancelled
        );
        tracing::info!("📁 Audit report saved to: {}", report_location);

        Ok(RunSummary {
            report,
            report_location,
        })
    }
}
