use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use destlist_cleanup::core::audit::AuditReport;
use destlist_cleanup::domain::model::{DestinationListInfo, TelemetryOutcome, TelemetrySignal};
use destlist_cleanup::domain::ports::{Confirmation, ListApi, PageRequest, ReportSink, TelemetryApi};
use destlist_cleanup::utils::error::{ApiError, QueryFailure};
use destlist_cleanup::{CleanupConfig, CleanupError, CleanupWorkflow, Result};
use serde_json::{json, Value};
use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;

const LIST_ID: &str = "1001";

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap()
}

/// 250 destinations; ids 1..=40 are 500+ days old, the rest 31 days old.
fn destinations() -> Vec<Value> {
    (1..=250)
        .map(|i| {
            let created = if i <= 40 {
                Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + Duration::minutes(i)
            } else {
                Utc.with_ymd_and_hms(2025, 5, 1, 0, 0, 0).unwrap()
            };
            json!({
                "id": i,
                "destination": format!("d{}.example", i),
                "createdAt": created.to_rfc3339(),
            })
        })
        .collect()
}

struct FakeListApi {
    lists: Vec<DestinationListInfo>,
    records: Vec<Value>,
    page_failure: Option<ApiError>,
    failing_calls: HashSet<usize>,
    deletes: Mutex<Vec<(String, Vec<String>)>>,
}

impl FakeListApi {
    fn new(records: Vec<Value>) -> Self {
        Self {
            lists: Vec::new(),
            records,
            page_failure: None,
            failing_calls: HashSet::new(),
            deletes: Mutex::new(Vec::new()),
        }
    }

    fn delete_calls(&self) -> Vec<(String, Vec<String>)> {
        self.deletes.lock().unwrap().clone()
    }
}

#[async_trait]
impl ListApi for FakeListApi {
    async fn list_lists(&self) -> std::result::Result<Vec<DestinationListInfo>, ApiError> {
        Ok(self.lists.clone())
    }

    async fn get_page(&self, _list_id: &str, request: &PageRequest) -> std::result::Result<Value, ApiError> {
        if let Some(err) = &self.page_failure {
            return Err(err.clone());
        }
        let PageRequest::Page { page, limit } = request else {
            panic!("fake only serves numbered pages");
        };
        let start = ((page - 1) * limit) as usize;
        let slice: Vec<Value> = self
            .records
            .iter()
            .skip(start)
            .take(*limit as usize)
            .cloned()
            .collect();
        Ok(json!({ "data": slice }))
    }

    async fn delete_batch(&self, list_id: &str, ids: &[String]) -> std::result::Result<(), ApiError> {
        let mut deletes = self.deletes.lock().unwrap();
        let call = deletes.len();
        deletes.push((list_id.to_string(), ids.to_vec()));
        if self.failing_calls.contains(&call) {
            return Err(ApiError::Status {
                status: 500,
                body: "internal error".to_string(),
            });
        }
        Ok(())
    }
}

/// d1..d5 seen recently, d6..d8 fail to query, everything else has zero hits.
struct FakeTelemetry;

#[async_trait]
impl TelemetryApi for FakeTelemetry {
    async fn query(&self, indicator: &str, _lookback_days: u32) -> TelemetryOutcome {
        let n: u32 = indicator
            .trim_start_matches('d')
            .trim_end_matches(".example")
            .parse()
            .unwrap();
        match n {
            1..=5 => TelemetryOutcome::Observed(TelemetrySignal {
                matched: true,
                last_seen: Some(now() - Duration::days(2)),
                raw_hit_count: 12,
            }),
            6..=8 => TelemetryOutcome::Failed(QueryFailure::Server("HTTP 503".to_string())),
            _ => TelemetryOutcome::Observed(TelemetrySignal {
                matched: false,
                last_seen: None,
                raw_hit_count: 0,
            }),
        }
    }
}

/// Cross-checks hang after cancelling the run, like a user pressing Ctrl-C mid-query.
struct InterruptedTelemetry(CancellationToken);

#[async_trait]
impl TelemetryApi for InterruptedTelemetry {
    async fn query(&self, _indicator: &str, _lookback_days: u32) -> TelemetryOutcome {
        self.0.cancel();
        std::future::pending().await
    }
}

struct ScriptedConfirmation {
    answers: Mutex<VecDeque<bool>>,
    questions: Mutex<Vec<String>>,
    cancel_on_ask: Option<CancellationToken>,
}

impl ScriptedConfirmation {
    fn new(answers: &[bool]) -> Self {
        Self {
            answers: Mutex::new(answers.iter().copied().collect()),
            questions: Mutex::new(Vec::new()),
            cancel_on_ask: None,
        }
    }

    /// Answers as scripted, but cancels the run while the question is open.
    fn interrupted(answers: &[bool], token: CancellationToken) -> Self {
        Self {
            cancel_on_ask: Some(token),
            ..Self::new(answers)
        }
    }

    fn questions(&self) -> Vec<String> {
        self.questions.lock().unwrap().clone()
    }
}

#[async_trait]
impl Confirmation for ScriptedConfirmation {
    async fn confirm(&self, question: &str) -> bool {
        self.questions.lock().unwrap().push(question.to_string());
        if let Some(token) = &self.cancel_on_ask {
            token.cancel();
        }
        self.answers.lock().unwrap().pop_front().unwrap_or(false)
    }
}

#[derive(Default)]
struct MemorySink {
    reports: Mutex<Vec<AuditReport>>,
}

impl ReportSink for MemorySink {
    async fn emit(&self, report: &AuditReport) -> Result<String> {
        self.reports.lock().unwrap().push(report.clone());
        Ok("memory://audit".to_string())
    }
}

fn config(dry_run: bool) -> Arc<CleanupConfig> {
    let toml = format!(
        r#"
[list]
base_url = "https://lists.invalid/policies/v2/destinationlists"
list_ids = ["{}"]
retry_base_delay_ms = 1

[selection]
threshold_days = 180

[crosscheck]
enabled = true
endpoint = "https://telemetry.invalid/api/advancedhunting/run"
lookback_days = 180
concurrency = 8

[deletion]
batch_size = 10
batch_delay_ms = 0
dry_run = {}
"#,
        LIST_ID, dry_run
    );
    Arc::new(CleanupConfig::from_toml_str(&toml).unwrap())
}

fn outcomes(report: &AuditReport, decision: &str) -> Vec<String> {
    report
        .entries
        .iter()
        .filter(|e| e.decision == decision)
        .map(|e| e.outcome.clone())
        .collect()
}

#[tokio::test]
async fn test_dry_run_reviews_without_deleting() {
    let api = FakeListApi::new(destinations());
    let workflow = CleanupWorkflow::new(config(true), api, Some(FakeTelemetry));
    let confirm = ScriptedConfirmation::new(&[true, true]);
    let sink = MemorySink::default();

    let summary = workflow.run(now(), &confirm, &sink).await.unwrap();
    let s = &summary.report.summary;

    assert_eq!(s.total_fetched, 250);
    assert_eq!(s.kept, 210);
    assert_eq!(s.flagged, 8);
    assert_eq!(s.delete_candidates, 32);
    assert_eq!(s.skipped_dry_run, 32);
    assert_eq!(s.deleted, 0);
    assert_eq!(summary.report.entries.len(), 250);
    assert!(outcomes(&summary.report, "DELETE")
        .iter()
        .all(|o| o == "SKIPPED_DRYRUN"));

    assert!(confirm.questions().is_empty());
    assert!(!summary.any_batch_failed());
    assert_eq!(summary.report_location, "memory://audit");
    assert_eq!(sink.reports.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn test_flagged_entries_explain_themselves() {
    let workflow = CleanupWorkflow::new(config(true), FakeListApi::new(destinations()), Some(FakeTelemetry));
    let summary = workflow
        .run(now(), &ScriptedConfirmation::new(&[]), &MemorySink::default())
        .await
        .unwrap();

    let flagged: Vec<_> = summary
        .report
        .entries
        .iter()
        .filter(|e| e.decision == "FLAG")
        .collect();
    assert_eq!(flagged.len(), 8);
    assert_eq!(
        flagged
            .iter()
            .filter(|e| e.reason.contains("cross-check failed"))
            .count(),
        3
    );
    assert_eq!(
        flagged
            .iter()
            .filter(|e| e.reason.contains("recent activity"))
            .count(),
        5
    );
}

#[tokio::test]
async fn test_live_run_deletes_in_capped_batches() {
    let api = FakeListApi::new(destinations());
    let workflow = CleanupWorkflow::new(config(false), api, Some(FakeTelemetry));
    let confirm = ScriptedConfirmation::new(&[true, true]);
    let sink = MemorySink::default();

    let summary = workflow.run(now(), &confirm, &sink).await.unwrap();

    assert_eq!(confirm.questions().len(), 2);
    assert!(confirm.questions()[0].contains("32 destinations"));
    assert_eq!(summary.report.summary.deleted, 32);
    assert!(!summary.report.confirmation_denied);
    assert!(!summary.any_batch_failed());
}

#[tokio::test]
async fn test_live_batches_are_submitted_to_the_api() {
    let api = Arc::new(FakeListApi::new(destinations()));
    let workflow = CleanupWorkflow::new(config(false), SharedList(api.clone()), Some(FakeTelemetry));

    workflow
        .run(now(), &ScriptedConfirmation::new(&[true, true]), &MemorySink::default())
        .await
        .unwrap();

    let calls = api.delete_calls();
    assert_eq!(calls.len(), 4);
    assert_eq!(
        calls.iter().map(|(_, ids)| ids.len()).collect::<Vec<_>>(),
        vec![10, 10, 10, 2]
    );
    assert!(calls.iter().all(|(list, _)| list == LIST_ID));

    let deleted: HashSet<u32> = calls
        .iter()
        .flat_map(|(_, ids)| ids.iter().map(|id| id.parse::<u32>().unwrap()))
        .collect();
    let expected: HashSet<u32> = (9..=40).collect();
    assert_eq!(deleted, expected);
}

#[tokio::test]
async fn test_failed_batch_does_not_stop_the_rest() {
    let mut fake = FakeListApi::new(destinations());
    fake.failing_calls.insert(1);
    let api = Arc::new(fake);
    let workflow = CleanupWorkflow::new(config(false), SharedList(api.clone()), Some(FakeTelemetry));

    let summary = workflow
        .run(now(), &ScriptedConfirmation::new(&[true, true]), &MemorySink::default())
        .await
        .unwrap();

    assert_eq!(api.delete_calls().len(), 4);
    assert_eq!(summary.report.summary.deleted, 22);
    assert_eq!(summary.report.summary.failed, 10);
    assert!(summary.any_batch_failed());
    assert_eq!(
        outcomes(&summary.report, "DELETE")
            .iter()
            .filter(|o| o.starts_with("FAILED("))
            .count(),
        10
    );
}

#[tokio::test]
async fn test_denied_confirmation_keeps_dry_run_results() {
    let api = Arc::new(FakeListApi::new(destinations()));
    let workflow = CleanupWorkflow::new(config(false), SharedList(api.clone()), Some(FakeTelemetry));
    let confirm = ScriptedConfirmation::new(&[false]);

    let summary = workflow
        .run(now(), &confirm, &MemorySink::default())
        .await
        .unwrap();

    assert_eq!(confirm.questions().len(), 1);
    assert!(api.delete_calls().is_empty());
    assert!(summary.report.confirmation_denied);
    assert_eq!(summary.report.summary.skipped_dry_run, 32);
    assert_eq!(summary.report.summary.deleted, 0);
}

#[tokio::test]
async fn test_second_gate_is_required() {
    let api = Arc::new(FakeListApi::new(destinations()));
    let workflow = CleanupWorkflow::new(config(false), SharedList(api.clone()), Some(FakeTelemetry));
    let confirm = ScriptedConfirmation::new(&[true, false]);

    let summary = workflow
        .run(now(), &confirm, &MemorySink::default())
        .await
        .unwrap();

    assert_eq!(confirm.questions().len(), 2);
    assert!(api.delete_calls().is_empty());
    assert!(summary.report.confirmation_denied);
}

#[tokio::test]
async fn test_fetch_failure_aborts_before_any_decision() {
    let mut fake = FakeListApi::new(destinations());
    fake.page_failure = Some(ApiError::Status {
        status: 503,
        body: "unavailable".to_string(),
    });
    let api = Arc::new(fake);
    let workflow = CleanupWorkflow::new(config(false), SharedList(api.clone()), Some(FakeTelemetry));
    let confirm = ScriptedConfirmation::new(&[true, true]);
    let sink = MemorySink::default();

    let err = workflow.run(now(), &confirm, &sink).await.unwrap_err();

    match err {
        CleanupError::Fetch(fetch) => {
            assert_eq!(fetch.list_id, LIST_ID);
            assert_eq!(fetch.attempts, 4);
        }
        other => panic!("expected a fetch error, got {:?}", other),
    }
    assert!(api.delete_calls().is_empty());
    assert!(confirm.questions().is_empty());
    assert!(sink.reports.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_without_crosscheck_every_old_entry_is_deleted() {
    let mut config = (*config(true)).clone();
    config.crosscheck.enabled = false;
    let workflow = CleanupWorkflow::<_, FakeTelemetry>::new(
        Arc::new(config),
        FakeListApi::new(destinations()),
        None,
    );

    let summary = workflow
        .run(now(), &ScriptedConfirmation::new(&[]), &MemorySink::default())
        .await
        .unwrap();

    assert_eq!(summary.report.summary.delete_candidates, 40);
    assert_eq!(summary.report.summary.flagged, 0);
    assert!(summary
        .report
        .entries
        .iter()
        .all(|e| e.telemetry.is_empty()));
}

#[tokio::test]
async fn test_cancelled_live_run_asks_nothing_and_deletes_nothing() {
    let api = Arc::new(FakeListApi::new(destinations()));
    let workflow = CleanupWorkflow::new(config(false), SharedList(api.clone()), Some(FakeTelemetry));
    workflow.cancellation_token().cancel();
    let confirm = ScriptedConfirmation::new(&[true, true]);
    let sink = MemorySink::default();

    let err = workflow.run(now(), &confirm, &sink).await.unwrap_err();

    assert!(err.is_cancelled());
    assert!(err.is_fatal());
    assert!(confirm.questions().is_empty());
    assert!(api.delete_calls().is_empty());
    assert!(sink.reports.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_cancel_during_crosscheck_stops_before_selection() {
    let api = Arc::new(FakeListApi::new(destinations()));
    let token = CancellationToken::new();
    let workflow = CleanupWorkflow::new(
        config(false),
        SharedList(api.clone()),
        Some(InterruptedTelemetry(token.clone())),
    );
    let cancel = workflow.cancellation_token();
    tokio::spawn(async move {
        token.cancelled().await;
        cancel.cancel();
    });
    let confirm = ScriptedConfirmation::new(&[true, true]);

    let err = tokio::time::timeout(
        std::time::Duration::from_secs(5),
        workflow.run(now(), &confirm, &MemorySink::default()),
    )
    .await
    .expect("cancellation must interrupt the cross-check")
    .unwrap_err();

    match err {
        CleanupError::Cancelled { stage } => assert_eq!(stage, "telemetry cross-check"),
        other => panic!("expected cancellation, got {:?}", other),
    }
    assert!(confirm.questions().is_empty());
    assert!(api.delete_calls().is_empty());
}

#[tokio::test]
async fn test_cancel_at_first_gate_skips_the_second_and_issues_nothing() {
    let api = Arc::new(FakeListApi::new(destinations()));
    let workflow = CleanupWorkflow::new(config(false), SharedList(api.clone()), Some(FakeTelemetry));
    let confirm = ScriptedConfirmation::interrupted(&[true, true], workflow.cancellation_token());
    let sink = MemorySink::default();

    let summary = workflow.run(now(), &confirm, &sink).await.unwrap();

    assert_eq!(confirm.questions().len(), 1);
    assert!(api.delete_calls().is_empty());
    assert!(summary.was_cancelled());
    assert!(!summary.report.confirmation_denied);
    assert_eq!(summary.report.summary.cancelled, 32);
    assert_eq!(summary.report.summary.deleted, 0);
    assert!(outcomes(&summary.report, "DELETE").iter().all(|o| o == "CANCELLED"));
    assert!(sink.reports.lock().unwrap()[0].cancelled);
}

#[tokio::test]
async fn test_list_names_appear_in_question_and_report() {
    let mut fake = FakeListApi::new(destinations());
    fake.lists = vec![
        DestinationListInfo {
            id: LIST_ID.to_string(),
            name: "Blocked domains".to_string(),
            destination_count: Some(250),
        },
        DestinationListInfo {
            id: "9999".to_string(),
            name: "Not selected".to_string(),
            destination_count: None,
        },
    ];
    let workflow = CleanupWorkflow::new(config(false), fake, Some(FakeTelemetry));
    let confirm = ScriptedConfirmation::new(&[false]);

    let summary = workflow
        .run(now(), &confirm, &MemorySink::default())
        .await
        .unwrap();

    assert!(confirm.questions()[0].contains("\"Blocked domains\" (1001)"));
    assert!(!confirm.questions()[0].contains("Not selected"));
    assert_eq!(summary.report.lists.len(), 1);
    assert_eq!(summary.report.lists[0].name.as_deref(), Some("Blocked domains"));
    assert_eq!(summary.report.lists[0].fetched, 250);
}

/// Lets a test keep a handle on the fake after the workflow takes ownership.
struct SharedList(Arc<FakeListApi>);

#[async_trait]
impl ListApi for SharedList {
    async fn list_lists(&self) -> std::result::Result<Vec<DestinationListInfo>, ApiError> {
        self.0.list_lists().await
    }

    async fn get_page(&self, list_id: &str, request: &PageRequest) -> std::result::Result<Value, ApiError> {
        self.0.get_page(list_id, request).await
    }

    async fn delete_batch(&self, list_id: &str, ids: &[String]) -> std::result::Result<(), ApiError> {
        self.0.delete_batch(list_id, ids).await
    }
}
