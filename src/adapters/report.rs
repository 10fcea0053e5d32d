use crate::core::audit::{AuditReport, AuditSummary, ListAudit, RunMode};
use crate::domain::ports::{ReportSink, Storage};
use crate::utils::error::{CleanupError, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportFormat {
    Csv,
    Json,
}

impl ReportFormat {
    pub fn from_path(path: &str) -> Result<Self> {
        let extension = Path::new(path)
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase);

        match extension.as_deref() {
            Some("csv") => Ok(ReportFormat::Csv),
            Some("json") => Ok(ReportFormat::Json),
            _ => Err(CleanupError::InvalidConfigValueError {
                field: "output.path".to_string(),
                value: path.to_string(),
                reason: "report must end in .csv or .json".to_string(),
            }),
        }
    }
}

#[derive(Serialize)]
struct SummaryDocument<'a> {
    generated_at: DateTime<Utc>,
    mode: RunMode,
    confirmation_denied: bool,
    cancelled: bool,
    summary: &'a AuditSummary,
    lists: &'a [ListAudit],
}

/// `audit.csv` -> `audit.summary.json` next to it.
pub fn summary_path(path: &str) -> String {
    let p = Path::new(path);
    let stem = p.file_stem().and_then(|s| s.to_str()).unwrap_or("audit");
    p.with_file_name(format!("{}.summary.json", stem))
        .to_string_lossy()
        .into_owned()
}

/// Writes the audit report through a [`Storage`].
///
/// CSV output carries one row per entry plus a `<stem>.summary.json` sidecar
/// with the run metadata and counts; JSON output carries the whole report.
pub struct FileReportSink<S: Storage> {
    storage: S,
    path: String,
}

impl<S: Storage> FileReportSink<S> {
    pub fn new(storage: S, path: impl Into<String>) -> Self {
        Self {
            storage,
            path: path.into(),
        }
    }

    fn render_csv(report: &AuditReport) -> Result<Vec<u8>> {
        let mut writer = csv::Writer::from_writer(Vec::new());
        for entry in &report.entries {
            writer.serialize(entry)?;
        }
        writer.into_inner().map_err(|e| CleanupError::ProcessingError {
            message: format!("Failed to finish CSV report: {}", e),
        })
    }
}

impl<S: Storage> ReportSink for FileReportSink<S> {
    async fn emit(&self, report: &AuditReport) -> Result<String> {
        match ReportFormat::from_path(&self.path)? {
            ReportFormat::Csv => {
                let rows = Self::render_csv(report)?;
                self.storage.write_file(&self.path, &rows).await?;

                let summary = SummaryDocument {
                    generated_at: report.generated_at,
                    mode: report.mode,
                    confirmation_denied: report.confirmation_denied,
                    cancelled: report.cancelled,
                    summary: &report.summary,
                    lists: &report.lists,
                };
                let sidecar = summary_path(&self.path);
                self.storage
                    .write_file(&sidecar, &serde_json::to_vec_pretty(&summary)?)
                    .await?;
                tracing::debug!("📝 Wrote {} audit rows and {}", report.entries.len(), sidecar);
            }
            ReportFormat::Json => {
                let body = serde_json::to_vec_pretty(report)?;
                self.storage.write_file(&self.path, &body).await?;
                tracing::debug!("📝 Wrote JSON audit report with {} entries", report.entries.len());
            }
        }
        Ok(self.path.clone())
    }
}
