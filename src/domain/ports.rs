use crate::domain::model::{DestinationListInfo, TelemetryOutcome};
use crate::utils::error::{ApiError, Result};
use async_trait::async_trait;
use std::fmt;

/// One page request against a destination list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageRequest {
    Page { page: u32, limit: u32 },
    Cursor { cursor: String, limit: u32 },
}

impl PageRequest {
    pub fn limit(&self) -> u32 {
        match self {
            PageRequest::Page { limit, .. } | PageRequest::Cursor { limit, .. } => *limit,
        }
    }

    pub fn query_pairs(&self) -> Vec<(&'static str, String)> {
        match self {
            PageRequest::Page { page, limit } => {
                vec![("page", page.to_string()), ("limit", limit.to_string())]
            }
            PageRequest::Cursor { cursor, limit } => {
                vec![("cursor", cursor.clone()), ("limit", limit.to_string())]
            }
        }
    }
}

impl fmt::Display for PageRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PageRequest::Page { page, limit } => write!(f, "page {} (limit {})", page, limit),
            PageRequest::Cursor { cursor, limit } => {
                write!(f, "cursor '{}' (limit {})", cursor, limit)
            }
        }
    }
}

/// The vendor API that hosts destination lists.
#[async_trait]
pub trait ListApi: Send + Sync {
    /// Lists the account's destination lists. Vendors without an index return none.
    async fn list_lists(&self) -> std::result::Result<Vec<DestinationListInfo>, ApiError> {
        Ok(Vec::new())
    }

    async fn get_page(
        &self,
        list_id: &str,
        request: &PageRequest,
    ) -> std::result::Result<serde_json::Value, ApiError>;

    async fn delete_batch(
        &self,
        list_id: &str,
        ids: &[String],
    ) -> std::result::Result<(), ApiError>;
}

/// The independent telemetry source used for cross-checking.
#[async_trait]
pub trait TelemetryApi: Send + Sync {
    /// Failures are folded into [`TelemetryOutcome::Failed`]; this never errors.
    async fn query(&self, indicator: &str, lookback_days: u32) -> TelemetryOutcome;
}

/// A human yes/no decision. Implementations must not block the runtime.
#[async_trait]
pub trait Confirmation: Send + Sync {
    async fn confirm(&self, question: &str) -> bool;
}

pub trait Storage: Send + Sync {
    fn read_file(&self, path: &str) -> impl std::future::Future<Output = Result<Vec<u8>>> + Send;
    fn write_file(
        &self,
        path: &str,
        data: &[u8],
    ) -> impl std::future::Future<Output = Result<()>> + Send;
}

pub trait ReportSink: Send + Sync {
    /// Renders and persists the report, returning where it went.
    fn emit(
        &self,
        report: &crate::core::audit::AuditReport,
    ) -> impl std::future::Future<Output = Result<String>> + Send;
}
