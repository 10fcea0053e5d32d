use crate::config::{CleanupConfig, QueryStyle};
use crate::domain::model::{TelemetryOutcome, TelemetrySignal};
use crate::domain::ports::TelemetryApi;
use crate::utils::error::{ApiError, CleanupError, QueryFailure, Result};
use crate::utils::timestamps::parse_timestamp;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use std::collections::HashMap;

/// reqwest client for the telemetry / hunting API.
pub struct HttpTelemetryClient {
    client: Client,
    endpoint: String,
    token: Option<String>,
    headers: HashMap<String, String>,
    style: QueryStyle,
}

impl HttpTelemetryClient {
    pub fn new(config: &CleanupConfig) -> Result<Self> {
        let endpoint = config
            .crosscheck
            .endpoint
            .clone()
            .ok_or_else(|| CleanupError::MissingConfigError {
                field: "crosscheck.endpoint".to_string(),
            })?;
        let client = Client::builder()
            .timeout(config.crosscheck_timeout())
            .build()?;

        Ok(Self {
            client,
            endpoint,
            token: config.crosscheck.token.clone(),
            headers: config.crosscheck.headers.clone().unwrap_or_default(),
            style: config.query_style(),
        })
    }

    fn request_body(&self, indicator: &str, lookback_days: u32) -> Value {
        match self.style {
            QueryStyle::Hunting => json!({ "Query": build_hunting_query(indicator, lookback_days) }),
            QueryStyle::Indicator => json!({ "indicator": indicator, "lookbackDays": lookback_days }),
        }
    }

    async fn post(&self, body: &Value) -> std::result::Result<Value, ApiError> {
        let mut request = self.client.post(&self.endpoint).json(body);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }
        for (key, value) in &self.headers {
            request = request.header(key, value);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ApiError::Status {
                status: status.as_u16(),
                body,
            });
        }
        response
            .json::<Value>()
            .await
            .map_err(|e| ApiError::Decode(e.to_string()))
    }
}

fn escape_kql_string(raw: &str) -> String {
    raw.replace('\\', "\\\\").replace('"', "\\\"")
}

/// Latest hit and hit count for the indicator inside the lookback window.
pub fn build_hunting_query(indicator: &str, lookback_days: u32) -> String {
    format!(
        "DeviceNetworkEvents\n\
         | where Timestamp >= ago({}d)\n\
         | where RemoteUrl contains \"{}\"\n\
         | summarize HitCount = count(), LastSeen = max(Timestamp)",
        lookback_days,
        escape_kql_string(indicator)
    )
}

fn hit_count(value: Option<&Value>) -> Option<u64> {
    match value? {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Reads a `Results` table with `HitCount` / `LastSeen` (or a bare `Timestamp`) columns.
pub fn parse_hunting_response(body: &Value) -> TelemetryOutcome {
    let Some(rows) = body.get("Results").and_then(Value::as_array) else {
        return TelemetryOutcome::Failed(QueryFailure::Malformed(
            "response has no Results table".to_string(),
        ));
    };
    let Some(row) = rows.first() else {
        return TelemetryOutcome::NoData;
    };

    let last_seen = row
        .get("LastSeen")
        .or_else(|| row.get("Timestamp"))
        .and_then(parse_timestamp);
    let count = hit_count(row.get("HitCount")).unwrap_or(if last_seen.is_some() { 1 } else { 0 });

    if count == 0 && last_seen.is_none() {
        return TelemetryOutcome::NoData;
    }
    TelemetryOutcome::Observed(TelemetrySignal {
        matched: count > 0,
        last_seen,
        raw_hit_count: count,
    })
}

/// Reads `{matched, lastSeen, hitCount}`.
pub fn parse_indicator_response(body: &Value) -> TelemetryOutcome {
    let Some(obj) = body.as_object() else {
        return match body {
            Value::Null => TelemetryOutcome::NoData,
            other => TelemetryOutcome::Failed(QueryFailure::Malformed(format!(
                "expected an object, got {}",
                other
            ))),
        };
    };
    if obj.is_empty() {
        return TelemetryOutcome::NoData;
    }

    let count = hit_count(obj.get("hitCount"));
    let matched = obj.get("matched").and_then(Value::as_bool);
    if count.is_none() && matched.is_none() {
        return TelemetryOutcome::Failed(QueryFailure::Malformed(
            "neither matched nor hitCount present".to_string(),
        ));
    }
    let count = count.unwrap_or(0);

    TelemetryOutcome::Observed(TelemetrySignal {
        matched: matched.unwrap_or(count > 0),
        last_seen: obj.get("lastSeen").and_then(parse_timestamp),
        raw_hit_count: count,
    })
}

#[async_trait]
impl TelemetryApi for HttpTelemetryClient {
    async fn query(&self, indicator: &str, lookback_days: u32) -> TelemetryOutcome {
        let body = self.request_body(indicator, lookback_days);
        match self.post(&body).await {
            Ok(response) => match self.style {
                QueryStyle::Hunting => parse_hunting_response(&response),
                QueryStyle::Indicator => parse_indicator_response(&response),
            },
            Err(err) => {
                tracing::warn!("⚠️ Telemetry query for {} failed: {}", indicator, err);
                TelemetryOutcome::Failed(err.into())
            }
        }
    }
}
