use crate::config::CleanupConfig;
use crate::domain::model::DestinationListInfo;
use crate::domain::ports::{ListApi, PageRequest};
use crate::utils::error::{ApiError, Result};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde_json::Value;
use std::sync::Arc;

/// reqwest client for the destination-list API.
pub struct HttpListClient {
    client: Client,
    config: Arc<CleanupConfig>,
}

impl HttpListClient {
    pub fn new(config: Arc<CleanupConfig>) -> Result<Self> {
        let client = Client::builder().timeout(config.list_timeout()).build()?;
        Ok(Self { client, config })
    }

    fn authorize(&self, mut request: RequestBuilder) -> RequestBuilder {
        request = request.header(reqwest::header::ACCEPT, "application/json");
        if let Some(token) = &self.config.list.token {
            request = request.bearer_auth(token);
        }
        if let Some(headers) = &self.config.list.headers {
            for (key, value) in headers {
                request = request.header(key, value);
            }
        }
        request
    }
}

async fn error_for_status(response: reqwest::Response) -> ApiError {
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    ApiError::Status { status, body }
}

/// The vendor expects numeric ids where ids are numeric.
fn id_payload(ids: &[String]) -> Vec<Value> {
    ids.iter()
        .map(|id| match id.parse::<i64>() {
            Ok(n) => Value::from(n),
            Err(_) => Value::from(id.as_str()),
        })
        .collect()
}

fn text_field(item: &Value, key: &str) -> Option<String> {
    match item.get(key)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Reads the list index: `{"data": [{"id", "name", "meta": {"destinationCount"}}]}`.
pub fn parse_list_index(body: &Value) -> std::result::Result<Vec<DestinationListInfo>, ApiError> {
    let items = body
        .get("data")
        .or_else(|| body.get("items"))
        .unwrap_or(body)
        .as_array()
        .ok_or_else(|| ApiError::Decode("list index has no data array".to_string()))?;

    Ok(items
        .iter()
        .filter_map(|item| {
            let id = text_field(item, "id")?;
            Some(DestinationListInfo {
                name: text_field(item, "name").unwrap_or_else(|| id.clone()),
                destination_count: item
                    .pointer("/meta/destinationCount")
                    .or_else(|| item.get("destinationCount"))
                    .and_then(Value::as_u64),
                id,
            })
        })
        .collect())
}

#[async_trait]
impl ListApi for HttpListClient {
    async fn list_lists(&self) -> std::result::Result<Vec<DestinationListInfo>, ApiError> {
        let url = self.config.lists_url();
        tracing::debug!("📡 GET {}", url);

        let response = self.authorize(self.client.get(&url)).send().await?;
        if !response.status().is_success() {
            return Err(error_for_status(response).await);
        }

        let body = response
            .json::<Value>()
            .await
            .map_err(|e| ApiError::Decode(e.to_string()))?;
        parse_list_index(&body)
    }

    async fn get_page(
        &self,
        list_id: &str,
        request: &PageRequest,
    ) -> std::result::Result<Value, ApiError> {
        let url = self.config.destinations_url(list_id);
        tracing::debug!("📡 GET {} {:?}", url, request.query_pairs());

        let response = self
            .authorize(self.client.get(&url))
            .query(&request.query_pairs())
            .send()
            .await?;

        tracing::debug!("📡 Response {}", response.status());
        if !response.status().is_success() {
            return Err(error_for_status(response).await);
        }

        response
            .json::<Value>()
            .await
            .map_err(|e| ApiError::Decode(e.to_string()))
    }

    async fn delete_batch(
        &self,
        list_id: &str,
        ids: &[String],
    ) -> std::result::Result<(), ApiError> {
        let url = self.config.remove_url(list_id);
        tracing::debug!("📡 DELETE {} ({} ids)", url, ids.len());

        let response = self
            .authorize(self.client.delete(&url))
            .json(&id_payload(ids))
            .send()
            .await?;

        let status = response.status();
        if !matches!(
            status,
            StatusCode::OK | StatusCode::ACCEPTED | StatusCode::NO_CONTENT
        ) {
            return Err(error_for_status(response).await);
        }

        // Some responses carry a vendor status block even on HTTP 200.
        let body = response.text().await.unwrap_or_default();
        if let Ok(json) = serde_json::from_str::<Value>(&body) {
            if let Some(code) = json.pointer("/status/code").and_then(Value::as_u64) {
                if code >= 400 {
                    return Err(ApiError::Status {
                        status: u16::try_from(code).unwrap_or(500),
                        body,
                    });
                }
            }
        }
        Ok(())
    }
}
