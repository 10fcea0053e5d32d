//! Paginated retrieval of a destination list.
//!
//! The first response decides the pagination style. A response that carries
//! `page`/`limit`, or a `next` link with a `page=` parameter, stays in page
//! mode; a bare `cursor`/`next` token (top level or under `meta`) switches to
//! cursor paging. Pages are pulled lazily and a page that exhausts its retries
//! ends the stream with a [`FetchError`], so callers can never mistake a
//! truncated list for a complete one.
//!
//! Every page must make progress: a repeated cursor, a page that starts with
//! the same record as the previous one, or more than `max_pages` pages all end
//! the list with [`ApiError::Stalled`].

use crate::domain::model::RawRecord;
use crate::domain::ports::{ListApi, PageRequest};
use crate::utils::error::{ApiError, FetchError};
use futures::stream::{self, Stream, TryStreamExt};
use serde_json::Value;
use std::collections::HashSet;
use std::time::Duration;

pub const MAX_PAGE_SIZE: u32 = 100;
pub const MAX_RETRIES: u32 = 3;
pub const MAX_PAGES: u32 = 10_000;

const RECORD_KEYS: &[&str] = &["data", "items"];
const CURSOR_KEYS: &[&str] = &["cursor", "next", "nextCursor", "next_cursor"];
const PAGE_KEYS: &[&str] = &["page", "limit"];
const TOTAL_KEYS: &[&str] = &["total", "totalCount", "destinationCount"];
const HAS_MORE_KEYS: &[&str] = &["hasMore", "has_more"];

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn new(base_delay: Duration) -> Self {
        Self {
            max_retries: MAX_RETRIES,
            base_delay,
        }
    }

    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(2u32.saturating_pow(attempt))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(Duration::from_millis(500))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum NextPage {
    Page(u32),
    Cursor(String),
    Done,
}

/// Walk state carried between pages.
#[derive(Debug)]
struct Progress {
    next: NextPage,
    pages: u32,
    fetched: u64,
    seen_cursors: HashSet<String>,
    last_first_record: Option<Value>,
}

impl Progress {
    fn start() -> Self {
        Self {
            next: NextPage::Page(1),
            pages: 0,
            fetched: 0,
            seen_cursors: HashSet::new(),
            last_first_record: None,
        }
    }
}

#[derive(Debug)]
struct ParsedPage {
    records: Vec<RawRecord>,
    page_indexed: bool,
    next_link: Option<String>,
    next_page: Option<u32>,
    total: Option<u64>,
    exhausted: bool,
}

impl ParsedPage {
    fn from_body(body: Value) -> Result<Self, ApiError> {
        let page_indexed = PAGE_KEYS
            .iter()
            .filter_map(|k| lookup(&body, k))
            .any(|v| v.as_u64().is_some());
        let next_link = CURSOR_KEYS
            .iter()
            .filter_map(|k| lookup(&body, k))
            .find_map(|v| v.as_str())
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string);
        let next_page = next_link
            .as_deref()
            .and_then(|link| link_query(link, "page"))
            .and_then(|page| page.parse().ok());
        let total = TOTAL_KEYS
            .iter()
            .filter_map(|k| lookup(&body, k))
            .find_map(Value::as_u64);
        let exhausted = HAS_MORE_KEYS
            .iter()
            .filter_map(|k| lookup(&body, k))
            .any(|v| v.as_bool() == Some(false));

        let records = match body {
            Value::Array(items) => items,
            Value::Object(mut obj) => RECORD_KEYS
                .iter()
                .find_map(|k| match obj.remove(*k) {
                    Some(Value::Array(items)) => Some(items),
                    _ => None,
                })
                .ok_or_else(|| {
                    ApiError::Decode("page has no data/items array".to_string())
                })?,
            other => {
                return Err(ApiError::Decode(format!(
                    "page body is not an object or array: {}",
                    other
                )))
            }
        };

        Ok(Self {
            records,
            page_indexed,
            next_link,
            next_page,
            total,
            exhausted,
        })
    }

    /// Cursor paging only when nothing in the body points at page numbers.
    fn cursor_paged(&self) -> bool {
        self.next_link.is_some() && !self.page_indexed && self.next_page.is_none()
    }

    fn next_cursor(&self) -> Option<String> {
        self.next_link.as_deref().map(extract_cursor)
    }
}

fn lookup<'v>(body: &'v Value, key: &str) -> Option<&'v Value> {
    body.get(key)
        .or_else(|| body.get("meta").and_then(|meta| meta.get(key)))
}

/// Query parameter of an absolute or relative link; `None` for bare tokens.
fn link_query(link: &str, key: &str) -> Option<String> {
    let parsed = url::Url::parse(link).or_else(|_| {
        url::Url::parse("http://relative.invalid/").and_then(|base| base.join(link))
    });
    parsed
        .ok()?
        .query_pairs()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.into_owned())
}

/// `next` may be a bare token or a URL carrying `?cursor=`.
fn extract_cursor(raw: &str) -> String {
    link_query(raw, "cursor").unwrap_or_else(|| raw.to_string())
}

pub struct PageFetcher<'a, L: ListApi> {
    api: &'a L,
    page_size: u32,
    max_pages: u32,
    retry: RetryPolicy,
}

impl<'a, L: ListApi> PageFetcher<'a, L> {
    pub fn new(api: &'a L, requested_page_size: u32, retry: RetryPolicy) -> Self {
        Self {
            api,
            page_size: requested_page_size.clamp(1, MAX_PAGE_SIZE),
            max_pages: MAX_PAGES,
            retry,
        }
    }

    pub fn with_max_pages(mut self, max_pages: u32) -> Self {
        self.max_pages = max_pages.max(1);
        self
    }

    pub fn page_size(&self) -> u32 {
        self.page_size
    }

    /// Lazily yields every record of `list_id` in vendor order.
    pub fn fetch(&self, list_id: &str) -> impl Stream<Item = Result<RawRecord, FetchError>> + '_ {
        let list_id = list_id.to_string();
        stream::try_unfold(Progress::start(), move |progress| {
            let list_id = list_id.clone();
            async move { self.next_page(&list_id, progress).await }
        })
        .map_ok(|records| stream::iter(records.into_iter().map(Ok::<RawRecord, FetchError>)))
        .try_flatten()
    }

    pub async fn fetch_all(&self, list_id: &str) -> Result<Vec<RawRecord>, FetchError> {
        let records: Vec<RawRecord> = self.fetch(list_id).try_collect().await?;
        tracing::info!("📥 List {}: fetched {} records", list_id, records.len());
        Ok(records)
    }

    async fn next_page(
        &self,
        list_id: &str,
        mut progress: Progress,
    ) -> Result<Option<(Vec<RawRecord>, Progress)>, FetchError> {
        let limit = self.page_size;
        let request = match std::mem::replace(&mut progress.next, NextPage::Done) {
            NextPage::Done => return Ok(None),
            NextPage::Page(page) => PageRequest::Page { page, limit },
            NextPage::Cursor(cursor) => PageRequest::Cursor { cursor, limit },
        };
        let first = progress.pages == 0;

        if progress.pages >= self.max_pages {
            tracing::error!("❌ List {}: gave up after {} pages", list_id, progress.pages);
            return Err(FetchError {
                list_id: list_id.to_string(),
                request: request.to_string(),
                attempts: 0,
                source: ApiError::Stalled(format!(
                    "more than {} pages without reaching the end",
                    self.max_pages
                )),
            });
        }

        let (body, attempts) = self.get_with_retry(list_id, &request).await?;
        let fail = |source: ApiError| FetchError {
            list_id: list_id.to_string(),
            request: request.to_string(),
            attempts,
            source,
        };
        let page = ParsedPage::from_body(body).map_err(fail)?;
        progress.pages += 1;

        if let (Some(previous), Some(current)) =
            (&progress.last_first_record, page.records.first())
        {
            if previous == current {
                return Err(fail(ApiError::Stalled(format!(
                    "{} repeated the previous page",
                    request
                ))));
            }
        }
        progress.fetched += page.records.len() as u64;
        progress.last_first_record = page.records.first().cloned();

        let (cursor_mode, current_page) = match &request {
            PageRequest::Cursor { .. } => (true, None),
            PageRequest::Page { page: n, .. } => (first && page.cursor_paged(), Some(*n)),
        };
        if first && cursor_mode {
            tracing::debug!("📡 List {}: vendor uses cursor pagination", list_id);
        }

        tracing::debug!(
            "📡 List {}: {} returned {} records",
            list_id,
            request,
            page.records.len()
        );

        let short_page = page.records.len() < limit as usize;
        let reached_total = page.total.is_some_and(|total| progress.fetched >= total);
        progress.next = if short_page || page.exhausted || reached_total {
            NextPage::Done
        } else if cursor_mode {
            match page.next_cursor() {
                None => NextPage::Done,
                Some(cursor) => {
                    if !progress.seen_cursors.insert(cursor.clone()) {
                        return Err(fail(ApiError::Stalled(format!(
                            "cursor '{}' was already visited",
                            cursor
                        ))));
                    }
                    NextPage::Cursor(cursor)
                }
            }
        } else {
            match current_page {
                Some(n) => NextPage::Page(page.next_page.filter(|p| *p > n).unwrap_or(n + 1)),
                None => NextPage::Done,
            }
        };

        Ok(Some((page.records, progress)))
    }

    async fn get_with_retry(
        &self,
        list_id: &str,
        request: &PageRequest,
    ) -> Result<(Value, u32), FetchError> {
        let mut attempt = 0;
        loop {
            match self.api.get_page(list_id, request).await {
                Ok(body) => return Ok((body, attempt + 1)),
                Err(err) if err.is_retryable() && attempt < self.retry.max_retries => {
                    let delay = self.retry.delay_for(attempt);
                    tracing::warn!(
                        "⚠️ List {}: {} failed ({}), retrying in {:?}",
                        list_id,
                        request,
                        err,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => {
                    tracing::error!("❌ List {}: {} failed: {}", list_id, request, err);
                    return Err(FetchError {
                        list_id: list_id.to_string(),
                        request: request.to_string(),
                        attempts: attempt + 1,
                        source: err,
                    });
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use futures::StreamExt;
    use serde_json::json;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    struct ScriptedListApi {
        responses: Mutex<VecDeque<Result<Value, ApiError>>>,
        requests: Mutex<Vec<PageRequest>>,
    }

    impl ScriptedListApi {
        fn new(responses: Vec<Result<Value, ApiError>>) -> Self {
            Self {
                responses: Mutex::new(responses.into()),
                requests: Mutex::new(Vec::new()),
            }
        }

        fn requests(&self) -> Vec<PageRequest> {
            self.requests.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ListApi for ScriptedListApi {
        async fn get_page(&self, _list_id: &str, request: &PageRequest) -> Result<Value, ApiError> {
            self.requests.lock().unwrap().push(request.clone());
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(json!({ "data": [] })))
        }

        async fn delete_batch(&self, _list_id: &str, _ids: &[String]) -> Result<(), ApiError> {
            unreachable!("pager never deletes")
        }
    }

    fn records(range: std::ops::Range<usize>) -> Vec<Value> {
        range
            .map(|i| json!({ "id": i, "destination": format!("d{}.example", i) }))
            .collect()
    }

    fn ids(records: &[Value]) -> Vec<u64> {
        records.iter().map(|r| r["id"].as_u64().unwrap()).collect()
    }

    fn fast_retry() -> RetryPolicy {
        RetryPolicy::new(Duration::from_millis(1))
    }

    fn server_error() -> Result<Value, ApiError> {
        Err(ApiError::Status {
            status: 503,
            body: "unavailable".to_string(),
        })
    }

    #[tokio::test]
    async fn test_page_mode_returns_every_record_in_order() {
        let api = ScriptedListApi::new(vec![
            Ok(json!({ "data": records(0..100), "meta": { "page": 1, "limit": 100 } })),
            Ok(json!({ "data": records(100..200), "meta": { "page": 2, "limit": 100 } })),
            Ok(json!({ "data": records(200..250), "meta": { "page": 3, "limit": 100 } })),
        ]);
        let fetcher = PageFetcher::new(&api, 100, fast_retry());

        let all = fetcher.fetch_all("list-1").await.unwrap();

        assert_eq!(ids(&all), (0..250).collect::<Vec<u64>>());
        assert_eq!(
            api.requests(),
            vec![
                PageRequest::Page { page: 1, limit: 100 },
                PageRequest::Page { page: 2, limit: 100 },
                PageRequest::Page { page: 3, limit: 100 },
            ]
        );
    }

    #[tokio::test]
    async fn test_exact_multiple_stops_on_empty_page() {
        let api = ScriptedListApi::new(vec![
            Ok(json!({ "data": records(0..100) })),
            Ok(json!({ "data": records(100..200) })),
            Ok(json!({ "data": [] })),
        ]);
        let fetcher = PageFetcher::new(&api, 100, fast_retry());

        let all = fetcher.fetch_all("list-1").await.unwrap();

        assert_eq!(all.len(), 200);
        assert_eq!(api.requests().len(), 3);
    }

    #[tokio::test]
    async fn test_items_key_and_bare_array_bodies() {
        let api = ScriptedListApi::new(vec![Ok(json!({ "items": records(0..3) }))]);
        let fetcher = PageFetcher::new(&api, 100, fast_retry());
        assert_eq!(fetcher.fetch_all("l").await.unwrap().len(), 3);

        let api = ScriptedListApi::new(vec![Ok(Value::Array(records(0..2)))]);
        let fetcher = PageFetcher::new(&api, 100, fast_retry());
        assert_eq!(fetcher.fetch_all("l").await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_cursor_mode_follows_next_tokens() {
        let api = ScriptedListApi::new(vec![
            Ok(json!({ "data": records(0..2), "meta": { "next": "abc" } })),
            Ok(json!({ "data": records(2..4), "next": "https://api.example.com/x?cursor=def&limit=2" })),
            Ok(json!({ "data": records(4..6), "next": null })),
        ]);
        let fetcher = PageFetcher::new(&api, 2, fast_retry());

        let all = fetcher.fetch_all("l").await.unwrap();

        assert_eq!(ids(&all), vec![0, 1, 2, 3, 4, 5]);
        assert_eq!(
            api.requests(),
            vec![
                PageRequest::Page { page: 1, limit: 2 },
                PageRequest::Cursor { cursor: "abc".to_string(), limit: 2 },
                PageRequest::Cursor { cursor: "def".to_string(), limit: 2 },
            ]
        );
    }

    #[tokio::test]
    async fn test_has_more_false_stops_on_full_page() {
        let api = ScriptedListApi::new(vec![Ok(
            json!({ "data": records(0..100), "meta": { "hasMore": false } }),
        )]);
        let fetcher = PageFetcher::new(&api, 100, fast_retry());

        let all = fetcher.fetch_all("l").await.unwrap();

        assert_eq!(all.len(), 100);
        assert_eq!(api.requests().len(), 1);
    }

    #[tokio::test]
    async fn test_page_size_is_capped_at_vendor_maximum() {
        let api = ScriptedListApi::new(vec![Ok(json!({ "data": [] }))]);
        let fetcher = PageFetcher::new(&api, 500, fast_retry());

        fetcher.fetch_all("l").await.unwrap();

        assert_eq!(fetcher.page_size(), 100);
        assert_eq!(api.requests()[0].limit(), 100);
    }

    #[tokio::test]
    async fn test_transient_failures_are_retried() {
        let api = ScriptedListApi::new(vec![
            server_error(),
            Err(ApiError::Timeout),
            Ok(json!({ "data": records(0..5) })),
        ]);
        let fetcher = PageFetcher::new(&api, 100, fast_retry());

        let all = fetcher.fetch_all("l").await.unwrap();

        assert_eq!(all.len(), 5);
        assert_eq!(api.requests().len(), 3);
    }

    #[tokio::test]
    async fn test_exhausted_retries_abort_the_whole_list() {
        let api = ScriptedListApi::new(vec![
            Ok(json!({ "data": records(0..100) })),
            server_error(),
            server_error(),
            server_error(),
            server_error(),
        ]);
        let fetcher = PageFetcher::new(&api, 100, fast_retry());

        let err = fetcher.fetch_all("list-9").await.unwrap_err();

        assert_eq!(err.list_id, "list-9");
        assert_eq!(err.attempts, MAX_RETRIES + 1);
        assert!(err.request.contains("page 2"));
        assert_eq!(api.requests().len(), 5);
    }

    #[tokio::test]
    async fn test_stream_yields_records_then_error() {
        let api = ScriptedListApi::new(vec![
            Ok(json!({ "data": records(0..100) })),
            Err(ApiError::Status { status: 404, body: String::new() }),
        ]);
        let fetcher = PageFetcher::new(&api, 100, fast_retry());

        let items: Vec<_> = fetcher.fetch("l").collect().await;

        assert_eq!(items.len(), 101);
        assert!(items[..100].iter().all(|r| r.is_ok()));
        assert!(items[100].is_err());
    }

    #[tokio::test]
    async fn test_auth_failure_is_not_retried() {
        let api = ScriptedListApi::new(vec![Err(ApiError::Status {
            status: 401,
            body: "expired".to_string(),
        })]);
        let fetcher = PageFetcher::new(&api, 100, fast_retry());

        let err = fetcher.fetch_all("l").await.unwrap_err();

        assert_eq!(err.attempts, 1);
        assert!(err.source.is_auth());
        assert_eq!(api.requests().len(), 1);
    }

    #[tokio::test]
    async fn test_body_without_records_is_fatal() {
        let api = ScriptedListApi::new(vec![Ok(json!({ "message": "ok" }))]);
        let fetcher = PageFetcher::new(&api, 100, fast_retry());

        let err = fetcher.fetch_all("l").await.unwrap_err();

        assert!(matches!(err.source, ApiError::Decode(_)));
    }

    #[tokio::test]
    async fn test_page_links_keep_page_mode() {
        let link = |n: u32| format!("https://api.example.com/lists/1/destinations?page={}&limit=2", n);
        let api = ScriptedListApi::new(vec![
            Ok(json!({ "data": records(0..2), "meta": { "page": 1, "limit": 2, "next": link(2) } })),
            Ok(json!({ "data": records(2..4), "meta": { "page": 2, "limit": 2, "next": link(3) } })),
            Ok(json!({ "data": records(4..5), "meta": { "page": 3, "limit": 2, "next": null } })),
        ]);
        let fetcher = PageFetcher::new(&api, 2, fast_retry());

        let all = fetcher.fetch_all("1").await.unwrap();

        assert_eq!(ids(&all), vec![0, 1, 2, 3, 4]);
        assert_eq!(
            api.requests(),
            vec![
                PageRequest::Page { page: 1, limit: 2 },
                PageRequest::Page { page: 2, limit: 2 },
                PageRequest::Page { page: 3, limit: 2 },
            ]
        );
    }

    #[tokio::test]
    async fn test_relative_next_link_with_page_number() {
        let api = ScriptedListApi::new(vec![
            Ok(json!({ "data": records(0..2), "next": "?page=2&limit=2" })),
            Ok(json!({ "data": records(2..3) })),
        ]);
        let fetcher = PageFetcher::new(&api, 2, fast_retry());

        let all = fetcher.fetch_all("1").await.unwrap();

        assert_eq!(all.len(), 3);
        assert_eq!(api.requests()[1], PageRequest::Page { page: 2, limit: 2 });
    }

    #[tokio::test]
    async fn test_declared_total_ends_the_walk() {
        let api = ScriptedListApi::new(vec![
            Ok(json!({ "data": records(0..2), "meta": { "destinationCount": 4 } })),
            Ok(json!({ "data": records(2..4), "meta": { "destinationCount": 4 } })),
            Ok(json!({ "data": records(100..102) })),
        ]);
        let fetcher = PageFetcher::new(&api, 2, fast_retry());

        let all = fetcher.fetch_all("1").await.unwrap();

        assert_eq!(ids(&all), vec![0, 1, 2, 3]);
        assert_eq!(api.requests().len(), 2);
    }

    #[tokio::test]
    async fn test_repeated_cursor_is_fatal() {
        let api = ScriptedListApi::new(vec![
            Ok(json!({ "data": records(0..2), "meta": { "next": "same" } })),
            Ok(json!({ "data": records(2..4), "meta": { "next": "same" } })),
            Ok(json!({ "data": records(4..6), "meta": { "next": "same" } })),
        ]);
        let fetcher = PageFetcher::new(&api, 2, fast_retry());

        let err = fetcher.fetch_all("1").await.unwrap_err();

        assert!(matches!(err.source, ApiError::Stalled(_)));
        assert!(err.to_string().contains("already visited"));
        assert_eq!(api.requests().len(), 2);
    }

    #[tokio::test]
    async fn test_vendor_ignoring_page_parameter_is_fatal() {
        let api = ScriptedListApi::new(vec![
            Ok(json!({ "data": records(0..2) })),
            Ok(json!({ "data": records(0..2) })),
            Ok(json!({ "data": records(0..2) })),
        ]);
        let fetcher = PageFetcher::new(&api, 2, fast_retry());

        let err = fetcher.fetch_all("1").await.unwrap_err();

        assert!(matches!(err.source, ApiError::Stalled(_)));
        assert!(err.request.contains("page 2"));
        assert_eq!(api.requests().len(), 2);
    }

    /// Always returns a full page of fresh records.
    struct EndlessListApi;

    #[async_trait]
    impl ListApi for EndlessListApi {
        async fn get_page(&self, _list_id: &str, request: &PageRequest) -> Result<Value, ApiError> {
            let PageRequest::Page { page, limit } = request else {
                unreachable!("endless fake is page indexed");
            };
            let start = ((page - 1) * limit) as usize;
            Ok(json!({ "data": records(start..start + *limit as usize) }))
        }

        async fn delete_batch(&self, _list_id: &str, _ids: &[String]) -> Result<(), ApiError> {
            unreachable!("pager never deletes")
        }
    }

    #[tokio::test]
    async fn test_page_cap_stops_an_endless_list() {
        let fetcher = PageFetcher::new(&EndlessListApi, 10, fast_retry()).with_max_pages(5);

        let err = tokio::time::timeout(Duration::from_secs(5), fetcher.fetch_all("1"))
            .await
            .expect("walk must terminate")
            .unwrap_err();

        assert!(matches!(err.source, ApiError::Stalled(_)));
        assert!(err.request.contains("page 6"));
    }

    #[test]
    fn test_backoff_doubles() {
        let policy = RetryPolicy::new(Duration::from_millis(100));
        assert_eq!(policy.delay_for(0), Duration::from_millis(100));
        assert_eq!(policy.delay_for(1), Duration::from_millis(200));
        assert_eq!(policy.delay_for(2), Duration::from_millis(400));
    }
}
