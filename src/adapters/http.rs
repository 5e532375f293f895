use crate::config::SourceConfig;
use crate::core::{FetchWindow, Record, RecordSource};
use crate::utils::error::FetchError;
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, USER_AGENT};
use reqwest::{Client, StatusCode};
use serde_json::Value;
use std::time::Duration;
use url::Url;

pub const USER_AGENT_VALUE: &str = concat!("daily-etl/", env!("CARGO_PKG_VERSION"));

const ERROR_BODY_SNIPPET: usize = 200;

/// Bounded attempts with a fixed pause in between; no backoff, no jitter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay,
        }
    }

    pub fn immediate(max_attempts: u32) -> Self {
        Self::new(max_attempts, Duration::ZERO)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_secs(2))
    }
}

enum Page {
    /// Bare JSON array body.
    Items(Vec<Record>),
    /// `{ "data": [...], "next": ... }` body.
    Linked {
        records: Vec<Record>,
        next: Option<String>,
    },
}

/// Authenticated GET client for one remote source.
pub struct ApiClient {
    name: String,
    config: SourceConfig,
    base_url: Url,
    policy: RetryPolicy,
    headers: HeaderMap,
    client: Client,
}

impl ApiClient {
    pub fn new(
        name: impl Into<String>,
        config: SourceConfig,
        policy: RetryPolicy,
    ) -> Result<Self, FetchError> {
        let base_url = Url::parse(&config.base_url).map_err(|e| FetchError::InvalidUrl {
            url: config.base_url.clone(),
            reason: e.to_string(),
        })?;
        let headers = build_headers(&config.token)?;
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(FetchError::Client)?;

        Ok(Self {
            name: name.into(),
            config,
            base_url,
            policy,
            headers,
            client,
        })
    }

    fn page_params(&self, window: Option<&FetchWindow>, page: usize) -> Vec<(String, String)> {
        let mut params: Vec<(String, String)> = window
            .map(|w| {
                w.query_params()
                    .into_iter()
                    .map(|(k, v)| (k.to_string(), v))
                    .collect()
            })
            .unwrap_or_default();

        if let Some(page_size) = self.config.page_size {
            params.push(("page".to_string(), page.to_string()));
            params.push(("pageSize".to_string(), page_size.to_string()));
        }
        params
    }

    async fn fetch_all(&self, window: Option<&FetchWindow>) -> Result<Vec<Record>, FetchError> {
        let mut records = Vec::new();
        let mut url = self.base_url.clone();
        let mut page_number = 1;
        let mut params = self.page_params(window, page_number);

        for _ in 0..self.config.max_pages {
            match self.fetch_page(&url, &params).await? {
                Page::Items(items) => {
                    let exhausted = items.is_empty();
                    tracing::debug!("📡 [{}] page {} → {} records", self.name, page_number, items.len());
                    records.extend(items);

                    // Without a page size the array is the whole result.
                    if exhausted || self.config.page_size.is_none() {
                        return Ok(records);
                    }
                    page_number += 1;
                    params = self.page_params(window, page_number);
                }
                Page::Linked { records: items, next } => {
                    tracing::debug!("📡 [{}] {} → {} records", self.name, url, items.len());
                    records.extend(items);

                    let Some(next) = next else {
                        return Ok(records);
                    };
                    url = url.join(&next).map_err(|e| FetchError::InvalidUrl {
                        url: next.clone(),
                        reason: e.to_string(),
                    })?;
                    // The server-supplied link already carries its own query.
                    params.clear();
                }
            }
        }

        Err(FetchError::PageLimit {
            url: self.base_url.to_string(),
            limit: self.config.max_pages,
        })
    }

    /// Same request until it succeeds, fails for good, or attempts run out.
    async fn fetch_page(&self, url: &Url, params: &[(String, String)]) -> Result<Page, FetchError> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.send_once(url, params).await {
                Ok(page) => return Ok(page),
                Err(err) if err.is_retryable() => {
                    if attempt >= self.policy.max_attempts {
                        return Err(FetchError::RetriesExhausted {
                            url: url.to_string(),
                            attempts: attempt,
                            last_error: err.to_string(),
                        });
                    }
                    tracing::warn!(
                        "⚠️ [{}] attempt {}/{} failed: {}. Retrying in {:?}",
                        self.name,
                        attempt,
                        self.policy.max_attempts,
                        err,
                        self.policy.delay
                    );
                    tokio::time::sleep(self.policy.delay).await;
                }
                Err(err) => return Err(err),
            }
        }
    }

    async fn send_once(&self, url: &Url, params: &[(String, String)]) -> Result<Page, FetchError> {
        let mut request = self.client.get(url.clone()).headers(self.headers.clone());
        if !params.is_empty() {
            request = request.query(params);
        }

        let response = request.send().await.map_err(|source| FetchError::Network {
            url: url.to_string(),
            source,
        })?;

        let status = response.status();
        if status != StatusCode::OK {
            let body = response.text().await.unwrap_or_default();
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
                body: snippet(&body),
            });
        }

        let bytes = response.bytes().await.map_err(|source| FetchError::Network {
            url: url.to_string(),
            source,
        })?;
        let body: Value = serde_json::from_slice(&bytes).map_err(|source| FetchError::Parse {
            url: url.to_string(),
            source,
        })?;

        self.parse_page(url, body)
    }

    fn parse_page(&self, url: &Url, body: Value) -> Result<Page, FetchError> {
        match body {
            Value::Array(items) => Ok(Page::Items(self.collect_records(items))),
            Value::Object(mut obj) => {
                let items = match obj.remove("data") {
                    Some(Value::Array(items)) => items,
                    Some(_) => return Err(unexpected(url, "`data` is not an array")),
                    None => return Err(unexpected(url, "object body without a `data` array")),
                };
                let next = match obj.remove("next") {
                    None | Some(Value::Null) => None,
                    Some(Value::String(link)) if link.trim().is_empty() => None,
                    Some(Value::String(link)) => Some(link),
                    Some(_) => return Err(unexpected(url, "`next` must be a string or null")),
                };
                Ok(Page::Linked {
                    records: self.collect_records(items),
                    next,
                })
            }
            _ => Err(unexpected(url, "expected a JSON array or object")),
        }
    }

    fn collect_records(&self, items: Vec<Value>) -> Vec<Record> {
        let total = items.len();
        let records: Vec<Record> = items
            .into_iter()
            .filter_map(|item| match item {
                Value::Object(obj) => Some(Record::from_object(obj)),
                _ => None,
            })
            .collect();

        if records.len() < total {
            tracing::warn!(
                "⚠️ [{}] skipped {} non-object items in page",
                self.name,
                total - records.len()
            );
        }
        records
    }
}

#[async_trait]
impl RecordSource for ApiClient {
    async fn fetch(&self, window: Option<&FetchWindow>) -> Result<Vec<Record>, FetchError> {
        match window {
            Some(w) => tracing::info!("📡 [{}] Fetching {} for {}", self.name, self.base_url, w),
            None => tracing::info!("📡 [{}] Fetching {}", self.name, self.base_url),
        }
        self.fetch_all(window).await
    }

    fn endpoint(&self) -> &str {
        self.base_url.as_str()
    }
}

fn build_headers(token: &str) -> Result<HeaderMap, FetchError> {
    let mut auth = HeaderValue::from_str(&format!("Bearer {}", token))
        .map_err(|_| FetchError::InvalidHeader {
            header: "Authorization",
        })?;
    auth.set_sensitive(true);

    let mut headers = HeaderMap::new();
    headers.insert(AUTHORIZATION, auth);
    headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
    headers.insert(USER_AGENT, HeaderValue::from_static(USER_AGENT_VALUE));
    Ok(headers)
}

fn unexpected(url: &Url, detail: &str) -> FetchError {
    FetchError::UnexpectedShape {
        url: url.to_string(),
        detail: detail.to_string(),
    }
}

fn snippet(body: &str) -> String {
    match body.char_indices().nth(ERROR_BODY_SNIPPET) {
        Some((idx, _)) => format!("{}…", &body[..idx]),
        None => body.to_string(),
    }
}
