pub mod bucket;
pub mod cache;

use bucket::TokenBucket;
use cache::{cache_key, ResponseCache};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

const MAX_RETRIES: u32 = 3;
const INITIAL_BACKOFF: Duration = Duration::from_secs(1);
const MAX_BACKOFF: Duration = Duration::from_secs(30);
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Error, Debug)]
pub enum TransportError {
    /// Non-success response that is not retryable, or one that stayed
    /// broken through every retry. Carries status and payload.
    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("transport error: {0}")]
    Network(#[from] reqwest::Error),
}

pub type Result<T> = std::result::Result<T, TransportError>;

fn retryable_status(status: u16) -> bool {
    matches!(status, 429 | 500 | 502 | 503 | 504)
}

fn retryable_error(err: &reqwest::Error) -> bool {
    err.is_timeout() || err.is_connect() || err.is_body()
}

fn backoff_delay(attempt: u32) -> Duration {
    let base = INITIAL_BACKOFF.as_secs_f64() * 2f64.powi(attempt as i32);
    let jitter = rand::random::<f64>() * base * 0.5;
    Duration::from_secs_f64((base + jitter).min(MAX_BACKOFF.as_secs_f64()))
}

/// `Retry-After` accepts both integer seconds and an HTTP date. A date in
/// the past yields a zero wait.
fn parse_retry_after(value: &str) -> Option<Duration> {
    let value = value.trim();
    if let Ok(secs) = value.parse::<u64>() {
        return Some(Duration::from_secs(secs));
    }
    let when = chrono::DateTime::parse_from_rfc2822(value).ok()?;
    let delta = when.signed_duration_since(chrono::Utc::now());
    Some(delta.to_std().unwrap_or(Duration::ZERO))
}

fn is_llm_source(source: &str) -> bool {
    matches!(source, "openai" | "ollama")
}

#[derive(Debug, Clone, PartialEq)]
pub enum Body {
    Json(serde_json::Value),
    Text(String),
}

impl Body {
    fn to_cache_value(&self) -> serde_json::Value {
        match self {
            Body::Json(value) => value.clone(),
            Body::Text(text) => serde_json::Value::String(text.clone()),
        }
    }

    fn from_cache_value(value: serde_json::Value) -> Body {
        match value {
            serde_json::Value::String(text) => Body::Text(text),
            other => Body::Json(other),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Response {
    pub status: u16,
    pub headers: HashMap<String, String>,
    pub body: Body,
}

impl Response {
    pub fn json(&self) -> Option<&serde_json::Value> {
        match &self.body {
            Body::Json(value) => Some(value),
            Body::Text(_) => None,
        }
    }

    pub fn into_json(self) -> Result<serde_json::Value> {
        match self.body {
            Body::Json(value) => Ok(value),
            Body::Text(text) => Err(TransportError::Status {
                status: self.status,
                body: format!("expected JSON response, got: {}", truncated(&text)),
            }),
        }
    }
}

fn truncated(text: &str) -> String {
    let mut out: String = text.chars().take(200).collect();
    if text.chars().count() > 200 {
        out.push_str("...");
    }
    out
}

enum Method {
    Get,
    Post,
}

/// Process-wide HTTP transport: one token bucket and one request counter
/// per source key, retry with exponential backoff, and an optional
/// filesystem response cache consulted before anything goes on the wire.
pub struct Transport {
    client: reqwest::Client,
    buckets: Mutex<HashMap<String, TokenBucket>>,
    counters: Mutex<HashMap<String, u64>>,
    cache: Option<ResponseCache>,
    user_agent: String,
    timeout: Duration,
}

impl Transport {
    pub fn new(user_agent: String, cache: Option<ResponseCache>) -> Result<Self> {
        let client = reqwest::Client::builder().build()?;
        Ok(Transport {
            client,
            buckets: Mutex::new(HashMap::new()),
            counters: Mutex::new(HashMap::new()),
            cache,
            user_agent,
            timeout: DEFAULT_TIMEOUT,
        })
    }

    /// `PaperGraph/<version> (mailto:<email>)`, the form OpenAlex requires
    /// for its polite pool.
    pub fn user_agent_for(email: &str) -> String {
        format!(
            "PaperGraph/{} (mailto:{})",
            env!("CARGO_PKG_VERSION"),
            email
        )
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub async fn get(&self, source: &str, url: &str) -> Result<Response> {
        self.request(source, Method::Get, url, None, &[]).await
    }

    pub async fn get_with_headers(
        &self,
        source: &str,
        url: &str,
        headers: &[(&str, &str)],
    ) -> Result<Response> {
        self.request(source, Method::Get, url, None, headers).await
    }

    pub async fn post(
        &self,
        source: &str,
        url: &str,
        body: &serde_json::Value,
    ) -> Result<Response> {
        self.request(source, Method::Post, url, Some(body), &[]).await
    }

    pub async fn post_with_headers(
        &self,
        source: &str,
        url: &str,
        body: &serde_json::Value,
        headers: &[(&str, &str)],
    ) -> Result<Response> {
        self.request(source, Method::Post, url, Some(body), headers)
            .await
    }

    /// Outbound request count per source key, for the run summary.
    pub fn request_counts(&self) -> Vec<(String, u64)> {
        let counters = self.counters.lock().unwrap();
        let mut counts: Vec<(String, u64)> =
            counters.iter().map(|(k, v)| (k.clone(), *v)).collect();
        counts.sort();
        counts
    }

    async fn throttle(&self, source: &str) {
        let wait = {
            let mut buckets = self.buckets.lock().unwrap();
            buckets
                .entry(source.to_string())
                .or_insert_with(|| TokenBucket::for_source(source))
                .acquire()
        };
        if wait > Duration::ZERO {
            debug!("throttling {} for {:?}", source, wait);
            tokio::time::sleep(wait).await;
        }
    }

    fn count_request(&self, source: &str) {
        let mut counters = self.counters.lock().unwrap();
        *counters.entry(source.to_string()).or_insert(0) += 1;
    }

    async fn request(
        &self,
        source: &str,
        method: Method,
        url: &str,
        body: Option<&serde_json::Value>,
        headers: &[(&str, &str)],
    ) -> Result<Response> {
        let body_text = body.map(|b| b.to_string());
        let cacheable = self.cache.is_some() && !is_llm_source(source);
        let key = cache_key(url, body_text.as_deref());

        if cacheable {
            if let Some(cache) = &self.cache {
                if let Some(data) = cache.get(&key) {
                    debug!("cache hit for {}", url);
                    return Ok(Response {
                        status: 200,
                        headers: HashMap::new(),
                        body: Body::from_cache_value(data),
                    });
                }
            }
        }

        let mut attempt = 0u32;
        loop {
            self.throttle(source).await;
            self.count_request(source);

            let mut builder = match method {
                Method::Get => self.client.get(url),
                Method::Post => self.client.post(url).json(body.unwrap_or(&serde_json::Value::Null)),
            }
            .header(reqwest::header::USER_AGENT, &self.user_agent)
            .timeout(self.timeout);
            for (name, value) in headers {
                builder = builder.header(*name, *value);
            }

            match builder.send().await {
                Ok(resp) => {
                    let status = resp.status().as_u16();
                    let headers = collect_headers(resp.headers());

                    if resp.status().is_success() {
                        let response_body = decode_body(resp, &headers).await?;
                        if cacheable {
                            if let Some(cache) = &self.cache {
                                if let Err(err) =
                                    cache.put(&key, url, &response_body.to_cache_value())
                                {
                                    warn!("failed to cache response for {}: {}", url, err);
                                }
                            }
                        }
                        return Ok(Response {
                            status,
                            headers,
                            body: response_body,
                        });
                    }

                    if retryable_status(status) && attempt < MAX_RETRIES {
                        let delay = match headers.get("retry-after") {
                            Some(value) if status == 429 => parse_retry_after(value)
                                .unwrap_or_else(|| backoff_delay(attempt)),
                            _ => backoff_delay(attempt),
                        };
                        debug!(
                            "HTTP {} from {}, retrying in {:?} (attempt {}/{})",
                            status,
                            source,
                            delay,
                            attempt + 1,
                            MAX_RETRIES
                        );
                        tokio::time::sleep(delay).await;
                        attempt += 1;
                        continue;
                    }

                    let payload = resp.text().await.unwrap_or_default();
                    return Err(TransportError::Status {
                        status,
                        body: truncated(&payload),
                    });
                }
                Err(err) => {
                    if retryable_error(&err) && attempt < MAX_RETRIES {
                        let delay = backoff_delay(attempt);
                        debug!(
                            "transport error from {} ({}), retrying in {:?}",
                            source, err, delay
                        );
                        tokio::time::sleep(delay).await;
                        attempt += 1;
                        continue;
                    }
                    return Err(TransportError::Network(err));
                }
            }
        }
    }
}

fn collect_headers(headers: &reqwest::header::HeaderMap) -> HashMap<String, String> {
    headers
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (name.as_str().to_lowercase(), v.to_string()))
        })
        .collect()
}

async fn decode_body(resp: reqwest::Response, headers: &HashMap<String, String>) -> Result<Body> {
    let is_json = headers
        .get("content-type")
        .map(|ct| ct.contains("json"))
        .unwrap_or(false);
    if is_json {
        Ok(Body::Json(resp.json().await?))
    } else {
        Ok(Body::Text(resp.text().await?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_classification() {
        for status in [429, 500, 502, 503, 504] {
            assert!(retryable_status(status), "{} should retry", status);
        }
        for status in [400, 401, 403, 404, 422] {
            assert!(!retryable_status(status), "{} should not retry", status);
        }
    }

    #[test]
    fn backoff_grows_and_stays_bounded() {
        for attempt in 0..6 {
            let base = 2f64.powi(attempt as i32);
            let delay = backoff_delay(attempt).as_secs_f64();
            assert!(delay >= base.min(30.0) - 1e-9, "attempt {}: {}", attempt, delay);
            assert!(delay <= (base * 1.5).min(30.0) + 1e-9, "attempt {}: {}", attempt, delay);
        }
    }

    #[test]
    fn retry_after_integer_seconds() {
        assert_eq!(parse_retry_after("3"), Some(Duration::from_secs(3)));
        assert_eq!(parse_retry_after(" 10 "), Some(Duration::from_secs(10)));
    }

    #[test]
    fn retry_after_http_date() {
        let future = chrono::Utc::now() + chrono::Duration::seconds(60);
        let wait = parse_retry_after(&future.to_rfc2822()).unwrap();
        assert!(wait > Duration::from_secs(55));
        assert!(wait <= Duration::from_secs(61));

        let past = chrono::Utc::now() - chrono::Duration::seconds(60);
        assert_eq!(parse_retry_after(&past.to_rfc2822()), Some(Duration::ZERO));

        assert_eq!(parse_retry_after("not a date"), None);
    }

    #[test]
    fn llm_sources_skip_the_cache() {
        assert!(is_llm_source("openai"));
        assert!(is_llm_source("ollama"));
        assert!(!is_llm_source("openalex"));
        assert!(!is_llm_source("s2"));
    }

    #[test]
    fn cached_text_round_trips() {
        let body = Body::Text("plain".to_string());
        assert_eq!(Body::from_cache_value(body.to_cache_value()), body);
        let json = Body::Json(serde_json::json!({"a": 1}));
        assert_eq!(Body::from_cache_value(json.to_cache_value()), json);
    }
}
