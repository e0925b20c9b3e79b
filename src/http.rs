use crate::error::{RequestError, Result};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, CONTENT_TYPE};
use reqwest::{Client, Method, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15);
const USER_AGENT: &str = concat!("fetcharr/", env!("CARGO_PKG_VERSION"));
const MAX_ERROR_BODY: usize = 300;

/// Total attempts per logical call: the first try plus two retries.
const MAX_ATTEMPTS: u32 = 3;

fn retryable(status: StatusCode) -> bool {
    matches!(status.as_u16(), 502 | 503 | 504)
}

/// Response body, parsed as JSON when the upstream says it is JSON.
#[derive(Debug)]
pub enum ApiBody {
    Json(Value),
    Text(String),
}

impl ApiBody {
    pub fn into_json(self) -> Result<Value> {
        match self {
            ApiBody::Json(v) => Ok(v),
            ApiBody::Text(t) => Err(RequestError::transport(format!(
                "expected JSON response, got: {}",
                truncate(&t, MAX_ERROR_BODY)
            ))),
        }
    }
}

/// JSON-over-HTTP executor with a fixed base URL and static API key.
///
/// One pooled client per configured backend instance; callers share it
/// across requests rather than constructing per call.
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: Client,
    base: Url,
}

impl HttpClient {
    pub fn new(base_url: &str, api_key: &str) -> Result<Self> {
        let mut base = Url::parse(base_url.trim_end_matches('/'))
            .map_err(|e| RequestError::Validation(format!("invalid base url: {e}")))?;
        // A trailing slash keeps Url::join from discarding a path prefix on
        // bases like "http://host/overseerr".
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }

        let mut headers = HeaderMap::new();
        let key = HeaderValue::from_str(api_key.trim())
            .map_err(|_| RequestError::Validation("API key contains invalid characters".into()))?;
        headers.insert("X-Api-Key", key);
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let client = Client::builder()
            .default_headers(headers)
            .user_agent(USER_AGENT)
            .timeout(DEFAULT_TIMEOUT)
            .build()
            .map_err(|e| RequestError::transport(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { client, base })
    }

    /// Execute one logical call. Retries up to two extra times on 502/503/504
    /// or transport errors, with linear backoff (0.5s * attempt number); any
    /// other non-2xx status fails immediately.
    pub async fn execute(&self, method: Method, path: &str, body: Option<&Value>) -> Result<ApiBody> {
        let url = self.join(path)?;
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            let mut req = self.client.request(method.clone(), url.clone());
            if let Some(json) = body {
                req = req.json(json);
            }

            match req.send().await {
                Ok(resp) => {
                    let status = resp.status();
                    if status.as_u16() >= 400 {
                        let text = resp.text().await.unwrap_or_default();
                        if attempt < MAX_ATTEMPTS && retryable(status) {
                            debug!(
                                "{} {} -> {}, retry {}/{}",
                                method,
                                url,
                                status,
                                attempt,
                                MAX_ATTEMPTS - 1
                            );
                            tokio::time::sleep(backoff(attempt)).await;
                            continue;
                        }
                        return Err(RequestError::upstream(
                            status.as_u16(),
                            format!("{} {} -> {}: {}", method, url, status.as_u16(), truncate(&text, MAX_ERROR_BODY)),
                        ));
                    }

                    let is_json = resp
                        .headers()
                        .get(CONTENT_TYPE)
                        .and_then(|v| v.to_str().ok())
                        .map(|v| v.contains("application/json"))
                        .unwrap_or(false);
                    let text = resp
                        .text()
                        .await
                        .map_err(|e| RequestError::transport(format!("reading body failed: {e}")))?;
                    if is_json {
                        let value = serde_json::from_str(&text).map_err(|e| {
                            RequestError::transport(format!("JSON parse failed: {e}"))
                        })?;
                        return Ok(ApiBody::Json(value));
                    }
                    return Ok(ApiBody::Text(text));
                }
                Err(e) => {
                    if attempt < MAX_ATTEMPTS && (e.is_timeout() || e.is_connect() || e.is_request()) {
                        debug!(
                            "transient error on {} {} ({}), retry {}/{}",
                            method,
                            url,
                            e,
                            attempt,
                            MAX_ATTEMPTS - 1
                        );
                        tokio::time::sleep(backoff(attempt)).await;
                        continue;
                    }
                    return Err(RequestError::transport(format!("{} {} failure: {}", method, url, e)));
                }
            }
        }
    }

    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let value = self.execute(Method::GET, path, None).await?.into_json()?;
        serde_json::from_value(value)
            .map_err(|e| RequestError::transport(format!("unexpected response shape: {e}")))
    }

    pub async fn get_value(&self, path: &str) -> Result<Value> {
        self.execute(Method::GET, path, None).await?.into_json()
    }

    pub async fn post_value(&self, path: &str, body: &Value) -> Result<Value> {
        self.execute(Method::POST, path, Some(body)).await?.into_json()
    }

    fn join(&self, path: &str) -> Result<Url> {
        self.base
            .join(path.trim_start_matches('/'))
            .map_err(|e| RequestError::Validation(format!("invalid request path '{path}': {e}")))
    }
}

fn backoff(attempt: u32) -> Duration {
    Duration::from_millis(500 * u64::from(attempt))
}

pub fn truncate(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_is_linear_in_attempt_number() {
        assert_eq!(backoff(1), Duration::from_millis(500));
        assert_eq!(backoff(2), Duration::from_millis(1000));
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate("abcdef", 3), "abc");
        assert_eq!(truncate("ab", 3), "ab");
        assert_eq!(truncate("héllo wörld", 5), "héllo");
    }

    #[test]
    fn retryable_statuses_are_bad_gateway_family() {
        assert!(retryable(StatusCode::BAD_GATEWAY));
        assert!(retryable(StatusCode::SERVICE_UNAVAILABLE));
        assert!(retryable(StatusCode::GATEWAY_TIMEOUT));
        assert!(!retryable(StatusCode::NOT_FOUND));
        assert!(!retryable(StatusCode::INTERNAL_SERVER_ERROR));
    }
}
