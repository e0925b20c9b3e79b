use crate::models::MediaKind;
use async_trait::async_trait;
use reqwest::Url;
use serde::Serialize;
use tracing::{error, info};

pub const EVENT_REQUEST_COMPLETE: &str = "request_complete";
pub const EVENT_REQUEST_FAILED: &str = "request_failed";

const MAX_ERROR_LEN: usize = 500;

/// Minimal, non-sensitive completion payload.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct RequestCompleted {
    pub backend: &'static str,
    pub media_type: String,
    pub query: String,
    pub tmdb_id: Option<i64>,
    /// The id field of the upstream response, when one was returned.
    pub request_id: Option<i64>,
    /// Overseerr only.
    pub media_id: Option<i64>,
    /// Overseerr only.
    pub status: Option<i64>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct RequestFailed {
    pub backend: &'static str,
    pub media_type: String,
    pub query: String,
    /// Scrubbed: URLs reduced to host:port, truncated.
    pub error: String,
}

/// Seam standing in for the host's event bus.
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn request_complete(&self, event: RequestCompleted);
    async fn request_failed(&self, event: RequestFailed);
}

/// Default sink: structured log lines.
pub struct LogSink;

#[async_trait]
impl EventSink for LogSink {
    async fn request_complete(&self, event: RequestCompleted) {
        info!(
            event = EVENT_REQUEST_COMPLETE,
            backend = event.backend,
            media_type = %event.media_type,
            query = %event.query,
            tmdb_id = ?event.tmdb_id,
            request_id = ?event.request_id,
            "request complete"
        );
    }

    async fn request_failed(&self, event: RequestFailed) {
        error!(
            event = EVENT_REQUEST_FAILED,
            backend = event.backend,
            media_type = %event.media_type,
            query = %event.query,
            error = %event.error,
            "request failed"
        );
    }
}

pub fn failure_event(
    backend: &'static str,
    kind: MediaKind,
    query: &str,
    message: &str,
) -> RequestFailed {
    RequestFailed {
        backend,
        media_type: kind.as_str().to_string(),
        query: query.to_string(),
        error: scrub_message(message),
    }
}

/// Reduce any embedded URL to host:port and cap the overall length, so
/// credentials and internal paths never reach the event payload.
pub fn scrub_message(message: &str) -> String {
    let mut out = String::with_capacity(message.len());
    let mut first = true;
    for token in message.split(' ') {
        if !first {
            out.push(' ');
        }
        first = false;
        out.push_str(&scrub_token(token));
    }
    if out.chars().count() > MAX_ERROR_LEN {
        out = out.chars().take(MAX_ERROR_LEN).collect();
    }
    out
}

fn scrub_token(token: &str) -> String {
    let start = match token.find("https://").or_else(|| token.find("http://")) {
        Some(idx) => idx,
        None => return token.to_string(),
    };
    let Ok(url) = Url::parse(&token[start..]) else {
        return token.to_string();
    };
    let Some(host) = url.host_str() else {
        return token.to_string();
    };
    let reduced = match url.port() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_string(),
    };
    format!("{}{}", &token[..start], reduced)
}
