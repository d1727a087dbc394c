//! HTTP adapter usable as a route or as a dead-letter destination.
//!
//! Posts the event payload to a fixed URL. Any 2xx answer is a success and
//! its body becomes the result payload; every other status and every
//! transport failure is a [`RouteError`].

use std::time::{Duration, Instant};

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{
    header::{HeaderName, HeaderValue},
    Url,
};
use serde::{Deserialize, Serialize};
use steadfast_core::Event;
use tracing::{debug, info_span, warn, Instrument};

use crate::{
    error::{Result, RouterError},
    route::{DeadLetterDestination, Route, RouteError},
};

const MAX_ERROR_BODY_SIZE: usize = 1024;

/// Header carrying the event id.
pub const EVENT_ID_HEADER: &str = "X-Steadfast-Event-Id";

/// Header carrying the correlation id.
pub const CORRELATION_ID_HEADER: &str = "X-Steadfast-Correlation-Id";

/// Configuration for [`HttpDestination`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Per-request timeout.
    pub timeout: Duration,
    /// User agent sent with every request.
    pub user_agent: String,
    /// Maximum redirects to follow.
    pub max_redirects: usize,
    /// Content type of the posted payload.
    pub content_type: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            user_agent: concat!("steadfast/", env!("CARGO_PKG_VERSION")).to_string(),
            max_redirects: 3,
            content_type: "application/octet-stream".to_string(),
        }
    }
}

/// Posts events to an HTTP endpoint.
#[derive(Debug, Clone)]
pub struct HttpDestination {
    client: reqwest::Client,
    url: Url,
    config: ClientConfig,
}

impl HttpDestination {
    /// Creates a destination posting to `url`.
    pub fn new(url: &str, config: ClientConfig) -> Result<Self> {
        let url = Url::parse(url)
            .map_err(|e| RouterError::configuration(format!("invalid destination URL {url}: {e}")))?;

        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(&config.user_agent)
            .redirect(reqwest::redirect::Policy::limited(config.max_redirects))
            .build()
            .map_err(|e| RouterError::configuration(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { client, url, config })
    }

    /// Creates a destination with the default client configuration.
    pub fn with_defaults(url: &str) -> Result<Self> {
        Self::new(url, ClientConfig::default())
    }

    /// Target URL.
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Posts `event` and returns the response body of a 2xx answer.
    async fn post(&self, event: &Event) -> std::result::Result<Bytes, RouteError> {
        let started = Instant::now();
        let span = info_span!(
            "http_delivery",
            event_id = %event.id(),
            correlation_id = %event.correlation_id(),
            url = %self.url,
        );

        async move {
            let mut request = self
                .client
                .post(self.url.clone())
                .header(reqwest::header::CONTENT_TYPE, &self.config.content_type)
                .body(event.payload().clone());

            for (name, value) in event.attributes() {
                if is_managed_header(name) {
                    continue;
                }
                match (HeaderName::from_bytes(name.as_bytes()), HeaderValue::from_str(value)) {
                    (Ok(name), Ok(value)) => request = request.header(name, value),
                    _ => debug!(attribute = %name, "attribute is not a valid header, not forwarded"),
                }
            }

            let response = request
                .header(EVENT_ID_HEADER, event.id().to_string())
                .header(CORRELATION_ID_HEADER, event.correlation_id().as_str())
                .send()
                .await
                .map_err(|e| {
                    warn!(error = %e, "request failed");
                    if e.is_timeout() {
                        RouteError::timeout(self.config.timeout.as_secs())
                    } else {
                        RouteError::unreachable(e.to_string())
                    }
                })?;

            let status = response.status();
            let body = response.bytes().await.map_err(|e| {
                RouteError::unreachable(format!("failed to read response body: {e}"))
            })?;
            let duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
            debug!(status = status.as_u16(), duration_ms, "received response");

            if status.is_success() {
                Ok(body)
            } else {
                let shown = &body[..body.len().min(MAX_ERROR_BODY_SIZE)];
                Err(RouteError::rejected(status.as_u16(), String::from_utf8_lossy(shown)))
            }
        }
        .instrument(span)
        .await
    }
}

#[async_trait]
impl Route for HttpDestination {
    async fn invoke(&self, event: Event) -> std::result::Result<Event, RouteError> {
        let body = self.post(&event).await?;
        Ok(event.with_payload(body))
    }
}

#[async_trait]
impl DeadLetterDestination for HttpDestination {
    async fn deliver(&self, event: Event) -> std::result::Result<(), RouteError> {
        self.post(&event).await.map(|_| ())
    }
}

/// Headers the HTTP client sets itself and attributes must not override.
fn is_managed_header(name: &str) -> bool {
    let lowercase = name.to_ascii_lowercase();
    matches!(
        lowercase.as_str(),
        "content-length"
            | "content-type"
            | "host"
            | "user-agent"
            | "connection"
            | "keep-alive"
            | "proxy-authorization"
            | "te"
            | "trailer"
            | "transfer-encoding"
            | "upgrade"
    ) || lowercase.starts_with("x-steadfast-")
}
