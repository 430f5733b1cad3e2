//! Upstream forwarding.
//!
//! # Responsibilities
//! - Build the upstream call from a captured request
//! - Issue it over the shared connection pool
//! - Measure wall-clock time until the full body is received
//! - Classify transport failures
//!
//! # Design Decisions
//! - One `reqwest::Client` per process, injected at construction
//! - Failures are values (`ForwardFailure`), never a fabricated 5xx reply
//! - No retries: each call is attempted exactly once

use axum::http::{header, HeaderMap, Method, StatusCode};
use serde_json::Value;
use std::error::Error as _;
use std::fmt;
use std::time::{Duration, Instant};

use crate::config::schema::UpstreamConfig;
use crate::forward::headers::forwardable_headers;
use crate::forward::path::upstream_url;

/// The parts of a captured request needed to forward it.
#[derive(Debug, Clone, Copy)]
pub struct ForwardRequest<'a> {
    pub method: &'a Method,
    /// Inbound target (path plus optional query), before translation.
    pub target: &'a str,
    pub headers: &'a HeaderMap,
    pub body: Option<&'a str>,
}

/// A complete upstream reply.
#[derive(Debug, Clone)]
pub struct UpstreamReply {
    pub status: StatusCode,
    /// Decoded body text exactly as received.
    pub body: String,
    /// The body parsed as JSON, `None` when the body is empty.
    pub data: Option<Value>,
    pub elapsed_ms: u64,
}

/// Why an upstream call did not produce a usable reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Could not connect (refused, DNS, unreachable).
    Connect,
    /// The configured upstream timeout elapsed.
    Timeout,
    /// The HTTP exchange itself failed.
    Protocol,
    /// Headers arrived but the body could not be read.
    Body,
    /// The body was not valid JSON.
    Decode,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::Connect => "connect",
            FailureKind::Timeout => "timeout",
            FailureKind::Protocol => "protocol",
            FailureKind::Body => "body",
            FailureKind::Decode => "decode",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A failed forwarding attempt.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{kind} failure: {message}")]
pub struct ForwardFailure {
    pub kind: FailureKind,
    pub message: String,
    pub elapsed_ms: u64,
    /// Upstream status, when the failure happened after headers arrived.
    pub upstream_status: Option<StatusCode>,
    /// Raw upstream body, kept for `Decode` failures.
    pub upstream_body: Option<String>,
}

impl ForwardFailure {
    fn transport(err: &reqwest::Error, elapsed_ms: u64) -> Self {
        let kind = if err.is_timeout() {
            FailureKind::Timeout
        } else if err.is_connect() {
            FailureKind::Connect
        } else if err.is_body() || err.is_decode() {
            FailureKind::Body
        } else {
            FailureKind::Protocol
        };

        Self {
            kind,
            message: error_chain(err),
            elapsed_ms,
            upstream_status: err.status(),
            upstream_body: None,
        }
    }
}

/// Render an error with all of its sources, outermost first.
fn error_chain(err: &reqwest::Error) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}

/// Build the shared upstream client from configuration.
///
/// Gzip, deflate and brotli responses are decoded by the client.
pub fn build_client(config: &UpstreamConfig) -> reqwest::Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(config.timeout_secs))
        .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
        .pool_idle_timeout(Duration::from_secs(config.pool_idle_timeout_secs))
        .pool_max_idle_per_host(config.pool_max_idle_per_host)
        .gzip(true)
        .deflate(true)
        .brotli(true)
        .build()
}

/// Forwards captured requests to the real system.
#[derive(Clone)]
pub struct ForwardingEngine {
    client: reqwest::Client,
    base_url: String,
}

impl ForwardingEngine {
    /// Create an engine over an existing client.
    pub fn new(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
        }
    }

    /// Build the client from configuration and wrap it.
    pub fn from_config(config: &UpstreamConfig) -> reqwest::Result<Self> {
        Ok(Self::new(build_client(config)?, config.base_url.clone()))
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Issue the upstream call and wait for the complete body.
    pub async fn forward(&self, request: ForwardRequest<'_>) -> Result<UpstreamReply, ForwardFailure> {
        let url = upstream_url(&self.base_url, request.target);
        tracing::debug!(method = %request.method, url = %url, "Forwarding upstream");

        let mut builder = self
            .client
            .request(request.method.clone(), &url)
            .headers(forwardable_headers(request.headers));

        if let Some(body) = request.body.filter(|b| !b.is_empty()) {
            builder = builder
                .header(header::CONTENT_TYPE, "application/json; charset=utf-8")
                .body(body.to_owned());
        }

        let started = Instant::now();
        let response = match builder.send().await {
            Ok(response) => response,
            Err(e) => return Err(ForwardFailure::transport(&e, elapsed_ms(started))),
        };

        let status = response.status();
        let body = match response.text().await {
            Ok(body) => body,
            Err(e) => {
                let mut failure = ForwardFailure::transport(&e, elapsed_ms(started));
                failure.upstream_status = Some(status);
                return Err(failure);
            }
        };
        let elapsed = elapsed_ms(started);

        let data = if body.is_empty() {
            None
        } else {
            match serde_json::from_str::<Value>(&body) {
                Ok(value) => Some(value),
                Err(e) => {
                    return Err(ForwardFailure {
                        kind: FailureKind::Decode,
                        message: format!("upstream body is not valid JSON: {e}"),
                        elapsed_ms: elapsed,
                        upstream_status: Some(status),
                        upstream_body: Some(body),
                    });
                }
            }
        };

        Ok(UpstreamReply {
            status,
            body,
            data,
            elapsed_ms: elapsed,
        })
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Serve one canned HTTP response per connection; returns the base URL.
    async fn canned_upstream(status_line: &'static str, body: &'static str, delay_ms: u64) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            while let Ok((mut socket, _)) = listener.accept().await {
                tokio::spawn(async move {
                    let mut buf = vec![0u8; 8192];
                    let _ = socket.read(&mut buf).await;
                    tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                    let response = format!(
                        "HTTP/1.1 {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                        status_line,
                        body.len(),
                        body
                    );
                    let _ = socket.write_all(response.as_bytes()).await;
                    let _ = socket.shutdown().await;
                });
            }
        });
        format!("http://{addr}")
    }

    fn engine(base: String, timeout_secs: u64) -> ForwardingEngine {
        let config = UpstreamConfig {
            base_url: base,
            timeout_secs,
            ..UpstreamConfig::default()
        };
        ForwardingEngine::from_config(&config).unwrap()
    }

    fn get<'a>(target: &'a str, headers: &'a HeaderMap) -> ForwardRequest<'a> {
        ForwardRequest {
            method: &Method::GET,
            target,
            headers,
            body: None,
        }
    }

    #[tokio::test]
    async fn test_success_parses_json_and_times_call() {
        let base = canned_upstream("200 OK", r#"{"name":"a"}"#, 40).await;
        let headers = HeaderMap::new();

        let reply = engine(base, 5).forward(get("/user-profile", &headers)).await.unwrap();

        assert_eq!(reply.status, StatusCode::OK);
        assert_eq!(reply.data, Some(serde_json::json!({"name": "a"})));
        assert!(reply.elapsed_ms >= 40, "elapsed {}", reply.elapsed_ms);
    }

    #[tokio::test]
    async fn test_upstream_5xx_is_a_reply_not_a_failure() {
        let base = canned_upstream("503 Service Unavailable", r#"{"down":true}"#, 0).await;
        let headers = HeaderMap::new();

        let reply = engine(base, 5).forward(get("/x", &headers)).await.unwrap();
        assert_eq!(reply.status, StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_empty_body_has_no_data() {
        let base = canned_upstream("200 OK", "", 0).await;
        let headers = HeaderMap::new();

        let reply = engine(base, 5).forward(get("/x", &headers)).await.unwrap();
        assert!(reply.data.is_none());
        assert!(reply.body.is_empty());
    }

    #[tokio::test]
    async fn test_non_json_body_is_decode_failure() {
        let base = canned_upstream("200 OK", "<html>hi</html>", 0).await;
        let headers = HeaderMap::new();

        let failure = engine(base, 5).forward(get("/x", &headers)).await.unwrap_err();
        assert_eq!(failure.kind, FailureKind::Decode);
        assert_eq!(failure.upstream_status, Some(StatusCode::OK));
        assert_eq!(failure.upstream_body.as_deref(), Some("<html>hi</html>"));
    }

    #[tokio::test]
    async fn test_connection_refused_is_connect_failure() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        let headers = HeaderMap::new();

        let failure = engine(format!("http://{addr}"), 5)
            .forward(get("/x", &headers))
            .await
            .unwrap_err();
        assert_eq!(failure.kind, FailureKind::Connect);
        assert!(failure.upstream_status.is_none());
    }

    #[tokio::test]
    async fn test_slow_upstream_times_out() {
        let base = canned_upstream("200 OK", "{}", 3_000).await;
        let headers = HeaderMap::new();

        let failure = engine(base, 1).forward(get("/slow", &headers)).await.unwrap_err();
        assert_eq!(failure.kind, FailureKind::Timeout);
    }
}
