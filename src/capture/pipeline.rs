//! Capture, forward, correlate.
//!
//! # Flow per call
//! ```text
//! InboundCall
//!     → store.insert_request       (fatal on error: nothing to correlate with)
//!     → CorrelationContext::open   (holds the returned id)
//!     → engine.forward             (may fail; failure is a value)
//!     → ctx.close                  (response record for the held id)
//!     → store.insert_response      (logged on error, reply still returned)
//!     → ProxyOutcome
//! ```

use axum::http::{HeaderMap, Method, StatusCode};
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::Instrument;

use crate::capture::correlation::CorrelationContext;
use crate::forward::headers::serialize_headers;
use crate::forward::{ForwardFailure, ForwardRequest, ForwardingEngine};
use crate::observability::metrics;
use crate::store::{
    AuditStore, CapturedRequest, NewRequest, NewResponse, RequestId, StoreError,
};

/// An inbound call as received by the proxy surface.
#[derive(Debug, Clone)]
pub struct InboundCall {
    /// Caller address, `"Unknown"` when the transport does not expose one.
    pub source_address: String,
    pub arrived_at: DateTime<Utc>,
    /// Proxied target: path starting with `/`, plus `?query` when present.
    pub target: String,
    pub method: Method,
    pub headers: HeaderMap,
    /// `None` when the caller sent no body.
    pub body: Option<String>,
}

impl InboundCall {
    fn to_new_request(&self) -> NewRequest {
        NewRequest {
            ip_address: self.source_address.clone(),
            timestamp: self.arrived_at,
            endpoint: self.target.clone(),
            http_method: self.method.to_string(),
            headers: serialize_headers(&self.headers),
            payload: self.body.clone().filter(|b| !b.is_empty()),
        }
    }
}

/// What the caller is told once capture and forwarding are done.
#[derive(Debug, Clone, PartialEq)]
pub enum ProxyOutcome {
    /// The upstream answered; its status and parsed body are relayed.
    Relayed {
        request_id: RequestId,
        status: StatusCode,
        data: Option<Value>,
    },
    /// Forwarding failed; the caller gets a 500.
    Failed { request_id: RequestId, reason: String },
    /// Captured but deliberately not forwarded; the caller gets `status`.
    Refused {
        request_id: RequestId,
        status: StatusCode,
        reason: String,
    },
}

impl ProxyOutcome {
    pub fn request_id(&self) -> RequestId {
        match self {
            ProxyOutcome::Relayed { request_id, .. }
            | ProxyOutcome::Failed { request_id, .. }
            | ProxyOutcome::Refused { request_id, .. } => *request_id,
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ProxyOutcome::Relayed { status, .. } | ProxyOutcome::Refused { status, .. } => *status,
            ProxyOutcome::Failed { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Errors that abort a call before anything could be forwarded.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("failed to capture inbound request: {0}")]
    Capture(#[source] StoreError),
}

/// Orchestrates capture and forwarding for every proxied call.
///
/// Shared by all request tasks; holds no per-call state.
pub struct CapturePipeline {
    store: Arc<dyn AuditStore>,
    engine: ForwardingEngine,
}

impl CapturePipeline {
    pub fn new(store: Arc<dyn AuditStore>, engine: ForwardingEngine) -> Self {
        Self { store, engine }
    }

    pub fn store(&self) -> &Arc<dyn AuditStore> {
        &self.store
    }

    /// Capture `call`, forward it, and record the correlated response.
    pub async fn handle(&self, call: InboundCall) -> Result<ProxyOutcome, PipelineError> {
        let captured = self.capture(&call).await?;

        let ctx = CorrelationContext::open(&captured);
        let span = tracing::info_span!(
            "capture",
            trace_id = %ctx.trace_id(),
            request_id = %ctx.request_id(),
            method = %call.method,
            endpoint = %captured.endpoint,
        );

        self.forward_and_record(ctx, call).instrument(span).await
    }

    /// Capture `call` without forwarding it, recording `status` as its
    /// response. Used when the inbound request cannot be relayed unmodified.
    pub async fn refuse(
        &self,
        call: InboundCall,
        status: StatusCode,
        kind: &'static str,
        reason: String,
    ) -> Result<ProxyOutcome, PipelineError> {
        let captured = self.capture(&call).await?;
        let ctx = CorrelationContext::open(&captured);
        let request_id = ctx.request_id();

        tracing::warn!(
            trace_id = %ctx.trace_id(),
            request_id = %request_id,
            method = %call.method,
            endpoint = %captured.endpoint,
            status = status.as_u16(),
            kind,
            reason = %reason,
            "Call captured but not forwarded"
        );

        let payload = serde_json::json!({ "error": reason, "kind": kind }).to_string();
        self.record_response(ctx.close(status.as_u16(), payload, 0)).await;
        metrics::record_request(call.method.as_str(), status.as_u16());

        Ok(ProxyOutcome::Refused {
            request_id,
            status,
            reason,
        })
    }

    async fn capture(&self, call: &InboundCall) -> Result<CapturedRequest, PipelineError> {
        match self.store.insert_request(call.to_new_request()).await {
            Ok(captured) => Ok(captured),
            Err(e) => {
                metrics::record_capture_failure("request");
                tracing::error!(
                    method = %call.method,
                    target = %call.target,
                    error = %e,
                    "Failed to record inbound request"
                );
                Err(PipelineError::Capture(e))
            }
        }
    }

    async fn forward_and_record(
        &self,
        ctx: CorrelationContext,
        call: InboundCall,
    ) -> Result<ProxyOutcome, PipelineError> {
        let method = call.method.as_str();
        let result = self
            .engine
            .forward(ForwardRequest {
                method: &call.method,
                target: &call.target,
                headers: &call.headers,
                body: call.body.as_deref(),
            })
            .await;

        let request_id = ctx.request_id();
        let (record, outcome) = match result {
            Ok(reply) => {
                tracing::info!(
                    status = reply.status.as_u16(),
                    elapsed_ms = reply.elapsed_ms,
                    "Upstream replied"
                );
                metrics::record_upstream_duration(method, reply.elapsed_ms);
                let outcome = ProxyOutcome::Relayed {
                    request_id,
                    status: reply.status,
                    data: reply.data,
                };
                (ctx.close(reply.status.as_u16(), reply.body, reply.elapsed_ms), outcome)
            }
            Err(failure) => {
                tracing::warn!(
                    kind = %failure.kind,
                    elapsed_ms = failure.elapsed_ms,
                    error = %failure.message,
                    "Forwarding failed"
                );
                metrics::record_upstream_duration(method, failure.elapsed_ms);
                metrics::record_forward_failure(failure.kind.as_str());
                let record = ctx.close(
                    StatusCode::INTERNAL_SERVER_ERROR.as_u16(),
                    failure_payload(&failure),
                    failure.elapsed_ms,
                );
                let outcome = ProxyOutcome::Failed {
                    request_id,
                    reason: failure.message,
                };
                (record, outcome)
            }
        };

        self.record_response(record).await;
        metrics::record_request(method, outcome.status().as_u16());
        Ok(outcome)
    }

    /// Persist the response record. A failure here leaves the request without
    /// its pair; it is reported but does not change what the caller receives.
    async fn record_response(&self, record: NewResponse) {
        let request_id = record.request_id;
        match self.store.insert_response(record).await {
            Ok(response) => {
                tracing::debug!(response_id = %response.id, "Response recorded");
            }
            Err(e) => {
                metrics::record_capture_failure("response");
                tracing::error!(
                    request_id = %request_id,
                    error = %e,
                    "Failed to record upstream response; audit pair is incomplete"
                );
            }
        }
    }
}

/// JSON body stored for a failed forward.
fn failure_payload(failure: &ForwardFailure) -> String {
    let mut body = Map::new();
    body.insert("error".into(), Value::String(failure.message.clone()));
    body.insert("kind".into(), Value::String(failure.kind.as_str().into()));
    if let Some(status) = failure.upstream_status {
        body.insert("upstreamStatus".into(), Value::from(status.as_u16()));
    }
    if let Some(raw) = &failure.upstream_body {
        body.insert("upstreamBody".into(), Value::String(raw.clone()));
    }
    Value::Object(body).to_string()
}
