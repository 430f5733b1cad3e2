//! The proxied surface: everything under `/api`.

use axum::{
    body::Body,
    extract::{ConnectInfo, Request, State},
    http::{StatusCode, Uri},
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use http_body_util::{BodyExt, LengthLimitError, Limited};
use std::net::SocketAddr;

use crate::capture::InboundCall;
use crate::http::response::ErrorReply;
use crate::http::server::AppState;

/// Route prefix under which every request is captured and forwarded.
pub const PROXY_PREFIX: &str = "/api";

/// Capture, forward and relay one call.
pub async fn proxy_handler(State(state): State<AppState>, request: Request) -> Response {
    let arrived_at = Utc::now();
    let source_address = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| "Unknown".to_string());
    let target = proxied_target(request.uri());

    let (parts, body) = request.into_parts();
    let body = read_body(body, state.max_body_size).await;

    tracing::debug!(
        source = %source_address,
        method = %parts.method,
        target = %target,
        "Captured inbound call"
    );

    let mut call = InboundCall {
        source_address,
        arrived_at,
        target,
        method: parts.method,
        headers: parts.headers,
        body: None,
    };

    // A client disconnect drops this future, not the tracked capture task.
    let pipeline = state.pipeline.clone();
    let task = match body {
        Ok(body) => {
            call.body = body;
            state
                .tasks
                .spawn(async move { pipeline.handle(call).await })
        }
        Err(too_large) => state.tasks.spawn(async move {
            pipeline
                .refuse(
                    call,
                    StatusCode::PAYLOAD_TOO_LARGE,
                    "body_too_large",
                    too_large.to_string(),
                )
                .await
        }),
    };

    match task.await {
        Ok(Ok(outcome)) => outcome.into_response(),
        Ok(Err(e)) => e.into_response(),
        Err(e) => {
            tracing::error!(error = %e, "Capture task aborted");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorReply {
                    error: "Capture task aborted",
                    message: e.to_string(),
                }),
            )
                .into_response()
        }
    }
}

/// An inbound body over the configured size limit.
#[derive(Debug, thiserror::Error)]
#[error("request body exceeds {limit} bytes and was not forwarded")]
pub struct BodyTooLarge {
    pub limit: usize,
}

/// The target recorded and forwarded for an inbound URI: the path below
/// [`PROXY_PREFIX`] (always starting with `/`) plus the query string.
pub fn proxied_target(uri: &Uri) -> String {
    let path = uri.path();
    let rest = path.strip_prefix(PROXY_PREFIX).unwrap_or(path);

    let mut target = if rest.starts_with('/') {
        rest.to_string()
    } else {
        format!("/{rest}")
    };
    if let Some(query) = uri.query() {
        target.push('?');
        target.push_str(query);
    }
    target
}

/// Read the whole inbound body as text, `None` when it is empty or
/// unreadable. Only the size limit is an error.
async fn read_body(body: Body, limit: usize) -> Result<Option<String>, BodyTooLarge> {
    match Limited::new(body, limit).collect().await {
        Ok(collected) => {
            let bytes = collected.to_bytes();
            Ok((!bytes.is_empty()).then(|| String::from_utf8_lossy(&bytes).into_owned()))
        }
        Err(e) if e.downcast_ref::<LengthLimitError>().is_some() => Err(BodyTooLarge { limit }),
        Err(e) => {
            tracing::debug!(error = %e, "Inbound body unreadable, recording it as absent");
            Ok(None)
        }
    }
}
