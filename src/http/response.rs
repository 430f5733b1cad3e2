//! Reply shapes sent back to proxied callers.
//!
//! # Design Decisions
//! - The upstream status is reused as the reply status
//! - The upstream body is relayed as parsed JSON under `data`
//! - Forwarding failures become 500 with an explanatory message
//! - Calls refused before forwarding carry their own status

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::Value;

use crate::capture::{PipelineError, ProxyOutcome};
use crate::store::RequestId;

/// Successful relay of an upstream reply.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProxyReply {
    pub request_id: RequestId,
    pub status: u16,
    pub data: Option<Value>,
}

/// Reply when the upstream could not be reached or understood.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ForwardErrorReply {
    pub request_id: RequestId,
    pub status: u16,
    pub error: &'static str,
    pub message: String,
}

/// Generic error body.
#[derive(Debug, Serialize)]
pub struct ErrorReply {
    pub error: &'static str,
    pub message: String,
}

impl IntoResponse for ProxyOutcome {
    fn into_response(self) -> Response {
        match self {
            ProxyOutcome::Relayed {
                request_id,
                status,
                data,
            } => (
                status,
                Json(ProxyReply {
                    request_id,
                    status: status.as_u16(),
                    data,
                }),
            )
                .into_response(),
            ProxyOutcome::Failed { request_id, reason } => (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ForwardErrorReply {
                    request_id,
                    status: StatusCode::INTERNAL_SERVER_ERROR.as_u16(),
                    error: "Error forwarding request to real system",
                    message: reason,
                }),
            )
                .into_response(),
            ProxyOutcome::Refused {
                request_id,
                status,
                reason,
            } => (
                status,
                Json(ForwardErrorReply {
                    request_id,
                    status: status.as_u16(),
                    error: "Request was not forwarded to real system",
                    message: reason,
                }),
            )
                .into_response(),
        }
    }
}

impl IntoResponse for PipelineError {
    fn into_response(self) -> Response {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ErrorReply {
                error: "Failed to capture request",
                message: self.to_string(),
            }),
        )
            .into_response()
    }
}
