//! Read and delete surface over the captured pairs.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{de, Deserialize, Deserializer, Serialize};

use crate::config::AuditConfig;
use crate::http::response::ErrorReply;
use crate::http::server::AppState;
use crate::store::{AuditEntry, AuditQuery, RequestId, ResponseId, StoreError};

/// Query-string parameters for `GET /audit/requests`.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListParams {
    pub page: Option<u32>,
    pub page_size: Option<u32>,
    pub ip_address: Option<String>,
    pub endpoint: Option<String>,
    pub status_code: Option<u16>,
    #[serde(default, deserialize_with = "deserialize_time_bound")]
    pub date_from: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "deserialize_time_bound")]
    pub date_to: Option<DateTime<Utc>>,
}

/// Accepts RFC 3339, a zone-less `YYYY-MM-DDTHH:MM:SS` (read as UTC) or a
/// bare `YYYY-MM-DD` (midnight UTC). An empty value is no bound.
fn deserialize_time_bound<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    parse_time_bound(raw.trim()).map_err(de::Error::custom)
}

fn parse_time_bound(raw: &str) -> Result<Option<DateTime<Utc>>, String> {
    if raw.is_empty() {
        return Ok(None);
    }
    if let Ok(at) = DateTime::parse_from_rfc3339(raw) {
        return Ok(Some(at.with_timezone(&Utc)));
    }
    if let Ok(at) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f") {
        return Ok(Some(at.and_utc()));
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|day| day.and_hms_opt(0, 0, 0))
        .map(|at| Some(at.and_utc()))
        .ok_or_else(|| format!("'{raw}' is not a date or RFC 3339 timestamp"))
}

impl ListParams {
    /// Resolve paging defaults and drop empty filters.
    pub fn into_query(self, audit: &AuditConfig) -> AuditQuery {
        let non_empty = |s: Option<String>| s.filter(|v| !v.is_empty());
        AuditQuery {
            ip_address: non_empty(self.ip_address),
            endpoint: non_empty(self.endpoint),
            status_code: self.status_code,
            date_from: self.date_from,
            date_to: self.date_to,
            page: self.page.unwrap_or(1).max(1),
            page_size: self
                .page_size
                .unwrap_or(audit.default_page_size)
                .clamp(1, audit.max_page_size.max(1)),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestList {
    pub total_records: u64,
    pub page: u32,
    pub page_size: u32,
    pub data: Vec<RequestView>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestView {
    pub request_id: RequestId,
    pub ip_address: String,
    pub timestamp: DateTime<Utc>,
    pub endpoint: String,
    pub http_method: String,
    pub headers: String,
    pub payload: Option<String>,
    pub response: Option<ResponseView>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseView {
    pub response_id: ResponseId,
    pub response_status: u16,
    pub response_payload: String,
    pub response_time: u64,
}

impl From<AuditEntry> for RequestView {
    fn from(entry: AuditEntry) -> Self {
        let AuditEntry { request, response } = entry;
        Self {
            request_id: request.id,
            ip_address: request.ip_address,
            timestamp: request.timestamp,
            endpoint: request.endpoint,
            http_method: request.http_method,
            headers: request.headers,
            payload: request.payload,
            response: response.map(|r| ResponseView {
                response_id: r.id,
                response_status: r.response_status,
                response_payload: r.response_payload,
                response_time: r.response_time,
            }),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteReply {
    pub success: bool,
    pub message: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deleted_request_id: Option<RequestId>,
}

fn store_failure(e: StoreError) -> Response {
    tracing::error!(error = %e, "Audit store call failed");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorReply {
            error: "Audit store unavailable",
            message: e.to_string(),
        }),
    )
        .into_response()
}

/// `GET /audit/requests`
pub async fn list_requests(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> Response {
    let query = params.into_query(&state.audit);

    match state.store.query(&query).await {
        Ok(page) => Json(RequestList {
            total_records: page.total,
            page: page.page,
            page_size: page.page_size,
            data: page.entries.into_iter().map(RequestView::from).collect(),
        })
        .into_response(),
        Err(e) => store_failure(e),
    }
}

/// `DELETE /audit/requests/{id}`
pub async fn delete_request(State(state): State<AppState>, Path(id): Path<i64>) -> Response {
    let id = RequestId(id);

    match state.store.delete_request(id).await {
        Ok(true) => {
            tracing::info!(request_id = %id, "Captured request deleted");
            Json(DeleteReply {
                success: true,
                message: "Request and associated response deleted successfully",
                deleted_request_id: Some(id),
            })
            .into_response()
        }
        Ok(false) => (
            StatusCode::NOT_FOUND,
            Json(DeleteReply {
                success: false,
                message: "Request not found",
                deleted_request_id: None,
            }),
        )
            .into_response(),
        Err(e) => store_failure(e),
    }
}
