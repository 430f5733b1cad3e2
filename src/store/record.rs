//! Captured traffic records and query types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Store-assigned identifier of a captured request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(pub i64);

/// Store-assigned identifier of a captured response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResponseId(pub i64);

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for ResponseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// An inbound request as handed to the store, before it has an identity.
#[derive(Debug, Clone)]
pub struct NewRequest {
    /// Remote address of the caller (`"Unknown"` when not available).
    pub ip_address: String,
    /// When the call arrived at the proxy.
    pub timestamp: DateTime<Utc>,
    /// Proxied route, always starting with `/`.
    pub endpoint: String,
    /// HTTP method as sent by the caller.
    pub http_method: String,
    /// JSON object of header name to value.
    pub headers: String,
    /// Raw body, `None` when the caller sent nothing.
    pub payload: Option<String>,
}

/// A persisted inbound request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CapturedRequest {
    pub id: RequestId,
    pub ip_address: String,
    pub timestamp: DateTime<Utc>,
    pub endpoint: String,
    pub http_method: String,
    pub headers: String,
    pub payload: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// A response record ready to be persisted against its request.
#[derive(Debug, Clone)]
pub struct NewResponse {
    pub request_id: RequestId,
    pub response_status: u16,
    pub response_payload: String,
    /// Elapsed forwarding time in milliseconds.
    pub response_time: u64,
    /// Never earlier than the owning request's `created_at`.
    pub created_at: DateTime<Utc>,
}

/// A persisted upstream response, linked 1:1 to a [`CapturedRequest`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CapturedResponse {
    pub id: ResponseId,
    pub request_id: RequestId,
    pub response_status: u16,
    pub response_payload: String,
    pub response_time: u64,
    pub created_at: DateTime<Utc>,
}

/// A request joined with its response, if one has been recorded yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditEntry {
    pub request: CapturedRequest,
    pub response: Option<CapturedResponse>,
}

/// Filters and paging for listing captured traffic.
#[derive(Debug, Clone, Default)]
pub struct AuditQuery {
    /// Exact match on the caller address.
    pub ip_address: Option<String>,
    /// Substring match on the endpoint.
    pub endpoint: Option<String>,
    /// Exact match on the recorded response status.
    pub status_code: Option<u16>,
    /// Arrival time lower bound (inclusive).
    pub date_from: Option<DateTime<Utc>>,
    /// Arrival time upper bound (inclusive).
    pub date_to: Option<DateTime<Utc>>,
    /// 1-based page number.
    pub page: u32,
    pub page_size: u32,
}

impl AuditQuery {
    /// Number of rows to skip for the requested page.
    pub fn offset(&self) -> u64 {
        u64::from(self.page.max(1) - 1) * u64::from(self.page_size)
    }

    /// Whether an entry satisfies every filter of this query.
    pub fn matches(&self, entry: &AuditEntry) -> bool {
        if let Some(ip) = &self.ip_address {
            if &entry.request.ip_address != ip {
                return false;
            }
        }
        if let Some(fragment) = &self.endpoint {
            if !entry.request.endpoint.contains(fragment.as_str()) {
                return false;
            }
        }
        if let Some(status) = self.status_code {
            match &entry.response {
                Some(response) if response.response_status == status => {}
                _ => return false,
            }
        }
        if let Some(from) = self.date_from {
            if entry.request.timestamp < from {
                return false;
            }
        }
        if let Some(to) = self.date_to {
            if entry.request.timestamp > to {
                return false;
            }
        }
        true
    }
}

/// One page of captured traffic, newest first.
#[derive(Debug, Clone)]
pub struct AuditPage {
    pub total: u64,
    pub page: u32,
    pub page_size: u32,
    pub entries: Vec<AuditEntry>,
}

/// Aggregate counts reported by the health check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StoreStats {
    pub total_requests: u64,
    pub total_responses: u64,
}
