//! Per-call correlation.
//!
//! A [`CorrelationContext`] is opened from the request record the store just
//! returned and closed into the matching response record. It is neither
//! `Clone` nor `Copy`, and closing consumes it, so each captured request
//! yields at most one response record and that record can only carry the id
//! this call was given.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::store::{CapturedRequest, NewResponse, RequestId};

/// In-flight token tying one call's response to its own request row.
#[derive(Debug)]
pub struct CorrelationContext {
    trace_id: Uuid,
    request_id: RequestId,
    recorded_at: DateTime<Utc>,
}

impl CorrelationContext {
    /// Open a context for a request that has just been persisted.
    pub fn open(request: &CapturedRequest) -> Self {
        Self {
            trace_id: Uuid::new_v4(),
            request_id: request.id,
            recorded_at: request.created_at,
        }
    }

    pub fn request_id(&self) -> RequestId {
        self.request_id
    }

    /// Log correlation id for this call.
    pub fn trace_id(&self) -> Uuid {
        self.trace_id
    }

    /// Build the response record for this call's request.
    ///
    /// The creation timestamp is clamped so it never precedes the request's,
    /// even if the wall clock stepped backwards in between.
    pub fn close(self, status: u16, payload: String, elapsed_ms: u64) -> NewResponse {
        NewResponse {
            request_id: self.request_id,
            response_status: status,
            response_payload: payload,
            response_time: elapsed_ms,
            created_at: Utc::now().max(self.recorded_at),
        }
    }
}
