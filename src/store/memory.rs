//! In-memory audit store for development and tests.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::RwLock;

use crate::store::error::StoreError;
use crate::store::record::{
    AuditEntry, AuditPage, AuditQuery, CapturedRequest, CapturedResponse, NewRequest,
    NewResponse, RequestId, ResponseId, StoreStats,
};
use crate::store::AuditStore;

#[derive(Default)]
struct Tables {
    last_request_id: i64,
    last_response_id: i64,
    requests: BTreeMap<RequestId, CapturedRequest>,
    /// Keyed by owning request, which makes the 1:1 link structural.
    responses: BTreeMap<RequestId, CapturedResponse>,
}

/// Audit store kept entirely in process memory.
///
/// Both tables live behind one lock so id assignment, the uniqueness check
/// and cascading deletes are atomic with respect to each other.
#[derive(Default)]
pub struct MemoryAuditStore {
    tables: RwLock<Tables>,
}

impl MemoryAuditStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, Tables>, StoreError> {
        self.tables
            .read()
            .map_err(|_| StoreError::Backend("memory store lock poisoned".into()))
    }

    fn write(&self) -> Result<std::sync::RwLockWriteGuard<'_, Tables>, StoreError> {
        self.tables
            .write()
            .map_err(|_| StoreError::Backend("memory store lock poisoned".into()))
    }
}

#[async_trait]
impl AuditStore for MemoryAuditStore {
    async fn insert_request(&self, request: NewRequest) -> Result<CapturedRequest, StoreError> {
        let mut tables = self.write()?;
        tables.last_request_id += 1;
        let id = RequestId(tables.last_request_id);

        let record = CapturedRequest {
            id,
            ip_address: request.ip_address,
            timestamp: request.timestamp,
            endpoint: request.endpoint,
            http_method: request.http_method,
            headers: request.headers,
            payload: request.payload,
            created_at: chrono::Utc::now(),
        };
        tables.requests.insert(id, record.clone());
        Ok(record)
    }

    async fn insert_response(&self, response: NewResponse) -> Result<CapturedResponse, StoreError> {
        let mut tables = self.write()?;
        if !tables.requests.contains_key(&response.request_id) {
            return Err(StoreError::UnknownRequest(response.request_id));
        }
        if tables.responses.contains_key(&response.request_id) {
            return Err(StoreError::DuplicateResponse(response.request_id));
        }

        tables.last_response_id += 1;
        let record = CapturedResponse {
            id: ResponseId(tables.last_response_id),
            request_id: response.request_id,
            response_status: response.response_status,
            response_payload: response.response_payload,
            response_time: response.response_time,
            created_at: response.created_at,
        };
        tables.responses.insert(response.request_id, record.clone());
        Ok(record)
    }

    async fn get(&self, id: RequestId) -> Result<Option<AuditEntry>, StoreError> {
        let tables = self.read()?;
        Ok(tables.requests.get(&id).map(|request| AuditEntry {
            request: request.clone(),
            response: tables.responses.get(&id).cloned(),
        }))
    }

    async fn query(&self, query: &AuditQuery) -> Result<AuditPage, StoreError> {
        let tables = self.read()?;
        let mut matched: Vec<AuditEntry> = tables
            .requests
            .values()
            .map(|request| AuditEntry {
                request: request.clone(),
                response: tables.responses.get(&request.id).cloned(),
            })
            .filter(|entry| query.matches(entry))
            .collect();
        drop(tables);

        matched.sort_by(|a, b| {
            b.request
                .timestamp
                .cmp(&a.request.timestamp)
                .then(b.request.id.cmp(&a.request.id))
        });

        let total = matched.len() as u64;
        let entries = matched
            .into_iter()
            .skip(usize::try_from(query.offset()).unwrap_or(usize::MAX))
            .take(query.page_size as usize)
            .collect();

        Ok(AuditPage {
            total,
            page: query.page,
            page_size: query.page_size,
            entries,
        })
    }

    async fn delete_request(&self, id: RequestId) -> Result<bool, StoreError> {
        let mut tables = self.write()?;
        if tables.requests.remove(&id).is_none() {
            return Ok(false);
        }
        tables.responses.remove(&id);
        Ok(true)
    }

    async fn stats(&self) -> Result<StoreStats, StoreError> {
        let tables = self.read()?;
        Ok(StoreStats {
            total_requests: tables.requests.len() as u64,
            total_responses: tables.responses.len() as u64,
        })
    }
}
