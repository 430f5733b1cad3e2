//! Audit storage subsystem.
//!
//! # Data Flow
//! ```text
//! capture pipeline
//!     → insert_request  (request row, id assigned here)
//!     → insert_response (response row, keyed by that id)
//!
//! audit surface
//!     → query / get / delete_request / stats
//! ```
//!
//! # Design Decisions
//! - Identity is assigned by the store and returned from the insert; callers
//!   never look up "the latest" request
//! - One response per request, enforced by the store itself
//! - Deleting a request cascades to its response
//! - Backends are interchangeable behind `Arc<dyn AuditStore>`

pub mod error;
pub mod memory;
pub mod migrations;
pub mod record;
pub mod sqlite;

use async_trait::async_trait;

pub use error::StoreError;
pub use memory::MemoryAuditStore;
pub use record::{
    AuditEntry, AuditPage, AuditQuery, CapturedRequest, CapturedResponse, NewRequest,
    NewResponse, RequestId, ResponseId, StoreStats,
};
pub use sqlite::SqliteAuditStore;

/// Trait for captured-traffic storage backends.
///
/// Implementations must be `Send + Sync` to be shared across request tasks.
#[async_trait]
pub trait AuditStore: Send + Sync {
    /// Persist an inbound request and return it with its assigned identity.
    async fn insert_request(&self, request: NewRequest) -> Result<CapturedRequest, StoreError>;

    /// Persist the response for a previously stored request.
    ///
    /// Fails with [`StoreError::DuplicateResponse`] if one already exists and
    /// [`StoreError::UnknownRequest`] if the request is gone.
    async fn insert_response(&self, response: NewResponse) -> Result<CapturedResponse, StoreError>;

    /// Fetch a single request together with its response.
    async fn get(&self, id: RequestId) -> Result<Option<AuditEntry>, StoreError>;

    /// List captured traffic matching the query, newest first.
    async fn query(&self, query: &AuditQuery) -> Result<AuditPage, StoreError>;

    /// Delete a request and its response. Returns `false` if it did not exist.
    async fn delete_request(&self, id: RequestId) -> Result<bool, StoreError>;

    /// Aggregate counts. Also serves as the connectivity probe.
    async fn stats(&self) -> Result<StoreStats, StoreError>;
}
