//! Record store boundary.
//!
//! The engine only talks to the store through [`RecordStore`]. [`CmaClient`]
//! speaks the JSON:API content management API over HTTP, [`MemoryStore`]
//! keeps everything in process.

pub mod cma;
pub mod memory;
pub mod retry;

use crate::model::{FieldSchema, Record, RecordTypeInfo, SiteInfo};
use async_trait::async_trait;
use serde_json::{Map, Value};
use thiserror::Error;

pub use cma::CmaClient;
pub use memory::MemoryStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("HTTP {status}: {message}")]
    Http { status: u16, message: String },
    #[error("network error: {0}")]
    Network(String),
    #[error("unexpected response: {0}")]
    Decode(String),
}

impl StoreError {
    pub fn status(&self) -> Option<u16> {
        match self {
            StoreError::Http { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.status() == Some(404)
    }
}

/// One page of a paginated listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub offset: usize,
    pub limit: usize,
}

impl PageRequest {
    pub fn first(limit: usize) -> Self {
        Self { offset: 0, limit }
    }

    pub fn next(self) -> Self {
        Self {
            offset: self.offset + self.limit,
            limit: self.limit,
        }
    }

    /// A page shorter than the limit is the last one.
    pub fn is_last(&self, received: usize) -> bool {
        received < self.limit
    }
}

#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn fetch_site(&self) -> Result<SiteInfo, StoreError>;

    async fn list_record_types(&self) -> Result<Vec<RecordTypeInfo>, StoreError>;

    async fn list_fields(&self, record_type_id: &str) -> Result<Vec<FieldSchema>, StoreError>;

    async fn list_records(
        &self,
        record_type_id: &str,
        page: PageRequest,
    ) -> Result<Vec<Record>, StoreError>;

    /// Full-text prefilter. Results are a hint: they may contain records
    /// without an actual hit.
    async fn search_records(
        &self,
        record_type_id: &str,
        query: &str,
        page: PageRequest,
    ) -> Result<Vec<Record>, StoreError>;

    async fn get_record(&self, record_id: &str) -> Result<Record, StoreError>;

    async fn update_record(
        &self,
        record_id: &str,
        patch: Map<String, Value>,
    ) -> Result<Record, StoreError>;
}
