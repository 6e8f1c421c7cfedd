use super::{PageRequest, RecordStore, StoreError};
use crate::model::{FieldSchema, Record, RecordTypeInfo, SiteInfo};
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

#[derive(Debug, Default)]
struct State {
    site: SiteInfo,
    record_types: Vec<RecordTypeInfo>,
    fields: HashMap<String, Vec<FieldSchema>>,
    records: Vec<Record>,
    broken_listings: HashSet<String>,
    broken_schemas: HashSet<String>,
    rejected_updates: HashSet<String>,
    site_unavailable: bool,
}

/// In-process [`RecordStore`], mostly for tests and dry runs.
///
/// Failures can be injected per record type or per record. Every call is
/// counted so callers can assert how often the store was hit.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<State>,
    latency: Duration,
    field_listings: AtomicUsize,
    updates: AtomicUsize,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

impl MemoryStore {
    pub fn new(locales: &[&str]) -> Self {
        let store = Self::default();
        store.lock().site = SiteInfo {
            locales: locales.iter().map(|locale| locale.to_string()).collect(),
        };
        store
    }

    /// Delays every update, so concurrent writes overlap.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn add_record_type(&self, record_type: RecordTypeInfo, fields: Vec<FieldSchema>) {
        let mut state = self.lock();
        state.fields.insert(record_type.id.clone(), fields);
        state.record_types.push(record_type);
    }

    pub fn add_record(&self, record: Record) {
        self.lock().records.push(record);
    }

    pub fn remove_record(&self, record_id: &str) {
        self.lock().records.retain(|record| record.id != record_id);
    }

    pub fn break_listing(&self, record_type_id: &str) {
        self.lock().broken_listings.insert(record_type_id.to_string());
    }

    pub fn break_schema(&self, record_type_id: &str) {
        self.lock().broken_schemas.insert(record_type_id.to_string());
    }

    pub fn reject_updates_for(&self, record_id: &str) {
        self.lock().rejected_updates.insert(record_id.to_string());
    }

    pub fn make_unavailable(&self) {
        self.lock().site_unavailable = true;
    }

    pub fn record(&self, record_id: &str) -> Option<Record> {
        self.lock()
            .records
            .iter()
            .find(|record| record.id == record_id)
            .cloned()
    }

    pub fn field_listings(&self) -> usize {
        self.field_listings.load(Ordering::SeqCst)
    }

    pub fn updates(&self) -> usize {
        self.updates.load(Ordering::SeqCst)
    }

    /// Highest number of updates that were running at the same time.
    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    fn page_of(records: Vec<Record>, page: PageRequest) -> Vec<Record> {
        records
            .into_iter()
            .skip(page.offset)
            .take(page.limit)
            .collect()
    }

    fn unavailable() -> StoreError {
        StoreError::Network("store unavailable".into())
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn fetch_site(&self) -> Result<SiteInfo, StoreError> {
        let state = self.lock();
        if state.site_unavailable {
            return Err(Self::unavailable());
        }
        Ok(state.site.clone())
    }

    async fn list_record_types(&self) -> Result<Vec<RecordTypeInfo>, StoreError> {
        let state = self.lock();
        if state.site_unavailable {
            return Err(Self::unavailable());
        }
        Ok(state.record_types.clone())
    }

    async fn list_fields(&self, record_type_id: &str) -> Result<Vec<FieldSchema>, StoreError> {
        self.field_listings.fetch_add(1, Ordering::SeqCst);
        let state = self.lock();
        if state.broken_schemas.contains(record_type_id) {
            return Err(StoreError::Http {
                status: 500,
                message: format!("fields of {record_type_id} unavailable"),
            });
        }
        state
            .fields
            .get(record_type_id)
            .cloned()
            .ok_or_else(|| StoreError::Http {
                status: 404,
                message: format!("unknown record type {record_type_id}"),
            })
    }

    async fn list_records(
        &self,
        record_type_id: &str,
        page: PageRequest,
    ) -> Result<Vec<Record>, StoreError> {
        let state = self.lock();
        if state.broken_listings.contains(record_type_id) {
            return Err(StoreError::Http {
                status: 500,
                message: format!("listing of {record_type_id} failed"),
            });
        }
        let records = state
            .records
            .iter()
            .filter(|record| record.record_type_id == record_type_id)
            .cloned()
            .collect();
        Ok(Self::page_of(records, page))
    }

    async fn search_records(
        &self,
        record_type_id: &str,
        query: &str,
        page: PageRequest,
    ) -> Result<Vec<Record>, StoreError> {
        let needle = query.to_lowercase();
        let state = self.lock();
        if state.broken_listings.contains(record_type_id) {
            return Err(StoreError::Http {
                status: 500,
                message: format!("search in {record_type_id} failed"),
            });
        }
        let records = state
            .records
            .iter()
            .filter(|record| record.record_type_id == record_type_id)
            .filter(|record| {
                Value::Object(record.fields.clone())
                    .to_string()
                    .to_lowercase()
                    .contains(&needle)
            })
            .cloned()
            .collect();
        Ok(Self::page_of(records, page))
    }

    async fn get_record(&self, record_id: &str) -> Result<Record, StoreError> {
        self.record(record_id).ok_or_else(|| StoreError::Http {
            status: 404,
            message: format!("record {record_id} not found"),
        })
    }

    async fn update_record(
        &self,
        record_id: &str,
        patch: Map<String, Value>,
    ) -> Result<Record, StoreError> {
        let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(running, Ordering::SeqCst);
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        let mut state = self.lock();
        if state.rejected_updates.contains(record_id) {
            return Err(StoreError::Http {
                status: 422,
                message: "INVALID_FIELD".into(),
            });
        }
        let record = state
            .records
            .iter_mut()
            .find(|record| record.id == record_id)
            .ok_or_else(|| StoreError::Http {
                status: 404,
                message: format!("record {record_id} not found"),
            })?;
        record.fields.extend(patch);
        self.updates.fetch_add(1, Ordering::SeqCst);
        Ok(record.clone())
    }
}
