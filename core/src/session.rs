/// Results of one scan, kept around for selection and replacement
use crate::aggregate::{total_occurrences, Aggregator};
use crate::error::EngineError;
use crate::model::AggregatedRecord;
use crate::pattern::SearchPattern;
use crate::report::ScanSummary;
use crate::store::RecordStore;
use crate::walker::{CollectionWalker, SessionCache, SkippedRecordType, WalkOutcome};
use chrono::{DateTime, Utc};
use log::info;
use serde::Serialize;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanSession {
    pub id: Uuid,
    pub started_at: DateTime<Utc>,
    pub query: String,
    pub records_scanned: usize,
    pub records: Vec<AggregatedRecord>,
    pub skipped: Vec<SkippedRecordType>,
    #[serde(skip)]
    pattern: SearchPattern,
}

impl ScanSession {
    /// Walks the whole store and groups the hits per record.
    pub async fn run<S>(
        store: &S,
        walker: &CollectionWalker,
        cache: &mut SessionCache,
        pattern: SearchPattern,
    ) -> Result<Self, EngineError>
    where
        S: RecordStore + ?Sized,
    {
        let started_at = Utc::now();
        let outcome = walker.walk(store, cache, &pattern).await?;
        let session = Self::from_outcome(pattern, outcome, started_at);
        info!(
            "scan {}: {}",
            session.id,
            session.summary().message()
        );
        Ok(session)
    }

    pub fn from_outcome(
        pattern: SearchPattern,
        outcome: WalkOutcome,
        started_at: DateTime<Utc>,
    ) -> Self {
        let mut aggregator = Aggregator::new();
        aggregator.extend(outcome.raw_matches);

        Self {
            id: Uuid::new_v4(),
            started_at,
            query: pattern.as_str().to_string(),
            records_scanned: outcome.records_scanned,
            records: aggregator.finish(),
            skipped: outcome.skipped,
            pattern,
        }
    }

    pub fn pattern(&self) -> &SearchPattern {
        &self.pattern
    }

    pub fn record(&self, record_id: &str) -> Option<&AggregatedRecord> {
        self.records
            .iter()
            .find(|record| record.record_id == record_id)
    }

    pub fn occurrence_count(&self) -> usize {
        total_occurrences(&self.records)
    }

    /// Matched records not yet rewritten by an earlier run.
    pub fn pending(&self) -> impl Iterator<Item = &AggregatedRecord> {
        self.records.iter().filter(|record| !record.replaced)
    }

    pub fn mark_replaced(&mut self, record_id: &str) {
        if let Some(record) = self
            .records
            .iter_mut()
            .find(|record| record.record_id == record_id)
        {
            record.replaced = true;
        }
    }

    pub fn summary(&self) -> ScanSummary {
        ScanSummary {
            occurrences: self.occurrence_count(),
            records: self.records.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{FieldSchema, Record, RecordTypeInfo};
    use crate::store::MemoryStore;
    use serde_json::json;

    fn store() -> MemoryStore {
        let store = MemoryStore::new(&["en", "it"]);
        store.add_record_type(
            RecordTypeInfo {
                id: "m1".into(),
                name: "Article".into(),
                api_key: "article".into(),
                title_field_id: Some("f1".into()),
                singleton_item_id: None,
            },
            vec![
                FieldSchema::new("f1", "title", false),
                FieldSchema::new("f2", "body", true),
            ],
        );
        let fields = json!({
            "title": "Cats",
            "body": { "en": "cat and cat", "it": "gatto cat" }
        });
        store.add_record(Record::new(
            "X",
            "m1",
            fields.as_object().cloned().unwrap_or_default(),
        ));
        store
    }

    #[test]
    fn groups_walk_results_per_record() {
        let store = store();
        let mut cache = SessionCache::new();
        let pattern = SearchPattern::literal("cat").unwrap();

        let session = tokio_test::block_on(ScanSession::run(
            &store,
            &CollectionWalker::default(),
            &mut cache,
            pattern,
        ))
        .unwrap();

        assert_eq!(session.records.len(), 1);
        let record = session.record("X").unwrap();
        assert_eq!(record.title, "Cats");
        assert_eq!(record.fields.len(), 2);
        assert!(record.field("body").unwrap().matches.is_localized());
        assert_eq!(session.occurrence_count(), 4);
        assert_eq!(session.summary().message(), "Found 4 matches across 1 records");
    }

    #[test]
    fn replaced_records_leave_the_pending_set() {
        let store = store();
        let mut cache = SessionCache::new();
        let mut session = tokio_test::block_on(ScanSession::run(
            &store,
            &CollectionWalker::default(),
            &mut cache,
            SearchPattern::literal("cat").unwrap(),
        ))
        .unwrap();

        assert_eq!(session.pending().count(), 1);
        session.mark_replaced("X");
        assert_eq!(session.pending().count(), 0);

        let json = serde_json::to_value(&session).unwrap();
        assert_eq!(json["query"], json!("cat"));
        assert_eq!(json["records"][0]["replaced"], json!(true));
    }
}
