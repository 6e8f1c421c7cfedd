/// Walks every record type and record of the store, feeding the scanner
use crate::classifier::{classify, FieldClassification};
use crate::config::StoreOptions;
use crate::error::{EngineError, ErrorKind};
use crate::model::{FieldSchema, Record, RecordTypeInfo, SiteInfo};
use crate::pattern::SearchPattern;
use crate::scanner::{RawMatch, RecordScanner};
use crate::store::{PageRequest, RecordStore, StoreError};
use log::{debug, info, warn};
use serde::Serialize;
use std::collections::HashMap;

/// Schema data fetched during one scan. Cleared when the next scan starts.
#[derive(Debug, Default)]
pub struct SessionCache {
    site: Option<SiteInfo>,
    record_types: Vec<RecordTypeInfo>,
    fields: HashMap<String, Vec<FieldSchema>>,
    classifications: HashMap<String, FieldClassification>,
}

impl SessionCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&mut self) {
        self.site = None;
        self.record_types.clear();
        self.fields.clear();
        self.classifications.clear();
    }

    pub fn site(&self) -> Option<&SiteInfo> {
        self.site.as_ref()
    }

    pub fn record_types(&self) -> &[RecordTypeInfo] {
        &self.record_types
    }

    pub fn record_type(&self, record_type_id: &str) -> Option<&RecordTypeInfo> {
        self.record_types
            .iter()
            .find(|record_type| record_type.id == record_type_id)
    }

    pub fn fields(&self, record_type_id: &str) -> Option<&[FieldSchema]> {
        self.fields.get(record_type_id).map(Vec::as_slice)
    }

    /// Classification of `record_type`, fetching its fields on first use.
    pub async fn classification<S>(
        &mut self,
        store: &S,
        record_type: &RecordTypeInfo,
    ) -> Result<&FieldClassification, EngineError>
    where
        S: RecordStore + ?Sized,
    {
        if !self.classifications.contains_key(&record_type.id) {
            let fields = store.list_fields(&record_type.id).await.map_err(|source| {
                EngineError::SchemaFetchFailure {
                    record_type: record_type.name.clone(),
                    source,
                }
            })?;
            let classification = classify(record_type, &fields);
            self.fields.insert(record_type.id.clone(), fields);
            self.classifications
                .insert(record_type.id.clone(), classification);
        }
        Ok(&self.classifications[&record_type.id])
    }
}

/// A record type that could not be (fully) scanned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SkippedRecordType {
    pub record_type_id: String,
    pub record_type_name: String,
    pub kind: ErrorKind,
    pub message: String,
}

#[derive(Debug, Clone, Default)]
pub struct WalkOutcome {
    pub raw_matches: Vec<RawMatch>,
    pub records_scanned: usize,
    pub skipped: Vec<SkippedRecordType>,
    pub main_locale: Option<String>,
}

#[derive(Debug, Clone)]
pub struct CollectionWalker {
    page_size: usize,
    use_prefilter: bool,
}

impl Default for CollectionWalker {
    fn default() -> Self {
        Self {
            page_size: 100,
            use_prefilter: false,
        }
    }
}

impl CollectionWalker {
    pub fn new(page_size: usize) -> Self {
        Self {
            page_size: page_size.max(1),
            ..Self::default()
        }
    }

    /// Narrow listings with the store's full-text search. Only applies to
    /// literal patterns; every returned record is still matched locally.
    pub fn with_prefilter(mut self, enabled: bool) -> Self {
        self.use_prefilter = enabled;
        self
    }

    pub fn from_options(options: &StoreOptions) -> Self {
        Self::new(options.page_size).with_prefilter(options.use_search_prefilter)
    }

    pub async fn walk<S>(
        &self,
        store: &S,
        cache: &mut SessionCache,
        pattern: &SearchPattern,
    ) -> Result<WalkOutcome, EngineError>
    where
        S: RecordStore + ?Sized,
    {
        cache.clear();

        let site = store
            .fetch_site()
            .await
            .map_err(EngineError::StoreUnavailable)?;
        let record_types = store
            .list_record_types()
            .await
            .map_err(EngineError::StoreUnavailable)?;
        info!(
            "Scanning {} record type(s) for {:?}",
            record_types.len(),
            pattern.as_str()
        );

        let main_locale = site.main_locale().map(str::to_string);
        let mut outcome = WalkOutcome {
            main_locale: main_locale.clone(),
            ..WalkOutcome::default()
        };
        cache.site = Some(site);
        cache.record_types = record_types.clone();

        for record_type in &record_types {
            let classification = match cache.classification(store, record_type).await {
                Ok(classification) => classification.clone(),
                Err(err) => {
                    warn!("{err}; skipping record type {}", record_type.id);
                    outcome.skip(record_type, err.kind(), err.to_string());
                    continue;
                }
            };
            let scanner = RecordScanner::new(record_type, &classification, main_locale.as_deref());

            if let Some(item_id) = &record_type.singleton_item_id {
                self.scan_singleton(store, record_type, item_id, &scanner, pattern, &mut outcome)
                    .await;
            } else {
                self.scan_pages(store, record_type, &scanner, pattern, &mut outcome)
                    .await;
            }
        }

        info!(
            "Scanned {} record(s), {} field hit(s), {} record type(s) skipped",
            outcome.records_scanned,
            outcome.raw_matches.len(),
            outcome.skipped.len()
        );
        Ok(outcome)
    }

    async fn scan_singleton<S>(
        &self,
        store: &S,
        record_type: &RecordTypeInfo,
        item_id: &str,
        scanner: &RecordScanner<'_>,
        pattern: &SearchPattern,
        outcome: &mut WalkOutcome,
    ) where
        S: RecordStore + ?Sized,
    {
        match store.get_record(item_id).await {
            Ok(record) => outcome.scan_record(scanner, &record, pattern),
            Err(source) => {
                let err = EngineError::RecordFetchFailure {
                    record_id: item_id.to_string(),
                    source,
                };
                warn!("{err}; skipping singleton {}", record_type.name);
                outcome.skip(record_type, err.kind(), err.to_string());
            }
        }
    }

    async fn scan_pages<S>(
        &self,
        store: &S,
        record_type: &RecordTypeInfo,
        scanner: &RecordScanner<'_>,
        pattern: &SearchPattern,
        outcome: &mut WalkOutcome,
    ) where
        S: RecordStore + ?Sized,
    {
        let prefilter = self.use_prefilter && pattern.is_literal();
        let mut page = PageRequest::first(self.page_size);

        loop {
            let listed: Result<Vec<Record>, StoreError> = if prefilter {
                store
                    .search_records(&record_type.id, pattern.as_str(), page)
                    .await
            } else {
                store.list_records(&record_type.id, page).await
            };

            let records = match listed {
                Ok(records) => records,
                Err(err) => {
                    warn!(
                        "Listing {} at offset {} failed: {err}; keeping records scanned so far",
                        record_type.name, page.offset
                    );
                    outcome.skip(
                        record_type,
                        ErrorKind::RecordFetchFailure,
                        format!("listing failed at offset {}: {err}", page.offset),
                    );
                    return;
                }
            };

            debug!(
                "{}: {} record(s) at offset {}",
                record_type.api_key,
                records.len(),
                page.offset
            );
            for record in &records {
                outcome.scan_record(scanner, record, pattern);
            }

            if page.is_last(records.len()) {
                return;
            }
            page = page.next();
        }
    }
}

impl WalkOutcome {
    fn scan_record(&mut self, scanner: &RecordScanner<'_>, record: &Record, pattern: &SearchPattern) {
        self.records_scanned += 1;
        self.raw_matches.extend(scanner.scan(record, pattern).hits);
    }

    fn skip(&mut self, record_type: &RecordTypeInfo, kind: ErrorKind, message: String) {
        self.skipped.push(SkippedRecordType {
            record_type_id: record_type.id.clone(),
            record_type_name: record_type.name.clone(),
            kind,
            message,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use serde_json::{json, Map, Value};

    fn record_type(id: &str, name: &str) -> RecordTypeInfo {
        RecordTypeInfo {
            id: id.into(),
            name: name.into(),
            api_key: name.to_lowercase(),
            title_field_id: Some(format!("{id}-title")),
            singleton_item_id: None,
        }
    }

    fn fields(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap_or_default()
    }

    fn seeded_store(records: usize) -> MemoryStore {
        let store = MemoryStore::new(&["en", "it"]);
        store.add_record_type(
            record_type("m1", "Article"),
            vec![
                FieldSchema::new("m1-title", "title", true),
                FieldSchema::new("m1-body", "body", false),
            ],
        );
        for index in 0..records {
            store.add_record(Record::new(
                format!("a{index}"),
                "m1",
                fields(json!({
                    "title": { "en": format!("Post {index}"), "it": "Articolo" },
                    "body": if index % 2 == 0 { "needle in text" } else { "plain text" }
                })),
            ));
        }
        store
    }

    #[tokio::test]
    async fn walks_every_page_and_fetches_fields_once() {
        let store = seeded_store(7);
        let walker = CollectionWalker::new(3);
        let mut cache = SessionCache::new();
        let pattern = SearchPattern::literal("needle").unwrap();

        let outcome = walker.walk(&store, &mut cache, &pattern).await.unwrap();

        assert_eq!(outcome.records_scanned, 7);
        assert_eq!(outcome.raw_matches.len(), 4);
        assert_eq!(outcome.raw_matches[0].title, "Post 0");
        assert_eq!(outcome.main_locale.as_deref(), Some("en"));
        assert!(outcome.skipped.is_empty());
        assert_eq!(store.field_listings(), 1);
        assert!(cache.fields("m1").is_some());
    }

    #[tokio::test]
    async fn each_scan_starts_with_a_fresh_cache() {
        let store = seeded_store(2);
        let walker = CollectionWalker::default();
        let mut cache = SessionCache::new();
        let pattern = SearchPattern::literal("needle").unwrap();

        walker.walk(&store, &mut cache, &pattern).await.unwrap();
        walker.walk(&store, &mut cache, &pattern).await.unwrap();
        assert_eq!(store.field_listings(), 2);
    }

    #[tokio::test]
    async fn failing_record_types_do_not_abort_the_scan() {
        let store = seeded_store(2);
        store.add_record_type(record_type("m2", "Page"), vec![]);
        store.add_record_type(record_type("m3", "Author"), vec![]);
        store.add_record(Record::new("p1", "m2", fields(json!({ "body": "needle" }))));
        store.break_schema("m2");
        store.break_listing("m3");

        let walker = CollectionWalker::default();
        let mut cache = SessionCache::new();
        let pattern = SearchPattern::literal("needle").unwrap();
        let outcome = walker.walk(&store, &mut cache, &pattern).await.unwrap();

        assert_eq!(outcome.raw_matches.len(), 1);
        let skipped: Vec<(&str, ErrorKind)> = outcome
            .skipped
            .iter()
            .map(|skipped| (skipped.record_type_id.as_str(), skipped.kind))
            .collect();
        assert_eq!(
            skipped,
            vec![
                ("m2", ErrorKind::SchemaFetchFailure),
                ("m3", ErrorKind::RecordFetchFailure)
            ]
        );
    }

    #[tokio::test]
    async fn unavailable_store_aborts() {
        let store = seeded_store(1);
        store.make_unavailable();
        let mut cache = SessionCache::new();
        let pattern = SearchPattern::literal("needle").unwrap();

        let err = CollectionWalker::default()
            .walk(&store, &mut cache, &pattern)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::StoreUnavailable);
    }

    #[tokio::test]
    async fn singletons_are_fetched_by_id() {
        let store = MemoryStore::new(&["en"]);
        let mut home = record_type("m9", "Home");
        home.singleton_item_id = Some("home".into());
        store.add_record_type(home, vec![FieldSchema::new("m9-title", "title", false)]);
        store.add_record(Record::new("home", "m9", fields(json!({ "title": "Welcome needle" }))));

        let mut cache = SessionCache::new();
        let pattern = SearchPattern::literal("needle").unwrap();
        let outcome = CollectionWalker::default()
            .walk(&store, &mut cache, &pattern)
            .await
            .unwrap();

        assert_eq!(outcome.records_scanned, 1);
        assert_eq!(outcome.raw_matches[0].record_id, "home");
        assert_eq!(outcome.raw_matches[0].title, "Welcome needle");
    }

    #[tokio::test]
    async fn titles_use_the_main_locale_across_record_types() {
        let store = seeded_store(1);
        let mut home = record_type("m9", "Home");
        home.singleton_item_id = Some("home".into());
        store.add_record_type(home, vec![FieldSchema::new("m9-title", "title", true)]);
        store.add_record(Record::new(
            "home",
            "m9",
            fields(json!({ "title": { "it": "Inizio", "en": "Start needle" } })),
        ));

        let mut cache = SessionCache::new();
        let pattern = SearchPattern::literal("needle").unwrap();
        let outcome = CollectionWalker::default()
            .walk(&store, &mut cache, &pattern)
            .await
            .unwrap();

        let titles: Vec<(&str, &str)> = outcome
            .raw_matches
            .iter()
            .map(|hit| (hit.record_id.as_str(), hit.title.as_str()))
            .collect();
        assert_eq!(titles, vec![("a0", "Post 0"), ("home", "Start needle")]);
        assert_eq!(outcome.main_locale.as_deref(), Some("en"));
    }

    #[tokio::test]
    async fn prefilter_only_scans_candidate_records() {
        let store = seeded_store(6);
        let mut cache = SessionCache::new();

        let literal = SearchPattern::literal("needle").unwrap();
        let outcome = CollectionWalker::new(2)
            .with_prefilter(true)
            .walk(&store, &mut cache, &literal)
            .await
            .unwrap();
        assert_eq!(outcome.records_scanned, 3);
        assert_eq!(outcome.raw_matches.len(), 3);

        let regex = SearchPattern::regex("need.e").unwrap();
        let outcome = CollectionWalker::new(2)
            .with_prefilter(true)
            .walk(&store, &mut cache, &regex)
            .await
            .unwrap();
        assert_eq!(outcome.records_scanned, 6);
        assert_eq!(outcome.raw_matches.len(), 3);
    }
}
