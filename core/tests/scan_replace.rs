//! End-to-end scan and replace against the in-memory store.
//!
//! 1. Walk every record type and aggregate the hits
//! 2. Select records and request a replace
//! 3. Confirm and check the rewritten store contents

use bulk_replace_core::{
    BatchOrchestrator, CollectionWalker, ErrorKind, FieldMatch, FieldSchema, MemoryStore, Record,
    RecordTypeInfo, ReplaceTarget, ScanSession, SearchPattern, Selection, SessionCache,
};
use serde_json::{json, Value};

fn record(id: &str, record_type_id: &str, fields: Value) -> Record {
    Record::new(id, record_type_id, fields.as_object().cloned().unwrap_or_default())
}

fn fixture_store() -> MemoryStore {
    let store = MemoryStore::new(&["en", "it"]);
    store.add_record_type(
        RecordTypeInfo {
            id: "article".into(),
            name: "Article".into(),
            api_key: "article".into(),
            title_field_id: Some("article-title".into()),
            singleton_item_id: None,
        },
        vec![
            FieldSchema::new("article-title", "title", true),
            FieldSchema::new("article-body", "body", false),
            FieldSchema::new("article-content", "content", false),
        ],
    );
    store.add_record_type(
        RecordTypeInfo {
            id: "home".into(),
            name: "Home page".into(),
            api_key: "home".into(),
            title_field_id: None,
            singleton_item_id: Some("home-1".into()),
        },
        vec![FieldSchema::new("home-hero", "hero", false)],
    );

    store.add_record(record(
        "a1",
        "article",
        json!({
            "title": { "en": "Acme launches", "it": "Acme lancia" },
            "body": "Hello world, hello again",
            "content": { "blocks": [{ "type": "p", "text": "Made by ACME" }] }
        }),
    ));
    store.add_record(record(
        "a2",
        "article",
        json!({
            "title": { "en": "Unrelated", "it": "Altro" },
            "body": "nothing to see",
            "content": null
        }),
    ));
    store.add_record(record(
        "a3",
        "article",
        json!({
            "title": { "en": "", "it": "Solo acme" },
            "body": "acme acme",
            "content": []
        }),
    ));
    store.add_record(record("home-1", "home", json!({ "hero": "Welcome to Acme" })));
    store
}

async fn scan(store: &MemoryStore, pattern: &str) -> ScanSession {
    let mut cache = SessionCache::new();
    ScanSession::run(
        store,
        &CollectionWalker::new(2),
        &mut cache,
        SearchPattern::literal(pattern).unwrap(),
    )
    .await
    .unwrap()
}

fn pending_ids(session: &ScanSession) -> Vec<&str> {
    session
        .pending()
        .map(|record| record.record_id.as_str())
        .collect()
}

#[tokio::test]
async fn test_scan_groups_hits_per_record() {
    let store = fixture_store();
    let session = scan(&store, "acme").await;

    let ids: Vec<&str> = session
        .records
        .iter()
        .map(|record| record.record_id.as_str())
        .collect();
    assert_eq!(ids, vec!["a1", "a3", "home-1"]);
    assert_eq!(session.records_scanned, 4);

    let a1 = session.record("a1").unwrap();
    assert_eq!(a1.title, "Acme launches");
    match &a1.field("title").unwrap().matches {
        FieldMatch::Localized { locale_matches } => {
            let locales: Vec<&str> = locale_matches.keys().map(String::as_str).collect();
            assert_eq!(locales, vec!["en", "it"]);
        }
        other => panic!("expected localized title, got {other:?}"),
    }
    let content = a1.field("content").unwrap();
    assert_eq!(content.matches.occurrence_count(), 1);

    let a3 = session.record("a3").unwrap();
    assert_eq!(a3.title, "Solo acme");
    assert_eq!(a3.field("body").unwrap().matches.occurrence_count(), 2);

    assert_eq!(session.summary().message(), "Found 7 matches across 3 records");
}

#[tokio::test]
async fn test_no_matches_notice() {
    let store = fixture_store();
    let session = scan(&store, "zebra").await;
    assert!(session.records.is_empty());
    assert_eq!(session.summary().message(), "No matches found");
}

#[tokio::test]
async fn test_deletion_reports_offsets_and_rewrites() {
    let store = fixture_store();
    let mut session = scan(&store, "hello").await;

    let body = session.record("a1").unwrap().field("body").unwrap();
    match &body.matches {
        FieldMatch::Single { matches } => {
            let offsets: Vec<usize> = matches.iter().map(|hit| hit.offset).collect();
            assert_eq!(offsets, vec![0, 13]);
        }
        other => panic!("expected single field, got {other:?}"),
    }

    let mut orchestrator = BatchOrchestrator::new(5);
    orchestrator
        .request(&session, ReplaceTarget::All, Some(String::new()))
        .unwrap();
    let report = orchestrator.confirm(&store, &mut session).await.unwrap();

    assert_eq!(report.completed, 1);
    assert_eq!(
        store.record("a1").unwrap().field("body"),
        Some(&json!(" world,  again"))
    );
}

#[tokio::test]
async fn test_selected_replace_with_partial_failure() {
    let store = fixture_store();
    store.reject_updates_for("home-1");
    let mut session = scan(&store, "acme").await;

    let mut selection = Selection::new();
    selection.toggle("a1");
    selection.toggle("home-1");
    let pending = pending_ids(&session);
    assert!(!selection.all_selected(pending.iter().copied()));

    let mut orchestrator = BatchOrchestrator::new(5);
    let requested = orchestrator
        .request(&session, selection.target(pending), Some("Globex".into()))
        .unwrap();
    assert_eq!(requested, 2);

    let report = orchestrator.confirm(&store, &mut session).await.unwrap();
    assert_eq!(report.total, 2);
    assert_eq!(report.completed + report.failed, report.total);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].record_id, "home-1");
    assert_eq!(report.failures[0].kind, ErrorKind::UpdateRejected);
    assert_eq!(report.summary().message(), "Replaced in 1 items, 1 failed");

    let a1 = store.record("a1").unwrap();
    assert_eq!(
        a1.field("title"),
        Some(&json!({ "en": "Globex launches", "it": "Globex lancia" }))
    );
    assert_eq!(
        a1.field("content"),
        Some(&json!({ "blocks": [{ "type": "p", "text": "Made by Globex" }] }))
    );
    assert_eq!(store.record("a3").unwrap().field("body"), Some(&json!("acme acme")));

    assert!(session.record("a1").unwrap().replaced);
    assert!(!session.record("home-1").unwrap().replaced);
    assert!(!session.record("a3").unwrap().replaced);

    // Records replaced earlier are excluded from the next run.
    let pending = orchestrator
        .request(&session, ReplaceTarget::All, Some("Globex".into()))
        .unwrap();
    assert_eq!(pending, 2);
}

#[tokio::test]
async fn test_unknown_selected_id_leaves_other_records_alone() {
    let store = fixture_store();
    let mut session = scan(&store, "acme").await;

    // Three pending records; the selection holds one of them plus two
    // ids the scan never produced.
    let mut selection = Selection::new();
    selection.select_all(["a1", "typo", "stale"]);
    let target = selection.target(pending_ids(&session));
    assert_eq!(target, ReplaceTarget::Selected(vec!["a1".into()]));

    let mut orchestrator = BatchOrchestrator::new(5);
    let requested = orchestrator
        .request(&session, target, Some("X".into()))
        .unwrap();
    assert_eq!(requested, 1);
    let report = orchestrator.confirm(&store, &mut session).await.unwrap();

    assert_eq!(report.completed, 1);
    assert_eq!(store.record("a3").unwrap().field("body"), Some(&json!("acme acme")));
    assert_eq!(
        store.record("home-1").unwrap().field("hero"),
        Some(&json!("Welcome to Acme"))
    );
}
