//! Integration tests for legacy record reconciliation
//!
//! Full bridge wiring on a temporary database with the legacy system mocked.

mod helpers;

use cdb_common::events::{BridgeEvent, ChangeKind, EventBus};
use cdb_common::{AggregateKind, ExternalId, Label, LabelSet, RecordKind};
use cdb_sync::aggregate::Repository;
use cdb_sync::import::ImportOutcome;
use cdb_sync::legacy::ExternalDocument;
use cdb_sync::Bridge;
use helpers::{actor_xml, count_events, create_test_db, envelope, event_types, event_xml, LegacyMock, NS};
use std::sync::Arc;

async fn bridge(legacy: &LegacyMock, pool: sqlx::SqlitePool, event_bus: EventBus) -> Bridge {
    Bridge::assemble(
        &legacy.config(),
        pool,
        legacy.fetcher(),
        legacy.client_factory(),
        event_bus,
    )
    .unwrap()
}

#[tokio::test]
async fn test_created_then_updated_notification() {
    let legacy = LegacyMock::start().await;
    let (_dir, pool) = create_test_db().await.unwrap();
    let bridge = bridge(&legacy, pool.clone(), EventBus::new(100)).await;
    legacy.mount_event("e-1", envelope(&[event_xml("e-1", "Concert", None)])).await;

    let id = ExternalId::new("e-1").unwrap();
    let importer = &bridge.state.event_importer;

    assert_eq!(importer.import(&id, ChangeKind::Created).await.unwrap(), ImportOutcome::Created);
    assert_eq!(importer.import(&id, ChangeKind::Updated).await.unwrap(), ImportOutcome::Updated);

    assert_eq!(
        event_types(&pool, AggregateKind::Event, &id).await,
        vec![
            "ImportedFromLegacy".to_string(),
            "LabelsSynced".to_string(),
            "UpdatedFromLegacy".to_string(),
        ]
    );
}

#[tokio::test]
async fn test_both_entry_points_on_absent_id_create_one_aggregate() {
    let legacy = LegacyMock::start().await;
    let (_dir, pool) = create_test_db().await.unwrap();
    let bridge = bridge(&legacy, pool.clone(), EventBus::new(100)).await;
    let importer = &bridge.state.event_importer;

    let document = ExternalDocument::new(event_xml("e-created", "A", None), NS);
    let outcome = importer
        .create_with_update_fallback(&ExternalId::new("e-created").unwrap(), &document, RecordKind::Event)
        .await
        .unwrap();
    assert_eq!(outcome, ImportOutcome::Created);
    assert_eq!(
        event_types(&pool, AggregateKind::Event, &ExternalId::new("e-created").unwrap()).await,
        vec!["ImportedFromLegacy".to_string(), "LabelsSynced".to_string()]
    );

    let document = ExternalDocument::new(event_xml("e-updated", "B", None), NS);
    let outcome = importer
        .update_with_create_fallback(&ExternalId::new("e-updated").unwrap(), &document, RecordKind::Event)
        .await
        .unwrap();
    assert_eq!(outcome, ImportOutcome::Created);
    assert_eq!(
        event_types(&pool, AggregateKind::Event, &ExternalId::new("e-updated").unwrap()).await,
        vec!["ImportedFromLegacy".to_string(), "LabelsSynced".to_string()]
    );
}

#[tokio::test]
async fn test_create_on_existing_id_falls_back_to_update() {
    let legacy = LegacyMock::start().await;
    let (_dir, pool) = create_test_db().await.unwrap();
    let bridge = bridge(&legacy, pool.clone(), EventBus::new(100)).await;
    let importer = &bridge.state.event_importer;
    let id = ExternalId::new("e-1").unwrap();

    let first = ExternalDocument::new(event_xml("e-1", "First", None), NS);
    importer
        .create_with_update_fallback(&id, &first, RecordKind::Event)
        .await
        .unwrap();

    let second = ExternalDocument::new(event_xml("e-1", "Second", None), NS);
    let outcome = importer
        .create_with_update_fallback(&id, &second, RecordKind::Event)
        .await
        .unwrap();

    assert_eq!(outcome, ImportOutcome::Updated);
    let aggregate = bridge.repositories[&AggregateKind::Event].load(&id).await.unwrap();
    let document = aggregate.state().document.as_ref().unwrap();
    assert!(document.xml().contains("<title>Second</title>"));
    // imported, labels synced, updated; the unchanged keywords add nothing
    assert_eq!(aggregate.version(), 3);
}

#[tokio::test]
async fn test_event_import_pulls_in_its_location() {
    let legacy = LegacyMock::start().await;
    let (_dir, pool) = create_test_db().await.unwrap();
    let bridge = bridge(&legacy, pool.clone(), EventBus::new(100)).await;
    legacy
        .mount_event("e-1", envelope(&[event_xml("e-1", "Concert", Some("p-1"))]))
        .await;
    legacy.mount_actor("p-1", envelope(&[actor_xml("p-1", "Zaal", true)])).await;

    let outcome = bridge
        .state
        .event_importer
        .import(&ExternalId::new("e-1").unwrap(), ChangeKind::Created)
        .await
        .unwrap();

    assert_eq!(outcome, ImportOutcome::Created);
    assert_eq!(count_events(&pool, AggregateKind::Place, "p-1").await, 1);
}

#[tokio::test]
async fn test_missing_location_does_not_fail_event_import() {
    let legacy = LegacyMock::start().await;
    let (_dir, pool) = create_test_db().await.unwrap();
    let bridge = bridge(&legacy, pool.clone(), EventBus::new(100)).await;
    // p-missing is served by neither endpoint (wiremock answers 404)
    legacy
        .mount_event("e-1", envelope(&[event_xml("e-1", "Concert", Some("p-missing"))]))
        .await;

    let outcome = bridge
        .state
        .event_importer
        .import(&ExternalId::new("e-1").unwrap(), ChangeKind::Updated)
        .await
        .unwrap();

    assert_eq!(outcome, ImportOutcome::Created);
    assert_eq!(count_events(&pool, AggregateKind::Place, "p-missing").await, 0);
}

#[tokio::test]
async fn test_non_place_actor_is_rejected_as_place() {
    let legacy = LegacyMock::start().await;
    let (_dir, pool) = create_test_db().await.unwrap();
    let event_bus = EventBus::new(100);
    let mut rx = event_bus.subscribe();
    let bridge = bridge(&legacy, pool.clone(), event_bus).await;
    legacy.mount_actor("a-1", envelope(&[actor_xml("a-1", "Vzw", false)])).await;

    let id = ExternalId::new("a-1").unwrap();
    let place = bridge.state.place_importer.import(&id, ChangeKind::Created).await.unwrap();
    let organizer = bridge.state.organizer_importer.import(&id, ChangeKind::Created).await.unwrap();

    assert_eq!(place, ImportOutcome::Rejected);
    assert_eq!(organizer, ImportOutcome::Created);
    assert_eq!(count_events(&pool, AggregateKind::Place, "a-1").await, 0);
    assert_eq!(count_events(&pool, AggregateKind::Organizer, "a-1").await, 1);

    match rx.recv().await.unwrap() {
        BridgeEvent::RecordRejected { aggregate_kind, id, .. } => {
            assert_eq!(aggregate_kind, AggregateKind::Place);
            assert_eq!(id.as_str(), "a-1");
        }
        other => panic!("expected RecordRejected, got {:?}", other),
    }
}

#[tokio::test]
async fn test_unknown_record_is_not_found() {
    let legacy = LegacyMock::start().await;
    let (_dir, pool) = create_test_db().await.unwrap();
    let bridge = bridge(&legacy, pool, EventBus::new(100)).await;

    let err = bridge
        .state
        .event_importer
        .import(&ExternalId::new("nope").unwrap(), ChangeKind::Created)
        .await
        .unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn test_imported_keywords_become_labels() {
    let legacy = LegacyMock::start().await;
    let (_dir, pool) = create_test_db().await.unwrap();
    let bridge = bridge(&legacy, pool.clone(), EventBus::new(100)).await;
    legacy.mount_event("e-1", envelope(&[event_xml("e-1", "Concert", None)])).await;

    let id = ExternalId::new("e-1").unwrap();
    bridge
        .state
        .event_importer
        .import(&id, ChangeKind::Created)
        .await
        .unwrap();

    let labels = bridge.repositories[&AggregateKind::Event]
        .load(&id)
        .await
        .unwrap()
        .state()
        .labels
        .clone();
    assert_eq!(
        labels,
        LabelSet::from_labels(vec![Label::visible("Zomer"), Label::hidden("Intern")])
    );

    let registered: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM labels")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(registered, 2);
}

#[tokio::test]
async fn test_labels_survive_a_full_event_bus() {
    let legacy = LegacyMock::start().await;
    let (_dir, pool) = create_test_db().await.unwrap();
    // Nobody drains this bus; imports must not depend on it
    let event_bus = EventBus::new(1);
    let _rx = event_bus.subscribe();
    let bridge = bridge(&legacy, pool.clone(), event_bus).await;

    for n in 0..5 {
        let id = format!("e-{}", n);
        legacy.mount_event(&id, envelope(&[event_xml(&id, "Concert", None)])).await;
        bridge
            .state
            .event_importer
            .import(&ExternalId::new(id.as_str()).unwrap(), ChangeKind::Created)
            .await
            .unwrap();
    }

    for n in 0..5 {
        let id = ExternalId::new(format!("e-{}", n)).unwrap();
        let aggregate = bridge.repositories[&AggregateKind::Event].load(&id).await.unwrap();
        assert_eq!(aggregate.state().labels.len(), 2, "labels missing for {}", id);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_racing_notifications_for_one_id_converge() {
    let legacy = LegacyMock::start().await;
    let (_dir, pool) = create_test_db().await.unwrap();
    let bridge = bridge(&legacy, pool.clone(), EventBus::new(100)).await;
    legacy.mount_event("e-1", envelope(&[event_xml("e-1", "Concert", None)])).await;

    let id = ExternalId::new("e-1").unwrap();
    let imports = 8;
    let handles: Vec<_> = (0..imports)
        .map(|n| {
            let importer = Arc::clone(&bridge.state.event_importer);
            let id = id.clone();
            let change = if n % 2 == 0 { ChangeKind::Created } else { ChangeKind::Updated };
            tokio::spawn(async move { importer.import(&id, change).await })
        })
        .collect();

    let mut outcomes = Vec::new();
    for handle in handles {
        outcomes.push(handle.await.unwrap().unwrap());
    }

    let created = outcomes.iter().filter(|o| **o == ImportOutcome::Created).count();
    assert_eq!(created, 1, "outcomes: {:?}", outcomes);
    assert_eq!(outcomes.len() - created, imports - 1);

    let types = event_types(&pool, AggregateKind::Event, &id).await;
    let of_type = |name: &str| types.iter().filter(|t| t.as_str() == name).count();
    assert_eq!(of_type("ImportedFromLegacy"), 1);
    assert_eq!(of_type("UpdatedFromLegacy"), imports - 1);
    assert_eq!(of_type("LabelsSynced"), 1);

    let aggregate = bridge.repositories[&AggregateKind::Event].load(&id).await.unwrap();
    assert_eq!(aggregate.version() as usize, types.len());
}
