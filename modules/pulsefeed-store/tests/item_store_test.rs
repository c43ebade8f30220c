//! Item store behavior against an in-memory SQLite database: insert
//! idempotence, series bookkeeping, phase transitions, and the due query's
//! window/ordering/limit contract.

use chrono::{DateTime, Duration, Utc};
use pulsefeed_common::schedule::{SamplePhase, MINUTE_PHASE_SAMPLES};
use pulsefeed_common::{EngagementCounts, NewItem};
use pulsefeed_store::{ArchivedSnapshot, ItemStore, StoreError};

fn at(s: &str) -> DateTime<Utc> {
    s.parse().expect("invalid test timestamp")
}

fn new_item(id: &str) -> NewItem {
    NewItem {
        id: id.to_string(),
        author: "@kestrel".to_string(),
        text: format!("post {id}"),
    }
}

fn counts(likes: i64) -> EngagementCounts {
    EngagementCounts {
        replies: 1,
        reposts: 2,
        likes,
        views: 100,
    }
}

// ---------------------------------------------------------------------------
// Insertion
// ---------------------------------------------------------------------------

#[tokio::test]
async fn insert_sets_default_schedule_state() {
    let store = ItemStore::connect_in_memory().await.unwrap();
    let now = at("2025-03-01T12:00:00Z");

    assert!(store.insert_if_absent(&new_item("101"), now).await.unwrap());

    let item = store.get("101").await.unwrap().unwrap();
    assert_eq!(item.phase, SamplePhase::Minute);
    assert_eq!(item.update_count, 0);
    assert_eq!(item.next_update_due, now);
    assert_eq!(item.created_at, now);
    assert!(item.likes_series.is_empty());
    assert!(item.sample_offsets.is_empty());
}

#[tokio::test]
async fn reinsert_of_known_id_is_a_no_op() {
    let store = ItemStore::connect_in_memory().await.unwrap();
    let now = at("2025-03-01T12:00:00Z");

    assert!(store.insert_if_absent(&new_item("101"), now).await.unwrap());
    store.record_sample("101", &counts(5), now).await.unwrap();

    // Re-discovery later must not reset schedule state or series.
    let later = now + Duration::minutes(10);
    let mut other = new_item("101");
    other.text = "different text on re-discovery".to_string();
    assert!(!store.insert_if_absent(&other, later).await.unwrap());

    let item = store.get("101").await.unwrap().unwrap();
    assert_eq!(item.update_count, 1);
    assert_eq!(item.likes_series, vec![5]);
    assert_eq!(item.text, "post 101");
    assert_eq!(item.created_at, now);
}

#[tokio::test]
async fn bulk_insert_counts_only_new_rows() {
    let store = ItemStore::connect_in_memory().await.unwrap();
    let now = at("2025-03-01T12:00:00Z");

    store.insert_if_absent(&new_item("101"), now).await.unwrap();

    let batch = vec![new_item("101"), new_item("102"), new_item("103")];
    let inserted = store.insert_new_items(&batch, now).await.unwrap();
    assert_eq!(inserted, 2);
    assert_eq!(store.tracked_count().await.unwrap(), 3);
}

// ---------------------------------------------------------------------------
// Sample recording
// ---------------------------------------------------------------------------

#[tokio::test]
async fn series_stay_aligned_with_update_count() {
    let store = ItemStore::connect_in_memory().await.unwrap();
    let created = at("2025-03-01T12:00:00Z");
    store
        .insert_if_absent(&new_item("101"), created)
        .await
        .unwrap();

    for i in 0..5 {
        let when = created + Duration::seconds(60 * (i + 1));
        store.record_sample("101", &counts(i), when).await.unwrap();
    }

    let item = store.get("101").await.unwrap().unwrap();
    assert_eq!(item.update_count, 5);
    assert_eq!(item.replies_series.len(), 5);
    assert_eq!(item.reposts_series.len(), 5);
    assert_eq!(item.likes_series.len(), 5);
    assert_eq!(item.views_series.len(), 5);
    assert_eq!(item.sample_offsets.len(), 5);
    assert_eq!(item.likes_series, vec![0, 1, 2, 3, 4]);
    assert_eq!(item.sample_offsets, vec![60, 120, 180, 240, 300]);
}

#[tokio::test]
async fn sample_for_unknown_id_is_not_found() {
    let store = ItemStore::connect_in_memory().await.unwrap();
    let now = at("2025-03-01T12:00:00Z");

    let err = store.record_sample("ghost", &counts(1), now).await;
    assert!(matches!(err, Err(StoreError::NotFound(id)) if id == "ghost"));
}

#[tokio::test]
async fn minute_phase_reschedules_one_minute_out() {
    let store = ItemStore::connect_in_memory().await.unwrap();
    let now = at("2025-03-01T12:00:00Z");
    store.insert_if_absent(&new_item("101"), now).await.unwrap();

    let recorded = store.record_sample("101", &counts(1), now).await.unwrap();
    assert_eq!(recorded.phase, SamplePhase::Minute);
    assert_eq!(recorded.next_update_due, now + Duration::seconds(60));
}

#[tokio::test]
async fn sixtieth_sample_moves_item_to_half_hour_phase() {
    let store = ItemStore::connect_in_memory().await.unwrap();
    let created = at("2025-03-01T12:00:00Z");
    store
        .insert_if_absent(&new_item("101"), created)
        .await
        .unwrap();

    let mut when = created;
    for i in 0..MINUTE_PHASE_SAMPLES {
        when = created + Duration::seconds(60 * (i + 1));
        let recorded = store.record_sample("101", &counts(i), when).await.unwrap();

        if i < MINUTE_PHASE_SAMPLES - 1 {
            assert_eq!(recorded.phase, SamplePhase::Minute, "sample {}", i + 1);
            assert_eq!(recorded.next_update_due, when + Duration::seconds(60));
        }
    }

    // The 60th sample coarsens the cadence.
    let item = store.get("101").await.unwrap().unwrap();
    assert_eq!(item.update_count, MINUTE_PHASE_SAMPLES);
    assert_eq!(item.phase, SamplePhase::HalfHour);
    assert_eq!(item.next_update_due, when + Duration::minutes(30));

    // And it never reverts.
    let later = when + Duration::minutes(30);
    let recorded = store.record_sample("101", &counts(99), later).await.unwrap();
    assert_eq!(recorded.phase, SamplePhase::HalfHour);
    assert_eq!(recorded.next_update_due, later + Duration::minutes(30));
}

#[tokio::test]
async fn next_due_never_moves_backwards() {
    let store = ItemStore::connect_in_memory().await.unwrap();
    let created = at("2025-03-01T12:00:00Z");
    store
        .insert_if_absent(&new_item("101"), created)
        .await
        .unwrap();

    let mut previous_due = created;
    for i in 1..=70 {
        let when = created + Duration::seconds(60 * i);
        let recorded = store.record_sample("101", &counts(i), when).await.unwrap();
        assert!(
            recorded.next_update_due >= previous_due,
            "due time regressed at sample {i}"
        );
        previous_due = recorded.next_update_due;
    }
}

// ---------------------------------------------------------------------------
// Due query
// ---------------------------------------------------------------------------

#[tokio::test]
async fn due_query_excludes_items_outside_the_age_window() {
    let store = ItemStore::connect_in_memory().await.unwrap();
    let now = at("2025-03-02T12:00:00Z");

    // Created 30h ago: overdue, but aged out of a 24h window.
    store
        .insert_if_absent(&new_item("old"), now - Duration::hours(30))
        .await
        .unwrap();
    // Created 2h ago: in window and due.
    store
        .insert_if_absent(&new_item("fresh"), now - Duration::hours(2))
        .await
        .unwrap();

    let due = store.items_due_for_update(24, None, now).await.unwrap();
    let ids: Vec<&str> = due.iter().map(|i| i.id.as_str()).collect();
    assert_eq!(ids, vec!["fresh"]);
}

#[tokio::test]
async fn due_query_orders_oldest_due_first_and_honors_limit() {
    let store = ItemStore::connect_in_memory().await.unwrap();
    let now = at("2025-03-01T12:00:00Z");

    // Stagger due times by sampling at different moments.
    for (id, minutes_ago) in [("a", 5), ("b", 15), ("c", 10)] {
        let seen = now - Duration::minutes(minutes_ago);
        store.insert_if_absent(&new_item(id), seen).await.unwrap();
        store.record_sample(id, &counts(1), seen).await.unwrap();
    }

    let due = store.items_due_for_update(24, None, now).await.unwrap();
    let ids: Vec<&str> = due.iter().map(|i| i.id.as_str()).collect();
    assert_eq!(ids, vec!["b", "c", "a"]);

    let capped = store.items_due_for_update(24, Some(2), now).await.unwrap();
    let ids: Vec<&str> = capped.iter().map(|i| i.id.as_str()).collect();
    assert_eq!(ids, vec!["b", "c"]);
}

#[tokio::test]
async fn items_not_yet_due_are_excluded() {
    let store = ItemStore::connect_in_memory().await.unwrap();
    let now = at("2025-03-01T12:00:00Z");

    store.insert_if_absent(&new_item("101"), now).await.unwrap();
    store.record_sample("101", &counts(1), now).await.unwrap();

    // Due one minute from now; not yet.
    let due = store
        .items_due_for_update(24, None, now + Duration::seconds(30))
        .await
        .unwrap();
    assert!(due.is_empty());

    let due = store
        .items_due_for_update(24, None, now + Duration::seconds(60))
        .await
        .unwrap();
    assert_eq!(due.len(), 1);
}

// ---------------------------------------------------------------------------
// Backfill snapshots
// ---------------------------------------------------------------------------

#[tokio::test]
async fn archive_snapshot_replaces_on_rearchive() {
    let store = ItemStore::connect_in_memory().await.unwrap();
    let posted = at("2025-03-01T02:00:00Z");

    let mut snap = ArchivedSnapshot {
        item_id: "101".to_string(),
        author: "@kestrel".to_string(),
        text: "overnight post".to_string(),
        posted_at: posted,
        counts: counts(10),
        collected_at: at("2025-03-01T12:00:00Z"),
    };
    store.archive_snapshot(&snap).await.unwrap();

    snap.counts = counts(25);
    snap.collected_at = at("2025-03-01T13:00:00Z");
    store.archive_snapshot(&snap).await.unwrap();

    assert_eq!(store.archived_count().await.unwrap(), 1);
}
