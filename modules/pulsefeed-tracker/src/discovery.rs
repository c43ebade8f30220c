use std::collections::HashSet;

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use pulsefeed_common::types::{NewItem, VisibleItem};
use pulsefeed_store::ItemStore;

/// Item ids already offered to the store during this run.
///
/// Saves a round trip per re-encounter; the store's insert-if-absent is
/// still the source of truth, so losing this state costs nothing but a
/// redundant no-op insert.
#[derive(Debug, Default)]
pub struct DiscoveryState {
    seen: HashSet<String>,
}

impl DiscoveryState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_seen(&self, item_id: &str) -> bool {
        self.seen.contains(item_id)
    }

    pub fn mark_seen(&mut self, item_id: &str) {
        self.seen.insert(item_id.to_string());
    }

    pub fn seen_count(&self) -> usize {
        self.seen.len()
    }
}

/// Register any newly visible items for tracking. Returns how many rows
/// the store actually inserted.
pub async fn run_discovery_pass(
    state: &mut DiscoveryState,
    visible: &[VisibleItem],
    store: &ItemStore,
    now: DateTime<Utc>,
) -> pulsefeed_store::Result<u32> {
    let mut fresh = Vec::new();
    for item in visible {
        let Some(id) = item.id.as_deref() else {
            continue;
        };
        if state.is_seen(id) {
            continue;
        }
        match NewItem::from_visible(item) {
            Some(new_item) => fresh.push(new_item),
            None => {
                // Partially rendered card. Not marked seen, so a later
                // pass gets another shot once the card fills in.
                warn!(item_id = %id, "Author or text missing, skipping discovery this encounter");
            }
        }
    }

    if fresh.is_empty() {
        return Ok(0);
    }

    let inserted = store.insert_new_items(&fresh, now).await?;
    // Mark seen only after the insert landed, so a store error retries
    // the same items next pass.
    for item in &fresh {
        state.mark_seen(&item.id);
    }
    debug!(
        offered = fresh.len(),
        inserted, "Discovery pass registered new items"
    );
    Ok(inserted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pulsefeed_common::types::EngagementCounts;

    fn visible(id: &str, author: &str, text: &str) -> VisibleItem {
        VisibleItem {
            id: Some(id.to_string()),
            author: Some(author.to_string()),
            text: Some(text.to_string()),
            posted_at: None,
            counts: Some(EngagementCounts::default()),
        }
    }

    #[tokio::test]
    async fn inserts_fresh_items_and_remembers_them() {
        let store = ItemStore::connect_in_memory().await.unwrap();
        let mut state = DiscoveryState::new();
        let now = Utc::now();
        let items = vec![visible("a", "ana", "first"), visible("b", "ben", "second")];

        let inserted = run_discovery_pass(&mut state, &items, &store, now)
            .await
            .unwrap();
        assert_eq!(inserted, 2);
        assert!(state.is_seen("a"));
        assert!(state.is_seen("b"));

        // Second pass over the same frame offers nothing.
        let inserted = run_discovery_pass(&mut state, &items, &store, now)
            .await
            .unwrap();
        assert_eq!(inserted, 0);
        assert_eq!(state.seen_count(), 2);
    }

    #[tokio::test]
    async fn known_items_are_not_reinserted() {
        let store = ItemStore::connect_in_memory().await.unwrap();
        let now = Utc::now();
        let existing = NewItem {
            id: "a".to_string(),
            author: "ana".to_string(),
            text: "first".to_string(),
        };
        assert!(store.insert_if_absent(&existing, now).await.unwrap());

        // Fresh run, empty seen cache: the store still rejects the duplicate.
        let mut state = DiscoveryState::new();
        let items = vec![visible("a", "ana", "first")];
        let inserted = run_discovery_pass(&mut state, &items, &store, now)
            .await
            .unwrap();
        assert_eq!(inserted, 0);
        assert!(state.is_seen("a"));
    }

    #[tokio::test]
    async fn incomplete_cards_are_retried_later() {
        let store = ItemStore::connect_in_memory().await.unwrap();
        let mut state = DiscoveryState::new();
        let now = Utc::now();

        let half_rendered = VisibleItem {
            id: Some("a".to_string()),
            author: None,
            text: Some("text without author".to_string()),
            posted_at: None,
            counts: None,
        };
        let inserted = run_discovery_pass(&mut state, &[half_rendered], &store, now)
            .await
            .unwrap();
        assert_eq!(inserted, 0);
        assert!(!state.is_seen("a"));

        // Card fills in on a later frame.
        let inserted = run_discovery_pass(&mut state, &[visible("a", "ana", "now complete")], &store, now)
            .await
            .unwrap();
        assert_eq!(inserted, 1);
        assert!(state.is_seen("a"));
    }

    #[tokio::test]
    async fn items_without_ids_are_ignored() {
        let store = ItemStore::connect_in_memory().await.unwrap();
        let mut state = DiscoveryState::new();
        let anonymous = VisibleItem {
            id: None,
            author: Some("ana".to_string()),
            text: Some("no id".to_string()),
            posted_at: None,
            counts: None,
        };

        let inserted = run_discovery_pass(&mut state, &[anonymous], &store, Utc::now())
            .await
            .unwrap();
        assert_eq!(inserted, 0);
        assert_eq!(state.seen_count(), 0);
    }
}
