use std::collections::HashMap;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use crate::error::Result;

/// Process-durable map of item id to last successful update time.
///
/// Backs the update scheduler's spacing decisions independently of the
/// item store: one crawl pass can see the same on-screen item several
/// times as the feed scrolls, well inside its next-due window. Persisted
/// as a flat JSON object of id to ISO-8601 timestamp, loaded at process
/// start and rewritten in full at each cycle boundary.
#[derive(Debug)]
pub struct RecentUpdates {
    path: PathBuf,
    entries: HashMap<String, DateTime<Utc>>,
}

impl RecentUpdates {
    /// Load the cache from disk. A missing file is an empty cache; an
    /// unreadable one starts empty and is replaced at the next persist.
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let entries = match std::fs::read_to_string(&path) {
            Ok(raw) => match serde_json::from_str::<HashMap<String, DateTime<Utc>>>(&raw) {
                Ok(entries) => entries,
                Err(e) => {
                    warn!(
                        path = %path.display(),
                        error = %e,
                        "Recent-update cache unreadable, starting empty"
                    );
                    HashMap::new()
                }
            },
            Err(_) => HashMap::new(),
        };
        Self { path, entries }
    }

    /// Last successful update for an id. Unknown ids read as the epoch,
    /// so a first encounter always clears the spacing floor.
    pub fn last_update(&self, id: &str) -> DateTime<Utc> {
        self.entries.get(id).copied().unwrap_or(DateTime::UNIX_EPOCH)
    }

    pub fn mark_updated(&mut self, id: &str, now: DateTime<Utc>) {
        self.entries.insert(id.to_string(), now);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Rewrite the whole cache file.
    pub fn persist(&self) -> Result<()> {
        let raw = serde_json::to_string_pretty(&self.entries)?;
        std::fs::write(&self.path, raw)?;
        debug!(
            entries = self.entries.len(),
            path = %self.path.display(),
            "Recent-update cache persisted"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(s: &str) -> DateTime<Utc> {
        s.parse().unwrap()
    }

    #[test]
    fn missing_file_reads_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        let cache = RecentUpdates::load(dir.path().join("recent_updates.json"));
        assert!(cache.is_empty());
        assert_eq!(cache.last_update("nope"), DateTime::UNIX_EPOCH);
    }

    #[test]
    fn entries_round_trip_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("recent_updates.json");
        let stamp = at("2025-03-01T12:00:00Z");

        let mut cache = RecentUpdates::load(&path);
        cache.mark_updated("8841", stamp);
        cache.mark_updated("8842", stamp + chrono::Duration::seconds(30));
        cache.persist().unwrap();

        let reloaded = RecentUpdates::load(&path);
        assert_eq!(reloaded.len(), 2);
        assert_eq!(reloaded.last_update("8841"), stamp);
        assert_eq!(
            reloaded.last_update("8842"),
            stamp + chrono::Duration::seconds(30)
        );
    }

    #[test]
    fn file_is_a_flat_id_to_timestamp_object() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("recent_updates.json");

        let mut cache = RecentUpdates::load(&path);
        cache.mark_updated("8841", at("2025-03-01T12:00:00Z"));
        cache.persist().unwrap();

        let raw = std::fs::read_to_string(&path).unwrap();
        let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
        let stamp = value.as_object().unwrap().get("8841").unwrap();
        // ISO-8601 text, not a nested structure.
        assert!(stamp.as_str().unwrap().starts_with("2025-03-01T12:00:00"));
    }

    #[test]
    fn garbage_file_starts_empty_and_recovers_on_persist() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("recent_updates.json");
        std::fs::write(&path, "not json {").unwrap();

        let mut cache = RecentUpdates::load(&path);
        assert!(cache.is_empty());

        cache.mark_updated("8841", at("2025-03-01T12:00:00Z"));
        cache.persist().unwrap();
        assert_eq!(RecentUpdates::load(&path).len(), 1);
    }

    #[test]
    fn marking_overwrites_previous_timestamp() {
        let dir = tempfile::tempdir().unwrap();
        let mut cache = RecentUpdates::load(dir.path().join("recent_updates.json"));

        cache.mark_updated("8841", at("2025-03-01T12:00:00Z"));
        cache.mark_updated("8841", at("2025-03-01T12:05:00Z"));
        assert_eq!(cache.last_update("8841"), at("2025-03-01T12:05:00Z"));
        assert_eq!(cache.len(), 1);
    }
}
