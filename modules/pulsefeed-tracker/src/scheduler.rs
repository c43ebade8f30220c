use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Duration, Utc};

/// Skips tolerated per item before the spacing rule is overridden.
const FORCE_AFTER_SKIPS: u32 = 2;

/// What to do with one visible item during a sweep.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateDecision {
    /// Not in the due set this cycle.
    Ignored,
    /// Due and the spacing window has elapsed.
    Update,
    /// Due but sampled too recently.
    Skip,
    /// Due, still inside the spacing window, but skipped too often already.
    Force,
}

/// Decides, per visible item, whether its engagement counts should be
/// sampled now.
///
/// The spacing rule keeps samples at least `min_spacing` apart so a post
/// that stays on screen across many sweeps is not hammered. An item that
/// keeps getting deferred would never leave the cycle's pending set, so
/// after [`FORCE_AFTER_SKIPS`] consecutive skips the next encounter is
/// forced through regardless of spacing.
pub struct UpdateScheduler {
    min_spacing: Duration,
    skip_counts: HashMap<String, u32>,
}

impl UpdateScheduler {
    pub fn new(min_spacing_seconds: u64) -> Self {
        Self {
            min_spacing: Duration::seconds(min_spacing_seconds as i64),
            skip_counts: HashMap::new(),
        }
    }

    pub fn decide(
        &mut self,
        item_id: &str,
        due: &HashSet<String>,
        last_update: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> UpdateDecision {
        if !due.contains(item_id) {
            return UpdateDecision::Ignored;
        }
        if now - last_update >= self.min_spacing {
            self.skip_counts.remove(item_id);
            return UpdateDecision::Update;
        }
        let skips = self.skip_counts.entry(item_id.to_string()).or_insert(0);
        *skips += 1;
        if *skips >= FORCE_AFTER_SKIPS {
            self.skip_counts.remove(item_id);
            UpdateDecision::Force
        } else {
            UpdateDecision::Skip
        }
    }

    /// Skips currently recorded against an item. Zero once an update or
    /// force has gone through.
    pub fn pending_skips(&self, item_id: &str) -> u32 {
        self.skip_counts.get(item_id).copied().unwrap_or(0)
    }
}
