use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use thiserror::Error;
use tracing::{debug, info, warn};

use pulsefeed_common::config::Config;
use pulsefeed_common::types::ScrollDirection;
use pulsefeed_store::{ArchivedSnapshot, ItemStore};

use crate::source::ContentSource;

#[derive(Debug, Error)]
pub enum BackfillError {
    #[error("Backfill stalled after {corrective_reveals} corrective reveals; oldest seen {oldest_seen}, oldest archived {oldest_archived}, {scroll_attempts} scroll attempts")]
    StallExhausted {
        oldest_seen: DateTime<Utc>,
        oldest_archived: DateTime<Utc>,
        scroll_attempts: u32,
        corrective_reveals: u32,
    },

    #[error("Backfill hit the scroll attempt cap at {scroll_attempts}; oldest seen {oldest_seen}, oldest archived {oldest_archived}")]
    ScrollBudget {
        oldest_seen: DateTime<Utc>,
        oldest_archived: DateTime<Utc>,
        scroll_attempts: u32,
    },
}

/// Outcome of a completed backfill sweep.
#[derive(Debug)]
pub struct BackfillReport {
    pub archived: u32,
    pub oldest_seen: DateTime<Utc>,
    pub oldest_archived: DateTime<Utc>,
    pub scroll_attempts: u32,
    pub corrective_reveals: u32,
}

impl std::fmt::Display for BackfillReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "\n=== Backfill Sweep Complete ===")?;
        writeln!(f, "Items archived:     {}", self.archived)?;
        writeln!(f, "Oldest archived:    {}", self.oldest_archived)?;
        writeln!(f, "Oldest seen:        {}", self.oldest_seen)?;
        writeln!(f, "Scroll attempts:    {}", self.scroll_attempts)?;
        writeln!(f, "Corrective reveals: {}", self.corrective_reveals)?;
        Ok(())
    }
}

/// One-shot historical sweep: reveal progressively older content and
/// archive everything inside the window until the cutoff is reached.
///
/// The window has a slack floor below the cutoff: an item older than the
/// cutoff but above the floor is still archived, which is what lets the
/// sweep actually observe an item at-or-past the cutoff and terminate.
/// Items below the floor (pinned posts, stray ancient items) only move
/// the oldest-seen marker.
pub struct BackfillCrawler {
    source: Arc<dyn ContentSource>,
    store: ItemStore,
    run_id: String,
    cutoff_hours: u32,
    window_slack_hours: u32,
    stall_threshold: u32,
    stall_backoff: StdDuration,
    max_scroll_attempts: u32,
    max_corrective_reveals: u32,
    scroll_step_px: u32,
}

impl BackfillCrawler {
    pub fn new(
        source: Arc<dyn ContentSource>,
        store: ItemStore,
        config: &Config,
        run_id: String,
    ) -> Self {
        Self {
            source,
            store,
            run_id,
            cutoff_hours: config.backfill_cutoff_hours,
            window_slack_hours: config.backfill_window_slack_hours,
            stall_threshold: config.stall_threshold,
            stall_backoff: StdDuration::from_secs(config.stall_backoff_secs),
            max_scroll_attempts: config.max_scroll_attempts,
            max_corrective_reveals: config.max_corrective_reveals,
            scroll_step_px: config.scroll_step_px,
        }
    }

    /// Run the sweep to completion or to budget exhaustion.
    pub async fn run(&self) -> Result<BackfillReport, BackfillError> {
        let started = Utc::now();
        let cutoff = started - Duration::hours(self.cutoff_hours as i64);
        let window_floor = cutoff - Duration::hours(self.window_slack_hours as i64);

        info!(
            run_id = %self.run_id,
            source = self.source.name(),
            %cutoff,
            %window_floor,
            "Backfill sweep starting"
        );

        if let Err(e) = self.source.reveal_to_top().await {
            warn!(error = %e, "Could not return to top of feed");
        }

        let mut archived_ids: HashSet<String> = HashSet::new();
        let mut oldest_seen = started;
        let mut oldest_archived = started;
        let mut last_progress = started;
        let mut stalled_reveals = 0u32;
        let mut scroll_attempts = 0u32;
        let mut corrective_reveals = 0u32;
        let mut archived = 0u32;

        loop {
            if scroll_attempts >= self.max_scroll_attempts {
                return Err(BackfillError::ScrollBudget {
                    oldest_seen,
                    oldest_archived,
                    scroll_attempts,
                });
            }
            scroll_attempts += 1;

            let visible = match self.source.visible_items().await {
                Ok(items) => items,
                Err(e) => {
                    warn!(error = %e, "Could not enumerate visible items");
                    Vec::new()
                }
            };
            debug!(
                attempt = scroll_attempts,
                visible = visible.len(),
                %oldest_seen,
                "Sweep pass"
            );

            let mut found_new = false;
            for item in &visible {
                let Some(id) = item.id.as_deref() else {
                    continue;
                };
                if archived_ids.contains(id) {
                    continue;
                }
                let Some(posted_at) = item.posted_at else {
                    warn!(item_id = %id, "Timestamp missing, cannot place item in window");
                    continue;
                };

                oldest_seen = oldest_seen.min(posted_at);

                if posted_at < window_floor {
                    // Proves the sweep reached past the window. Pinned posts
                    // land here on every pass and are never archived.
                    debug!(item_id = %id, %posted_at, "Item predates the archive window");
                    continue;
                }

                let snapshot = ArchivedSnapshot {
                    item_id: id.to_string(),
                    author: item.author.clone().unwrap_or_default(),
                    text: item.text.clone().unwrap_or_default(),
                    posted_at,
                    counts: item.counts.unwrap_or_default(),
                    collected_at: Utc::now(),
                };
                match self.store.archive_snapshot(&snapshot).await {
                    Ok(()) => {
                        archived_ids.insert(id.to_string());
                        oldest_archived = oldest_archived.min(posted_at);
                        found_new = true;
                        archived += 1;
                        debug!(item_id = %id, %posted_at, "Archived item");
                    }
                    // Not marked archived, so the next pass retries it.
                    Err(e) => warn!(item_id = %id, error = %e, "Failed to archive item"),
                }
            }

            if oldest_archived <= cutoff {
                info!(%oldest_archived, %cutoff, "Backfill reached the cutoff");
                break;
            }

            if found_new {
                if oldest_seen < last_progress {
                    let hours_gained = (last_progress - oldest_seen).num_minutes() as f64 / 60.0;
                    let hours_to_go = (oldest_seen - cutoff).num_minutes() as f64 / 60.0;
                    debug!(hours_gained, hours_to_go, "Sweep progressing");
                    last_progress = oldest_seen;
                    stalled_reveals = 0;
                } else {
                    stalled_reveals += 1;
                    debug!(stalled_reveals, "New items but no timestamp progress");
                }
            } else {
                stalled_reveals += 1;
                debug!(stalled_reveals, "No new items");
            }

            if stalled_reveals >= self.stall_threshold {
                if corrective_reveals >= self.max_corrective_reveals {
                    return Err(BackfillError::StallExhausted {
                        oldest_seen,
                        oldest_archived,
                        scroll_attempts,
                        corrective_reveals,
                    });
                }
                corrective_reveals += 1;
                warn!(
                    corrective_reveals,
                    max = self.max_corrective_reveals,
                    "Sweep stuck, forcing a full reveal"
                );
                if let Err(e) = self.source.reveal_to_end().await {
                    warn!(error = %e, "Forced reveal failed");
                }
                self.backoff().await;
                stalled_reveals = 0;
            }

            match self
                .source
                .reveal(ScrollDirection::Down, self.scroll_step_px)
                .await
            {
                Ok(true) => {}
                Ok(false) => {
                    debug!("Reveal brought nothing new, backing off");
                    self.backoff().await;
                    stalled_reveals += 1;
                }
                Err(e) => {
                    warn!(error = %e, "Reveal failed, backing off");
                    self.backoff().await;
                    stalled_reveals += 1;
                }
            }
        }

        let report = BackfillReport {
            archived,
            oldest_seen,
            oldest_archived,
            scroll_attempts,
            corrective_reveals,
        };
        info!("{report}");
        Ok(report)
    }

    async fn backoff(&self) {
        if self.stall_backoff.is_zero() {
            return;
        }
        let jitter = StdDuration::from_millis(rand::rng().random_range(0..1000));
        tokio::time::sleep(self.stall_backoff + jitter).await;
    }
}
